/*!
Driver and passenger applications.

These are accepted as whatever JSON the client sends and kept in memory
for the life of the process. Nothing here is written to disk.
*/
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProfileKind {
    Driver,
    Passenger,
}

impl std::fmt::Display for ProfileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let token = match self {
            ProfileKind::Driver    => "driver",
            ProfileKind::Passenger => "passenger",
        };

        write!(f, "{}", token)
    }
}

impl ProfileKind {
    /// What the client is told after a successful submission.
    pub fn confirmation(&self) -> &'static str {
        match self {
            ProfileKind::Driver => "Driver application submitted successfully!",
            ProfileKind::Passenger => "Passenger application submitted successfully!",
        }
    }
}

#[derive(Clone, Debug)]
pub struct Profile {
    pub received: OffsetDateTime,
    pub body: Value,
}

#[derive(Debug, Default)]
pub struct ProfileDesk {
    drivers: RwLock<Vec<Profile>>,
    passengers: RwLock<Vec<Profile>>,
}

impl ProfileDesk {
    fn shelf(&self, kind: ProfileKind) -> &RwLock<Vec<Profile>> {
        match kind {
            ProfileKind::Driver => &self.drivers,
            ProfileKind::Passenger => &self.passengers,
        }
    }

    pub async fn submit(&self, kind: ProfileKind, body: Value) -> &'static str {
        log::info!("New {} profile: {}", &kind, &body);

        let p = Profile {
            received: OffsetDateTime::now_utc(),
            body,
        };
        self.shelf(kind).write().await.push(p);

        kind.confirmation()
    }

    pub async fn count(&self, kind: ProfileKind) -> usize {
        self.shelf(kind).read().await.len()
    }

    /// Copies of everything submitted so far, oldest first.
    pub async fn snapshot(&self, kind: ProfileKind) -> Vec<Profile> {
        self.shelf(kind).read().await.clone()
    }
}
