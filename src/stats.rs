/*!
Head counts of the accounts on file.
*/
use time::{
    format_description::FormatItem,
    macros::format_description,
    OffsetDateTime,
};

use crate::user::{Account, Role};

const STAMP_FMT: &[FormatItem] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second] UTC"
);

/// How many of the most recent signups `report()` lists.
const N_RECENT: usize = 3;

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recent {
    pub full_name: String,
    pub email: String,
    pub role: String,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stats {
    pub total: usize,
    pub passengers: usize,
    pub drivers: usize,
    /// Latest signups first.
    pub recent: Vec<Recent>,
}

impl Stats {
    /// Role matching is exact: "Driver" counts toward `total` only.
    pub fn compute(accounts: &[Account]) -> Stats {
        let mut stats = Stats {
            total: accounts.len(),
            ..Default::default()
        };

        for acct in accounts.iter() {
            match acct.role() {
                Some(Role::Driver) => { stats.drivers += 1; },
                Some(Role::Passenger) => { stats.passengers += 1; },
                None => {},
            }
        }

        stats.recent = accounts.iter()
            .rev()
            .take(N_RECENT)
            .map(|a| Recent {
                full_name: a.full_name.clone(),
                email: a.email.clone(),
                role: a.role.clone(),
            })
            .collect();

        stats
    }

    /// Write the numbers to the log.
    pub fn report(&self) {
        let stamp = OffsetDateTime::now_utc()
            .format(&STAMP_FMT)
            .unwrap_or_else(|e| format!("[unformattable time: {}]", &e));

        log::info!("CarPal data collection statistics");
        log::info!("    total users: {}", &self.total);
        log::info!("    passengers:  {}", &self.passengers);
        log::info!("    drivers:     {}", &self.drivers);
        log::info!(
            "    collection rate: {}",
            if self.total > 0 { "100%" } else { "0%" }
        );
        log::info!("    as of {}", &stamp);

        if !self.recent.is_empty() {
            log::info!("Recent users:");
            for (n, r) in self.recent.iter().enumerate() {
                log::info!(
                    "    {}. {} ({}) - {}",
                    n + 1,
                    if r.full_name.is_empty() { "Unknown" } else { r.full_name.as_str() },
                    &r.email,
                    if r.role.is_empty() { "Unknown" } else { r.role.as_str() }
                );
            }
        }
    }
}
