/*!
Signing up, logging in, and changing account settings.

All three go through a single `Store` behind an async mutex. Passwords are
hashed with bcrypt on tokio's blocking pool.
*/
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::Cfg;
use crate::store::{DbError, Store};
use crate::user::{Account, Role};

pub const SIGNUP_OK: &str = "Account created successfully!";
pub const LOGIN_OK: &str = "Login successful!";
pub const SETTINGS_OK: &str = "Settings updated and saved!";

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Email must end with {0}.")]
    InvalidDomain(String),

    #[error("An account with this email already exists.")]
    DuplicateAccount,

    /// Same message whether the email or the password was wrong.
    #[error("Invalid credentials.")]
    InvalidCredentials,

    #[error("No account exists for {0:?}.")]
    AccountNotFound(String),

    #[error("Account store unavailable: {0}")]
    StoreUnavailable(#[from] DbError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/**
Read a field the client may send as a string, a number, or a boolean;
anything but a string is stored as its JSON text. `null` counts as absent.
*/
fn scalar<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(Value::Bool(b)) => Ok(Some(b.to_string())),
        Some(v) => Err(D::Error::custom(format!(
            "expected a string, number, or boolean, not {}", &v
        ))),
    }
}

/**
The descriptive, optional part of an account, shared by the signup and
settings payloads.

Field names follow the web client; a few older client spellings are
accepted as aliases.
*/
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct Details {
    #[serde(deserialize_with = "scalar")]
    pub full_name: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub phone_number: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub address: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub extracurriculars: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub schedule_consistency: Option<String>,
    #[serde(alias = "leaveForMC", deserialize_with = "scalar")]
    pub leave_for_school_time: Option<String>,
    #[serde(alias = "leaveFromMC", deserialize_with = "scalar")]
    pub finish_extracurriculars: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub role: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub driving_duration: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub accidents: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub insured: Option<String>,
    #[serde(deserialize_with = "scalar")]
    pub responsible: Option<String>,
    #[serde(alias = "parentContact", deserialize_with = "scalar")]
    pub parent_contact_info: Option<String>,
    #[serde(alias = "payment", deserialize_with = "scalar")]
    pub payment_method: Option<String>,
}

impl Details {
    /// Overwrite the fields of `acct` that are present here.
    pub fn apply(self, acct: &mut Account) {
        fn set(field: &mut String, val: Option<String>) {
            if let Some(s) = val {
                *field = s;
            }
        }

        set(&mut acct.full_name, self.full_name);
        set(&mut acct.phone_number, self.phone_number);
        set(&mut acct.address, self.address);
        set(&mut acct.extracurriculars, self.extracurriculars);
        set(&mut acct.schedule_consistency, self.schedule_consistency);
        set(&mut acct.leave_for_school_time, self.leave_for_school_time);
        set(&mut acct.finish_extracurriculars, self.finish_extracurriculars);
        set(&mut acct.role, self.role);
        set(&mut acct.driving_duration, self.driving_duration);
        set(&mut acct.accidents, self.accidents);
        set(&mut acct.insured, self.insured);
        set(&mut acct.responsible, self.responsible);
        set(&mut acct.parent_contact_info, self.parent_contact_info);
        set(&mut acct.payment_method, self.payment_method);
    }
}

/// Body of `POST /api/signup`.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupData {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(flatten)]
    pub details: Details,
}

/// Body of `POST /api/login`.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginData {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Body of `POST /api/settings`. Absent fields are left as they were.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct SettingsData {
    pub email: Option<String>,
    pub password: Option<String>,
    #[serde(flatten)]
    pub details: Details,
}

fn or_not(s: &str, placeholder: &'static str) -> String {
    if s.is_empty() { placeholder.to_owned() } else { s.to_owned() }
}

fn log_signup(acct: &Account) {
    log::info!(
        "New signup: {} ({}), role {:?}, phone {}, address {:?}",
        or_not(&acct.full_name, "[no name]"), &acct.email, &acct.role,
        or_not(&acct.phone_number, "not provided"), &acct.address
    );
    log::info!(
        "    schedule {} -> {} ({}); extracurriculars: {}",
        or_not(&acct.leave_for_school_time, "not set"),
        or_not(&acct.finish_extracurriculars, "not set"),
        or_not(&acct.schedule_consistency, "consistency not specified"),
        or_not(&acct.extracurriculars, "none listed")
    );
    log::info!(
        "    parent contact: {}; payment: {}",
        or_not(&acct.parent_contact_info, "not provided"),
        or_not(&acct.payment_method, "not selected")
    );
    if acct.role() == Some(Role::Driver) {
        log::info!(
            "    driver: licensed {} months, accidents {}, insured {}, safety agreement {}",
            or_not(&acct.driving_duration, "?"),
            or_not(&acct.accidents, "?"),
            or_not(&acct.insured, "?"),
            or_not(&acct.responsible, "?")
        );
    }
}

#[derive(Debug)]
pub struct AccountService {
    store: Mutex<Store>,
    email_domain: String,
    hash_cost: u32,
    settings_upsert: bool,
}

impl AccountService {
    pub fn new(store: Store, cfg: &Cfg) -> Self {
        log::trace!("AccountService::new( {:?}, [ Cfg ] ) called.", store.path());

        Self {
            store: Mutex::new(store),
            email_domain: cfg.email_domain.clone(),
            hash_cost: cfg.hash_cost,
            settings_upsert: cfg.settings_upsert,
        }
    }

    /// Normalize the account file; see `Store::migrate()`.
    pub async fn migrate(&self) -> Result<Option<usize>, AccountError> {
        Ok(self.store.lock().await.migrate().await?)
    }

    /// Every stored account, in file order.
    pub async fn accounts(&self) -> Result<Vec<Account>, AccountError> {
        Ok(self.store.lock().await.load_all().await?)
    }

    async fn hash_password(&self, password: String) -> Result<String, AccountError> {
        let cost = self.hash_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| AccountError::Internal(format!("Hashing task failed: {}", &e)))?
            .map_err(|e| AccountError::Internal(format!("Unable to hash password: {}", &e)))
    }

    /// A stored hash bcrypt can't make sense of just doesn't match.
    async fn verify_password(
        &self,
        password: String,
        hash: String,
    ) -> Result<bool, AccountError> {
        let res = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
            .await
            .map_err(|e| AccountError::Internal(format!("Verification task failed: {}", &e)))?;

        match res {
            Ok(b) => Ok(b),
            Err(e) => {
                log::warn!("Stored password hash unusable: {}", &e);
                Ok(false)
            },
        }
    }

    pub async fn signup(&self, data: SignupData) -> Result<&'static str, AccountError> {
        let email = data.email.unwrap_or_default();
        log::trace!("AccountService::signup( {:?}, ... ) called.", &email);

        if !email.ends_with(&self.email_domain) {
            return Err(AccountError::InvalidDomain(self.email_domain.clone()));
        }

        // Only skips the hash for known duplicates; `insert_if_absent()`
        // below is the real check.
        if self.store.lock().await.find(&email).await?.is_some() {
            return Err(AccountError::DuplicateAccount);
        }

        let password_hash = self.hash_password(data.password.unwrap_or_default()).await?;
        let mut acct = Account {
            email,
            password_hash,
            ..Default::default()
        };
        data.details.apply(&mut acct);

        if !self.store.lock().await.insert_if_absent(&acct).await? {
            return Err(AccountError::DuplicateAccount);
        }

        log_signup(&acct);
        Ok(SIGNUP_OK)
    }

    pub async fn login(&self, data: LoginData) -> Result<&'static str, AccountError> {
        let email = data.email.unwrap_or_default();
        log::trace!("AccountService::login( {:?}, ... ) called.", &email);

        let acct = match self.store.lock().await.find(&email).await? {
            Some(acct) => acct,
            None => {
                log::info!("Login attempt for unknown email {:?}.", &email);
                return Err(AccountError::InvalidCredentials);
            },
        };

        let password = data.password.unwrap_or_default();
        if !self.verify_password(password, acct.password_hash.clone()).await? {
            log::info!("Wrong password for {:?}.", &email);
            return Err(AccountError::InvalidCredentials);
        }

        log::info!(
            "Login: {} ({}), role {}, schedule {} -> {}",
            or_not(&acct.full_name, "[no name]"), &acct.email,
            or_not(&acct.role, "unknown"),
            or_not(&acct.leave_for_school_time, "not set"),
            or_not(&acct.finish_extracurriculars, "not set")
        );
        Ok(LOGIN_OK)
    }

    /**
    Merge `data` into the stored account with the same email and rewrite
    the whole file.

    A nonempty `password` replaces the stored hash; otherwise the old hash
    stays. If no account has this email, this is an `AccountNotFound`
    error, unless the service was configured with `settings_upsert`, in
    which case a new row is appended.
    */
    pub async fn update_settings(&self, data: SettingsData) -> Result<&'static str, AccountError> {
        let email = data.email.unwrap_or_default();
        log::trace!("AccountService::update_settings( {:?}, ... ) called.", &email);

        let new_hash = match data.password {
            Some(p) if !p.is_empty() => Some(self.hash_password(p).await?),
            _ => None,
        };

        let mut store = self.store.lock().await;
        let mut accounts = store.load_all().await?;

        match accounts.iter().position(|a| a.email == email) {
            Some(n) => {
                let acct = &mut accounts[n];
                data.details.apply(acct);
                if let Some(hash) = new_hash {
                    acct.password_hash = hash;
                }
            },
            None if self.settings_upsert => {
                log::warn!("Settings for unknown email {:?}; appending a new row.", &email);
                let mut acct = Account {
                    email,
                    password_hash: new_hash.unwrap_or_default(),
                    ..Default::default()
                };
                data.details.apply(&mut acct);
                accounts.push(acct);
            },
            None => {
                return Err(AccountError::AccountNotFound(email));
            },
        }

        store.rewrite_all(&accounts).await?;
        log::info!("Rewrote account file with {} accounts.", accounts.len());
        Ok(SETTINGS_OK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::ensure_logging;

    use tempfile::{tempdir, TempDir};

    fn service(upsert: bool) -> (TempDir, AccountService) {
        ensure_logging();
        let dir = tempdir().unwrap();
        let cfg = Cfg {
            data_file: dir.path().join("users.csv"),
            hash_cost: 4,
            settings_upsert: upsert,
            ..Default::default()
        };
        let svc = AccountService::new(Store::new(&cfg.data_file), &cfg);
        (dir, svc)
    }

    fn signup_data(email: &str, password: &str, name: &str, role: &str) -> SignupData {
        SignupData {
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
            details: Details {
                full_name: Some(name.to_owned()),
                role: Some(role.to_owned()),
                ..Default::default()
            },
        }
    }

    fn login_data(email: &str, password: &str) -> LoginData {
        LoginData {
            email: Some(email.to_owned()),
            password: Some(password.to_owned()),
        }
    }

    #[tokio::test]
    async fn signup_then_login() {
        let (_dir, svc) = service(false);

        let msg = svc.signup(signup_data("a@mchs.org", "x", "A", "passenger")).await.unwrap();
        assert!(msg.contains("successfully"));

        let accounts = svc.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email, "a@mchs.org");
        assert_eq!(accounts[0].role, "passenger");
        assert_eq!(accounts[0].full_name, "A");
        assert_eq!(accounts[0].payment_method, "");
        assert_ne!(accounts[0].password_hash, "x");
        assert!(accounts[0].password_hash.starts_with("$2"));

        assert_eq!(svc.login(login_data("a@mchs.org", "x")).await.unwrap(), LOGIN_OK);
        assert!(matches!(
            svc.login(login_data("a@mchs.org", "y")).await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn signup_stores_every_column() {
        let (_dir, svc) = service(false);

        let data: SignupData = serde_json::from_str(r#"{
            "email": "d@mchs.org",
            "password": "secret",
            "fullName": "Dana \"D\" Driver",
            "phoneNumber": "555-0100",
            "address": "12 Oak St, Apt 3",
            "extracurriculars": "Band\nChess",
            "scheduleConsistency": "Weekdays",
            "leaveForSchoolTime": "07:10",
            "finishExtracurriculars": "16:30",
            "role": "driver",
            "drivingDuration": 14,
            "accidents": 0,
            "insured": true,
            "responsible": "yes",
            "parentContactInfo": "mom@example.com",
            "paymentMethod": "Venmo"
        }"#).unwrap();
        svc.signup(data).await.unwrap();

        let accounts = svc.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        let a = &accounts[0];
        let fields = a.fields();
        assert_eq!(fields.len(), crate::user::N_COLUMNS);
        assert_eq!(fields[0], "d@mchs.org");
        assert!(fields[1].starts_with("$2"));
        assert_eq!(
            &fields[2..],
            &[
                "Dana \"D\" Driver", "555-0100", "12 Oak St, Apt 3", "Band\nChess",
                "Weekdays", "07:10", "16:30", "driver", "14", "0", "true", "yes",
                "mom@example.com", "Venmo",
            ][..]
        );
        assert_eq!(a.role(), Some(Role::Driver));

        svc.login(login_data("d@mchs.org", "secret")).await.unwrap();
    }

    #[tokio::test]
    async fn bad_logins_look_alike() {
        let (_dir, svc) = service(false);
        svc.signup(signup_data("a@mchs.org", "x", "A", "driver")).await.unwrap();

        let wrong_pass = svc.login(login_data("a@mchs.org", "nope")).await.unwrap_err();
        let no_user = svc.login(login_data("z@mchs.org", "x")).await.unwrap_err();
        assert_eq!(wrong_pass.to_string(), no_user.to_string());
    }

    #[tokio::test]
    async fn wrong_domain_writes_nothing() {
        let (dir, svc) = service(false);

        let res = svc.signup(signup_data("a@gmail.com", "x", "A", "passenger")).await;
        assert!(matches!(res, Err(AccountError::InvalidDomain(_))));
        let res = svc.signup(SignupData::default()).await;
        assert!(matches!(res, Err(AccountError::InvalidDomain(_))));

        assert!(!dir.path().join("users.csv").exists());
    }

    #[tokio::test]
    async fn duplicates_are_refused() {
        let (_dir, svc) = service(false);

        svc.signup(signup_data("a@mchs.org", "x", "A", "passenger")).await.unwrap();
        let res = svc.signup(signup_data("a@mchs.org", "other", "Imposter", "driver")).await;
        assert!(matches!(res, Err(AccountError::DuplicateAccount)));

        svc.signup(signup_data("b@mchs.org", "x", "B", "driver")).await.unwrap();
        let accounts = svc.accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].full_name, "A");
    }

    #[tokio::test]
    async fn duplicates_found_in_existing_file() {
        let (dir, svc) = service(false);
        let path = dir.path().join("users.csv");
        std::fs::write(&path, "Email,PasswordHash\nold@mchs.org,hash,Old Timer\n").unwrap();
        svc.migrate().await.unwrap();

        let res = svc.signup(signup_data("old@mchs.org", "x", "New", "driver")).await;
        assert!(matches!(res, Err(AccountError::DuplicateAccount)));
        assert_eq!(svc.accounts().await.unwrap().len(), 1);

        // That hash isn't bcrypt; it just fails to match.
        assert!(matches!(
            svc.login(login_data("old@mchs.org", "hash")).await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn concurrent_signups_with_one_email() {
        let (_dir, svc) = service(false);

        let (r1, r2) = tokio::join!(
            svc.signup(signup_data("a@mchs.org", "x", "First", "driver")),
            svc.signup(signup_data("a@mchs.org", "y", "Second", "passenger")),
        );
        assert!(r1.is_ok() != r2.is_ok());
        assert_eq!(svc.accounts().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn settings_merge_and_keep_hash() {
        let (_dir, svc) = service(false);
        let mut data = signup_data("a@mchs.org", "x", "A", "passenger");
        data.details.address = Some("1 Elm St".to_owned());
        svc.signup(data).await.unwrap();
        svc.signup(signup_data("b@mchs.org", "x", "B", "driver")).await.unwrap();
        let old_hash = svc.accounts().await.unwrap()[0].password_hash.clone();

        let settings = SettingsData {
            email: Some("a@mchs.org".to_owned()),
            password: None,
            details: Details {
                full_name: Some("Alice".to_owned()),
                payment_method: Some("Venmo, probably".to_owned()),
                ..Default::default()
            },
        };
        assert_eq!(svc.update_settings(settings).await.unwrap(), SETTINGS_OK);

        let accounts = svc.accounts().await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert_eq!(accounts[0].full_name, "Alice");
        assert_eq!(accounts[0].address, "1 Elm St");
        assert_eq!(accounts[0].payment_method, "Venmo, probably");
        assert_eq!(accounts[0].password_hash, old_hash);
        assert_eq!(accounts[1].full_name, "B");
        svc.login(login_data("a@mchs.org", "x")).await.unwrap();
    }

    #[tokio::test]
    async fn settings_change_password() {
        let (_dir, svc) = service(false);
        svc.signup(signup_data("a@mchs.org", "x", "A", "passenger")).await.unwrap();

        let settings = SettingsData {
            email: Some("a@mchs.org".to_owned()),
            password: Some("new".to_owned()),
            ..Default::default()
        };
        svc.update_settings(settings).await.unwrap();

        assert!(svc.login(login_data("a@mchs.org", "x")).await.is_err());
        svc.login(login_data("a@mchs.org", "new")).await.unwrap();
    }

    #[tokio::test]
    async fn settings_for_unknown_email() {
        let (_dir, strict) = service(false);
        let settings = SettingsData {
            email: Some("ghost@mchs.org".to_owned()),
            ..Default::default()
        };
        assert!(matches!(
            strict.update_settings(settings.clone()).await,
            Err(AccountError::AccountNotFound(_))
        ));
        assert!(strict.accounts().await.unwrap().is_empty());

        let (_dir, lax) = service(true);
        lax.update_settings(settings).await.unwrap();
        let accounts = lax.accounts().await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].email, "ghost@mchs.org");
        assert_eq!(accounts[0].password_hash, "");
    }

    #[test]
    fn legacy_field_names() {
        let data: SettingsData = serde_json::from_str(r#"{
            "email": "a@mchs.org",
            "leaveForMC": "07:00",
            "leaveFromMC": "17:15",
            "payment": "Cash",
            "parentContact": "dad@example.com"
        }"#).unwrap();

        assert_eq!(data.email.as_deref(), Some("a@mchs.org"));
        assert_eq!(data.details.leave_for_school_time.as_deref(), Some("07:00"));
        assert_eq!(data.details.finish_extracurriculars.as_deref(), Some("17:15"));
        assert_eq!(data.details.payment_method.as_deref(), Some("Cash"));
        assert_eq!(data.details.parent_contact_info.as_deref(), Some("dad@example.com"));
        assert_eq!(data.details.full_name, None);
    }
}
