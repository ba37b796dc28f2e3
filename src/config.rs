/*!
Structs to hold configuration data and global variables.
*/
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{
    account::AccountService,
    profile::ProfileDesk,
    store::Store,
};

/// Config file used when none is named on the command line, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "carpal.toml";

/// bcrypt's own limits.
const MIN_HASH_COST: u32 = 4;
const MAX_HASH_COST: u32 = 31;

#[derive(Deserialize)]
struct ConfigFile {
    data_file: Option<String>,
    public_dir: Option<String>,
    email_domain: Option<String>,
    hash_cost: Option<u32>,
    settings_upsert: Option<bool>,
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug)]
pub struct Cfg {
    /// The account file.
    pub data_file: PathBuf,
    /// Static files served for any path that isn't an API route.
    pub public_dir: PathBuf,
    /// Every account email must end with this.
    pub email_domain: String,
    /// bcrypt cost for new password hashes.
    pub hash_cost: u32,
    /// Whether a settings update for an unknown email creates an account.
    pub settings_upsert: bool,
    pub addr: SocketAddr,
}

impl std::default::Default for Cfg {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("users.csv"),
            public_dir: PathBuf::from("public"),
            email_domain: "@mchs.org".to_owned(),
            hash_cost: 10,
            settings_upsert: false,
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
        }
    }
}

impl Cfg {
    /// Defaults overridden by whatever `text` (TOML) specifies.
    pub fn from_toml(text: &str) -> Result<Self, String> {
        let cf: ConfigFile = toml::from_str(text)
            .map_err(|e| format!("Unable to deserialize config file: {}", &e))?;

        let mut c = Self::default();

        if let Some(s) = cf.data_file {
            c.data_file = PathBuf::from(s);
        }
        if let Some(s) = cf.public_dir {
            c.public_dir = PathBuf::from(s);
        }
        if let Some(s) = cf.email_domain {
            c.email_domain = s;
        }
        if let Some(n) = cf.hash_cost {
            if !(MIN_HASH_COST..=MAX_HASH_COST).contains(&n) {
                return Err(format!(
                    "hash_cost must be between {} and {}, not {}.",
                    MIN_HASH_COST, MAX_HASH_COST, &n
                ));
            }
            c.hash_cost = n;
        }
        if let Some(b) = cf.settings_upsert {
            c.settings_upsert = b;
        }
        if let Some(s) = cf.host {
            c.addr.set_ip(
                s.parse().map_err(|e| format!(
                    "Error parsing {:?} as IP address: {}",
                    &s, &e
                ))?
            );
        }
        if let Some(n) = cf.port {
            c.addr.set_port(n);
        }

        Ok(c)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let file_contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Unable to read config file {}: {}", path.display(), &e))?;
        Self::from_toml(&file_contents)
    }

    /// Apply environment overrides. Currently just `PORT`.
    pub fn with_env(mut self) -> Result<Self, String> {
        if let Ok(s) = std::env::var("PORT") {
            let port: u16 = s.parse()
                .map_err(|e| format!("Error parsing PORT {:?}: {}", &s, &e))?;
            self.addr.set_port(port);
        }
        Ok(self)
    }
}

/**
This guy hauls around the state shared by every request; he is passed to
the handlers in an `axum::Extension`.
*/
#[derive(Debug)]
pub struct Glob {
    pub accounts: AccountService,
    pub profiles: ProfileDesk,
}

impl Glob {
    pub fn new(cfg: &Cfg) -> Self {
        Self {
            accounts: AccountService::new(Store::new(&cfg.data_file), cfg),
            profiles: ProfileDesk::default(),
        }
    }
}

/**
Read the configuration and get the account file into shape.

`path` names a config file that must exist; with `None`, the default file
is used if it's there, and built-in defaults otherwise.
*/
pub async fn load_configuration(path: Option<&Path>) -> Result<(Cfg, Glob), String> {
    let cfg = match path {
        Some(p) => Cfg::from_file(p)?,
        None => {
            let p = Path::new(DEFAULT_CONFIG_FILE);
            if p.exists() {
                Cfg::from_file(p)?
            } else {
                log::info!("No {} found; using default configuration.", DEFAULT_CONFIG_FILE);
                Cfg::default()
            }
        },
    };
    let cfg = cfg.with_env()?;
    log::info!("Configuration:\n{:#?}", &cfg);

    let glob = Glob::new(&cfg);

    log::trace!("Migrating account file...");
    match glob.accounts.migrate().await {
        Ok(Some(n)) => { log::info!("Account file holds {} accounts.", &n); },
        Ok(None) => { log::info!("Account file will be created on first signup."); },
        Err(e) => {
            return Err(format!(
                "Unable to migrate account file {}: {}",
                cfg.data_file.display(), &e
            ));
        },
    }
    log::trace!("...account file okay.");

    Ok((cfg, glob))
}
