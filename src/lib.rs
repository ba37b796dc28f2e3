/*!
CarPal: signup, login, and settings backend for a school carpool service.

Accounts live in a flat CSV file (see `store`); everything else is plumbing
between the HTTP surface in `inter` and that file.
*/

pub mod account;
pub mod codec;
pub mod config;
pub mod inter;
pub mod profile;
pub mod stats;
pub mod store;
pub mod user;

use simplelog::LevelFilter;

/// Names are those of `log::LevelFilter`, in any case.
fn level_named(name: Option<&str>) -> LevelFilter {
    name.and_then(|s| s.trim().parse().ok())
        .unwrap_or(LevelFilter::Warn)
}

/// Log level from the `LOG_LEVEL` environment variable; `Warn` if it's
/// missing or makes no sense.
pub fn log_level_from_env() -> LevelFilter {
    level_named(std::env::var("LOG_LEVEL").ok().as_deref())
}
