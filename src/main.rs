/*!
Here we go!

```text
carpal [CONFIG_FILE]
```

With no argument, `carpal.toml` in the working directory is read if it
exists. Set `LOG_LEVEL` (e.g. `info`) to see the signup and statistics
logs.
*/
use std::path::PathBuf;
use std::sync::Arc;

use simplelog::{ColorChoice, TerminalMode, TermLogger};

use carpal::config;
use carpal::inter;
use carpal::stats::Stats;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let log_cfg = simplelog::ConfigBuilder::new()
        .add_filter_allow_str("carpal")
        .build();
    if let Err(e) = TermLogger::init(
        carpal::log_level_from_env(),
        log_cfg,
        TerminalMode::Stdout,
        ColorChoice::Auto
    ) {
        eprintln!("Unable to start logging: {}", &e);
    }
    log::info!("Logging started.");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let (cfg, glob) = match config::load_configuration(config_path.as_deref()).await {
        Ok(x) => x,
        Err(e) => {
            log::error!("Unable to start: {}", &e);
            eprintln!("Unable to start: {}", &e);
            std::process::exit(1);
        },
    };
    let glob = Arc::new(glob);

    match glob.accounts.accounts().await {
        Ok(accounts) => Stats::compute(&accounts).report(),
        Err(e) => { log::warn!("Unable to read accounts for statistics: {}", &e); },
    }

    let app = inter::router(glob.clone(), &cfg.public_dir);

    log::info!("Listening on {}", &cfg.addr);
    if let Err(e) = axum::Server::bind(&cfg.addr)
        .serve(app.into_make_service())
        .await
    {
        log::error!("Server error: {}", &e);
        eprintln!("Server error: {}", &e);
        std::process::exit(1);
    }
}
