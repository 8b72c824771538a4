use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

use pathrelay::config::{Config, Role};
use pathrelay::{client, relay, tunnel};

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const APP_NAME: &str = "pathrelay";

// -----------------------------------------------------------------------------
// ----- Main ------------------------------------------------------------------

#[tokio::main]
async fn main() -> std::io::Result<()> {
    setup().await?;
    run_forever().await
}

// -----------------------------------------------------------------------------
// ----- Setup -----------------------------------------------------------------

async fn setup() -> std::io::Result<()> {
    // This has to be the first thing we do, because it initializes the config
    Config::init()
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    init_tracing(&current_config()?);
    Ok(())
}

fn current_config() -> std::io::Result<Config> {
    Config::snapshot()
        .ok_or_else(|| std::io::Error::other("config read before initialization"))
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

// -----------------------------------------------------------------------------
// ----- Run -------------------------------------------------------------------

async fn run_forever() -> std::io::Result<()> {
    // Role settings are fixed at startup
    let config = current_config()?;
    let cancel = CancellationToken::new();

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match signal::ctrl_c().await {
            Ok(()) => {
                info!("{} shutting down", APP_NAME);
                shutdown.cancel();
            }
            Err(e) => error!("ctrl-c handler: {e}"),
        }
    });

    let res = match &config.role {
        Role::Relay(cfg) => relay::run(cfg, cancel).await,
        Role::Client(cfg) => client::run(cfg, cancel).await,
        Role::TunnelClient(cfg) => tunnel::client::run(cfg, cancel).await,
        Role::TunnelServer(cfg) => tunnel::server::run(cfg, cancel).await,
    };

    if let Err(e) = &res {
        error!("{} stopped: {e}", APP_NAME);
    }
    res
}

// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
