use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

use super::{
    cli::{Args, Command},
    paths::{PathsError, PathsFile},
    types::{ClientConfig, LogLevel, RelayConfig, Role, TunnelClientConfig, TunnelServerConfig},
};
use crate::net::PathSpec;
use crate::relay::MAX_WRITE_BODY;

// -----------------------------------------------------------------------------
// ----- Global Singleton ------------------------------------------------------

static ROOT_CONFIG: OnceCell<Arc<RwLock<Config>>> = OnceCell::new();

// -----------------------------------------------------------------------------
// ----- Config ----------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub log_level: LogLevel,
    pub role: Role,
}

// -----------------------------------------------------------------------------
// ----- Config: Static --------------------------------------------------------

impl Config {
    /// Parses CLI/ENV, merges the optional paths file and publishes the
    /// result as the process-wide snapshot.
    pub async fn init() -> Result<Config, ConfigError> {
        let config = Self::from_args(Args::from_env()).await?;
        Self::publish(config.clone());
        Ok(config)
    }

    /// None until `init` succeeded.
    pub fn snapshot() -> Option<Config> {
        ROOT_CONFIG.get().map(|handle| handle.read().clone())
    }

    pub async fn from_args(args: Args) -> Result<Config, ConfigError> {
        let file_paths = match &args.config_file {
            Some(path) => PathsFile::load(path).await?.paths,
            None => Vec::new(),
        };

        let role = match args.command {
            Command::Relay {
                listen,
                chanlen,
                buffsize,
                connect_timeout,
            } => {
                if listen.is_empty() {
                    return Err(ConfigError::Missing("--listen"));
                }
                if chanlen == 0 {
                    return Err(ConfigError::Invalid("--chanlen", "must be at least 1"));
                }
                if buffsize == 0 {
                    return Err(ConfigError::Invalid("--buffsize", "must be at least 1"));
                }
                Role::Relay(RelayConfig {
                    listen,
                    chanlen,
                    buffsize,
                    connect_timeout,
                })
            }

            Command::Client {
                listen,
                servers,
                service,
                buffsize,
            } => {
                let servers: Vec<String> = file_paths
                    .into_iter()
                    .map(|p| p.address)
                    .chain(non_blank(servers))
                    .collect();

                if servers.is_empty() {
                    return Err(ConfigError::Missing("--servers"));
                }
                if service.trim().is_empty() {
                    return Err(ConfigError::Missing("--service"));
                }
                if buffsize == 0 {
                    return Err(ConfigError::Invalid("--buffsize", "must be at least 1"));
                }
                // Each local read becomes one relay write body.
                if buffsize > MAX_WRITE_BODY {
                    return Err(ConfigError::Invalid(
                        "--buffsize",
                        "exceeds the relay write body limit",
                    ));
                }
                Role::Client(ClientConfig {
                    listen,
                    servers,
                    service,
                    buffsize,
                })
            }

            Command::TunnelClient {
                listen,
                paths,
                backoff,
                connect_timeout,
            } => {
                let cli_paths: Vec<String> = non_blank(paths).collect();
                let mut merged = file_paths;
                merged.extend(PathSpec::numbered(merged.len(), &cli_paths));

                if merged.is_empty() {
                    return Err(ConfigError::Missing("--paths"));
                }
                Role::TunnelClient(TunnelClientConfig {
                    listen,
                    paths: merged,
                    backoff,
                    connect_timeout,
                })
            }

            Command::TunnelServer {
                listen,
                remote,
                backoff,
                connect_timeout,
            } => {
                if remote.trim().is_empty() {
                    return Err(ConfigError::Missing("--remote"));
                }
                Role::TunnelServer(TunnelServerConfig {
                    listen,
                    remote,
                    backoff,
                    connect_timeout,
                })
            }
        };

        Ok(Config {
            log_level: args.log_level,
            role,
        })
    }
}

// -----------------------------------------------------------------------------
// ----- Config: Private -------------------------------------------------------

impl Config {
    fn publish(config: Config) {
        let handle = ROOT_CONFIG.get_or_init(|| Arc::new(RwLock::new(config.clone())));
        *handle.write() = config;
    }
}

// -----------------------------------------------------------------------------
// ----- Errors ----------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required value {0}")]
    Missing(&'static str),

    #[error("invalid {0}: {1}")]
    Invalid(&'static str, &'static str),

    #[error("paths file: {0}")]
    Paths(#[from] PathsError),
}

// -----------------------------------------------------------------------------
// ----- Private Utils ---------------------------------------------------------

fn non_blank(values: Vec<String>) -> impl Iterator<Item = String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
