pub mod cli;
pub mod config;
pub mod paths;
pub mod types;

pub use cli::{Args, Command};
pub use config::{Config, ConfigError};
pub use paths::{PathsError, PathsFile};
pub use types::{
    ClientConfig, LogLevel, RelayConfig, Role, TunnelClientConfig, TunnelServerConfig,
};
