use clap::{Parser, Subcommand};
use std::{ffi::OsString, net::SocketAddr, path::PathBuf, time::Duration};

use super::types::LogLevel;
use crate::gateway::DEFAULT_CHANLEN;
use crate::net::buffer_pool::DEFAULT_BUFFER_SIZE;

// -----------------------------------------------------------------------------
// ----- Args ------------------------------------------------------------------

#[derive(Parser, Debug, Clone)]
#[command(name = "pathrelay", version, about = "Multi-path TCP relay and tunnel")]
pub struct Args {
    // Not required via CLI or ENV (defaults to info).
    #[arg(long = "log", env = "PATHRELAY_LOG", default_value = "info", global = true)]
    pub log_level: LogLevel,

    // Optional TOML file with [[paths]] entries, merged in front of the CLI list.
    #[arg(long = "config", env = "PATHRELAY_CONFIG", global = true)]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// HTTP frame relay in front of backend services.
    Relay {
        #[arg(
            long,
            short = 'l',
            env = "PATHRELAY_LISTEN",
            value_delimiter = ',',
            default_value = "0.0.0.0:11111"
        )]
        listen: Vec<SocketAddr>,

        #[arg(long, env = "PATHRELAY_CHANLEN", default_value_t = DEFAULT_CHANLEN)]
        chanlen: usize,

        #[arg(long, env = "PATHRELAY_BUFFSIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
        buffsize: usize,

        #[arg(
            long,
            env = "PATHRELAY_CONNECT_TIMEOUT",
            value_parser = humantime::parse_duration,
            default_value = "10s"
        )]
        connect_timeout: Duration,
    },

    /// Local listener spreading each connection over several relays.
    Client {
        #[arg(long, short = 'l', env = "PATHRELAY_LISTEN", default_value = "0.0.0.0:12345")]
        listen: SocketAddr,

        #[arg(long, short = 's', env = "PATHRELAY_SERVERS", value_delimiter = ',')]
        servers: Vec<String>,

        #[arg(long, short = 'r', env = "PATHRELAY_SERVICE")]
        service: String,

        #[arg(long, env = "PATHRELAY_BUFFSIZE", default_value_t = DEFAULT_BUFFER_SIZE)]
        buffsize: usize,
    },

    /// Local listener forwarding over an aggregated set of paths.
    TunnelClient {
        #[arg(long, short = 'l', env = "PATHRELAY_LISTEN")]
        listen: SocketAddr,

        #[arg(long, short = 'p', env = "PATHRELAY_PATHS", value_delimiter = ',')]
        paths: Vec<String>,

        #[arg(
            long,
            env = "PATHRELAY_BACKOFF",
            value_parser = humantime::parse_duration,
            default_value = "1s"
        )]
        backoff: Duration,

        #[arg(
            long,
            env = "PATHRELAY_CONNECT_TIMEOUT",
            value_parser = humantime::parse_duration,
            default_value = "10s"
        )]
        connect_timeout: Duration,
    },

    /// Tunnel endpoint forwarding accepted connections to one remote.
    TunnelServer {
        #[arg(long, short = 'l', env = "PATHRELAY_LISTEN")]
        listen: SocketAddr,

        #[arg(long, short = 'r', env = "PATHRELAY_REMOTE")]
        remote: String,

        #[arg(
            long,
            env = "PATHRELAY_BACKOFF",
            value_parser = humantime::parse_duration,
            default_value = "1s"
        )]
        backoff: Duration,

        #[arg(
            long,
            env = "PATHRELAY_CONNECT_TIMEOUT",
            value_parser = humantime::parse_duration,
            default_value = "10s"
        )]
        connect_timeout: Duration,
    },
}

// -----------------------------------------------------------------------------
// ----- Args: Static ----------------------------------------------------------

impl Args {
    /// Parses the process arguments; prints usage and exits on error.
    pub fn from_env() -> Args {
        Args::try_parse().unwrap_or_else(|e| e.exit())
    }

    pub fn parse_from_iter<I, T>(iter: I) -> Result<Args, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Args::try_parse_from(iter)
    }
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
