use std::net::SocketAddr;
use std::time::Duration;

use crate::net::PathSpec;

// -------------------------------------------------------------------------------------------------
// ---- LogLevel -----------------------------------------------------------------------------------

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

// -------------------------------------------------------------------------------------------------
// ---- Role configs -------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Role {
    Relay(RelayConfig),
    Client(ClientConfig),
    TunnelClient(TunnelClientConfig),
    TunnelServer(TunnelServerConfig),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RelayConfig {
    pub listen: Vec<SocketAddr>,
    pub chanlen: usize,
    pub buffsize: usize,
    pub connect_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub listen: SocketAddr,
    pub servers: Vec<String>,
    pub service: String,
    pub buffsize: usize,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelClientConfig {
    pub listen: SocketAddr,
    pub paths: Vec<PathSpec>,
    pub backoff: Duration,
    pub connect_timeout: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TunnelServerConfig {
    pub listen: SocketAddr,
    pub remote: String,
    pub backoff: Duration,
    pub connect_timeout: Duration,
}

// -------------------------------------------------------------------------------------------------
// -------------------------------------------------------------------------------------------------
