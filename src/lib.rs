pub mod client;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod net;
pub mod relay;
pub mod shared_types;
pub mod tunnel;

pub use config::Config;
pub use errors::RelayError;
pub use shared_types::SessionId;
