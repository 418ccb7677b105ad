pub mod classify;
pub mod config_ops;
pub mod device;
pub mod error;
pub mod events;
pub mod handler;
pub mod mirror;
pub mod params;
pub mod startup;

pub use device::Device;
pub use error::{ConfigError, ConnectError};
pub use params::Params;
pub use startup::RunLevel;
