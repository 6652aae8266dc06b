pub mod config;
pub mod error;
pub mod model;

pub use config::PortolanConfig;
pub use error::PortolanError;
pub use model::{Args, DiscoveredService, StorageData};
