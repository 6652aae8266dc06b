pub mod gateway;
pub mod policy;
pub mod probe;

pub use gateway::{GatewayAdmin, GatewayRoute, GatewayService, KongClient};
pub use policy::{LadonClient, PolicyOracle};
pub use probe::{DocProbe, HttpDocProbe};
