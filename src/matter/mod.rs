//! Matter side of the bridge: the shared attribute store, the cluster
//! handlers reading it and the stack serving them.

mod device_info;
mod netif;
mod stack;

pub mod attributes;
pub mod clusters;
pub mod device_types;
pub mod notifier;

pub use attributes::{MatterPresenceSink, PresenceAttributes};
pub use stack::{SENSOR_ENDPOINT_ID, run_matter_stack};
