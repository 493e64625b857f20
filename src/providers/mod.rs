//! Packet source implementations

pub mod mock;
pub mod network;

pub use mock::{MockScript, MockSource, MockStep, SyntheticConfig};
pub use network::NetworkReceiver;
