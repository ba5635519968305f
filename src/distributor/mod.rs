//! Cross-instance fan-out.
//!
//! A publish goes to every process through the configured strategy; each
//! process then delivers to its own connections via [`LocalDelivery`].

mod broker;
mod delivery;
mod factory;
mod listener;
mod local;
mod message;
mod pubsub;
mod queue;
mod traits;
mod types;

pub use delivery::{
    decode_notification, DeliveryReport, DeliveryStats, DeliveryStatsSnapshot, LocalDelivery,
};
pub use factory::{create_distributor, create_distributor_with_transport};
pub use listener::spawn_listener;
pub use local::LocalDistributor;
pub use message::{OutboundMessage, Target};
pub use pubsub::PubSubDistributor;
pub use queue::QueueDistributor;
pub use traits::{Distributor, DistributorError};
pub use types::{DistributorConfig, DistributorStrategy};
