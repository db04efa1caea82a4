// ABOUTME: Replication orchestration module
// ABOUTME: Publication/subscription provisioning, catch-up detection and sequencing

pub mod catchup;
pub mod monitor;
pub mod orchestrator;
pub mod publication;
pub mod sql;
pub mod subscription;

#[cfg(test)]
pub(crate) mod testing;

pub use catchup::{is_caught_up, CatchUpOptions};
pub use monitor::{format_lag, publisher_stats, PublisherStats};
pub use orchestrator::{ensure_replication, ReplicaOutcome, ReplicationReport};
pub use publication::Publisher;
pub use subscription::{LogPosition, Subscriber, SubscriptionProgress, SubscriptionSpec};
