//! Log-client abstraction for the ingest engine.
//!
//! The engine consumes a partitioned, at-least-once message log through the
//! [`LogConsumer`] trait: subscribe to a single topic as part of a consumer
//! group, poll batches of raw-byte records, and commit per-partition
//! offsets once the covering column file is durable. Partition ownership is
//! redistributed by the log itself; the consumer surfaces that through a
//! [`RebalanceListener`] registered at subscribe time.
//!
//! Two backends are provided: [`memory::InMemoryLog`] simulates a
//! single-topic log with consumer groups for tests and local development,
//! and the `kafka` feature enables an rdkafka-backed consumer.

pub mod memory;

#[cfg(feature = "kafka")]
pub mod kafka;

mod consumer;
mod error;
mod types;

pub use consumer::{ConsumerFactory, ConsumerWaker, LogConsumer, RebalanceListener};
pub use error::{ConsumerError, Result};
pub use types::{ConsumerProperties, Offset, PartitionId, Record};
