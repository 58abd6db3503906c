//! Continuous ingestion from a partitioned message log into column files.
//!
//! An [`Ingestor`] runs a pool of independent workers. Each worker owns a
//! log-consumer session in a shared consumer group and one column-file
//! slot: records are polled, parsed, and appended to a temporary file that
//! is finalised — closed, renamed to a dated `.parquet` name, covered
//! offsets committed — whenever a size, record-count or age limit is hit.
//! Offsets are committed only after the covering file is durably in
//! place, so the pipeline is exactly-once per finalised file and
//! at-least-once end to end.
//!
//! ```text
//! log ── poll ──▶ parser ──▶ column writer ──▶ rename ──▶ offset commit
//! ```
//!
//! The log, the filesystem and the column encoder are seams
//! ([`granary_log`], [`granary_store`], [`granary_columnar`]); wire them
//! to the in-memory/local backends for tests, or to Kafka and a mounted
//! distributed filesystem in production.

mod config;
mod error;
mod ingestor;
mod metrics;
mod parser;
mod paths;
mod retry;
mod worker;

pub use config::{IngestorBuilder, RecordErrorPolicy};
pub use error::{ConfigError, IngestorError, ParseError, Result};
pub use ingestor::Ingestor;
pub use metrics::IngestorMetrics;
pub use parser::{RecordParser, prost_parser};
