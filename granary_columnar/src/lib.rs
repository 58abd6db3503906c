//! Column-file encoding seam for the ingest engine.
//!
//! The engine treats its output format as an opaque writer object: records
//! go in one at a time, the writer reports its size, record count and
//! creation time for rollover decisions, and `close` makes the file
//! complete. This crate defines that seam ([`ColumnWriter`] /
//! [`ColumnWriterFactory`]) together with the record conversion contract
//! ([`ColumnRecord`]) and ships the parquet implementation.

pub mod parquet;

mod error;
mod properties;
mod record;
mod writer;

pub use error::{ColumnarError, Result};
pub use properties::{ColumnFileProperties, Compression};
pub use record::ColumnRecord;
pub use writer::{ColumnWriter, ColumnWriterFactory};
