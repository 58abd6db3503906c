use std::path::Path;
use std::time::Instant;

use crate::Result;

/// An open column file.
///
/// At most one instance exists per ingest worker at any time. Writers
/// report their accumulated size and record count so the caller can decide
/// when to roll the file over, and their creation instant for age-based
/// rollover.
pub trait ColumnWriter<T>: Send {
    /// Append a record to the file.
    fn write(&mut self, record: &T) -> Result<()>;

    /// Flush everything and complete the file. Safe to call again after a
    /// failure; succeeds trivially once the file is complete.
    fn close(&mut self) -> Result<()>;

    /// Bytes accumulated so far (including data not yet flushed to the
    /// sink). After a successful close, the final size of the file's data.
    fn data_size(&self) -> u64;

    /// Number of records written so far.
    fn record_count(&self) -> u64;

    /// The instant the writer was opened.
    fn created_at(&self) -> Instant;
}

/// Opens column writers on a filesystem path.
#[async_trait::async_trait]
pub trait ColumnWriterFactory<T>: Send + Sync {
    /// Create (or truncate) the file at `path` and return a writer for it.
    async fn open(&self, path: &Path) -> Result<Box<dyn ColumnWriter<T>>>;
}
