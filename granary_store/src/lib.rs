//! Filesystem abstraction used by the ingest engine.
//!
//! The finaliser writes column files through a narrow filesystem seam:
//! temporary files are created and filled through [`FileSystem::create`],
//! then atomically moved to their final name with [`FileSystem::rename`],
//! optionally into a dated sub-directory created with
//! [`FileSystem::mkdirs`]. Both `mkdirs` and `rename` must be idempotent or
//! tolerate the target already existing, since they are retried on
//! transient failure.

pub mod local;

mod error;

use std::io::Write;
use std::path::Path;

pub use error::{FileSystemError, Result};
pub use local::LocalFileSystem;

/// Seam between the ingest engine and the (possibly distributed) filesystem
/// holding the column files.
///
/// Implementations report interruption of an in-flight operation as
/// [`FileSystemError::Interrupted`]; every other I/O failure is considered
/// transient and will be retried by the caller.
#[async_trait::async_trait]
pub trait FileSystem: Send + Sync {
    /// Create (or truncate) the file at `path` and return a sink for its
    /// contents. Missing parent directories are created.
    async fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>>;

    /// Create the directory at `path` and any missing parents. Succeeds if
    /// the directory already exists.
    async fn mkdirs(&self, path: &Path) -> Result<()>;

    /// Move the file at `from` to `to`, replacing any file already there.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove the file at `path`. Succeeds if the file does not exist.
    async fn delete(&self, path: &Path) -> Result<()>;
}
