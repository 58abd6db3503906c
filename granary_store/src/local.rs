//! Local filesystem implementation.
//!
//! Backed by `std::fs`. Operations are short and executed inline; callers
//! treat all methods as blocking suspension points. Useful for tests,
//! development, and deployments where the target directory is a mounted
//! (distributed) filesystem.

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::{FileSystem, FileSystemError, Result};

/// Filesystem rooted in the host's own filesystem namespace. Paths are used
/// as given.
#[derive(Debug, Default, Clone)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl FileSystem for LocalFileSystem {
    async fn create(&self, path: &Path) -> Result<Box<dyn Write + Send>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| FileSystemError::from_io(parent, e))?;
        }
        let file = fs::File::create(path).map_err(|e| FileSystemError::from_io(path, e))?;
        Ok(Box::new(file))
    }

    async fn mkdirs(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).map_err(|e| FileSystemError::from_io(path, e))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to).map_err(|e| FileSystemError::from_io(from, e))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(FileSystemError::from_io(path, e)),
        }
    }
}
