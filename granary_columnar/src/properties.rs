use parquet::basic::{Compression as ParquetCompression, ZstdLevel};

use crate::{ColumnarError, Result};

const DEFAULT_BLOCK_SIZE: usize = 128 * 1024 * 1024;
const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// Compression codec applied to column file pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    Uncompressed,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub(crate) fn to_parquet(self) -> ParquetCompression {
        match self {
            Compression::Uncompressed => ParquetCompression::UNCOMPRESSED,
            Compression::Snappy => ParquetCompression::SNAPPY,
            Compression::Lz4 => ParquetCompression::LZ4_RAW,
            Compression::Zstd => ParquetCompression::ZSTD(ZstdLevel::default()),
        }
    }
}

/// Tunables of the produced column files.
///
/// `block_size` bounds the size of a row group: once the in-progress row
/// group grows past it, the group is flushed to the sink. `page_size`
/// bounds individual data pages within a group.
#[derive(Debug, Clone)]
pub struct ColumnFileProperties {
    pub block_size: usize,
    pub page_size: usize,
    pub dictionary_enabled: bool,
    pub compression: Compression,
}

impl Default for ColumnFileProperties {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            page_size: DEFAULT_PAGE_SIZE,
            dictionary_enabled: true,
            compression: Compression::Uncompressed,
        }
    }
}

impl ColumnFileProperties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_dictionary_enabled(mut self, enabled: bool) -> Self {
        self.dictionary_enabled = enabled;
        self
    }

    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    /// Check the properties are usable. Both sizes must be positive.
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ColumnarError::InvalidProperties {
                message: "block size must be a positive number".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ColumnarError::InvalidProperties {
                message: "page size must be a positive number".to_string(),
            });
        }
        Ok(())
    }
}
