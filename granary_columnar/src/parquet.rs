//! Parquet implementation of the column-file seam.
//!
//! Records are buffered and converted to arrow batches in chunks, then
//! streamed through an [`ArrowWriter`] into a sink obtained from the
//! filesystem. Size accounting combines the bytes already flushed to the
//! sink with the in-progress row group, so rollover decisions track the
//! writer closely even before the first row group completes.

use std::io::Write;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use parquet::arrow::ArrowWriter;
use parquet::file::properties::WriterProperties;
use snafu::ResultExt;

use granary_store::FileSystem;

use crate::error::{ParquetSnafu, StoreSnafu};
use crate::{ColumnFileProperties, ColumnRecord, ColumnWriter, ColumnWriterFactory, Result};

const DEFAULT_BATCH_ROWS: usize = 1024;

/// Opens parquet column writers on a [`FileSystem`].
pub struct ParquetWriterFactory<T> {
    filesystem: Arc<dyn FileSystem>,
    properties: ColumnFileProperties,
    batch_rows: usize,
    _record: PhantomData<fn() -> T>,
}

impl<T: ColumnRecord> ParquetWriterFactory<T> {
    /// Create a factory with the given file properties. The properties are
    /// validated here, so a factory in hand implies usable settings.
    pub fn new(
        filesystem: Arc<dyn FileSystem>,
        properties: ColumnFileProperties,
    ) -> Result<Self> {
        properties.validate()?;
        Ok(Self {
            filesystem,
            properties,
            batch_rows: DEFAULT_BATCH_ROWS,
            _record: PhantomData,
        })
    }

    /// Number of records buffered before conversion into an arrow batch.
    pub fn with_batch_rows(mut self, batch_rows: usize) -> Self {
        self.batch_rows = batch_rows.max(1);
        self
    }
}

#[async_trait::async_trait]
impl<T: ColumnRecord> ColumnWriterFactory<T> for ParquetWriterFactory<T> {
    async fn open(&self, path: &Path) -> Result<Box<dyn ColumnWriter<T>>> {
        let sink = self
            .filesystem
            .create(path)
            .await
            .context(StoreSnafu { operation: "create" })?;

        let writer_properties = WriterProperties::builder()
            .set_compression(self.properties.compression.to_parquet())
            .set_dictionary_enabled(self.properties.dictionary_enabled)
            .set_data_page_size_limit(self.properties.page_size)
            .build();

        let writer = ArrowWriter::try_new(sink, T::schema(), Some(writer_properties)).context(
            ParquetSnafu {
                message: "failed to create column file writer",
            },
        )?;

        Ok(Box::new(ParquetColumnFile {
            writer: Some(writer),
            buffered: Vec::with_capacity(self.batch_rows),
            batch_rows: self.batch_rows,
            block_size: self.properties.block_size,
            records: 0,
            final_size: 0,
            created_at: Instant::now(),
        }))
    }
}

/// A single open parquet file.
pub struct ParquetColumnFile<T> {
    writer: Option<ArrowWriter<Box<dyn Write + Send>>>,
    buffered: Vec<T>,
    batch_rows: usize,
    block_size: usize,
    records: u64,
    final_size: u64,
    created_at: Instant,
}

impl<T: ColumnRecord> ParquetColumnFile<T> {
    /// Convert the buffered records into a batch and hand it to the arrow
    /// writer. The buffer is cleared only after the writer accepted the
    /// batch, so a failed flush can be repeated without losing records.
    fn flush_buffered(&mut self) -> Result<()> {
        if self.buffered.is_empty() {
            return Ok(());
        }

        let batch = T::to_record_batch(&self.buffered)?;
        let writer = self.writer.as_mut().expect("open parquet writer");
        writer.write(&batch).context(ParquetSnafu {
            message: "failed to write record batch",
        })?;
        self.buffered.clear();

        if writer.in_progress_size() >= self.block_size {
            writer.flush().context(ParquetSnafu {
                message: "failed to flush row group",
            })?;
        }

        Ok(())
    }
}

impl<T: ColumnRecord> ColumnWriter<T> for ParquetColumnFile<T> {
    fn write(&mut self, record: &T) -> Result<()> {
        // Flush before accepting the record: if the flush fails, the
        // record has not been counted yet and the call can be retried
        // without duplicating it.
        if self.buffered.len() >= self.batch_rows {
            self.flush_buffered()?;
        }
        self.buffered.push(record.clone());
        self.records += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.writer.is_none() {
            return Ok(());
        }

        self.flush_buffered()?;

        let writer = self.writer.as_mut().expect("open parquet writer");
        writer.finish().context(ParquetSnafu {
            message: "failed to finalize column file",
        })?;
        self.final_size = writer.bytes_written() as u64;

        // Dropping the writer drops the sink and with it the underlying
        // file handle. Everything, footer included, was written by
        // `finish`.
        self.writer = None;
        Ok(())
    }

    fn data_size(&self) -> u64 {
        match &self.writer {
            Some(writer) => (writer.bytes_written() + writer.in_progress_size()) as u64,
            None => self.final_size,
        }
    }

    fn record_count(&self) -> u64 {
        self.records
    }

    fn created_at(&self) -> Instant {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use arrow::array::{BinaryArray, RecordBatch, UInt64Array};
    use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use tempfile::TempDir;

    use granary_store::LocalFileSystem;

    use crate::error::ConversionSnafu;
    use crate::{ColumnarError, Compression};

    #[derive(Debug, Clone, PartialEq)]
    struct Reading {
        id: u64,
        payload: Vec<u8>,
    }

    impl ColumnRecord for Reading {
        fn schema() -> SchemaRef {
            Arc::new(Schema::new(vec![
                Field::new("id", DataType::UInt64, false),
                Field::new("payload", DataType::Binary, false),
            ]))
        }

        fn to_record_batch(rows: &[Self]) -> Result<RecordBatch> {
            let ids = UInt64Array::from_iter_values(rows.iter().map(|r| r.id));
            let payloads =
                BinaryArray::from_iter_values(rows.iter().map(|r| r.payload.as_slice()));
            RecordBatch::try_new(Self::schema(), vec![Arc::new(ids), Arc::new(payloads)])
                .context(ConversionSnafu {
                    message: "failed to build reading batch",
                })
        }
    }

    fn readings(count: u64) -> Vec<Reading> {
        (0..count)
            .map(|id| Reading {
                id,
                payload: vec![id as u8; 16],
            })
            .collect()
    }

    async fn open_writer(
        dir: &TempDir,
        properties: ColumnFileProperties,
        batch_rows: usize,
    ) -> (std::path::PathBuf, Box<dyn ColumnWriter<Reading>>) {
        let factory = ParquetWriterFactory::<Reading>::new(
            Arc::new(LocalFileSystem::new()),
            properties,
        )
        .unwrap()
        .with_batch_rows(batch_rows);

        let path = dir.path().join("shard_0.tmp");
        let writer = factory.open(&path).await.unwrap();
        (path, writer)
    }

    #[tokio::test]
    async fn write_close_read_back() {
        let dir = TempDir::new().unwrap();
        let (path, mut writer) =
            open_writer(&dir, ColumnFileProperties::default(), 4).await;

        for reading in readings(10) {
            writer.write(&reading).unwrap();
        }
        assert_eq!(writer.record_count(), 10);
        writer.close().unwrap();
        assert!(writer.data_size() > 0);

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
        assert_eq!(rows, 10);
    }

    #[tokio::test]
    async fn data_size_grows_as_batches_flush() {
        let dir = TempDir::new().unwrap();
        let (_path, mut writer) =
            open_writer(&dir, ColumnFileProperties::default(), 2).await;

        assert_eq!(writer.data_size(), 0);
        for reading in readings(8) {
            writer.write(&reading).unwrap();
        }
        assert!(writer.data_size() > 0);
    }

    #[tokio::test]
    async fn close_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let (_path, mut writer) =
            open_writer(&dir, ColumnFileProperties::default(), 4).await;

        writer.write(&readings(1)[0]).unwrap();
        writer.close().unwrap();
        let size = writer.data_size();
        writer.close().unwrap();
        assert_eq!(writer.data_size(), size);
    }

    #[tokio::test]
    async fn compressed_files_round_trip() {
        let dir = TempDir::new().unwrap();
        let properties = ColumnFileProperties::new().with_compression(Compression::Zstd);
        let (path, mut writer) = open_writer(&dir, properties, 4).await;

        for reading in readings(32) {
            writer.write(&reading).unwrap();
        }
        writer.close().unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .unwrap()
            .build()
            .unwrap();
        let rows: usize = reader.map(|batch| batch.unwrap().num_rows()).sum();
        assert_eq!(rows, 32);
    }

    #[test]
    fn factory_rejects_invalid_properties() {
        let result = ParquetWriterFactory::<Reading>::new(
            Arc::new(LocalFileSystem::new()),
            ColumnFileProperties::new().with_block_size(0),
        );
        assert!(matches!(
            result,
            Err(ColumnarError::InvalidProperties { .. })
        ));
    }
}
