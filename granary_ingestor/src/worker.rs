//! The per-worker ingest loop.
//!
//! Each worker owns one consumer session and one column-file slot. Records
//! flow poll → parse → write; the open file is finalised (closed, renamed
//! to its dated final name, covered offsets committed) whenever a rollover
//! limit is hit. Offsets enter the written map only after a successful
//! write, and are committed only after the covering file has been renamed,
//! so a crash at any point re-delivers rather than loses records.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use bytesize::ByteSize;
use chrono::Local;
use snafu::ResultExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use granary_columnar::ColumnWriter;
use granary_log::{ConsumerError, LogConsumer, Offset, PartitionId, RebalanceListener, Record};

use crate::config::{IngestorConfig, RecordErrorPolicy};
use crate::error::{
    ColumnarSnafu, ConsumerSnafu, IngestorError, StoreSnafu, UnexpectedWakeupSnafu,
};
use crate::paths;
use crate::retry::{RetryAbort, retry_io};

pub(crate) type WrittenOffsets = Arc<Mutex<BTreeMap<PartitionId, Offset>>>;

/// Rebalance listener keeping the written-offset map consistent with the
/// partition assignment.
///
/// Revocation commits nothing on purpose: uncommitted offsets are left to
/// be re-read by the partition's next owner. Assignment prunes every
/// partition this worker no longer owns, so a later finalise cannot commit
/// on their behalf.
pub(crate) struct AssignmentPruner {
    pub(crate) index: usize,
    pub(crate) written_offsets: WrittenOffsets,
}

impl RebalanceListener for AssignmentPruner {
    fn on_partitions_revoked(&self, partitions: &[PartitionId]) {
        info!(worker = self.index, ?partitions, "partitions revoked");
    }

    fn on_partitions_assigned(&self, partitions: &[PartitionId]) {
        info!(worker = self.index, ?partitions, "partitions assigned");
        let mut written = self.written_offsets.lock().expect("written offsets lock");
        written.retain(|partition, _| partitions.contains(partition));
    }
}

pub(crate) struct Worker<T> {
    index: usize,
    config: Arc<IngestorConfig<T>>,
    consumer: Box<dyn LogConsumer>,
    current_file: Option<Box<dyn ColumnWriter<T>>>,
    temp_path: PathBuf,
    written_offsets: WrittenOffsets,
    running: Arc<AtomicBool>,
    close_lock: Arc<tokio::sync::Mutex<()>>,
    ct: CancellationToken,
}

impl<T: Send + 'static> Worker<T> {
    pub(crate) fn new(
        index: usize,
        config: Arc<IngestorConfig<T>>,
        consumer: Box<dyn LogConsumer>,
        written_offsets: WrittenOffsets,
        running: Arc<AtomicBool>,
        close_lock: Arc<tokio::sync::Mutex<()>>,
        ct: CancellationToken,
    ) -> Self {
        let temp_path =
            paths::temp_file_path(&config.target_dir, &config.instance_name, index);
        Self {
            index,
            config,
            consumer,
            current_file: None,
            temp_path,
            written_offsets,
            running,
            close_lock,
            ct,
        }
    }

    pub(crate) async fn run(mut self) -> Result<(), IngestorError> {
        info!(worker = self.index, "ingest worker started");

        let outcome = self.ingest_loop().await;
        let running = self.running.load(Ordering::Acquire);
        match outcome {
            Ok(()) => {}
            // The stop signal landed mid-retry. Benign during shutdown.
            Err(RetryAbort::Cancelled) if !running => {}
            Err(RetryAbort::Cancelled) => return UnexpectedWakeupSnafu.fail(),
            Err(RetryAbort::Fatal(error)) => return Err(error),
        }

        self.shutdown().await;
        info!(worker = self.index, "ingest worker stopped");
        Ok(())
    }

    async fn ingest_loop(&mut self) -> Result<(), RetryAbort> {
        while self.running.load(Ordering::Acquire) {
            if let Some(writer) = &self.current_file {
                if self.file_timed_out(writer.created_at()) {
                    debug!(worker = self.index, "column file open too long, finalizing");
                    self.finalize_current_file().await?;
                }
            }

            let records = match self.consumer.poll(self.config.poll_timeout).await {
                Ok(records) => records,
                Err(ConsumerError::WokenUp) => {
                    if self.running.load(Ordering::Acquire) {
                        return Err(RetryAbort::Fatal(UnexpectedWakeupSnafu.build()));
                    }
                    break;
                }
                Err(error) => {
                    return Err(RetryAbort::Fatal(IngestorError::Consumer {
                        operation: "poll",
                        source: error,
                    }));
                }
            };
            trace!(worker = self.index, count = records.len(), "polled records");
            if records.is_empty() {
                continue;
            }

            if self.current_file.is_none() {
                self.open_column_file().await?;
            }

            let mut records = records.into_iter().peekable();
            while let Some(record) = records.next() {
                self.write_record(record).await?;
                if self.current_file_full() {
                    debug!(worker = self.index, "column file full, finalizing");
                    self.finalize_current_file().await?;
                    if records.peek().is_some() {
                        self.open_column_file().await?;
                    }
                }
            }
        }

        Ok(())
    }

    async fn write_record(&mut self, record: Record) -> Result<(), RetryAbort> {
        let value_size = record.value_size();
        let parsed = match (self.config.parser)(&record.value) {
            Ok(parsed) => parsed,
            Err(error) => match self.config.record_error_policy {
                RecordErrorPolicy::FailFast => {
                    return Err(RetryAbort::Fatal(IngestorError::MalformedRecord {
                        partition: record.partition,
                        offset: record.offset,
                        source: error,
                    }));
                }
                RecordErrorPolicy::SkipAndCount => {
                    warn!(
                        worker = self.index,
                        partition = record.partition,
                        offset = record.offset,
                        error = %error,
                        "skipping malformed record"
                    );
                    self.config.metrics.invalid_records.add(1, &[]);
                    return Ok(());
                }
            },
        };

        let writer = self.current_file.as_mut().expect("open column file");
        retry_io!(
            &self.ct,
            writer
                .write(&parsed)
                .context(ColumnarSnafu { operation: "write" })
        )?;

        // Records arrive in order per partition, so last-write-wins keeps
        // the highest written offset.
        self.written_offsets
            .lock()
            .expect("written offsets lock")
            .insert(record.partition, record.offset);
        self.config.metrics.written_records.add(1, &[]);
        self.config.metrics.written_bytes.add(value_size as u64, &[]);
        Ok(())
    }

    fn current_file_full(&self) -> bool {
        let Some(writer) = &self.current_file else {
            return false;
        };
        (self.config.max_records_per_file > 0
            && writer.record_count() >= self.config.max_records_per_file)
            || (self.config.max_file_bytes > 0
                && writer.data_size() >= self.config.max_file_bytes)
    }

    fn file_timed_out(&self, created_at: Instant) -> bool {
        !self.config.max_file_open_duration.is_zero()
            && created_at.elapsed() > self.config.max_file_open_duration
    }

    async fn open_column_file(&mut self) -> Result<(), RetryAbort> {
        let writer = retry_io!(
            &self.ct,
            self.config
                .writer_factory
                .open(&self.temp_path)
                .await
                .context(ColumnarSnafu { operation: "open" })
        )?;
        debug!(
            worker = self.index,
            path = %self.temp_path.display(),
            "opened column file"
        );
        self.current_file = Some(writer);
        Ok(())
    }

    /// Close the open file, rename it to its final (dated) name and commit
    /// the offsets it covers. Strictly in that order: a committed offset
    /// must never point at records that only exist in a temp file.
    async fn finalize_current_file(&mut self) -> Result<(), RetryAbort> {
        let Some(writer) = self.current_file.as_ref() else {
            return Ok(());
        };

        // Snapshot before close; a closed writer reports only final sizes.
        let data_size = writer.data_size();
        let record_count = writer.record_count();

        // The supervisor raises the stop signal only while holding this
        // lock, so cancellation cannot land between attempts of a
        // half-finished close.
        retry_io!(&self.ct, {
            let _close_guard = self.close_lock.lock().await;
            self.current_file
                .as_mut()
                .expect("open column file")
                .close()
                .context(ColumnarSnafu { operation: "close" })
        })?;

        self.config.metrics.flushed_records.add(record_count, &[]);
        self.config.metrics.flushed_bytes.add(data_size, &[]);
        self.current_file = None;

        let now = Local::now();
        let destination = paths::destination_dir(
            &self.config.target_dir,
            self.config.directory_date_pattern.as_deref(),
            now,
        );
        if self.config.directory_date_pattern.is_some() {
            retry_io!(
                &self.ct,
                self.config
                    .filesystem
                    .mkdirs(&destination)
                    .await
                    .context(StoreSnafu { operation: "mkdirs" })
            )?;
        }

        let final_path = destination.join(paths::final_file_name(
            now,
            &self.config.instance_name,
            self.index,
        ));
        retry_io!(
            &self.ct,
            self.config
                .filesystem
                .rename(&self.temp_path, &final_path)
                .await
                .context(StoreSnafu { operation: "rename" })
        )?;
        info!(
            worker = self.index,
            file = %final_path.display(),
            records = record_count,
            size = %ByteSize::b(data_size),
            "column file finalized"
        );

        let offsets: BTreeMap<PartitionId, Offset> = {
            let written = self.written_offsets.lock().expect("written offsets lock");
            written
                .iter()
                .map(|(partition, offset)| (*partition, offset + 1))
                .collect()
        };
        if !offsets.is_empty() {
            debug!(worker = self.index, ?offsets, "committing offsets");
            retry_io!(
                &self.ct,
                self.consumer
                    .commit(&offsets)
                    .await
                    .context(ConsumerSnafu { operation: "commit" })
            )?;
            self.written_offsets
                .lock()
                .expect("written offsets lock")
                .clear();
        }

        Ok(())
    }

    /// Orderly exit: the in-flight file (if any) is discarded, not
    /// finalised. Its offsets were never committed, so its records will be
    /// re-delivered after a restart. The temp slot is removed even when no
    /// writer is open: the stop signal may have landed between a close and
    /// the rename, leaving a complete but unrenamed temp file behind.
    /// Failures here are logged and swallowed so the consumer is always
    /// released.
    async fn shutdown(&mut self) {
        if self.current_file.take().is_some() {
            debug!(worker = self.index, "discarding in-flight column file");
        }
        if let Err(error) = self.config.filesystem.delete(&self.temp_path).await {
            warn!(
                worker = self.index,
                error = %error,
                "failed to remove temporary file"
            );
        }

        if let Err(error) = self.consumer.close().await {
            warn!(worker = self.index, error = %error, "failed to close consumer");
        }
    }
}
