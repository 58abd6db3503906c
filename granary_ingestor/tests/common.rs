#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use arrow::array::{BinaryArray, RecordBatch, StringArray, UInt64Array};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_sdk::error::OTelSdkResult;
use opentelemetry_sdk::metrics::data::{AggregatedMetrics, MetricData, ResourceMetrics};
use opentelemetry_sdk::metrics::reader::MetricReader;
use opentelemetry_sdk::metrics::{
    InstrumentKind, ManualReader, Pipeline, SdkMeterProvider, Temporality,
};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use prost::Message;

use granary_columnar::parquet::ParquetWriterFactory;
use granary_columnar::{ColumnFileProperties, ColumnRecord, ColumnarError, Result as ColumnarResult};
use granary_ingestor::{IngestorBuilder, prost_parser};
use granary_log::memory::InMemoryLog;
use granary_log::ConsumerProperties;
use granary_store::{FileSystem, FileSystemError, LocalFileSystem, Result as StoreResult};

// =========================================================================
// Test record type
// =========================================================================

#[derive(Clone, PartialEq, Message)]
pub struct Telemetry {
    #[prost(uint64, tag = "1")]
    pub sequence: u64,
    #[prost(string, tag = "2")]
    pub source: String,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
}

impl ColumnRecord for Telemetry {
    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("sequence", DataType::UInt64, false),
            Field::new("source", DataType::Utf8, false),
            Field::new("payload", DataType::Binary, false),
        ]))
    }

    fn to_record_batch(rows: &[Self]) -> ColumnarResult<RecordBatch> {
        let sequences = UInt64Array::from_iter_values(rows.iter().map(|r| r.sequence));
        let sources = StringArray::from_iter_values(rows.iter().map(|r| r.source.as_str()));
        let payloads = BinaryArray::from_iter_values(rows.iter().map(|r| r.payload.as_slice()));
        RecordBatch::try_new(
            Self::schema(),
            vec![Arc::new(sequences), Arc::new(sources), Arc::new(payloads)],
        )
        .map_err(|source| ColumnarError::Conversion {
            message: "failed to build telemetry batch".to_string(),
            source,
        })
    }
}

pub fn telemetry(sequence: u64) -> Telemetry {
    Telemetry {
        sequence,
        source: "sensor-1".to_string(),
        payload: vec![0xAB; 64],
    }
}

/// Wire bytes of a telemetry record.
pub fn encode(sequence: u64) -> Vec<u8> {
    telemetry(sequence).encode_to_vec()
}

/// Bytes no telemetry record can start with (field key without a value).
pub fn malformed() -> Vec<u8> {
    vec![0x08]
}

// =========================================================================
// Ingestor wiring
// =========================================================================

pub fn consumer_properties() -> ConsumerProperties {
    [("auto.offset.reset", "earliest")].into_iter().collect()
}

pub fn group_id(instance: &str) -> String {
    format!("granary-ingestor-{instance}")
}

pub fn metric_name(instance: &str, name: &str) -> String {
    format!("granary.ingestor.{instance}.{name}")
}

pub fn ingestor_builder(
    log: &InMemoryLog,
    target: &Path,
    instance: &str,
) -> IngestorBuilder<Telemetry> {
    ingestor_builder_with_fs(log, target, instance, Arc::new(LocalFileSystem::new()))
}

pub fn ingestor_builder_with_fs(
    log: &InMemoryLog,
    target: &Path,
    instance: &str,
    filesystem: Arc<dyn FileSystem>,
) -> IngestorBuilder<Telemetry> {
    let writer_factory =
        ParquetWriterFactory::<Telemetry>::new(filesystem.clone(), ColumnFileProperties::default())
            .expect("writer factory")
            .with_batch_rows(8);

    IngestorBuilder::new(
        instance,
        log.topic(),
        consumer_properties(),
        target,
        prost_parser::<Telemetry>(),
        log.consumer_factory(),
        filesystem,
        Arc::new(writer_factory),
    )
}

// =========================================================================
// Fault injection
// =========================================================================

/// Local filesystem that fails the first `rename_failures` renames.
pub struct FlakyFileSystem {
    inner: LocalFileSystem,
    rename_failures: AtomicUsize,
}

impl FlakyFileSystem {
    pub fn new(rename_failures: usize) -> Self {
        Self {
            inner: LocalFileSystem::new(),
            rename_failures: AtomicUsize::new(rename_failures),
        }
    }
}

#[async_trait::async_trait]
impl FileSystem for FlakyFileSystem {
    async fn create(&self, path: &Path) -> StoreResult<Box<dyn std::io::Write + Send>> {
        self.inner.create(path).await
    }

    async fn mkdirs(&self, path: &Path) -> StoreResult<()> {
        self.inner.mkdirs(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> StoreResult<()> {
        let injected = self
            .rename_failures
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(FileSystemError::from_io(
                from,
                std::io::Error::other("injected rename failure"),
            ));
        }
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &Path) -> StoreResult<()> {
        self.inner.delete(path).await
    }
}

// =========================================================================
// Metrics capture
// =========================================================================

/// In-process metric reader so tests can assert on counter values.
#[derive(Clone, Debug)]
pub struct MetricsRecorder {
    reader: Arc<ManualReader>,
}

impl MetricReader for MetricsRecorder {
    fn register_pipeline(&self, pipeline: Weak<Pipeline>) {
        self.reader.register_pipeline(pipeline);
    }

    fn collect(&self, rm: &mut ResourceMetrics) -> OTelSdkResult {
        self.reader.collect(rm)
    }

    fn force_flush(&self) -> OTelSdkResult {
        self.reader.force_flush()
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> OTelSdkResult {
        self.reader.shutdown_with_timeout(timeout)
    }

    fn temporality(&self, kind: InstrumentKind) -> Temporality {
        self.reader.temporality(kind)
    }
}

impl MetricsRecorder {
    /// Current sum of a u64 counter, 0 if it was never written.
    pub fn counter_sum(&self, name: &str) -> u64 {
        let mut rm = ResourceMetrics::default();
        if self.reader.collect(&mut rm).is_err() {
            return 0;
        }
        for scope in rm.scope_metrics() {
            for metric in scope.metrics() {
                if metric.name() == name {
                    if let AggregatedMetrics::U64(MetricData::Sum(sum)) = metric.data() {
                        return sum.data_points().map(|point| point.value()).sum();
                    }
                }
            }
        }
        0
    }
}

/// A meter wired to an in-process recorder. Keep the provider alive for
/// the duration of the test.
pub fn test_meter() -> (Meter, MetricsRecorder, SdkMeterProvider) {
    let recorder = MetricsRecorder {
        reader: Arc::new(ManualReader::builder().build()),
    };
    let provider = SdkMeterProvider::builder()
        .with_reader(recorder.clone())
        .build();
    let meter = provider.meter("granary-tests");
    (meter, recorder, provider)
}

// =========================================================================
// Filesystem and timing helpers
// =========================================================================

/// Poll `condition` until it holds or the deadline passes.
pub async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    condition()
}

fn files_with_extension(dir: &Path, extension: &str, found: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            files_with_extension(&path, extension, found);
        } else if path.extension().and_then(|e| e.to_str()) == Some(extension) {
            found.push(path);
        }
    }
}

/// All finalised column files under `dir`, recursively, sorted by name.
pub fn parquet_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    files_with_extension(dir, "parquet", &mut found);
    found.sort();
    found
}

/// All temporary files under `dir`, recursively.
pub fn temp_files(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    files_with_extension(dir, "tmp", &mut found);
    found
}

/// Sequence numbers stored across the given column files, sorted.
pub fn read_sequences(files: &[PathBuf]) -> Vec<u64> {
    let mut sequences = Vec::new();
    for path in files {
        let file = std::fs::File::open(path).expect("open parquet file");
        let reader = ParquetRecordBatchReaderBuilder::try_new(file)
            .expect("parquet reader")
            .build()
            .expect("parquet reader build");
        for batch in reader {
            let batch = batch.expect("read batch");
            let column = batch
                .column(0)
                .as_any()
                .downcast_ref::<UInt64Array>()
                .expect("sequence column");
            sequences.extend(column.values().iter().copied());
        }
    }
    sequences.sort_unstable();
    sequences
}
