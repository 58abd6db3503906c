use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use opentelemetry::metrics::Meter;

use granary_columnar::ColumnWriterFactory;
use granary_log::{ConsumerFactory, ConsumerProperties};
use granary_store::FileSystem;

use crate::error::{
    ConfigError, EmptyConsumerPropertiesSnafu, EmptyInstanceNameSnafu, EmptyTargetDirSnafu,
    EmptyTopicSnafu, InvalidDirectoryPatternSnafu, InvalidMaxFileBytesSnafu,
    InvalidWorkerCountSnafu,
};
use crate::metrics::IngestorMetrics;
use crate::{Ingestor, RecordParser, paths};

const GROUP_ID_PREFIX: &str = "granary-ingestor";

/// Smaller limits underflow the column format's own overheads.
const MIN_MAX_FILE_BYTES: u64 = 100 * 1024;
const DEFAULT_MAX_FILE_BYTES: u64 = 1024 * 1024 * 1024;

const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(1000);

/// What to do with a record whose bytes fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordErrorPolicy {
    /// Stop the worker. The default: a malformed record usually means a
    /// producer bug or topic misconfiguration.
    #[default]
    FailFast,
    /// Skip the record, count it and keep going.
    SkipAndCount,
}

/// Builder for an [`Ingestor`]. Validation happens in [`build`].
///
/// [`build`]: IngestorBuilder::build
pub struct IngestorBuilder<T> {
    instance_name: String,
    topic: String,
    consumer_properties: ConsumerProperties,
    target_dir: PathBuf,
    parser: RecordParser<T>,
    consumer_factory: Arc<dyn ConsumerFactory>,
    filesystem: Arc<dyn FileSystem>,
    writer_factory: Arc<dyn ColumnWriterFactory<T>>,
    worker_count: usize,
    max_records_per_file: u64,
    max_file_bytes: u64,
    max_file_open_duration: Duration,
    directory_date_pattern: Option<String>,
    record_error_policy: RecordErrorPolicy,
    meter: Option<Meter>,
}

impl<T> IngestorBuilder<T> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        instance_name: impl Into<String>,
        topic: impl Into<String>,
        consumer_properties: ConsumerProperties,
        target_dir: impl Into<PathBuf>,
        parser: RecordParser<T>,
        consumer_factory: Arc<dyn ConsumerFactory>,
        filesystem: Arc<dyn FileSystem>,
        writer_factory: Arc<dyn ColumnWriterFactory<T>>,
    ) -> Self {
        Self {
            instance_name: instance_name.into(),
            topic: topic.into(),
            consumer_properties,
            target_dir: target_dir.into(),
            parser,
            consumer_factory,
            filesystem,
            writer_factory,
            worker_count: 1,
            max_records_per_file: 0,
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_file_open_duration: Duration::ZERO,
            directory_date_pattern: None,
            record_error_policy: RecordErrorPolicy::default(),
            meter: None,
        }
    }

    /// Number of concurrent workers. Default 1.
    pub fn with_worker_count(mut self, worker_count: usize) -> Self {
        self.worker_count = worker_count;
        self
    }

    /// Maximum records per column file. Zero means no limit. Default 0.
    pub fn with_max_records_per_file(mut self, max_records: u64) -> Self {
        self.max_records_per_file = max_records;
        self
    }

    /// Maximum column file size. Zero means no limit. Default 1 GiB.
    pub fn with_max_file_bytes(mut self, max_file_bytes: u64) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    /// Maximum time a column file is kept open before it is finalised.
    /// Zero means no limit. Default zero.
    pub fn with_max_file_open_duration(mut self, duration: Duration) -> Self {
        self.max_file_open_duration = duration;
        self
    }

    /// Place finalised files in `<target>/<now formatted with pattern>`
    /// (chrono strftime syntax) instead of the target directory itself.
    pub fn with_directory_date_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.directory_date_pattern = Some(pattern.into());
        self
    }

    pub fn with_record_error_policy(mut self, policy: RecordErrorPolicy) -> Self {
        self.record_error_policy = policy;
        self
    }

    /// Meter the instance's counters are registered on. Without one, the
    /// global meter provider is used (a no-op unless installed).
    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meter = Some(meter);
        self
    }

    pub fn build(mut self) -> Result<Ingestor<T>, ConfigError> {
        snafu::ensure!(!self.instance_name.is_empty(), EmptyInstanceNameSnafu);
        snafu::ensure!(!self.topic.is_empty(), EmptyTopicSnafu);
        snafu::ensure!(
            !self.target_dir.as_os_str().is_empty(),
            EmptyTargetDirSnafu
        );
        snafu::ensure!(
            !self.consumer_properties.is_empty(),
            EmptyConsumerPropertiesSnafu
        );
        snafu::ensure!(self.worker_count > 0, InvalidWorkerCountSnafu);
        snafu::ensure!(
            self.max_file_bytes == 0 || self.max_file_bytes >= MIN_MAX_FILE_BYTES,
            InvalidMaxFileBytesSnafu {
                min: MIN_MAX_FILE_BYTES,
                got: self.max_file_bytes,
            }
        );
        if let Some(pattern) = &self.directory_date_pattern {
            snafu::ensure!(
                paths::is_valid_date_pattern(pattern),
                InvalidDirectoryPatternSnafu {
                    pattern: pattern.as_str(),
                }
            );
        }

        // The log must never commit behind the engine's back, and workers
        // without an explicit group form one per instance.
        self.consumer_properties
            .set(ConsumerProperties::ENABLE_AUTO_COMMIT, "false");
        self.consumer_properties.set_default(
            ConsumerProperties::GROUP_ID,
            format!("{GROUP_ID_PREFIX}-{}", self.instance_name),
        );

        // A worker must wake at least once within every rollover window.
        let poll_timeout = if self.max_file_open_duration.is_zero() {
            DEFAULT_POLL_TIMEOUT
        } else {
            DEFAULT_POLL_TIMEOUT.min(self.max_file_open_duration)
        };

        let meter = self
            .meter
            .unwrap_or_else(|| opentelemetry::global::meter("granary_ingestor"));
        let metrics = IngestorMetrics::new(&meter, &self.instance_name);

        Ok(Ingestor::new(IngestorConfig {
            instance_name: self.instance_name,
            topic: self.topic,
            consumer_properties: self.consumer_properties,
            target_dir: self.target_dir,
            parser: self.parser,
            consumer_factory: self.consumer_factory,
            filesystem: self.filesystem,
            writer_factory: self.writer_factory,
            worker_count: self.worker_count,
            max_records_per_file: self.max_records_per_file,
            max_file_bytes: self.max_file_bytes,
            max_file_open_duration: self.max_file_open_duration,
            directory_date_pattern: self.directory_date_pattern,
            record_error_policy: self.record_error_policy,
            poll_timeout,
            metrics,
        }))
    }
}

/// Validated, immutable configuration shared by all workers.
pub(crate) struct IngestorConfig<T> {
    pub(crate) instance_name: String,
    pub(crate) topic: String,
    pub(crate) consumer_properties: ConsumerProperties,
    pub(crate) target_dir: PathBuf,
    pub(crate) parser: RecordParser<T>,
    pub(crate) consumer_factory: Arc<dyn ConsumerFactory>,
    pub(crate) filesystem: Arc<dyn FileSystem>,
    pub(crate) writer_factory: Arc<dyn ColumnWriterFactory<T>>,
    pub(crate) worker_count: usize,
    pub(crate) max_records_per_file: u64,
    pub(crate) max_file_bytes: u64,
    pub(crate) max_file_open_duration: Duration,
    pub(crate) directory_date_pattern: Option<String>,
    pub(crate) record_error_policy: RecordErrorPolicy,
    pub(crate) poll_timeout: Duration,
    pub(crate) metrics: IngestorMetrics,
}
