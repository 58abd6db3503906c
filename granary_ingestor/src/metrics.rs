use opentelemetry::metrics::{Counter, Meter};

pub(crate) const METRIC_PREFIX: &str = "granary.ingestor";

/// Counters exposed by one ingestor instance, registered under
/// `granary.ingestor.<instance>.<name>`.
///
/// The `written` counters advance on every in-memory write; the `flushed`
/// counters advance only when a file is finalised. Their difference bounds
/// the records in flight in open files, and lags by at most the
/// file-open window rather than the poll cadence.
#[derive(Clone)]
pub struct IngestorMetrics {
    pub written_records: Counter<u64>,
    pub written_bytes: Counter<u64>,
    pub flushed_records: Counter<u64>,
    pub flushed_bytes: Counter<u64>,
    pub invalid_records: Counter<u64>,
}

impl IngestorMetrics {
    pub fn new(meter: &Meter, instance: &str) -> Self {
        let counter = |name: &str, unit: &'static str, description: &'static str| {
            meter
                .u64_counter(format!("{METRIC_PREFIX}.{instance}.{name}"))
                .with_unit(unit)
                .with_description(description)
                .build()
        };

        Self {
            written_records: counter(
                "written.records",
                "{record}",
                "records written to open column files",
            ),
            written_bytes: counter(
                "written.bytes",
                "By",
                "wire size of records written to open column files",
            ),
            flushed_records: counter(
                "flushed.records",
                "{record}",
                "records in finalised column files",
            ),
            flushed_bytes: counter("flushed.bytes", "By", "data in finalised column files"),
            invalid_records: counter(
                "invalid.records",
                "{record}",
                "records skipped because they failed to parse",
            ),
        }
    }
}
