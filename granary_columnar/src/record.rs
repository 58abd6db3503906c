use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;

use crate::Result;

/// Contract between a record type and the columnar encoder.
///
/// A type implementing this trait declares the arrow schema of its column
/// representation and knows how to turn a slice of records into a
/// [`RecordBatch`] with that schema. The parquet writer buffers records and
/// converts them in batches.
pub trait ColumnRecord: Clone + Send + Sync + 'static {
    /// The schema shared by every batch produced from this type.
    fn schema() -> SchemaRef;

    /// Convert a slice of records into a single batch.
    fn to_record_batch(rows: &[Self]) -> Result<RecordBatch>
    where
        Self: Sized;
}
