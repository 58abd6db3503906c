use std::sync::Arc;

use crate::ParseError;

/// Turns a record's raw value bytes into the configured record type.
///
/// Whether a parse failure stops the worker or skips the record is decided
/// by the configured [`RecordErrorPolicy`].
///
/// [`RecordErrorPolicy`]: crate::RecordErrorPolicy
pub type RecordParser<T> = Arc<dyn Fn(&[u8]) -> Result<T, ParseError> + Send + Sync>;

/// Parser for length-delimited protobuf messages.
pub fn prost_parser<T>() -> RecordParser<T>
where
    T: prost::Message + Default,
{
    Arc::new(|bytes| {
        T::decode(bytes).map_err(|e| ParseError {
            message: e.to_string(),
        })
    })
}
