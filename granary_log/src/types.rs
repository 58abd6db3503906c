use std::collections::BTreeMap;

/// Identifier of a partition within the subscribed topic.
pub type PartitionId = i32;

/// Position of a record within a partition.
pub type Offset = i64;

/// A single record delivered by the log. The value carries the raw bytes
/// exactly as produced; deserialization is the consumer's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub partition: PartitionId,
    pub offset: Offset,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

impl Record {
    /// Size of the record's value on the wire.
    pub fn value_size(&self) -> usize {
        self.value.len()
    }
}

/// String-keyed consumer configuration, passed through to the backend.
///
/// Key names follow the conventions of the Kafka consumer configuration
/// (`group.id`, `enable.auto.commit`, ...); backends ignore keys they do
/// not understand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsumerProperties {
    entries: BTreeMap<String, String>,
}

impl ConsumerProperties {
    pub const GROUP_ID: &'static str = "group.id";
    pub const ENABLE_AUTO_COMMIT: &'static str = "enable.auto.commit";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.entries.insert(key.into(), value.into());
        self
    }

    /// Insert the value only if the key is absent. Returns whether the
    /// value was inserted.
    pub fn set_default(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        use std::collections::btree_map::Entry;
        match self.entries.entry(key.into()) {
            Entry::Vacant(entry) => {
                entry.insert(value.into());
                true
            }
            Entry::Occupied(_) => false,
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ConsumerProperties {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            entries: iter
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}
