//! Kafka log backend (enabled with the `kafka` feature).
//!
//! Thin adapter from the [`LogConsumer`] seam onto an rdkafka
//! `StreamConsumer`. Consumer properties are passed straight through to
//! librdkafka; rebalance events reach the registered listener via the
//! consumer context.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{
    BaseConsumer, CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer,
};
use rdkafka::error::KafkaResult;
use rdkafka::message::Message;
use rdkafka::util::Timeout;
use rdkafka::{ClientContext, Offset as KafkaOffset, TopicPartitionList};
use tracing::{debug, error, warn};

use crate::consumer::MAX_POLL_RECORDS;
use crate::error::{BackendSnafu, ClosedSnafu, CommitSnafu, SubscriptionSnafu, WokenUpSnafu};
use crate::{
    ConsumerFactory, ConsumerProperties, ConsumerWaker, LogConsumer, Offset, PartitionId,
    RebalanceListener, Record, Result,
};

/// How long the startup liveness probe waits for cluster metadata.
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Consumer context relaying rebalance events to the subscribed listener.
#[derive(Default)]
pub struct ListenerContext {
    listener: Mutex<Option<Arc<dyn RebalanceListener>>>,
}

impl ClientContext for ListenerContext {}

impl ConsumerContext for ListenerContext {
    fn pre_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        if let Rebalance::Revoke(partitions) = rebalance {
            if let Some(listener) = self.listener.lock().expect("listener lock").as_ref() {
                listener.on_partitions_revoked(&partition_ids(partitions));
            }
        }
    }

    fn post_rebalance(&self, _consumer: &BaseConsumer<Self>, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                if let Some(listener) = self.listener.lock().expect("listener lock").as_ref() {
                    listener.on_partitions_assigned(&partition_ids(partitions));
                }
            }
            Rebalance::Revoke(_) => {}
            Rebalance::Error(e) => warn!(error = %e, "rebalance reported an error"),
        }
    }

    fn commit_callback(&self, result: KafkaResult<()>, offsets: &TopicPartitionList) {
        match result {
            Ok(()) => debug!(?offsets, "offset commit succeeded"),
            Err(e) => error!(error = %e, ?offsets, "offset commit failed"),
        }
    }
}

fn partition_ids(partitions: &TopicPartitionList) -> Vec<PartitionId> {
    partitions
        .elements()
        .iter()
        .map(|element| element.partition())
        .collect()
}

/// A Kafka consumer-group session.
pub struct KafkaConsumer {
    consumer: StreamConsumer<ListenerContext>,
    topic: Option<String>,
    waker: ConsumerWaker,
}

#[async_trait::async_trait]
impl LogConsumer for KafkaConsumer {
    async fn subscribe(
        &mut self,
        topic: &str,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<()> {
        *self.consumer.context().listener.lock().expect("listener lock") = Some(listener);
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| SubscriptionSnafu { message: e.to_string() }.build())?;
        self.topic = Some(topic.to_string());
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Record>> {
        let Some(topic) = self.topic.as_deref() else {
            return ClosedSnafu.fail();
        };

        if timeout.is_zero() {
            // Liveness probe: verify the cluster is reachable without
            // fetching (and possibly losing) records. Blocking, used on
            // the startup path only.
            self.consumer
                .fetch_metadata(Some(topic), Timeout::After(PROBE_TIMEOUT))
                .map_err(|e| BackendSnafu { message: e.to_string() }.build())?;
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.waker.take_woken() {
                return WokenUpSnafu.fail();
            }

            tokio::select! {
                result = self.consumer.recv() => {
                    let message = result
                        .map_err(|e| BackendSnafu { message: e.to_string() }.build())?;
                    records.push(Record {
                        partition: message.partition(),
                        offset: message.offset(),
                        key: message.key().map(<[u8]>::to_vec),
                        value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    });
                    if records.len() >= MAX_POLL_RECORDS {
                        return Ok(records);
                    }
                }
                _ = self.waker.woken() => return WokenUpSnafu.fail(),
                _ = tokio::time::sleep_until(deadline) => return Ok(records),
            }
        }
    }

    async fn commit(&mut self, offsets: &BTreeMap<PartitionId, Offset>) -> Result<()> {
        let Some(topic) = self.topic.clone() else {
            return ClosedSnafu.fail();
        };
        if offsets.is_empty() {
            return Ok(());
        }

        let mut partitions = TopicPartitionList::new();
        for (partition, offset) in offsets {
            partitions
                .add_partition_offset(&topic, *partition, KafkaOffset::Offset(*offset))
                .map_err(|e| CommitSnafu { message: e.to_string() }.build())?;
        }
        self.consumer
            .commit(&partitions, CommitMode::Async)
            .map_err(|e| CommitSnafu { message: e.to_string() }.build())
    }

    fn waker(&self) -> ConsumerWaker {
        self.waker.clone()
    }

    async fn close(&mut self) -> Result<()> {
        // Dropping the consumer leaves the group; nothing extra to do.
        self.topic = None;
        Ok(())
    }
}

/// Creates Kafka consumers from consumer properties.
#[derive(Debug, Default, Clone)]
pub struct KafkaConsumerFactory;

impl KafkaConsumerFactory {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl ConsumerFactory for KafkaConsumerFactory {
    async fn create(&self, properties: &ConsumerProperties) -> Result<Box<dyn LogConsumer>> {
        let mut config = ClientConfig::new();
        for (key, value) in properties.iter() {
            config.set(key, value);
        }

        let consumer: StreamConsumer<ListenerContext> = config
            .create_with_context(ListenerContext::default())
            .map_err(|e| BackendSnafu { message: e.to_string() }.build())?;

        Ok(Box::new(KafkaConsumer {
            consumer,
            topic: None,
            waker: ConsumerWaker::new(),
        }))
    }
}
