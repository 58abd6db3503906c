use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Notify;

use crate::{ConsumerProperties, Offset, PartitionId, Record, Result};

/// Upper bound on the number of records returned by a single poll.
pub(crate) const MAX_POLL_RECORDS: usize = 500;

/// Callbacks fired when the consumer group redistributes partitions.
///
/// Callbacks may be invoked from an arbitrary thread while a poll is in
/// flight; implementations must only touch state that is safe to share.
pub trait RebalanceListener: Send + Sync {
    /// The listed partitions are about to be taken away from this consumer.
    fn on_partitions_revoked(&self, partitions: &[PartitionId]);

    /// The listed partitions are now owned by this consumer.
    fn on_partitions_assigned(&self, partitions: &[PartitionId]);
}

/// Cooperative wakeup handle for a blocked poll.
///
/// Cloneable so the owner of the consumer can hand it to whoever drives
/// shutdown. Waking is sticky: if no poll is in flight, the next poll
/// observes the signal.
#[derive(Debug, Clone, Default)]
pub struct ConsumerWaker {
    inner: Arc<WakerInner>,
}

#[derive(Debug, Default)]
struct WakerInner {
    woken: AtomicBool,
    notify: Notify,
}

impl ConsumerWaker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the consumer to abort its current (or next) poll.
    pub fn wake(&self) {
        self.inner.woken.store(true, Ordering::Release);
        self.inner.notify.notify_waiters();
    }

    /// Consume the wake signal if one is pending.
    pub fn take_woken(&self) -> bool {
        self.inner.woken.swap(false, Ordering::AcqRel)
    }

    /// Wait until a wake signal is pending. Does not consume the signal.
    pub async fn woken(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.inner.woken.load(Ordering::Acquire) {
                return;
            }
            notified.await;
        }
    }
}

/// A consumer-group session against the log.
///
/// One instance per ingest worker; the instance owns its partition
/// assignment. All record values are delivered as raw bytes.
#[async_trait::async_trait]
pub trait LogConsumer: Send {
    /// Join the group and subscribe to `topic`. The listener receives
    /// every assignment change for the lifetime of the subscription.
    async fn subscribe(&mut self, topic: &str, listener: Arc<dyn RebalanceListener>)
    -> Result<()>;

    /// Wait up to `timeout` for records. An empty vector means the timeout
    /// elapsed without data. Fails with [`ConsumerError::WokenUp`] if the
    /// waker fired.
    ///
    /// A zero timeout acts as a liveness probe: it drives the group join
    /// but never returns data.
    ///
    /// [`ConsumerError::WokenUp`]: crate::ConsumerError::WokenUp
    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Record>>;

    /// Commit consumed positions. Each offset is the *next* position to
    /// deliver on its partition. Submission is asynchronous: a successful
    /// return does not imply the commit is durable.
    async fn commit(&mut self, offsets: &BTreeMap<PartitionId, Offset>) -> Result<()>;

    /// Handle used to interrupt a blocked poll.
    fn waker(&self) -> ConsumerWaker;

    /// Leave the group and release the session.
    async fn close(&mut self) -> Result<()>;
}

/// Creates consumer sessions from configuration.
#[async_trait::async_trait]
pub trait ConsumerFactory: Send + Sync {
    async fn create(&self, properties: &ConsumerProperties) -> Result<Box<dyn LogConsumer>>;
}
