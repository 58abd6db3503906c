//! In-memory log backend.
//!
//! A single-topic, multi-partition log with a consumer-group simulation,
//! intended for tests and local development. Partitions are distributed
//! round-robin over the group's members in join order; every membership
//! change revokes and re-assigns through the registered listeners, the way
//! an eager group protocol does. Newly acquired partitions resume from the
//! group's committed offset; retained partitions keep their position.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Notify;
use tracing::debug;

use crate::consumer::MAX_POLL_RECORDS;
use crate::error::{ClosedSnafu, InvalidConfigSnafu, SubscriptionSnafu, WokenUpSnafu};
use crate::{
    ConsumerFactory, ConsumerProperties, ConsumerWaker, LogConsumer, Offset, PartitionId,
    RebalanceListener, Record, Result,
};

/// Identifier of a group member, assigned in join order.
pub type MemberId = u64;

/// The log itself. Cheap to clone; all clones share state.
#[derive(Clone)]
pub struct InMemoryLog {
    shared: Arc<Shared>,
}

struct Shared {
    topic: String,
    partitions: Vec<Mutex<Vec<Vec<u8>>>>,
    groups: Mutex<HashMap<String, GroupState>>,
    data_notify: Notify,
    next_member: AtomicU64,
    commit_calls: AtomicU64,
}

#[derive(Default)]
struct GroupState {
    committed: BTreeMap<PartitionId, Offset>,
    members: BTreeMap<MemberId, MemberState>,
}

struct MemberState {
    assignment: Vec<PartitionId>,
    positions: BTreeMap<PartitionId, Offset>,
    listener: Arc<dyn RebalanceListener>,
}

impl InMemoryLog {
    pub fn new(topic: impl Into<String>, partitions: usize) -> Self {
        assert!(partitions > 0, "log must have at least one partition");
        Self {
            shared: Arc::new(Shared {
                topic: topic.into(),
                partitions: (0..partitions).map(|_| Mutex::new(Vec::new())).collect(),
                groups: Mutex::new(HashMap::new()),
                data_notify: Notify::new(),
                next_member: AtomicU64::new(0),
                commit_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn topic(&self) -> &str {
        &self.shared.topic
    }

    pub fn partition_count(&self) -> usize {
        self.shared.partitions.len()
    }

    /// Append a record to a partition, returning its offset.
    pub fn append(&self, partition: PartitionId, value: impl Into<Vec<u8>>) -> Offset {
        let slot = self
            .shared
            .partitions
            .get(partition as usize)
            .expect("partition out of range");
        let offset = {
            let mut data = slot.lock().expect("partition lock");
            data.push(value.into());
            (data.len() - 1) as Offset
        };
        self.shared.data_notify.notify_waiters();
        offset
    }

    /// Committed offsets of a group (next-to-deliver positions).
    pub fn committed_offsets(&self, group: &str) -> BTreeMap<PartitionId, Offset> {
        let groups = self.shared.groups.lock().expect("group lock");
        groups
            .get(group)
            .map(|state| state.committed.clone())
            .unwrap_or_default()
    }

    /// Number of commit calls accepted across all groups.
    pub fn commit_count(&self) -> u64 {
        self.shared.commit_calls.load(Ordering::Acquire)
    }

    /// Current members of a group, in join order.
    pub fn members(&self, group: &str) -> Vec<MemberId> {
        let groups = self.shared.groups.lock().expect("group lock");
        groups
            .get(group)
            .map(|state| state.members.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Test control: force an explicit assignment onto the listed members,
    /// firing their rebalance listeners. Members not listed are untouched.
    pub fn set_assignment(&self, group: &str, assignment: &[(MemberId, &[PartitionId])]) {
        let mut groups = self.shared.groups.lock().expect("group lock");
        let Some(state) = groups.get_mut(group) else {
            return;
        };
        for (member_id, partitions) in assignment {
            if let Some(member) = state.members.get_mut(member_id) {
                Shared::apply_assignment(member, partitions.to_vec(), &state.committed);
            }
        }
        drop(groups);
        self.shared.data_notify.notify_waiters();
    }

    pub fn consumer_factory(&self) -> Arc<dyn ConsumerFactory> {
        Arc::new(InMemoryConsumerFactory { log: self.clone() })
    }
}

impl Shared {
    /// Redistribute the log's partitions round-robin over the group's
    /// members, firing revoke/assign callbacks per member.
    fn redistribute(&self, state: &mut GroupState) {
        let member_count = state.members.len();
        if member_count == 0 {
            return;
        }
        let partition_count = self.partitions.len() as PartitionId;
        for (slot, member) in state.members.values_mut().enumerate() {
            let assignment: Vec<PartitionId> = (0..partition_count)
                .filter(|partition| (*partition as usize) % member_count == slot)
                .collect();
            Self::apply_assignment(member, assignment, &state.committed);
        }
    }

    fn apply_assignment(
        member: &mut MemberState,
        assignment: Vec<PartitionId>,
        committed: &BTreeMap<PartitionId, Offset>,
    ) {
        member.listener.on_partitions_revoked(&member.assignment);
        member.positions.retain(|partition, _| {
            assignment.contains(partition) && member.assignment.contains(partition)
        });
        for partition in &assignment {
            member
                .positions
                .entry(*partition)
                .or_insert_with(|| committed.get(partition).copied().unwrap_or(0));
        }
        member.assignment = assignment;
        member.listener.on_partitions_assigned(&member.assignment);
    }

    fn collect(&self, group: &str, member_id: MemberId) -> Vec<Record> {
        let mut groups = self.groups.lock().expect("group lock");
        let Some(member) = groups
            .get_mut(group)
            .and_then(|state| state.members.get_mut(&member_id))
        else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for partition in member.assignment.clone() {
            let data = self.partitions[partition as usize]
                .lock()
                .expect("partition lock");
            let position = member.positions.entry(partition).or_insert(0);
            while (*position as usize) < data.len() && records.len() < MAX_POLL_RECORDS {
                records.push(Record {
                    partition,
                    offset: *position,
                    key: None,
                    value: data[*position as usize].clone(),
                });
                *position += 1;
            }
            if records.len() >= MAX_POLL_RECORDS {
                break;
            }
        }
        records
    }

    fn leave(&self, group: &str, member_id: MemberId) {
        let mut groups = self.groups.lock().expect("group lock");
        if let Some(state) = groups.get_mut(group) {
            if state.members.remove(&member_id).is_some() {
                debug!(group, member_id, "member left, redistributing partitions");
                self.redistribute(state);
            }
        }
    }
}

/// One group member's session.
pub struct MemoryConsumer {
    shared: Arc<Shared>,
    group: String,
    member: Option<MemberId>,
    waker: ConsumerWaker,
}

#[async_trait::async_trait]
impl LogConsumer for MemoryConsumer {
    async fn subscribe(
        &mut self,
        topic: &str,
        listener: Arc<dyn RebalanceListener>,
    ) -> Result<()> {
        if topic != self.shared.topic {
            return SubscriptionSnafu {
                message: format!(
                    "unknown topic '{}', this log serves '{}'",
                    topic, self.shared.topic
                ),
            }
            .fail();
        }
        if self.member.is_some() {
            return SubscriptionSnafu {
                message: "consumer is already subscribed".to_string(),
            }
            .fail();
        }

        let member_id = self.shared.next_member.fetch_add(1, Ordering::AcqRel);
        let mut groups = self.shared.groups.lock().expect("group lock");
        let state = groups.entry(self.group.clone()).or_default();
        state.members.insert(
            member_id,
            MemberState {
                assignment: Vec::new(),
                positions: BTreeMap::new(),
                listener,
            },
        );
        self.shared.redistribute(state);
        drop(groups);

        self.member = Some(member_id);
        debug!(group = %self.group, member_id, "consumer joined group");
        Ok(())
    }

    async fn poll(&mut self, timeout: Duration) -> Result<Vec<Record>> {
        let Some(member_id) = self.member else {
            return ClosedSnafu.fail();
        };

        // Zero-timeout polls are liveness probes and must not consume.
        if timeout.is_zero() {
            return Ok(Vec::new());
        }

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.waker.take_woken() {
                return WokenUpSnafu.fail();
            }

            let notified = self.shared.data_notify.notified();
            let records = self.shared.collect(&self.group, member_id);
            if !records.is_empty() {
                return Ok(records);
            }

            tokio::select! {
                _ = notified => {}
                _ = self.waker.woken() => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(Vec::new()),
            }
        }
    }

    async fn commit(&mut self, offsets: &BTreeMap<PartitionId, Offset>) -> Result<()> {
        let Some(_member_id) = self.member else {
            return ClosedSnafu.fail();
        };
        if offsets.is_empty() {
            return Ok(());
        }

        let mut groups = self.shared.groups.lock().expect("group lock");
        let state = groups.entry(self.group.clone()).or_default();
        for (partition, offset) in offsets {
            state.committed.insert(*partition, *offset);
        }
        drop(groups);

        self.shared.commit_calls.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn waker(&self) -> ConsumerWaker {
        self.waker.clone()
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(member_id) = self.member.take() {
            self.shared.leave(&self.group, member_id);
        }
        Ok(())
    }
}

impl Drop for MemoryConsumer {
    fn drop(&mut self) {
        if let Some(member_id) = self.member.take() {
            self.shared.leave(&self.group, member_id);
        }
    }
}

struct InMemoryConsumerFactory {
    log: InMemoryLog,
}

#[async_trait::async_trait]
impl ConsumerFactory for InMemoryConsumerFactory {
    async fn create(&self, properties: &ConsumerProperties) -> Result<Box<dyn LogConsumer>> {
        let Some(group) = properties.get(ConsumerProperties::GROUP_ID) else {
            return InvalidConfigSnafu {
                message: format!("missing '{}'", ConsumerProperties::GROUP_ID),
            }
            .fail();
        };
        Ok(Box::new(MemoryConsumer {
            shared: self.log.shared.clone(),
            group: group.to_string(),
            member: None,
            waker: ConsumerWaker::new(),
        }))
    }
}
