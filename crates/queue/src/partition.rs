//! The `PartitionedQueue` contract and its in-process implementation.
//!
//! "Partition" and "offset" borrow Kafka's vocabulary because that is the
//! production backing most deployments would choose, but nothing here
//! depends on Kafka: any backing store that offers per-key ordering and
//! at-least-once redelivery until commit satisfies the contract.

use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::RunMessage;

/// Identifies one in-flight (polled, not yet committed) message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetToken {
    pub partition: u64,
    pub sequence: u64,
}

/// A per-key-ordered, at-least-once message queue.
///
/// Messages sharing a `key` are always delivered to the same partition and
/// preserve relative order. A message polled but never committed (worker
/// crash, lost lease) is redelivered once `requeue_uncommitted` runs.
#[async_trait]
pub trait PartitionedQueue: Send + Sync {
    async fn enqueue(&self, key: &str, message: RunMessage);

    /// Poll the next undelivered message on `partition`, marking it
    /// in-flight. Returns `None` if the partition is empty.
    async fn poll(&self, partition: u64) -> Option<(RunMessage, OffsetToken)>;

    /// Acknowledge a message, permanently removing it from the queue.
    async fn commit(&self, token: OffsetToken);

    /// Which partition a given key is assigned to.
    fn partition_for_key(&self, key: &str) -> u64;

    fn partition_count(&self) -> u64;
}

struct Entry {
    sequence: u64,
    message: RunMessage,
    inflight: bool,
}

/// In-process `PartitionedQueue`, partitions keyed by `tenant_id:run_id`
/// hashed into a fixed shard count.
pub struct InMemoryPartitionedQueue {
    shards: Vec<Mutex<VecDeque<Entry>>>,
    next_sequence: std::sync::atomic::AtomicU64,
}

impl InMemoryPartitionedQueue {
    pub fn new(partition_count: u64) -> Self {
        let mut shards = Vec::with_capacity(partition_count as usize);
        for _ in 0..partition_count {
            shards.push(Mutex::new(VecDeque::new()));
        }
        Self {
            shards,
            next_sequence: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Requeue every still-in-flight message across all partitions,
    /// modeling redelivery after a worker crash. There is no real process
    /// failure here; a caller invokes this explicitly to simulate one.
    pub async fn requeue_uncommitted(&self) {
        for shard in &self.shards {
            let mut guard = shard.lock().await;
            for entry in guard.iter_mut() {
                entry.inflight = false;
            }
        }
    }
}

#[async_trait]
impl PartitionedQueue for InMemoryPartitionedQueue {
    async fn enqueue(&self, key: &str, message: RunMessage) {
        let partition = self.partition_for_key(key);
        let sequence = self.next_sequence.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut guard = self.shards[partition as usize].lock().await;
        guard.push_back(Entry { sequence, message, inflight: false });
    }

    async fn poll(&self, partition: u64) -> Option<(RunMessage, OffsetToken)> {
        let mut guard = self.shards[partition as usize].lock().await;
        let entry = guard.iter_mut().find(|e| !e.inflight)?;
        entry.inflight = true;
        Some((
            entry.message.clone(),
            OffsetToken { partition, sequence: entry.sequence },
        ))
    }

    async fn commit(&self, token: OffsetToken) {
        let mut guard = self.shards[token.partition as usize].lock().await;
        guard.retain(|e| e.sequence != token.sequence);
    }

    fn partition_for_key(&self, key: &str) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish() % self.partition_count()
    }

    fn partition_count(&self) -> u64 {
        self.shards.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn message() -> RunMessage {
        RunMessage {
            run_id: Uuid::new_v4(),
            workflow_id: Uuid::new_v4(),
            workflow_version: 1,
            tenant_id: Uuid::new_v4(),
            mode: engine::RunMode::Manual,
            input: json!({}),
            queued_at: Utc::now(),
            metadata: json!({}),
        }
    }

    #[tokio::test]
    async fn same_key_lands_on_same_partition() {
        let queue = InMemoryPartitionedQueue::new(8);
        let p1 = queue.partition_for_key("tenant:run-a");
        let p2 = queue.partition_for_key("tenant:run-a");
        assert_eq!(p1, p2);
    }

    #[tokio::test]
    async fn poll_without_commit_is_redelivered_after_requeue() {
        let queue = InMemoryPartitionedQueue::new(1);
        queue.enqueue("k", message()).await;

        let (_, token) = queue.poll(0).await.expect("message present");
        assert!(queue.poll(0).await.is_none(), "in-flight message must not be redelivered");

        queue.requeue_uncommitted().await;
        let (_, token2) = queue.poll(0).await.expect("requeued message redelivered");
        assert_eq!(token.sequence, token2.sequence);
    }

    #[tokio::test]
    async fn commit_removes_message_permanently() {
        let queue = InMemoryPartitionedQueue::new(1);
        queue.enqueue("k", message()).await;
        let (_, token) = queue.poll(0).await.unwrap();
        queue.commit(token).await;

        queue.requeue_uncommitted().await;
        assert!(queue.poll(0).await.is_none());
    }
}
