//! `queue` crate — run dispatch and the worker consumer loop.
//!
//! `RunDispatcher` is the producer side: persist a `pending` run, then
//! enqueue a wakeup message. `Worker` is the consumer side: one task per
//! owned partition, draining messages through `WorkflowExecutor`.
//!
//! "Partition"/"offset" are borrowed from Kafka because that's the likely
//! production backing, but `PartitionedQueue` is the actual contract —
//! anything offering per-key ordering and at-least-once redelivery until
//! commit satisfies it. `InMemoryPartitionedQueue` is the reference
//! implementation used here and in tests.

pub mod dispatcher;
pub mod error;
pub mod message;
pub mod partition;
pub mod worker;

pub use dispatcher::{RunDispatcher, RunSnapshot};
pub use error::QueueError;
pub use message::RunMessage;
pub use partition::{InMemoryPartitionedQueue, OffsetToken, PartitionedQueue};
pub use worker::{Worker, WorkerConfig};
