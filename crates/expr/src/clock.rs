//! Injected time/ID sources.
//!
//! `now()` and `uuid()` never call `Utc::now()` / `Uuid::new_v4()` directly —
//! they read from a `Clock`/`IdSource` passed in at evaluation time, so that
//! fixed-input determinism (spec §8) is testable.

use chrono::{DateTime, Utc};

/// Source of the current time for the `now()` builtin.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Source of fresh identifiers for the `uuid()` builtin.
pub trait IdSource: Send + Sync {
    fn next_uuid(&self) -> uuid::Uuid;
}

/// The real, wall-clock implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// The real, random-uuid implementation used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemIdSource;

impl IdSource for SystemIdSource {
    fn next_uuid(&self) -> uuid::Uuid {
        uuid::Uuid::new_v4()
    }
}

/// A fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A fixed id source for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedIdSource(pub uuid::Uuid);

impl IdSource for FixedIdSource {
    fn next_uuid(&self) -> uuid::Uuid {
        self.0
    }
}
