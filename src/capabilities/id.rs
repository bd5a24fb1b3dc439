//! Id generation as a collaborator interface. The SQLite store assigns its own primary keys via
//! `AUTOINCREMENT`; this generator is for identifiers the core hands out itself — session ids and
//! tool-execution correlation ids — where tests need predictable values.

use std::sync::atomic::{AtomicI64, Ordering};

pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> i64;
}

#[derive(Debug)]
pub struct MonotonicIdGenerator {
    counter: AtomicI64,
}

impl MonotonicIdGenerator {
    pub fn new() -> Self {
        Self { counter: AtomicI64::new(1) }
    }
}

impl Default for MonotonicIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator for MonotonicIdGenerator {
    fn next_id(&self) -> i64 {
        self.counter.fetch_add(1, Ordering::SeqCst)
    }
}
