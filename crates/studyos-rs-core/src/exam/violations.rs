//! Monotonic violation counting.

use serde::Serialize;
use std::sync::atomic::{AtomicU32, Ordering};

/// One recorded integrity violation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Violation {
    /// 1-based position within the session.
    pub sequence: u32,
    pub reason: String,
}

/// Per-session counter updated with atomic read-modify-write.
#[derive(Debug, Default)]
pub struct ViolationCounter {
    count: AtomicU32,
}

impl ViolationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one violation and return the new count.
    pub fn record(&self) -> u32 {
        self.count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn get(&self) -> u32 {
        self.count.load(Ordering::Acquire)
    }

    pub fn reset(&self) {
        self.count.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::ViolationCounter;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_records_are_not_lost() {
        let counter = Arc::new(ViolationCounter::new());
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        counter.record();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().expect("join");
        }
        assert_eq!(counter.get(), 800);
        counter.reset();
        assert_eq!(counter.record(), 1);
    }
}
