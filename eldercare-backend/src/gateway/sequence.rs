use std::sync::atomic::{AtomicI64, Ordering};

/// Process-wide monotonic message id source.
/// Seeded from the highest id already stored or relayed, so ids never repeat
/// across restarts.
#[derive(Debug)]
pub struct MessageSequence {
    last: AtomicI64,
}

impl MessageSequence {
    pub fn starting_after(last_used: i64) -> Self {
        Self {
            last: AtomicI64::new(last_used.max(0)),
        }
    }

    pub fn next(&self) -> i64 {
        self.last.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> i64 {
        self.last.load(Ordering::SeqCst)
    }
}
