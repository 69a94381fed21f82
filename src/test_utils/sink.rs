use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    sink::{Sink, SinkError},
    types::EventRecord,
};

/// [`Sink`] that keeps records in memory and can be told to reject writes.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<EventRecord>>,
    failing: AtomicUsize,
    attempts: AtomicUsize,
}

impl MemorySink {
    /// Rejects the next `times` writes.
    pub fn fail_next(&self, times: usize) {
        self.failing.store(times, Ordering::SeqCst);
    }

    /// Writes attempted so far, rejected ones included.
    #[must_use]
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn records(&self) -> Vec<EventRecord> {
        self.records.lock().clone()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, record: &EventRecord, _token: &CancellationToken) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let rejected = self
            .failing
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if rejected {
            return Err(SinkError::Rejected("memory sink told to fail".into()));
        }
        self.records.lock().push(record.clone());
        Ok(())
    }
}
