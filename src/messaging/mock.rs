//! Dispatcher that records instead of sending.

use super::{DispatchError, Dispatcher, Message, Recipients};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub plaintext: String,
    pub rich: String,
    pub recipients: Recipients,
}

#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    deliveries: Mutex<Vec<Delivery>>,
    fail_next: AtomicUsize,
    failing: AtomicBool,
    attempts: AtomicUsize,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` sends, then recover.
    pub fn failing_times(self, n: usize) -> Self {
        self.fail_next.store(n, Ordering::SeqCst);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn plaintexts(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| d.plaintext.clone())
            .collect()
    }

    /// Successful sends.
    pub fn count(&self) -> usize {
        self.deliveries.lock().len()
    }

    /// Every send, including the failed ones.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dispatcher for RecordingDispatcher {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(
        &self,
        message: &dyn Message,
        recipients: &Recipients,
    ) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let scripted_failure = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scripted_failure || self.failing.load(Ordering::SeqCst) {
            return Err(DispatchError::Rejected {
                channel: "recording",
                reason: "scripted failure".to_string(),
            });
        }
        self.deliveries.lock().push(Delivery {
            plaintext: message.render_plaintext(),
            rich: message.render_rich(),
            recipients: recipients.clone(),
        });
        Ok(())
    }
}
