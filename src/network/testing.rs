//! Test doubles for the controller's collaborators.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::network::outbox::{MessageSink, SinkError};
use crate::network::protocol::OutboundMessage;
use crate::persistence::store::{KeyValueStore, MemoryStore, StoreError};

/// Sink that records everything it accepts. Clones share the record.
#[derive(Clone, Default)]
pub struct RecordingSink {
    sent: Arc<Mutex<Vec<OutboundMessage>>>,
    failures_left: Arc<AtomicUsize>,
    attempts: Arc<AtomicUsize>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `failures` sends.
    pub fn failing(failures: usize) -> Self {
        let sink = Self::new();
        sink.fail_next(failures);
        sink
    }

    pub fn fail_next(&self, failures: usize) {
        self.failures_left.store(failures, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.sent.lock().unwrap().iter().map(|m| m.kind()).collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

impl MessageSink for RecordingSink {
    fn send(&mut self, message: &OutboundMessage) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.failures_left.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_left.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Other("injected failure".to_string()));
        }
        self.sent.lock().unwrap().push(message.clone());
        Ok(())
    }
}

/// Memory store whose reads and writes can be switched to fail.
/// Clones share contents and switches.
#[derive(Clone, Default)]
pub struct FlakyStore {
    inner: Arc<Mutex<MemoryStore>>,
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Read bypassing the failure switch.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).unwrap()
    }

    /// Write bypassing the failure switch.
    pub fn put(&self, key: &str, value: &str) {
        self.inner.lock().unwrap().set(key, Some(value)).unwrap();
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Read("injected read failure".to_string()));
        }
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: Option<&str>) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Write("injected write failure".to_string()));
        }
        self.inner.set(key, value)
    }
}
