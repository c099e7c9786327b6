//! Cancellation scope tied to one connection's lifetime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation signal shared between the session, the poll scheduler
/// and `disconnect()`.
///
/// A fresh token is installed on every successful (re)connect. Once
/// cancelled it stays cancelled: every in-flight and future exchange on
/// it short-circuits to an empty payload without touching the transport.
#[derive(Debug, Clone, Default)]
pub struct SessionToken {
    cancelled: Arc<AtomicBool>,
}

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
