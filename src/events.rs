//! Outbound notifications for front ends (UI, CLI, loggers).
//!
//! Everything the core wants a consumer to see flows through one
//! `EventBus`. Delivery is a non-blocking send on an unbounded channel,
//! so a slow subscriber can never stall a poll tick; consumers marshal
//! the receiver onto whatever thread suits them.

use std::sync::Mutex;

use chrono::{DateTime, Local};
use crossbeam_channel::{unbounded, Receiver, Sender};

/// The three values produced by one successful poll tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DataPoint {
    pub timestamp: DateTime<Local>,
    pub raw: u16,
    pub limited: u16,
    pub unlimited: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    NewData(DataPoint),
    Connected,
    Disconnected,
    Log { source: &'static str, message: String },
}

/// Fan-out point for `MonitorEvent`s; any number of subscribers.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Sender<MonitorEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber. The receiver is independent of all
    /// others; dropping it unsubscribes on the next emit.
    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .expect("event bus lock poisoned")
            .push(tx);
        rx
    }

    pub fn emit(&self, event: MonitorEvent) {
        let mut subscribers = self.subscribers.lock().expect("event bus lock poisoned");
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Convenience for the diagnostic stream mirrored into `log`.
    pub fn log(&self, source: &'static str, message: impl Into<String>) {
        let message = message.into();
        log::info!(target: "co2mon", "[{source}] {message}");
        self.emit(MonitorEvent::Log { source, message });
    }
}
