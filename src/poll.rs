//! Recurring poll scheduler.
//!
//! One background thread doubles as the timer: it sleeps on a stop
//! channel with the poll interval as the timeout, so a stop request and
//! the next tick share a single wait. Each tick runs under the
//! monitor's state lock and therefore never overlaps another tick, a
//! store clear or a foreground command. A stalled transport delays the
//! following ticks rather than piling them up.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use chrono::Local;
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use log::{debug, warn};

use crate::errors::Result;
use crate::events::{DataPoint, MonitorEvent};
use crate::monitor::{MonitorInner, Shared};
use crate::protocol::Command;
use crate::session::Session;
use crate::store::Channel;
use crate::token::SessionToken;

pub(crate) struct PollHandle {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

impl PollHandle {
    /// Signal the scheduler and wait for it to wind down. Joining is
    /// bounded by one in-flight exchange at most.
    pub(crate) fn stop(self) {
        let _ = self.stop_tx.send(());
        let _ = self.thread.join();
    }
}

pub(crate) fn spawn(inner: Arc<MonitorInner>) -> PollHandle {
    let (stop_tx, stop_rx) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name("co2mon-poll".into())
        .spawn(move || {
            loop {
                match stop_rx.recv_timeout(inner.config.poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => {}
                }
                if !inner.polling.load(Ordering::SeqCst) {
                    break;
                }
                if tick(&inner) == TickOutcome::GiveUp {
                    give_up(&inner);
                    break;
                }
            }
            debug!("poll thread exiting");
        })
        .expect("failed to spawn the poll thread");
    PollHandle { stop_tx, thread }
}

#[derive(Debug, PartialEq, Eq)]
enum TickOutcome {
    Continue,
    GiveUp,
}

fn tick(inner: &MonitorInner) -> TickOutcome {
    let token = inner.current_token();
    let mut state = inner.state.lock().expect("state lock poisoned");

    // A disconnect may have fired between the timer and this lock.
    if token.is_cancelled() {
        return TickOutcome::Continue;
    }

    if state.transport.is_open() {
        state.failures = 0;
        match poll_once(&mut state, &token, inner) {
            Ok(Some(point)) => inner.events.emit(MonitorEvent::NewData(point)),
            // Cancelled mid-tick; the disconnect path owns the cleanup.
            Ok(None) => {}
            Err(e) => {
                warn!("poll tick failed: {e}");
                inner
                    .events
                    .log("poller", format!("failed to poll the device: {e}"));
            }
        }
        return TickOutcome::Continue;
    }

    // Serial adapter vanished: bounded reconnection attempts.
    if !inner.config.may_retry(state.failures) {
        return TickOutcome::GiveUp;
    }
    state.failures += 1;
    let attempt = state.failures;
    inner
        .events
        .log("poller", format!("reconnect attempt {attempt}"));
    let token = inner.fresh_token();
    match inner.establish(&mut state, &token) {
        Ok(true) => {
            drop(state);
            inner.events.emit(MonitorEvent::Connected);
        }
        Ok(false) => {}
        Err(e) => {
            // Same connect logic as the manual path, but failures here
            // never escape the timer.
            debug!("reconnect attempt {attempt} failed: {e}");
        }
    }
    TickOutcome::Continue
}

/// Three sequential exchanges under one timestamp. Each value is
/// appended as soon as it arrives, so a failure mid-tick leaves the
/// channels at different lengths; consumers pair by the shortest.
fn poll_once(
    state: &mut Shared,
    token: &SessionToken,
    inner: &MonitorInner,
) -> Result<Option<DataPoint>> {
    let timestamp = Local::now();
    let Shared {
        transport, store, ..
    } = state;
    let mut session = Session::new(transport.as_mut(), token.clone(), inner.config.io_timeout);

    let Some(raw) = read_value(&mut session, Command::GetRaw, 0)? else {
        return Ok(None);
    };
    store.append(Channel::Raw, timestamp, raw);

    let Some(limited) = read_value(&mut session, Command::GetLimited, 0)? else {
        return Ok(None);
    };
    store.append(Channel::Limited, timestamp, limited);

    let Some(unlimited) = read_value(&mut session, Command::GetUnlimited, 2)? else {
        return Ok(None);
    };
    store.append(Channel::Unlimited, timestamp, unlimited);

    Ok(Some(DataPoint {
        timestamp,
        raw,
        limited,
        unlimited,
    }))
}

/// One exchange plus the big-endian u16 sitting at `offset` in the
/// payload. `None` means the session was cancelled mid-flight.
fn read_value(session: &mut Session<'_>, cmd: Command, offset: usize) -> Result<Option<u16>> {
    let payload = session.exchange(cmd, &[])?;
    if payload.is_empty() {
        return Ok(None);
    }
    // A non-empty payload is always PAYLOAD_LEN bytes.
    Ok(Some(u16::from_be_bytes([
        payload[offset],
        payload[offset + 1],
    ])))
}

/// Terminal path: the failure limit is reached, so polling stops for
/// good and the connection is torn down without the usual
/// already-disconnected precondition.
fn give_up(inner: &MonitorInner) {
    inner.polling.store(false, Ordering::SeqCst);
    inner.connected.store(false, Ordering::SeqCst);
    inner.cancel_session();
    {
        let mut state = inner.state.lock().expect("state lock poisoned");
        if let Err(e) = state.transport.close() {
            debug!("close after give-up failed: {e}");
        }
    }
    inner.events.log(
        "poller",
        "reconnect limit reached, polling stopped permanently",
    );
    inner.events.emit(MonitorEvent::Disconnected);
}
