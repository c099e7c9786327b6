//! Connection lifecycle and the public monitor facade.
//!
//! `Co2Monitor` owns the transport, the reading store and the failure
//! counter behind one state mutex; the poll scheduler (see
//! [`crate::poll`]) and every foreground call (connect, disconnect,
//! manual command, clear) run under that same lock, so protocol
//! exchanges are fully serialized. The session token lives in its own
//! tiny lock beside the state mutex: `disconnect()` must be able to
//! cancel an in-flight exchange while a tick still holds the state
//! lock, and the token lock is never held across I/O.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Receiver;
use log::{debug, warn};

use crate::config::MonitorConfig;
use crate::errors::{Error, Result};
use crate::events::{EventBus, MonitorEvent};
use crate::poll::PollHandle;
use crate::protocol::{Command, ABC_OFF, PAYLOAD_LEN};
use crate::session::Session;
use crate::store::{Channel, Reading, ReadingStore};
use crate::token::SessionToken;
use crate::transport::{SerialTransport, Transport};

/// State guarded as one unit by the monitor's mutex.
pub(crate) struct Shared {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) store: ReadingStore,
    /// Consecutive failed reconnect attempts since the last good poll.
    pub(crate) failures: i32,
}

pub(crate) struct MonitorInner {
    pub(crate) config: MonitorConfig,
    pub(crate) state: Mutex<Shared>,
    pub(crate) session: Mutex<SessionToken>,
    pub(crate) events: EventBus,
    pub(crate) polling: AtomicBool,
    /// Lock-free mirror of "a verified connection is live". `disconnect`
    /// consults this instead of the state mutex so it can cancel the
    /// session while a tick still holds that mutex in a slow read.
    pub(crate) connected: AtomicBool,
    pub(crate) poller: Mutex<Option<PollHandle>>,
}

impl MonitorInner {
    pub(crate) fn current_token(&self) -> SessionToken {
        self.session.lock().expect("session lock poisoned").clone()
    }

    /// Replace a cancelled token with a live one and return it. Each
    /// connection lifetime gets its own token this way.
    pub(crate) fn fresh_token(&self) -> SessionToken {
        let mut guard = self.session.lock().expect("session lock poisoned");
        if guard.is_cancelled() {
            *guard = SessionToken::new();
        }
        guard.clone()
    }

    pub(crate) fn cancel_session(&self) {
        self.session.lock().expect("session lock poisoned").cancel();
    }

    /// Open, settle, verify and configure the device. Caller holds the
    /// state lock. `Ok(false)` is the expected "device not found"
    /// outcome; only open/IO errors propagate.
    pub(crate) fn establish(&self, state: &mut Shared, token: &SessionToken) -> Result<bool> {
        self.connected.store(false, Ordering::SeqCst);
        state.transport.open()?;

        // Cheap USB adapters emit garbage right after open; wait, then
        // drop whatever arrived.
        thread::sleep(self.config.settle_delay);
        if let Err(e) = state.transport.discard_input() {
            let _ = state.transport.close();
            return Err(e);
        }

        match self.verify(state, token) {
            Ok(true) => {}
            Ok(false) | Err(Error::Timeout) | Err(Error::Checksum { .. }) => {
                let _ = state.transport.close();
                self.events.log("monitor", "device NOT found");
                return Ok(false);
            }
            Err(e) => {
                let _ = state.transport.close();
                return Err(e);
            }
        }

        self.events.log("monitor", "found the device");
        if self.config.disable_abc {
            self.disable_abc(state, token);
        }

        // A disconnect racing this call wins: it cancelled the token and
        // is waiting on the state lock to close the port behind us.
        if token.is_cancelled() {
            let _ = state.transport.close();
            return Ok(false);
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(true)
    }

    /// The sensor has no identity query that is safe in every firmware,
    /// so verification asks for a reading and then for a replay of the
    /// last response; a real MH-Z19B echoes the same leading payload.
    fn verify(&self, state: &mut Shared, token: &SessionToken) -> Result<bool> {
        let mut session = Session::new(
            state.transport.as_mut(),
            token.clone(),
            self.config.io_timeout,
        );
        let first = session.exchange(Command::GetUnlimited, &[])?;
        let second = session.exchange(Command::RepeatLastResponse, &[])?;
        Ok(first.len() == PAYLOAD_LEN && second.len() == PAYLOAD_LEN && first[..4] == second[..4])
    }

    /// Best-effort: ask the device to switch automatic baseline
    /// correction off, then read the state back. Divergence is logged,
    /// never fatal - some clones acknowledge and ignore the command.
    fn disable_abc(&self, state: &mut Shared, token: &SessionToken) {
        let mut session = Session::new(
            state.transport.as_mut(),
            token.clone(),
            self.config.io_timeout,
        );
        if let Err(e) = session.exchange(Command::SetAbc, &[ABC_OFF]) {
            self.events
                .log("monitor", format!("failed to disable ABC: {e}"));
            return;
        }
        match session.exchange(Command::GetAbc, &[]) {
            Ok(payload) if payload.first() == Some(&0) => {
                debug!("ABC reported disabled");
            }
            Ok(payload) => {
                self.events.log(
                    "monitor",
                    format!("ABC state after disable request: {payload:02x?}"),
                );
            }
            Err(e) => {
                self.events
                    .log("monitor", format!("failed to read back ABC state: {e}"));
            }
        }
    }
}

/// Driver for an MH-Z19B CO2 sensor on a serial line.
///
/// Continuously polls the sensor while connected, accumulates raw,
/// limited and unlimited readings, and silently attempts reconnects
/// (up to a configured limit) when the adapter disappears. Front ends
/// observe it through [`subscribe`](Co2Monitor::subscribe).
pub struct Co2Monitor {
    inner: Arc<MonitorInner>,
}

impl Co2Monitor {
    /// Build a monitor over an arbitrary transport. Tests inject a
    /// scripted one here; real use goes through [`Co2Monitor::open_serial`].
    pub fn new(transport: Box<dyn Transport>, config: MonitorConfig) -> Self {
        let store = ReadingStore::with_capacity(config.initial_capacity);
        Self {
            inner: Arc::new(MonitorInner {
                config,
                state: Mutex::new(Shared {
                    transport,
                    store,
                    failures: 0,
                }),
                session: Mutex::new(SessionToken::new()),
                events: EventBus::new(),
                polling: AtomicBool::new(false),
                connected: AtomicBool::new(false),
                poller: Mutex::new(None),
            }),
        }
    }

    /// Monitor a sensor behind a serial port such as `/dev/ttyUSB0`.
    /// The port is not opened until [`connect`](Co2Monitor::connect).
    pub fn open_serial(path: impl Into<String>, config: MonitorConfig) -> Self {
        let transport = SerialTransport::new(path, config.baud_rate);
        Self::new(Box::new(transport), config)
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    /// Register an event subscriber; see [`MonitorEvent`].
    pub fn subscribe(&self) -> Receiver<MonitorEvent> {
        self.inner.events.subscribe()
    }

    /// Connected means the transport is open and no cancellation has
    /// been requested on the current session token.
    pub fn is_connected(&self) -> bool {
        let state = self.inner.state.lock().expect("state lock poisoned");
        state.transport.is_open() && !self.inner.current_token().is_cancelled()
    }

    pub fn is_polling(&self) -> bool {
        self.inner.polling.load(Ordering::SeqCst)
    }

    /// Open and verify the connection.
    ///
    /// Returns `Ok(true)` once the device answered the verification
    /// pair, `Ok(false)` when the port opened but no sensor responded
    /// (a log event is emitted; the port is closed again). Open
    /// failures propagate. Fails with [`Error::AlreadyConnected`] when
    /// already connected.
    pub fn connect(&self) -> Result<bool> {
        let found = {
            let mut state = self.inner.state.lock().expect("state lock poisoned");
            if state.transport.is_open() && !self.inner.current_token().is_cancelled() {
                return Err(Error::AlreadyConnected);
            }
            let token = self.inner.fresh_token();
            self.inner.establish(&mut state, &token)?
        };

        if found {
            if self.inner.config.auto_start_poll {
                if let Err(e) = self.start_poll() {
                    warn!("auto-start polling failed: {e}");
                }
            }
            self.inner.events.emit(MonitorEvent::Connected);
        }
        Ok(found)
    }

    /// Stop polling, cancel the session and close the transport.
    ///
    /// The precondition is checked against the lock-free connected flag
    /// and the token is cancelled before the poll thread is joined, so
    /// a tick stuck in a slow read lets go promptly instead of holding
    /// this call behind the state lock for a full read timeout. A close
    /// failure is reported through the event bus but does not fail the
    /// call; the `Disconnected` notification fires unconditionally.
    /// Fails with [`Error::AlreadyDisconnected`] when not connected.
    pub fn disconnect(&self) -> Result<()> {
        if !self.inner.connected.swap(false, Ordering::SeqCst) {
            return Err(Error::AlreadyDisconnected);
        }

        self.inner.cancel_session();
        if self.is_polling() {
            let _ = self.stop_poll();
        }

        {
            let mut state = self.inner.state.lock().expect("state lock poisoned");
            if let Err(e) = state.transport.close() {
                self.inner
                    .events
                    .log("monitor", format!("failed to close the port: {e}"));
            }
        }
        self.inner.events.emit(MonitorEvent::Disconnected);
        Ok(())
    }

    /// Start the recurring poll. Requires a verified connection. Like
    /// [`disconnect`](Co2Monitor::disconnect), the precondition reads
    /// the connected flag rather than the state lock, so starting never
    /// stalls behind an in-flight exchange.
    pub fn start_poll(&self) -> Result<()> {
        if self.is_polling() {
            return Err(Error::InvalidState("already polling"));
        }
        if !self.inner.connected.load(Ordering::SeqCst) {
            return Err(Error::InvalidState("cannot poll while disconnected"));
        }

        let mut poller = self.inner.poller.lock().expect("poller lock poisoned");
        // Reap a thread that previously gave up on its own.
        if let Some(old) = poller.take() {
            old.stop();
        }
        self.inner.polling.store(true, Ordering::SeqCst);
        *poller = Some(crate::poll::spawn(Arc::clone(&self.inner)));
        Ok(())
    }

    /// Stop the recurring poll and wait for any in-flight tick.
    pub fn stop_poll(&self) -> Result<()> {
        if !self.inner.polling.swap(false, Ordering::SeqCst) {
            return Err(Error::InvalidState("not polling"));
        }
        let handle = self
            .inner
            .poller
            .lock()
            .expect("poller lock poisoned")
            .take();
        if let Some(handle) = handle {
            handle.stop();
        }
        Ok(())
    }

    /// One-off manual exchange, bypassing the scheduler.
    ///
    /// Rejected while polling: the poll tick issues multi-step
    /// sequences of its own, and the transport cannot carry both.
    pub fn execute_command(&self, cmd: Command, args: &[u8]) -> Result<Vec<u8>> {
        let token = self.inner.current_token();
        let mut state = self.inner.state.lock().expect("state lock poisoned");
        // Checked under the state lock: a start_poll that wins the race
        // to the flag is seen here before any byte hits the wire.
        if self.is_polling() {
            return Err(Error::InvalidState(
                "cannot send a custom command during continuous polling",
            ));
        }
        if !state.transport.is_open() || token.is_cancelled() {
            return Err(Error::InvalidState(
                "cannot send a command to an unconnected device",
            ));
        }
        Session::new(state.transport.as_mut(), token, self.inner.config.io_timeout)
            .exchange(cmd, args)
    }

    /// Snapshot of one channel's readings.
    pub fn readings(&self, channel: Channel) -> Vec<Reading> {
        let state = self.inner.state.lock().expect("state lock poisoned");
        state.store.channel(channel).to_vec()
    }

    /// Run `f` against the store without copying it out. Holds the
    /// state lock, so keep `f` short.
    pub fn with_store<R>(&self, f: impl FnOnce(&ReadingStore) -> R) -> R {
        let state = self.inner.state.lock().expect("state lock poisoned");
        f(&state.store)
    }

    /// Drop all accumulated readings. Serialized against poll ticks by
    /// the state lock, so it never interleaves with a half-written tick.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock().expect("state lock poisoned");
        state.store.clear();
    }
}

impl Drop for Co2Monitor {
    fn drop(&mut self) {
        // Leave no detached poll thread behind.
        self.inner.cancel_session();
        if self.is_polling() {
            let _ = self.stop_poll();
        }
    }
}
