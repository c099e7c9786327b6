//! A scripted MH-Z19B stand-in for integration tests.
//!
//! `MockSensor` is the test's handle: it controls whether the "device"
//! is plugged in, what it measures, and whether the next answer gets
//! corrupted. `MockTransport` is the `Transport` the monitor drives;
//! it answers request frames the way a real sensor would.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use co2mon::protocol::{self, Command, ABC_ON, FRAME_LEN};
use co2mon::{MonitorConfig, Result, Transport};

pub struct SensorState {
    /// Whether the host currently holds the port open.
    pub open: bool,
    /// Force `open()` to fail, as if the adapter is gone.
    pub fail_open: bool,
    /// Whether a sensor is attached and answering at all.
    pub present: bool,
    pub co2: u16,
    pub raw_co2: u16,
    pub abc_enabled: bool,
    /// Corrupt one payload byte of the next response.
    pub corrupt_next: bool,
    pub open_attempts: usize,
    last_response: Option<[u8; FRAME_LEN]>,
    rx: VecDeque<u8>,
}

#[derive(Clone)]
pub struct MockSensor(Arc<Mutex<SensorState>>);

impl MockSensor {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(SensorState {
            open: false,
            fail_open: false,
            present: true,
            co2: 600,
            raw_co2: 4200,
            abc_enabled: true,
            corrupt_next: false,
            open_attempts: 0,
            last_response: None,
            rx: VecDeque::new(),
        })))
    }

    pub fn state(&self) -> MutexGuard<'_, SensorState> {
        self.0.lock().unwrap()
    }

    /// Yank the adapter: port reads as closed and reopening fails.
    pub fn unplug(&self) {
        let mut s = self.state();
        s.open = false;
        s.fail_open = true;
        s.present = false;
        s.rx.clear();
    }

    pub fn transport(&self) -> MockTransport {
        MockTransport(self.clone())
    }

    fn respond(state: &mut SensorState, request: &[u8; FRAME_LEN]) {
        if !state.present {
            return;
        }
        if protocol::checksum(request) != request[FRAME_LEN - 1] {
            return;
        }

        let cmd = request[2];
        if cmd == Command::RepeatLastResponse.code() {
            if let Some(frame) = state.last_response {
                state.rx.extend(frame);
            }
            return;
        }

        let mut payload = [0u8; 6];
        if cmd == Command::GetRaw.code() {
            payload[..2].copy_from_slice(&state.raw_co2.to_be_bytes());
        } else if cmd == Command::GetLimited.code() {
            payload[..2].copy_from_slice(&state.co2.to_be_bytes());
            payload[2] = 0x40; // temperature + 40
        } else if cmd == Command::GetUnlimited.code() {
            payload[2..4].copy_from_slice(&state.co2.to_be_bytes());
        } else if cmd == Command::SetAbc.code() {
            state.abc_enabled = request[3] == ABC_ON;
        } else if cmd == Command::GetAbc.code() {
            payload[0] = state.abc_enabled as u8;
        } else if cmd == Command::GetFirmwareVersion.code() {
            payload.copy_from_slice(b"0443\0\0");
        }

        let mut frame = [0u8; FRAME_LEN];
        frame[0] = 0xFF;
        frame[1] = cmd;
        frame[2..8].copy_from_slice(&payload);
        frame[8] = protocol::checksum(&frame);
        state.last_response = Some(frame);

        if state.corrupt_next {
            state.corrupt_next = false;
            frame[4] ^= 0x55;
        }
        state.rx.extend(frame);
    }
}

pub struct MockTransport(MockSensor);

impl Transport for MockTransport {
    fn open(&mut self) -> Result<()> {
        let mut s = self.0.state();
        s.open_attempts += 1;
        if s.fail_open {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no such device",
            )
            .into());
        }
        s.open = true;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut s = self.0.state();
        s.open = false;
        s.rx.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.0.state().open
    }

    fn write(&mut self, buf: &[u8], _timeout: Duration) -> Result<usize> {
        let mut s = self.0.state();
        if let Ok(request) = <[u8; FRAME_LEN]>::try_from(buf) {
            MockSensor::respond(&mut s, &request);
        }
        Ok(buf.len())
    }

    fn read(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        {
            let mut s = self.0.state();
            if !s.rx.is_empty() {
                let mut n = 0;
                while n < buf.len() {
                    match s.rx.pop_front() {
                        Some(b) => {
                            buf[n] = b;
                            n += 1;
                        }
                        None => break,
                    }
                }
                return Ok(n);
            }
        }
        // Nothing buffered: block like a real port would.
        thread::sleep(timeout);
        Ok(0)
    }

    fn discard_input(&mut self) -> Result<()> {
        self.0.state().rx.clear();
        Ok(())
    }
}

/// Config with timings tightened for tests.
pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        poll_interval: Duration::from_millis(20),
        io_timeout: Duration::from_millis(50),
        settle_delay: Duration::ZERO,
        initial_capacity: 16,
        reconnect_limit: 5,
        ..Default::default()
    }
}

/// Poll `cond` until it holds or `timeout` elapses.
pub fn wait_for(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    cond()
}
