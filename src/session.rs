//! One checksum-validated request/response exchange.

use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::errors::{Error, Result};
use crate::protocol::{self, Command, FRAME_LEN, PAYLOAD_LEN};
use crate::token::SessionToken;
use crate::transport::Transport;

/// Upper bound on a single blocking transport read, so a cancelled
/// token is noticed mid-wait rather than after the full I/O timeout.
const CANCEL_SLICE: Duration = Duration::from_millis(100);

/// Borrows the transport for the duration of one or more exchanges.
///
/// The caller is expected to hold whatever lock serializes transport
/// access; the session itself only handles framing, accumulation and
/// validation.
pub struct Session<'a> {
    transport: &'a mut dyn Transport,
    token: SessionToken,
    timeout: Duration,
}

impl<'a> Session<'a> {
    pub fn new(transport: &'a mut dyn Transport, token: SessionToken, timeout: Duration) -> Self {
        Self {
            transport,
            token,
            timeout,
        }
    }

    /// Send `cmd` with `args` and read back one validated frame,
    /// returning its six payload bytes (response bytes 2..=7).
    ///
    /// A cancelled token yields an empty payload without touching the
    /// transport; that is the disconnect path, not an error. Fewer than
    /// nine bytes before the deadline is `Error::Timeout`; a frame whose
    /// recomputed checksum disagrees with its byte 8 is `Error::Checksum`.
    pub fn exchange(&mut self, cmd: Command, args: &[u8]) -> Result<Vec<u8>> {
        if self.token.is_cancelled() {
            return Ok(Vec::new());
        }

        let request = protocol::build_request(cmd, args)?;
        self.transport.write(&request, self.timeout)?;

        let mut response = [0u8; FRAME_LEN];
        let mut filled = 0usize;
        let deadline = Instant::now() + self.timeout;

        while filled < FRAME_LEN {
            if self.token.is_cancelled() {
                return Ok(Vec::new());
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(
                    "exchange {:#04x}: {filled}/{FRAME_LEN} bytes before deadline",
                    cmd.code()
                );
                return Err(Error::Timeout);
            }
            let slice = CANCEL_SLICE.min(deadline - now);
            filled += self.transport.read(&mut response[filled..], slice)?;
        }

        let computed = protocol::checksum(&response);
        let received = response[FRAME_LEN - 1];
        if computed != received {
            warn!("checksum error: computed {computed:#04x}, received {received:#04x}");
            return Err(Error::Checksum { computed, received });
        }

        Ok(response[2..2 + PAYLOAD_LEN].to_vec())
    }
}
