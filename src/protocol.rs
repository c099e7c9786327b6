//! MH-Z19B wire protocol: 9-byte frames and their checksum.
//!
//! Both directions share the same layout. A request is
//! `[0xFF, 0x01, cmd, a0..a4, crc]`; a response echoes the command in
//! byte 1 and carries up to six result bytes in bytes 2..=7. The
//! checksum covers bytes 1..=7 only - neither the address byte nor the
//! checksum itself.

use crate::errors::{Error, Result};

/// Every frame on the wire, request or response, is exactly this long.
pub const FRAME_LEN: usize = 9;

/// A request addresses all sensors on the line.
pub const ADDRESS_BROADCAST: u8 = 0xFF;

/// Inbound control command prefix (request byte 1).
pub const REQUEST_PREFIX: u8 = 0x01;

/// Request bytes 3..=7 carry arguments, so at most five of them.
pub const MAX_REQUEST_ARGS: usize = 5;

/// Length of the result payload cut out of a response (bytes 2..=7).
pub const PAYLOAD_LEN: usize = 6;

/// `SetAbc` argument byte that turns automatic baseline correction on.
pub const ABC_ON: u8 = 0xA0;
/// `SetAbc` argument byte that turns automatic baseline correction off.
pub const ABC_OFF: u8 = 0x00;

/// Command codes understood by the MH-Z19B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Change operation mode and perform an MCU reset.
    RecoveryReset = 0x78,
    /// Turn automatic baseline correction on or off (arg 0: 0xA0 on, 0x00 off).
    SetAbc = 0x79,
    /// Query ABC state (payload byte 0: 1 enabled, 0 disabled).
    GetAbc = 0x7D,
    /// Raw CO2 concentration.
    GetRaw = 0x84,
    /// Temperature (float) and unclipped CO2.
    GetUnlimited = 0x85,
    /// Temperature (integer) and clipped CO2.
    GetLimited = 0x86,
    /// Zero-point calibration.
    CalibrateZero = 0x87,
    /// Span calibration.
    CalibrateSpan = 0x88,
    /// Set the detection range.
    SetRange = 0x99,
    /// Query the detection range.
    GetRange = 0x9B,
    /// Query the background CO2 level.
    GetBackground = 0x9C,
    /// Query the firmware version string.
    GetFirmwareVersion = 0xA0,
    /// Ask the sensor to resend its previous response verbatim.
    RepeatLastResponse = 0xA2,
    /// Query the temperature calibration.
    GetTempCalibration = 0xA3,
}

impl Command {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Two's-complement style checksum over the command/argument region.
///
/// Sum of bytes 1..=7 mod 256, inverted against 0xFF, plus one (which
/// may wrap back to zero). Pure and deterministic for any frame.
pub fn checksum(frame: &[u8; FRAME_LEN]) -> u8 {
    let mut sum: u8 = 0;
    for &b in &frame[1..FRAME_LEN - 1] {
        sum = sum.wrapping_add(b);
    }
    (0xFFu8.wrapping_sub(sum)).wrapping_add(1)
}

/// Build an outgoing request frame for `cmd` with up to five argument
/// bytes, zero-padded, checksummed over bytes 1..=7.
pub fn build_request(cmd: Command, args: &[u8]) -> Result<[u8; FRAME_LEN]> {
    if args.len() > MAX_REQUEST_ARGS {
        return Err(Error::Argument(format!(
            "at most {MAX_REQUEST_ARGS} argument bytes allowed, got {}",
            args.len()
        )));
    }

    let mut frame = [0u8; FRAME_LEN];
    frame[0] = ADDRESS_BROADCAST;
    frame[1] = REQUEST_PREFIX;
    frame[2] = cmd.code();
    frame[3..3 + args.len()].copy_from_slice(args);
    frame[FRAME_LEN - 1] = checksum(&frame);
    Ok(frame)
}
