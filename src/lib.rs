//! Driver for the MH-Z19B NDIR CO2 sensor over a serial line.
//!
//! The sensor speaks a fixed 9-byte request/response protocol with an
//! 8-bit checksum and never initiates traffic on its own, so the
//! monitor polls it on a timer, accumulates the three measurement
//! channels (raw, limited, unlimited) as time series, and rides out
//! transient unplugs of the USB serial adapter with bounded silent
//! reconnection attempts.
//!
//! # Example
//! ```no_run
//! use co2mon::{Co2Monitor, MonitorConfig, MonitorEvent};
//!
//! let monitor = Co2Monitor::open_serial("/dev/ttyUSB0", MonitorConfig::default());
//! let events = monitor.subscribe();
//!
//! if monitor.connect()? {
//!     monitor.start_poll()?;
//!     while let Ok(event) = events.recv() {
//!         if let MonitorEvent::NewData(point) = event {
//!             println!("{}: {} ppm", point.timestamp, point.limited);
//!         }
//!     }
//! }
//! # Ok::<(), co2mon::Error>(())
//! ```

mod config;
mod errors;
mod events;
pub mod export;
pub mod logging;
mod monitor;
mod poll;
pub mod protocol;
mod session;
mod store;
mod token;
mod transport;

pub use config::MonitorConfig;
pub use errors::{Error, Result};
pub use events::{DataPoint, EventBus, MonitorEvent};
pub use monitor::Co2Monitor;
pub use protocol::Command;
pub use session::Session;
pub use store::{Channel, Reading, ReadingStore};
pub use token::SessionToken;
pub use transport::{SerialTransport, Transport};
