//! CSV export of accumulated readings.
//!
//! Channels are paired index-by-index up to the shortest sequence; each
//! channel contributes a formatted timestamp, elapsed seconds since its
//! own first reading, and the value. Channels that never produced a
//! reading are left out entirely.

use std::io::{self, Write};

use crate::store::{Channel, Reading, ReadingStore};

/// Timestamp column format, down to milliseconds.
pub const DATETIME_FORMAT: &str = "%Y.%m.%d %H:%M:%S%.3f";

/// Write `channels` from `store` as CSV. Column order follows the
/// given channel order.
pub fn write_store_csv<W: Write>(
    out: &mut W,
    store: &ReadingStore,
    channels: &[Channel],
) -> io::Result<()> {
    let labeled: Vec<(&str, &[Reading])> = channels
        .iter()
        .map(|&c| (c.label(), store.channel(c)))
        .collect();
    write_csv(out, &labeled)
}

/// Write labeled reading sequences as CSV rows paired index-by-index.
pub fn write_csv<W: Write>(out: &mut W, channels: &[(&str, &[Reading])]) -> io::Result<()> {
    let populated: Vec<&(&str, &[Reading])> =
        channels.iter().filter(|(_, seq)| !seq.is_empty()).collect();

    let mut header = Vec::new();
    for (label, _) in &populated {
        header.push("DateTime".to_string());
        header.push("TotalSeconds".to_string());
        header.push((*label).to_string());
    }
    writeln!(out, "{}", header.join(","))?;

    let rows = populated
        .iter()
        .map(|(_, seq)| seq.len())
        .min()
        .unwrap_or(0);
    for i in 0..rows {
        let mut fields = Vec::new();
        for (_, seq) in &populated {
            let first = seq[0].timestamp;
            let reading = &seq[i];
            let elapsed = (reading.timestamp - first).num_milliseconds() as f64 / 1000.0;
            fields.push(reading.timestamp.format(DATETIME_FORMAT).to_string());
            fields.push(format!("{elapsed}"));
            fields.push(reading.value.to_string());
        }
        writeln!(out, "{}", fields.join(","))?;
    }
    out.flush()
}
