use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::exit;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;

use co2mon::{Channel, Co2Monitor, MonitorConfig, MonitorEvent};

#[derive(Parser, Debug)]
#[command(name = "co2mon", about = "Poll an MH-Z19B CO2 sensor over a serial port")]
struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0 or COM3)
    port: String,
    /// Serial baud rate
    #[arg(long, default_value_t = 9600)]
    baud: u32,
    /// Seconds between polls
    #[arg(long, default_value_t = 1.0)]
    interval: f64,
    /// How long to poll before exiting, in seconds (0 = until Ctrl-C)
    #[arg(long, default_value_t = 60.0)]
    duration: f64,
    /// Write the accumulated readings to this CSV file on exit
    #[arg(long)]
    csv: Option<PathBuf>,
    /// Leave the sensor's automatic baseline correction enabled
    #[arg(long)]
    keep_abc: bool,
}

fn main() {
    co2mon::logging::init();
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let config = MonitorConfig {
        baud_rate: args.baud,
        poll_interval: Duration::from_secs_f64(args.interval),
        disable_abc: !args.keep_abc,
        ..Default::default()
    };

    let monitor = Co2Monitor::open_serial(&args.port, config);
    let events = monitor.subscribe();

    println!("Connecting to {}...", args.port);
    if !monitor.connect()? {
        bail!("no MH-Z19B found on {}", args.port);
    }
    monitor.start_poll()?;
    println!("Polling every {:.1}s. Ctrl-C to stop.", args.interval);

    let deadline = (args.duration > 0.0).then(|| Instant::now() + Duration::from_secs_f64(args.duration));
    loop {
        if let Some(deadline) = deadline {
            if Instant::now() >= deadline {
                break;
            }
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(MonitorEvent::NewData(point)) => {
                println!(
                    "{} | raw {:5} | limited {:5} ppm | unlimited {:5} ppm",
                    point.timestamp.format("%H:%M:%S"),
                    point.raw,
                    point.limited,
                    point.unlimited
                );
            }
            Ok(MonitorEvent::Connected) => println!("[device connected]"),
            Ok(MonitorEvent::Disconnected) => {
                println!("[device disconnected]");
                if !monitor.is_polling() {
                    // The scheduler gave up on reconnecting.
                    break;
                }
            }
            Ok(MonitorEvent::Log { source, message }) => {
                log::debug!("{source}: {message}");
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        }
    }

    if monitor.is_polling() {
        monitor.stop_poll()?;
    }

    if let Some(path) = &args.csv {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut out = BufWriter::new(file);
        monitor.with_store(|store| {
            co2mon::export::write_store_csv(&mut out, store, &Channel::ALL)
        })?;
        println!("Wrote {}", path.display());
    }

    if monitor.is_connected() {
        monitor.disconnect()?;
    }
    println!("Done.");
    Ok(())
}
