/// RS485 bus probe
///
/// Loads a bus configuration, discovers devices whose address is not fixed,
/// then reads and prints each device's register table.
///
/// Usage: rtu_probe <config.yaml> [--log-packets] [--log-frames]

use anyhow::{bail, Context, Result};
use tracing::{error, info, warn};

use rs485_rtu::config::BusConfig;
use rs485_rtu::transport::SerialRtuPort;
use rs485_rtu::utils::format::format_metrics;
use rs485_rtu::{FrameLogger, LoggingMode, RtuMaster};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: rtu_probe <config.yaml> [--log-packets] [--log-frames]");
    };
    let flags: Vec<String> = args.collect();
    let log_packets = flags.iter().any(|arg| arg == "--log-packets");
    let log_frames = flags.iter().any(|arg| arg == "--log-frames");

    info!("{}", rs485_rtu::info());

    let config = BusConfig::from_file(&path)
        .with_context(|| format!("loading bus configuration from {}", path))?;
    let port = SerialRtuPort::open(&config.serial)
        .with_context(|| format!("opening serial port {}", config.serial.port))?;

    let mut master = RtuMaster::with_config(port, config.master);
    if log_packets {
        master.set_packet_logging(true);
    }
    if log_frames {
        master.set_logger(Some(FrameLogger::facade(LoggingMode::Interpreted)));
    }

    info!("Polling {} device(s) on {}", config.devices.len(), config.serial.port);

    for device in &config.devices {
        let address = match device.address {
            Some(address) => address,
            None => {
                info!(
                    "Scanning {}-{} for '{}'",
                    device.scan_range.start, device.scan_range.end, device.name
                );
                match master.scan(device.scan_range, &device.probe_spec()) {
                    Some(address) => address,
                    None => {
                        warn!("Device '{}' not found", device.name);
                        continue;
                    }
                }
            }
        };

        match master.read_map(address, &device.block, &device.registers) {
            Ok(values) => {
                println!("{} (address {}):", device.name, address);
                for (name, value) in values {
                    println!("  {:<20} {:.3}", name, value);
                }
            }
            Err(e) => error!("Device '{}' at address {}: {}", device.name, address, e),
        }
    }

    println!("{}", format_metrics(master.metrics()));
    Ok(())
}
