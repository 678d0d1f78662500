use anyhow::{Context, Result};
use clap::Parser;
use flexi_logger::{Logger, LoggerHandle};
use log::*;
use pylonbridge_lib::dispatcher::{CanTransport, PylonInverter};
use pylonbridge_lib::protocol::{CanFrame, FrameKind, FrameTable};
use std::{ops::Deref, panic};

mod commandline;

use commandline::{CliArgs, CliCommands};

fn logging_init(loglevel: LevelFilter) -> LoggerHandle {
    let log_handle = Logger::try_with_env_or_str(loglevel.as_str())
        .expect("Cannot init logging")
        .start()
        .expect("Cannot start logging");

    panic::set_hook(Box::new(|panic_info| {
        let (filename, line, column) = panic_info
            .location()
            .map(|loc| (loc.file(), loc.line(), loc.column()))
            .unwrap_or(("<unknown>", 0, 0));
        let cause = panic_info
            .payload()
            .downcast_ref::<String>()
            .map(String::deref);
        let cause = cause.unwrap_or_else(|| {
            panic_info
                .payload()
                .downcast_ref::<&str>()
                .copied()
                .unwrap_or("<cause unknown>")
        });

        error!(
            "Thread '{}' panicked at {}:{}:{}: {}",
            std::thread::current().name().unwrap_or("<unknown>"),
            filename,
            line,
            column,
            cause
        );
    }));
    log_handle
}

/// Transport that prints every frame to standard output instead of putting it
/// on a CAN bus.
struct ConsoleTransport {
    json: bool,
}

impl ConsoleTransport {
    fn print(&self, frame: &CanFrame) -> Result<(), std::io::Error> {
        if self.json {
            let line = serde_json::to_string(frame).map_err(std::io::Error::other)?;
            println!("{line}");
        } else {
            println!("{:04X}: {:02X?}", frame.id, frame.data);
        }
        Ok(())
    }
}

impl CanTransport for ConsoleTransport {
    fn transmit(&mut self, frame: &CanFrame) -> Result<(), pylonbridge_lib::Error> {
        self.print(frame).map_err(Into::into)
    }
}

fn print_frames(table: &FrameTable, kinds: &[FrameKind], json: bool) -> Result<()> {
    let console = ConsoleTransport { json };
    for frame in table.frames(kinds) {
        console.print(&frame).with_context(|| "Cannot print frame")?;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = CliArgs::parse();

    let _log_handle = logging_init(args.verbose.log_level_filter());

    let config = args.protocol_config();

    match &args.command {
        CliCommands::SystemData { telemetry } => {
            let mut table = FrameTable::new(config);
            table.encode(&telemetry.snapshot());
            print_frames(&table, &FrameKind::SYSTEM_DATA, args.json)?;
        }
        CliCommands::SetupInfo => {
            let table = FrameTable::new(config);
            print_frames(&table, &FrameKind::ENSEMBLE_INFO, args.json)?;
        }
        CliCommands::Frames { telemetry } => {
            let mut table = FrameTable::new(config);
            table.encode(&telemetry.snapshot());
            print_frames(&table, &FrameKind::SYSTEM_DATA, args.json)?;
            print_frames(&table, &FrameKind::ENSEMBLE_INFO, args.json)?;
        }
        CliCommands::Simulate {
            telemetry,
            poll,
            interval,
            count,
        } => {
            let transport = ConsoleTransport { json: args.json };
            let mut inverter = PylonInverter::new(transport, config);
            inverter.update_values(&telemetry.snapshot());
            let mut remaining = *count;
            loop {
                if let Some(left) = remaining.as_mut() {
                    if *left == 0 {
                        break;
                    }
                    *left -= 1;
                }
                info!("poll 0x4200 [{:02X}]", poll);
                inverter
                    .handle_frame(0x4200, &[*poll, 0, 0, 0, 0, 0, 0, 0])
                    .with_context(|| "Cannot dispatch poll")?;
                if remaining == Some(0) {
                    break;
                }
                std::thread::sleep(*interval);
            }
        }
    }

    Ok(())
}
