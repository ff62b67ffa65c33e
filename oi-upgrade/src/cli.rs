// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use oi_upgrade_common::SerialNumber;

use crate::commands;
use crate::transport::SocketCanTransport;

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "oi-upgrade")]
#[command(about = "Firmware upgrade tool for openinverter devices over CAN")]
pub struct Cli {
    /// SocketCAN interface (e.g., can0)
    #[arg(short, long, default_value = "can0")]
    pub interface: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// Upgrade the firmware of the next device to boot
    ///
    /// The upgrade waits for a device to boot, typically by power cycling it.
    /// On a bus with more than one device, pass the serial number so only
    /// that device is upgraded.
    Upgrade {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Serial number of the device to upgrade (first 8 hex digits)
        #[arg(short, long, value_parser = parse_serial)]
        serial: Option<SerialNumber>,

        /// Seconds to wait for the device between protocol steps
        #[arg(short, long, default_value = "5.0", value_parser = parse_seconds)]
        wait: Duration,
    },

    /// List the pages and CRCs a firmware file would be sent as
    Pages {
        /// Firmware binary file
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

/// Parse 8 hex digits into a serial number, most significant byte first.
fn parse_serial(s: &str) -> Result<SerialNumber, String> {
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err("device serial numbers should be 8 hexadecimal digits".into());
    }

    let mut serial = [0u8; 4];
    for (i, byte) in serial.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16)
            .map_err(|e| format!("invalid hex value: {e}"))?;
    }
    Ok(serial)
}

/// Parse a non-negative number of seconds.
fn parse_seconds(s: &str) -> Result<Duration, String> {
    let seconds: f64 = s.parse().map_err(|e| format!("invalid number: {e}"))?;
    Duration::try_from_secs_f64(seconds).map_err(|e| format!("invalid duration: {e}"))
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Pages { file } => commands::pages(&file),
        Commands::Upgrade { file, serial, wait } => {
            let transport = Arc::new(SocketCanTransport::open(&cli.interface)?);
            let result = commands::upgrade(Arc::clone(&transport), &file, serial, wait);
            transport.close();
            result
        }
    }
}
