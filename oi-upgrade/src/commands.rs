// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use oi_upgrade_common::firmware;
use oi_upgrade_common::upgrader::format_serial;
use oi_upgrade_common::{
    CanTransport, FailureReason, SerialNumber, StateKind, StatusUpdate, Upgrader, PAGE_SIZE,
};

/// Human-readable explanation of an upgrade failure.
pub fn failure_message(failure: Option<FailureReason>) -> String {
    match failure {
        Some(FailureReason::ProtocolError) => "Unexpected CAN frame received from device".into(),
        Some(FailureReason::UpgradeInProgress) => {
            "An upgrade is already in progress on the CAN bus".into()
        }
        Some(FailureReason::PageCrcError) => "Firmware upload data corruption detected".into(),
        Some(other) => format!("Unknown failure - {other:?}"),
        None => "Unknown failure".into(),
    }
}

/// Render one status update on the progress bar.
fn render(pb: &ProgressBar, update: &StatusUpdate) {
    match update.state {
        StateKind::Start => pb.set_message("Waiting for device to connect..."),
        StateKind::Header => {
            let serial = update
                .serial
                .as_ref()
                .map(format_serial)
                .unwrap_or_else(|| "unknown device".into());
            pb.println(format!("Device upgrade started for {serial}"));
            pb.set_message("Waiting for firmware request...");
        }
        StateKind::Upload | StateKind::CheckCrc => {
            pb.set_position(update.progress as u64);
            pb.set_message(format!("Upgrading: {:.1}% complete", update.progress));
        }
        StateKind::WaitForDone => {
            pb.set_position(update.progress as u64);
            pb.set_message("Waiting for device to complete upgrade");
        }
        StateKind::Failure => {
            pb.abandon_with_message(format!("Upgrade failed: {}", failure_message(update.failure)))
        }
        StateKind::Complete => {
            pb.set_position(100);
            pb.finish_with_message("Upgrade completed successfully!");
        }
    }
}

/// Upgrade the next device to boot, or the one with `serial`.
pub fn upgrade<T>(
    transport: Arc<T>,
    file: &Path,
    serial: Option<SerialNumber>,
    wait: Duration,
) -> Result<()>
where
    T: CanTransport + 'static,
{
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {msg}")?
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(Duration::from_millis(100));

    let observer = pb.clone();
    let mut upgrader = Upgrader::new(transport, serial, file)
        .with_context(|| format!("Failed to load {}", file.display()))?
        .with_observer(move |update| render(&observer, update));

    println!(
        "Firmware: {} ({} pages)",
        file.display(),
        upgrader.pages().len()
    );
    if let Some(serial) = upgrader.target_serial() {
        println!("Target:   {}", format_serial(&serial));
    }

    if !upgrader.run(wait) {
        pb.abandon_with_message("Upgrade timed out");
        bail!("Upgrade timed out in state '{}'", upgrader.state());
    }

    match upgrader.state() {
        StateKind::Complete => Ok(()),
        _ => bail!("Upgrade failed: {}", failure_message(upgrader.failure())),
    }
}

/// Print the pages and CRCs of a firmware image.
pub fn pages(file: &Path) -> Result<()> {
    let pages =
        firmware::load(file).with_context(|| format!("Failed to load {}", file.display()))?;

    println!(
        "Firmware: {} ({} pages of {} bytes)",
        file.display(),
        pages.len(),
        PAGE_SIZE
    );
    for (i, page) in pages.iter().enumerate() {
        println!("  Page {:3}: CRC 0x{:08x}", i, page.crc());
    }

    Ok(())
}
