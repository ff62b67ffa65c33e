// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware upgrade engine for openinverter devices over CAN.
//!
//! The device bootloader drives the transfer by sending single-byte requests
//! on [`DEVICE_ID`]; this crate answers them on [`TOOL_ID`]:
//! - `crc`: CRC-32 variant computed by the STM32 bootloader
//! - `firmware`: loads a raw image and splits it into CRC'd pages
//! - `machine`: the upgrade protocol state machine
//! - `status`: ordered hand-off of state snapshots between threads
//! - `upgrader`: ties the above to a CAN transport

pub mod crc;
pub mod firmware;
pub mod machine;
pub mod protocol;
pub mod status;
pub mod transport;
pub mod upgrader;

// Re-export commonly used types
pub use firmware::{LoadError, Page};
pub use machine::{StateKind, StatusUpdate, UpgradeMachine};
pub use protocol::{DevicePacket, FailureReason, SerialNumber};
pub use protocol::{DEVICE_ID, MAX_PAGES, PAGE_SIZE, TOOL_ID};
pub use transport::{CanTransport, FrameListener};
pub use upgrader::Upgrader;
