// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire constants and packet vocabulary of the CAN bootloader protocol.

use core::fmt;

/// CAN identifier used by devices for every bootloader frame.
pub const DEVICE_ID: u16 = 0x7DE;
/// CAN identifier used by the tool for every reply.
pub const TOOL_ID: u16 = 0x7DD;

/// Size of a firmware page, the unit of transfer and flash write.
pub const PAGE_SIZE: usize = 1024;
/// Most pages that fit the single-byte reply to a START request.
pub const MAX_PAGES: usize = 255;

/// Number of page bytes sent in reply to each PAGE request.
pub const PAGE_CHUNK_SIZE: usize = 8;

/// Length of a HELLO frame.
pub const HELLO_LEN: usize = 8;

/// 4-byte device serial number, in the order shown to users.
pub type SerialNumber = [u8; 4];

/// Packet signatures sent by devices in byte 0 of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DevicePacket {
    /// Device has booted and announces its serial number.
    Hello = 0x33,
    /// Device asks for the firmware size in pages.
    Start = 0x53,
    /// Device asks for the next 8 bytes of the current page.
    Page = 0x50,
    /// Device asks for the CRC of the page just transferred.
    Crc = 0x43,
    /// Device has written every page.
    Done = 0x44,
    /// Device found a CRC mismatch.
    Error = 0x45,
}

impl DevicePacket {
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x33 => Some(Self::Hello),
            0x53 => Some(Self::Start),
            0x50 => Some(Self::Page),
            0x43 => Some(Self::Crc),
            0x44 => Some(Self::Done),
            0x45 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Reason an upgrade ended in the failure state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
#[repr(u8)]
pub enum FailureReason {
    /// A frame arrived that the current state does not expect.
    ProtocolError = 1,
    /// Another device is already part way through an upgrade.
    UpgradeInProgress = 2,
    /// The device rejected a page because its CRC did not match.
    PageCrcError = 3,
}

impl FailureReason {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProtocolError => write!(f, "protocol error"),
            Self::UpgradeInProgress => write!(f, "upgrade in progress"),
            Self::PageCrcError => write!(f, "page CRC error"),
        }
    }
}

/// Decode the serial number carried in bytes 4..8 of a HELLO frame.
///
/// The device sends the serial least significant byte first.
pub fn hello_serial(frame: &[u8]) -> Option<SerialNumber> {
    match frame {
        [_, _, _, _, b4, b5, b6, b7] => Some([*b7, *b6, *b5, *b4]),
        _ => None,
    }
}

/// Returns true for a well-formed HELLO frame.
pub fn is_hello(frame: &[u8]) -> bool {
    frame.len() == HELLO_LEN && frame[0] == DevicePacket::Hello as u8
}

/// Decode a single-byte request frame.
pub fn request(frame: &[u8]) -> Option<DevicePacket> {
    match frame {
        [byte] => DevicePacket::from_byte(*byte),
        _ => None,
    }
}
