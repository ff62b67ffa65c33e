// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 as computed by the STM32 CRC peripheral used by the device bootloader.

use ::crc::{Crc, CRC_32_MPEG_2};

const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Compute the page checksum expected by the device bootloader.
///
/// The data is consumed as little-endian 32-bit words and each word is fed
/// MSB first through CRC-32/MPEG-2 (poly `0x04C11DB7`, init `0xFFFFFFFF`,
/// no reflection, no final XOR). A trailing partial word is ignored.
pub fn crc32_variant(data: &[u8]) -> u32 {
    let mut digest = CRC32.digest();
    for word in data.chunks_exact(4) {
        let word = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
        digest.update(&word.to_be_bytes());
    }
    digest.finalize()
}
