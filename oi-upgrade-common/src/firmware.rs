// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware image loading and page chunking.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use log::debug;
use thiserror::Error;

use crate::crc::crc32_variant;
use crate::protocol::{MAX_PAGES, PAGE_SIZE};

/// Errors raised while loading a firmware image, before any CAN traffic.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read firmware image: {0}")]
    Io(#[from] io::Error),

    #[error("Firmware image too large (more than {max_pages} pages)")]
    TooLarge { max_pages: usize },
}

/// A zero-padded firmware page and its precomputed CRC.
#[derive(Clone, PartialEq, Eq)]
pub struct Page {
    data: Box<[u8; PAGE_SIZE]>,
    crc: u32,
}

impl Page {
    /// Build a page from a chunk of at most `PAGE_SIZE` bytes, padding with zeros.
    ///
    /// # Panics
    /// Panics if `chunk` is longer than `PAGE_SIZE`.
    pub fn new(chunk: &[u8]) -> Self {
        assert!(chunk.len() <= PAGE_SIZE);

        let mut data = Box::new([0u8; PAGE_SIZE]);
        data[..chunk.len()].copy_from_slice(chunk);
        let crc = crc32_variant(data.as_slice());
        Self { data, crc }
    }

    pub fn data(&self) -> &[u8; PAGE_SIZE] {
        &self.data
    }

    pub fn crc(&self) -> u32 {
        self.crc
    }
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Page")
            .field("crc", &format_args!("0x{:08x}", self.crc))
            .finish_non_exhaustive()
    }
}

/// Load a raw firmware binary from `path` and split it into pages.
pub fn load(path: impl AsRef<Path>) -> Result<Vec<Page>, LoadError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let pages = read_pages(file)?;
    debug!("Loaded {} ({} pages)", path.display(), pages.len());
    Ok(pages)
}

/// Split everything `reader` yields into pages until end of input.
pub fn read_pages(mut reader: impl Read) -> Result<Vec<Page>, LoadError> {
    let mut pages = Vec::new();
    let mut chunk = Vec::with_capacity(PAGE_SIZE);

    loop {
        chunk.clear();
        // `take` + `read_to_end` keeps reading across short reads until the
        // page is full or the input ends.
        reader
            .by_ref()
            .take(PAGE_SIZE as u64)
            .read_to_end(&mut chunk)?;
        if chunk.is_empty() {
            break;
        }

        if pages.len() == MAX_PAGES {
            return Err(LoadError::TooLarge {
                max_pages: MAX_PAGES,
            });
        }
        pages.push(Page::new(&chunk));
    }

    Ok(pages)
}
