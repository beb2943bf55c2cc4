// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

pub mod bootloader_flags;
pub mod flash_file;
pub mod memory;

use std::fmt;

use enum_dispatch::enum_dispatch;

use self::{flash_file::FlashFile, memory::MemoryBoard};
use crate::attributes::decode::ATTRIBUTE_SIZE;
use crate::errors::TockloaderError;

/// Where on the board an attribute table is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeLocation {
    Bootloader,
    Kernel,
}

/// Placement of an attribute table in flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeTable {
    pub base: u64,
    pub slots: usize,
}

impl AttributeTable {
    pub fn slot_address(&self, index: usize) -> Result<u64, TockloaderError> {
        if index >= self.slots {
            return Err(TockloaderError::OutOfRange {
                address: self.base + (index * ATTRIBUTE_SIZE) as u64,
                length: ATTRIBUTE_SIZE,
            });
        }
        Ok(self.base + (index * ATTRIBUTE_SIZE) as u64)
    }

    pub fn size(&self) -> usize {
        self.slots * ATTRIBUTE_SIZE
    }
}

impl AttributeLocation {
    /// The table layout for this location, if boards keep one there.
    pub fn table(&self) -> Option<AttributeTable> {
        match self {
            AttributeLocation::Bootloader => Some(AttributeTable {
                base: 0x600,
                slots: 16,
            }),
            AttributeLocation::Kernel => None,
        }
    }

    pub(crate) fn require_table(&self) -> Result<AttributeTable, TockloaderError> {
        self.table()
            .ok_or(TockloaderError::AttributeLocationUnavailable(*self))
    }
}

impl fmt::Display for AttributeLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeLocation::Bootloader => f.write_str("bootloader"),
            AttributeLocation::Kernel => f.write_str("kernel"),
        }
    }
}

/// Result of a presence check. `Unknown` means the check could not be made
/// and must not be read as absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
    Present,
    Absent,
    Unknown,
}

impl From<bool> for Presence {
    fn from(value: bool) -> Self {
        if value {
            Presence::Present
        } else {
            Presence::Absent
        }
    }
}

impl Presence {
    pub fn is_present(&self) -> bool {
        *self == Presence::Present
    }
}

/// Primitive operations every way of reaching a board has to provide.
///
/// Implementations only move bytes; attribute decoding and address resolution
/// live in [`BoardSession`](crate::board_session::BoardSession).
#[enum_dispatch]
pub trait BoardInterface {
    /// Establish connectivity. Calling it on an open link does nothing.
    fn open_session(&mut self) -> Result<(), TockloaderError>;

    /// Get to a mode where flash can be read and written. Idempotent.
    fn enter_flash_mode(&mut self) -> Result<(), TockloaderError>;

    /// Go back to running the main code. Idempotent.
    fn exit_flash_mode(&mut self) -> Result<(), TockloaderError>;

    /// Read exactly `length` bytes starting at `address`.
    fn read_range(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError>;

    /// Write `data` at `address`, erasing first where the medium needs it.
    fn flash_binary(&mut self, address: u64, data: &[u8]) -> Result<(), TockloaderError>;

    /// Erase the flash page containing `address`.
    fn erase_page(&mut self, address: u64) -> Result<(), TockloaderError>;

    fn page_size(&self) -> usize;

    fn get_attribute(
        &mut self,
        index: usize,
        location: AttributeLocation,
    ) -> Result<Vec<u8>, TockloaderError>;

    fn set_attribute(
        &mut self,
        index: usize,
        raw: &[u8],
        location: AttributeLocation,
    ) -> Result<(), TockloaderError>;

    fn get_all_attributes(
        &mut self,
        location: AttributeLocation,
    ) -> Result<Vec<Vec<u8>>, TockloaderError>;

    fn bootloader_is_present(&mut self) -> Result<Presence, TockloaderError>;

    /// Version string of the bootloader, like `1.1.0`, if one can be found.
    fn get_bootloader_version(&mut self) -> Result<Option<String>, TockloaderError>;
}

#[enum_dispatch(BoardInterface)]
pub enum Board {
    FlashFile(FlashFile),
    Memory(MemoryBoard),
}
