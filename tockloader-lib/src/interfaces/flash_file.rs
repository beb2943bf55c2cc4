// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use log::{debug, trace};

use super::bootloader_flags::{BootloaderFlags, FLAGS_ADDRESS, FLAGS_LENGTH};
use super::{AttributeLocation, BoardInterface, Presence};
use crate::attributes::decode::ATTRIBUTE_SIZE;
use crate::board_settings::BoardSettings;
use crate::errors::{TockloaderError, TransportError};

/// Largest image a flash file may grow to when the caller does not say.
pub const DEFAULT_MAX_SIZE: u64 = 0x10_0000;

/// A binary image on disk that stands in for the flash of a board.
///
/// Bytes past the end of the file read as erased flash (`0xFF`), and writes
/// past the end grow the file.
#[derive(Debug)]
pub struct FlashFile {
    path: PathBuf,
    max_size: u64,
    page_size: usize,
    file: Option<File>,
    flash_mode: bool,
}

impl FlashFile {
    pub fn new(path: impl Into<PathBuf>, page_size: usize) -> Self {
        Self::with_max_size(path, page_size, DEFAULT_MAX_SIZE)
    }

    /// A flash file using the page size from `settings`.
    pub fn from_settings(path: impl Into<PathBuf>, settings: &BoardSettings) -> Self {
        Self::new(path, settings.page_size())
    }

    pub fn with_max_size(path: impl Into<PathBuf>, page_size: usize, max_size: u64) -> Self {
        FlashFile {
            path: path.into(),
            max_size,
            page_size,
            file: None,
            flash_mode: false,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    fn file(&mut self) -> Result<&mut File, TockloaderError> {
        self.file
            .as_mut()
            .ok_or(TockloaderError::Transport(TransportError::NotOpen))
    }

    fn check_range(&self, address: u64, length: usize) -> Result<(), TockloaderError> {
        match address.checked_add(length as u64) {
            Some(end) if end <= self.max_size => Ok(()),
            _ => Err(TockloaderError::OutOfRange { address, length }),
        }
    }

    fn file_len(&mut self) -> Result<u64, TockloaderError> {
        Ok(self.file()?.metadata()?.len())
    }

    fn read(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError> {
        self.check_range(address, length)?;
        let file = self.file()?;

        let mut buf = Vec::with_capacity(length);
        file.seek(SeekFrom::Start(address))?;
        file.take(length as u64).read_to_end(&mut buf)?;
        // Whatever the image does not cover yet is erased flash.
        buf.resize(length, 0xFF);
        Ok(buf)
    }

    fn write(&mut self, address: u64, data: &[u8]) -> Result<(), TockloaderError> {
        self.check_range(address, data.len())?;
        let len = self.file_len()?;
        let file = self.file()?;

        if address > len {
            file.seek(SeekFrom::End(0))?;
            file.write_all(&vec![0xFF; (address - len) as usize])?;
        }
        file.seek(SeekFrom::Start(address))?;
        file.write_all(data)?;
        file.flush()?;
        Ok(())
    }
}

impl BoardInterface for FlashFile {
    fn open_session(&mut self) -> Result<(), TockloaderError> {
        if self.file.is_some() {
            return Ok(());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)?;
        debug!("Opened flash file {}", self.path.display());
        self.file = Some(file);
        Ok(())
    }

    // A file is always writable; the mode is tracked so callers see the same
    // transitions as on a real board.
    fn enter_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.file()?;
        self.flash_mode = true;
        Ok(())
    }

    fn exit_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.file()?.sync_all()?;
        self.flash_mode = false;
        Ok(())
    }

    fn read_range(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError> {
        trace!("flash file read {length} bytes at {address:#010x}");
        self.read(address, length)
    }

    fn flash_binary(&mut self, address: u64, data: &[u8]) -> Result<(), TockloaderError> {
        trace!("flash file write {} bytes at {address:#010x}", data.len());
        self.write(address, data)
    }

    fn erase_page(&mut self, address: u64) -> Result<(), TockloaderError> {
        if self.page_size == 0 {
            return Err(TockloaderError::OutOfRange { address, length: 0 });
        }
        let page_size = self.page_size as u64;
        let page_start = address - address % page_size;
        trace!("flash file erase page at {page_start:#010x}");
        self.write(page_start, &vec![0xFF; self.page_size])
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn get_attribute(
        &mut self,
        index: usize,
        location: AttributeLocation,
    ) -> Result<Vec<u8>, TockloaderError> {
        let address = location.require_table()?.slot_address(index)?;
        self.read(address, ATTRIBUTE_SIZE)
    }

    fn set_attribute(
        &mut self,
        index: usize,
        raw: &[u8],
        location: AttributeLocation,
    ) -> Result<(), TockloaderError> {
        let address = location.require_table()?.slot_address(index)?;
        if raw.len() > ATTRIBUTE_SIZE {
            return Err(TockloaderError::InvalidAttribute(format!(
                "raw attribute is {} bytes long",
                raw.len()
            )));
        }
        self.write(address, raw)
    }

    fn get_all_attributes(
        &mut self,
        location: AttributeLocation,
    ) -> Result<Vec<Vec<u8>>, TockloaderError> {
        let table = location.require_table()?;
        let raw = self.read(table.base, table.size())?;
        Ok(raw.chunks(ATTRIBUTE_SIZE).map(|slot| slot.to_vec()).collect())
    }

    fn bootloader_is_present(&mut self) -> Result<Presence, TockloaderError> {
        // An image that stops before the flags was never given a bootloader
        // section, which says nothing about the board it came from.
        if self.file_len()? < FLAGS_ADDRESS + FLAGS_LENGTH as u64 {
            return Ok(Presence::Unknown);
        }
        let raw = self.read(FLAGS_ADDRESS, FLAGS_LENGTH)?;
        Ok(BootloaderFlags::parse(&raw).present.into())
    }

    fn get_bootloader_version(&mut self) -> Result<Option<String>, TockloaderError> {
        let raw = self.read(FLAGS_ADDRESS, FLAGS_LENGTH)?;
        Ok(BootloaderFlags::parse(&raw).version)
    }
}
