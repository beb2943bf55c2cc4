// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

//! Simulated board that keeps its whole flash in memory.
//!
//! Useful for exercising session logic without hardware: reads are counted
//! and transient link failures can be injected.

use std::ops::Range;

use log::trace;

use super::bootloader_flags::{BootloaderFlags, FLAGS_ADDRESS, FLAGS_LENGTH};
use super::{AttributeLocation, BoardInterface, Presence};
use crate::attributes::decode::ATTRIBUTE_SIZE;
use crate::board_settings::{BoardSettings, DEFAULT_PAGE_SIZE};
use crate::errors::{TockloaderError, TransportError};

/// Geometry of the simulated flash.
#[derive(Debug, Clone)]
pub struct MemoryBoardConfig {
    pub size: usize,
    pub page_size: usize,
}

impl Default for MemoryBoardConfig {
    fn default() -> Self {
        Self {
            size: 1024 * 1024,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl MemoryBoardConfig {
    /// Default geometry with the page size taken from `settings`.
    pub fn from_settings(settings: &BoardSettings) -> Self {
        Self {
            page_size: settings.page_size(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct MemoryBoard {
    config: MemoryBoardConfig,
    data: Vec<u8>,
    open: bool,
    flash_mode: bool,
    reads: usize,
    pending_failures: usize,
}

impl MemoryBoard {
    pub fn new(config: MemoryBoardConfig) -> Self {
        let data = vec![0xFF; config.size];
        Self {
            config,
            data,
            open: false,
            flash_mode: false,
            reads: 0,
            pending_failures: 0,
        }
    }

    /// A board whose flash starts with `initial_data`; the rest is erased.
    pub fn with_data(config: MemoryBoardConfig, initial_data: &[u8]) -> Self {
        let mut board = Self::new(config);
        let len = initial_data.len().min(board.data.len());
        board.data[..len].copy_from_slice(&initial_data[..len]);
        board
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Direct access to flash contents, bypassing the link.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of read primitives served so far.
    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn in_flash_mode(&self) -> bool {
        self.flash_mode
    }

    /// Make the next `count` operations fail as if the link dropped.
    pub fn inject_link_failures(&mut self, count: usize) {
        self.pending_failures = count;
    }

    fn check_link(&mut self) -> Result<(), TockloaderError> {
        if !self.open {
            return Err(TransportError::NotOpen.into());
        }
        if self.pending_failures > 0 {
            self.pending_failures -= 1;
            return Err(TransportError::Link("simulated link failure".to_owned()).into());
        }
        Ok(())
    }

    fn check_writable(&mut self) -> Result<(), TockloaderError> {
        self.check_link()?;
        if !self.flash_mode {
            return Err(TockloaderError::NotInFlashMode);
        }
        Ok(())
    }

    fn range(&self, address: u64, length: usize) -> Result<Range<usize>, TockloaderError> {
        let start = usize::try_from(address).ok();
        match start.and_then(|start| Some(start..start.checked_add(length)?)) {
            Some(range) if range.end <= self.data.len() => Ok(range),
            _ => Err(TockloaderError::OutOfRange { address, length }),
        }
    }

    fn read(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError> {
        self.check_link()?;
        let range = self.range(address, length)?;
        self.reads += 1;
        Ok(self.data[range].to_vec())
    }
}

impl BoardInterface for MemoryBoard {
    fn open_session(&mut self) -> Result<(), TockloaderError> {
        self.open = true;
        Ok(())
    }

    fn enter_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.check_link()?;
        self.flash_mode = true;
        Ok(())
    }

    fn exit_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.check_link()?;
        self.flash_mode = false;
        Ok(())
    }

    fn read_range(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError> {
        trace!("memory read {length} bytes at {address:#010x}");
        self.read(address, length)
    }

    fn flash_binary(&mut self, address: u64, data: &[u8]) -> Result<(), TockloaderError> {
        self.check_writable()?;
        let range = self.range(address, data.len())?;
        trace!("memory write {} bytes at {address:#010x}", data.len());
        // Pages touched are rewritten whole, so no separate erase is needed.
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn erase_page(&mut self, address: u64) -> Result<(), TockloaderError> {
        self.check_writable()?;
        if self.config.page_size == 0 {
            return Err(TockloaderError::OutOfRange { address, length: 0 });
        }
        let page_size = self.config.page_size as u64;
        let page_start = address - address % page_size;
        let range = self.range(page_start, self.config.page_size)?;
        trace!("memory erase page at {page_start:#010x}");
        self.data[range].fill(0xFF);
        Ok(())
    }

    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn get_attribute(
        &mut self,
        index: usize,
        location: AttributeLocation,
    ) -> Result<Vec<u8>, TockloaderError> {
        let table = location.require_table()?;
        let address = table.slot_address(index)?;
        self.read(address, ATTRIBUTE_SIZE)
    }

    fn set_attribute(
        &mut self,
        index: usize,
        raw: &[u8],
        location: AttributeLocation,
    ) -> Result<(), TockloaderError> {
        let table = location.require_table()?;
        let address = table.slot_address(index)?;
        if raw.len() > ATTRIBUTE_SIZE {
            return Err(TockloaderError::InvalidAttribute(format!(
                "raw attribute is {} bytes long",
                raw.len()
            )));
        }
        self.flash_binary(address, raw)
    }

    fn get_all_attributes(
        &mut self,
        location: AttributeLocation,
    ) -> Result<Vec<Vec<u8>>, TockloaderError> {
        let table = location.require_table()?;
        let raw = self.read(table.base, table.size())?;
        Ok(raw
            .chunks(ATTRIBUTE_SIZE)
            .map(|slot| slot.to_vec())
            .collect())
    }

    fn bootloader_is_present(&mut self) -> Result<Presence, TockloaderError> {
        let raw = self.read(FLAGS_ADDRESS, FLAGS_LENGTH)?;
        Ok(BootloaderFlags::parse(&raw).present.into())
    }

    fn get_bootloader_version(&mut self) -> Result<Option<String>, TockloaderError> {
        let raw = self.read(FLAGS_ADDRESS, FLAGS_LENGTH)?;
        Ok(BootloaderFlags::parse(&raw).version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::decode::{decode_attribute, encode_attribute};
    use crate::interfaces::bootloader_flags::tests::flags;
    use pretty_assertions::assert_eq;

    fn open_board() -> MemoryBoard {
        let mut board = MemoryBoard::new(MemoryBoardConfig {
            size: 0x2000,
            page_size: 0x200,
        });
        board.open_session().unwrap();
        board
    }

    #[test]
    fn test_closed_link_fails() {
        let mut board = MemoryBoard::new(MemoryBoardConfig::default());
        let err = board.read_range(0, 4).unwrap_err();
        assert!(matches!(err, TockloaderError::Transport(TransportError::NotOpen)));
    }

    #[test]
    fn test_read_out_of_range() {
        let mut board = open_board();
        assert!(board.read_range(0x1FFC, 4).is_ok());
        let err = board.read_range(0x1FFC, 5).unwrap_err();
        assert!(matches!(
            err,
            TockloaderError::OutOfRange {
                address: 0x1FFC,
                length: 5
            }
        ));
        assert!(board.read_range(u64::MAX, 1).is_err());
    }

    #[test]
    fn test_write_requires_flash_mode() {
        let mut board = open_board();
        let err = board.flash_binary(0x100, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, TockloaderError::NotInFlashMode));

        board.enter_flash_mode().unwrap();
        board.enter_flash_mode().unwrap();
        board.flash_binary(0x100, &[1, 2, 3]).unwrap();
        assert_eq!(board.read_range(0x100, 3).unwrap(), vec![1, 2, 3]);

        board.exit_flash_mode().unwrap();
        board.exit_flash_mode().unwrap();
        assert!(!board.in_flash_mode());
    }

    #[test]
    fn test_erase_page_is_aligned() {
        let mut board = open_board();
        board.enter_flash_mode().unwrap();
        board.flash_binary(0x1F0, &[0u8; 0x20]).unwrap();

        board.erase_page(0x2FF).unwrap();

        let data = board.data();
        assert!(data[0x200..0x400].iter().all(|b| *b == 0xFF));
        assert!(data[0x1F0..0x200].iter().all(|b| *b == 0));
    }

    #[test]
    fn test_erase_without_page_size() {
        let mut board = MemoryBoard::new(MemoryBoardConfig {
            size: 0x1000,
            page_size: 0,
        });
        board.open_session().unwrap();
        board.enter_flash_mode().unwrap();

        let err = board.erase_page(0x10).unwrap_err();
        assert!(matches!(
            err,
            TockloaderError::OutOfRange {
                address: 0x10,
                length: 0
            }
        ));
        assert!(board.data().iter().all(|b| *b == 0xFF));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = BoardSettings::from_toml_str("page-size = 4096").unwrap();
        let config = MemoryBoardConfig::from_settings(&settings);
        assert_eq!(config.page_size, 4096);
        assert_eq!(config.size, MemoryBoardConfig::default().size);

        let config = MemoryBoardConfig::from_settings(&BoardSettings::default());
        let board = MemoryBoard::new(config);
        assert_eq!(board.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_attribute_slots() {
        let mut board = open_board();
        board.enter_flash_mode().unwrap();

        let raw = encode_attribute("board", "hail").unwrap();
        board.set_attribute(2, &raw, AttributeLocation::Bootloader).unwrap();

        let slot = board.get_attribute(2, AttributeLocation::Bootloader).unwrap();
        assert_eq!(decode_attribute(&slot).unwrap().value, "hail");

        let all = board.get_all_attributes(AttributeLocation::Bootloader).unwrap();
        assert_eq!(all.len(), 16);
        assert_eq!(all[2], slot);
        assert!(decode_attribute(&all[0]).is_none());

        assert!(board.get_attribute(16, AttributeLocation::Bootloader).is_err());
        assert!(matches!(
            board.get_all_attributes(AttributeLocation::Kernel),
            Err(TockloaderError::AttributeLocationUnavailable(
                AttributeLocation::Kernel
            ))
        ));
    }

    #[test]
    fn test_injected_failures_are_transient() {
        let mut board = open_board();
        board.inject_link_failures(2);
        assert!(board.read_range(0, 1).unwrap_err().is_transport());
        assert!(board.read_range(0, 1).unwrap_err().is_transport());
        assert!(board.read_range(0, 1).is_ok());
        assert_eq!(board.reads(), 1);
    }

    #[test]
    fn test_bootloader_flags() {
        let mut image = vec![0xFF; FLAGS_ADDRESS as usize];
        image.extend_from_slice(&flags("1.1.0"));
        let mut board = MemoryBoard::with_data(MemoryBoardConfig::default(), &image);
        board.open_session().unwrap();

        assert_eq!(board.bootloader_is_present().unwrap(), Presence::Present);
        assert_eq!(
            board.get_bootloader_version().unwrap().as_deref(),
            Some("1.1.0")
        );

        let mut blank = open_board();
        assert_eq!(blank.bootloader_is_present().unwrap(), Presence::Absent);
        assert_eq!(blank.get_bootloader_version().unwrap(), None);
    }
}
