// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use log::{debug, warn};

use crate::attributes::decode::{
    decode_attribute, encode_attribute, parse_address, DecodedAttribute,
};
use crate::attributes::kernel_attributes::{KernelAttributes, KERNEL_ATTRIBUTES_SIZE};
use crate::board_settings::BoardSettings;
use crate::errors::TockloaderError;
use crate::interfaces::{AttributeLocation, BoardInterface, Presence};

pub const DEFAULT_KERNEL_ADDRESS: u64 = 0x10000;
pub const DEFAULT_APPS_ADDRESS: u64 = 0x30000;

/// The kernel image starts with a vector table of two 512 byte banks,
/// immediately followed by this marker.
pub const KERNEL_MAGIC: &[u8; 10] = b"TockKernel";
pub const KERNEL_MAGIC_OFFSET: u64 = 512 * 2;

/// Everything known about one connected board.
///
/// Addresses and presence are resolved on first use and kept for the rest of
/// the session. Errors from the board are never cached, so a failed lookup is
/// simply retried on the next call. Start a new session after the board has
/// been reflashed or swapped.
#[derive(Debug)]
pub struct BoardSession<B: BoardInterface> {
    board: B,
    settings: BoardSettings,
    kernel_address: Option<u64>,
    kernel_presence: Option<Presence>,
    apps_start_address: Option<u64>,
    board_name: Option<String>,
    arch: Option<String>,
}

impl<B: BoardInterface> BoardSession<B> {
    pub fn new(board: B, settings: BoardSettings) -> Self {
        BoardSession {
            board,
            kernel_address: None,
            kernel_presence: None,
            apps_start_address: settings.app_address,
            board_name: settings.board.clone(),
            arch: settings.arch.clone(),
            settings,
        }
    }

    pub fn settings(&self) -> &BoardSettings {
        &self.settings
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn board_mut(&mut self) -> &mut B {
        &mut self.board
    }

    pub fn into_board(self) -> B {
        self.board
    }

    pub fn open(&mut self) -> Result<(), TockloaderError> {
        self.board.open_session()
    }

    pub fn enter_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.board.enter_flash_mode()
    }

    pub fn exit_flash_mode(&mut self) -> Result<(), TockloaderError> {
        self.board.exit_flash_mode()
    }

    pub fn read_range(&mut self, address: u64, length: usize) -> Result<Vec<u8>, TockloaderError> {
        if self.settings.debug {
            debug!("Read Range, address: {address:#010x}, length: {length}");
        }
        self.board.read_range(address, length)
    }

    /// All well-formed attributes stored at `location`, in slot order.
    pub fn attributes(
        &mut self,
        location: AttributeLocation,
    ) -> Result<Vec<DecodedAttribute>, TockloaderError> {
        let slots = self.board.get_all_attributes(location)?;
        Ok(slots.iter().filter_map(|slot| decode_attribute(slot)).collect())
    }

    /// Value of the first bootloader attribute named `key`.
    pub fn attribute(&mut self, key: &str) -> Result<Option<String>, TockloaderError> {
        Ok(self
            .attributes(AttributeLocation::Bootloader)?
            .into_iter()
            .find(|attribute| attribute.key == key)
            .map(|attribute| attribute.value))
    }

    /// Store `key = value` in the bootloader attribute table.
    ///
    /// An existing slot with the same key is overwritten, otherwise the first
    /// empty slot is used. Resolved addresses are not refreshed.
    pub fn set_attribute(&mut self, key: &str, value: &str) -> Result<(), TockloaderError> {
        let raw = encode_attribute(key, value)?;
        let slots = self.board.get_all_attributes(AttributeLocation::Bootloader)?;
        let decoded: Vec<_> = slots.iter().map(|slot| decode_attribute(slot)).collect();

        let index = decoded
            .iter()
            .position(|slot| matches!(slot, Some(attribute) if attribute.key == key))
            .or_else(|| decoded.iter().position(Option::is_none))
            .ok_or(TockloaderError::AttributeTableFull)?;

        debug!("Writing attribute {key} to slot {index}");
        self.board
            .set_attribute(index, &raw, AttributeLocation::Bootloader)
    }

    /// Address in flash where the kernel starts.
    pub fn kernel_start_address(&mut self) -> Result<u64, TockloaderError> {
        if let Some(address) = self.kernel_address {
            return Ok(address);
        }

        let address = self
            .address_attribute("kernaddr")?
            .unwrap_or(DEFAULT_KERNEL_ADDRESS);
        self.kernel_address = Some(address);
        Ok(address)
    }

    /// Address in flash where applications start. An address from the
    /// settings wins over the board attributes.
    pub fn apps_start_address(&mut self) -> Result<u64, TockloaderError> {
        if let Some(address) = self.apps_start_address {
            return Ok(address);
        }

        let address = self
            .address_attribute("appaddr")?
            .unwrap_or(DEFAULT_APPS_ADDRESS);
        self.apps_start_address = Some(address);
        Ok(address)
    }

    /// Check for a Tock kernel by looking for its marker right after the
    /// vector table.
    ///
    /// This is a signature check only, so arbitrary flash contents that happen
    /// to hold the marker also count as a kernel.
    pub fn kernel_is_present(&mut self) -> Result<Presence, TockloaderError> {
        if let Some(presence) = self.kernel_presence {
            return Ok(presence);
        }

        let kernel_address = self.kernel_start_address()?;
        let magic_address = kernel_address
            .checked_add(KERNEL_MAGIC_OFFSET)
            .ok_or(TockloaderError::OutOfRange {
                address: kernel_address,
                length: KERNEL_MAGIC.len(),
            })?;
        let magic = self.read_range(magic_address, KERNEL_MAGIC.len())?;
        let presence = Presence::from(magic.as_slice() == KERNEL_MAGIC);
        self.kernel_presence = Some(presence);
        Ok(presence)
    }

    /// Ask the board whether the Tock bootloader is there. How that is
    /// determined depends on the board interface.
    pub fn bootloader_is_present(&mut self) -> Result<Presence, TockloaderError> {
        self.board.bootloader_is_present()
    }

    pub fn bootloader_version(&mut self) -> Result<Option<String>, TockloaderError> {
        self.board.get_bootloader_version()
    }

    /// Name of the connected board, from the settings or the `board` attribute.
    pub fn board_name(&mut self) -> Result<Option<String>, TockloaderError> {
        if self.board_name.is_none() {
            self.board_name = self.attribute("board")?;
        }
        Ok(self.board_name.clone())
    }

    /// Architecture of the connected board, from the settings or the `arch`
    /// attribute.
    pub fn arch(&mut self) -> Result<Option<String>, TockloaderError> {
        if self.arch.is_none() {
            self.arch = self.attribute("arch")?;
        }
        Ok(self.arch.clone())
    }

    /// Attributes the kernel keeps just below the start of applications.
    pub fn kernel_attributes(&mut self) -> Result<Option<KernelAttributes>, TockloaderError> {
        let apps_address = self.apps_start_address()?;
        let Some(address) = apps_address.checked_sub(KERNEL_ATTRIBUTES_SIZE as u64) else {
            return Ok(None);
        };
        let raw = self.read_range(address, KERNEL_ATTRIBUTES_SIZE)?;
        Ok(KernelAttributes::parse(&raw))
    }

    fn address_attribute(&mut self, key: &str) -> Result<Option<u64>, TockloaderError> {
        let Some(value) = self.attribute(key)? else {
            return Ok(None);
        };

        let address = parse_address(&value);
        if address.is_none() {
            warn!("Ignoring attribute {key} with unparsable address {value:?}");
        }
        Ok(address)
    }
}
