// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::errors::TockloaderError;

pub const DEFAULT_PAGE_SIZE: usize = 512;

/// Settings supplied by the caller for one board connection.
///
/// Every field is optional. Anything left unset is discovered from the board
/// attributes or falls back to a default when the session resolves it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct BoardSettings {
    pub board: Option<String>,
    pub arch: Option<String>,
    /// Overrides where applications start in flash.
    pub app_address: Option<u64>,
    pub jtag_device: Option<String>,
    pub page_size: Option<usize>,
    /// Log the address and length of every flash read.
    pub debug: bool,
}

impl BoardSettings {
    /// Settings for a named board, with the architecture and app address
    /// filled in when the board is a known one.
    pub fn for_board(board: &str) -> Self {
        let mut settings = BoardSettings {
            board: Some(board.to_owned()),
            ..Default::default()
        };
        settings.apply_known_board();
        settings
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, TockloaderError> {
        let mut settings: BoardSettings = toml::from_str(raw)?;
        settings.apply_known_board();
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, TockloaderError> {
        let raw = fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn page_size(&self) -> usize {
        self.page_size.unwrap_or(DEFAULT_PAGE_SIZE)
    }

    // Explicit values always win over the table.
    fn apply_known_board(&mut self) {
        let known = match self.board.as_deref() {
            Some("microbit_v2") => Some(("cortex-m4", 0x0004_0000)),
            Some("nrf52840dk") => Some(("cortex-m4", 0x0004_0000)),
            _ => None,
        };

        if let Some((arch, app_address)) = known {
            if self.arch.is_none() {
                self.arch = Some(arch.to_owned());
            }
            if self.app_address.is_none() {
                self.app_address = Some(app_address);
            }
        }
    }
}
