// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use crate::attributes::decode::bytes_to_string;

/// The Tock bootloader keeps its flags right after its vector table.
pub const FLAGS_ADDRESS: u64 = 0x400;
pub const FLAGS_LENGTH: usize = MARKER.len() + VERSION_LENGTH;

const MARKER: &[u8; 14] = b"TOCKBOOTLOADER";
const VERSION_LENGTH: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootloaderFlags {
    pub present: bool,
    pub version: Option<String>,
}

impl BootloaderFlags {
    pub fn parse(raw: &[u8]) -> BootloaderFlags {
        if raw.len() < FLAGS_LENGTH || &raw[..MARKER.len()] != MARKER {
            return BootloaderFlags {
                present: false,
                version: None,
            };
        }

        let version = bytes_to_string(&raw[MARKER.len()..FLAGS_LENGTH])
            .map(|version| version.trim_matches(char::from(0)).to_owned())
            .filter(|version| !version.is_empty());

        BootloaderFlags {
            present: true,
            version,
        }
    }
}
