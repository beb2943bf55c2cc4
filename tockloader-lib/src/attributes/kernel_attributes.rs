// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use byteorder::{ByteOrder, LittleEndian};

/// Number of bytes read from just below the apps start address.
pub const KERNEL_ATTRIBUTES_SIZE: usize = 100;

const SENTINEL: &[u8; 4] = b"TOCK";
const TLV_APP_MEMORY: u16 = 0x0101;
const TLV_KERNEL_BINARY: u16 = 0x0102;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub start: u32,
    pub length: u32,
}

/// Attributes the kernel stores at the end of its flash region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelAttributes {
    pub version: u8,
    pub app_memory: Option<MemoryRegion>,
    pub kernel_binary: Option<MemoryRegion>,
}

impl KernelAttributes {
    /// Parse the trailer found at the end of `raw`.
    ///
    /// The trailer grows backwards from the sentinel: `"TOCK"`, 3 reserved
    /// bytes, the version byte, then TLVs whose type and length come after
    /// their value. Returns `None` when the sentinel is missing.
    pub fn parse(raw: &[u8]) -> Option<KernelAttributes> {
        if raw.len() < 8 || &raw[raw.len() - 4..] != SENTINEL {
            return None;
        }

        let mut attributes = KernelAttributes {
            version: raw[raw.len() - 5],
            ..Default::default()
        };

        let mut end = raw.len() - 8;
        while end >= 4 {
            let tlv_type = LittleEndian::read_u16(&raw[end - 4..end - 2]);
            let tlv_length = LittleEndian::read_u16(&raw[end - 2..end]) as usize;
            let value_end = end - 4;
            if tlv_length > value_end {
                break;
            }
            let value = &raw[value_end - tlv_length..value_end];

            match tlv_type {
                TLV_APP_MEMORY => attributes.app_memory = MemoryRegion::parse(value),
                TLV_KERNEL_BINARY => attributes.kernel_binary = MemoryRegion::parse(value),
                0 => break,
                _ => {}
            }

            end = value_end - tlv_length;
        }

        Some(attributes)
    }
}

impl MemoryRegion {
    fn parse(value: &[u8]) -> Option<MemoryRegion> {
        if value.len() != 8 {
            return None;
        }
        Some(MemoryRegion {
            start: LittleEndian::read_u32(&value[0..4]),
            length: LittleEndian::read_u32(&value[4..8]),
        })
    }
}
