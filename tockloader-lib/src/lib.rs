// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

//! Board interface core of tockloader.
//!
//! A [`BoardInterface`] moves bytes to and from a board. A [`BoardSession`]
//! sits on top of one and works out where the kernel and applications live,
//! and whether a kernel or bootloader is installed.

pub mod attributes;
pub mod board_session;
pub mod board_settings;
pub mod errors;
pub mod interfaces;

pub use attributes::decode::{decode_attribute, encode_attribute, DecodedAttribute};
pub use attributes::kernel_attributes::KernelAttributes;
pub use board_session::BoardSession;
pub use board_settings::BoardSettings;
pub use errors::{TockloaderError, TransportError};
pub use interfaces::flash_file::FlashFile;
pub use interfaces::memory::{MemoryBoard, MemoryBoardConfig};
pub use interfaces::{AttributeLocation, Board, BoardInterface, Presence};
