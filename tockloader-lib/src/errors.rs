// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::io;
use thiserror::Error;

use crate::interfaces::AttributeLocation;

#[derive(Debug, Error)]
pub enum TockloaderError {
    #[error("Error occurred while communicating with the board: {0}")]
    Transport(#[from] TransportError),

    #[error("Flash access out of range: address {address:#010x}, length {length}")]
    OutOfRange { address: u64, length: usize },

    #[error("The board is not in flash mode")]
    NotInFlashMode,

    #[error("Invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("The board has no attribute table in the {0} location")]
    AttributeLocationUnavailable(AttributeLocation),

    #[error("No free attribute slot left on the board")]
    AttributeTableFull,

    #[error("Invalid board settings: {0}")]
    Settings(#[from] toml::de::Error),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("the link to the board is not open")]
    NotOpen,

    #[error("{0}")]
    Link(String),
}

impl From<io::Error> for TockloaderError {
    fn from(value: io::Error) -> Self {
        Self::Transport(TransportError::Io(value))
    }
}

impl TockloaderError {
    /// Whether this error came from the link to the board rather than from the
    /// request itself.
    pub fn is_transport(&self) -> bool {
        matches!(self, TockloaderError::Transport(_))
    }
}
