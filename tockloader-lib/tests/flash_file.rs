// Licensed under the Apache License, Version 2.0 or the MIT License.
// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright OXIDOS AUTOMOTIVE 2024.

use std::fs;
use std::path::PathBuf;

use pretty_assertions::assert_eq;
use tockloader_lib::{
    AttributeLocation, Board, BoardInterface, BoardSession, BoardSettings, FlashFile, Presence,
    TockloaderError, TransportError,
};

/// A fresh path under the system temp directory, removed when dropped.
struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(name: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "tockloader-lib-{}-{name}.bin",
            std::process::id()
        ));
        let _ = fs::remove_file(&path);
        ScratchFile(path)
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.0);
    }
}

fn bootloader_image(version: &str) -> Vec<u8> {
    let mut image = vec![0xFF; 0x400];
    image.extend_from_slice(b"TOCKBOOTLOADER");
    let mut version = version.as_bytes().to_vec();
    version.resize(8, 0);
    image.extend_from_slice(&version);
    image
}

#[test]
fn test_operations_need_an_open_file() {
    let scratch = ScratchFile::new("closed");
    let mut flash = FlashFile::new(&scratch.0, 512);
    let err = flash.read_range(0, 4).unwrap_err();
    assert!(matches!(
        err,
        TockloaderError::Transport(TransportError::NotOpen)
    ));
}

#[test]
fn test_unwritten_flash_reads_erased() {
    let scratch = ScratchFile::new("erased");
    let mut flash = FlashFile::new(&scratch.0, 512);
    flash.open_session().unwrap();
    flash.open_session().unwrap();

    assert_eq!(flash.read_range(0x1000, 4).unwrap(), vec![0xFF; 4]);
    assert_eq!(fs::metadata(&scratch.0).unwrap().len(), 0);
}

#[test]
fn test_write_grows_file_with_erased_bytes() {
    let scratch = ScratchFile::new("grow");
    let mut flash = FlashFile::new(&scratch.0, 512);
    flash.open_session().unwrap();
    flash.enter_flash_mode().unwrap();
    flash.flash_binary(0x10, &[1, 2, 3, 4]).unwrap();
    flash.exit_flash_mode().unwrap();

    let contents = fs::read(&scratch.0).unwrap();
    assert_eq!(contents.len(), 0x14);
    assert!(contents[..0x10].iter().all(|b| *b == 0xFF));
    assert_eq!(&contents[0x10..], &[1, 2, 3, 4]);

    // Reads straddling the end of the file are padded.
    assert_eq!(flash.read_range(0x12, 4).unwrap(), vec![3, 4, 0xFF, 0xFF]);
}

#[test]
fn test_erase_page() {
    let scratch = ScratchFile::new("erase");
    fs::write(&scratch.0, vec![0u8; 0x800]).unwrap();

    let mut flash = FlashFile::new(&scratch.0, 0x200);
    flash.open_session().unwrap();
    flash.erase_page(0x210).unwrap();

    let contents = fs::read(&scratch.0).unwrap();
    assert!(contents[0x200..0x400].iter().all(|b| *b == 0xFF));
    assert!(contents[..0x200].iter().all(|b| *b == 0));
    assert!(contents[0x400..].iter().all(|b| *b == 0));
}

#[test]
fn test_erase_without_page_size() {
    let scratch = ScratchFile::new("erase-zero");
    fs::write(&scratch.0, vec![0u8; 0x100]).unwrap();

    let mut flash = FlashFile::new(&scratch.0, 0);
    flash.open_session().unwrap();
    assert!(matches!(
        flash.erase_page(0x10),
        Err(TockloaderError::OutOfRange {
            address: 0x10,
            length: 0
        })
    ));
    assert_eq!(fs::read(&scratch.0).unwrap(), vec![0u8; 0x100]);
}

#[test]
fn test_page_size_from_settings() {
    let scratch = ScratchFile::new("settings");
    fs::write(&scratch.0, vec![0u8; 0x2000]).unwrap();
    let settings = BoardSettings::from_toml_str("page-size = 4096").unwrap();

    let mut flash = FlashFile::from_settings(&scratch.0, &settings);
    assert_eq!(flash.page_size(), 4096);

    flash.open_session().unwrap();
    flash.erase_page(0x1010).unwrap();
    let contents = fs::read(&scratch.0).unwrap();
    assert!(contents[..0x1000].iter().all(|b| *b == 0));
    assert!(contents[0x1000..].iter().all(|b| *b == 0xFF));
}

#[test]
fn test_out_of_range() {
    let scratch = ScratchFile::new("range");
    let mut flash = FlashFile::with_max_size(&scratch.0, 512, 0x1000);
    flash.open_session().unwrap();

    assert!(flash.read_range(0xFFC, 4).is_ok());
    assert!(matches!(
        flash.read_range(0xFFC, 5),
        Err(TockloaderError::OutOfRange {
            address: 0xFFC,
            length: 5
        })
    ));
    assert!(matches!(
        flash.flash_binary(0x1000, &[0]),
        Err(TockloaderError::OutOfRange { .. })
    ));
    assert!(matches!(
        flash.get_all_attributes(AttributeLocation::Kernel),
        Err(TockloaderError::AttributeLocationUnavailable(_))
    ));
}

#[test]
fn test_bootloader_presence() {
    let scratch = ScratchFile::new("bootloader");
    let mut flash = FlashFile::new(&scratch.0, 512);
    flash.open_session().unwrap();
    assert_eq!(flash.bootloader_is_present().unwrap(), Presence::Unknown);

    flash.flash_binary(0, &bootloader_image("1.1.0")).unwrap();
    assert_eq!(flash.bootloader_is_present().unwrap(), Presence::Present);
    assert_eq!(
        flash.get_bootloader_version().unwrap().as_deref(),
        Some("1.1.0")
    );

    flash.flash_binary(0x400, b"NOTABOOTLOADER").unwrap();
    assert_eq!(flash.bootloader_is_present().unwrap(), Presence::Absent);
}

#[test]
fn test_session_over_flash_file() {
    let scratch = ScratchFile::new("session");
    let settings = BoardSettings {
        debug: true,
        ..Default::default()
    };
    let board: Board = FlashFile::from_settings(&scratch.0, &settings).into();
    let mut session = BoardSession::new(board, settings);
    session.open().unwrap();
    session.enter_flash_mode().unwrap();

    session.set_attribute("board", "hail").unwrap();
    session.set_attribute("kernaddr", "0x20000").unwrap();
    session.set_attribute("appaddr", "0x50000").unwrap();
    session
        .board_mut()
        .flash_binary(0x20400, b"TockKernel")
        .unwrap();
    session.exit_flash_mode().unwrap();

    assert_eq!(session.board_name().unwrap().as_deref(), Some("hail"));
    assert_eq!(session.kernel_start_address().unwrap(), 0x20000);
    assert_eq!(session.apps_start_address().unwrap(), 0x50000);
    assert_eq!(session.kernel_is_present().unwrap(), Presence::Present);
    assert_eq!(session.kernel_attributes().unwrap(), None);

    // A new session on the same image starts from scratch.
    let board = session.into_board();
    let mut session = BoardSession::new(board, BoardSettings::for_board("microbit_v2"));
    assert_eq!(session.board_name().unwrap().as_deref(), Some("microbit_v2"));
    assert_eq!(session.apps_start_address().unwrap(), 0x40000);
    assert_eq!(session.kernel_start_address().unwrap(), 0x20000);
}
