#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]
//! Integration tests for TMod, ZMod and pack containers
//!
//! Builds containers through the public API only and checks that every
//! format reads back what was written, including payloads large enough to
//! span several compression chunks.

use pretty_assertions::assert_eq;
use std::path::Path;
use trovekit_formats::compression::{CHUNK_SIZE, decompress};
use trovekit_formats::tmod::{self, ContainerError, ContainerFile, ModContainer, header};
use trovekit_formats::{ModPack, native_hash, zmod};

fn texture(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

fn sample_mod() -> ModContainer {
    let mut container = ModContainer::with_identity("Big Textures", "Alice,Bob");
    container.set_game_version("1.0");
    container.add_tag("textures");
    for (i, len) in [1usize, 3, CHUNK_SIZE, CHUNK_SIZE * 2 + 5].into_iter().enumerate() {
        let file = ContainerFile::new(&format!("Textures\\Item_{i}.dds"), texture(len))
            .expect("path should be valid");
        container.add_file(file);
    }
    container.add_file(ContainerFile::new("preview.png", b"png".to_vec()).expect("path"));
    container.set_preview_path("preview.png");
    container
}

#[test]
fn tmod_round_trip_across_chunks() {
    let mut original = sample_mod();
    let bytes = original.compile().expect("compile should succeed");
    let parsed = tmod::parse(Path::new("Big Textures.tmod"), &bytes, false).expect("parse");

    assert_eq!(parsed.properties(), original.properties());
    assert_eq!(parsed.tags(), vec!["textures".to_string()]);
    assert_eq!(parsed.files().len(), 5);
    for (parsed, original) in parsed.files().iter().zip(original.files()) {
        assert_eq!(parsed.path(), original.path());
        assert_eq!(parsed.size(), original.size());
        assert!(parsed.content() == original.content());
        assert_eq!(parsed.checksum(), native_hash(original.content()));
    }
    assert_eq!(parsed.files()[0].path(), "textures/item_0.dds");
    assert_eq!(parsed.content_files().len(), 4);
}

#[test]
fn tmod_payload_is_padded_concatenation() {
    let mut original = sample_mod();
    let bytes = original.compile().expect("compile");
    let header = header::read_header(&bytes).expect("header");

    let payload = decompress(&bytes[header.header_size..]).expect("payload");
    let expected: Vec<u8> = original
        .files()
        .iter()
        .flat_map(ContainerFile::padded_content)
        .collect();
    assert!(payload.data == expected);

    let offsets: Vec<u64> = header.entries.iter().map(|e| e.offset).collect();
    assert_eq!(&offsets[..3], &[0, 4, 8]);
}

#[test]
fn zip_and_tmod_carry_the_same_files() {
    let mut original = sample_mod();
    let zip_bytes = zmod::compile_zip(&original).expect("zip");
    let tmod_bytes = original.compile().expect("tmod");

    let from_zip = zmod::parse_zip(Path::new("Big Textures.zip"), &zip_bytes).expect("zip parse");
    let from_tmod = tmod::parse(Path::new("Big Textures.tmod"), &tmod_bytes, false).expect("tmod parse");

    for file in from_tmod.files() {
        let twin = from_zip.file(file.path()).expect("zip should hold every file");
        assert_eq!(twin.checksum(), file.checksum());
    }
    assert_eq!(from_zip.name(), from_tmod.name());
}

#[test]
fn pack_bundles_compiled_mods() {
    let mut first = sample_mod();
    let mut second = ModContainer::with_identity("Small", "Carol");
    second.add_file(ContainerFile::new("ui/a.swf", b"swf".to_vec()).expect("path"));

    let mut pack = ModPack::new("Alice");
    pack.add_mod("Big Textures.tmod", first.compile().expect("first"))
        .expect("add");
    pack.add_mod("Small.zip", zmod::compile_zip(&second).expect("second"))
        .expect("add");

    let parsed = ModPack::parse(&pack.compile().expect("pack")).expect("parse pack");
    let containers = parsed.containers().expect("open mods");
    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].files().len(), 5);
    assert!(containers[1].is_ui_mod());
}

#[test]
fn corrupt_header_is_reported() {
    let mut bytes = sample_mod().compile().expect("compile");
    let header_size = header::read_header(&bytes).expect("header").header_size;
    bytes.truncate(header_size - 1);

    let result = tmod::parse(Path::new("broken.tmod"), &bytes, false);
    assert!(matches!(result, Err(ContainerError::Malformed(_))));
}
