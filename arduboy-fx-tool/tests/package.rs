use std::fs::File;
use std::io::{Cursor, Write};
use std::path::Path;

use arduboy_fx_tool::hex::bin_to_hex;
use arduboy_fx_tool::{BinarySelection, Error, Package, read_package, run_flashcart_script};
use pretty_assertions::assert_eq;
use tempfile::tempdir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

mod common;

const INFO: &str = r#"{
    "schemaVersion": 3,
    "title": "Tiny Game",
    "description": "A small test",
    "author": "dev",
    "version": "1.2",
    "binaries": [
        {"title": "Plain", "filename": "game.hex", "device": "Arduboy"},
        {"title": "FX", "filename": "game.hex", "device": "ArduboyFX",
         "flashdata": "data.bin", "flashsave": "save.bin"}
    ]
}"#;

fn png(width: u32, height: u32) -> Vec<u8> {
    let mut img = image::GrayImage::new(width, height);
    img.put_pixel(0, 0, image::Luma([255]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

fn write_package(path: &Path, info: &str, extra: &[(&str, Vec<u8>)]) {
    let mut zip = ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
    let hex = bin_to_hex(&common::sketch(300)).unwrap();
    let mut files = vec![
        ("info.json", info.as_bytes().to_vec()),
        ("GAME.hex", hex.into_bytes()),
        ("data.bin", vec![0x42; 100]),
        ("save.bin", vec![0x24; 10]),
    ];
    files.extend(extra.iter().cloned());
    for (name, data) in files {
        zip.start_file(name, options).unwrap();
        zip.write_all(&data).unwrap();
    }
    zip.finish().unwrap();
}

#[test]
fn selects_binary_by_device() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiny.arduboy");
    write_package(&path, INFO, &[("banner.png", png(256, 128)), ("icon.png", png(16, 16))]);

    let plain = read_package(
        &path,
        BinarySelection::Suitable {
            device: "arduboy",
            exact: "",
        },
        0,
    )
    .unwrap();
    assert_eq!(plain.title, "Tiny Game");
    assert_eq!(plain.developer, "dev");
    assert_eq!(plain.version, "1.2");
    assert_eq!(plain.info, "A small test");
    assert_eq!(plain.sketch, common::sketch(300));
    assert!(plain.fx_data.is_empty());
    assert_eq!(plain.image.len(), 1024);

    let fx = read_package(
        &path,
        BinarySelection::Suitable {
            device: "",
            exact: "FX",
        },
        0,
    )
    .unwrap();
    assert_eq!(fx.fx_data, vec![0x42; 100]);
    assert_eq!(fx.fx_save, vec![0x24; 10]);
}

#[test]
fn ambiguous_selection_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiny.arduboy");
    write_package(&path, INFO, &[]);

    let result = read_package(
        &path,
        BinarySelection::Suitable {
            device: "",
            exact: "",
        },
        100,
    );
    assert!(matches!(result, Err(Error::PackageSelection(_))));

    let devices = vec!["ArduboyMini".to_string(), "ArduboyFX".to_string()];
    let any = read_package(&path, BinarySelection::Any(&devices), 100).unwrap();
    assert_eq!(any.fx_data.len(), 100);
}

#[test]
fn missing_image_leaves_title_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("tiny.arduboy");
    write_package(&path, INFO, &[("icon.png", png(16, 16))]);

    let mut package = Package::open(&path).unwrap();
    assert_eq!(package.find_suitable_image().unwrap(), None);
    let slot = package
        .slot(
            BinarySelection::Suitable {
                device: "Arduboy",
                exact: "",
            },
            100,
        )
        .unwrap();
    assert!(slot.image.is_empty());
}

#[test]
fn title_defaults_to_file_name() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("untitled.arduboy");
    write_package(&path, r#"{"binaries": [{"filename": "game.hex"}]}"#, &[]);

    let package = Package::open(&path).unwrap();
    assert_eq!(package.info.title, "untitled");
}

#[test]
fn missing_files_are_reported() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.arduboy");
    write_package(
        &path,
        r#"{"binaries": [{"filename": "game.hex", "flashdata": "gone.bin"}]}"#,
        &[],
    );
    let result = read_package(
        &path,
        BinarySelection::Suitable {
            device: "",
            exact: "",
        },
        100,
    );
    assert!(matches!(result, Err(Error::MissingPackageFile(name)) if name == "gone.bin"));
}

#[test]
fn scripts_add_packages_to_flashcarts() {
    let dir = tempdir().unwrap();
    write_package(
        &dir.path().join("tiny.arduboy"),
        INFO,
        &[("banner.png", png(128, 64))],
    );

    let script = r#"
local out = new_flashcart("cart.bin")
out.write_slot({ title = "Boot", image = string.rep("\0", 1024) })
out.write_slot({ title = "Games", image = string.rep("\0", 1024) })
local game = packageany("tiny.arduboy", "ArduboyFX, Arduboy")
log(game.title, #game.fxdata, tostring(is_category(game)), tostring(has_fxsave(game)))
out.write_slot(game)
"#;
    let output = run_flashcart_script(script, &[], dir.path()).unwrap();
    assert_eq!(output, "Tiny Game\t100\tfalse\ttrue\n");

    let cart = arduboy_fx::Flashcart::parse_file(dir.path().join("cart.bin")).unwrap();
    assert_eq!(cart.programs(), 1);
    let (_, header) = &cart.slots[2];
    assert_eq!(header.title, "Tiny Game");
    assert!(header.has_fx_data());
    assert!(header.has_fx_save());
}
