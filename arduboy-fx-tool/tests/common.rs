#![allow(dead_code)]

use std::path::Path;

use arduboy_fx::{FlashcartWriter, SlotSpec};

pub fn image(seed: u8) -> Vec<u8> {
    (0..1024).map(|i| (i as u8).wrapping_mul(seed)).collect()
}

/// Sketch bytes that no sketch patch recognizes.
pub fn sketch(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 13) as u8).collect()
}

pub fn category(title: &str, seed: u8) -> SlotSpec {
    SlotSpec::category(title, &format!("{} info", title), image(seed))
}

pub fn program(title: &str, sketch_len: usize, data_len: usize, save_len: usize) -> SlotSpec {
    SlotSpec {
        title: title.into(),
        version: "1.0".into(),
        developer: "dev".into(),
        info: format!("{} info", title).into(),
        image: image(7),
        sketch: sketch(sketch_len),
        fx_data: vec![0x42; data_len],
        fx_save: vec![0x24; save_len],
    }
}

pub fn build(slots: Vec<SlotSpec>) -> Vec<u8> {
    let mut writer = FlashcartWriter::new(Vec::new());
    for slot in slots {
        writer.write_slot(slot).unwrap();
    }
    writer.finish().unwrap()
}

/// Two categories and two plain programs.
pub fn plain_flashcart() -> Vec<u8> {
    build(vec![
        category("Bootloader", 1),
        category("My Games", 2),
        program("Plain", 1000, 0, 0),
        program("Other", 2048, 0, 0),
    ])
}

/// Categories followed by programs with fx data and a save.
pub fn data_flashcart() -> Vec<u8> {
    build(vec![
        category("Bootloader", 1),
        category("My Games", 2),
        program("Data", 600, 300, 0),
        program("Saver", 600, 300, 100),
    ])
}

pub fn write_file(dir: &Path, name: &str, data: &[u8]) {
    std::fs::write(dir.join(name), data).unwrap();
}
