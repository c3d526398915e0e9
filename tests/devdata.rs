use arduboy_fx::FX_DEV_FLASH_CAPACITY;
use arduboy_fx::devdata::{DevDataWriter, HEADER_PREAMBLE, align_fx_files, split_dev_binary};
use pretty_assertions::assert_eq;

fn header_text(header: Vec<u8>) -> String {
    String::from_utf8(header).unwrap()
}

#[test]
fn data_only() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    writer.preamble().unwrap();
    writer.preamble().unwrap();
    assert_eq!(writer.field("first").unwrap(), 0);
    assert_eq!(writer.write(&[1; 17]).unwrap(), 17);
    assert_eq!(writer.field("second").unwrap(), 0x11);
    writer.write(&[2; 12]).unwrap();
    assert!(!writer.has_save());

    let (offsets, header, bin) = writer.finalize().unwrap();
    assert_eq!(offsets.data_length, 29);
    assert_eq!(offsets.data_length_flash, 256);
    assert_eq!(offsets.save_length_flash, 0);
    assert!(!offsets.has_save());
    assert_eq!(offsets.save_start, FX_DEV_FLASH_CAPACITY);
    assert_eq!(offsets.data_start, FX_DEV_FLASH_CAPACITY - 256);

    assert_eq!(bin.len(), 256);
    assert_eq!(&bin[17..29], &[2; 12]);
    assert!(bin[29..].iter().all(|&b| b == 0xFF));

    let text = header_text(header);
    assert_eq!(text.matches("#pragma once").count(), 1);
    assert!(text.starts_with(HEADER_PREAMBLE));
    assert!(text.contains("constexpr uint24_t first = 0x000000;\n"));
    assert!(text.contains("constexpr uint24_t second = 0x000011;\n"));
    assert!(text.contains("constexpr uint16_t FX_DATA_PAGE = 0xFFFF;\n"));
    assert!(text.contains("constexpr uint24_t FX_DATA_BYTES = 29;\n"));
    assert!(text.contains("#define FX_INIT() FX::begin(FX_DATA_PAGE)\n"));
    assert!(!text.contains("FX_SAVE"));
}

#[test]
fn empty_save_takes_a_sector() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    assert_eq!(writer.begin_save().unwrap(), 0);
    let (offsets, header, bin) = writer.finalize().unwrap();

    assert_eq!(offsets.data_length, 0);
    assert_eq!(offsets.save_length, 0);
    assert_eq!(offsets.save_length_flash, 4096);
    assert_eq!(offsets.data_start, FX_DEV_FLASH_CAPACITY - 4096);
    assert_eq!(offsets.save_start, FX_DEV_FLASH_CAPACITY - 4096);
    assert_eq!(bin, vec![0xFF; 4096]);

    let text = header_text(header);
    assert!(text.contains("constexpr uint16_t FX_SAVE_PAGE = 0xFFF0;\n"));
    assert!(text.contains("#define FX_INIT() FX::begin(FX_DATA_PAGE, FX_SAVE_PAGE)\n"));
}

#[test]
fn save_addresses_restart_at_zero() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    writer.write(&[7; 300]).unwrap();
    assert_eq!(writer.begin_save().unwrap(), 212);
    assert_eq!(writer.field("slot").unwrap(), 0);
    writer.write(&[9; 10]).unwrap();
    assert_eq!(writer.current_address(), 10);

    let (offsets, _, bin) = writer.finalize().unwrap();
    assert_eq!(offsets.data_length, 300);
    assert_eq!(offsets.data_length_flash, 512);
    assert_eq!(offsets.save_length, 10);
    // The save region ends on a sector boundary of the whole binary.
    assert_eq!(offsets.save_length_flash, 4096 - 512);
    assert_eq!(bin.len(), 4096);
    assert_eq!(offsets.data_start + offsets.data_length_flash, offsets.save_start);
    assert_eq!(offsets.save_start + offsets.save_length_flash, FX_DEV_FLASH_CAPACITY);

    let (data, save) = split_dev_binary(&bin, &offsets).unwrap();
    assert_eq!(data.len(), 512);
    assert_eq!(&save[..10], &[9; 10]);
}

#[test]
fn pad_with_increase() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    assert_eq!(writer.pad(16, false).unwrap(), 0);
    assert_eq!(writer.pad(16, true).unwrap(), 16);
    writer.write(&[0; 3]).unwrap();
    assert_eq!(writer.pad(16, true).unwrap(), 13);
    assert_eq!(writer.pad(0, true).unwrap(), 0);
    assert_eq!(writer.bin_length(), 32);
}

#[test]
fn split_rejects_short_binary() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    writer.write(&[1; 10]).unwrap();
    writer.begin_save().unwrap();
    let (offsets, _, bin) = writer.finalize().unwrap();
    assert!(split_dev_binary(&bin[..100], &offsets).is_err());
}

#[test]
fn aligned_files_match_generator_layout() {
    let mut writer = DevDataWriter::new(Vec::new(), Vec::new());
    writer.write(&[1; 10]).unwrap();
    writer.begin_save().unwrap();
    writer.write(&[2; 20]).unwrap();
    let (offsets, _, bin) = writer.finalize().unwrap();
    let (data, save) = split_dev_binary(&bin, &offsets).unwrap();

    let joined = align_fx_files(&data[..10], &save[..20]);
    assert_eq!(joined.len(), 256 + 4096);
    assert_eq!(&joined[..256], &bin[..256]);
    assert_eq!(&joined[256..276], &[2; 20]);
    assert_eq!(offsets.save_length_flash, 4096 - 256);
}
