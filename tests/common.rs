#![allow(dead_code)]

// filename according to https://doc.rust-lang.org/book/ch11-03-test-organization.html
use arduboy_fx::error::Error;
use arduboy_fx::platform::{FlashResource, NorFlashResource};
use arduboy_fx::{FlashcartWriter, SlotSpec, WriterOptions};
use embedded_storage::nor_flash::{
    ErrorType, NorFlash, NorFlashError, NorFlashErrorKind, ReadNorFlash,
};

pub const FX_PAGE_SIZE: usize = 256;
pub const FLASH_SECTOR_SIZE: usize = 4096;

/// In-memory external flash chip.
#[derive(Default)]
pub struct Flash {
    pub buf: Vec<u8>,
    pub fail_after_operation: usize,
    pub operations: Vec<Operation>,
}

#[derive(Debug, PartialEq, Clone)]
pub enum Operation {
    Read { offset: u32, len: usize },
    Write { offset: u32, len: usize },
    Erase { offset: u32, len: usize },
}

impl Flash {
    pub fn new(pages: usize) -> Self {
        Self {
            buf: vec![0xffu8; FX_PAGE_SIZE * pages],
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    /// A chip of `capacity` bytes holding `image` at address 0.
    pub fn with_image(image: &[u8], capacity: usize) -> Self {
        let mut buf = vec![0xffu8; capacity];
        buf[..image.len()].copy_from_slice(image);
        Self {
            buf,
            fail_after_operation: usize::MAX,
            ..Default::default()
        }
    }

    pub fn new_with_fault(image: &[u8], capacity: usize, fail_after_operation: usize) -> Self {
        Self {
            fail_after_operation,
            ..Self::with_image(image, capacity)
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn reads(&self) -> usize {
        self.operations
            .iter()
            .filter(|op| matches!(op, Operation::Read { .. }))
            .count()
    }
}

#[derive(Debug)]
pub struct FlashError;

impl NorFlashError for FlashError {
    fn kind(&self) -> NorFlashErrorKind {
        NorFlashErrorKind::Other
    }
}

impl ErrorType for Flash {
    type Error = FlashError;
}

impl ReadNorFlash for Flash {
    const READ_SIZE: usize = 1;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Read {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        bytes.copy_from_slice(&self.buf[offset..offset + bytes.len()]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.buf.len()
    }
}

impl NorFlash for Flash {
    const WRITE_SIZE: usize = 1;

    const ERASE_SIZE: usize = FLASH_SECTOR_SIZE;

    fn erase(&mut self, from: u32, to: u32) -> Result<(), Self::Error> {
        assert!(from.is_multiple_of(Self::ERASE_SIZE as _));
        assert!(to.is_multiple_of(Self::ERASE_SIZE as _));

        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Erase {
            offset: from,
            len: (to - from) as usize,
        });

        for addr in from..to {
            self.buf[addr as usize] = 0xff;
        }
        Ok(())
    }

    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        if self.operations.len() >= self.fail_after_operation {
            return Err(FlashError);
        }
        self.operations.push(Operation::Write {
            offset,
            len: bytes.len(),
        });

        let offset = offset as usize;
        for (i, &val) in bytes.iter().enumerate() {
            // NOR flash can only flip bits from 1 to 0
            self.buf[offset + i] &= val;
        }
        Ok(())
    }
}

/// A device: flash behind the page interface plus a recorded indicator LED.
pub struct Device {
    pub flash: NorFlashResource<Flash>,
    pub indicator: Vec<u8>,
}

impl Device {
    pub fn new(flash: Flash) -> Self {
        Self {
            flash: NorFlashResource::new(flash),
            indicator: Vec::new(),
        }
    }
}

impl FlashResource for Device {
    fn read_pages(&mut self, page: u16, buf: &mut [u8]) -> Result<(), Error> {
        self.flash.read_pages(page, buf)
    }

    fn write_pages(&mut self, page: u16, data: &[u8]) -> Result<(), Error> {
        self.flash.write_pages(page, data)
    }

    fn set_indicator(&mut self, state: u8) -> Result<(), Error> {
        self.indicator.push(state);
        Ok(())
    }
}

/// Title image with a recognizable pattern.
pub fn image(seed: u8) -> Vec<u8> {
    (0..1024).map(|i| (i as u8).wrapping_mul(seed)).collect()
}

/// A sketch that is big enough to carry the fx vectors.
pub fn sketch(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8) ^ seed).collect()
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
        sketch: sketch(sketch_len, 0x5A),
        fx_data: vec![0x42; data_len],
        fx_save: vec![0x24; save_len],
    }
}

pub fn no_patches() -> WriterOptions {
    WriterOptions {
        patch_menu: false,
        ..Default::default()
    }
}

/// Bootloader category, a game category and three programs; returns the finished image.
pub fn sample_flashcart() -> Vec<u8> {
    let mut writer = FlashcartWriter::with_options(Vec::new(), no_patches());
    writer.write_slot(category("Bootloader", 1)).unwrap();
    writer.write_slot(category("My Games", 2)).unwrap();
    writer.write_slot(program("Plain", 1000, 0, 0)).unwrap();
    writer.write_slot(program("Data", 2000, 700, 0)).unwrap();
    writer.write_slot(program("Saver", 3000, 300, 100)).unwrap();
    writer.finish().unwrap()
}
