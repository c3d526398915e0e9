//! Slot layout engine: appends slots to a flashcart container.

use std::io::Write;

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::consts::*;
use crate::error::Error;
use crate::header::{MetaString, SlotHeader};
use crate::patch;
use crate::platform::{align_ceil, align_data, padding};

/// Everything needed to lay out one slot. An empty `sketch` makes the slot a category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSpec {
    pub title: MetaString,
    pub version: MetaString,
    pub developer: MetaString,
    pub info: MetaString,
    pub image: Vec<u8>,
    pub sketch: Vec<u8>,
    pub fx_data: Vec<u8>,
    pub fx_save: Vec<u8>,
}

impl SlotSpec {
    pub fn category(title: &str, info: &str, image: Vec<u8>) -> Self {
        Self {
            title: title.into(),
            info: info.into(),
            image,
            ..Default::default()
        }
    }

    pub fn is_category(&self) -> bool {
        self.sketch.is_empty()
    }
}

/// Validation and sketch patching switches for a [`FlashcartWriter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Require the first two slots to be categories.
    pub validate_category_structure: bool,
    /// Reject title images that aren't exactly one screen instead of padding them.
    pub validate_image_length: bool,
    pub patch_menu: bool,
    pub patch_micro_led: bool,
    pub patch_ssd1309: bool,
    pub contrast: Option<u8>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            validate_category_structure: true,
            validate_image_length: true,
            patch_menu: true,
            patch_micro_led: false,
            patch_ssd1309: false,
            contrast: None,
        }
    }
}

/// Writes a flashcart one slot at a time.
///
/// Slots are appended at the writer's cursor; previous/next links and the page pointers
/// inside each header are computed from it. Call [`FlashcartWriter::finish`] to write the
/// terminator page.
pub struct FlashcartWriter<W> {
    out: W,
    options: WriterOptions,
    category: u8,
    slots: usize,
    last_slot_page: u16,
    cursor: usize,
}

/// Page number of `address`. Header page fields are 16 bits wide, which caps a container
/// at 16 MiB.
fn page_of(address: usize) -> Result<u16, Error> {
    u16::try_from(address / FX_PAGE_SIZE).map_err(|_| {
        Error::DoesNotFit(format!(
            "address 0x{:06X} is past the last addressable page",
            address
        ))
    })
}

/// Hash stored in program headers: the unpatched sketch and the fx data, both page aligned.
pub fn slot_hash(sketch: &[u8], fx_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    let mut sketch = sketch.to_vec();
    align_data(&mut sketch, FX_PAGE_SIZE);
    hasher.update(&sketch);
    let mut data = fx_data.to_vec();
    align_data(&mut data, FX_PAGE_SIZE);
    hasher.update(&data);
    hex::encode(hasher.finalize())
}

impl<W: Write> FlashcartWriter<W> {
    pub fn new(out: W) -> Self {
        Self::with_options(out, WriterOptions::default())
    }

    pub fn with_options(out: W, options: WriterOptions) -> Self {
        Self {
            out,
            options,
            // The first category wraps around to id 0.
            category: u8::MAX,
            slots: 0,
            last_slot_page: UNSET_PAGE,
            cursor: 0,
        }
    }

    pub fn options_mut(&mut self) -> &mut WriterOptions {
        &mut self.options
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Byte address the next slot will be written at.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Lay out and write one slot, returning its size in bytes.
    pub fn write_slot(&mut self, spec: SlotSpec) -> Result<usize, Error> {
        let address = self.cursor;
        let first_page = page_of(address)?;
        let slot_end = |size: usize| page_of(address + size);

        let SlotSpec {
            title,
            version,
            developer,
            info,
            mut image,
            mut sketch,
            mut fx_data,
            mut fx_save,
        } = spec;
        let is_category = sketch.is_empty();

        if image.len() != HEADER_IMAGE_LENGTH {
            if self.options.validate_image_length {
                return Err(Error::InvalidImageLength {
                    slot: self.slots,
                    length: image.len(),
                });
            }
            warn!(
                "resizing title image of slot {} from {} to {} bytes",
                self.slots,
                image.len(),
                HEADER_IMAGE_LENGTH
            );
            image.resize(HEADER_IMAGE_LENGTH, 0xFF);
        }

        let mut header = SlotHeader {
            title,
            version,
            developer,
            info,
            ..Default::default()
        };
        let mut slot_size = HEADER_LENGTH + HEADER_IMAGE_LENGTH;
        let mut prealign = 0;

        if is_category {
            if !fx_data.is_empty() || !fx_save.is_empty() {
                return Err(Error::MissingSketch {
                    slot: self.slots,
                    what: if fx_data.is_empty() { "fx save" } else { "fx data" },
                });
            }
        } else {
            if self.slots < 2 && self.options.validate_category_structure {
                return Err(Error::StructuralViolation(self.slots));
            }

            let unpatched = sketch.clone();

            if self.options.patch_menu {
                match patch::patch_menu_buttons(&mut sketch) {
                    Ok(()) => info!("'{}': menu patch applied", header.title),
                    Err(reason) => info!("'{}': no menu patch applied: {}", header.title, reason),
                }
            }
            if self.options.patch_micro_led {
                patch::patch_micro_led(&mut sketch);
                info!("'{}': micro LED polarity patched", header.title);
            }
            if self.options.patch_ssd1309 || self.options.contrast.is_some() {
                let found =
                    patch::patch_screen(&mut sketch, self.options.patch_ssd1309, self.options.contrast);
                info!("'{}': {} screen init sequences patched", header.title, found);
            }

            align_data(&mut sketch, FLASH_PAGE_SIZE);
            let pages = sketch.len() / FLASH_PAGE_SIZE;
            if pages > MAX_PROGRAM_PAGES {
                return Err(Error::SketchTooLarge {
                    slot: self.slots,
                    pages,
                });
            }
            header.program_start = slot_end(slot_size)?;
            header.program_pages = pages as u8;
            align_data(&mut sketch, FX_PAGE_SIZE);
            slot_size += sketch.len();

            if !fx_data.is_empty() {
                align_data(&mut fx_data, FX_PAGE_SIZE);
                header.data_start = slot_end(slot_size)?;
                header.data_pages = (fx_data.len() / FX_PAGE_SIZE) as u16;
                slot_size += fx_data.len();
                sketch[SKETCH_DATA_VECTOR_OFFSET..SKETCH_DATA_VECTOR_OFFSET + 2]
                    .copy_from_slice(&RETI_INSTRUCTION);
                sketch[SKETCH_DATA_VECTOR_OFFSET + 2..SKETCH_DATA_VECTOR_OFFSET + 4]
                    .copy_from_slice(&header.data_start.to_be_bytes());
            }

            if !fx_save.is_empty() {
                align_data(&mut fx_save, FX_SAVE_ALIGNMENT);
                let unaligned = address + slot_size;
                prealign = align_ceil(unaligned, FX_SAVE_ALIGNMENT) - unaligned;
                slot_size += prealign;
                header.save_start = slot_end(slot_size)?;
                slot_size += fx_save.len();
                sketch[SKETCH_SAVE_VECTOR_OFFSET..SKETCH_SAVE_VECTOR_OFFSET + 2]
                    .copy_from_slice(&RETI_INSTRUCTION);
                sketch[SKETCH_SAVE_VECTOR_OFFSET + 2..SKETCH_SAVE_VECTOR_OFFSET + 4]
                    .copy_from_slice(&header.save_start.to_be_bytes());
            }

            header.sha256 = slot_hash(&unpatched, &fx_data);
        }

        // Only a slot that is actually written claims a new category id.
        let category = if is_category {
            self.category.wrapping_add(1)
        } else {
            self.category
        };
        header.category = category;
        if slot_size % FX_PAGE_SIZE != 0 {
            return Err(Error::AlignmentInvariant(slot_size));
        }
        header.slot_pages = (slot_size / FX_PAGE_SIZE) as u16;
        header.next_page = slot_end(slot_size)?;
        header.previous_page = self.last_slot_page;

        let encoded = header.encode()?;
        let gap = padding(prealign);
        let mut written = 0;
        for part in [
            &encoded[..],
            &image[..],
            &sketch[..],
            &fx_data[..],
            &gap[..],
            &fx_save[..],
        ] {
            self.out.write_all(part)?;
            written += part.len();
        }
        if written != slot_size {
            return Err(Error::WriteMismatch {
                title: header.title.to_string(),
                expected: slot_size,
                written,
            });
        }

        debug!(
            "slot {} '{}' at 0x{:06X}: {} pages{}",
            self.slots,
            header.title,
            address,
            header.slot_pages,
            if is_category { " (category)" } else { "" }
        );

        self.slots += 1;
        self.category = category;
        self.last_slot_page = first_page;
        self.cursor += slot_size;
        Ok(slot_size)
    }

    /// Write the terminating erased page and return the underlying sink.
    pub fn finish(mut self) -> Result<W, Error> {
        self.out.write_all(&padding(FX_PAGE_SIZE))?;
        self.out.flush()?;
        Ok(self.out)
    }
}
