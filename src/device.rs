use serde::Serialize;

use crate::consts::FX_PAGE_SIZE;
use crate::error::Error;

const JEDEC_MANUFACTURERS: &[(u8, &str)] = &[
    (0x01, "Spansion"),
    (0x14, "Cypress"),
    (0x1C, "EON"),
    (0x1F, "Adesto(Atmel)"),
    (0x20, "Micron"),
    (0x37, "AMIC"),
    (0x9D, "ISSI"),
    (0xC2, "General Plus"),
    (0xC8, "Giga Device"),
    (0xBF, "Microchip"),
    (0xEF, "Winbond"),
];

/// Identity and size of a flash chip, as reported by its JEDEC id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JedecInfo {
    pub id: [u8; 3],
    /// Capacity in bytes.
    pub capacity: usize,
    pub manufacturer: String,
}

impl JedecInfo {
    /// Interpret a raw JEDEC id. All-zero and all-one ids mean no chip answered.
    pub fn from_id(id: [u8; 3]) -> Option<Self> {
        if id == [0, 0, 0] || id == [0xFF, 0xFF, 0xFF] || id[2] >= usize::BITS as u8 {
            return None;
        }
        let manufacturer = JEDEC_MANUFACTURERS
            .iter()
            .find(|(key, _)| *key == id[0])
            .map(|(_, name)| name.to_string())
            .unwrap_or_default();
        Some(Self {
            id,
            capacity: 1 << id[2],
            manufacturer,
        })
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            id: [0; 3],
            capacity,
            manufacturer: String::new(),
        }
    }

    /// Whether a flashcart of `size` bytes fits, leaving room for its terminator page.
    pub fn fits_flashcart(&self, size: usize) -> bool {
        size + FX_PAGE_SIZE <= self.capacity
    }

    /// Check that a flashcart of `flashcart_size` bytes and dev data of `data_size` bytes
    /// (anchored to the end of the chip) can coexist.
    ///
    /// Block writes touch whole erase blocks, so the flashcart and its terminator must end
    /// strictly before the dev data.
    pub fn validate_fits_fx_data(
        &self,
        flashcart_size: usize,
        data_size: usize,
        block_aligned: bool,
    ) -> Result<(), Error> {
        let Some(data_start) = self.capacity.checked_sub(data_size) else {
            return Err(Error::DoesNotFit(format!(
                "fx data of {} bytes is larger than the {} byte flash",
                data_size, self.capacity
            )));
        };
        let flashcart_end = flashcart_size + FX_PAGE_SIZE;
        let fits = if block_aligned {
            flashcart_end < data_start
        } else {
            flashcart_end <= data_start
        };
        if fits {
            Ok(())
        } else {
            Err(Error::DoesNotFit(format!(
                "flashcart ends at 0x{:06X} but fx data starts at 0x{:06X}",
                flashcart_end, data_start
            )))
        }
    }
}
