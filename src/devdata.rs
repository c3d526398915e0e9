//! Development fx data: a data blob plus optional save area, anchored to the end of a
//! 16 MiB flash chip, and the C++ header describing where everything lives.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{FX_DEV_FLASH_CAPACITY, FX_PAGE_SIZE, FX_SAVE_ALIGNMENT};
use crate::error::Error;
use crate::platform::{align_ceil, padding};

pub const HEADER_PREAMBLE: &str = "#pragma once\n\nusing uint24_t = __uint24;\n\n";

/// Final placement of the dev data and save. All values are bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FxOffsets {
    /// Data length as written by the generator.
    pub data_length: usize,
    pub save_length: usize,
    /// Data length on flash, padded to a page.
    pub data_length_flash: usize,
    /// Save length on flash, padded to a flash sector. Zero when there is no save.
    pub save_length_flash: usize,
    pub data_start: usize,
    /// Start of the save. Equals the chip capacity when there is no save.
    pub save_start: usize,
}

impl FxOffsets {
    pub fn has_save(&self) -> bool {
        self.save_length_flash > 0
    }
}

/// Streams fx data into a binary sink while writing the matching header.
pub struct DevDataWriter<H, B> {
    header: H,
    bin: B,
    bin_length: usize,
    data_end: usize,
    save_start: usize,
    has_save: bool,
    wrote_preamble: bool,
}

fn header_field(kind: &str, name: &str, value: usize, hex_digits: usize) -> String {
    if hex_digits > 0 {
        format!("constexpr {} {} = 0x{:0width$X};\n", kind, name, value, width = hex_digits)
    } else {
        format!("constexpr {} {} = {};\n", kind, name, value)
    }
}

fn main_pointer(name: &str, address: usize, length: usize) -> String {
    format!(
        "{}{}\n",
        header_field("uint16_t", &format!("{}_PAGE", name), address / FX_PAGE_SIZE, 4),
        header_field("uint24_t", &format!("{}_BYTES", name), length, 0)
    )
}

impl<H: Write, B: Write> DevDataWriter<H, B> {
    pub fn new(header: H, bin: B) -> Self {
        Self {
            header,
            bin,
            bin_length: 0,
            data_end: 0,
            save_start: 0,
            has_save: false,
            wrote_preamble: false,
        }
    }

    /// Address of the next byte, relative to the start of the current region (data or save).
    pub fn current_address(&self) -> usize {
        self.bin_length - self.save_start
    }

    pub fn bin_length(&self) -> usize {
        self.bin_length
    }

    pub fn has_save(&self) -> bool {
        self.has_save
    }

    /// Append raw text to the header, followed by `extra_newlines` newlines.
    pub fn write_header(&mut self, text: &str, extra_newlines: usize) -> Result<(), Error> {
        self.header.write_all(text.as_bytes())?;
        self.header.write_all("\n".repeat(extra_newlines).as_bytes())?;
        Ok(())
    }

    /// Write the standard header preamble. Only the first call has any effect.
    pub fn preamble(&mut self) -> Result<(), Error> {
        if !self.wrote_preamble {
            self.wrote_preamble = true;
            self.write_header(HEADER_PREAMBLE, 0)?;
        }
        Ok(())
    }

    /// Declare a named address constant pointing at the next byte and return that address.
    pub fn field(&mut self, name: &str) -> Result<usize, Error> {
        let address = self.current_address();
        self.write_header(&header_field("uint24_t", name, address, 6), 0)?;
        Ok(address)
    }

    pub fn write(&mut self, data: &[u8]) -> Result<usize, Error> {
        self.bin.write_all(data)?;
        self.bin_length += data.len();
        Ok(data.len())
    }

    /// Pad with erased bytes to `alignment`. With `increase`, an already aligned stream
    /// still grows by a full `alignment`.
    pub fn pad(&mut self, alignment: usize, increase: bool) -> Result<usize, Error> {
        if alignment == 0 {
            return Ok(0);
        }
        let mut target = align_ceil(self.bin_length, alignment);
        if target == self.bin_length && increase {
            target += alignment;
        }
        if target == self.bin_length {
            return Ok(0);
        }
        debug!(
            "padding data to {} alignment: {} -> {}",
            alignment, self.bin_length, target
        );
        self.write(&padding(target - self.bin_length))
    }

    /// End the data region and start the save region on the next page.
    pub fn begin_save(&mut self) -> Result<usize, Error> {
        self.data_end = self.bin_length;
        self.has_save = true;
        let written = self.pad(FX_PAGE_SIZE, false)?;
        self.save_start = self.bin_length;
        Ok(written)
    }

    /// Pad the binary to its final size, write the address constants and return the placement.
    pub fn finalize(mut self) -> Result<(FxOffsets, H, B), Error> {
        let mut offsets = FxOffsets::default();
        if self.has_save {
            offsets.data_length = self.data_end;
            offsets.data_length_flash = self.save_start;
            offsets.save_length = self.bin_length - self.save_start;
            let mut target = align_ceil(self.bin_length, FX_SAVE_ALIGNMENT);
            if offsets.save_length == 0 {
                // A begun save always occupies at least one sector.
                target += FX_SAVE_ALIGNMENT;
            }
            if target > self.bin_length {
                self.write(&padding(target - self.bin_length))?;
            }
            offsets.save_length_flash = self.bin_length - self.save_start;
        } else {
            offsets.data_length = self.bin_length;
            self.pad(FX_PAGE_SIZE, false)?;
            offsets.data_length_flash = self.bin_length;
        }
        offsets.save_start = FX_DEV_FLASH_CAPACITY - offsets.save_length_flash;
        offsets.data_start = offsets.save_start - offsets.data_length_flash;

        let mut pointers = String::from("\n// Generated fx addresses\n");
        pointers += &main_pointer("FX_DATA", offsets.data_start, offsets.data_length);
        if self.has_save {
            pointers += &main_pointer("FX_SAVE", offsets.save_start, offsets.save_length);
            pointers += "#define FX_INIT() FX::begin(FX_DATA_PAGE, FX_SAVE_PAGE)\n";
        } else {
            pointers += "#define FX_INIT() FX::begin(FX_DATA_PAGE)\n";
        }
        self.write_header(&pointers, 0)?;
        self.header.flush()?;
        self.bin.flush()?;

        debug!("{:?}", offsets);
        Ok((offsets, self.header, self.bin))
    }
}

/// Build the release binaries for a dev data blob: the data padded to a page, the save
/// padded to a sector. Returns the data and save halves.
pub fn split_dev_binary(dev: &[u8], offsets: &FxOffsets) -> Result<(Vec<u8>, Vec<u8>), Error> {
    let data_end = offsets.data_length_flash;
    let save_end = data_end + offsets.save_length_flash;
    if dev.len() < save_end {
        return Err(Error::DoesNotFit(format!(
            "dev binary has {} bytes, expected {}",
            dev.len(),
            save_end
        )));
    }
    Ok((dev[..data_end].to_vec(), dev[data_end..save_end].to_vec()))
}

/// Join a data blob and a save blob into one dev binary, aligned like the generator
/// would align them.
pub fn align_fx_files(data: &[u8], save: &[u8]) -> Vec<u8> {
    let mut result = data.to_vec();
    result.resize(align_ceil(result.len(), FX_PAGE_SIZE), 0xFF);
    if !save.is_empty() {
        let save_start = result.len();
        result.extend_from_slice(save);
        result.resize(save_start + align_ceil(save.len(), FX_SAVE_ALIGNMENT), 0xFF);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_field_formats() {
        assert_eq!(
            header_field("uint24_t", "sprite", 0x1D, 6),
            "constexpr uint24_t sprite = 0x00001D;\n"
        );
        assert_eq!(
            main_pointer("FX_DATA", 0xFFF000, 12),
            "constexpr uint16_t FX_DATA_PAGE = 0xFFF0;\nconstexpr uint24_t FX_DATA_BYTES = 12;\n\n"
        );
    }

    #[test]
    fn align_fx_files_pads_both_halves() {
        let joined = align_fx_files(&[1, 2, 3], &[4]);
        assert_eq!(joined.len(), 256 + 4096);
        assert_eq!(joined[256], 4);
        assert_eq!(joined[3], 0xFF);
    }
}
