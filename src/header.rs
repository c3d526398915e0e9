//! Fixed 256-byte slot header at the start of every flashcart slot.

use std::fmt;

use tracing::warn;

use crate::consts::*;
use crate::error::Error;

/// One metadata string as stored on flash.
///
/// The bytes are kept as found. Older carts carry Latin-1 titles, so nothing here
/// assumes UTF-8 except [`fmt::Display`], which is lossy.
#[derive(Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MetaString(Vec<u8>);

impl MetaString {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0).into_owned()
    }
}

impl fmt::Display for MetaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Debug for MetaString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0.escape_ascii())
    }
}

impl AsRef<[u8]> for MetaString {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for MetaString {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for MetaString {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<String> for MetaString {
    fn from(text: String) -> Self {
        Self(text.into_bytes())
    }
}

impl From<&str> for MetaString {
    fn from(text: &str) -> Self {
        Self(text.as_bytes().to_vec())
    }
}

impl PartialEq<str> for MetaString {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<&str> for MetaString {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.as_bytes()
    }
}

impl PartialEq<String> for MetaString {
    fn eq(&self, other: &String) -> bool {
        self.0 == other.as_bytes()
    }
}

/// Decoded slot header. Page fields are in units of [`FX_PAGE_SIZE`] except
/// `program_pages`, which counts 128-byte internal flash pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotHeader {
    pub category: u8,
    pub previous_page: u16,
    pub next_page: u16,
    pub slot_pages: u16,
    pub program_pages: u8,
    pub program_start: u16,
    pub data_start: u16,
    pub save_start: u16,
    pub data_pages: u16,
    /// Lower-case hex. Empty leaves the hash field erased.
    pub sha256: String,
    pub title: MetaString,
    pub version: MetaString,
    pub developer: MetaString,
    pub info: MetaString,
}

impl Default for SlotHeader {
    fn default() -> Self {
        Self {
            category: 0,
            previous_page: UNSET_PAGE,
            next_page: UNSET_PAGE,
            slot_pages: 0,
            program_pages: 0,
            program_start: UNSET_PAGE,
            data_start: UNSET_PAGE,
            save_start: UNSET_PAGE,
            data_pages: UNSET_PAGE,
            sha256: String::new(),
            title: MetaString::default(),
            version: MetaString::default(),
            developer: MetaString::default(),
            info: MetaString::default(),
        }
    }
}

#[inline]
fn read_u16(data: &[u8], index: usize) -> u16 {
    u16::from_be_bytes([data[index], data[index + 1]])
}

#[inline]
fn write_u16(data: &mut [u8], index: usize, value: u16) {
    data[index..index + 2].copy_from_slice(&value.to_be_bytes());
}

impl SlotHeader {
    pub fn is_category(&self) -> bool {
        self.program_start == UNSET_PAGE
    }

    pub fn has_fx_data(&self) -> bool {
        self.data_start != UNSET_PAGE
    }

    pub fn has_fx_save(&self) -> bool {
        self.save_start != UNSET_PAGE
    }

    /// Older writers never filled the data size field, so the data length can't be
    /// recovered from the header alone.
    pub fn is_old_format(&self) -> bool {
        !self.is_category() && self.has_fx_data() && self.data_pages == UNSET_PAGE
    }

    /// Total size of the slot in bytes, header included.
    pub fn slot_bytes(&self) -> usize {
        self.slot_pages as usize * FX_PAGE_SIZE
    }

    fn meta_strings(&self) -> Vec<&[u8]> {
        if self.is_category() {
            vec![self.title.as_bytes(), self.info.as_bytes()]
        } else {
            vec![
                self.title.as_bytes(),
                self.version.as_bytes(),
                self.developer.as_bytes(),
                self.info.as_bytes(),
            ]
        }
    }

    /// Encode into the on-flash representation.
    ///
    /// Metadata that doesn't fit in the 199 available bytes is truncated with a warning.
    pub fn encode(&self) -> Result<[u8; HEADER_LENGTH], Error> {
        let mut result = [0xFFu8; HEADER_LENGTH];
        result[..HEADER_MAGIC.len()].copy_from_slice(HEADER_MAGIC);

        result[HEADER_CATEGORY_OFFSET] = self.category;
        write_u16(&mut result, HEADER_PREVIOUS_PAGE_OFFSET, self.previous_page);
        write_u16(&mut result, HEADER_NEXT_PAGE_OFFSET, self.next_page);
        write_u16(&mut result, HEADER_SLOT_SIZE_OFFSET, self.slot_pages);
        result[HEADER_PROGRAM_SIZE_OFFSET] = self.program_pages;
        write_u16(&mut result, HEADER_PROGRAM_START_OFFSET, self.program_start);
        write_u16(&mut result, HEADER_DATA_START_OFFSET, self.data_start);
        write_u16(&mut result, HEADER_SAVE_START_OFFSET, self.save_start);
        write_u16(&mut result, HEADER_DATA_SIZE_OFFSET, self.data_pages);

        let hash = hex::decode(&self.sha256)?;
        let hash_len = hash.len().min(HEADER_HASH_LENGTH);
        result[HEADER_HASH_OFFSET..HEADER_HASH_OFFSET + hash_len]
            .copy_from_slice(&hash[..hash_len]);

        let strings = self.meta_strings();
        let (written, truncated) = fill_string_array(&strings, &mut result[HEADER_META_OFFSET..]);
        if written != strings.len() || truncated != 0 {
            warn!(
                "couldn't write all metadata for '{}': stopped on string [{}], truncated {}",
                self.title, written, truncated
            );
        }

        Ok(result)
    }

    /// Decode a header from the start of `data`, returning it with the bytes that follow.
    ///
    /// Fails with [`Error::NotHeader`] when the magic prefix is missing, which marks the
    /// end of a flashcart.
    pub fn decode(data: &[u8]) -> Result<(SlotHeader, &[u8]), Error> {
        if data.len() < HEADER_LENGTH {
            return Err(Error::NotEnoughData {
                expected: HEADER_LENGTH,
                found: data.len(),
            });
        }
        if !data.starts_with(HEADER_MAGIC) {
            return Err(Error::NotHeader);
        }

        let mut header = SlotHeader {
            category: data[HEADER_CATEGORY_OFFSET],
            previous_page: read_u16(data, HEADER_PREVIOUS_PAGE_OFFSET),
            next_page: read_u16(data, HEADER_NEXT_PAGE_OFFSET),
            slot_pages: read_u16(data, HEADER_SLOT_SIZE_OFFSET),
            program_pages: data[HEADER_PROGRAM_SIZE_OFFSET],
            program_start: read_u16(data, HEADER_PROGRAM_START_OFFSET),
            data_start: read_u16(data, HEADER_DATA_START_OFFSET),
            save_start: read_u16(data, HEADER_SAVE_START_OFFSET),
            data_pages: read_u16(data, HEADER_DATA_SIZE_OFFSET),
            sha256: hex::encode(&data[HEADER_HASH_OFFSET..HEADER_HASH_OFFSET + HEADER_HASH_LENGTH]),
            ..Default::default()
        };

        let mut strings = parse_string_array(&data[HEADER_META_OFFSET..HEADER_LENGTH]).into_iter();
        let mut next = || strings.next().unwrap_or_default();
        header.title = next();
        if header.is_category() {
            header.info = next();
        } else {
            header.version = next();
            header.developer = next();
            header.info = next();
        }

        Ok((header, &data[HEADER_LENGTH..]))
    }
}

/// Split a NUL-separated string block into its strings. A final string without a
/// terminator runs to the end of the block; the block always yields at least 4 strings.
pub fn parse_string_array(data: &[u8]) -> Vec<MetaString> {
    let mut result = Vec::new();
    let mut rest = data;
    while !rest.is_empty() && result.len() < 4 {
        match rest.iter().position(|&b| b == 0) {
            Some(end) => {
                result.push(MetaString::from(&rest[..end]));
                rest = &rest[end + 1..];
            }
            None => {
                // Erased tail of the block is not a string.
                let end = rest.iter().position(|&b| b == 0xFF).unwrap_or(rest.len());
                result.push(MetaString::from(&rest[..end]));
                break;
            }
        }
    }
    result.resize(4, MetaString::default());
    result
}

/// Pack `strings` NUL-terminated into `data`.
///
/// Returns how many strings were written completely and how many bytes were cut off.
/// A string that only fits without its terminator still counts as written.
pub fn fill_string_array<S: AsRef<[u8]>>(strings: &[S], data: &mut [u8]) -> (usize, usize) {
    let mut position = 0;
    for (index, string) in strings.iter().enumerate() {
        let bytes = string.as_ref();
        let available = data.len() - position;
        if bytes.len() > available {
            data[position..].copy_from_slice(&bytes[..available]);
            let truncated = bytes.len() - available
                + strings[index + 1..]
                    .iter()
                    .map(|s| s.as_ref().len())
                    .sum::<usize>();
            return (index, truncated);
        }
        data[position..position + bytes.len()].copy_from_slice(bytes);
        position += bytes.len();
        if position < data.len() {
            data[position] = 0;
            position += 1;
        }
    }
    (strings.len(), 0)
}
