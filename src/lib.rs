//! Arduboy FX flashcart containers.
//!
//! A flashcart is a chain of slots on the external flash chip, each starting with a
//! 256-byte header and a title image. Categories group the programs that follow them.
//! This crate encodes and decodes slot headers, walks the chain on a live device or in a
//! file, lays out new containers and produces the dev data used while developing games.

pub mod consts;
pub mod devdata;
pub mod device;
pub mod error;
pub mod header;
pub mod meta;
pub mod patch;
pub mod platform;
pub mod scan;
pub mod title;
pub mod writer;

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

pub use consts::*;
pub use devdata::{DevDataWriter, FxOffsets};
pub use device::JedecInfo;
pub use error::Error;
pub use header::{MetaString, SlotHeader};
pub use meta::{HeaderCategory, HeaderProgram};
pub use platform::{FlashResource, NorFlashResource, Strobe};
pub use scan::{ChainStep, ScanSummary, SlotLocation};
pub use writer::{FlashcartWriter, SlotSpec, WriterOptions};

/// The headers of a flashcart container, in chain order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flashcart {
    pub slots: Vec<(SlotLocation, SlotHeader)>,
    /// Bytes used by the chain, excluding the terminator.
    pub size: usize,
}

impl Flashcart {
    /// Read all headers from a container stream.
    pub fn parse<F: Read + Seek>(file: F) -> Result<Self, Error> {
        let mut slots = Vec::new();
        let summary = scan::scan_file(file, |_, header, location| {
            slots.push((location, header.clone()));
            Ok(())
        })?;
        Ok(Self {
            slots,
            size: summary.end_address,
        })
    }

    /// Read all headers from a container file at `path`.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Self::parse(BufReader::new(File::open(path)?))
    }

    /// Read all headers from a live device.
    pub fn read_device<R: FlashResource>(resource: R, progress: Option<Strobe>) -> Result<Self, Error> {
        let mut slots = Vec::new();
        let summary = scan::scan_device(resource, progress, |_, header, location| {
            slots.push((location, header.clone()));
            Ok(())
        })?;
        Ok(Self {
            slots,
            size: summary.end_address,
        })
    }

    pub fn categories(&self) -> usize {
        self.slots.iter().filter(|(_, h)| h.is_category()).count()
    }

    pub fn programs(&self) -> usize {
        self.slots.len() - self.categories()
    }

    /// Metadata tree for a container file at `path`, optionally with title images.
    pub fn metadata_file<P: AsRef<Path>>(path: P, images: bool) -> Result<Vec<HeaderCategory>, Error> {
        meta::scan_file_meta(BufReader::new(File::open(path)?), images)
    }
}
