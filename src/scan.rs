//! Walking the chain of slot headers, either on a live device or in a container file.
//!
//! Both variants share [`walk`]; they differ only in how a header is fetched and how the
//! next slot is located, which is what [`SlotSource`] abstracts.

use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};

#[cfg(feature = "debug-logs")]
use tracing::trace;
use tracing::debug;

use crate::consts::{FX_PAGE_SIZE, HEADER_LENGTH};
use crate::error::Error;
use crate::header::SlotHeader;
use crate::platform::{FlashResource, Indicator, Strobe};

/// Outcome of reading one position in the chain. Reaching the end is not an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStep {
    Slot(SlotHeader),
    EndOfChain,
}

/// Where a visited slot lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLocation {
    /// Byte address of the slot header.
    pub address: usize,
    /// Number of slots before this one.
    pub index: usize,
}

impl SlotLocation {
    pub fn page(&self) -> usize {
        self.address / FX_PAGE_SIZE
    }
}

/// Result of a completed scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScanSummary {
    /// Address just past the last slot, where the terminator sits.
    pub end_address: usize,
    pub slots: usize,
}

pub trait SlotSource {
    /// Read the header expected at `address`.
    fn read_step(&mut self, address: usize) -> Result<ChainStep, Error>;

    /// Address of the slot following `header`.
    fn next_address(&mut self, header: &SlotHeader, location: SlotLocation) -> Result<usize, Error>;

    /// Called before every read with the number of slots seen so far.
    fn before_step(&mut self, _index: usize) -> Result<(), Error> {
        Ok(())
    }
}

fn decode_step(raw: &[u8]) -> Result<ChainStep, Error> {
    match SlotHeader::decode(raw) {
        Ok((header, _)) => Ok(ChainStep::Slot(header)),
        Err(e) if e.is_end_of_chain() => Ok(ChainStep::EndOfChain),
        Err(e) => Err(e),
    }
}

/// Visit every slot from address 0 until the first position without a header.
///
/// The visitor gets the source back so it can read slot payloads; an error from the
/// visitor aborts the scan.
pub fn walk<S, F>(source: &mut S, mut visit: F) -> Result<ScanSummary, Error>
where
    S: SlotSource,
    F: FnMut(&mut S, &SlotHeader, SlotLocation) -> Result<(), Error>,
{
    let mut address = 0;
    let mut index = 0;
    loop {
        source.before_step(index)?;
        let header = match source.read_step(address)? {
            ChainStep::EndOfChain => {
                return Ok(ScanSummary {
                    end_address: address,
                    slots: index,
                });
            }
            ChainStep::Slot(header) => header,
        };
        if header.slot_pages == 0 {
            return Err(Error::MalformedContainer(format!(
                "slot {} at 0x{:06X} has zero size",
                index, address
            )));
        }

        #[cfg(feature = "debug-logs")]
        trace!(
            "slot {} at 0x{:06X}: '{}' ({} pages)",
            index, address, header.title, header.slot_pages
        );

        let location = SlotLocation { address, index };
        visit(source, &header, location)?;
        address = source.next_address(&header, location)?;
        index += 1;
    }
}

/// Slot source backed by a live flash resource.
pub struct DeviceSource<R> {
    resource: R,
    indicator: Indicator,
    raw: [u8; HEADER_LENGTH],
}

impl<R: FlashResource> DeviceSource<R> {
    pub fn new(resource: R, progress: Option<Strobe>) -> Self {
        Self {
            resource,
            indicator: Indicator::new(progress),
            raw: [0xFF; HEADER_LENGTH],
        }
    }

    pub fn resource_mut(&mut self) -> &mut R {
        &mut self.resource
    }

    /// Raw bytes of the most recently read header.
    pub fn header_bytes(&self) -> &[u8; HEADER_LENGTH] {
        &self.raw
    }

    /// Turn the indicator back off and hand back the resource.
    pub fn finish(mut self) -> Result<R, Error> {
        self.indicator.reset(&mut self.resource)?;
        Ok(self.resource)
    }
}

impl<R: FlashResource> SlotSource for DeviceSource<R> {
    fn read_step(&mut self, address: usize) -> Result<ChainStep, Error> {
        let Ok(page) = u16::try_from(address / FX_PAGE_SIZE) else {
            return Ok(ChainStep::EndOfChain);
        };
        self.resource.read_pages(page, &mut self.raw)?;
        decode_step(&self.raw)
    }

    fn next_address(&mut self, header: &SlotHeader, location: SlotLocation) -> Result<usize, Error> {
        Ok(location.address + header.slot_bytes())
    }

    fn before_step(&mut self, index: usize) -> Result<(), Error> {
        self.indicator.update(&mut self.resource, index)
    }
}

/// Slot source backed by a container file or any other seekable byte stream.
pub struct FileSource<F> {
    file: F,
}

impl<F: Read + Seek> FileSource<F> {
    pub fn new(file: F) -> Self {
        Self { file }
    }

    /// Read exactly `buf.len()` bytes at `address`.
    pub fn read_at(&mut self, address: usize, buf: &mut [u8]) -> Result<(), Error> {
        self.file.seek(SeekFrom::Start(address as u64))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> F {
        self.file
    }
}

impl<F: Read + Seek> SlotSource for FileSource<F> {
    fn read_step(&mut self, address: usize) -> Result<ChainStep, Error> {
        let mut raw = [0u8; HEADER_LENGTH];
        self.file.seek(SeekFrom::Start(address as u64))?;
        match self.file.read_exact(&mut raw) {
            Ok(()) => decode_step(&raw),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(ChainStep::EndOfChain),
            Err(e) => Err(e.into()),
        }
    }

    fn next_address(&mut self, header: &SlotHeader, location: SlotLocation) -> Result<usize, Error> {
        let expected = (location.address + header.slot_bytes()) / FX_PAGE_SIZE;
        if header.next_page as usize != expected {
            return Err(Error::ChainMismatch {
                address: location.address,
                next_page: header.next_page,
                expected,
            });
        }
        Ok(header.next_page as usize * FX_PAGE_SIZE)
    }
}

/// Scan the flashcart on a live device.
///
/// With `progress` set, the indicator LED blinks while scanning and is switched off
/// afterwards even when the scan fails.
pub fn scan_device<R, F>(
    resource: R,
    progress: Option<Strobe>,
    visit: F,
) -> Result<ScanSummary, Error>
where
    R: FlashResource,
    F: FnMut(&mut DeviceSource<R>, &SlotHeader, SlotLocation) -> Result<(), Error>,
{
    let mut source = DeviceSource::new(resource, progress);
    let result = walk(&mut source, visit);
    let reset = source.finish();
    let summary = result?;
    reset?;
    debug!(
        "scanned {} slots on device, flashcart ends at 0x{:06X}",
        summary.slots, summary.end_address
    );
    Ok(summary)
}

/// Scan a flashcart container held in a seekable stream.
pub fn scan_file<F, V>(file: F, visit: V) -> Result<ScanSummary, Error>
where
    F: Read + Seek,
    V: FnMut(&mut FileSource<F>, &SlotHeader, SlotLocation) -> Result<(), Error>,
{
    let mut source = FileSource::new(file);
    let summary = walk(&mut source, visit)?;
    debug!(
        "scanned {} slots in file, flashcart ends at 0x{:06X}",
        summary.slots, summary.end_address
    );
    Ok(summary)
}

/// Largest page-aligned read issued while copying a slot.
const MAX_READ_CHUNK: usize = (1 << 16) - FX_PAGE_SIZE;

/// Copy the whole flashcart, slot by slot, from a live device into `output`.
///
/// Only the chain is read, not the free space after it. The terminator is not copied.
pub fn read_whole_flashcart<R, W>(
    resource: R,
    mut output: W,
    progress: Option<Strobe>,
) -> Result<ScanSummary, Error>
where
    R: FlashResource,
    W: Write,
{
    let mut buffer = vec![0u8; MAX_READ_CHUNK];
    scan_device(resource, progress, |source, header, location| {
        debug!(
            "[{}] reading: {} ({} - {})",
            location.index + 1,
            header.title,
            header.developer,
            header.version
        );
        output.write_all(source.header_bytes())?;

        let end = location.address + header.slot_bytes();
        let mut address = location.address + HEADER_LENGTH;
        while address < end {
            let chunk = &mut buffer[..(end - address).min(MAX_READ_CHUNK)];
            let page = u16::try_from(address / FX_PAGE_SIZE).map_err(|_| {
                Error::MalformedContainer(format!("slot '{}' runs past the flash", header.title))
            })?;
            source.resource_mut().read_pages(page, chunk)?;
            output.write_all(chunk)?;
            address += chunk.len();
        }
        Ok(())
    })
}
