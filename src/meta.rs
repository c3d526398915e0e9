//! Flashcart metadata: the category/program tree with optional title images.

use std::io::{Read, Seek};
use std::panic;
use std::thread;

use crossbeam::channel::{self, Receiver};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::consts::{HEADER_IMAGE_LENGTH, HEADER_LENGTH};
use crate::error::Error;
use crate::header::SlotHeader;
use crate::platform::{FlashResource, Strobe};
use crate::scan::{scan_device, scan_file};
use crate::title::title_to_data_url;

/// Slots per LED blink while only headers are read.
const HEADER_SCAN_RATE: usize = 64;
/// Reading images is slower, so blink faster to show progress.
const IMAGE_SCAN_RATE: usize = 16;
/// Title images rendered at the same time while scanning a device.
const MAX_CONVERSIONS: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderProgram {
    pub title: String,
    pub version: String,
    pub developer: String,
    pub info: String,
    pub sha256: String,
    /// Slot size in bytes, header included.
    pub total_size: usize,
    /// `data:` URL of the title image, empty when images weren't requested.
    pub image: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct HeaderCategory {
    pub title: String,
    pub info: String,
    pub image: String,
    pub slots: Vec<HeaderProgram>,
}

/// Where a slot landed in the category tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaTarget {
    Category(usize),
    Program(usize, usize),
}

/// Append `header` to the tree. Programs go under the most recent category.
pub fn map_header(result: &mut Vec<HeaderCategory>, header: &SlotHeader) -> Result<MetaTarget, Error> {
    if header.is_category() {
        result.push(HeaderCategory {
            title: header.title.to_string_lossy(),
            info: header.info.to_string_lossy(),
            ..Default::default()
        });
        return Ok(MetaTarget::Category(result.len() - 1));
    }

    let Some(index) = result.len().checked_sub(1) else {
        return Err(Error::MalformedContainer(
            "flashcart did not start with a category".into(),
        ));
    };
    let slots = &mut result[index].slots;
    slots.push(HeaderProgram {
        title: header.title.to_string_lossy(),
        version: header.version.to_string_lossy(),
        developer: header.developer.to_string_lossy(),
        info: header.info.to_string_lossy(),
        sha256: header.sha256.clone(),
        total_size: header.slot_bytes(),
        image: String::new(),
    });
    Ok(MetaTarget::Program(index, slots.len() - 1))
}

fn set_image(result: &mut [HeaderCategory], target: MetaTarget, image: String) {
    match target {
        MetaTarget::Category(c) => result[c].image = image,
        MetaTarget::Program(c, p) => result[c].slots[p].image = image,
    }
}

type Conversion = (MetaTarget, Result<String, Error>);

/// Collect finished conversions until at most `keep` are still pending.
fn collect_conversions(
    rx: &Receiver<Conversion>,
    result: &mut [HeaderCategory],
    pending: &mut usize,
    keep: usize,
) -> Result<(), Error> {
    while *pending > keep {
        let (target, image) = rx
            .recv()
            .map_err(|_| Error::Resource("title image conversion stopped without a result".into()))?;
        *pending -= 1;
        set_image(result, target, image?);
    }
    Ok(())
}

/// Scrape the metadata tree off a live device.
///
/// Title images are read while scanning, but PNG rendering runs on worker threads so it
/// doesn't hold up the chain walk. A few run at once and all of them are collected before
/// returning.
pub fn scan_device_meta<R: FlashResource>(
    resource: R,
    images: bool,
) -> Result<Vec<HeaderCategory>, Error> {
    let mut result = Vec::new();
    let (tx, rx) = channel::unbounded::<Conversion>();
    let mut pending = 0usize;

    let progress = Strobe::with_rate(if images { IMAGE_SCAN_RATE } else { HEADER_SCAN_RATE });
    let summary = scan_device(resource, Some(progress), |source, header, location| {
        // Surface conversion failures as early as possible.
        while let Ok((target, image)) = rx.try_recv() {
            pending -= 1;
            set_image(&mut result, target, image?);
        }

        let target = map_header(&mut result, header)?;
        if images {
            collect_conversions(&rx, &mut result, &mut pending, MAX_CONVERSIONS - 1)?;
            let mut raw = vec![0u8; HEADER_IMAGE_LENGTH];
            let page = (location.page() + 1) as u16;
            source.resource_mut().read_pages(page, &mut raw)?;
            let tx = tx.clone();
            pending += 1;
            thread::spawn(move || {
                let image = panic::catch_unwind(|| title_to_data_url(&raw)).unwrap_or_else(|_| {
                    Err(Error::Resource("title image conversion panicked".into()))
                });
                // The receiver is gone only if the scan already failed.
                let _ = tx.send((target, image));
            });
        }
        Ok(())
    })?;

    // Workers hold the only senders now, so a lost result ends the wait.
    drop(tx);
    collect_conversions(&rx, &mut result, &mut pending, 0)?;

    debug!("collected metadata for {} slots", summary.slots);
    Ok(result)
}

/// Scrape the metadata tree out of a container file.
pub fn scan_file_meta<F: Read + Seek>(file: F, images: bool) -> Result<Vec<HeaderCategory>, Error> {
    let mut result = Vec::new();
    let mut raw = vec![0u8; HEADER_IMAGE_LENGTH];
    scan_file(file, |source, header, location| {
        let target = map_header(&mut result, header)?;
        if images {
            source.read_at(location.address + HEADER_LENGTH, &mut raw)?;
            set_image(&mut result, target, title_to_data_url(&raw)?);
        }
        Ok(())
    })?;
    Ok(result)
}
