//! `.arduboy` packages: a zip archive with an `info.json` describing one or more builds
//! of a game.

use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use arduboy_fx::title::image_to_title;
use arduboy_fx::{SCREEN_HEIGHT, SCREEN_WIDTH, SlotSpec};
use image::ImageReader;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use zip::ZipArchive;

use crate::error::Error;
use crate::hex::hex_to_bin;

pub const PACKAGE_INFO_FILE: &str = "info.json";

/// The parts of `info.json` needed to build a slot. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PackageInfo {
    pub schema_version: i64,
    pub title: String,
    pub description: String,
    pub author: String,
    pub version: String,
    pub binaries: Vec<PackageBinary>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackageBinary {
    pub title: String,
    /// The sketch, as intel hex.
    pub filename: String,
    pub device: String,
    #[serde(rename = "cartimage")]
    pub cart_image: String,
    #[serde(rename = "flashdata")]
    pub flash_data: String,
    #[serde(rename = "flashsave")]
    pub flash_save: String,
}

/// How to pick one binary out of a package.
#[derive(Debug, Clone, Copy)]
pub enum BinarySelection<'a> {
    /// By binary title if `exact` is set, else by device, else the only binary.
    Suitable { device: &'a str, exact: &'a str },
    /// The first device in preference order that has exactly one binary.
    Any(&'a [String]),
}

fn single<'a>(
    candidates: Vec<&'a PackageBinary>,
    what: impl FnOnce() -> String,
) -> Result<&'a PackageBinary, Error> {
    match candidates.as_slice() {
        [binary] => Ok(binary),
        [] => Err(Error::PackageSelection(format!("no binary for {}", what()))),
        many => Err(Error::PackageSelection(format!(
            "{} binaries for {}, be more specific",
            many.len(),
            what()
        ))),
    }
}

impl PackageInfo {
    fn for_device<'a>(&'a self, device: &str) -> Vec<&'a PackageBinary> {
        self.binaries
            .iter()
            .filter(|b| b.device.eq_ignore_ascii_case(device))
            .collect()
    }

    /// Pick a binary by exact title, or by device when no title is given. With neither, the
    /// package must contain exactly one binary.
    pub fn find_suitable_binary(&self, device: &str, exact: &str) -> Result<&PackageBinary, Error> {
        if !exact.is_empty() {
            let candidates = self.binaries.iter().filter(|b| b.title == exact).collect();
            single(candidates, || format!("title '{}'", exact))
        } else if !device.is_empty() {
            single(self.for_device(device), || format!("device '{}'", device))
        } else {
            single(self.binaries.iter().collect(), || "any device".to_string())
        }
    }

    /// Walk `devices` in order and return the binary of the first one the package supports.
    pub fn find_any_binary<S: AsRef<str>>(&self, devices: &[S]) -> Result<&PackageBinary, Error> {
        for device in devices {
            let device = device.as_ref();
            let candidates = self.for_device(device);
            if !candidates.is_empty() {
                return single(candidates, || format!("device '{}'", device));
            }
        }
        let wanted: Vec<&str> = devices.iter().map(AsRef::as_ref).collect();
        Err(Error::PackageSelection(format!(
            "no binary for any of {}",
            wanted.join(", ")
        )))
    }
}

pub struct Package<R> {
    archive: ZipArchive<R>,
    pub info: PackageInfo,
}

impl Package<BufReader<File>> {
    /// Open a package file. A missing title defaults to the file name without extension.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let mut package = Package::new(BufReader::new(File::open(path)?))?;
        if package.info.title.is_empty() {
            package.info.title = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            warn!(
                "no title set in {}, defaulting to {}",
                PACKAGE_INFO_FILE, package.info.title
            );
        }
        Ok(package)
    }
}

impl<R: Read + Seek> Package<R> {
    pub fn new(reader: R) -> Result<Self, Error> {
        let mut archive = ZipArchive::new(reader)?;
        let raw = load_file(&mut archive, PACKAGE_INFO_FILE)?;
        let info = serde_json::from_slice(&raw)?;
        Ok(Self { archive, info })
    }

    /// Read a whole file from the package. Names are matched ignoring case.
    pub fn load_file(&mut self, name: &str) -> Result<Vec<u8>, Error> {
        load_file(&mut self.archive, name)
    }

    /// Alphabetically first PNG or GIF with the screen's aspect ratio.
    pub fn find_suitable_image(&mut self) -> Result<Option<String>, Error> {
        let names: Vec<String> = self
            .archive
            .file_names()
            .filter(|n| {
                let lower = n.to_lowercase();
                lower.ends_with(".png") || lower.ends_with(".gif")
            })
            .map(str::to_string)
            .collect();

        let mut suitable = Vec::new();
        for name in names {
            let raw = self.load_file(&name)?;
            let dimensions = ImageReader::new(Cursor::new(raw))
                .with_guessed_format()?
                .into_dimensions();
            match dimensions {
                Ok((w, h)) if w as usize * SCREEN_HEIGHT == h as usize * SCREEN_WIDTH => {
                    suitable.push(name)
                }
                Ok(_) => {}
                Err(e) => warn!("skipping unreadable image {}: {}", name, e),
            }
        }
        suitable.sort();
        Ok(suitable.into_iter().next())
    }

    /// Build a slot from the selected binary. fx data and save are taken as they are.
    pub fn slot(&mut self, selection: BinarySelection, threshold: u8) -> Result<SlotSpec, Error> {
        let mut binary = match selection {
            BinarySelection::Suitable { device, exact } => {
                self.info.find_suitable_binary(device, exact)?
            }
            BinarySelection::Any(devices) => self.info.find_any_binary(devices)?,
        }
        .clone();

        let mut slot = SlotSpec {
            title: self.info.title.as_str().into(),
            info: self.info.description.as_str().into(),
            developer: self.info.author.as_str().into(),
            version: self.info.version.as_str().into(),
            ..Default::default()
        };

        let hex = self.load_file(&binary.filename)?;
        slot.sketch = hex_to_bin(&String::from_utf8_lossy(&hex))?;
        info!("package {} sketch: {} bytes", slot.title, slot.sketch.len());

        if !binary.flash_data.is_empty() {
            slot.fx_data = self.load_file(&binary.flash_data)?;
            info!("package {} flashdata: {} bytes", slot.title, slot.fx_data.len());
        }
        if !binary.flash_save.is_empty() {
            slot.fx_save = self.load_file(&binary.flash_save)?;
            info!("package {} flashsave: {} bytes", slot.title, slot.fx_save.len());
        }

        if binary.cart_image.is_empty() {
            match self.find_suitable_image()? {
                Some(name) => binary.cart_image = name,
                None => warn!("no suitable cart image in package {}", slot.title),
            }
        }
        if !binary.cart_image.is_empty() {
            let encoded = self.load_file(&binary.cart_image)?;
            slot.image = image_to_title(&encoded, threshold)?;
        }
        Ok(slot)
    }
}

fn load_file<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Result<Vec<u8>, Error> {
    let wanted = name.to_lowercase();
    let Some(found) = archive
        .file_names()
        .find(|n| n.to_lowercase() == wanted)
        .map(str::to_string)
    else {
        return Err(Error::MissingPackageFile(name.to_string()));
    };
    let mut file = archive.by_name(&found)?;
    let mut data = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Open the package at `path` and build a slot from it.
pub fn read_package<P: AsRef<Path>>(
    path: P,
    selection: BinarySelection,
    threshold: u8,
) -> Result<SlotSpec, Error> {
    Package::open(path)?.slot(selection, threshold)
}
