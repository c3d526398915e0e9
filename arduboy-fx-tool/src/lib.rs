//! Arduboy FX flashcart tooling: Lua scripts that build flashcarts and fx data, package
//! extraction, Intel HEX transcoding and metadata export.

pub mod error;
pub mod hex;
pub mod package;
pub mod script;

mod csv;

use std::fs;
use std::path::Path;

use arduboy_fx::devdata::{align_fx_files, split_dev_binary};
use arduboy_fx::{Flashcart, FxOffsets, HeaderCategory};

pub use error::Error;
pub use package::{BinarySelection, Package, PackageInfo, read_package};
pub use script::{ScriptSession, ScriptSlot, run_flashcart_script, run_fxdata_script};

/// Metadata of a flashcart container, grouped by category.
///
/// This is the in-memory representation used for the JSON and CSV reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlashcartReport {
    pub categories: Vec<HeaderCategory>,
}

impl FlashcartReport {
    /// Scan the container file at `path`. With `images`, title images are included as
    /// PNG data URLs.
    pub fn from_file<P: AsRef<Path>>(path: P, images: bool) -> Result<Self, Error> {
        Ok(Self {
            categories: Flashcart::metadata_file(path, images)?,
        })
    }

    pub fn programs(&self) -> usize {
        self.categories.iter().map(|c| c.slots.len()).sum()
    }

    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string_pretty(&self.categories)?)
    }

    /// Serialize the report to CSV and return the content as a `String`.
    pub fn to_csv(&self) -> Result<String, Error> {
        csv::writer::write_csv_content(&self.categories)
    }

    /// Serialize the report to a CSV file at `path`. Images are not exported.
    pub fn to_csv_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Error> {
        csv::writer::write_csv(&self.categories, path)
    }
}

/// Run the flashcart script at `path`. Relative paths inside the script resolve against
/// `directory`, or the script's own directory when `directory` is `None`.
pub fn run_flashcart_script_file<P: AsRef<Path>>(
    path: P,
    arguments: &[String],
    directory: Option<&Path>,
) -> Result<String, Error> {
    let path = path.as_ref();
    let script = fs::read_to_string(path)?;
    let directory = match directory {
        Some(d) => d.to_path_buf(),
        None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    run_flashcart_script(&script, arguments, directory)
}

/// Output of an fx data build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FxDataBuild {
    pub offsets: FxOffsets,
    pub header: String,
    /// The dev binary: data then save, as loaded during development.
    pub dev: Vec<u8>,
}

impl FxDataBuild {
    /// Run an fx data script held in memory.
    pub fn from_script<P: AsRef<Path>>(script: &str, directory: P) -> Result<Self, Error> {
        let mut header = Vec::new();
        let mut dev = Vec::new();
        let offsets = run_fxdata_script(script, &mut header, &mut dev, directory.as_ref())?;
        Ok(Self {
            offsets,
            header: String::from_utf8_lossy(&header).into_owned(),
            dev,
        })
    }

    /// Run the fx data script at `path`. `file(...)` paths resolve against `directory`, or
    /// the script's own directory when `directory` is `None`.
    pub fn from_script_file<P: AsRef<Path>>(path: P, directory: Option<&Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let script = fs::read_to_string(path)?;
        let directory = match directory {
            Some(d) => d.to_path_buf(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        Self::from_script(&script, directory)
    }

    /// The release binaries, data and save, split from the dev binary.
    pub fn release(&self) -> Result<(Vec<u8>, Vec<u8>), Error> {
        Ok(split_dev_binary(&self.dev, &self.offsets)?)
    }

    /// Write `fxdata.h`, `fxdata_dev.bin` and, with `release`, `fxdata.bin` plus
    /// `fxsave.bin` (only when a save exists) into `directory`.
    pub fn write_to<P: AsRef<Path>>(&self, directory: P, release: bool) -> Result<(), Error> {
        let directory = directory.as_ref();
        fs::create_dir_all(directory)?;
        fs::write(directory.join("fxdata.h"), &self.header)?;
        fs::write(directory.join("fxdata_dev.bin"), &self.dev)?;
        if release {
            let (data, save) = self.release()?;
            fs::write(directory.join("fxdata.bin"), data)?;
            if self.offsets.has_save() {
                fs::write(directory.join("fxsave.bin"), save)?;
            }
        }
        Ok(())
    }
}

/// Join existing data and save binaries into one dev binary at `output`.
pub fn align_fx_files_to<P: AsRef<Path>>(
    data: Option<&Path>,
    save: Option<&Path>,
    output: P,
) -> Result<usize, Error> {
    let data = match data {
        Some(p) => fs::read(p)?,
        None => Vec::new(),
    };
    let save = match save {
        Some(p) => fs::read(p)?,
        None => Vec::new(),
    };
    let joined = align_fx_files(&data, &save);
    fs::write(output, &joined)?;
    Ok(joined.len())
}
