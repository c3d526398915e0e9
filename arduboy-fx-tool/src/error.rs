use thiserror::Error;

/// Errors that can occur while running scripts, reading packages, or converting
/// sketches and metadata.
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Flashcart(#[from] arduboy_fx::Error),

    #[error("failed to write CSV: {0}")]
    CsvError(#[from] csv::Error),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("hex decoding error: {0}")]
    HexError(#[from] hex::FromHexError),

    #[error("base64 decoding error: {0}")]
    Base64Error(#[from] base64::DecodeError),

    #[error("intel hex error: {0}")]
    IntelHex(String),

    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("package archive error: {0}")]
    ZipError(#[from] zip::result::ZipError),

    /// The package lacks a file it refers to, or `info.json` itself.
    #[error("package file not found: {0}")]
    MissingPackageFile(String),

    /// No binary, or more than one, matched the requested device or title.
    #[error("can't select binary: {0}")]
    PackageSelection(String),

    #[error("script error: {0}")]
    Script(#[from] mlua::Error),
}

impl From<ihex::ReaderError> for Error {
    fn from(e: ihex::ReaderError) -> Self {
        Error::IntelHex(e.to_string())
    }
}

impl From<ihex::WriterError> for Error {
    fn from(e: ihex::WriterError) -> Self {
        Error::IntelHex(e.to_string())
    }
}
