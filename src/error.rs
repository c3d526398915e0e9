use thiserror::Error;

/// Errors that can occur while encoding, scanning, or laying out a flashcart.
///
/// Most variants are caused by the input (a bad slot, a truncated container). The two
/// internal invariants, [`Error::AlignmentInvariant`] and [`Error::WriteMismatch`], indicate
/// a defect in the layout engine itself; see [`Error::is_internal`].
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Fewer bytes than a full header were supplied to the decoder.
    #[error("not enough data for header: expected {expected}, found {found}")]
    NotEnoughData { expected: usize, found: usize },

    /// The magic prefix is missing. The scanners treat this as the end of the chain.
    #[error("not a slot header")]
    NotHeader,

    /// The slot hash is not valid hex.
    #[error("invalid slot hash: {0}")]
    HashFormat(#[from] hex::FromHexError),

    /// Title images must be exactly one screen (1024 bytes) when validation is on.
    #[error("invalid image length on slot {slot}: {length} bytes")]
    InvalidImageLength { slot: usize, length: usize },

    /// The first two slots of a flashcart must be categories.
    #[error("first two slots must be categories (slot {0} is a program)")]
    StructuralViolation(usize),

    /// fx data or fx save were supplied without a sketch.
    #[error("{what} without sketch in slot {slot}")]
    MissingSketch { slot: usize, what: &'static str },

    /// The sketch does not fit in 255 flash pages.
    #[error("sketch in slot {slot} too large: {pages} pages")]
    SketchTooLarge { slot: usize, pages: usize },

    /// The container does not follow the category/program structure.
    #[error("malformed container: {0}")]
    MalformedContainer(String),

    /// A file-backed chain pointed somewhere other than the end of the slot.
    #[error("next page mismatch at 0x{address:06X}: header says page {next_page}, slot ends at page {expected}")]
    ChainMismatch {
        address: usize,
        next_page: u16,
        expected: usize,
    },

    /// A raw or paletted bitmap does not match its stated dimensions.
    #[error("bitmap has wrong size: expected {expected}, got {found}")]
    BitmapSize { expected: usize, found: usize },

    /// The slot predates the data-size field and cannot be repacked.
    #[error("slot '{0}' is in the older format (no data size field)")]
    OldFormat(String),

    /// The requested data does not fit on the flash chip.
    #[error("does not fit: {0}")]
    DoesNotFit(String),

    /// Slot size ended up misaligned. Indicates a bug in the layout engine.
    #[error("internal error: slot size misaligned: {0}")]
    AlignmentInvariant(usize),

    /// The bytes written for a slot differ from its computed size.
    #[error("internal error: expected to write {expected} bytes for '{title}', wrote {written}")]
    WriteMismatch {
        title: String,
        expected: usize,
        written: usize,
    },

    /// The flash resource reported a failure.
    #[error("flash resource error: {0}")]
    Resource(String),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error violates an invariant of the layout engine rather than
    /// describing bad input.
    pub fn is_internal(&self) -> bool {
        matches!(self, Error::AlignmentInvariant(_) | Error::WriteMismatch { .. })
    }

    /// Whether this error is the end-of-chain sentinel.
    pub fn is_end_of_chain(&self) -> bool {
        matches!(self, Error::NotHeader)
    }
}
