/// Smallest addressable unit of the external flash chip.
pub const FX_PAGE_SIZE: usize = 256;
/// Erase block of the external flash chip.
pub const FX_BLOCK_SIZE: usize = 65536;
pub const FX_PAGES_PER_BLOCK: usize = FX_BLOCK_SIZE / FX_PAGE_SIZE;

pub const HEADER_LENGTH: usize = FX_PAGE_SIZE;
pub const HEADER_MAGIC: &[u8; 7] = b"ARDUBOY";
pub const HEADER_IMAGE_LENGTH: usize = 1024;
/// Saves start on a flash sector so the game can erase them independently.
pub const FX_SAVE_ALIGNMENT: usize = 4096;

pub const HEADER_CATEGORY_OFFSET: usize = 7;
pub const HEADER_PREVIOUS_PAGE_OFFSET: usize = 8;
pub const HEADER_NEXT_PAGE_OFFSET: usize = 10;
pub const HEADER_SLOT_SIZE_OFFSET: usize = 12;
pub const HEADER_PROGRAM_SIZE_OFFSET: usize = 14;
pub const HEADER_PROGRAM_START_OFFSET: usize = 15;
pub const HEADER_DATA_START_OFFSET: usize = 17;
pub const HEADER_SAVE_START_OFFSET: usize = 19;
pub const HEADER_DATA_SIZE_OFFSET: usize = 21;
pub const HEADER_HASH_OFFSET: usize = 25;
pub const HEADER_HASH_LENGTH: usize = 32;
pub const HEADER_META_OFFSET: usize = HEADER_HASH_OFFSET + HEADER_HASH_LENGTH;
pub const HEADER_META_LENGTH: usize = HEADER_LENGTH - HEADER_META_OFFSET;

/// Unset value for every 16-bit page pointer in a header.
pub const UNSET_PAGE: u16 = 0xFFFF;

/// Internal flash page of the ATmega32u4, the unit of `program_pages`.
pub const FLASH_PAGE_SIZE: usize = 128;
pub const FLASH_SIZE: usize = 32768;
pub const MAX_PROGRAM_PAGES: usize = 255;

pub const SCREEN_WIDTH: usize = 128;
pub const SCREEN_HEIGHT: usize = 64;
pub const SCREEN_BYTES: usize = SCREEN_WIDTH * SCREEN_HEIGHT / 8;

/// Dev data is anchored to the end of a 16 MiB chip.
pub const FX_DEV_FLASH_CAPACITY: usize = 1 << 24;

/// Sketch vector slots patched to point at the fx data and save pages.
pub const SKETCH_DATA_VECTOR_OFFSET: usize = 0x14;
pub const SKETCH_SAVE_VECTOR_OFFSET: usize = 0x18;
pub const RETI_INSTRUCTION: [u8; 2] = [0x18, 0x95];

const _: () = assert!(HEADER_META_LENGTH == 199);
const _: () = assert!(SCREEN_BYTES == HEADER_IMAGE_LENGTH);
