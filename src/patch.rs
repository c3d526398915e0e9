//! Micro-patches applied to sketch binaries before they are packed into a slot.

use strum::{Display, EnumString};

use crate::consts::FX_PAGE_SIZE;

const LCD_BOOT_PROGRAM: &[u8; 13] = b"\xD5\xF0\x8D\x14\xA1\xC8\x81\xCF\xD9\xF1\xAF\x20\x00";

const MENU_BUTTON_PATCH: &[u8] = b"\x0f\x92\x0f\xb6\x8f\x93\x9f\x93\xef\x93\xff\x93\x80\x91\xcc\x01\
\x8d\x5f\x8d\x37\x08\xf0\x8d\x57\x80\x93\xcc\x01\xe2\xe4\xf3\xe0\
\x80\x81\x8e\x4f\x80\x83\x91\x81\x9f\x4f\x91\x83\x82\x81\x8f\x4f\
\x82\x83\x83\x81\x8f\x4f\x83\x83\xed\xec\xf1\xe0\x80\x81\x8f\x5f\
\x80\x83\x81\x81\x8f\x4f\x81\x83\x82\x81\x8f\x4f\x82\x83\x83\x81\
\x8f\x4f\x83\x83\x8f\xb1\x8f\x60\x66\x99\x1c\x9b\x88\x27\x8f\x36\
\x81\xf4\x80\x91\xFF\x0A\x98\x1b\x96\x30\x68\xf0\xe0\xe0\xf8\xe0\
\x87\xe7\x80\x83\x81\x83\x88\xe1\x80\x93\x60\x00\xf0\x93\x60\x00\
\xff\xcf\x90\x93\xFF\x0A\xff\x91\xef\x91\x9f\x91\x8f\x91\x0f\xbe\
\x0f\x90\x18\x95";

const RET: [u8; 2] = [0x08, 0x95];
const RETI: [u8; 2] = [0x18, 0x95];

// Offsets of the timer variable operands inside MENU_BUTTON_PATCH.
const MBP_FRACT_LDS: usize = 14;
const MBP_FRACT_STS: usize = 26;
const MBP_MILLIS_R30: usize = 28;
const MBP_MILLIS_R31: usize = 30;
const MBP_OVERFLOW_R30: usize = 56;
const MBP_OVERFLOW_R31: usize = 58;

/// Named contrast levels for the screen patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
#[repr(u8)]
pub enum Contrast {
    Normal = 0xCF,
    Dim = 0x7F,
    Dimmer = 0x2F,
    Dimmest = 0x00,
    Highest = 0xFF,
}

impl Contrast {
    pub fn value(self) -> u8 {
        self as u8
    }
}

/// Why the menu patch was not applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuPatchSkipped {
    ProgramTooShort,
    IsrContainsSubroutine,
    IsrTooSmall(usize),
    CustomIsr,
}

impl core::fmt::Display for MenuPatchSkipped {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ProgramTooShort => write!(f, "program too short"),
            Self::IsrContainsSubroutine => write!(f, "ISR contains subroutine"),
            Self::IsrTooSmall(size) => write!(f, "ISR size too small ({} bytes)", size),
            Self::CustomIsr => write!(f, "custom ISR in use"),
        }
    }
}

fn word(program: &[u8], at: usize) -> usize {
    program[at] as usize | (program[at + 1] as usize) << 8
}

/// Replace the timer0 overflow ISR with one that also enters the bootloader menu
/// when UP and DOWN are held for two seconds.
pub fn patch_menu_buttons(program: &mut [u8]) -> Result<(), MenuPatchSkipped> {
    if program.len() < FX_PAGE_SIZE {
        return Err(MenuPatchSkipped::ProgramTooShort);
    }

    let vector = ((program[0x5E] as usize) << 1) | ((program[0x5F] as usize) << 9);
    let mut p = vector;
    let mut length: isize = 0;
    let mut lds = 0;
    let mut branch = 0;
    let mut millis = 0;
    let mut fract = 0;
    let mut overflow = 0;

    while p + 2 < program.len() {
        p += 2;
        let op = [program[p - 2], program[p - 1]];
        if op == RET {
            length = -1;
            break;
        }
        // brcc may jump past the reti
        if op[1] & 0xFC == 0xF4 && op[0] & 0x07 == 0x00 {
            let offset = (((op[1] & 0x03) as usize) << 6) + (((op[0] & 0xF8) as usize) >> 2);
            branch = if offset < 128 { p + offset } else { (p + offset).saturating_sub(256) };
        }
        if op == RETI {
            length = (p - vector) as isize;
            if p > branch {
                break;
            }
        }
        if length != 0 && op[1] & 0xF0 == 0xC0 {
            length = (p - vector) as isize;
            break;
        }
        if p + 2 > program.len() {
            break;
        }
        if op[1] & 0xFE == 0x90 && op[0] & 0x0F == 0x00 {
            lds += 1;
            match lds {
                1 => millis = word(program, p),
                5 => fract = word(program, p),
                6 => overflow = word(program, p),
                _ => {}
            }
            p += 2;
        }
        // After an lds this looks at its address operand, not at `op`.
        if program[p - 1] & 0xFE == 0x92 && program[p - 2] & 0x0F == 0x00 {
            p += 2;
        }
    }

    if length == -1 {
        return Err(MenuPatchSkipped::IsrContainsSubroutine);
    }
    if (length as usize) < MENU_BUTTON_PATCH.len() {
        return Err(MenuPatchSkipped::IsrTooSmall(length as usize));
    }
    if millis == 0 || fract == 0 || overflow == 0 {
        return Err(MenuPatchSkipped::CustomIsr);
    }
    if vector + MENU_BUTTON_PATCH.len() > program.len() {
        return Err(MenuPatchSkipped::ProgramTooShort);
    }

    let isr = &mut program[vector..vector + MENU_BUTTON_PATCH.len()];
    isr.copy_from_slice(MENU_BUTTON_PATCH);
    isr[MBP_FRACT_LDS] = fract as u8;
    isr[MBP_FRACT_LDS + 1] = (fract >> 8) as u8;
    isr[MBP_FRACT_STS] = fract as u8;
    isr[MBP_FRACT_STS + 1] = (fract >> 8) as u8;
    isr[MBP_MILLIS_R30] = 0xE0 | (millis & 0x0F) as u8;
    isr[MBP_MILLIS_R30 + 1] = 0xE0 | ((millis >> 4) & 0x0F) as u8;
    isr[MBP_MILLIS_R31] = 0xF0 | ((millis >> 8) & 0x0F) as u8;
    isr[MBP_MILLIS_R31 + 1] = 0xE0 | ((millis >> 12) & 0x0F) as u8;
    isr[MBP_OVERFLOW_R30] = 0xE0 | (overflow & 0x0F) as u8;
    isr[MBP_OVERFLOW_R30 + 1] = 0xE0 | ((overflow >> 4) & 0x0F) as u8;
    isr[MBP_OVERFLOW_R31] = 0xF0 | ((overflow >> 8) & 0x0F) as u8;
    isr[MBP_OVERFLOW_R31 + 1] = 0xE0 | ((overflow >> 12) & 0x0F) as u8;
    Ok(())
}

/// Patch every display init sequence in `program` for an SSD1309 panel and/or a fixed
/// contrast. Returns how many sequences were found.
pub fn patch_screen(program: &mut [u8], ssd1309: bool, contrast: Option<u8>) -> usize {
    let mut found = 0;
    let mut start = 0;
    while start + LCD_BOOT_PROGRAM.len() <= program.len() {
        let Some(offset) = program[start..]
            .windows(7)
            .position(|w| w == &LCD_BOOT_PROGRAM[..7])
        else {
            break;
        };
        let at = start + offset;
        if at + LCD_BOOT_PROGRAM.len() <= program.len()
            && program[at + 8..at + 13] == LCD_BOOT_PROGRAM[8..]
        {
            found += 1;
            if ssd1309 {
                program[at + 2] = 0xE3;
                program[at + 3] = 0xE3;
            }
            if let Some(contrast) = contrast {
                program[at + 7] = contrast;
            }
        }
        start = at + 8;
    }
    found
}

/// Flip the RX/TX LED polarity for Arduino Micro based builds.
pub fn patch_micro_led(program: &mut [u8]) {
    let mut i = 0;
    while i + 4 <= program.len() {
        match [program[i], program[i + 1]] {
            // RXLED1 / TXLED1
            [0x28, 0x98] | [0x5D, 0x98] => program[i + 1] = 0x9A,
            // RXLED0 / TXLED0
            [0x28, 0x9A] | [0x5D, 0x9A] => program[i + 1] = 0x98,
            _ => match program[i..i + 4] {
                // core init of the RX LED port
                [0x81, 0xEF, 0x85, 0xB9] => program[i] = 0x80,
                // core init of the TX LED port
                [0x84, 0xE2, 0x8B, 0xB9] => program[i + 1] = 0xE0,
                _ => {}
            },
        }
        i += 2;
    }
}
