use embedded_storage::nor_flash::{NorFlash, NorFlashError, ReadNorFlash};

use crate::consts::FX_PAGE_SIZE;
use crate::error::Error;

/// A page-addressed flash chip, usually the external flash of a connected device.
///
/// Implementations carry the serial framing; everything in this crate only needs
/// "read N bytes at page P" and "write N bytes at page P".
pub trait FlashResource {
    fn read_pages(&mut self, page: u16, buf: &mut [u8]) -> Result<(), Error>;

    fn write_pages(&mut self, page: u16, data: &[u8]) -> Result<(), Error>;

    /// Set the indicator LED. Resources without one ignore the call.
    fn set_indicator(&mut self, _state: u8) -> Result<(), Error> {
        Ok(())
    }
}

impl<T: FlashResource> FlashResource for &mut T {
    fn read_pages(&mut self, page: u16, buf: &mut [u8]) -> Result<(), Error> {
        T::read_pages(self, page, buf)
    }

    fn write_pages(&mut self, page: u16, data: &[u8]) -> Result<(), Error> {
        T::write_pages(self, page, data)
    }

    fn set_indicator(&mut self, state: u8) -> Result<(), Error> {
        T::set_indicator(self, state)
    }
}

/// Exposes any `embedded-storage` NOR flash as a [`FlashResource`].
///
/// Writes are passed straight through; erasing the target region first is up to the caller.
pub struct NorFlashResource<F> {
    flash: F,
}

impl<F: NorFlash> NorFlashResource<F> {
    pub fn new(flash: F) -> Self {
        Self { flash }
    }

    pub fn into_inner(self) -> F {
        self.flash
    }
}

fn page_offset(page: u16) -> u32 {
    page as u32 * FX_PAGE_SIZE as u32
}

fn resource_error<E: NorFlashError>(e: E) -> Error {
    Error::Resource(format!("{:?}", e.kind()))
}

impl<F: NorFlash> FlashResource for NorFlashResource<F> {
    fn read_pages(&mut self, page: u16, buf: &mut [u8]) -> Result<(), Error> {
        let offset = page_offset(page);
        if offset as usize + buf.len() > self.flash.capacity() {
            // The chain ends in erased flash when it runs up against the end of the chip.
            let available = self.flash.capacity().saturating_sub(offset as usize);
            buf.fill(0xFF);
            if available == 0 {
                return Ok(());
            }
            return ReadNorFlash::read(&mut self.flash, offset, &mut buf[..available])
                .map_err(resource_error);
        }
        ReadNorFlash::read(&mut self.flash, offset, buf).map_err(resource_error)
    }

    fn write_pages(&mut self, page: u16, data: &[u8]) -> Result<(), Error> {
        NorFlash::write(&mut self.flash, page_offset(page), data).map_err(resource_error)
    }
}

/// Indicator LED control bits.
pub mod led {
    pub const BUTTON_OFF: u8 = 0x80;
    pub const RGB: u8 = 0x40;
    pub const RX_TX: u8 = 0x20;
    pub const RX_ON: u8 = 0x10;
    pub const TX_ON: u8 = 0x08;
    pub const GREEN_ON: u8 = 0x04;
    pub const RED_ON: u8 = 0x02;
    pub const BLUE_ON: u8 = 0x01;
}

/// Blinks the indicator LED while a scan walks the chain.
///
/// The LED toggles between off and `color` every `rate` slots. A `rate` of zero keeps
/// the LED off for the whole scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strobe {
    pub color: u8,
    pub rate: usize,
    /// When false only the button-off bit is ever sent.
    pub rgb_enabled: bool,
}

impl Default for Strobe {
    fn default() -> Self {
        Self {
            color: led::BLUE_ON | led::RED_ON,
            rate: 64,
            rgb_enabled: true,
        }
    }
}

impl Strobe {
    pub fn with_rate(rate: usize) -> Self {
        Self {
            rate,
            ..Default::default()
        }
    }

    /// LED state for the given slot index.
    pub fn state(&self, count: usize) -> u8 {
        if self.rate == 0 {
            return led::BUTTON_OFF;
        }
        led::BUTTON_OFF | (self.color * ((count / self.rate) & 1) as u8)
    }

    /// The byte actually sent to the device for `state`, with the enable bits filled in.
    pub fn command(&self, mut state: u8) -> u8 {
        if state & (led::RED_ON | led::GREEN_ON | led::BLUE_ON) != 0 {
            state |= led::RGB;
        }
        if state & (led::RX_ON | led::TX_ON) != 0 {
            state |= led::RX_TX;
        }
        if !self.rgb_enabled {
            state &= led::BUTTON_OFF;
        }
        state
    }
}

/// Tracks the last LED state so the device is only told about changes.
pub(crate) struct Indicator {
    strobe: Option<Strobe>,
    last: u8,
}

impl Indicator {
    pub(crate) fn new(strobe: Option<Strobe>) -> Self {
        Self { strobe, last: 0 }
    }

    pub(crate) fn update<R: FlashResource>(
        &mut self,
        resource: &mut R,
        count: usize,
    ) -> Result<(), Error> {
        let Some(strobe) = self.strobe else {
            return Ok(());
        };
        let state = strobe.state(count);
        if state != self.last {
            resource.set_indicator(strobe.command(state))?;
            self.last = state;
        }
        Ok(())
    }

    pub(crate) fn reset<R: FlashResource>(&mut self, resource: &mut R) -> Result<(), Error> {
        match self.strobe {
            Some(strobe) => resource.set_indicator(strobe.command(0)),
            None => Ok(()),
        }
    }
}

#[inline(always)]
pub const fn align_ceil(size: usize, alignment: usize) -> usize {
    if alignment.is_power_of_two() {
        size.saturating_add(alignment - 1) & !(alignment - 1)
    } else {
        size.saturating_add(alignment - 1) / alignment * alignment
    }
}

/// Pad `data` with erased bytes (0xFF) up to the next multiple of `alignment`.
pub fn align_data(data: &mut Vec<u8>, alignment: usize) {
    let aligned = align_ceil(data.len(), alignment);
    data.resize(aligned, 0xFF);
}

/// `length` erased bytes.
pub fn padding(length: usize) -> Vec<u8> {
    vec![0xFF; length]
}
