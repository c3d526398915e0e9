//! Title screen bitmaps.
//!
//! On flash a bitmap is stored column-major in 8-pixel vertical strips: byte `x + (y / 8) * w`
//! holds pixel `(x, y)` in bit `y & 7`. The paletted form used for conversion has one byte per
//! pixel: 0 black, 1 white, 2 transparent.

use std::io::Cursor;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};

use crate::consts::{SCREEN_HEIGHT, SCREEN_WIDTH};
use crate::error::Error;

pub const BLACK: u8 = 0;
pub const WHITE: u8 = 1;
pub const TRANSPARENT: u8 = 2;

/// Brightness at or above which a pixel turns white when converting titles.
pub const DEFAULT_WHITE_THRESHOLD: u8 = 100;

/// Unpack a raw bitmap to one byte per pixel.
pub fn raw_to_paletted(raw: &[u8], width: usize, height: usize) -> Result<Vec<u8>, Error> {
    let expected = width * (height >> 3);
    if raw.len() != expected {
        return Err(Error::BitmapSize {
            expected,
            found: raw.len(),
        });
    }
    let mut result = vec![BLACK; width * height];
    for (i, &strip) in raw.iter().enumerate() {
        let x = i % width;
        let ybase = i / width * 8;
        for bit in 0..8 {
            let j = x + (ybase + bit) * width;
            if j < result.len() && strip & (1 << bit) != 0 {
                result[j] = WHITE;
            }
        }
    }
    Ok(result)
}

/// Pack a paletted bitmap, returning the pixel data and the transparency mask.
pub fn paletted_to_raw(
    paletted: &[u8],
    width: usize,
    height: usize,
) -> Result<(Vec<u8>, Vec<u8>), Error> {
    if paletted.len() != width * height {
        return Err(Error::BitmapSize {
            expected: width * height,
            found: paletted.len(),
        });
    }
    let strips = height.div_ceil(8);
    let mut result = vec![0u8; width * strips];
    let mut mask = vec![0u8; width * strips];
    for x in 0..width {
        for y in 0..height {
            let position = x + (y / 8) * width;
            let bit = 1u8 << (y & 7);
            match paletted[x + y * width] {
                WHITE => result[position] |= bit,
                TRANSPARENT => mask[position] |= bit,
                _ => {}
            }
        }
    }
    Ok((result, mask))
}

/// Map an image to the paletted form without resizing.
pub fn image_to_paletted(image: &DynamicImage, white_threshold: u8, alpha_threshold: u8) -> Vec<u8> {
    let gray = image.to_luma_alpha8();
    gray.pixels()
        .map(|p| {
            let [luma, alpha] = p.0;
            if alpha < alpha_threshold {
                TRANSPARENT
            } else if luma >= white_threshold {
                WHITE
            } else {
                BLACK
            }
        })
        .collect()
}

/// Decode any supported image, scale it to the screen and pack it as a title bitmap.
pub fn image_to_title(encoded: &[u8], white_threshold: u8) -> Result<Vec<u8>, Error> {
    let image = image::load_from_memory(encoded)?;
    let resized = image.resize_exact(SCREEN_WIDTH as u32, SCREEN_HEIGHT as u32, FilterType::Triangle);
    let paletted = image_to_paletted(&resized, white_threshold, 0);
    let (raw, _) = paletted_to_raw(&paletted, SCREEN_WIDTH, SCREEN_HEIGHT)?;
    Ok(raw)
}

/// Render a paletted bitmap as a black and white PNG.
pub fn paletted_to_png(paletted: &[u8], width: usize, height: usize) -> Result<Vec<u8>, Error> {
    if paletted.len() != width * height {
        return Err(Error::BitmapSize {
            expected: width * height,
            found: paletted.len(),
        });
    }
    let image = GrayImage::from_fn(width as u32, height as u32, |x, y| {
        let pixel = paletted[x as usize + y as usize * width];
        Luma([if pixel == WHITE { 0xFF } else { 0x00 }])
    });
    let mut png = Cursor::new(Vec::new());
    image.write_to(&mut png, ImageFormat::Png)?;
    Ok(png.into_inner())
}

/// Render a raw title bitmap as a PNG.
pub fn title_to_png(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let paletted = raw_to_paletted(raw, SCREEN_WIDTH, SCREEN_HEIGHT)?;
    paletted_to_png(&paletted, SCREEN_WIDTH, SCREEN_HEIGHT)
}

/// Render a raw title bitmap as a `data:` URL suitable for embedding in JSON or HTML.
pub fn title_to_data_url(raw: &[u8]) -> Result<String, Error> {
    let png = title_to_png(raw)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

/// Nearest-neighbour resize of a one-byte-per-pixel tile.
pub fn resize_paletted(
    tile: &[u8],
    width: usize,
    height: usize,
    new_width: usize,
    new_height: usize,
) -> Result<Vec<u8>, Error> {
    if tile.len() < width * height {
        return Err(Error::BitmapSize {
            expected: width * height,
            found: tile.len(),
        });
    }
    let scale = |from: usize, to: usize, i: usize| -> usize {
        if to <= 1 {
            0
        } else {
            (((from - 1) * i) as f64 / (to - 1) as f64 + 0.5).floor() as usize
        }
    };
    let mut out = vec![0u8; new_width * new_height];
    for x in 0..new_width {
        let hofs = scale(width, new_width, x);
        for y in 0..new_height {
            let vofs = scale(height, new_height, y);
            out[x + y * new_width] = tile[hofs + vofs * width];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn raw_and_paletted_agree() {
        let mut raw = vec![0u8; 1024];
        raw[0] = 0b0000_0101;
        raw[129] = 0x80;

        let paletted = raw_to_paletted(&raw, SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        assert_eq!(paletted[0], WHITE);
        assert_eq!(paletted[SCREEN_WIDTH], BLACK);
        assert_eq!(paletted[2 * SCREEN_WIDTH], WHITE);
        assert_eq!(paletted[1 + 15 * SCREEN_WIDTH], WHITE);

        let (back, mask) = paletted_to_raw(&paletted, SCREEN_WIDTH, SCREEN_HEIGHT).unwrap();
        assert_eq!(back, raw);
        assert!(mask.iter().all(|&m| m == 0));
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        assert!(raw_to_paletted(&[0; 10], 128, 64).is_err());
        assert!(paletted_to_raw(&[0; 10], 128, 64).is_err());
    }

    #[test]
    fn data_url_is_png() {
        let url = title_to_data_url(&[0xAA; 1024]).unwrap();
        let payload = url.strip_prefix("data:image/png;base64,").unwrap();
        let png = STANDARD.decode(payload).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn encoded_image_converts_to_title() {
        let white = GrayImage::from_pixel(256, 128, Luma([0xFF]));
        let mut png = Cursor::new(Vec::new());
        white.write_to(&mut png, ImageFormat::Png).unwrap();

        let title = image_to_title(png.get_ref(), DEFAULT_WHITE_THRESHOLD).unwrap();
        assert_eq!(title, vec![0xFF; 1024]);
    }

    #[test]
    fn resize_doubles_pixels() {
        let tile = [1, 0, 0, 1];
        let out = resize_paletted(&tile, 2, 2, 4, 4).unwrap();
        assert_eq!(out[0], 1);
        assert_eq!(out[3], 0);
        assert_eq!(out[15], 1);
    }
}
