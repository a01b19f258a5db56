/// Embedded preview extraction from RAW files
/// Finds the largest embedded JPEG without resizing

use image::ImageFormat;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LoadError, Result};

/// JPEG Start Of Image (SOI) followed by the first marker byte
const JPEG_START: &[u8] = b"\xff\xd8\xff";
/// JPEG End Of Image (EOI)
const JPEG_END: &[u8] = b"\xff\xd9";

/// Scan a RAW file's bytes for embedded JPEGs and return the largest one
/// that is at least `min_size` bytes long and actually decodes.
///
/// Candidates are tried from largest to smallest, so a truncated or
/// proprietary stream just falls through to the next one. The abort flag
/// is polled between candidates.
pub fn extract_largest_jpeg(
    buffer: &[u8],
    min_size: usize,
    aborted: &AtomicBool,
) -> Result<Option<image::DynamicImage>> {
    let mut candidates = find_jpeg_ranges(buffer);
    candidates.retain(|(start, end)| end - start >= min_size);

    // Sort descending by size
    candidates.sort_by(|a, b| (b.1 - b.0).cmp(&(a.1 - a.0)));

    for (start, end) in candidates {
        if aborted.load(Ordering::Relaxed) {
            return Err(LoadError::Aborted);
        }

        match image::load_from_memory_with_format(&buffer[start..end], ImageFormat::Jpeg) {
            Ok(img) => {
                log::debug!(
                    "Embedded JPEG at {:#x}: {}KB, {}x{}",
                    start,
                    (end - start) / 1024,
                    img.width(),
                    img.height()
                );
                return Ok(Some(img));
            }
            Err(e) => {
                log::trace!("Skipping undecodable JPEG at {:#x}: {}", start, e);
            }
        }
    }

    Ok(None)
}

/// Byte ranges `[start, end)` of every SOI..EOI sequence in the buffer
fn find_jpeg_ranges(buffer: &[u8]) -> Vec<(usize, usize)> {
    let mut ranges = Vec::new();

    let mut pos = 0;
    while pos + JPEG_START.len() <= buffer.len() {
        // Look for SOI marker
        if buffer[pos..].starts_with(JPEG_START) {
            // Find the corresponding EOI
            if let Some(end) = buffer[pos..]
                .windows(JPEG_END.len())
                .position(|w| w == JPEG_END)
                .map(|p| pos + p + JPEG_END.len())
            {
                ranges.push((pos, end));
                pos = end;
                continue;
            }
        }
        pos += 1;
    }

    ranges
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};
    use std::io::Cursor;

    fn jpeg_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, image::Rgb([90, 120, 200])));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg).unwrap();
        bytes
    }

    #[test]
    fn test_finds_jpeg_ranges() {
        let mut data = vec![0u8; 16];
        data.extend_from_slice(b"\xff\xd8\xff\xe0abc\xff\xd9");
        data.extend_from_slice(&[1, 2, 3]);

        assert_eq!(find_jpeg_ranges(&data), vec![(16, 25)]);
        assert!(find_jpeg_ranges(b"\xff\xd8").is_empty());
    }

    #[test]
    fn test_picks_largest_decodable_preview() {
        let small = jpeg_bytes(8, 8);
        let large = jpeg_bytes(64, 48);

        // Fake RAW: header garbage, small EXIF thumbnail, sensor garbage, big preview
        let mut raw = vec![0x49, 0x49, 0x2a, 0x00];
        raw.extend_from_slice(&small);
        raw.extend_from_slice(&[0x11; 100]);
        raw.extend_from_slice(&large);
        raw.extend_from_slice(&[0x22; 50]);

        let img = extract_largest_jpeg(&raw, 0, &AtomicBool::new(false))
            .unwrap()
            .expect("preview");
        assert_eq!((img.width(), img.height()), (64, 48));
    }

    #[test]
    fn test_min_size_filters_everything() {
        let raw = jpeg_bytes(8, 8);
        let found = extract_largest_jpeg(&raw, raw.len() + 1, &AtomicBool::new(false)).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_abort_stops_the_scan() {
        let raw = jpeg_bytes(8, 8);
        let err = extract_largest_jpeg(&raw, 0, &AtomicBool::new(true)).unwrap_err();
        assert!(err.is_aborted());
    }
}
