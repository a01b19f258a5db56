/// Half-size development of RAW sensor data
///
/// This turns the raw sensor values rawloader hands us into a viewable
/// RGBA8 image without a full demosaic:
/// - Each 2x2 CFA block becomes one output pixel (R, mean of greens, B)
/// - Black/white levels are normalized per color
/// - Camera white balance is normalized to green
/// - A 2.2 gamma curve is applied for display

use image::{Rgba, RgbaImage};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{LoadError, Result};

/// Rows of output written between progress reports / abort checks
const ROW_BAND: u32 = 32;

/// Sensor samples plus the metadata needed to develop them.
///
/// Built from a `rawloader::RawImage` by the decoder, or by hand in tests.
#[derive(Debug, Clone)]
pub struct SensorFrame {
    pub width: usize,
    pub height: usize,
    /// Components per pixel: 1 for Bayer data, 3 for linear RGB
    pub cpp: usize,
    pub samples: Vec<f32>,
    pub black_levels: [f32; 4],
    pub white_levels: [f32; 4],
    /// White balance multipliers [R, G, B, G2] from camera
    pub wb_multipliers: [f32; 4],
    /// CFA color (0=R, 1=G, 2=B, 3=G2/E) of the 2x2 block at the crop origin
    pub cfa_pattern: [[usize; 2]; 2],
    /// Crop as [top, right, bottom, left]
    pub crops: [usize; 4],
}

impl SensorFrame {
    /// Extract everything the developer needs from a decoded RAW
    pub fn from_raw(raw: &rawloader::RawImage) -> Self {
        let samples: Vec<f32> = match &raw.data {
            rawloader::RawImageData::Integer(values) => values.iter().map(|&v| v as f32).collect(),
            // Float data is already 0.0-1.0, bring it to the integer range the levels use
            rawloader::RawImageData::Float(values) => values.iter().map(|&v| v * 65535.0).collect(),
        };

        let [top, _, _, left] = raw.crops;
        let mut cfa_pattern = [[1usize; 2]; 2];
        for (dy, row) in cfa_pattern.iter_mut().enumerate() {
            for (dx, color) in row.iter_mut().enumerate() {
                *color = raw.cfa.color_at(top + dy, left + dx);
            }
        }

        let level = |v: u16| v as f32;

        Self {
            width: raw.width,
            height: raw.height,
            cpp: raw.cpp,
            samples,
            black_levels: raw.blacklevels.map(level),
            white_levels: raw.whitelevels.map(level),
            wb_multipliers: raw.wb_coeffs,
            cfa_pattern,
            crops: raw.crops,
        }
    }

    /// White balance normalized so green is 1.0. Missing coefficients fall back to neutral.
    pub fn normalized_white_balance(&self) -> [f32; 4] {
        let wb = self.wb_multipliers;
        let valid = |v: f32| v.is_finite() && v > 0.0;
        if !valid(wb[0]) || !valid(wb[1]) || !valid(wb[2]) {
            log::debug!("No usable white balance data, using neutral");
            return [1.0, 1.0, 1.0, 1.0];
        }

        let g_ref = wb[1].max(0.001);
        [
            wb[0] / g_ref,
            1.0,
            wb[2] / g_ref,
            if valid(wb[3]) { wb[3] / g_ref } else { 1.0 },
        ]
    }

    fn sample(&self, row: usize, col: usize, component: usize) -> f32 {
        self.samples
            .get((row * self.width + col) * self.cpp + component)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Develop a sensor frame at half resolution.
///
/// `progress` receives (rows done, rows total). The abort flag is checked
/// once per band of rows.
pub fn develop_half_size(
    frame: &SensorFrame,
    aborted: &AtomicBool,
    progress: &mut dyn FnMut(usize, usize),
) -> Result<RgbaImage> {
    let [top, right, bottom, left] = frame.crops;
    let crop_width = frame.width.saturating_sub(left + right);
    let crop_height = frame.height.saturating_sub(top + bottom);

    if frame.cpp != 1 && frame.cpp != 3 {
        return Err(LoadError::decode(format!("Unsupported components per pixel: {}", frame.cpp)));
    }
    if frame.samples.len() < frame.width * frame.height * frame.cpp {
        return Err(LoadError::decode(format!(
            "Sensor data too short: {} samples for {}x{}x{}",
            frame.samples.len(),
            frame.width,
            frame.height,
            frame.cpp
        )));
    }

    let out_width = (crop_width / 2) as u32;
    let out_height = (crop_height / 2) as u32;
    if out_width == 0 || out_height == 0 {
        return Err(LoadError::decode(format!(
            "Sensor area too small: {}x{}",
            crop_width, crop_height
        )));
    }

    let wb = frame.normalized_white_balance();
    let mut output = RgbaImage::new(out_width, out_height);
    let total = out_height as usize;

    for y in 0..out_height {
        if y % ROW_BAND == 0 {
            if aborted.load(Ordering::Relaxed) {
                return Err(LoadError::Aborted);
            }
            progress(y as usize, total);
        }

        for x in 0..out_width {
            let row = top + 2 * y as usize;
            let col = left + 2 * x as usize;

            let rgb = if frame.cpp == 3 {
                linear_rgb(frame, row, col)
            } else {
                bin_cfa_block(frame, row, col)
            };

            let mut pixel = [0u8; 4];
            for c in 0..3 {
                let black = frame.black_levels[c];
                let range = (frame.white_levels[c] - black).max(1.0);
                let value = ((rgb[c] - black) / range * wb[c]).clamp(0.0, 1.0);
                pixel[c] = to_display_byte(value);
            }
            pixel[3] = 255;
            output.put_pixel(x, y, Rgba(pixel));
        }
    }

    progress(total, total);
    Ok(output)
}

/// Average each CFA color inside the 2x2 block at (row, col)
fn bin_cfa_block(frame: &SensorFrame, row: usize, col: usize) -> [f32; 3] {
    let mut sums = [0.0f32; 3];
    let mut counts = [0u32; 3];

    for dy in 0..2 {
        for dx in 0..2 {
            // The block starts on an even offset from the crop origin, so the pattern lines up
            let color = match frame.cfa_pattern[dy][dx] {
                0 => 0,
                2 => 2,
                _ => 1,
            };
            sums[color] += frame.sample(row + dy, col + dx, 0);
            counts[color] += 1;
        }
    }

    let mut rgb = [0.0f32; 3];
    for c in 0..3 {
        rgb[c] = if counts[c] > 0 { sums[c] / counts[c] as f32 } else { 0.0 };
    }
    rgb
}

/// Average the 2x2 block of already-demosaiced RGB data
fn linear_rgb(frame: &SensorFrame, row: usize, col: usize) -> [f32; 3] {
    let mut rgb = [0.0f32; 3];
    for c in 0..3 {
        let mut sum = 0.0;
        for dy in 0..2 {
            for dx in 0..2 {
                sum += frame.sample(row + dy, col + dx, c);
            }
        }
        rgb[c] = sum / 4.0;
    }
    rgb
}

fn to_display_byte(linear: f32) -> u8 {
    (linear.powf(1.0 / 2.2) * 255.0).round().clamp(0.0, 255.0) as u8
}
