/// RAW decoding backend
///
/// `Decoder` is the narrow capability the progressive loader consumes.
/// `RawDecoder` implements it for camera RAW files:
/// - the embedded preview comes from the largest embedded JPEG
/// - the full image is rawloader's sensor data developed at half size

use image::RgbaImage;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use super::develop::{develop_half_size, SensorFrame};
use super::preview::extract_largest_jpeg;
use crate::config::LoaderConfig;
use crate::error::{LoadError, Result};
use crate::loader::Orientation;

/// Source of the large and full-resolution buffers for one resource.
///
/// Both loads may block for a long time. Raising the abort flag makes an
/// in-flight load return `LoadError::Aborted` as soon as it notices.
pub trait Decoder: Send + Sync {
    /// Decode the embedded preview. Returns the pixels and a flip code
    /// (0 = none, 3 = 180°, 5 = 90° CCW, 6 = 90° CW, others unsupported).
    fn load_embedded(&self) -> Result<(RgbaImage, i32)>;

    /// Decode the full image, upright. `progress` receives (done, total).
    fn load_full(&self, progress: &mut dyn FnMut(usize, usize)) -> Result<RgbaImage>;

    fn set_aborted(&self, aborted: bool);

    fn is_aborted(&self) -> bool;
}

/// Decoder for camera RAW files
#[derive(Debug)]
pub struct RawDecoder {
    path: PathBuf,
    min_preview_bytes: usize,
    aborted: AtomicBool,
}

impl RawDecoder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_config(path, &LoaderConfig::default())
    }

    pub fn with_config(path: impl Into<PathBuf>, config: &LoaderConfig) -> Self {
        Self {
            path: path.into(),
            min_preview_bytes: config.min_preview_bytes,
            aborted: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn check_aborted(&self) -> Result<()> {
        if self.is_aborted() {
            Err(LoadError::Aborted)
        } else {
            Ok(())
        }
    }
}

impl Decoder for RawDecoder {
    fn load_embedded(&self) -> Result<(RgbaImage, i32)> {
        self.check_aborted()?;

        // Verify file exists
        if !self.path.exists() {
            return Err(LoadError::decode(format!("File not found: {}", self.path.display())));
        }

        let buffer = fs::read(&self.path)?;
        self.check_aborted()?;

        let preview = extract_largest_jpeg(&buffer, self.min_preview_bytes, &self.aborted)?
            .ok_or_else(|| LoadError::NoEmbeddedPreview(self.path.clone()))?;

        let flip = read_exif_orientation(&self.path)
            .map(exif_to_flip_code)
            .unwrap_or(0);

        log::info!(
            "🔥 Extracted {}x{} preview from {:?} (flip {})",
            preview.width(),
            preview.height(),
            self.path.file_name().unwrap_or_default(),
            flip
        );

        Ok((preview.to_rgba8(), flip))
    }

    fn load_full(&self, progress: &mut dyn FnMut(usize, usize)) -> Result<RgbaImage> {
        self.check_aborted()?;

        if !self.path.exists() {
            return Err(LoadError::decode(format!("File not found: {}", self.path.display())));
        }

        // rawloader can't be interrupted, so the flag is checked around it
        let decoder = rawloader::RawLoader::new();
        let raw_image = decoder
            .decode_file(&self.path)
            .map_err(|e| LoadError::decode(format!("Failed to decode RAW: {:?}", e)))?;
        self.check_aborted()?;

        log::info!(
            "📷 Loaded RAW data: {} {} {}x{} (cpp {})",
            raw_image.clean_make,
            raw_image.clean_model,
            raw_image.width,
            raw_image.height,
            raw_image.cpp
        );

        let orientation = camera_orientation(raw_image.orientation);
        let frame = SensorFrame::from_raw(&raw_image);
        drop(raw_image);

        let developed = develop_half_size(&frame, &self.aborted, progress)?;
        Ok(orientation.apply(developed))
    }

    fn set_aborted(&self, aborted: bool) {
        self.aborted.store(aborted, Ordering::Relaxed);
    }

    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Relaxed)
    }
}

/// Orientation tag stored in the RAW container's EXIF block
fn read_orientation_field(path: &Path) -> Option<u32> {
    let file = File::open(path).ok()?;
    let mut buf = BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut buf).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    field.value.get_uint(0)
}

fn read_exif_orientation(path: &Path) -> Option<u32> {
    let value = read_orientation_field(path);
    if let Some(o) = value {
        log::debug!("exif orientation {} for {}", o, path.display());
    }
    value
}

/// Convert an EXIF orientation (1-8) to a decoder flip code.
///
/// Flip codes are a bitmask: 1 = mirror horizontally, 2 = mirror
/// vertically, 4 = transpose. Unknown values count as no flip.
pub fn exif_to_flip_code(orientation: u32) -> i32 {
    match orientation {
        2 => 1,
        3 => 3,
        4 => 2,
        5 => 4,
        6 => 6,
        7 => 7,
        8 => 5,
        _ => 0,
    }
}

/// Rotation rawloader reports for the sensor. Mirrored layouts are not
/// produced by real cameras and are left as-is.
fn camera_orientation(orientation: rawloader::Orientation) -> Orientation {
    match orientation {
        rawloader::Orientation::Rotate180 => Orientation::BottomRight,
        rawloader::Orientation::Rotate90 => Orientation::RightBottom,
        rawloader::Orientation::Rotate270 => Orientation::LeftBottom,
        rawloader::Orientation::Normal | rawloader::Orientation::Unknown => Orientation::TopLeft,
        other => {
            log::debug!("Ignoring mirrored sensor orientation {:?}", other);
            Orientation::TopLeft
        }
    }
}
