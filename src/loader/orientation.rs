/// Orientation tags attached to produced buffers.
///
/// A tag names the rotation the viewer has to apply to show the pixels
/// upright. Decoders report orientation as a flip code (0 = none,
/// 3 = 180°, 5 = 90° counter-clockwise, 6 = 90° clockwise); only those
/// four codes are understood, anything else fails the decode.

use image::{imageops, RgbaImage};

use crate::error::{LoadError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    /// Normal, no rotation
    #[default]
    TopLeft,
    /// Upside down, rotate 180°
    BottomRight,
    /// Rotate 270° clockwise
    LeftBottom,
    /// Rotate 90° clockwise
    RightBottom,
}

impl Orientation {
    /// Map a decoder flip code to an orientation tag
    pub fn from_decoder_code(code: i32) -> Result<Self> {
        match code {
            0 => Ok(Orientation::TopLeft),
            3 => Ok(Orientation::BottomRight),
            5 => Ok(Orientation::LeftBottom),
            6 => Ok(Orientation::RightBottom),
            other => Err(LoadError::decode(format!(
                "Unexpected orientation returned: {}",
                other
            ))),
        }
    }

    /// Inverse of [`Orientation::from_decoder_code`]
    pub fn decoder_code(self) -> i32 {
        match self {
            Orientation::TopLeft => 0,
            Orientation::BottomRight => 3,
            Orientation::LeftBottom => 5,
            Orientation::RightBottom => 6,
        }
    }

    /// True when showing the image upright swaps width and height
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Orientation::LeftBottom | Orientation::RightBottom)
    }

    /// Rotate the pixels so they display upright
    pub fn apply(self, image: RgbaImage) -> RgbaImage {
        match self {
            Orientation::TopLeft => image,
            Orientation::BottomRight => imageops::rotate180(&image),
            Orientation::LeftBottom => imageops::rotate270(&image),
            Orientation::RightBottom => imageops::rotate90(&image),
        }
    }
}
