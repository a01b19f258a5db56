/// RAW image backends
///
/// This module handles:
/// - Extracting embedded JPEG previews from RAW files
/// - Developing rawloader sensor data into a viewable full image
/// - Caching thumbnails to disk
///
/// The progressive loader only sees the `Decoder` and `ThumbnailCache` traits.

pub mod decoder;
pub mod develop;
pub mod preview;
pub mod thumbnail;

pub use decoder::{Decoder, RawDecoder};
pub use thumbnail::{DiskThumbnailCache, ThumbnailCache};
