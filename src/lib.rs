//! Progressive loading of camera RAW photos.
//!
//! A [`ProgressiveLoader`] hands out a cached thumbnail, the embedded preview
//! and a full decode of one file, each as soon as it is ready, with at most
//! one background worker per file. Observers are notified through a
//! [`UiDispatcher`] so they only ever run on the UI thread.

pub mod config;
pub mod error;
pub mod loader;
pub mod raw;

pub use config::LoaderConfig;
pub use error::{LoadError, Result};
pub use loader::{
    LoadLevels, LoadMode, LoadedImage, LoaderEvent, Orientation, ProgressiveLoader, Rect,
    UiDispatcher, UiQueue,
};
pub use raw::{Decoder, DiskThumbnailCache, RawDecoder, ThumbnailCache};
