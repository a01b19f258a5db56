use image::{imageops::FilterType, DynamicImage, RgbaImage};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::config::LoaderConfig;
use crate::error::Result;

/// Thumbnail storage keyed by resource location
pub trait ThumbnailCache: Send + Sync {
    /// Check if a thumbnail exists for the resource
    fn exists(&self, uri: &Path) -> bool;

    /// Load the cached thumbnail. `Ok(None)` when there is no entry.
    fn load(&self, uri: &Path) -> Result<Option<RgbaImage>>;

    /// Scale `image` down to thumbnail size and store it for the resource
    fn save(&self, image: &RgbaImage, uri: &Path) -> Result<()>;
}

/// Thumbnails stored as PNG files in a cache directory
#[derive(Debug, Clone)]
pub struct DiskThumbnailCache {
    dir: PathBuf,
    size: u32,
}

impl DiskThumbnailCache {
    pub fn new(dir: impl Into<PathBuf>, size: u32) -> Self {
        Self { dir: dir.into(), size: size.max(1) }
    }

    /// Cache in the configured (or platform default) thumbnail directory
    pub fn from_config(config: &LoaderConfig) -> Self {
        Self::new(config.thumbnail_dir(), config.thumbnail_size)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Get the thumbnail path for a resource (doesn't generate, just returns the expected path)
    pub fn thumbnail_path(&self, uri: &Path) -> PathBuf {
        let mut hasher = DefaultHasher::new();
        uri.hash(&mut hasher);
        self.dir.join(format!("{:016x}.png", hasher.finish()))
    }
}

impl ThumbnailCache for DiskThumbnailCache {
    fn exists(&self, uri: &Path) -> bool {
        self.thumbnail_path(uri).exists()
    }

    fn load(&self, uri: &Path) -> Result<Option<RgbaImage>> {
        let path = self.thumbnail_path(uri);
        if !path.exists() {
            return Ok(None);
        }

        let img = image::open(&path)?;
        Ok(Some(img.to_rgba8()))
    }

    fn save(&self, image: &RgbaImage, uri: &Path) -> Result<()> {
        // Ensure the directory exists
        fs::create_dir_all(&self.dir)?;

        // Resize to thumbnail size, keeping aspect ratio
        let thumbnail = DynamicImage::ImageRgba8(image.clone()).resize(
            self.size,
            self.size,
            FilterType::Lanczos3,
        );

        let thumbnail_path = self.thumbnail_path(uri);
        thumbnail.save(&thumbnail_path)?;

        log::info!("📸 Generated thumbnail: {}", thumbnail_path.display());
        Ok(())
    }
}
