/// Loader configuration
///
/// These settings control how thumbnails are cached and how aggressively
/// embedded previews are searched. They are stored as JSON, by default in
/// the user's config directory:
/// - Linux: ~/.config/tiered-loader/config.json
/// - macOS: ~/Library/Application Support/tiered-loader/config.json
/// - Windows: %APPDATA%\tiered-loader\config.json

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Size of generated thumbnails (longest edge)
pub const DEFAULT_THUMBNAIL_SIZE: u32 = 256;

/// Embedded JPEGs smaller than this are EXIF thumbnails, not previews
pub const DEFAULT_MIN_PREVIEW_BYTES: usize = 10_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    /// Longest edge of cached thumbnails, in pixels
    pub thumbnail_size: u32,

    /// Where thumbnails live. `None` means the platform cache directory.
    pub thumbnail_dir: Option<PathBuf>,

    /// Minimum byte length for an embedded JPEG to count as the large preview
    pub min_preview_bytes: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            thumbnail_size: DEFAULT_THUMBNAIL_SIZE,
            thumbnail_dir: None,
            min_preview_bytes: DEFAULT_MIN_PREVIEW_BYTES,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Convert to a JSON string
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from a JSON string. Missing keys keep their defaults.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Read a config file from disk
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        log::debug!("Loaded loader config from {}", path.display());
        Ok(config)
    }

    /// Default location of the config file, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("tiered-loader");
        path.push("config.json");
        Some(path)
    }

    /// Resolve the thumbnail directory.
    /// Returns ~/.cache/tiered-loader/thumbnails on Linux unless overridden.
    pub fn thumbnail_dir(&self) -> PathBuf {
        if let Some(dir) = &self.thumbnail_dir {
            return dir.clone();
        }

        let mut path = dirs_next::cache_dir()
            .or_else(dirs_next::home_dir)
            .unwrap_or_else(std::env::temp_dir);

        path.push("tiered-loader");
        path.push("thumbnails");
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::default();
        assert_eq!(config.thumbnail_size, 256);
        assert_eq!(config.min_preview_bytes, 10_000);
        assert!(config.thumbnail_dir.is_none());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LoaderConfig::from_json(r#"{ "thumbnail_size": 128 }"#).unwrap();

        assert_eq!(config.thumbnail_size, 128);
        assert_eq!(config.min_preview_bytes, DEFAULT_MIN_PREVIEW_BYTES);
    }

    #[test]
    fn test_thumbnail_dir_override() {
        let mut config = LoaderConfig::new();
        config.thumbnail_dir = Some(PathBuf::from("/tmp/thumbs"));

        assert_eq!(config.thumbnail_dir(), PathBuf::from("/tmp/thumbs"));
    }

    #[test]
    fn test_default_thumbnail_dir_is_namespaced() {
        let dir = LoaderConfig::default().thumbnail_dir();
        assert!(dir.ends_with("tiered-loader/thumbnails"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = LoaderConfig::default();
        config.min_preview_bytes = 4096;
        fs::write(&path, config.to_json().unwrap()).unwrap();

        let restored = LoaderConfig::load(&path).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_bad_json_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();

        let err = LoaderConfig::load(&path).unwrap_err();
        assert!(matches!(err, crate::error::LoadError::Config(_)));
    }
}
