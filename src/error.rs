/// Error type shared by the loader and its RAW backends.
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Everything that can go wrong while producing a thumbnail, preview or full image.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The decoder threw or handed back something unusable (e.g. an unknown orientation code).
    #[error("decode failed: {0}")]
    Decode(String),

    /// The thumbnail cache claimed to have an entry but returned no pixels.
    #[error("thumbnail cache returned no data for {}", .0.display())]
    ThumbnailMissingData(PathBuf),

    /// No decodable JPEG preview is embedded in the RAW file.
    #[error("no embedded preview found in {}", .0.display())]
    NoEmbeddedPreview(PathBuf),

    /// The decoder's abort flag was raised mid-operation.
    #[error("decode aborted")]
    Aborted,

    /// The background worker failed while a blocking load was waiting on it.
    #[error("background load failed: {0}")]
    Failed(Arc<LoadError>),

    /// The worker thread or blocking task could not be started or joined.
    #[error("worker error: {0}")]
    Worker(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Image(#[from] image::ImageError),

    /// Loader configuration could not be parsed.
    #[error(transparent)]
    Config(#[from] serde_json::Error),
}

impl LoadError {
    /// Convenience for decoder backends that report failures as text.
    pub fn decode(msg: impl Into<String>) -> Self {
        LoadError::Decode(msg.into())
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, LoadError::Aborted)
    }
}

pub type Result<T> = std::result::Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_wraps_cause_message() {
        let cause = Arc::new(LoadError::decode("Unexpected orientation 2"));
        let err = LoadError::Failed(cause);
        assert_eq!(
            err.to_string(),
            "background load failed: decode failed: Unexpected orientation 2"
        );
    }

    #[test]
    fn test_is_aborted() {
        assert!(LoadError::Aborted.is_aborted());
        assert!(!LoadError::decode("x").is_aborted());
    }
}
