use std::path::PathBuf;

use thiserror::Error;

/// Per-frame failures inside the worker. None of these are fatal.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("frame decode failed: {0}")]
    Decode(#[source] image::ImageError),

    #[error("frame encode failed: {0}")]
    Encode(#[source] image::ImageError),

    #[error("landmark extraction failed: {0:#}")]
    Extraction(anyhow::Error),
}

/// The exercise record table could not be reached or returned bad data.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store unavailable: {0}")]
    Unavailable(#[from] rusqlite::Error),

    #[error("record {id} has unknown status {status}")]
    UnknownStatus { id: i64, status: i64 },
}

/// The reference pose image for an exercise could not be read.
#[derive(Debug, Error)]
pub enum ReferenceError {
    #[error("reference image not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("reference image unreadable: {}: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}
