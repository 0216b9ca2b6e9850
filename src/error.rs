//! Error kinds for the archive pipeline.
//!
//! Only [`InputError`] ends a run. Everything else is scoped to a single image
//! or item and is logged and skipped by the caller.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure to retrieve the bytes behind one URL.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server responded with {0}")]
    Status(reqwest::StatusCode),
}

/// Failure to turn one image reference into a file on disk.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// The reference carries neither a URL nor a secret bundle.
    #[error("image {id} has no usable URL")]
    NoUrl { id: String },

    /// The id cannot be used as a file name inside the images directory.
    #[error("image id {id:?} is not a usable file name")]
    InvalidId { id: String },

    #[error("failed to fetch {url}: {source}")]
    Fetch {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AcquireError {
    /// Missing-URL references are an expected shape in exports, not a failure.
    pub fn is_skip(&self) -> bool {
        matches!(self, AcquireError::NoUrl { .. })
    }
}

/// An embed points at an observation id that the export does not contain.
#[derive(Debug, Error)]
#[error("observation {id} is not present in the export")]
pub struct UnresolvedObservation {
    pub id: String,
}

#[derive(Debug, Error)]
#[error("unrecognised timestamp {raw:?}")]
pub struct DateParseError {
    pub raw: String,
}

/// Input files that cannot be used at all. These abort the run.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("file {} not found", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
