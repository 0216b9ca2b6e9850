//! Image acquisition: URL resolution, local naming, and persistence.

use std::fs;
use std::path::PathBuf;

use tracing::debug;

use crate::error::AcquireError;
use crate::fetch::Fetch;
use crate::types::{ImageRef, ImageSecret, LocalImage};

/// Sub-directory of the archive holding every downloaded image
pub const IMAGES_DIR: &str = "images";

const DEFAULT_WIDTH: u32 = 520;
const DEFAULT_HEIGHT: u32 = 1040;
const DEFAULT_EXTENSION: &str = "jpg";

/// Downloads image references into a single flat directory
pub struct ImageFetcher<F> {
    fetcher: F,
    images_dir: PathBuf,
}

impl<F: Fetch> ImageFetcher<F> {
    pub fn new(fetcher: F, images_dir: impl Into<PathBuf>) -> Self {
        Self {
            fetcher,
            images_dir: images_dir.into(),
        }
    }

    /// Fetch one image and write it as `{id}.{extension}`.
    ///
    /// Writing the same id twice overwrites the earlier file.
    pub fn acquire(&self, image: &ImageRef) -> Result<LocalImage, AcquireError> {
        if !is_safe_id(&image.id) {
            return Err(AcquireError::InvalidId {
                id: image.id.clone(),
            });
        }

        let url = resolve_url(image).ok_or_else(|| AcquireError::NoUrl {
            id: image.id.clone(),
        })?;

        let bytes = self
            .fetcher
            .fetch(&url)
            .map_err(|source| AcquireError::Fetch {
                url: url.clone(),
                source,
            })?;

        let extension = match &image.secret {
            Some(secret) => image_extension(&secret.path),
            None => image_extension(&url),
        };
        let filename = format!("{}.{}", image.id, extension);
        let path = self.images_dir.join(&filename);

        fs::write(&path, &bytes).map_err(|source| AcquireError::Write {
            path: path.clone(),
            source,
        })?;

        debug!(%filename, bytes = bytes.len(), "downloaded image");

        Ok(LocalImage {
            id: image.id.clone(),
            filename,
            width: image.width.unwrap_or(0),
            height: image.height.unwrap_or(0),
            created_at: image.created_at_str(),
            tags: image.tags.clone(),
        })
    }
}

/// An id is used verbatim as the file stem, so it must stay a single path component
fn is_safe_id(id: &str) -> bool {
    !id.is_empty() && id != "." && id != ".." && !id.contains(['/', '\\', '\0'])
}

/// Work out where an image lives.
///
/// Secret bundles take precedence; otherwise the high-quality URL is preferred
/// over the regular one. Returns None when the reference has no location.
pub fn resolve_url(image: &ImageRef) -> Option<String> {
    if let Some(secret) = &image.secret {
        return Some(secret_url(
            secret,
            image.width.unwrap_or(DEFAULT_WIDTH),
            image.height.unwrap_or(DEFAULT_HEIGHT),
        ));
    }

    image
        .url_big
        .as_deref()
        .or(image.url.as_deref())
        .filter(|u| !u.is_empty())
        .map(str::to_string)
}

/// `prefix/key/{width}x{height}/path[?expires=...]`
fn secret_url(secret: &ImageSecret, width: u32, height: u32) -> String {
    let mut url = format!(
        "{}/{}/{}x{}/{}",
        secret.prefix, secret.key, width, height, secret.path
    );
    if let Some(expires) = secret.expires.as_deref().filter(|e| !e.is_empty()) {
        let expires = expires.replace(':', "%3A").replace('+', "%2B");
        url.push_str("?expires=");
        url.push_str(&expires);
    }
    url
}

/// Extension of the last path segment, without any query string.
/// Falls back to `jpg` when the segment has no dot or the suffix is not alphanumeric.
pub fn image_extension(location: &str) -> String {
    let path = match url::Url::parse(location) {
        Ok(parsed) => parsed.path().to_string(),
        Err(_) => location.split(['?', '#']).next().unwrap_or(location).to_string(),
    };

    let segment = path.rsplit('/').next().unwrap_or(&path);
    match segment.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) => {
            ext.to_string()
        }
        _ => DEFAULT_EXTENSION.to_string(),
    }
}
