//! Copy the images shown on the posts-only page into their own folder.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::generate::{view_items, View};
use crate::images::IMAGES_DIR;
use crate::types::MetadataSnapshot;

pub const POST_IMAGES_DIR: &str = "post_images";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ExtractSummary {
    pub copied: usize,
    pub failed: usize,
    pub total_bytes: u64,
}

/// Filenames referenced by the posts-only view, in page order
pub fn post_image_filenames(snapshot: &MetadataSnapshot) -> Vec<&str> {
    view_items(snapshot, View::PostsOnly)
        .into_iter()
        .flat_map(|item| item.images.iter().map(|img| img.filename.as_str()))
        .collect()
}

impl ExtractSummary {
    pub fn is_empty(&self) -> bool {
        self.copied == 0 && self.failed == 0
    }
}

/// Copy posts-only images from `images/` to `post_images/`.
/// A missing or unreadable source counts as failed and does not stop the rest.
/// Nothing is created when the view has no images.
pub fn extract_post_images(snapshot: &MetadataSnapshot, archive_dir: &Path) -> Result<ExtractSummary> {
    let filenames = post_image_filenames(snapshot);
    let mut summary = ExtractSummary::default();
    if filenames.is_empty() {
        return Ok(summary);
    }

    let source_dir = archive_dir.join(IMAGES_DIR);
    let target_dir = archive_dir.join(POST_IMAGES_DIR);
    fs::create_dir_all(&target_dir)
        .with_context(|| format!("Failed to create {}", target_dir.display()))?;

    for filename in filenames {
        let source = source_dir.join(filename);
        if !source.is_file() {
            warn!(%filename, "post image missing from archive");
            summary.failed += 1;
            continue;
        }

        match fs::copy(&source, target_dir.join(filename)) {
            Ok(bytes) => {
                summary.copied += 1;
                summary.total_bytes += bytes;
            }
            Err(e) => {
                warn!(%filename, error = %e, "failed to copy post image");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

pub fn run_extract(metadata_path: &Path, quiet: bool) -> Result<()> {
    let snapshot = MetadataSnapshot::load(metadata_path)?;
    let archive_dir = metadata_path.parent().unwrap_or_else(|| Path::new(""));

    let summary = extract_post_images(&snapshot, archive_dir)?;

    if quiet {
        return Ok(());
    }
    if summary.is_empty() {
        println!("No post images found to extract");
    } else {
        println!(
            "Done! {} copied, {} failed ({:.1} MB) to {}",
            summary.copied,
            summary.failed,
            summary.total_bytes as f64 / (1024.0 * 1024.0),
            archive_dir.join(POST_IMAGES_DIR).display()
        );
    }

    Ok(())
}
