//! Download stage: feed export in, images plus metadata snapshot out.

use anyhow::{Context, Result};
use regex::Regex;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;
use tracing::info;

use crate::fetch::{Fetch, HttpFetcher};
use crate::generate::parse_instant;
use crate::images::{ImageFetcher, IMAGES_DIR};
use crate::normalize::{build_observation_lookup, normalize};
use crate::snapshot::{load_feed, METADATA_FILE};
use crate::types::{FeedDocument, FeedRecord, MetadataSnapshot};

const DEFAULT_ARCHIVE_DIR: &str = "famly_archive";
const PROGRESS_EVERY: usize = 10;

/// Export timestamp as it appears in file names, e.g. `famly_feed_2025-08-29_20h25m.json`
static EXPORT_TIMESTAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_(\d{4}-\d{2}-\d{2}_\d{2}h\d{2}m)").unwrap());

/// Archive directory name derived from the export file name
pub fn archive_dir_for(input: &Path) -> PathBuf {
    let file_name = input
        .file_name()
        .map(|n| n.to_string_lossy())
        .unwrap_or_default();

    match EXPORT_TIMESTAMP.captures(&file_name) {
        Some(caps) => PathBuf::from(format!("{}_{}", DEFAULT_ARCHIVE_DIR, &caps[1])),
        None => PathBuf::from(DEFAULT_ARCHIVE_DIR),
    }
}

/// Newest first by the instant each record was created, whatever offset it was written in.
/// Unparseable dates go after every parseable one, ordered by their raw text.
/// The sort is stable so equal instants keep their input order.
pub fn sort_newest_first(records: &mut [FeedRecord]) {
    records.sort_by(|a, b| {
        match (
            parse_instant(&a.created_date).ok(),
            parse_instant(&b.created_date).ok(),
        ) {
            (Some(a_at), Some(b_at)) => b_at.cmp(&a_at),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => b.created_date.cmp(&a.created_date),
        }
    });
}

pub struct ArchivePipeline<F> {
    images: ImageFetcher<F>,
    quiet: bool,
}

impl<F: Fetch> ArchivePipeline<F> {
    pub fn new(images: ImageFetcher<F>, quiet: bool) -> Self {
        Self { images, quiet }
    }

    /// Normalize every record, newest first, into a snapshot
    pub fn run(&self, feed: FeedDocument) -> MetadataSnapshot {
        let FeedDocument {
            mut feed_items,
            observations,
            export_date,
        } = feed;

        let observations = build_observation_lookup(observations);
        sort_newest_first(&mut feed_items);

        let total = feed_items.len();
        if !self.quiet {
            println!("Processing {} feed items...\n", total);
        }

        let mut processed_items = Vec::with_capacity(total);
        for (i, record) in feed_items.iter().enumerate() {
            let index = i + 1;
            if !self.quiet {
                println!("[{:02}/{:02}] Processing: {}", index, total, record.feed_item_id);
            }

            processed_items.push(normalize(record, &observations, &self.images));

            if !self.quiet && (index % PROGRESS_EVERY == 0 || index == total) {
                println!(
                    "Progress: {}/{} items processed ({:.1}%)",
                    index,
                    total,
                    index as f64 / total as f64 * 100.0
                );
            }
        }

        MetadataSnapshot {
            total_items: processed_items.len(),
            processed_items,
            observations,
            export_date,
        }
    }
}

/// Run the download stage and return the path of the written snapshot
pub fn run_download(
    input: &Path,
    output: Option<PathBuf>,
    timeout: Duration,
    quiet: bool,
) -> Result<PathBuf> {
    let feed = load_feed(input)?;

    let output_dir = output.unwrap_or_else(|| archive_dir_for(input));
    let images_dir = output_dir.join(IMAGES_DIR);
    fs::create_dir_all(&images_dir)
        .with_context(|| format!("Failed to create {}", images_dir.display()))?;

    info!(input = %input.display(), output = %output_dir.display(), "starting download");

    let fetcher = HttpFetcher::new(timeout).context("Failed to build HTTP client")?;
    let pipeline = ArchivePipeline::new(ImageFetcher::new(fetcher, images_dir), quiet);
    let snapshot = pipeline.run(feed);

    let metadata_path = output_dir.join(METADATA_FILE);
    snapshot.save(&metadata_path)?;

    let photos: usize = snapshot.processed_items.iter().map(|i| i.photo_count()).sum();
    if !quiet {
        println!("\nDone! Downloaded {} photos from {} items", photos, snapshot.total_items);
        println!("  Location: {}", output_dir.display());
        println!("  Metadata: {}", metadata_path.display());
    }
    info!(items = snapshot.total_items, photos, "download finished");

    Ok(metadata_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::InputError;
    use crate::fetch::testing::StubFetcher;
    use serde_json::json;
    use tempfile::TempDir;

    fn feed(value: serde_json::Value) -> FeedDocument {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_archive_dir_from_timestamped_name() {
        assert_eq!(
            archive_dir_for(Path::new("exports/famly_feed_2025-08-29_20h25m.json")),
            PathBuf::from("famly_archive_2025-08-29_20h25m")
        );
        assert_eq!(
            archive_dir_for(Path::new("feed.json")),
            PathBuf::from("famly_archive")
        );
        assert_eq!(
            archive_dir_for(Path::new("famly_feed_2025-08-29.json")),
            PathBuf::from("famly_archive")
        );
    }

    #[test]
    fn test_run_sorts_and_keeps_every_record() {
        let dir = TempDir::new().unwrap();
        let stub = StubFetcher::default().with("https://x/ok.jpg", b"ok");
        let pipeline = ArchivePipeline::new(ImageFetcher::new(stub, dir.path()), true);

        let snapshot = pipeline.run(feed(json!({
            "exportDate": "2025-08-29T20:25:00Z",
            "feedItems": [
                {"feedItemId": "old", "createdDate": "2025-01-01T08:00:00Z",
                 "images": [{"imageId": "broken", "url": "https://x/broken.jpg"}]},
                {"feedItemId": "new", "createdDate": "2025-03-01T08:00:00Z",
                 "images": [{"imageId": "ok", "url": "https://x/ok.jpg"}]},
                {"feedItemId": "tie-a", "createdDate": "2025-02-01T08:00:00Z"},
                {"feedItemId": "tie-b", "createdDate": "2025-02-01T08:00:00Z"},
                {"feedItemId": "obs", "createdDate": "2025-02-15T08:00:00Z",
                 "embed": {"type": "Observation", "observationId": "missing"}}
            ],
            "observations": [{"id": "obs-1"}]
        })));

        let order: Vec<_> = snapshot
            .processed_items
            .iter()
            .map(|i| i.feed_item_id.as_str())
            .collect();
        assert_eq!(order, ["new", "obs", "tie-a", "tie-b", "old"]);
        assert_eq!(snapshot.total_items, 5);
        assert_eq!(snapshot.export_date.as_deref(), Some("2025-08-29T20:25:00Z"));
        assert!(snapshot.observations.contains_key("obs-1"));

        let old = &snapshot.processed_items[4];
        assert!(old.images.is_empty());
        assert_eq!(snapshot.processed_items[0].images[0].filename, "ok.jpg");
    }

    #[test]
    fn test_sort_compares_instants_across_offsets() {
        let mut records: Vec<FeedRecord> = serde_json::from_value(json!([
            {"feedItemId": "plus-two", "createdDate": "2025-08-29T10:00:00+02:00"},
            {"feedItemId": "nine-z", "createdDate": "2025-08-29T09:00:00Z"},
            {"feedItemId": "garbage", "createdDate": "not a date"},
            {"feedItemId": "half-second", "createdDate": "2025-08-29T09:00:00.5Z"},
            {"feedItemId": "same-instant", "createdDate": "2025-08-29T11:00:00+02:00"},
            {"feedItemId": "blank", "createdDate": ""},
            {"feedItemId": "naive", "createdDate": "2025-08-29T08:30:00"}
        ]))
        .unwrap();

        sort_newest_first(&mut records);

        let order: Vec<_> = records.iter().map(|r| r.feed_item_id.as_str()).collect();
        assert_eq!(
            order,
            ["half-second", "nine-z", "same-instant", "naive", "plus-two", "garbage", "blank"]
        );
    }

    #[test]
    fn test_run_download_missing_feed_fails_before_writing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("archive");

        let err = run_download(
            &dir.path().join("missing.json"),
            Some(output.clone()),
            Duration::from_secs(1),
            true,
        )
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::NotFound(_))
        ));
        assert!(!output.exists());
    }

    #[test]
    fn test_run_download_malformed_feed_fails() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("famly_feed_2025-08-29_20h25m.json");
        fs::write(&input, "[1, 2").unwrap();

        let err = run_download(&input, Some(dir.path().join("archive")), Duration::from_secs(1), true)
            .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<InputError>(),
            Some(InputError::Malformed { .. })
        ));
    }

    #[test]
    fn test_rerun_is_identical() {
        let dir = TempDir::new().unwrap();
        let input = json!({
            "feedItems": [
                {"feedItemId": "a", "createdDate": "2025-02-01"},
                {"feedItemId": "b", "createdDate": "2025-02-01"},
                {"feedItemId": "c", "createdDate": "2025-01-01"}
            ]
        });
        let first = ArchivePipeline::new(ImageFetcher::new(StubFetcher::default(), dir.path()), true)
            .run(feed(input.clone()));
        let second = ArchivePipeline::new(ImageFetcher::new(StubFetcher::default(), dir.path()), true)
            .run(feed(input));
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_feed() {
        let dir = TempDir::new().unwrap();
        let pipeline = ArchivePipeline::new(ImageFetcher::new(StubFetcher::default(), dir.path()), true);
        let snapshot = pipeline.run(FeedDocument::default());
        assert_eq!(snapshot.total_items, 0);
        assert!(snapshot.processed_items.is_empty());
    }
}
