//! Reading and writing the JSON files that bracket each stage.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::InputError;
use crate::types::{FeedDocument, MetadataSnapshot};

/// Name of the snapshot file inside an archive directory
pub const METADATA_FILE: &str = "metadata.json";

/// Read and parse a JSON input file. Any failure here is fatal to the run.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, InputError> {
    if !path.exists() {
        return Err(InputError::NotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| InputError::Malformed {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_feed(path: &Path) -> Result<FeedDocument, InputError> {
    read_json(path)
}

impl MetadataSnapshot {
    pub fn load(path: &Path) -> Result<Self, InputError> {
        read_json(path)
    }

    /// Write the snapshot, replacing any earlier one at `path`
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ArchiveItem, Embed, LocalImage, Observation};
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = load_feed(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, InputError::NotFound(_)));
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(load_feed(&path), Err(InputError::Malformed { .. })));
    }

    #[test]
    fn test_feed_without_observations() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        fs::write(&path, r#"{"feedItems": [{"feedItemId": "a"}]}"#).unwrap();

        let feed = load_feed(&path).unwrap();
        assert_eq!(feed.feed_items.len(), 1);
        assert!(feed.observations.is_empty());
        assert!(feed.export_date.is_none());
    }

    #[test]
    fn test_null_fields_do_not_abort_the_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("feed.json");
        let raw = json!({
            "feedItems": [{
                "feedItemId": "a",
                "sender": null,
                "body": null,
                "richTextBody": null,
                "receivers": null,
                "createdDate": null,
                "likes": null,
                "comments": null,
                "images": [{"imageId": null, "url": null, "width": null, "tags": null, "secret": null}],
                "embed": null
            }, {
                "feedItemId": "b",
                "body": "Hi",
                "images": null
            }],
            "observations": [{"id": "obs-1", "remark": null, "createdBy": null, "images": null}]
        });
        fs::write(&path, raw.to_string()).unwrap();

        let feed = load_feed(&path).unwrap();
        assert_eq!(feed.feed_items.len(), 2);
        let first = &feed.feed_items[0];
        assert_eq!(first.body, "");
        assert_eq!(first.rich_text_body, "");
        assert!(first.receivers.is_empty());
        assert!(first.likes.is_empty());
        assert!(first.comments.is_empty());
        assert_eq!(first.images[0].id, "");
        assert!(feed.feed_items[1].images.is_empty());
        assert!(feed.observations[0].remark.is_none());
    }

    #[test]
    fn test_snapshot_survives_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(METADATA_FILE);

        let mut snapshot = MetadataSnapshot {
            export_date: Some("2025-08-29T20:25:00Z".into()),
            ..Default::default()
        };
        snapshot.observations.insert(
            "obs-1".into(),
            serde_json::from_value::<Observation>(json!({"id": "obs-1"})).unwrap(),
        );
        snapshot.processed_items.push(ArchiveItem {
            feed_item_id: "f1".into(),
            images: vec![LocalImage {
                id: "i".into(),
                filename: "i.jpg".into(),
                ..Default::default()
            }],
            embed: Some(Embed {
                kind: Some("Observation".into()),
                observation_id: Some("obs-1".into()),
                ..Default::default()
            }),
            ..Default::default()
        });
        snapshot.total_items = 1;

        snapshot.save(&path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["processed_items", "observations", "export_date", "total_items"] {
            assert!(raw.get(key).is_some(), "missing {key}");
        }

        assert_eq!(MetadataSnapshot::load(&path).unwrap(), snapshot);
    }
}
