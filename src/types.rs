//! Feed export types and the normalized archive model

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Embed type that marks a feed record as an observation
pub const OBSERVATION_EMBED: &str = "Observation";

/// Observation id -> observation. Built once per run, read-only afterwards.
pub type ObservationLookup = BTreeMap<String, Observation>;

/// Exports write `null` for empty fields as often as they leave them out
fn null_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Pixel size given as an integer, a float or a numeric string.
/// Anything else reads as unknown.
fn lenient_dimension<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number
        .filter(|n| n.is_finite() && *n >= 0.0 && *n <= f64::from(u32::MAX))
        .map(|n| n.round() as u32))
}

/// Top-level export document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedDocument {
    #[serde(default, deserialize_with = "null_default")]
    pub feed_items: Vec<FeedRecord>,
    #[serde(default, deserialize_with = "null_default")]
    pub observations: Vec<Observation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_date: Option<String>,
}

/// Author of a feed record. Fields other than the name are carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sender {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Like {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction: Option<String>,
}

/// Special-content tag on a feed record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Embed {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Embed {
    pub fn is_observation(&self) -> bool {
        self.kind.as_deref() == Some(OBSERVATION_EMBED)
    }
}

/// One raw activity entry from the export
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRecord {
    #[serde(default, deserialize_with = "null_default")]
    pub feed_item_id: String,
    #[serde(default, deserialize_with = "null_default")]
    pub sender: Sender,
    #[serde(default, deserialize_with = "null_default")]
    pub receivers: Vec<String>,
    #[serde(default, deserialize_with = "null_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_default")]
    pub rich_text_body: String,
    #[serde(default, deserialize_with = "null_default")]
    pub created_date: String,
    #[serde(default, deserialize_with = "null_default")]
    pub images: Vec<ImageRef>,
    #[serde(default, deserialize_with = "null_default")]
    pub likes: Vec<Like>,
    #[serde(default, deserialize_with = "null_default")]
    pub comments: Vec<Value>,
    #[serde(default)]
    pub embed: Option<Embed>,
}

/// Signed-URL parts for images that are not addressed by a plain URL
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSecret {
    #[serde(default, deserialize_with = "null_default")]
    pub prefix: String,
    #[serde(default, deserialize_with = "null_default")]
    pub key: String,
    #[serde(default, deserialize_with = "null_default")]
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
}

/// Reference to a remote image, either by URL or by secret bundle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Post images call this `imageId`, observation images `id`
    #[serde(alias = "imageId", default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_big: Option<String>,
    #[serde(
        default,
        deserialize_with = "lenient_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub width: Option<u32>,
    #[serde(
        default,
        deserialize_with = "lenient_dimension",
        skip_serializing_if = "Option::is_none"
    )]
    pub height: Option<u32>,
    /// Either `{"date": "..."}` or a bare string depending on the export version
    #[serde(rename = "createdAt", default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<Value>,
    #[serde(
        default,
        deserialize_with = "null_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub tags: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret: Option<ImageSecret>,
}

impl ImageRef {
    /// Creation timestamp as a string, empty when absent
    pub fn created_at_str(&self) -> String {
        match &self.created_at {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Object(obj)) => obj
                .get("date")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            _ => String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonName {
    #[serde(default, deserialize_with = "null_default")]
    pub full_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default, deserialize_with = "null_default")]
    pub name: PersonName,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Area {
    #[serde(default, deserialize_with = "null_default")]
    pub title: String,
}

/// Development area tagged on an observation remark
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AreaTag {
    #[serde(default, deserialize_with = "null_default")]
    pub area: Area,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refinement: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Remark {
    #[serde(default, deserialize_with = "null_default")]
    pub body: String,
    #[serde(default, deserialize_with = "null_default")]
    pub rich_text_body: String,
    #[serde(default, deserialize_with = "null_default")]
    pub areas: Vec<AreaTag>,
}

/// Assessment note that feed records reference through an embed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    #[serde(default, deserialize_with = "null_default")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<Person>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remark: Option<Remark>,
    #[serde(default, deserialize_with = "null_default")]
    pub images: Vec<ImageRef>,
}

/// An image that was downloaded into the archive
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalImage {
    pub id: String,
    /// `{id}.{extension}` inside the images directory
    pub filename: String,
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Value>,
}

/// Observation details copied onto an item whose embed resolved
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationSection {
    pub observation_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub remark_body: String,
    #[serde(default)]
    pub remark_rich_text_body: String,
    #[serde(default)]
    pub areas: Vec<AreaTag>,
}

/// One feed entry after normalization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveItem {
    pub feed_item_id: String,
    pub sender: Sender,
    pub receivers: Vec<String>,
    pub body: String,
    pub rich_text_body: String,
    pub created_date: String,
    pub images: Vec<LocalImage>,
    #[serde(rename = "observation_images")]
    pub observation_images: Vec<LocalImage>,
    pub likes: Vec<Like>,
    pub comments: Vec<Value>,
    /// Raw embed tag. Views filter on this, not on whether it resolved.
    pub embed: Option<Embed>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<ObservationSection>,
}

impl ArchiveItem {
    /// True when the record was tagged as an observation, resolved or not
    pub fn is_observation_embed(&self) -> bool {
        self.embed.as_ref().is_some_and(Embed::is_observation)
    }

    pub fn photo_count(&self) -> usize {
        self.images.len() + self.observation_images.len()
    }
}

/// Persisted hand-off between the download and generate stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataSnapshot {
    pub processed_items: Vec<ArchiveItem>,
    pub observations: ObservationLookup,
    pub export_date: Option<String>,
    pub total_items: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_feed_record_defaults() {
        let record: FeedRecord = serde_json::from_value(json!({})).unwrap();
        assert_eq!(record.feed_item_id, "");
        assert!(record.receivers.is_empty());
        assert!(record.likes.is_empty());
        assert!(record.comments.is_empty());
        assert_eq!(record.body, "");
        assert_eq!(record.rich_text_body, "");
        assert!(record.embed.is_none());
    }

    #[test]
    fn test_image_ref_accepts_both_id_spellings() {
        let post: ImageRef = serde_json::from_value(json!({"imageId": "p1", "url": "u"})).unwrap();
        let obs: ImageRef = serde_json::from_value(json!({"id": "o1"})).unwrap();
        assert_eq!(post.id, "p1");
        assert_eq!(obs.id, "o1");
    }

    #[test]
    fn test_dimensions_tolerate_floats_and_strings() {
        let img: ImageRef = serde_json::from_value(json!({
            "id": "a",
            "width": 520.0,
            "height": "1040"
        }))
        .unwrap();
        assert_eq!((img.width, img.height), (Some(520), Some(1040)));

        let img: ImageRef =
            serde_json::from_value(json!({"id": "b", "width": -3, "height": "tall"})).unwrap();
        assert_eq!((img.width, img.height), (None, None));
    }

    #[test]
    fn test_null_fields_read_as_empty() {
        let obs: Observation = serde_json::from_value(json!({
            "id": "obs-1",
            "createdBy": {"name": null},
            "remark": {"body": null, "richTextBody": null, "areas": null},
            "images": null
        }))
        .unwrap();
        let remark = obs.remark.unwrap();
        assert_eq!(remark.body, "");
        assert_eq!(remark.rich_text_body, "");
        assert!(remark.areas.is_empty());
        assert!(obs.images.is_empty());
        assert_eq!(obs.created_by.unwrap().name.full_name, "");
    }

    #[test]
    fn test_created_at_shapes() {
        let nested: ImageRef =
            serde_json::from_value(json!({"id": "a", "createdAt": {"date": "2025-01-02"}}))
                .unwrap();
        let bare: ImageRef =
            serde_json::from_value(json!({"id": "b", "createdAt": "2025-03-04"})).unwrap();
        let missing: ImageRef = serde_json::from_value(json!({"id": "c"})).unwrap();
        assert_eq!(nested.created_at_str(), "2025-01-02");
        assert_eq!(bare.created_at_str(), "2025-03-04");
        assert_eq!(missing.created_at_str(), "");
    }

    #[test]
    fn test_embed_keeps_unknown_fields() {
        let embed: Embed = serde_json::from_value(json!({
            "type": "Observation",
            "observationId": "obs-1",
            "childId": "c-9"
        }))
        .unwrap();
        assert!(embed.is_observation());
        assert_eq!(serde_json::to_value(&embed).unwrap()["childId"], "c-9");
    }

    #[test]
    fn test_observation_embed_detection() {
        let mut item = ArchiveItem::default();
        assert!(!item.is_observation_embed());
        item.embed = Some(Embed {
            kind: Some("Event".into()),
            ..Default::default()
        });
        assert!(!item.is_observation_embed());
        item.embed = Some(Embed {
            kind: Some(OBSERVATION_EMBED.into()),
            observation_id: Some("missing".into()),
            ..Default::default()
        });
        assert!(item.is_observation_embed());
    }
}
