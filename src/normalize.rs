//! Turns raw feed records into archive items.

use tracing::{debug, warn};

use crate::error::UnresolvedObservation;
use crate::fetch::Fetch;
use crate::images::ImageFetcher;
use crate::types::{
    ArchiveItem, FeedRecord, ImageRef, LocalImage, Observation, ObservationLookup,
    ObservationSection,
};

/// Build the observation lookup. When ids repeat, the later entry wins.
pub fn build_observation_lookup(observations: Vec<Observation>) -> ObservationLookup {
    let mut lookup = ObservationLookup::new();
    for obs in observations {
        if let Some(previous) = lookup.insert(obs.id.clone(), obs) {
            debug!(id = %previous.id, "duplicate observation id, keeping the later one");
        }
    }
    lookup
}

/// Find the observation a record embeds, if it is tagged as one.
///
/// Ok(None) means the record is not an observation embed at all.
pub fn resolve_observation<'a>(
    record: &FeedRecord,
    observations: &'a ObservationLookup,
) -> Result<Option<&'a Observation>, UnresolvedObservation> {
    let Some(embed) = record.embed.as_ref().filter(|e| e.is_observation()) else {
        return Ok(None);
    };

    let id = embed.observation_id.clone().unwrap_or_default();
    observations
        .get(&id)
        .map(Some)
        .ok_or(UnresolvedObservation { id })
}

/// Acquire every image, keeping successes in their original order
pub fn acquire_images<F: Fetch>(images: &[ImageRef], fetcher: &ImageFetcher<F>) -> Vec<LocalImage> {
    images
        .iter()
        .filter_map(|image| match fetcher.acquire(image) {
            Ok(local) => Some(local),
            Err(e) if e.is_skip() => {
                debug!(error = %e, "skipping image");
                None
            }
            Err(e) => {
                warn!(id = %image.id, error = %e, "image download failed");
                None
            }
        })
        .collect()
}

fn observation_section(obs: &Observation) -> ObservationSection {
    let remark = obs.remark.clone().unwrap_or_default();
    ObservationSection {
        observation_id: obs.id.clone(),
        author: obs
            .created_by
            .as_ref()
            .map(|p| p.name.full_name.clone())
            .filter(|name| !name.is_empty()),
        remark_body: remark.body,
        remark_rich_text_body: remark.rich_text_body,
        areas: remark.areas,
    }
}

/// Normalize one record. The only side effects are the image files written by `fetcher`.
pub fn normalize<F: Fetch>(
    record: &FeedRecord,
    observations: &ObservationLookup,
    fetcher: &ImageFetcher<F>,
) -> ArchiveItem {
    let images = acquire_images(&record.images, fetcher);

    let (observation_images, observation) = match resolve_observation(record, observations) {
        Ok(Some(obs)) => (
            acquire_images(&obs.images, fetcher),
            Some(observation_section(obs)),
        ),
        Ok(None) => (Vec::new(), None),
        Err(e) => {
            warn!(item = %record.feed_item_id, error = %e, "rendering observation embed as a plain post");
            (Vec::new(), None)
        }
    };

    ArchiveItem {
        feed_item_id: record.feed_item_id.clone(),
        sender: record.sender.clone(),
        receivers: record.receivers.clone(),
        body: record.body.clone(),
        rich_text_body: record.rich_text_body.clone(),
        created_date: record.created_date.clone(),
        images,
        observation_images,
        likes: record.likes.clone(),
        comments: record.comments.clone(),
        embed: record.embed.clone(),
        observation,
    }
}
