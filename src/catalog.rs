//! # Candidate Pool
//!
//! Everything the pipeline knows about available music comes through two
//! capabilities: a [`TrackCatalog`] that returns tracks for a query, and an
//! [`AudioFeatureSource`] that describes them numerically. [`CandidatePool`]
//! wraps both and hides their failures where the pipeline can live without
//! them.
//!
//! Two implementations ship with the crate:
//!
//! - [`crate::spotify::SpotifyCatalog`] - live search against the Spotify Web API
//! - [`OfflineCatalog`] - a JSON file of tracks with inline features

use crate::track::{AudioFeatures, FeatureMap, Track};
use anyhow::{Context, Result};
use chrono::Datelike;
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::sync::Arc;

/// Largest page the catalog hands out in one call.
pub const MAX_PAGE_SIZE: usize = 50;
/// Pool size requested for a recommendation.
pub const DEFAULT_POOL_SIZE: usize = 30;

/// What kind of pool to fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogQuery {
    /// Current regional pool.
    General,
    /// Tracks released within `[start, end]`.
    Era { start: i32, end: i32 },
}

pub trait TrackCatalog: Send + Sync {
    /// At most `limit` tracks matching `query`.
    fn search(&self, query: CatalogQuery, limit: usize) -> Result<Vec<Track>>;
}

pub trait AudioFeatureSource: Send + Sync {
    /// Features for as many of `ids` as the source knows.
    fn features(&self, ids: &[String]) -> Result<FeatureMap>;
}

/// Calendar years in which someone aged `age` was 13 to 19.
///
/// Only ages in `(13, 100]` have a window.
#[must_use]
pub fn teenage_window(age: u32, current_year: i32) -> Option<(i32, i32)> {
    if age <= 13 || age > 100 {
        return None;
    }

    let age = i32::try_from(age).ok()?;
    let start = current_year - (age - 13);
    let end = current_year - (age - 19);
    Some((start.min(end), start.max(end)))
}

/// [`teenage_window`] for the current local year.
#[must_use]
pub fn teenage_window_now(age: u32) -> Option<(i32, i32)> {
    teenage_window(age, chrono::Local::now().year())
}

/// Catalog + feature source with the pipeline's fetch rules applied.
#[derive(Clone)]
pub struct CandidatePool {
    catalog: Arc<dyn TrackCatalog>,
    features: Arc<dyn AudioFeatureSource>,
}

impl CandidatePool {
    pub fn new(catalog: Arc<dyn TrackCatalog>, features: Arc<dyn AudioFeatureSource>) -> Self {
        Self { catalog, features }
    }

    /// Fetch and shuffle a pool.
    ///
    /// Nostalgia mode searches the listener's teenage window and yields an
    /// empty pool when the age has no window. Errors come only from the
    /// catalog itself.
    pub fn fetch(&self, nostalgia: bool, age: Option<u32>, limit: usize) -> Result<Vec<Track>> {
        let limit = limit.min(MAX_PAGE_SIZE);

        let query = if nostalgia {
            match age.and_then(teenage_window_now) {
                Some((start, end)) => CatalogQuery::Era { start, end },
                None => {
                    info!("No nostalgia window for age {age:?}, pool is empty");
                    return Ok(Vec::new());
                }
            }
        } else {
            CatalogQuery::General
        };

        let mut tracks = self
            .catalog
            .search(query, limit)
            .with_context(|| format!("Catalog search failed for {query:?}"))?;
        tracks.truncate(limit);

        // Later stages truncate; shuffling keeps catalog rank from leaking in.
        tracks.shuffle(&mut rand::thread_rng());

        debug!("Fetched {} candidate tracks for {query:?}", tracks.len());
        Ok(tracks)
    }

    /// Features for the given ids; any failure yields an empty map.
    #[must_use]
    pub fn fetch_features(&self, ids: &[String]) -> FeatureMap {
        if ids.is_empty() {
            return FeatureMap::new();
        }

        match self.features.features(ids) {
            Ok(map) => {
                debug!("Audio features found for {}/{} tracks", map.len(), ids.len());
                map
            }
            Err(e) => {
                warn!("Audio features unavailable: {e:#}");
                FeatureMap::new()
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct OfflineEntry {
    #[serde(flatten)]
    track: Track,
    #[serde(default)]
    features: Option<AudioFeatures>,
}

/// Catalog read from a JSON array of tracks.
///
/// ```json
/// [{ "id": "t1", "title": "Rain", "artist": "Someone", "year": 2012,
///    "externalUrl": "",
///    "features": { "valence": 0.2, "energy": 0.3, "tempo": 80.0,
///                  "acousticness": 0.7, "danceability": 0.3 } }]
/// ```
#[derive(Debug, Clone, Default)]
pub struct OfflineCatalog {
    entries: Vec<OfflineEntry>,
}

impl OfflineCatalog {
    pub fn from_json(text: &str) -> Result<Self> {
        let entries: Vec<OfflineEntry> =
            serde_json::from_str(text).context("Offline catalog must be a JSON array of tracks")?;
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read offline catalog {}", path.display()))?;
        let catalog = Self::from_json(&text)
            .with_context(|| format!("Failed to parse offline catalog {}", path.display()))?;
        info!("Loaded {} tracks from offline catalog {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Build directly from tracks and their features.
    #[must_use]
    pub fn from_tracks(tracks: Vec<(Track, Option<AudioFeatures>)>) -> Self {
        Self {
            entries: tracks
                .into_iter()
                .map(|(track, features)| OfflineEntry { track, features })
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TrackCatalog for OfflineCatalog {
    fn search(&self, query: CatalogQuery, limit: usize) -> Result<Vec<Track>> {
        let tracks = self
            .entries
            .iter()
            .filter(|entry| match query {
                CatalogQuery::General => true,
                CatalogQuery::Era { start, end } => entry.track.year.is_some_and(|y| (start..=end).contains(&y)),
            })
            .take(limit)
            .map(|entry| entry.track.clone())
            .collect();
        Ok(tracks)
    }
}

impl AudioFeatureSource for OfflineCatalog {
    fn features(&self, ids: &[String]) -> Result<FeatureMap> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| ids.contains(&entry.track.id))
            .filter_map(|entry| entry.features.map(|f| (entry.track.id.clone(), f)))
            .collect())
    }
}
