//! Playable links for the final recommendations.
//!
//! A [`LinkResolver`] turns `(title, artist)` into a watch URL. When none is
//! configured, or it fails, the recommendation gets a YouTube search link
//! instead, so every entry always has something to play.

use crate::track::Recommendation;
use anyhow::{Context, Result};
use log::{debug, warn};
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

const YOUTUBE_SEARCH_API: &str = "https://www.googleapis.com/youtube/v3/search";
const YOUTUBE_RESULTS: &str = "https://www.youtube.com/results?search_query=";
const YOUTUBE_WATCH: &str = "https://www.youtube.com/watch?v=";

pub trait LinkResolver: Send + Sync {
    /// A playable URL, or `None` when nothing was found.
    fn resolve(&self, title: &str, artist: &str) -> Result<Option<String>>;
}

/// Deterministic search link for a track.
///
/// ```
/// use moodtune::links::search_link;
///
/// assert_eq!(
///     search_link("Spring Day", "BTS"),
///     "https://www.youtube.com/results?search_query=Spring%20Day%20BTS"
/// );
/// ```
#[must_use]
pub fn search_link(title: &str, artist: &str) -> String {
    format!("{YOUTUBE_RESULTS}{}", urlencoding::encode(&format!("{title} {artist}")))
}

/// First video of a YouTube Data API search.
pub struct YouTubeResolver {
    http: Client,
    api_key: String,
}

impl YouTubeResolver {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client for YouTube")?;
        Ok(Self {
            http,
            api_key: api_key.into(),
        })
    }
}

impl LinkResolver for YouTubeResolver {
    fn resolve(&self, title: &str, artist: &str) -> Result<Option<String>> {
        let query = format!("{title} {artist}");
        let found: Value = self
            .http
            .get(YOUTUBE_SEARCH_API)
            .query(&[
                ("part", "snippet"),
                ("q", query.as_str()),
                ("type", "video"),
                ("maxResults", "1"),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .context("YouTube search request failed")?
            .error_for_status()
            .context("YouTube search was rejected")?
            .json()
            .context("YouTube search returned malformed JSON")?;

        Ok(found
            .pointer("/items/0/id/videoId")
            .and_then(Value::as_str)
            .map(|id| format!("{YOUTUBE_WATCH}{id}")))
    }
}

/// Best-effort link attachment.
#[derive(Default)]
pub struct LinkEnricher {
    resolver: Option<Box<dyn LinkResolver>>,
}

impl LinkEnricher {
    #[must_use]
    pub fn new(resolver: Option<Box<dyn LinkResolver>>) -> Self {
        Self { resolver }
    }

    fn link_for(&self, rec: &Recommendation) -> String {
        let Some(resolver) = &self.resolver else {
            return search_link(&rec.title, &rec.artist);
        };

        match resolver.resolve(&rec.title, &rec.artist) {
            Ok(Some(url)) => url,
            Ok(None) => {
                debug!("No video found for '{}', using a search link", rec.title);
                search_link(&rec.title, &rec.artist)
            }
            Err(e) => {
                warn!("Link lookup failed for '{}': {e:#}", rec.title);
                search_link(&rec.title, &rec.artist)
            }
        }
    }

    /// Fill `play_url` on every recommendation, in place.
    pub fn attach(&self, recommendations: &mut [Recommendation]) {
        for rec in recommendations.iter_mut() {
            rec.play_url = self.link_for(rec);
        }
    }
}
