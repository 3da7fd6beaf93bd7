//! # Lyrics Sources
//!
//! Lyrics are optional context for the scoring oracle. Every source may fail
//! or come back empty and the pipeline carries on with an empty string.
//!
//! - [`MusixmatchLyrics`] uses the official API and strips its trailing
//!   `*** This Lyrics is NOT for Commercial use ***` disclaimer.
//! - [`GeniusLyrics`] searches the API for the song page and scrapes the
//!   lyric containers out of the HTML.
//! - [`LyricsChain`] asks each configured source in turn; the first
//!   non-empty answer wins.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;
use reqwest::blocking::Client;
use serde_json::Value;
use std::time::Duration;

/// Longest lyric text handed to the oracle, in characters.
pub const MAX_LYRICS_CHARS: usize = 4000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MUSIXMATCH_API: &str = "https://api.musixmatch.com/ws/1.1";
const GENIUS_API: &str = "https://api.genius.com";

lazy_static! {
    static ref LYRICS_CONTAINER: Regex = Regex::new(r#"<div class="Lyrics__Container[^>]*>"#).unwrap();
    static ref LEGACY_CONTAINER: Regex = Regex::new(r#"<div class="lyrics">"#).unwrap();
    static ref DIV_TAG: Regex = Regex::new(r"(?i)<(/?)div\b[^>]*>").unwrap();
    static ref LINE_BREAK: Regex = Regex::new(r"(?i)<br\s*/?>").unwrap();
    static ref HTML_TAG: Regex = Regex::new(r"<[^>]+>").unwrap();
}

pub trait LyricsSource: Send + Sync {
    /// Plain-text lyrics, or an empty string when the song is unknown.
    fn lyrics(&self, title: &str, artist: &str) -> Result<String>;
}

/// Used when no lyrics provider is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLyrics;

impl LyricsSource for NoLyrics {
    fn lyrics(&self, _title: &str, _artist: &str) -> Result<String> {
        Ok(String::new())
    }
}

fn http_client() -> Result<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("Failed to build HTTP client for lyrics")
}

/// Drop everything from the first `*` on and trim.
#[must_use]
pub fn strip_disclaimer(body: &str) -> &str {
    body.find('*').map_or(body, |i| &body[..i]).trim()
}

pub struct MusixmatchLyrics {
    http: Client,
    api_key: String,
}

impl MusixmatchLyrics {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            api_key: api_key.into(),
        })
    }

    fn get(&self, method: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.http
            .get(format!("{MUSIXMATCH_API}/{method}"))
            .query(params)
            .query(&[("apikey", self.api_key.as_str())])
            .send()
            .with_context(|| format!("Musixmatch {method} request failed"))?
            .error_for_status()
            .with_context(|| format!("Musixmatch {method} was rejected"))?
            .json()
            .with_context(|| format!("Musixmatch {method} returned malformed JSON"))
    }
}

impl LyricsSource for MusixmatchLyrics {
    fn lyrics(&self, title: &str, artist: &str) -> Result<String> {
        let search = self.get(
            "track.search",
            &[
                ("q_track", title),
                ("q_artist", artist),
                ("s_track_rating", "desc"),
                ("page_size", "1"),
            ],
        )?;

        let Some(track_id) = search.pointer("/message/body/track_list/0/track/track_id") else {
            debug!("Musixmatch has no match for '{title}' by {artist}");
            return Ok(String::new());
        };
        let track_id = match track_id {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };

        let body = self.get("track.lyrics.get", &[("track_id", track_id.as_str())])?;
        let text = body
            .pointer("/message/body/lyrics/lyrics_body")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Ok(strip_disclaimer(text).to_string())
    }
}

/// Replace the handful of entities the lyric pages actually use.
fn decode_entities(text: &str) -> String {
    text.replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Inner HTML of every div opened by `opener`, up to its own closing tag.
///
/// Nested divs (annotations, ads) stay inside the body. An unclosed container
/// runs to the end of the page.
fn container_bodies<'a>(html: &'a str, opener: &Regex) -> Vec<&'a str> {
    let mut bodies = Vec::new();
    let mut pos = 0;

    while let Some(open) = opener.find_at(html, pos) {
        let start = open.end();
        let mut depth = 1usize;
        let mut end = html.len();
        let mut resume = html.len();

        for tag in DIV_TAG.captures_iter(&html[start..]) {
            let Some(whole) = tag.get(0) else { continue };
            if tag.get(1).is_some_and(|m| !m.as_str().is_empty()) {
                depth -= 1;
                if depth == 0 {
                    end = start + whole.start();
                    resume = start + whole.end();
                    break;
                }
            } else {
                depth += 1;
            }
        }

        bodies.push(&html[start..end]);
        pos = resume;
    }

    bodies
}

/// Pull plain lyrics out of a Genius song page.
#[must_use]
pub fn extract_genius_lyrics(html: &str) -> String {
    let mut raw = container_bodies(html, &LYRICS_CONTAINER).join("\n");

    if raw.is_empty() {
        raw = container_bodies(html, &LEGACY_CONTAINER)
            .first()
            .map(|body| body.to_string())
            .unwrap_or_default();
    }

    let text = LINE_BREAK.replace_all(&raw, "\n");
    let text = HTML_TAG.replace_all(&text, "");
    decode_entities(&text).trim().chars().take(MAX_LYRICS_CHARS).collect()
}

pub struct GeniusLyrics {
    http: Client,
    token: String,
}

impl GeniusLyrics {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            token: token.into(),
        })
    }

    fn song_url(&self, title: &str, artist: &str) -> Result<Option<String>> {
        let query = format!("{title} {artist}");
        let found: Value = self
            .http
            .get(format!("{GENIUS_API}/search"))
            .bearer_auth(&self.token)
            .query(&[("q", query.as_str())])
            .send()
            .context("Genius search request failed")?
            .error_for_status()
            .context("Genius search was rejected")?
            .json()
            .context("Genius search returned malformed JSON")?;

        Ok(found
            .pointer("/response/hits/0/result/url")
            .and_then(Value::as_str)
            .map(str::to_string))
    }
}

impl LyricsSource for GeniusLyrics {
    fn lyrics(&self, title: &str, artist: &str) -> Result<String> {
        let Some(url) = self.song_url(title, artist)? else {
            debug!("Genius has no match for '{title}' by {artist}");
            return Ok(String::new());
        };

        let html = self
            .http
            .get(&url)
            .send()
            .with_context(|| format!("Failed to fetch Genius page {url}"))?
            .text()
            .with_context(|| format!("Failed to read Genius page {url}"))?;
        Ok(extract_genius_lyrics(&html))
    }
}

/// Sources tried in order; never fails.
#[derive(Default)]
pub struct LyricsChain {
    sources: Vec<Box<dyn LyricsSource>>,
}

impl LyricsChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, source: Box<dyn LyricsSource>) -> Self {
        self.sources.push(source);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl LyricsSource for LyricsChain {
    fn lyrics(&self, title: &str, artist: &str) -> Result<String> {
        for source in &self.sources {
            match source.lyrics(title, artist) {
                Ok(text) if !text.trim().is_empty() => return Ok(text),
                Ok(_) => {}
                Err(e) => warn!("Lyrics lookup failed for '{title}' by {artist}: {e:#}"),
            }
        }
        Ok(String::new())
    }
}
