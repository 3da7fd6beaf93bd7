//! # Spotify Catalog
//!
//! Live [`TrackCatalog`] and [`AudioFeatureSource`] backed by the Spotify Web
//! API, authenticated with the client-credentials flow.
//!
//! - General pools search `genre:k-pop` in the `KR` market and keep only
//!   tracks whose ISRC carries the market prefix.
//! - Era pools add `year:<start>-<end>` and skip the ISRC filter.
//! - A `403` from the audio-features endpoint invalidates the cached token
//!   and answers an empty map; the next request re-authenticates.

use crate::catalog::{AudioFeatureSource, CatalogQuery, TrackCatalog, MAX_PAGE_SIZE};
use crate::token::{IssuedToken, TokenCache};
use crate::track::{AudioFeatures, FeatureMap, Track};
use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use log::{debug, warn};
use reqwest::blocking::Client;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    tracks: Option<TrackPage>,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    #[serde(default)]
    items: Vec<ApiTrack>,
}

#[derive(Debug, Deserialize)]
struct ApiTrack {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<ApiArtist>,
    #[serde(default)]
    external_urls: ExternalUrls,
    #[serde(default)]
    external_ids: ExternalIds,
    #[serde(default)]
    album: Option<ApiAlbum>,
}

#[derive(Debug, Deserialize)]
struct ApiArtist {
    name: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalUrls {
    #[serde(default)]
    spotify: String,
}

#[derive(Debug, Default, Deserialize)]
struct ExternalIds {
    #[serde(default)]
    isrc: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiAlbum {
    #[serde(default)]
    release_date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeaturesResponse {
    #[serde(default)]
    audio_features: Vec<Option<ApiFeatures>>,
}

#[derive(Debug, Deserialize)]
struct ApiFeatures {
    id: String,
    valence: f64,
    energy: f64,
    tempo: f64,
    acousticness: f64,
    danceability: f64,
}

impl ApiTrack {
    fn into_track(self) -> Track {
        let year = self
            .album
            .and_then(|a| a.release_date)
            .and_then(|date| date.get(..4).and_then(|y| y.parse().ok()));

        Track {
            id: self.id,
            title: self.name,
            artist: self
                .artists
                .iter()
                .map(|a| a.name.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            external_url: self.external_urls.spotify,
            year,
        }
    }
}

/// Build the search `q` parameter for a pool query.
fn search_terms(genre: &str, query: CatalogQuery) -> String {
    match query {
        CatalogQuery::General => format!("genre:{genre}"),
        CatalogQuery::Era { start, end } => format!("genre:{genre} year:{start}-{end}"),
    }
}

pub struct SpotifyCatalog {
    http: Client,
    client_id: String,
    client_secret: String,
    market: String,
    genre: String,
    tokens: TokenCache,
}

impl SpotifyCatalog {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client for Spotify")?;

        Ok(Self {
            http,
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            market: "KR".to_string(),
            genre: "k-pop".to_string(),
            tokens: TokenCache::default(),
        })
    }

    /// Override the search market (also used as the ISRC prefix).
    #[must_use]
    pub fn with_market(mut self, market: impl Into<String>) -> Self {
        self.market = market.into();
        self
    }

    #[must_use]
    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = genre.into();
        self
    }

    fn issue_token(&self) -> Result<IssuedToken> {
        let credentials = BASE64.encode(format!("{}:{}", self.client_id, self.client_secret));
        let response = self
            .http
            .post(TOKEN_URL)
            .header("Authorization", format!("Basic {credentials}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .context("Spotify token request failed")?;

        let status = response.status();
        if !status.is_success() {
            bail!("Spotify refused client credentials ({status})");
        }

        let token: TokenResponse = response.json().context("Malformed Spotify token response")?;
        Ok(IssuedToken {
            access_token: token.access_token,
            expires_in: Duration::from_secs(token.expires_in),
        })
    }

    fn access_token(&self) -> Result<String> {
        self.tokens.get_or_refresh(|| self.issue_token())
    }
}

impl TrackCatalog for SpotifyCatalog {
    fn search(&self, query: CatalogQuery, limit: usize) -> Result<Vec<Track>> {
        let token = self.access_token()?;
        let terms = search_terms(&self.genre, query);
        let limit = limit.clamp(1, MAX_PAGE_SIZE).to_string();

        debug!("Spotify search: {terms} (market {}, limit {limit})", self.market);
        let response = self
            .http
            .get(format!("{API_BASE}/search"))
            .bearer_auth(token)
            .query(&[
                ("q", terms.as_str()),
                ("type", "track"),
                ("market", self.market.as_str()),
                ("limit", limit.as_str()),
            ])
            .send()
            .context("Spotify search request failed")?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.tokens.invalidate();
        }
        if !status.is_success() {
            bail!("Spotify search answered {status}");
        }

        let page: SearchResponse = response.json().context("Malformed Spotify search response")?;
        let items = page.tracks.map(|p| p.items).unwrap_or_default();

        let tracks = items
            .into_iter()
            .filter(|t| match query {
                CatalogQuery::General => t
                    .external_ids
                    .isrc
                    .as_deref()
                    .is_some_and(|isrc| isrc.starts_with(&self.market)),
                CatalogQuery::Era { .. } => true,
            })
            .map(ApiTrack::into_track)
            .collect();
        Ok(tracks)
    }
}

impl AudioFeatureSource for SpotifyCatalog {
    fn features(&self, ids: &[String]) -> Result<FeatureMap> {
        if ids.is_empty() {
            return Ok(FeatureMap::new());
        }

        let token = self.access_token()?;
        let response = self
            .http
            .get(format!("{API_BASE}/audio-features"))
            .bearer_auth(token)
            .query(&[("ids", ids.join(","))])
            .send()
            .context("Spotify audio-features request failed")?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            warn!("Spotify refused audio features (403); dropping cached token");
            self.tokens.invalidate();
            return Ok(FeatureMap::new());
        }
        if !status.is_success() {
            bail!("Spotify audio-features answered {status}");
        }

        let body: FeaturesResponse = response.json().context("Malformed Spotify audio-features response")?;
        Ok(body
            .audio_features
            .into_iter()
            .flatten()
            .map(|f| {
                (
                    f.id,
                    AudioFeatures {
                        valence: f.valence,
                        energy: f.energy,
                        tempo: f.tempo,
                        acousticness: f.acousticness,
                        danceability: f.danceability,
                    },
                )
            })
            .collect())
    }
}
