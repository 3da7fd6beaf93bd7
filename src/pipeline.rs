//! # Recommendation Pipeline
//!
//! [`Recommender::recommend`] runs one request end to end:
//!
//! ```text
//! faceDist ─▶ normalize ─▶ calibrate(τ) ─▶ fuse ─▶ emotion
//!                                                    │
//!                     ┌──────────────────────────────┴───────────┐
//!                     ▼                                          ▼
//!              SpecGenerator                      CandidatePool::fetch + features
//!                     │                                          │
//!                     │                     filter(empathy) / filter(relief)
//!                     │                                          │
//!                     └──────────▶ ScoringPipeline ◀─────────────┘
//!                                        │
//!                                   select ─▶ LinkEnricher ─▶ response
//! ```
//!
//! Spec generation and pool fetching run side by side. Every collaborator
//! failure is absorbed by the stage it happens in, except the catalog: a
//! catalog that errors or answers with nothing ends the request with a
//! [`RecommendError`].

use crate::calibration::{calibrate, Calibrator};
use crate::catalog::{CandidatePool, OfflineCatalog, DEFAULT_POOL_SIZE};
use crate::config::Settings;
use crate::emotion::{fuse, normalize, Emotion, EmotionDistribution, RawEmotionScores};
use crate::emotion_spec::{EmotionSpec, SpecGenerator};
use crate::filter::filter;
use crate::links::{LinkEnricher, YouTubeResolver};
use crate::lyrics::{GeniusLyrics, LyricsChain, MusixmatchLyrics};
use crate::scoring::{cap_candidates, KeywordScorer, OracleScorer, ScoringOracle, ScoringPipeline};
use crate::selector::select;
use crate::spotify::SpotifyCatalog;
use crate::track::{Category, Recommendation};
use anyhow::bail;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// What the caller knows about the listener.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendRequest {
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub gender: Option<String>,
    /// Label to use when there is no face distribution.
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub face_dist: Option<RawEmotionScores>,
    #[serde(default)]
    pub nostalgia: bool,
    #[serde(default, rename = "trait")]
    pub trait_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendResponse {
    #[serde(rename = "finalEmotion")]
    pub emotion: Emotion,
    pub nostalgia: bool,
    /// Calibrated distribution, when the request carried one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<EmotionDistribution>,
    pub spec: EmotionSpec,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Error)]
pub enum RecommendError {
    #[error("Track catalog unavailable: {0:#}")]
    CatalogUnavailable(anyhow::Error),
    #[error("No candidate tracks found{}", window_note(.nostalgia))]
    NoCandidates { nostalgia: bool },
}

fn window_note(nostalgia: &bool) -> &'static str {
    if *nostalgia {
        " for the nostalgia window"
    } else {
        ""
    }
}

pub struct Recommender {
    calibrator: Calibrator,
    specs: SpecGenerator,
    pool: CandidatePool,
    scoring: ScoringPipeline,
    links: LinkEnricher,
    pool_size: usize,
}

impl Recommender {
    #[must_use]
    pub fn new(
        calibrator: Calibrator,
        specs: SpecGenerator,
        pool: CandidatePool,
        scoring: ScoringPipeline,
        links: LinkEnricher,
    ) -> Self {
        Self {
            calibrator,
            specs,
            pool,
            scoring,
            links,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }

    /// Number of tracks requested from the catalog.
    #[must_use]
    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }

    /// Wire up every collaborator from `settings`.
    ///
    /// Without an oracle key the fixed spec and keyword scorer are used;
    /// without a YouTube key links are search URLs. A track catalog is
    /// mandatory: either an offline file or Spotify credentials.
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let calibrator = Calibrator::from_path(settings.calibration_path().as_deref());

        let oracle = settings.oracle_client()?;
        let specs = SpecGenerator::with_oracle(oracle.clone());
        let scorer: Arc<dyn ScoringOracle> = match oracle {
            Some(client) => {
                info!("Using oracle model {}", client.model());
                Arc::new(OracleScorer::new(client))
            }
            None => {
                info!("No oracle configured, using the fixed spec and keyword scorer");
                Arc::new(KeywordScorer)
            }
        };

        let pool = if let Some(path) = settings.catalog_path()? {
            let catalog = Arc::new(OfflineCatalog::load(&path)?);
            CandidatePool::new(catalog.clone(), catalog)
        } else if let Some((id, secret)) = settings.spotify_credentials() {
            let catalog = Arc::new(SpotifyCatalog::new(id, secret)?);
            CandidatePool::new(catalog.clone(), catalog)
        } else {
            bail!("No track catalog configured: pass --catalog <file> or set SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET");
        };

        let mut lyrics = LyricsChain::new();
        if let Some(key) = &settings.musixmatch_api_key {
            lyrics = lyrics.with(Box::new(MusixmatchLyrics::new(key.as_str())?));
        }
        if let Some(token) = &settings.genius_api_key {
            lyrics = lyrics.with(Box::new(GeniusLyrics::new(token.as_str())?));
        }
        if lyrics.is_empty() {
            debug!("No lyrics source configured");
        }

        let scoring = ScoringPipeline::new(Arc::new(lyrics), scorer)?;

        let links = match &settings.youtube_api_key {
            Some(key) => LinkEnricher::new(Some(Box::new(YouTubeResolver::new(key.as_str())?))),
            None => LinkEnricher::default(),
        };

        Ok(Self::new(calibrator, specs, pool, scoring, links))
    }

    /// Normalize, calibrate and fuse the request's emotion signal.
    #[must_use]
    pub fn detect(&self, request: &RecommendRequest) -> (Emotion, Option<EmotionDistribution>) {
        let distribution = request.face_dist.as_ref().and_then(|raw| {
            let tau = self
                .calibrator
                .temperature(request.trait_name.as_deref(), request.gender.as_deref());
            calibrate(Some(normalize(Some(raw))), tau)
        });

        let emotion = fuse(distribution.as_ref(), request.emotion.as_deref().unwrap_or_default());
        (emotion, distribution)
    }

    /// Run the whole pipeline for one request.
    ///
    /// # Errors
    ///
    /// Only when the catalog fails or returns no tracks at all.
    pub fn recommend(&self, request: &RecommendRequest) -> Result<RecommendResponse, RecommendError> {
        let (emotion, distribution) = self.detect(request);
        info!("Recommending for {emotion} (nostalgia: {})", request.nostalgia);

        let (spec, tracks) = rayon::join(
            || self.specs.generate(emotion, request.gender.as_deref(), request.age),
            || self.pool.fetch(request.nostalgia, request.age, self.pool_size),
        );

        let tracks = tracks.map_err(RecommendError::CatalogUnavailable)?;
        if tracks.is_empty() {
            return Err(RecommendError::NoCandidates {
                nostalgia: request.nostalgia,
            });
        }

        let ids: Vec<String> = tracks.iter().map(|t| t.id.clone()).collect();
        let features = self.pool.fetch_features(&ids);

        let empathy = filter(&tracks, &features, emotion, Category::Empathy);
        let relief = filter(&tracks, &features, emotion, Category::Relief);
        debug!("{} empathy / {} relief candidates", empathy.len(), relief.len());

        let candidates = cap_candidates(empathy, relief);
        let scored = self.scoring.score_all(&spec, &candidates);

        let mut recommendations = select(&scored);
        self.links.attach(&mut recommendations);
        info!("Selected {} recommendations", recommendations.len());

        Ok(RecommendResponse {
            emotion,
            nostalgia: request.nostalgia,
            distribution,
            spec,
            recommendations,
        })
    }
}
