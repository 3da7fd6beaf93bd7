//! Emotion-matched music suggestions.
//!
//! A detected emotion becomes three tracks: two **empathy** picks that match
//! the feeling and one **relief** pick that eases it.
//!
//! Core modules:
//! - [`emotion`] - Emotion labels, distributions, normalization and fusion
//! - [`calibration`] - Trait/gender temperature scaling
//! - [`emotion_spec`] - Per-listener recommendation spec (oracle or fallback)
//! - [`catalog`] - Candidate pool, nostalgia window, offline catalog
//! - [`filter`] - Audio-feature heuristic rules
//! - [`scoring`] - Lyrics-aware semantic scoring in bounded batches
//! - [`selector`] - Final 2 + 1 selection
//! - [`links`] - Playable link enrichment
//! - [`pipeline`] - [`pipeline::Recommender`], the whole flow end to end
//!
//! ### Supporting Modules
//!
//! - [`config`] - Data directory and runtime [`config::Settings`]
//! - [`db`] - Recommendation history and push logs (SQLite)
//! - [`oracle`] - OpenAI-compatible chat client
//! - [`spotify`] - Spotify catalog and audio features
//! - [`lyrics`] - Musixmatch and Genius lyrics sources
//! - [`token`] - Expiring access-token cache
//! - [`track`] - Track, feature and recommendation types
//! - [`cli`] - Command-line interface definitions with clap integration
//! - [`completion`] - Shell completion generation
//!
//! ## Quick Start Example
//!
//! ```no_run
//! use moodtune::config::Settings;
//! use moodtune::pipeline::{RecommendRequest, Recommender};
//! use serde_json::json;
//! use std::path::PathBuf;
//!
//! let settings = Settings {
//!     catalog_path: Some(PathBuf::from("tracks.json")),
//!     ..Settings::default()
//! };
//! let recommender = Recommender::from_settings(&settings)?;
//!
//! let request = RecommendRequest {
//!     face_dist: serde_json::from_value(json!({"sad": 0.7, "neutral": 0.3}))?,
//!     gender: Some("female".to_string()),
//!     trait_name: Some("introvert".to_string()),
//!     ..RecommendRequest::default()
//! };
//!
//! let response = recommender.recommend(&request)?;
//! for rec in &response.recommendations {
//!     println!("[{}] {} - {} {}", rec.category, rec.artist, rec.title, rec.play_url);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```
//!
//! ## Error Handling
//!
//! Collaborators and storage return `anyhow::Result`. Almost every
//! collaborator failure is absorbed where it happens (fallback spec, neutral
//! scores, search links). Only the catalog is fatal:
//! [`pipeline::RecommendError`] tells an unreachable catalog apart from an
//! empty one.

pub mod calibration;
pub mod catalog;
pub mod cli;
pub mod completion;
pub mod config;
pub mod db;
pub mod emotion;
pub mod emotion_spec;
pub mod filter;
pub mod links;
pub mod lyrics;
pub mod oracle;
pub mod pipeline;
pub mod scoring;
pub mod selector;
pub mod spotify;
pub mod token;
pub mod track;
