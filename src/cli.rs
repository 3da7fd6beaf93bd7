//! # Command-Line Interface Module
//!
//! Defines the `moodtune` command line with Clap derive macros.
//!
//! ## Commands
//!
//! - `recommend`: Run the full pipeline for a detected emotion
//! - `spec`: Print the emotion spec the oracle (or fallback) produces
//! - `window`: Print the nostalgia window for an age
//! - `history`: Page through saved recommendation sets
//! - `push`: Record that an item of a saved set was sent to a player
//! - `completion`: Generate shell completion scripts
//!
//! ## Examples
//!
//! ```bash
//! moodtune recommend --face sad=0.8 --face neutral=0.2 --gender female --trait introvert
//! moodtune recommend --emotion happy --age 34 --nostalgia --catalog tracks.json --save
//! moodtune history --page 2
//! moodtune push 12 --index 1
//! ```
//!
//! Every credential flag can also be given through the environment variable
//! named in its help text.

use crate::config::Settings;
use crate::emotion::RawEmotionScores;
use crate::oracle::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use std::path::PathBuf;

/// Shell types supported for completion generation
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bash shell
    Bash,
    /// Zsh shell
    Zsh,
    /// Fish shell
    Fish,
    /// PowerShell
    PowerShell,
    /// Elvish shell
    Elvish,
}

/// Main application arguments structure.
///
/// Collaborator credentials are global so they can follow any subcommand.
#[derive(Parser)]
#[command(name = "moodtune")]
#[command(about = "Moodtune: emotion-matched music suggestions (empathy & relief)")]
#[command(version)]
pub struct Args {
    #[command(flatten)]
    pub credentials: Credentials,

    /// The subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Keys and paths for the external collaborators.
#[derive(clap::Args, Debug, Clone)]
pub struct Credentials {
    /// API key for the chat oracle; without it the fixed spec and keyword scorer are used
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub openai_base_url: String,

    /// Oracle model name
    #[arg(long, env = "OPENAI_MODEL", default_value = DEFAULT_MODEL, global = true)]
    pub openai_model: String,

    /// Spotify client id (client-credentials flow)
    #[arg(long, env = "SPOTIFY_CLIENT_ID", hide_env_values = true, global = true)]
    pub spotify_client_id: Option<String>,

    /// Spotify client secret
    #[arg(long, env = "SPOTIFY_CLIENT_SECRET", hide_env_values = true, global = true)]
    pub spotify_client_secret: Option<String>,

    /// Genius API token for lyrics
    #[arg(long, env = "GENIUS_API_KEY", hide_env_values = true, global = true)]
    pub genius_api_key: Option<String>,

    /// Musixmatch API key for lyrics
    #[arg(long, env = "MUSIXMATCH_API_KEY", hide_env_values = true, global = true)]
    pub musixmatch_api_key: Option<String>,

    /// YouTube Data API key; without it play links are search URLs
    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true, global = true)]
    pub youtube_api_key: Option<String>,

    /// Calibration table (trait -> gender -> temperature JSON)
    #[arg(long, env = "MOODTUNE_CALIBRATION", value_hint = clap::ValueHint::FilePath, global = true)]
    pub calibration: Option<PathBuf>,

    /// History database location
    #[arg(long, env = "MOODTUNE_DB", value_hint = clap::ValueHint::FilePath, global = true)]
    pub db: Option<PathBuf>,
}

impl Credentials {
    /// Runtime settings, with `catalog` as the offline catalog if given.
    #[must_use]
    pub fn settings(&self, catalog: Option<PathBuf>) -> Settings {
        Settings {
            openai_api_key: self.openai_api_key.clone(),
            openai_base_url: self.openai_base_url.clone(),
            openai_model: self.openai_model.clone(),
            spotify_client_id: self.spotify_client_id.clone(),
            spotify_client_secret: self.spotify_client_secret.clone(),
            genius_api_key: self.genius_api_key.clone(),
            musixmatch_api_key: self.musixmatch_api_key.clone(),
            youtube_api_key: self.youtube_api_key.clone(),
            calibration_path: self.calibration.clone(),
            catalog_path: catalog,
            db_path: self.db.clone(),
        }
        .normalized()
    }
}

/// Enumeration of all available subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Recommend two empathy tracks and one relief track
    ///
    /// The emotion comes from `--face` / `--face-json` when given (normalized
    /// and calibrated by trait and gender), otherwise from `--emotion`.
    Recommend {
        /// Emotion label to use when no face distribution is given
        #[arg(long, short)]
        emotion: Option<String>,

        /// Listener age; required for nostalgia mode
        #[arg(long)]
        age: Option<u32>,

        /// Listener gender (used for calibration and the spec)
        #[arg(long)]
        gender: Option<String>,

        /// Personality trait used for calibration (e.g. introvert, extrovert)
        #[arg(long = "trait")]
        trait_name: Option<String>,

        /// One detector score as label=weight; repeat for each label
        #[arg(long = "face", value_parser = parse_face_pair)]
        face: Vec<(String, f64)>,

        /// Detector scores as a JSON object, e.g. '{"sad":0.8,"neutral":0.2}'
        #[arg(long)]
        face_json: Option<String>,

        /// Search tracks from the listener's teenage years
        #[arg(long)]
        nostalgia: bool,

        /// Offline catalog JSON file instead of Spotify
        #[arg(long, value_hint = clap::ValueHint::FilePath)]
        catalog: Option<PathBuf>,

        /// Save the result to the history database
        #[arg(long)]
        save: bool,

        /// Print the full response as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the emotion spec for a listener
    Spec {
        /// Emotion label
        emotion: String,

        #[arg(long)]
        gender: Option<String>,

        #[arg(long)]
        age: Option<u32>,
    },
    /// Print the nostalgia window (teenage years) for an age
    Window {
        /// Age in years
        age: u32,
    },
    /// Show saved recommendation sets, newest first
    History {
        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Entries per page (1-50, default 20)
        #[arg(long)]
        page_size: Option<usize>,

        /// Print the page as JSON
        #[arg(long)]
        json: bool,
    },
    /// Record a push of one saved recommendation and print the play payload
    Push {
        /// Id of the saved recommendation set
        set: i64,

        /// Index of the item within the set
        #[arg(long, default_value = "0")]
        index: usize,

        /// Broadcast channel name
        #[arg(long)]
        channel: Option<String>,

        /// Message shown alongside the track
        #[arg(long)]
        message: Option<String>,
    },
    /// Generate shell completions
    ///
    /// Usage: moodtune completion bash > ~/.local/share/bash-completion/completions/moodtune
    Completion {
        /// Shell to generate completions for
        shell: Shell,
    },
    /// List emotion labels for completion (hidden command)
    #[command(hide = true)]
    CompleteEmotions,
}

/// Parse one `label=weight` pair.
pub fn parse_face_pair(s: &str) -> Result<(String, f64), String> {
    let (label, weight) = s
        .split_once('=')
        .ok_or_else(|| format!("expected label=weight, got '{s}'"))?;
    let weight: f64 = weight
        .trim()
        .parse()
        .map_err(|_| format!("'{weight}' is not a number"))?;
    Ok((label.trim().to_lowercase(), weight))
}

/// Merge `--face-json` and `--face` pairs into raw detector scores. Pairs
/// override keys from the JSON object. `None` when neither was given.
pub fn face_scores(pairs: &[(String, f64)], json: Option<&str>) -> Result<Option<RawEmotionScores>> {
    let mut scores = match json {
        Some(text) => Some(
            serde_json::from_str::<RawEmotionScores>(text).context("--face-json must be a JSON object of weights")?,
        ),
        None => None,
    };

    if !pairs.is_empty() {
        let map = scores.get_or_insert_with(RawEmotionScores::new);
        for (label, weight) in pairs {
            map.insert(label.clone(), Value::from(*weight));
        }
    }

    Ok(scores)
}
