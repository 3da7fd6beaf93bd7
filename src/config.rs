//! # Configuration Module
//!
//! Data directory layout and the runtime [`Settings`] every collaborator is
//! built from.
//!
//! ## Data Storage
//!
//! Moodtune keeps its files in the platform-standard data directory:
//! - Linux: `~/.local/share/moodtune/`
//! - macOS: `~/Library/Application Support/moodtune/`
//! - Windows: `%APPDATA%\moodtune\`
//!
//! Two files live there: `moodtune.db` (saved recommendation sets and push
//! logs) and, optionally, `calibration-temp.json` (the trait/gender
//! temperature table).
//!
//! ## Credentials
//!
//! Credentials are never read from disk. The CLI takes them as flags backed
//! by environment variables (`OPENAI_API_KEY`, `SPOTIFY_CLIENT_ID`, ...) and
//! hands them over as a [`Settings`]. An empty value counts as unset.

use crate::oracle::{ChatClient, DEFAULT_BASE_URL, DEFAULT_MODEL};
use anyhow::{Context, Result};
use path_absolutize::Absolutize;
use std::fs;
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "moodtune";
pub const DB_FILE: &str = "moodtune.db";
pub const CALIBRATION_FILE: &str = "calibration-temp.json";

/// Returns the moodtune data directory, creating it if needed.
///
/// # Errors
///
/// Fails when the platform has no data directory or it cannot be created.
///
/// # Examples
///
/// ```no_run
/// use moodtune::config::get_data_dir;
///
/// let dir = get_data_dir()?;
/// println!("Data lives in {}", dir.display());
/// # Ok::<(), anyhow::Error>(())
/// ```
pub fn get_data_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| {
        anyhow::anyhow!(
            "Could not determine system data directory. Please ensure your platform supports standard data directories."
        )
    })?;

    let app_dir = data_dir.join(APP_DIR);
    fs::create_dir_all(&app_dir).with_context(|| {
        format!(
            "Failed to create Moodtune data directory at {}. Please check file permissions.",
            app_dir.display()
        )
    })?;

    Ok(app_dir)
}

/// Default location of the history database.
pub fn get_db_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(DB_FILE))
}

/// Default location of the calibration table.
pub fn get_calibration_path() -> Result<PathBuf> {
    Ok(get_data_dir()?.join(CALIBRATION_FILE))
}

/// Make a user-supplied path absolute against the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(path
        .absolutize()
        .with_context(|| format!("Failed to resolve path {}", path.display()))?
        .into_owned())
}

/// Everything needed to wire up the pipeline.
#[derive(Debug, Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_model: String,
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,
    pub genius_api_key: Option<String>,
    pub musixmatch_api_key: Option<String>,
    pub youtube_api_key: Option<String>,
    /// Explicit calibration table; the data directory copy is used otherwise.
    pub calibration_path: Option<PathBuf>,
    /// Offline catalog file. Takes precedence over Spotify credentials.
    pub catalog_path: Option<PathBuf>,
    /// Explicit history database.
    pub db_path: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_BASE_URL.to_string(),
            openai_model: DEFAULT_MODEL.to_string(),
            spotify_client_id: None,
            spotify_client_secret: None,
            genius_api_key: None,
            musixmatch_api_key: None,
            youtube_api_key: None,
            calibration_path: None,
            catalog_path: None,
            db_path: None,
        }
    }
}

/// `Some` only for a non-blank value.
#[must_use]
pub fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl Settings {
    /// Drop blank credentials so `FOO=""` behaves like an unset variable.
    #[must_use]
    pub fn normalized(self) -> Self {
        Self {
            openai_api_key: non_empty(self.openai_api_key),
            spotify_client_id: non_empty(self.spotify_client_id),
            spotify_client_secret: non_empty(self.spotify_client_secret),
            genius_api_key: non_empty(self.genius_api_key),
            musixmatch_api_key: non_empty(self.musixmatch_api_key),
            youtube_api_key: non_empty(self.youtube_api_key),
            ..self
        }
    }

    /// Both Spotify credentials, if configured.
    #[must_use]
    pub fn spotify_credentials(&self) -> Option<(&str, &str)> {
        Some((self.spotify_client_id.as_deref()?, self.spotify_client_secret.as_deref()?))
    }

    /// Chat oracle client, when an API key is configured.
    pub fn oracle_client(&self) -> Result<Option<ChatClient>> {
        self.openai_api_key
            .as_deref()
            .map(|key| ChatClient::new(&self.openai_base_url, &self.openai_model, key))
            .transpose()
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.db_path {
            Some(path) => absolute(path),
            None => get_db_path(),
        }
    }

    /// Calibration table to load. A missing default file is not an error;
    /// the calibrator falls back to `τ = 1`.
    #[must_use]
    pub fn calibration_path(&self) -> Option<PathBuf> {
        match &self.calibration_path {
            Some(path) => absolute(path).ok(),
            None => get_calibration_path().ok().filter(|p| p.exists()),
        }
    }

    pub fn catalog_path(&self) -> Result<Option<PathBuf>> {
        self.catalog_path.as_deref().map(absolute).transpose()
    }
}
