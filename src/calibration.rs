//! # Temperature Calibration
//!
//! Introverts and extroverts show emotion differently on camera, and the
//! detector was never tuned for that. A calibration table maps
//! `(trait, gender)` to a temperature `τ` that is applied to the normalized
//! distribution before the dominant emotion is picked.
//!
//! ## Power scaling, not softmax
//!
//! The detector hands us probabilities, not logits. Classic softmax would
//! compute `exp(logit / τ)`; here each probability is raised to `1/τ` and the
//! result renormalized:
//!
//! ```text
//! p'(e) = p(e)^(1/τ) / Σ p(k)^(1/τ)
//! ```
//!
//! This is equivalent to softmax over `ln p` at temperature `τ`, so zero
//! weights stay zero and `τ = 1` is the identity. `τ < 1` sharpens the
//! distribution toward its peak, `τ > 1` flattens it toward uniform.
//!
//! ## Table format
//!
//! ```json
//! { "introvert": { "male": 0.8, "female": 0.7 },
//!   "extrovert": { "male": 1.3, "female": 1.2 } }
//! ```

use crate::emotion::EmotionDistribution;
use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Trait used when the caller does not pick one.
pub const DEFAULT_TRAIT: &str = "neutral";
/// Gender used when the caller does not supply one.
pub const DEFAULT_GENDER: &str = "male";

/// `(trait, gender) -> τ`, keys stored lowercase.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CalibrationTable {
    temperatures: HashMap<String, HashMap<String, f64>>,
}

impl CalibrationTable {
    /// Parse a table from its JSON text. Non-positive or non-finite
    /// temperatures are dropped so lookups fall back to `1.0` for them.
    pub fn from_json(text: &str) -> Result<Self> {
        let parsed: HashMap<String, HashMap<String, f64>> =
            serde_json::from_str(text).context("Calibration table is not a trait -> gender -> temperature map")?;

        let mut temperatures: HashMap<String, HashMap<String, f64>> = HashMap::new();
        for (trait_name, genders) in parsed {
            let row = temperatures.entry(trait_name.to_lowercase()).or_default();
            for (gender, tau) in genders {
                if tau.is_finite() && tau > 0.0 {
                    row.insert(gender.to_lowercase(), tau);
                } else {
                    warn!("Ignoring invalid temperature {tau} for {trait_name}/{gender}");
                }
            }
        }

        Ok(Self { temperatures })
    }

    /// Read a table from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read calibration table at {}", path.display()))?;
        Self::from_json(&text)
            .with_context(|| format!("Failed to parse calibration table at {}", path.display()))
    }

    #[must_use]
    pub fn get(&self, trait_name: &str, gender: &str) -> Option<f64> {
        self.temperatures
            .get(&trait_name.to_lowercase())
            .and_then(|row| row.get(&gender.to_lowercase()))
            .copied()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.temperatures.values().all(HashMap::is_empty)
    }
}

/// Process-wide, read-only holder for the calibration table.
#[derive(Debug, Clone, Default)]
pub struct Calibrator {
    table: Option<CalibrationTable>,
}

impl Calibrator {
    #[must_use]
    pub fn new(table: Option<CalibrationTable>) -> Self {
        Self { table }
    }

    /// Load the table once at startup. A missing or broken file is not an
    /// error: every lookup then answers `1.0`.
    #[must_use]
    pub fn from_path(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            debug!("No calibration table configured");
            return Self::default();
        };

        if !path.exists() {
            warn!("Calibration table {} not found, using τ = 1.0", path.display());
            return Self::default();
        }

        match CalibrationTable::load(path) {
            Ok(table) => {
                info!("Loaded calibration table from {}", path.display());
                Self::new(Some(table))
            }
            Err(e) => {
                warn!("Could not load calibration table: {e:#}");
                Self::default()
            }
        }
    }

    /// Temperature for `(trait, gender)`; defaults apply to missing labels,
    /// and `1.0` is returned for anything not in the table.
    #[must_use]
    pub fn temperature(&self, trait_name: Option<&str>, gender: Option<&str>) -> f64 {
        let Some(table) = &self.table else {
            return 1.0;
        };

        let trait_name = trait_name.filter(|t| !t.trim().is_empty()).unwrap_or(DEFAULT_TRAIT);
        let gender = gender.filter(|g| !g.trim().is_empty()).unwrap_or(DEFAULT_GENDER);

        table.get(trait_name.trim(), gender.trim()).unwrap_or(1.0)
    }
}

/// Apply temperature `tau` to a distribution.
///
/// `None` and `τ = 1.0` pass through untouched, as does any `τ` that is not a
/// positive finite number.
#[must_use]
pub fn calibrate(dist: Option<EmotionDistribution>, tau: f64) -> Option<EmotionDistribution> {
    let dist = dist?;
    if tau == 1.0 || !tau.is_finite() || tau <= 0.0 {
        return Some(dist);
    }

    let exponent = 1.0 / tau;
    let mut scaled = [0.0; 7];
    for (slot, weight) in scaled.iter_mut().zip(dist.weights()) {
        *slot = weight.powf(exponent);
    }

    let sum: f64 = scaled.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        warn!("Calibration with τ = {tau} degenerated (sum = {sum}), keeping distribution");
        return Some(dist);
    }

    for w in &mut scaled {
        *w /= sum;
    }
    Some(EmotionDistribution::from_weights(scaled))
}
