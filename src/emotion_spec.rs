//! # Emotion Specs
//!
//! An [`EmotionSpec`] describes what the listener should hear right now:
//! how much empathy vs. relief, which genres to lean on, target audio ranges
//! and words to look for or avoid in lyrics. It is advisory context for the
//! scoring oracle and never filters tracks by itself.
//!
//! Specs come from a [`SpecSource`]. Two sources exist:
//!
//! - [`FixedSpecSource`] always answers [`EmotionSpec::fallback`]
//! - [`OracleSpecSource`] asks the chat oracle
//!
//! [`SpecGenerator`] wraps whichever source was configured and fails closed:
//! any error becomes the fallback spec.

use crate::config::Settings;
use crate::emotion::Emotion;
use crate::oracle::ChatClient;
use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// How the recommendation should balance empathy and relief.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecMode {
    Mixed,
    Empathy,
    Relief,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpecWeights {
    pub empathy: f64,
    pub relief: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionSpec {
    pub mode: SpecMode,
    pub weights: SpecWeights,
    #[serde(default)]
    pub seed_genres: Vec<String>,
    /// Feature name -> `[min, max]`.
    #[serde(default)]
    pub audio_targets: BTreeMap<String, [f64; 2]>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub ban_keywords: Vec<String>,
}

impl EmotionSpec {
    /// The spec used whenever the oracle is absent or unusable.
    #[must_use]
    pub fn fallback() -> Self {
        Self {
            mode: SpecMode::Mixed,
            weights: SpecWeights {
                empathy: 0.6,
                relief: 0.4,
            },
            seed_genres: vec!["k-pop".to_string(), "indie".to_string()],
            audio_targets: BTreeMap::from([
                ("valence".to_string(), [0.4, 0.7]),
                ("energy".to_string(), [0.3, 0.6]),
            ]),
            keywords: Vec::new(),
            ban_keywords: Vec::new(),
        }
    }
}

/// Who the spec is for.
#[derive(Debug, Clone, Copy)]
pub struct Listener<'a> {
    pub emotion: Emotion,
    pub gender: Option<&'a str>,
    pub age: Option<u32>,
}

/// Capability that produces emotion specs.
pub trait SpecSource: Send + Sync {
    fn spec_for(&self, listener: &Listener<'_>) -> Result<EmotionSpec>;
}

/// Deterministic source used when no oracle is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSpecSource;

impl SpecSource for FixedSpecSource {
    fn spec_for(&self, _listener: &Listener<'_>) -> Result<EmotionSpec> {
        Ok(EmotionSpec::fallback())
    }
}

/// Source backed by the chat oracle.
#[derive(Debug, Clone)]
pub struct OracleSpecSource {
    client: ChatClient,
}

impl OracleSpecSource {
    const TEMPERATURE: f32 = 0.2;

    #[must_use]
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn prompt(listener: &Listener<'_>) -> String {
        let gender = listener.gender.unwrap_or("unknown");
        let age = listener
            .age
            .map_or_else(|| "unknown".to_string(), |a| a.to_string());

        format!(
            r#"You are a music psychologist.
Emotion: {emotion}, gender: {gender}, age: {age}
Describe what this listener should hear as an EmotionSpec JSON object.

Format:
{{
 "mode": "mixed",
 "weights": {{"empathy": 0.6, "relief": 0.4}},
 "seedGenres": ["k-pop", "indie"],
 "audioTargets": {{"valence": [0.4, 0.7], "energy": [0.3, 0.6]}},
 "keywords": ["comfort", "calm", "understanding"],
 "banKeywords": ["rage", "aggressive"]
}}
"mode" is one of "mixed", "empathy", "relief". Output only the JSON."#,
            emotion = listener.emotion,
        )
    }
}

impl SpecSource for OracleSpecSource {
    fn spec_for(&self, listener: &Listener<'_>) -> Result<EmotionSpec> {
        self.client
            .complete_json(&Self::prompt(listener), Self::TEMPERATURE)
            .with_context(|| format!("Oracle could not produce a spec for '{}'", listener.emotion))
    }
}

/// Fail-closed front for a [`SpecSource`].
#[derive(Clone)]
pub struct SpecGenerator {
    source: Arc<dyn SpecSource>,
}

impl SpecGenerator {
    #[must_use]
    pub fn new(source: Arc<dyn SpecSource>) -> Self {
        Self { source }
    }

    /// Generator that always answers the fallback spec.
    #[must_use]
    pub fn fixed() -> Self {
        Self::new(Arc::new(FixedSpecSource))
    }

    /// Ask `client` when there is one, otherwise answer the fallback spec.
    #[must_use]
    pub fn with_oracle(client: Option<ChatClient>) -> Self {
        match client {
            Some(client) => Self::new(Arc::new(OracleSpecSource::new(client))),
            None => Self::fixed(),
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        Ok(Self::with_oracle(settings.oracle_client()?))
    }

    /// Produce a spec; never fails.
    #[must_use]
    pub fn generate(&self, emotion: Emotion, gender: Option<&str>, age: Option<u32>) -> EmotionSpec {
        let listener = Listener { emotion, gender, age };
        match self.source.spec_for(&listener) {
            Ok(spec) => {
                debug!("Spec for {emotion}: mode {:?}, weights {:?}", spec.mode, spec.weights);
                spec
            }
            Err(e) => {
                warn!("Falling back to default spec: {e:#}");
                EmotionSpec::fallback()
            }
        }
    }
}
