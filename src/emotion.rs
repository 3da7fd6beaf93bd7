//! # Emotion Distributions
//!
//! The detector reports a score per facial expression. This module turns that
//! loose map into a proper probability distribution over the seven labels
//! Moodtune understands, and picks the dominant label out of it.
//!
//! The label order is fixed and doubles as the tie-breaker everywhere:
//! `neutral, happy, sad, angry, fearful, disgusted, surprised`.

use log::{debug, trace};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Raw detector output: label -> score. Values may be numbers, numeric
/// strings or garbage.
pub type RawEmotionScores = Map<String, Value>;

/// The closed set of emotion labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Neutral,
    Happy,
    Sad,
    Angry,
    Fearful,
    Disgusted,
    Surprised,
}

impl Emotion {
    /// All labels in enumeration (tie-break) order.
    pub const ALL: [Emotion; 7] = [
        Emotion::Neutral,
        Emotion::Happy,
        Emotion::Sad,
        Emotion::Angry,
        Emotion::Fearful,
        Emotion::Disgusted,
        Emotion::Surprised,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Happy => "happy",
            Emotion::Sad => "sad",
            Emotion::Angry => "angry",
            Emotion::Fearful => "fearful",
            Emotion::Disgusted => "disgusted",
            Emotion::Surprised => "surprised",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Emotion {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Emotion::ALL
            .into_iter()
            .find(|e| e.as_str() == wanted)
            .ok_or_else(|| anyhow::anyhow!("Unknown emotion label '{s}'"))
    }
}

/// Probability distribution over [`Emotion::ALL`].
///
/// Weights are non-negative and sum to 1.0. The only ways to build one are
/// [`normalize`] and the calibration step, both of which keep that invariant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EmotionDistribution {
    weights: [f64; 7],
}

impl EmotionDistribution {
    /// Every label weighted `1/7`.
    #[must_use]
    pub fn uniform() -> Self {
        Self {
            weights: [1.0 / Emotion::ALL.len() as f64; 7],
        }
    }

    /// Builds a distribution from already-normalized weights.
    pub(crate) fn from_weights(weights: [f64; 7]) -> Self {
        Self { weights }
    }

    #[must_use]
    pub fn weight(&self, emotion: Emotion) -> f64 {
        self.weights[emotion.index()]
    }

    #[must_use]
    pub fn weights(&self) -> &[f64; 7] {
        &self.weights
    }

    /// Iterate `(label, weight)` pairs in enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (Emotion, f64)> + '_ {
        Emotion::ALL.iter().map(move |&e| (e, self.weights[e.index()]))
    }

    /// Label with the largest weight; ties go to the earliest label.
    #[must_use]
    pub fn dominant(&self) -> Emotion {
        let mut best = Emotion::Neutral;
        let mut best_weight = f64::NEG_INFINITY;
        for (emotion, weight) in self.iter() {
            // Strict comparison keeps the first label on ties.
            if weight > best_weight {
                best = emotion;
                best_weight = weight;
            }
        }
        best
    }
}

impl Serialize for EmotionDistribution {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.weights.len()))?;
        for (emotion, weight) in self.iter() {
            map.serialize_entry(emotion.as_str(), &weight)?;
        }
        map.end()
    }
}

/// Coerce a single raw score to a usable weight.
fn coerce_weight(value: Option<&Value>) -> f64 {
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };

    match number {
        Some(v) if v.is_finite() && v > 0.0 => v,
        _ => 0.0,
    }
}

/// Normalize raw detector scores into an [`EmotionDistribution`].
///
/// Labels outside the fixed set are ignored, missing or non-numeric values
/// count as zero. When nothing positive remains (including `None` and `{}`)
/// the uniform distribution is returned. Never fails.
#[must_use]
pub fn normalize(raw: Option<&RawEmotionScores>) -> EmotionDistribution {
    let Some(raw) = raw else {
        trace!("No raw emotion scores, using uniform distribution");
        return EmotionDistribution::uniform();
    };

    let mut weights = [0.0; 7];
    for emotion in Emotion::ALL {
        weights[emotion.index()] = coerce_weight(raw.get(emotion.as_str()));
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        debug!("Raw emotion scores sum to {total}, falling back to uniform");
        return EmotionDistribution::uniform();
    }

    for w in &mut weights {
        *w /= total;
    }
    EmotionDistribution::from_weights(weights)
}

/// Pick the final emotion label.
///
/// With a distribution, the dominant label wins. Without one, `fallback` is
/// used when it names a known label, otherwise `neutral`.
#[must_use]
pub fn fuse(dist: Option<&EmotionDistribution>, fallback: &str) -> Emotion {
    match dist {
        Some(dist) => dist.dominant(),
        None => fallback.parse().unwrap_or(Emotion::Neutral),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(value: Value) -> RawEmotionScores {
        value.as_object().cloned().unwrap()
    }

    fn assert_sums_to_one(dist: &EmotionDistribution) {
        let sum: f64 = dist.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-9, "weights sum to {sum}");
        assert!(dist.weights().iter().all(|w| *w >= 0.0));
    }

    #[test]
    fn test_normalize_divides_by_total() {
        let dist = normalize(Some(&raw(json!({"sad": 3.0, "happy": 1.0}))));
        assert_sums_to_one(&dist);
        assert!((dist.weight(Emotion::Sad) - 0.75).abs() < 1e-9);
        assert!((dist.weight(Emotion::Happy) - 0.25).abs() < 1e-9);
        assert_eq!(dist.weight(Emotion::Angry), 0.0);
    }

    #[test]
    fn test_normalize_empty_and_absent_are_uniform() {
        let uniform = EmotionDistribution::uniform();
        assert_eq!(normalize(None), uniform);
        assert_eq!(normalize(Some(&RawEmotionScores::new())), uniform);
        for (_, w) in uniform.iter() {
            assert!((w - 1.0 / 7.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalize_ignores_garbage_and_negatives() {
        let dist = normalize(Some(&raw(json!({
            "sad": "0.5",
            "happy": "lots",
            "angry": -4.0,
            "fearful": null,
            "bored": 9.0,
            "neutral": 0.5
        }))));
        assert_sums_to_one(&dist);
        assert!((dist.weight(Emotion::Sad) - 0.5).abs() < 1e-9);
        assert!((dist.weight(Emotion::Neutral) - 0.5).abs() < 1e-9);
        assert_eq!(dist.weight(Emotion::Happy), 0.0);
        assert_eq!(dist.weight(Emotion::Angry), 0.0);
    }

    #[test]
    fn test_normalize_all_zero_is_uniform() {
        let dist = normalize(Some(&raw(json!({"sad": 0, "happy": 0.0}))));
        assert_eq!(dist, EmotionDistribution::uniform());
    }

    #[test]
    fn test_fuse_unique_maximum() {
        let dist = normalize(Some(&raw(json!({"sad": 0.8, "happy": 0.1, "neutral": 0.1}))));
        assert_eq!(fuse(Some(&dist), "happy"), Emotion::Sad);
    }

    #[test]
    fn test_fuse_ties_follow_enumeration_order() {
        assert_eq!(fuse(Some(&EmotionDistribution::uniform()), "sad"), Emotion::Neutral);

        let dist = normalize(Some(&raw(json!({"surprised": 0.5, "angry": 0.5}))));
        assert_eq!(fuse(Some(&dist), "neutral"), Emotion::Angry);
    }

    #[test]
    fn test_fuse_without_distribution_uses_fallback() {
        assert_eq!(fuse(None, "fearful"), Emotion::Fearful);
        assert_eq!(fuse(None, " Happy "), Emotion::Happy);
        assert_eq!(fuse(None, "melancholic"), Emotion::Neutral);
        assert_eq!(fuse(None, ""), Emotion::Neutral);
    }

    #[test]
    fn test_distribution_serializes_as_label_map() {
        let dist = normalize(Some(&raw(json!({"sad": 1.0}))));
        let value = serde_json::to_value(dist).unwrap();
        assert_eq!(value["sad"], json!(1.0));
        assert_eq!(value["neutral"], json!(0.0));
        assert_eq!(value.as_object().unwrap().len(), 7);
    }
}
