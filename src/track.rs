//! Track, audio-feature and recommendation types shared by every stage.

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A track as returned by the catalog. Read-only inside the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Catalog id, unique within a pool.
    pub id: String,
    pub title: String,
    pub artist: String,
    /// Link to the track on the catalog's own player.
    #[serde(default)]
    pub external_url: String,
    /// Release year, when the catalog knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

/// Numeric audio descriptors for one track, in the source's native ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioFeatures {
    pub valence: f64,
    pub energy: f64,
    pub tempo: f64,
    pub acousticness: f64,
    pub danceability: f64,
}

/// Feature lookups keyed by track id. Missing ids simply have no features.
pub type FeatureMap = HashMap<String, AudioFeatures>;

/// The named features a filter rule can constrain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    Valence,
    Energy,
    Tempo,
    Acousticness,
    Danceability,
}

impl AudioFeatures {
    #[must_use]
    pub const fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Valence => self.valence,
            Feature::Energy => self.energy,
            Feature::Tempo => self.tempo,
            Feature::Acousticness => self.acousticness,
            Feature::Danceability => self.danceability,
        }
    }
}

/// Why a track is recommended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    /// Mirrors the current feeling.
    Empathy,
    /// Pulls the listener out of it.
    Relief,
}

impl Category {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Category::Empathy => "empathy",
            Category::Relief => "relief",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "empathy" | "공감" => Ok(Category::Empathy),
            "relief" | "해소" => Ok(Category::Relief),
            other => Err(anyhow!("Unknown track category '{other}'")),
        }
    }
}

/// Oracle sub-scores. Not required to be normalized.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Scores {
    #[serde(default)]
    pub empathy: f64,
    #[serde(default)]
    pub relief: f64,
    #[serde(default)]
    pub overall: f64,
}

impl Scores {
    /// Scores used when a track could not be judged.
    pub const NEUTRAL: Scores = Scores {
        empathy: 0.5,
        relief: 0.5,
        overall: 0.5,
    };
}

/// A track after semantic scoring.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredTrack {
    pub track: Track,
    pub category: Category,
    pub scores: Scores,
    pub rationale: String,
}

/// One entry of the final answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub title: String,
    pub artist: String,
    /// Catalog link, copied from the track.
    #[serde(default)]
    pub external_url: String,
    /// Playable link attached by the link enricher.
    #[serde(default)]
    pub play_url: String,
    pub category: Category,
    #[serde(default)]
    pub rationale: String,
    /// Id of the source track in the catalog.
    pub track_id: String,
}

impl Recommendation {
    /// Build a recommendation from a scored track, tagged with `category`.
    #[must_use]
    pub fn from_scored(scored: &ScoredTrack, category: Category) -> Self {
        Self {
            title: scored.track.title.clone(),
            artist: scored.track.artist.clone(),
            external_url: scored.track.external_url.clone(),
            play_url: String::new(),
            category,
            rationale: scored.rationale.clone(),
            track_id: scored.track.id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parsing_accepts_aliases() {
        assert_eq!("Empathy".parse::<Category>().unwrap(), Category::Empathy);
        assert_eq!(" relief ".parse::<Category>().unwrap(), Category::Relief);
        assert_eq!("공감".parse::<Category>().unwrap(), Category::Empathy);
        assert_eq!("해소".parse::<Category>().unwrap(), Category::Relief);
        assert!("joy".parse::<Category>().is_err());
    }

    #[test]
    fn test_track_json_defaults() {
        let track: Track = serde_json::from_str(r#"{"id": "t1", "title": "Rain", "artist": "Someone"}"#).unwrap();
        assert_eq!(track.external_url, "");
        assert_eq!(track.year, None);
    }

    #[test]
    fn test_recommendation_uses_camel_case() {
        let scored = ScoredTrack {
            track: Track {
                id: "t1".to_string(),
                title: "Rain".to_string(),
                artist: "Someone".to_string(),
                external_url: "https://open.spotify.com/track/t1".to_string(),
                year: None,
            },
            category: Category::Empathy,
            scores: Scores::NEUTRAL,
            rationale: String::new(),
        };
        let rec = Recommendation::from_scored(&scored, Category::Relief);
        let value = serde_json::to_value(&rec).unwrap();
        assert_eq!(value["trackId"], "t1");
        assert_eq!(value["category"], "relief");
        assert_eq!(value["externalUrl"], "https://open.spotify.com/track/t1");
    }
}
