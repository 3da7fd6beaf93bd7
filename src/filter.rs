//! # Heuristic Audio Filter
//!
//! First, cheap pass over the candidate pool: for each detected emotion,
//! what should an *empathy* track sound like, and what should a *relief*
//! track sound like? Each answer is a conjunction of bounds over audio
//! features, stored in [`RULES`] and evaluated by one interpreter.
//!
//! | emotion   | empathy                                  | relief                          |
//! |-----------|------------------------------------------|---------------------------------|
//! | neutral   | 0.4 ≤ energy ≤ 0.6, 0.4 ≤ valence ≤ 0.6  | valence > 0.7, energy > 0.6     |
//! | happy     | valence > 0.7, energy > 0.6              | energy < 0.5, valence > 0.5     |
//! | sad       | valence < 0.35, energy < 0.6             | valence > 0.6, energy > 0.5     |
//! | angry     | energy > 0.7, valence < 0.4              | energy < 0.5, valence > 0.6     |
//! | fearful   | acousticness > 0.6, energy < 0.5         | valence > 0.6, danceability > 0.5 |
//! | disgusted | valence < 0.4, energy < 0.6              | valence > 0.7, energy > 0.5     |
//! | surprised | valence > 0.6, energy > 0.6, dance > 0.5 | valence > 0.6, energy < 0.5     |
//!
//! Tracks without features never pass a rule. If fewer than
//! [`MIN_FILTERED`] tracks pass, the rule is abandoned and the whole pool is
//! returned for that category so scoring is never starved.

use crate::emotion::Emotion;
use crate::track::{AudioFeatures, Category, Feature, FeatureMap, Track};
use log::debug;

/// Fewer survivors than this and the filter is discarded.
pub const MIN_FILTERED: usize = 2;

/// One inequality on a named feature.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Above(Feature, f64),
    Below(Feature, f64),
    AtLeast(Feature, f64),
    AtMost(Feature, f64),
}

impl Bound {
    #[must_use]
    pub fn holds(&self, features: &AudioFeatures) -> bool {
        match *self {
            Bound::Above(f, v) => features.get(f) > v,
            Bound::Below(f, v) => features.get(f) < v,
            Bound::AtLeast(f, v) => features.get(f) >= v,
            Bound::AtMost(f, v) => features.get(f) <= v,
        }
    }
}

/// A conjunction of bounds for one `(emotion, category)` pair.
#[derive(Debug, Clone, Copy)]
pub struct Rule {
    pub emotion: Emotion,
    pub category: Category,
    pub bounds: &'static [Bound],
}

impl Rule {
    #[must_use]
    pub fn matches(&self, features: &AudioFeatures) -> bool {
        self.bounds.iter().all(|b| b.holds(features))
    }
}

use Bound::{Above, AtLeast, AtMost, Below};
use Feature::{Acousticness, Danceability, Energy, Valence};

/// The full 7 x 2 rule set.
pub const RULES: [Rule; 14] = [
    Rule {
        emotion: Emotion::Neutral,
        category: Category::Empathy,
        bounds: &[AtLeast(Energy, 0.4), AtMost(Energy, 0.6), AtLeast(Valence, 0.4), AtMost(Valence, 0.6)],
    },
    Rule {
        emotion: Emotion::Neutral,
        category: Category::Relief,
        bounds: &[Above(Valence, 0.7), Above(Energy, 0.6)],
    },
    Rule {
        emotion: Emotion::Happy,
        category: Category::Empathy,
        bounds: &[Above(Valence, 0.7), Above(Energy, 0.6)],
    },
    Rule {
        emotion: Emotion::Happy,
        category: Category::Relief,
        bounds: &[Below(Energy, 0.5), Above(Valence, 0.5)],
    },
    Rule {
        emotion: Emotion::Sad,
        category: Category::Empathy,
        bounds: &[Below(Valence, 0.35), Below(Energy, 0.6)],
    },
    Rule {
        emotion: Emotion::Sad,
        category: Category::Relief,
        bounds: &[Above(Valence, 0.6), Above(Energy, 0.5)],
    },
    Rule {
        emotion: Emotion::Angry,
        category: Category::Empathy,
        bounds: &[Above(Energy, 0.7), Below(Valence, 0.4)],
    },
    Rule {
        emotion: Emotion::Angry,
        category: Category::Relief,
        bounds: &[Below(Energy, 0.5), Above(Valence, 0.6)],
    },
    Rule {
        emotion: Emotion::Fearful,
        category: Category::Empathy,
        bounds: &[Above(Acousticness, 0.6), Below(Energy, 0.5)],
    },
    Rule {
        emotion: Emotion::Fearful,
        category: Category::Relief,
        bounds: &[Above(Valence, 0.6), Above(Danceability, 0.5)],
    },
    Rule {
        emotion: Emotion::Disgusted,
        category: Category::Empathy,
        bounds: &[Below(Valence, 0.4), Below(Energy, 0.6)],
    },
    Rule {
        emotion: Emotion::Disgusted,
        category: Category::Relief,
        bounds: &[Above(Valence, 0.7), Above(Energy, 0.5)],
    },
    Rule {
        emotion: Emotion::Surprised,
        category: Category::Empathy,
        bounds: &[Above(Valence, 0.6), Above(Energy, 0.6), Above(Danceability, 0.5)],
    },
    Rule {
        emotion: Emotion::Surprised,
        category: Category::Relief,
        bounds: &[Above(Valence, 0.6), Below(Energy, 0.5)],
    },
];

/// Look up the rule for `(emotion, category)`.
#[must_use]
pub fn rule_for(emotion: Emotion, category: Category) -> &'static Rule {
    RULES
        .iter()
        .find(|r| r.emotion == emotion && r.category == category)
        .unwrap_or_else(|| unreachable!("rule table covers every emotion and category"))
}

/// Keep the tracks whose features satisfy `rule`, falling back to the whole
/// pool when fewer than [`MIN_FILTERED`] survive.
#[must_use]
pub fn apply_rule(rule: &Rule, tracks: &[Track], features: &FeatureMap) -> Vec<Track> {
    let kept: Vec<Track> = tracks
        .iter()
        .filter(|t| features.get(&t.id).is_some_and(|f| rule.matches(f)))
        .cloned()
        .collect();

    if kept.len() < MIN_FILTERED {
        debug!(
            "{}/{} filter kept {} of {} tracks, using the unfiltered pool",
            rule.emotion,
            rule.category,
            kept.len(),
            tracks.len()
        );
        return tracks.to_vec();
    }

    debug!("{}/{} filter kept {} of {} tracks", rule.emotion, rule.category, kept.len(), tracks.len());
    kept
}

/// Candidates for `category` given the detected `emotion`.
#[must_use]
pub fn filter(tracks: &[Track], features: &FeatureMap, emotion: Emotion, category: Category) -> Vec<Track> {
    apply_rule(rule_for(emotion, category), tracks, features)
}
