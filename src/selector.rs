//! # Selection
//!
//! Turns the scored candidates into the final answer: two empathy tracks
//! followed by one relief track.
//!
//! 1. Rank everything by `overall`, highest first. The sort is stable, so
//!    ties keep the order the scorer produced.
//! 2. Drop repeated track ids, keeping the better-ranked entry. A track can
//!    be scored twice when both categories fell back to the whole pool.
//! 3. Take the best two empathy tracks and the best relief track.
//! 4. No relief track? Re-tag the best track not already chosen. If there is
//!    none, the last empathy pick moves to the relief slot instead.
//! 5. Missing empathy slots are filled from the best unchosen tracks.
//!
//! With at least three distinct tracks the result is always exactly
//! `[empathy, empathy, relief]`. With fewer, every track is returned once and
//! the relief slot is filled first. Nothing is ever invented.

use crate::track::{Category, Recommendation, ScoredTrack};
use log::debug;
use std::collections::HashSet;

pub const EMPATHY_SLOTS: usize = 2;
pub const RELIEF_SLOTS: usize = 1;

/// Scored tracks ordered by `overall` descending, one entry per track id.
#[must_use]
pub fn rank(scored: &[ScoredTrack]) -> Vec<&ScoredTrack> {
    let mut ranked: Vec<&ScoredTrack> = scored.iter().collect();
    ranked.sort_by(|a, b| b.scores.overall.total_cmp(&a.scores.overall));

    let mut seen = HashSet::new();
    ranked.retain(|s| seen.insert(s.track.id.as_str()));
    ranked
}

/// Pick the final recommendations.
#[must_use]
pub fn select(scored: &[ScoredTrack]) -> Vec<Recommendation> {
    let ranked = rank(scored);

    let mut empathy: Vec<&ScoredTrack> = ranked
        .iter()
        .copied()
        .filter(|s| s.category == Category::Empathy)
        .take(EMPATHY_SLOTS)
        .collect();

    let mut relief: Vec<&ScoredTrack> = ranked
        .iter()
        .copied()
        .filter(|s| s.category == Category::Relief)
        .take(RELIEF_SLOTS)
        .collect();

    if relief.is_empty() {
        let leftover = ranked
            .iter()
            .copied()
            .find(|s| !empathy.iter().any(|e| e.track.id == s.track.id));

        match leftover.or_else(|| empathy.pop()) {
            Some(backfill) => {
                debug!("No relief candidate, re-tagging '{}' as relief", backfill.track.title);
                relief.push(backfill);
            }
            None => debug!("Nothing to select from"),
        }
    }

    if empathy.len() < EMPATHY_SLOTS {
        let chosen: HashSet<&str> = empathy
            .iter()
            .chain(relief.iter())
            .map(|s| s.track.id.as_str())
            .collect();
        let missing = EMPATHY_SLOTS - empathy.len();
        let fill: Vec<&ScoredTrack> = ranked
            .iter()
            .copied()
            .filter(|s| !chosen.contains(s.track.id.as_str()))
            .take(missing)
            .collect();
        if !fill.is_empty() {
            debug!("Filling {} empathy slot(s) from the remaining ranking", fill.len());
        }
        empathy.extend(fill);
    }

    empathy
        .into_iter()
        .map(|s| Recommendation::from_scored(s, Category::Empathy))
        .chain(relief.into_iter().map(|s| Recommendation::from_scored(s, Category::Relief)))
        .collect()
}
