//! # Semantic Scoring
//!
//! Every candidate that survives the heuristic filter is judged by a
//! [`ScoringOracle`]: is it an empathy track or a relief track, how well
//! does it fit, and why. The oracle sees the request's [`EmotionSpec`], the
//! track metadata and whatever lyrics could be found.
//!
//! ## Cost bounds
//!
//! - Each category contributes at most [`CANDIDATE_CAP`] tracks.
//! - Candidates are judged in batches of [`BATCH_SIZE`] on a dedicated
//!   thread pool with exactly that many threads, so no more than
//!   [`BATCH_SIZE`] lyrics+oracle calls are ever outstanding.
//! - A batch is fully collected, in input order, before the next starts.
//!
//! ## Failure handling
//!
//! Scoring never aborts. Missing lyrics become `""`. An oracle error or
//! unusable reply gives the track [`Scores::NEUTRAL`], keeps the category
//! the filter assigned and leaves the rationale empty.

use crate::emotion_spec::EmotionSpec;
use crate::lyrics::LyricsSource;
use crate::oracle::ChatClient;
use crate::track::{Category, ScoredTrack, Scores, Track};
use anyhow::{Context, Result};
use log::{debug, warn};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::Deserialize;
use std::sync::Arc;

/// Most candidates scored per category.
pub const CANDIDATE_CAP: usize = 8;
/// Candidates judged concurrently.
pub const BATCH_SIZE: usize = 4;

/// What the oracle says about one track.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Verdict {
    /// Raw category label; unknown labels fall back to the filter's choice.
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub scores: Option<Scores>,
    #[serde(default, alias = "reason")]
    pub rationale: String,
}

pub trait ScoringOracle: Send + Sync {
    fn score(&self, spec: &EmotionSpec, track: &Track, lyrics: &str) -> Result<Verdict>;
}

/// Rule-based scorer used when no oracle is configured.
///
/// Lyrics that talk about sadness or loneliness make an empathy track,
/// anything else is relief.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordScorer;

impl KeywordScorer {
    const EMPATHY_TERMS: [&'static str; 5] = ["슬픔", "외로움", "sad", "lonely", "alone"];

    fn mirrors_mood(lyrics: &str) -> bool {
        let lyrics = lyrics.to_lowercase();
        Self::EMPATHY_TERMS.iter().any(|term| lyrics.contains(term))
    }
}

impl ScoringOracle for KeywordScorer {
    fn score(&self, _spec: &EmotionSpec, track: &Track, lyrics: &str) -> Result<Verdict> {
        let empathy = Self::mirrors_mood(lyrics);
        let (category, scores, rationale) = if empathy {
            (
                Category::Empathy,
                Scores {
                    empathy: 0.8,
                    relief: 0.3,
                    overall: 0.65,
                },
                format!(
                    "{} - {} stays close to how you feel right now, in its words and its mood.",
                    track.title, track.artist
                ),
            )
        } else {
            (
                Category::Relief,
                Scores {
                    empathy: 0.3,
                    relief: 0.8,
                    overall: 0.65,
                },
                format!(
                    "{} - {} moves along lightly and gives your mood some fresh air.",
                    track.title, track.artist
                ),
            )
        };

        Ok(Verdict {
            category: Some(category.as_str().to_string()),
            scores: Some(scores),
            rationale,
        })
    }
}

/// Scorer backed by the chat oracle.
#[derive(Debug, Clone)]
pub struct OracleScorer {
    client: ChatClient,
}

impl OracleScorer {
    const TEMPERATURE: f32 = 0.7;

    #[must_use]
    pub fn new(client: ChatClient) -> Self {
        Self { client }
    }

    fn prompt(spec: &EmotionSpec, track: &Track, lyrics: &str) -> String {
        let spec_json = serde_json::to_string_pretty(spec).unwrap_or_default();
        let lyrics = if lyrics.trim().is_empty() { "(no lyrics)" } else { lyrics };

        format!(
            r#"You are a music psychologist and curator.
Using the EmotionSpec, track details and lyrics below, judge whether this
track empathizes with the listener's emotion or relieves it.

EmotionSpec: {spec_json}

Title: {title}
Artist: {artist}
Lyrics: {lyrics}

Answer with JSON only, in this shape:
{{
 "scores": {{"empathy": 0.7, "relief": 0.4, "overall": 0.68}},
 "category": "empathy" or "relief",
 "rationale": "3-4 warm sentences about the mood, lyrics and sound, naming the title and artist"
}}"#,
            title = track.title,
            artist = track.artist,
        )
    }
}

impl ScoringOracle for OracleScorer {
    fn score(&self, spec: &EmotionSpec, track: &Track, lyrics: &str) -> Result<Verdict> {
        self.client
            .complete_json(&Self::prompt(spec, track, lyrics), Self::TEMPERATURE)
            .with_context(|| format!("Oracle could not score '{}' by {}", track.title, track.artist))
    }
}

/// Empathy candidates first, then relief, each capped at [`CANDIDATE_CAP`]
/// and tagged with the category whose filter picked them.
#[must_use]
pub fn cap_candidates(empathy: Vec<Track>, relief: Vec<Track>) -> Vec<(Track, Category)> {
    empathy
        .into_iter()
        .take(CANDIDATE_CAP)
        .map(|t| (t, Category::Empathy))
        .chain(relief.into_iter().take(CANDIDATE_CAP).map(|t| (t, Category::Relief)))
        .collect()
}

pub struct ScoringPipeline {
    pool: ThreadPool,
    lyrics: Arc<dyn LyricsSource>,
    oracle: Arc<dyn ScoringOracle>,
}

impl ScoringPipeline {
    pub fn new(lyrics: Arc<dyn LyricsSource>, oracle: Arc<dyn ScoringOracle>) -> Result<Self> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(BATCH_SIZE)
            .thread_name(|i| format!("moodtune-score-{i}"))
            .build()
            .context("Failed to start the scoring thread pool")?;

        Ok(Self { pool, lyrics, oracle })
    }

    fn fetch_lyrics(&self, track: &Track) -> String {
        match self.lyrics.lyrics(&track.title, &track.artist) {
            Ok(text) => text,
            Err(e) => {
                warn!("No lyrics for '{}': {e:#}", track.title);
                String::new()
            }
        }
    }

    /// Judge a single track; never fails.
    #[must_use]
    pub fn score_one(&self, spec: &EmotionSpec, track: &Track, assigned: Category) -> ScoredTrack {
        let lyrics = self.fetch_lyrics(track);

        match self.oracle.score(spec, track, &lyrics) {
            Ok(verdict) => {
                let category = verdict
                    .category
                    .as_deref()
                    .and_then(|label| label.parse().ok())
                    .unwrap_or(assigned);
                ScoredTrack {
                    track: track.clone(),
                    category,
                    scores: verdict.scores.unwrap_or(Scores::NEUTRAL),
                    rationale: verdict.rationale,
                }
            }
            Err(e) => {
                warn!("Scoring failed, using neutral scores: {e:#}");
                ScoredTrack {
                    track: track.clone(),
                    category: assigned,
                    scores: Scores::NEUTRAL,
                    rationale: String::new(),
                }
            }
        }
    }

    /// Score `candidates` in sequential batches of [`BATCH_SIZE`].
    ///
    /// The output has one entry per candidate, in input order.
    #[must_use]
    pub fn score_all(&self, spec: &EmotionSpec, candidates: &[(Track, Category)]) -> Vec<ScoredTrack> {
        let mut scored = Vec::with_capacity(candidates.len());

        for (n, batch) in candidates.chunks(BATCH_SIZE).enumerate() {
            debug!("Scoring batch {} ({} tracks)", n + 1, batch.len());
            let results: Vec<ScoredTrack> = self.pool.install(|| {
                batch
                    .par_iter()
                    .map(|(track, category)| self.score_one(spec, track, *category))
                    .collect()
            });
            scored.extend(results);
        }

        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lyrics::NoLyrics;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread;
    use std::time::{Duration, Instant};

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            title: format!("Title {id}"),
            artist: format!("Artist {id}"),
            external_url: String::new(),
            year: None,
        }
    }

    struct FixedLyrics(HashMap<String, String>);

    impl LyricsSource for FixedLyrics {
        fn lyrics(&self, title: &str, _artist: &str) -> Result<String> {
            match self.0.get(title) {
                Some(text) => Ok(text.clone()),
                None => anyhow::bail!("not found"),
            }
        }
    }

    /// Records how many calls overlap and when each one ran, sleeping longer
    /// for earlier tracks.
    #[derive(Default)]
    struct SlowOracle {
        active: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
        spans: Mutex<Vec<(u64, Instant, Instant)>>,
    }

    impl ScoringOracle for SlowOracle {
        fn score(&self, _spec: &EmotionSpec, track: &Track, _lyrics: &str) -> Result<Verdict> {
            let started = Instant::now();
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            self.calls.fetch_add(1, Ordering::SeqCst);

            let index: u64 = track.id.trim_start_matches('t').parse().unwrap_or(0);
            thread::sleep(Duration::from_millis(40 - (index % 4) * 10));

            self.active.fetch_sub(1, Ordering::SeqCst);
            self.spans.lock().unwrap().push((index, started, Instant::now()));
            Ok(Verdict {
                category: Some("relief".to_string()),
                scores: Some(Scores {
                    empathy: 0.1,
                    relief: 0.9,
                    overall: index as f64 / 100.0,
                }),
                rationale: format!("because {}", track.id),
            })
        }
    }

    struct FailingOracle;

    impl ScoringOracle for FailingOracle {
        fn score(&self, _spec: &EmotionSpec, _track: &Track, _lyrics: &str) -> Result<Verdict> {
            anyhow::bail!("429 Too Many Requests")
        }
    }

    #[test]
    fn test_keyword_scorer_detects_mood_terms() {
        let spec = EmotionSpec::fallback();
        let t = track("a");

        let sad = KeywordScorer.score(&spec, &t, "밤새 외로움에 잠겨").unwrap();
        assert_eq!(sad.category.as_deref(), Some("empathy"));
        assert_eq!(sad.scores.unwrap().empathy, 0.8);
        assert_eq!(sad.scores.unwrap().overall, 0.65);
        assert!(sad.rationale.contains("Title a - Artist a"));

        let bright = KeywordScorer.score(&spec, &t, "Dancing in the Sun").unwrap();
        assert_eq!(bright.category.as_deref(), Some("relief"));
        assert_eq!(bright.scores.unwrap().relief, 0.8);

        let english = KeywordScorer.score(&spec, &t, "So LONELY tonight").unwrap();
        assert_eq!(english.category.as_deref(), Some("empathy"));
    }

    #[test]
    fn test_verdict_accepts_reason_alias_and_korean_labels() {
        let verdict: Verdict = crate::oracle::extract_json(
            r#"{"scores": {"empathy": 0.7, "relief": 0.4, "overall": 0.68}, "category": "공감", "reason": "warm"}"#,
        )
        .unwrap();
        assert_eq!(verdict.rationale, "warm");
        assert_eq!(verdict.category.unwrap().parse::<Category>().unwrap(), Category::Empathy);
    }

    #[test]
    fn test_cap_candidates() {
        let empathy: Vec<Track> = (0..12).map(|i| track(&format!("e{i}"))).collect();
        let relief: Vec<Track> = (0..3).map(|i| track(&format!("r{i}"))).collect();
        let capped = cap_candidates(empathy, relief);
        assert_eq!(capped.len(), CANDIDATE_CAP + 3);
        assert!(capped[..CANDIDATE_CAP].iter().all(|(_, c)| *c == Category::Empathy));
        assert_eq!(capped[CANDIDATE_CAP].0.id, "r0");
    }

    #[test]
    fn test_concurrency_never_exceeds_batch_size() {
        let oracle = Arc::new(SlowOracle::default());
        let pipeline = ScoringPipeline::new(Arc::new(NoLyrics), oracle.clone()).unwrap();
        let candidates: Vec<(Track, Category)> =
            (0..10).map(|i| (track(&format!("t{i}")), Category::Empathy)).collect();

        let scored = pipeline.score_all(&EmotionSpec::fallback(), &candidates);

        assert_eq!(scored.len(), 10);
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 10);
        let peak = oracle.peak.load(Ordering::SeqCst);
        assert!(peak <= BATCH_SIZE);
        assert!(peak > 1, "tracks within a batch should be scored in parallel");
    }

    #[test]
    fn test_batches_finish_before_the_next_starts() {
        let oracle = Arc::new(SlowOracle::default());
        let pipeline = ScoringPipeline::new(Arc::new(NoLyrics), oracle.clone()).unwrap();
        let candidates: Vec<(Track, Category)> =
            (0..10).map(|i| (track(&format!("t{i}")), Category::Empathy)).collect();

        let _ = pipeline.score_all(&EmotionSpec::fallback(), &candidates);

        let spans = oracle.spans.lock().unwrap();
        assert_eq!(spans.len(), 10);
        let batch_of = |index: u64| index as usize / BATCH_SIZE;
        for (i, _, ended) in spans.iter() {
            for (j, started, _) in spans.iter() {
                if batch_of(*j) > batch_of(*i) {
                    assert!(started >= ended, "t{j} started before t{i} finished");
                }
            }
        }
    }

    #[test]
    fn test_results_keep_input_order() {
        let pipeline = ScoringPipeline::new(Arc::new(NoLyrics), Arc::new(SlowOracle::default())).unwrap();
        let candidates: Vec<(Track, Category)> =
            (0..9).map(|i| (track(&format!("t{i}")), Category::Empathy)).collect();

        let ids: Vec<String> = pipeline
            .score_all(&EmotionSpec::fallback(), &candidates)
            .into_iter()
            .map(|s| s.track.id)
            .collect();
        let expected: Vec<String> = (0..9).map(|i| format!("t{i}")).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_oracle_failure_is_neutral_and_keeps_category() {
        let pipeline = ScoringPipeline::new(Arc::new(NoLyrics), Arc::new(FailingOracle)).unwrap();
        let candidates = vec![(track("a"), Category::Relief), (track("b"), Category::Empathy)];

        let scored = pipeline.score_all(&EmotionSpec::fallback(), &candidates);
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].category, Category::Relief);
        assert_eq!(scored[1].category, Category::Empathy);
        assert!(scored.iter().all(|s| s.scores == Scores::NEUTRAL && s.rationale.is_empty()));
    }

    #[test]
    fn test_lyrics_failure_is_not_fatal() {
        let lyrics = FixedLyrics(HashMap::from([("Title a".to_string(), "나의 슬픔".to_string())]));
        let pipeline = ScoringPipeline::new(Arc::new(lyrics), Arc::new(KeywordScorer)).unwrap();
        let candidates = vec![(track("a"), Category::Relief), (track("b"), Category::Empathy)];

        let scored = pipeline.score_all(&EmotionSpec::fallback(), &candidates);
        assert_eq!(scored[0].category, Category::Empathy);
        assert_eq!(scored[1].category, Category::Relief);
    }

    #[test]
    fn test_unknown_category_falls_back_to_assigned() {
        struct Odd;
        impl ScoringOracle for Odd {
            fn score(&self, _spec: &EmotionSpec, _track: &Track, _lyrics: &str) -> Result<Verdict> {
                Ok(Verdict {
                    category: Some("joy".to_string()),
                    scores: None,
                    rationale: "hmm".to_string(),
                })
            }
        }

        let pipeline = ScoringPipeline::new(Arc::new(NoLyrics), Arc::new(Odd)).unwrap();
        let scored = pipeline.score_one(&EmotionSpec::fallback(), &track("x"), Category::Relief);
        assert_eq!(scored.category, Category::Relief);
        assert_eq!(scored.scores, Scores::NEUTRAL);
        assert_eq!(scored.rationale, "hmm");
    }

    #[test]
    fn test_prompt_carries_spec_and_lyrics() {
        let prompt = OracleScorer::prompt(&EmotionSpec::fallback(), &track("a"), "");
        assert!(prompt.contains("seedGenres"));
        assert!(prompt.contains("Title a"));
        assert!(prompt.contains("(no lyrics)"));
    }
}
