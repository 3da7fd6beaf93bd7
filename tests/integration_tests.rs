//! # Integration Tests for Moodtune
//!
//! End-to-end runs of the public API against an offline catalog and
//! in-process collaborators, the history store on a temporary database, and
//! the `moodtune` binary itself.

use anyhow::Result;
use moodtune::calibration::Calibrator;
use moodtune::catalog::{CandidatePool, OfflineCatalog};
use moodtune::config::Settings;
use moodtune::db::{PushEvent, RecommendationStore};
use moodtune::emotion::Emotion;
use moodtune::emotion_spec::{EmotionSpec, SpecGenerator};
use moodtune::links::{search_link, LinkEnricher};
use moodtune::lyrics::LyricsSource;
use moodtune::pipeline::{RecommendError, RecommendRequest, Recommender};
use moodtune::scoring::{KeywordScorer, ScoringPipeline};
use moodtune::track::{AudioFeatures, Category, Track};
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

/// Six tracks: three that suit a sad listener's empathy rule and three that
/// suit its relief rule.
fn catalog_json() -> serde_json::Value {
    let mut tracks = Vec::new();
    for i in 0..3 {
        tracks.push(json!({
            "id": format!("e{i}"),
            "title": format!("Rainy Window {i}"),
            "artist": "Slow Hours",
            "externalUrl": format!("https://open.spotify.com/track/e{i}"),
            "year": 2008 + i,
            "features": {"valence": 0.2, "energy": 0.3, "tempo": 72.0, "acousticness": 0.8, "danceability": 0.3}
        }));
    }
    for i in 0..3 {
        tracks.push(json!({
            "id": format!("r{i}"),
            "title": format!("Sunday Drive {i}"),
            "artist": "Bright Lines",
            "externalUrl": format!("https://open.spotify.com/track/r{i}"),
            "year": 2018 + i,
            "features": {"valence": 0.85, "energy": 0.75, "tempo": 124.0, "acousticness": 0.1, "danceability": 0.7}
        }));
    }
    serde_json::Value::Array(tracks)
}

/// Test helper to write the catalog and a calibration table into a temp dir
fn create_test_files() -> Result<(TempDir, PathBuf, PathBuf)> {
    let temp_dir = TempDir::new()?;
    let catalog = temp_dir.path().join("tracks.json");
    let calibration = temp_dir.path().join("calibration-temp.json");

    fs::write(&catalog, serde_json::to_string_pretty(&catalog_json())?)?;
    fs::write(
        &calibration,
        serde_json::to_string(&json!({"introvert": {"female": 0.7, "male": 1.1}}))?,
    )?;

    Ok((temp_dir, catalog, calibration))
}

/// Lyrics that read as lonely for the rainy tracks only.
struct MoodLyrics;

impl LyricsSource for MoodLyrics {
    fn lyrics(&self, title: &str, _artist: &str) -> Result<String> {
        if title.starts_with("Rainy") {
            Ok("I sit alone and the night is lonely".to_string())
        } else {
            Ok("windows down, we sing along".to_string())
        }
    }
}

fn sad_request() -> RecommendRequest {
    serde_json::from_value(json!({
        "faceDist": {"sad": 0.6, "neutral": 0.3, "happy": 0.1},
        "gender": "female",
        "trait": "introvert",
        "age": 29
    }))
    .unwrap()
}

#[cfg(test)]
mod pipeline_tests {
    use super::*;

    #[test]
    fn test_recommend_from_settings_offline() {
        let (_dir, catalog, calibration) = create_test_files().unwrap();
        let settings = Settings {
            catalog_path: Some(catalog),
            calibration_path: Some(calibration),
            ..Settings::default()
        };

        let recommender = Recommender::from_settings(&settings).unwrap();
        let response = recommender.recommend(&sad_request()).unwrap();

        assert_eq!(response.emotion, Emotion::Sad);
        let dist = response.distribution.expect("face distribution was given");
        let total: f64 = dist.iter().map(|(_, w)| w).sum();
        assert!((total - 1.0).abs() < 1e-9);
        // τ = 0.7 sharpens the distribution towards its dominant label.
        assert!(dist.weight(Emotion::Sad) > 0.6);

        assert_eq!(response.spec, EmotionSpec::fallback());

        let categories: Vec<Category> = response.recommendations.iter().map(|r| r.category).collect();
        assert_eq!(categories, vec![Category::Empathy, Category::Empathy, Category::Relief]);

        let mut ids: Vec<&str> = response.recommendations.iter().map(|r| r.track_id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 3, "recommendations must be distinct tracks");

        for rec in &response.recommendations {
            assert_eq!(rec.play_url, search_link(&rec.title, &rec.artist));
            assert!(rec.external_url.starts_with("https://open.spotify.com/track/"));
        }
    }

    #[test]
    fn test_lyrics_drive_the_split() {
        let catalog = Arc::new(OfflineCatalog::from_json(&catalog_json().to_string()).unwrap());
        let scoring = ScoringPipeline::new(Arc::new(MoodLyrics), Arc::new(KeywordScorer)).unwrap();
        let recommender = Recommender::new(
            Calibrator::default(),
            SpecGenerator::fixed(),
            CandidatePool::new(catalog.clone(), catalog),
            scoring,
            LinkEnricher::default(),
        );

        let response = recommender.recommend(&sad_request()).unwrap();
        let recs = &response.recommendations;

        assert_eq!(recs.len(), 3);
        assert!(recs[0].track_id.starts_with('e'));
        assert!(recs[1].track_id.starts_with('e'));
        assert!(recs[2].track_id.starts_with('r'));
        assert_eq!(recs[2].category, Category::Relief);
        assert!(!recs[0].rationale.is_empty());
    }

    #[test]
    fn test_nostalgia_outside_window_reports_no_candidates() {
        let (_dir, catalog, _) = create_test_files().unwrap();
        let settings = Settings {
            catalog_path: Some(catalog),
            ..Settings::default()
        };
        let recommender = Recommender::from_settings(&settings).unwrap();

        // Nobody in the catalog was released during a 100-year-old's teens.
        let request = RecommendRequest {
            emotion: Some("happy".to_string()),
            age: Some(100),
            nostalgia: true,
            ..RecommendRequest::default()
        };

        match recommender.recommend(&request) {
            Err(RecommendError::NoCandidates { nostalgia }) => assert!(nostalgia),
            other => panic!("expected NoCandidates, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_catalog_is_a_setup_error() {
        let settings = Settings::default();
        let err = Recommender::from_settings(&settings).err().expect("no catalog configured");
        assert!(err.to_string().contains("No track catalog configured"));
    }

    #[test]
    fn test_offline_catalog_tracks_round_trip_through_json() {
        let catalog = OfflineCatalog::from_json(&catalog_json().to_string()).unwrap();
        assert_eq!(catalog.len(), 6);

        let built = OfflineCatalog::from_tracks(vec![(
            Track {
                id: "x".to_string(),
                title: "X".to_string(),
                artist: "Y".to_string(),
                external_url: String::new(),
                year: None,
            },
            Some(AudioFeatures {
                valence: 0.5,
                energy: 0.5,
                tempo: 100.0,
                acousticness: 0.5,
                danceability: 0.5,
            }),
        )]);
        assert!(!built.is_empty());
    }
}

#[cfg(test)]
mod history_tests {
    use super::*;

    #[test]
    fn test_save_push_and_page_history() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("nested").join("moodtune.db");

        let (_files, catalog, _) = create_test_files().unwrap();
        let settings = Settings {
            catalog_path: Some(catalog),
            ..Settings::default()
        };
        let response = Recommender::from_settings(&settings)
            .unwrap()
            .recommend(&sad_request())
            .unwrap();

        let store = RecommendationStore::open(&db_path).unwrap();
        let first = store
            .save_set(response.emotion.as_str(), Some(29), Some("female"), &response.recommendations)
            .unwrap();
        let second = store
            .save_set("happy", None, None, &response.recommendations[..1])
            .unwrap();
        assert!(second > first);

        let pick = &response.recommendations[2];
        let receipt = store
            .log_push(&PushEvent {
                rec_set_id: Some(first),
                title: pick.title.clone(),
                artist: pick.artist.clone(),
                youtube_url: Some(pick.play_url.clone()),
                selected_idx: Some(2),
                ..PushEvent::default()
            })
            .unwrap();
        let meta = receipt.meta.expect("push references a set");
        assert_eq!(meta.emotion, "sad");
        assert_eq!(meta.selected_idx, Some(2));

        // Reopen to make sure everything reached disk.
        drop(store);
        let store = RecommendationStore::open(&db_path).unwrap();
        let page = store.history(1, Some(1)).unwrap();
        assert_eq!(page.total, 2);
        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.entries[0].set.id, second);
        assert!(page.entries[0].latest_push.is_none());

        let page = store.history(2, Some(1)).unwrap();
        let entry = &page.entries[0];
        assert_eq!(entry.set.id, first);
        assert_eq!(entry.set.items, response.recommendations);
        let push = entry.latest_push.as_ref().expect("set was pushed");
        assert_eq!(push.title, pick.title);
    }
}

#[cfg(test)]
mod cli_tests {
    use super::*;

    /// The binary with every collaborator credential cleared.
    fn moodtune() -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_moodtune"));
        for var in [
            "OPENAI_API_KEY",
            "SPOTIFY_CLIENT_ID",
            "SPOTIFY_CLIENT_SECRET",
            "GENIUS_API_KEY",
            "MUSIXMATCH_API_KEY",
            "YOUTUBE_API_KEY",
            "MOODTUNE_CALIBRATION",
            "MOODTUNE_DB",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn test_cli_help_displays_correctly() {
        let output = moodtune().arg("--help").output().expect("Failed to run help command");

        let stdout = String::from_utf8_lossy(&output.stdout);
        assert!(output.status.success());
        assert!(stdout.contains("moodtune"));
        assert!(stdout.contains("recommend"));
        assert!(stdout.contains("history"));
    }

    #[test]
    fn test_window_command() {
        let output = moodtune().args(["window", "30"]).output().unwrap();
        assert!(output.status.success());

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (start, end) = stdout.trim().split_once('-').expect("start-end");
        let start: i32 = start.parse().unwrap();
        let end: i32 = end.parse().unwrap();
        assert_eq!(end - start, 6);
    }

    #[test]
    fn test_recommend_save_then_push() {
        let (dir, catalog, _) = create_test_files().unwrap();
        let db = dir.path().join("history.db");

        let output = moodtune()
            .args(["recommend", "--face", "sad=0.9", "--face", "neutral=0.1", "--save", "--json"])
            .arg("--catalog")
            .arg(&catalog)
            .arg("--db")
            .arg(&db)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let response: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(response["finalEmotion"], "sad");
        assert_eq!(response["recommendations"].as_array().unwrap().len(), 3);
        let set_id = response["recSetId"].as_i64().expect("set was saved");

        let output = moodtune()
            .args(["push", &set_id.to_string(), "--index", "1", "--channel", "living-room"])
            .arg("--db")
            .arg(&db)
            .output()
            .unwrap();
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let payload: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(payload["type"], "play");
        assert_eq!(payload["channel"], "living-room");
        assert_eq!(payload["title"], response["recommendations"][1]["title"]);
        assert_eq!(payload["meta"]["recSetId"], set_id);
    }

    #[test]
    fn test_recommend_without_catalog_fails() {
        let dir = TempDir::new().unwrap();
        let output = moodtune()
            .args(["recommend", "--emotion", "sad", "--db"])
            .arg(dir.path().join("h.db"))
            .output()
            .unwrap();

        assert!(!output.status.success());
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("No track catalog configured"));
    }
}
