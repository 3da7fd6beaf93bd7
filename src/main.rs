//! # Moodtune - Emotion-Matched Music Suggestions
//!
//! Turns a detected emotion (a face-detector distribution or a plain label)
//! into three tracks: two that sit with the feeling and one that lifts it.
//!
//! ## Usage
//!
//! ```bash
//! # Recommend from an offline catalog
//! moodtune recommend --face sad=0.7 --face neutral=0.3 --catalog tracks.json
//!
//! # Nostalgia mode with Spotify, saved to history
//! SPOTIFY_CLIENT_ID=... SPOTIFY_CLIENT_SECRET=... moodtune recommend -e happy --age 34 --nostalgia --save
//!
//! # Review and replay
//! moodtune history
//! moodtune push 3 --index 2
//! ```

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use log::info;
use moodtune::catalog::teenage_window_now;
use moodtune::cli::{self, face_scores, Args, Command};
use moodtune::completion;
use moodtune::config::Settings;
use moodtune::db::{HistoryPage, PushEvent, RecommendationStore};
use moodtune::emotion::Emotion;
use moodtune::emotion_spec::SpecGenerator;
use moodtune::links::search_link;
use moodtune::pipeline::{RecommendRequest, RecommendResponse, Recommender};
use serde_json::json;

/// Main entry point for Moodtune.
///
/// Logging is controlled through `RUST_LOG`:
/// - `RUST_LOG=info moodtune recommend ...` - Pipeline progress
/// - `RUST_LOG=moodtune::scoring=debug moodtune recommend ...` - Per-track scoring
fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Command::Recommend {
            emotion,
            age,
            gender,
            trait_name,
            face,
            face_json,
            nostalgia,
            catalog,
            save,
            json,
        } => {
            let settings = args.credentials.settings(catalog);
            let request = RecommendRequest {
                age,
                gender,
                emotion,
                face_dist: face_scores(&face, face_json.as_deref())?,
                nostalgia,
                trait_name,
            };

            let recommender = Recommender::from_settings(&settings)?;
            let response = recommender.recommend(&request)?;

            let saved = if save {
                let store = open_store(&settings)?;
                Some(store.save_set(
                    response.emotion.as_str(),
                    request.age,
                    request.gender.as_deref(),
                    &response.recommendations,
                )?)
            } else {
                None
            };

            if json {
                let mut value = serde_json::to_value(&response).context("Failed to serialize response")?;
                if let Some(id) = saved {
                    value["recSetId"] = json!(id);
                }
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_response(&response);
                if let Some(id) = saved {
                    println!("\nSaved as set {id}");
                }
            }
        }
        Command::Spec { emotion, gender, age } => {
            let emotion: Emotion = emotion.parse()?;
            let settings = args.credentials.settings(None);
            let generator = SpecGenerator::from_settings(&settings)?;
            let spec = generator.generate(emotion, gender.as_deref(), age);
            println!("{}", serde_json::to_string_pretty(&spec)?);
        }
        Command::Window { age } => match teenage_window_now(age) {
            Some((start, end)) => println!("{start}-{end}"),
            None => println!("Age {age} has no teenage window yet"),
        },
        Command::History { page, page_size, json } => {
            let store = open_store(&args.credentials.settings(None))?;
            let history = store.history(page, page_size)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&history)?);
            } else {
                print_history(&history);
            }
        }
        Command::Push {
            set,
            index,
            channel,
            message,
        } => {
            let store = open_store(&args.credentials.settings(None))?;
            let rec_set = store
                .get_set(set)?
                .with_context(|| format!("Recommendation set {set} does not exist"))?;
            let item = rec_set.items.get(index).with_context(|| {
                format!("Set {set} has {} items; index {index} is out of range", rec_set.items.len())
            })?;

            let play_url = if item.play_url.is_empty() {
                search_link(&item.title, &item.artist)
            } else {
                item.play_url.clone()
            };

            let receipt = store.log_push(&PushEvent {
                rec_set_id: Some(set),
                channel: channel.clone(),
                title: item.title.clone(),
                artist: item.artist.clone(),
                youtube_url: Some(play_url.clone()),
                track_id: Some(item.track_id.clone()),
                message: message.clone(),
                selected_idx: Some(index as i64),
            })?;
            info!("Recorded push {}", receipt.id);

            let payload = json!({
                "type": "play",
                "channel": channel.as_deref().unwrap_or(moodtune::db::DEFAULT_CHANNEL),
                "title": item.title,
                "artist": item.artist,
                "youtubeUrl": play_url,
                "trackId": item.track_id,
                "message": message,
                "pushId": receipt.id,
                "meta": receipt.meta,
            });
            println!("{}", serde_json::to_string_pretty(&payload)?);
        }
        Command::Completion { shell } => {
            let mut cmd = cli::Args::command();
            completion::generate_completions(completion::shell_to_completion_shell(&shell), &mut cmd);
        }
        Command::CompleteEmotions => {
            completion::print_emotion_completions();
        }
    }

    Ok(())
}

fn open_store(settings: &Settings) -> Result<RecommendationStore> {
    RecommendationStore::open(&settings.db_path()?)
}

fn print_response(response: &RecommendResponse) {
    println!("Emotion: {}", response.emotion);
    if let Some(dist) = &response.distribution {
        let weights: Vec<String> = dist
            .iter()
            .filter(|(_, w)| *w >= 0.01)
            .map(|(e, w)| format!("{e} {w:.2}"))
            .collect();
        println!("Distribution: {}", weights.join(", "));
    }
    if response.nostalgia {
        println!("Mode: nostalgia");
    }
    println!();

    for (i, rec) in response.recommendations.iter().enumerate() {
        println!("{}. [{}] {} - {}", i + 1, rec.category, rec.artist, rec.title);
        if !rec.rationale.is_empty() {
            println!("   {}", rec.rationale);
        }
        println!("   {}", rec.play_url);
    }
}

fn print_history(history: &HistoryPage) {
    if history.entries.is_empty() {
        println!("No saved recommendation sets (page {})", history.page);
        return;
    }

    println!(
        "Page {} ({} per page, {} sets total)",
        history.page, history.page_size, history.total
    );
    for entry in &history.entries {
        let set = &entry.set;
        println!("\n#{} {} at {}", set.id, set.emotion, set.created_at);
        for (i, rec) in set.items.iter().enumerate() {
            println!("  {i}. [{}] {} - {}", rec.category, rec.artist, rec.title);
        }
        if let Some(push) = &entry.latest_push {
            println!("  last pushed: {} - {} ({})", push.artist, push.title, push.created_at);
            if let Some(message) = &push.message {
                println!("    \"{message}\"");
            }
        }
    }
}
