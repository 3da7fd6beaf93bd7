//! # Recommendation History
//!
//! SQLite record of what was recommended and what was pushed to a player.
//!
//! ## Schema
//!
//! ```sql
//! rec_sets  (id, emotion, age, gender, items /* JSON */, created_at)
//! push_logs (id, rec_set_id, channel, title, artist, youtube_url,
//!            track_id, message, selected_idx, created_at)
//! ```
//!
//! `items` holds the recommendation list exactly as it was returned. A push
//! may reference a set (and the index of the chosen item) or stand alone.

use crate::track::Recommendation;
use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 50;
pub const DEFAULT_CHANNEL: &str = "default";

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS rec_sets (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    emotion    TEXT NOT NULL,
    age        INTEGER,
    gender     TEXT,
    items      TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS push_logs (
    id           INTEGER PRIMARY KEY AUTOINCREMENT,
    rec_set_id   INTEGER REFERENCES rec_sets(id),
    channel      TEXT NOT NULL,
    title        TEXT NOT NULL,
    artist       TEXT NOT NULL,
    youtube_url  TEXT,
    track_id     TEXT,
    message      TEXT,
    selected_idx INTEGER,
    created_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_push_logs_rec_set ON push_logs(rec_set_id);
";

/// A saved recommendation set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecSet {
    pub id: i64,
    pub emotion: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub items: Vec<Recommendation>,
    pub created_at: String,
}

/// A playback push to record.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushEvent {
    pub rec_set_id: Option<i64>,
    pub channel: Option<String>,
    pub title: String,
    pub artist: String,
    pub youtube_url: Option<String>,
    pub track_id: Option<String>,
    pub message: Option<String>,
    pub selected_idx: Option<i64>,
}

/// Set metadata echoed back for a push that references a set.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetMeta {
    pub rec_set_id: i64,
    pub emotion: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub selected_idx: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReceipt {
    pub id: i64,
    pub meta: Option<SetMeta>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushSummary {
    pub id: i64,
    pub title: String,
    pub artist: String,
    pub youtube_url: Option<String>,
    pub selected_idx: Option<i64>,
    pub message: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub set: RecSet,
    pub latest_push: Option<PushSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub entries: Vec<HistoryEntry>,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn decode_items(id: i64, json: &str) -> Result<Vec<Recommendation>> {
    serde_json::from_str(json).with_context(|| format!("Recommendation set {id} has corrupt items"))
}

pub struct RecommendationStore {
    conn: Connection,
}

impl RecommendationStore {
    /// Open (and if needed create) the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create database directory {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open history database at {}", path.display()))?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory().context("Failed to open in-memory database")?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)
            .context("Failed to create history tables")?;
        Ok(Self { conn })
    }

    /// Store a recommendation set and return its id.
    pub fn save_set(
        &self,
        emotion: &str,
        age: Option<u32>,
        gender: Option<&str>,
        items: &[Recommendation],
    ) -> Result<i64> {
        if items.is_empty() {
            bail!("Refusing to save an empty recommendation set");
        }

        let json = serde_json::to_string(items).context("Failed to serialize recommendations")?;
        self.conn
            .execute(
                "INSERT INTO rec_sets (emotion, age, gender, items, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![emotion, age, gender, json, now()],
            )
            .context("Failed to save recommendation set")?;

        let id = self.conn.last_insert_rowid();
        info!("Saved recommendation set {id} ({} items, {emotion})", items.len());
        Ok(id)
    }

    pub fn get_set(&self, id: i64) -> Result<Option<RecSet>> {
        let row = self
            .conn
            .query_row(
                "SELECT id, emotion, age, gender, items, created_at FROM rec_sets WHERE id = ?1",
                [id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<u32>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .with_context(|| format!("Failed to load recommendation set {id}"))?;

        row.map(|(id, emotion, age, gender, items, created_at)| {
            Ok(RecSet {
                id,
                emotion,
                age,
                gender,
                items: decode_items(id, &items)?,
                created_at,
            })
        })
        .transpose()
    }

    /// Record a push. Title and artist are mandatory.
    pub fn log_push(&self, event: &PushEvent) -> Result<PushReceipt> {
        if event.title.trim().is_empty() || event.artist.trim().is_empty() {
            bail!("A push needs both a title and an artist");
        }

        let set = match event.rec_set_id {
            Some(id) => Some(
                self.get_set(id)?
                    .with_context(|| format!("Recommendation set {id} does not exist"))?,
            ),
            None => None,
        };

        let channel = event.channel.as_deref().unwrap_or(DEFAULT_CHANNEL);
        self.conn
            .execute(
                "INSERT INTO push_logs
                    (rec_set_id, channel, title, artist, youtube_url, track_id, message, selected_idx, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    event.rec_set_id,
                    channel,
                    event.title,
                    event.artist,
                    event.youtube_url,
                    event.track_id,
                    event.message,
                    event.selected_idx,
                    now(),
                ],
            )
            .context("Failed to record push")?;

        let id = self.conn.last_insert_rowid();
        debug!("Logged push {id} on channel {channel}: {} - {}", event.title, event.artist);

        Ok(PushReceipt {
            id,
            meta: set.map(|set| SetMeta {
                rec_set_id: set.id,
                emotion: set.emotion,
                age: set.age,
                gender: set.gender,
                selected_idx: event.selected_idx,
            }),
        })
    }

    /// Saved sets, newest first, each with its most recent push.
    ///
    /// `page` starts at 1; `page_size` is clamped to `1..=50`.
    pub fn history(&self, page: usize, page_size: Option<usize>) -> Result<HistoryPage> {
        let page = page.max(1);
        let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
        let offset = i64::try_from(page.saturating_sub(1).saturating_mul(page_size)).unwrap_or(i64::MAX);

        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM rec_sets", [], |row| row.get(0))
            .context("Failed to count recommendation sets")?;

        let mut stmt = self
            .conn
            .prepare(
                "SELECT r.id, r.emotion, r.age, r.gender, r.items, r.created_at,
                        p.id, p.title, p.artist, p.youtube_url, p.selected_idx, p.message, p.created_at
                 FROM rec_sets r
                 LEFT JOIN push_logs p
                   ON p.id = (SELECT MAX(id) FROM push_logs WHERE rec_set_id = r.id)
                 ORDER BY r.id DESC
                 LIMIT ?1 OFFSET ?2",
            )
            .context("Failed to prepare history query")?;

        let rows = stmt
            .query_map(params![page_size as i64, offset], |row| {
                let push = match row.get::<_, Option<i64>>(6)? {
                    Some(push_id) => Some(PushSummary {
                        id: push_id,
                        title: row.get(7)?,
                        artist: row.get(8)?,
                        youtube_url: row.get(9)?,
                        selected_idx: row.get(10)?,
                        message: row.get(11)?,
                        created_at: row.get(12)?,
                    }),
                    None => None,
                };
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<u32>>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                    push,
                ))
            })
            .context("Failed to query history")?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, emotion, age, gender, items, created_at, latest_push) =
                row.context("Failed to read history row")?;
            entries.push(HistoryEntry {
                set: RecSet {
                    id,
                    emotion,
                    age,
                    gender,
                    items: decode_items(id, &items).unwrap_or_else(|e| {
                        warn!("{e:#}; listing it without items");
                        Vec::new()
                    }),
                    created_at,
                },
                latest_push,
            });
        }

        Ok(HistoryPage {
            page,
            page_size,
            total: usize::try_from(total).unwrap_or_default(),
            entries,
        })
    }
}
