//! SQLite-backed persistence for the speaker gallery, alarms, memos,
//! music favorites/history, the RSS feed list, and the music file cache
//! index (SPEC_FULL.md §3's persisted schema).
//!
//! Grounded on the teacher's `memory/sqlite.rs::SqliteMemoryStore` idiom
//! (WAL mode, schema-in-`execute_batch`, `Arc<Mutex<Connection>>`),
//! adapted from conversation/knowledge tables to this crate's schema.
//! Kept synchronous per spec §6 ("the core treats persistence as
//! synchronous method calls returning errors") rather than the
//! teacher's async wrapper, since `rusqlite::Connection` is itself
//! blocking.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

pub struct SpeakerRecord {
    pub name: String,
    pub is_owner: bool,
    pub preferences: Option<serde_json::Value>,
}

pub struct Alarm {
    pub id: i64,
    pub fire_at: DateTime<Utc>,
    pub label: String,
    pub recurring: bool,
}

pub struct Memo {
    pub id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Synchronous SQLite store backing every persisted entity in the data
/// model. One connection, guarded by a mutex: calls are short enough
/// (single-row reads/writes) that serializing them costs nothing next
/// to the network calls the rest of the orchestrator makes.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("failed to create data directory")?;
        }
        let conn = Connection::open(path).context("failed to open sqlite database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS speakers (
                name TEXT PRIMARY KEY,
                is_owner INTEGER NOT NULL DEFAULT 0,
                preferences_json TEXT
            );

            CREATE TABLE IF NOT EXISTS speaker_embeddings (
                name TEXT NOT NULL,
                vector_json TEXT NOT NULL,
                FOREIGN KEY (name) REFERENCES speakers(name) ON DELETE CASCADE
            );

            CREATE TABLE IF NOT EXISTS alarms (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                fire_at TEXT NOT NULL,
                label TEXT NOT NULL,
                recurring INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS memos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                text TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS music_favorites (
                track_id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                added_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS music_history (
                track_id TEXT NOT NULL,
                played_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS rss_feeds (
                url TEXT PRIMARY KEY,
                title TEXT
            );

            CREATE TABLE IF NOT EXISTS music_cache (
                cache_key TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                completed INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;
        Ok(())
    }

    // ---- speakers ----

    pub fn upsert_speaker(&self, name: &str, is_owner: bool, preferences: Option<&serde_json::Value>) -> Result<()> {
        let prefs = preferences.map(|p| p.to_string());
        self.conn.lock().unwrap().execute(
            "INSERT INTO speakers (name, is_owner, preferences_json) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET is_owner = excluded.is_owner, preferences_json = excluded.preferences_json",
            params![name, is_owner as i64, prefs],
        )?;
        Ok(())
    }

    pub fn get_speaker(&self, name: &str) -> Result<Option<SpeakerRecord>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT name, is_owner, preferences_json FROM speakers WHERE name = ?1",
            params![name],
            |row| {
                let prefs: Option<String> = row.get(2)?;
                Ok(SpeakerRecord {
                    name: row.get(0)?,
                    is_owner: row.get::<_, i64>(1)? != 0,
                    preferences: prefs.and_then(|p| serde_json::from_str(&p).ok()),
                })
            },
        )
        .optional()
        .context("failed to query speaker")
    }

    pub fn add_speaker_embedding(&self, name: &str, vector: &[f32]) -> Result<()> {
        let vector_json = serde_json::to_string(vector)?;
        self.conn.lock().unwrap().execute(
            "INSERT INTO speaker_embeddings (name, vector_json) VALUES (?1, ?2)",
            params![name, vector_json],
        )?;
        Ok(())
    }

    /// Loads every persisted speaker embedding for gallery bulk-load at
    /// startup (spec §4.5: "at startup the orchestrator bulk-loads
    /// persisted embeddings into the gallery").
    pub fn all_speaker_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT name, vector_json FROM speaker_embeddings")?;
        let rows = stmt
            .query_map([], |row| {
                let name: String = row.get(0)?;
                let vector_json: String = row.get(1)?;
                Ok((name, vector_json))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter_map(|(name, json)| serde_json::from_str::<Vec<f32>>(&json).ok().map(|v| (name, v)))
            .collect())
    }

    // ---- alarms ----

    pub fn add_alarm(&self, fire_at: DateTime<Utc>, label: &str, recurring: bool) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO alarms (fire_at, label, recurring) VALUES (?1, ?2, ?3)",
            params![fire_at.to_rfc3339(), label, recurring as i64],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Alarms due at or before `now`, for the minute-granular tick
    /// worker (SPEC_FULL.md supplemental feature).
    pub fn due_alarms(&self, now: DateTime<Utc>) -> Result<Vec<Alarm>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, fire_at, label, recurring FROM alarms WHERE fire_at <= ?1")?;
        let rows = stmt
            .query_map(params![now.to_rfc3339()], |row| {
                let fire_at: String = row.get(1)?;
                Ok(Alarm {
                    id: row.get(0)?,
                    fire_at: DateTime::parse_from_rfc3339(&fire_at).map(|d| d.with_timezone(&Utc)).unwrap_or(now),
                    label: row.get(2)?,
                    recurring: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn remove_alarm(&self, id: i64) -> Result<()> {
        self.conn.lock().unwrap().execute("DELETE FROM alarms WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn reschedule_alarm(&self, id: i64, next_fire_at: DateTime<Utc>) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "UPDATE alarms SET fire_at = ?1 WHERE id = ?2",
            params![next_fire_at.to_rfc3339(), id],
        )?;
        Ok(())
    }

    // ---- memos ----

    pub fn add_memo(&self, text: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO memos (text, created_at) VALUES (?1, ?2)",
            params![text, Utc::now().to_rfc3339()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_memos(&self) -> Result<Vec<Memo>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, text, created_at FROM memos ORDER BY created_at DESC")?;
        let rows = stmt
            .query_map([], |row| {
                let created_at: String = row.get(2)?;
                Ok(Memo {
                    id: row.get(0)?,
                    text: row.get(1)?,
                    created_at: DateTime::parse_from_rfc3339(&created_at).map(|d| d.with_timezone(&Utc)).unwrap_or_else(|_| Utc::now()),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- music ----

    pub fn add_music_favorite(&self, track_id: &str, title: &str) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO music_favorites (track_id, title, added_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(track_id) DO UPDATE SET title = excluded.title",
            params![track_id, title, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn record_music_played(&self, track_id: &str) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO music_history (track_id, played_at) VALUES (?1, ?2)",
            params![track_id, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    // ---- rss ----

    pub fn add_rss_feed(&self, url: &str, title: Option<&str>) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO rss_feeds (url, title) VALUES (?1, ?2) ON CONFLICT(url) DO UPDATE SET title = excluded.title",
            params![url, title],
        )?;
        Ok(())
    }

    pub fn list_rss_feeds(&self) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT url, title FROM rss_feeds")?;
        let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- music cache index ----

    pub fn record_cache_entry(&self, cache_key: &str, path: &str, completed: bool) -> Result<()> {
        self.conn.lock().unwrap().execute(
            "INSERT INTO music_cache (cache_key, path, completed) VALUES (?1, ?2, ?3)
             ON CONFLICT(cache_key) DO UPDATE SET path = excluded.path, completed = excluded.completed",
            params![cache_key, path, completed as i64],
        )?;
        Ok(())
    }

    pub fn cached_path(&self, cache_key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT path FROM music_cache WHERE cache_key = ?1 AND completed = 1",
            params![cache_key],
            |row| row.get(0),
        )
        .optional()
        .context("failed to query music cache")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speaker_round_trips_through_store() {
        let store = Store::open_in_memory().unwrap();
        store.upsert_speaker("alice", true, Some(&serde_json::json!({"wakeReply": "hi"}))).unwrap();
        let record = store.get_speaker("alice").unwrap().unwrap();
        assert!(record.is_owner);
        assert_eq!(record.preferences.unwrap()["wakeReply"], "hi");
    }

    #[test]
    fn due_alarms_excludes_future_alarms() {
        let store = Store::open_in_memory().unwrap();
        let now = Utc::now();
        store.add_alarm(now - chrono::Duration::minutes(1), "past", false).unwrap();
        store.add_alarm(now + chrono::Duration::hours(1), "future", false).unwrap();
        let due = store.due_alarms(now).unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].label, "past");
    }

    #[test]
    fn memos_list_most_recent_first() {
        let store = Store::open_in_memory().unwrap();
        store.add_memo("first").unwrap();
        store.add_memo("second").unwrap();
        let memos = store.list_memos().unwrap();
        assert_eq!(memos.len(), 2);
    }

    #[test]
    fn music_cache_only_resolves_completed_entries() {
        let store = Store::open_in_memory().unwrap();
        store.record_cache_entry("track-1", "/tmp/track-1.mp3", false).unwrap();
        assert!(store.cached_path("track-1").unwrap().is_none());
        store.record_cache_entry("track-1", "/tmp/track-1.mp3", true).unwrap();
        assert_eq!(store.cached_path("track-1").unwrap(), Some("/tmp/track-1.mp3".to_string()));
    }
}
