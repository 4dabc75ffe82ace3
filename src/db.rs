use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rusqlite::{Connection, params};
use thiserror::Error;

/// A single listening event, either freshly fetched or read back from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayRecord {
    pub video_id: String,
    pub title: String,
    pub artist: String,
    pub album: String,
    pub played: String,
    /// Epoch seconds assigned when the record is scrobbled. Not persisted.
    pub submitted_at: Option<i64>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("retention count must be a positive integer, got {0}")]
    InvalidRetention(usize),
}

/// Append-only log of scrobbled tracks, newest identified by the highest row id.
///
/// Every operation opens its own connection so no lock outlives a single call.
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }
        let db = Self {
            path: path.to_path_buf(),
        };
        db.migrate()?;
        log::info!("Database initialized at {}", path.display());
        Ok(db)
    }

    fn connect(&self) -> Result<Connection> {
        Connection::open(&self.path)
            .with_context(|| format!("failed to open database at {}", self.path.display()))
    }

    fn migrate(&self) -> Result<()> {
        self.connect()?.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scrobbles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                video_id TEXT NOT NULL,
                title TEXT NOT NULL,
                artist TEXT NOT NULL,
                album TEXT,
                played TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    /// Appends `records` in order; the last one becomes the most recent entry.
    pub fn insert_tracks(&self, records: &[PlayRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO scrobbles (video_id, title, artist, album, played)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )?;
            for record in records {
                let album = (!record.album.is_empty()).then_some(record.album.as_str());
                inserted += stmt.execute(params![
                    record.video_id,
                    record.title,
                    record.artist,
                    album,
                    record.played
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Every stored record, most recently inserted first.
    pub fn fetch_latest_scrobbles(&self) -> Result<Vec<PlayRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT video_id, title, artist, album, played FROM scrobbles ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(PlayRecord {
                video_id: row.get(0)?,
                title: row.get(1)?,
                artist: row.get(2)?,
                album: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
                played: row.get(4)?,
                submitted_at: None,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    /// Deletes everything except the `keep` most recently inserted rows.
    pub fn delete_except_latest(&self, keep: usize) -> Result<usize> {
        if keep < 1 {
            return Err(StoreError::InvalidRetention(keep).into());
        }

        let offset = i64::try_from(keep).context("retention count out of range")?;
        let deleted = self.connect()?.execute(
            r#"
            DELETE FROM scrobbles
            WHERE id <= (
                SELECT id FROM scrobbles ORDER BY id DESC LIMIT 1 OFFSET ?1
            )
            "#,
            params![offset],
        )?;
        Ok(deleted)
    }

    pub fn delete_all_tracks(&self) -> Result<usize> {
        let deleted = self.connect()?.execute("DELETE FROM scrobbles", [])?;
        log::info!("Deleted {deleted} tracks from scrobbles table");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: usize, played: &str) -> PlayRecord {
        PlayRecord {
            video_id: format!("vid{n}"),
            title: format!("title{n}"),
            artist: format!("artist{n}"),
            album: format!("album{n}"),
            played: played.to_string(),
            submitted_at: None,
        }
    }

    fn open_temp() -> (TempDir, Database) {
        let dir = TempDir::new().expect("tempdir");
        let db = Database::open(&dir.path().join("nested").join("scrobbles.db"))
            .expect("open database");
        (dir, db)
    }

    #[test]
    fn open_creates_missing_directory_and_table() {
        let (dir, db) = open_temp();
        assert!(dir.path().join("nested").is_dir());

        let conn = db.connect().expect("connect");
        let table: Option<String> = conn
            .query_row(
                "SELECT name FROM sqlite_master WHERE type='table' AND name='scrobbles'",
                [],
                |row| row.get(0),
            )
            .ok();
        assert_eq!(table.as_deref(), Some("scrobbles"));
    }

    #[test]
    fn reopening_keeps_existing_rows() {
        let (dir, db) = open_temp();
        db.insert_tracks(&[record(1, "Today")]).expect("insert");

        let reopened =
            Database::open(&dir.path().join("nested").join("scrobbles.db")).expect("reopen");
        assert_eq!(reopened.fetch_latest_scrobbles().expect("fetch").len(), 1);
    }

    #[test]
    fn insert_and_fetch_returns_latest_first() {
        let (_dir, db) = open_temp();
        let inserted = db
            .insert_tracks(&[record(1, "Today"), record(2, "Last Week")])
            .expect("insert");
        let rows = db.fetch_latest_scrobbles().expect("fetch");

        assert_eq!(inserted, 2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].video_id, "vid2");
        assert_eq!(rows[1].video_id, "vid1");
    }

    #[test]
    fn insert_empty_slice_is_noop() {
        let (_dir, db) = open_temp();
        assert_eq!(db.insert_tracks(&[]).expect("insert"), 0);
        assert!(db.fetch_latest_scrobbles().expect("fetch").is_empty());
    }

    #[test]
    fn empty_album_round_trips_as_empty_string() {
        let (_dir, db) = open_temp();
        let mut single = record(1, "Today");
        single.album.clear();
        db.insert_tracks(&[single]).expect("insert");

        let rows = db.fetch_latest_scrobbles().expect("fetch");
        assert_eq!(rows[0].album, "");
    }

    #[test]
    fn delete_all_tracks_empties_table() {
        let (_dir, db) = open_temp();
        db.insert_tracks(&[record(1, "Today"), record(2, "Today")])
            .expect("insert");

        assert_eq!(db.delete_all_tracks().expect("delete"), 2);
        assert!(db.fetch_latest_scrobbles().expect("fetch").is_empty());
    }

    #[test]
    fn delete_except_latest_keeps_most_recent_rows() {
        let (_dir, db) = open_temp();
        let records: Vec<_> = (1..=5).map(|n| record(n, "Today")).collect();
        db.insert_tracks(&records).expect("insert");

        let deleted = db.delete_except_latest(2).expect("prune");
        let rows = db.fetch_latest_scrobbles().expect("fetch");

        assert_eq!(deleted, 3);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].video_id, "vid5");
        assert_eq!(rows[1].video_id, "vid4");
    }

    #[test]
    fn delete_except_latest_is_noop_below_limit() {
        let (_dir, db) = open_temp();
        db.insert_tracks(&[record(1, "Today"), record(2, "Today")])
            .expect("insert");

        assert_eq!(db.delete_except_latest(5).expect("prune"), 0);
        assert_eq!(db.fetch_latest_scrobbles().expect("fetch").len(), 2);
    }

    #[test]
    fn delete_except_latest_rejects_zero_without_mutation() {
        let (_dir, db) = open_temp();
        db.insert_tracks(&[record(1, "Today")]).expect("insert");

        let err = db
            .delete_except_latest(0)
            .expect_err("zero retention must be rejected");
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::InvalidRetention(0))
        );
        assert_eq!(db.fetch_latest_scrobbles().expect("fetch").len(), 1);
    }
}
