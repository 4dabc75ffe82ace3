use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;

use super::overlap::find_overlap_start;
use crate::config::ScrobblerSettings;
use crate::db::{Database, PlayRecord};

/// Courtesy delay between submitted batches.
pub(crate) const BATCH_PAUSE: Duration = Duration::from_millis(500);

/// Suffix of view-count labels the history feed sometimes reports as an artist.
const VIEWS_SUFFIX: &str = " views";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawArtist {
    pub(crate) name: String,
    /// Channel browse id of a linked artist; view-count labels carry none.
    /// Only the name is scrobbled.
    #[allow(dead_code)]
    pub(crate) browse_id: Option<String>,
}

/// A history entry as the remote feed reports it, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RawTrack {
    pub(crate) video_id: Option<String>,
    pub(crate) title: Option<String>,
    pub(crate) artists: Option<Vec<RawArtist>>,
    pub(crate) album: Option<String>,
    pub(crate) played: Option<String>,
}

/// Recently played tracks, newest first.
pub(crate) trait HistorySource {
    fn get_history(&mut self) -> Result<Vec<RawTrack>>;
}

/// Accepts or rejects a whole batch of timestamped tracks.
pub(crate) trait ScrobbleSink {
    fn scrobble_many(&mut self, batch: &[PlayRecord]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunMode {
    /// Record tracks in the database without sending them to Last.fm.
    pub(crate) sync: bool,
    /// Touch neither Last.fm nor the database.
    pub(crate) dry_run: bool,
}

impl RunMode {
    pub(crate) fn scrobble() -> Self {
        Self::default()
    }

    pub(crate) fn sync() -> Self {
        Self {
            sync: true,
            dry_run: false,
        }
    }

    pub(crate) fn dry_run() -> Self {
        Self {
            sync: false,
            dry_run: true,
        }
    }

    fn submits(self) -> bool {
        !self.sync && !self.dry_run
    }

    fn persists(self) -> bool {
        !self.dry_run
    }
}

pub(crate) fn normalize_history(raw: Vec<RawTrack>) -> Vec<PlayRecord> {
    raw.into_iter().filter_map(normalize_track).collect()
}

fn normalize_track(track: RawTrack) -> Option<PlayRecord> {
    let video_id = track.video_id.filter(|id| !id.is_empty())?;
    let title = track.title?;
    let artist = track
        .artists?
        .iter()
        .map(|artist| artist.name.as_str())
        .filter(|name| !name.ends_with(VIEWS_SUFFIX))
        .collect::<Vec<_>>()
        .join(", ");
    if artist.is_empty() {
        return None;
    }

    Some(PlayRecord {
        video_id,
        title,
        artist,
        album: track.album.unwrap_or_default(),
        played: track.played.unwrap_or_default(),
        submitted_at: None,
    })
}

pub(crate) struct Scrobbler<'a> {
    db: &'a Database,
    settings: ScrobblerSettings,
    batch_pause: Duration,
}

impl<'a> Scrobbler<'a> {
    pub(crate) fn new(db: &'a Database, settings: ScrobblerSettings) -> Self {
        Self {
            db,
            settings,
            batch_pause: BATCH_PAUSE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_batch_pause(mut self, pause: Duration) -> Self {
        self.batch_pause = pause;
        self
    }

    /// One full reconciliation: detect new tracks, submit and record them, prune.
    pub(crate) fn run(
        &self,
        history: &mut impl HistorySource,
        sink: &mut impl ScrobbleSink,
        mode: RunMode,
    ) -> Result<Vec<PlayRecord>> {
        let tracks = self.tracks_to_scrobble(history)?;
        let scrobbled = self.scrobble_tracks(sink, tracks, mode)?;
        self.cleanup_database(mode)?;
        Ok(scrobbled)
    }

    /// History entries newer than the overlap with the stored log, newest first.
    pub(crate) fn tracks_to_scrobble(
        &self,
        history: &mut impl HistorySource,
    ) -> Result<Vec<PlayRecord>> {
        let raw = history
            .get_history()
            .context("failed to fetch YouTube Music history")?;
        log::info!("Fetched {} recent tracks from YouTube Music", raw.len());
        let mut tracks = normalize_history(raw);

        let min_overlap = self.settings.sequence_match_length;
        if tracks.len() < min_overlap {
            log::warn!(
                "Not enough YouTube Music history. Found {} entries but need at least {min_overlap}",
                tracks.len()
            );
            return Ok(Vec::new());
        }

        let stored = self.db.fetch_latest_scrobbles()?;
        let history_ids = tracks
            .iter()
            .map(|track| track.video_id.as_str())
            .collect::<Vec<_>>();
        let stored_ids = stored
            .iter()
            .map(|track| track.video_id.as_str())
            .collect::<Vec<_>>();

        match find_overlap_start(&history_ids, &stored_ids, min_overlap) {
            Some(idx) => {
                tracks.truncate(idx);
                log::info!(
                    "Found {} new tracks to scrobble (overlap at index {idx})",
                    tracks.len()
                );
            }
            None => log::info!("No overlap found with existing scrobbles"),
        }
        Ok(tracks)
    }

    /// Submits `tracks` oldest first in batches and records each accepted batch.
    ///
    /// A failed batch aborts the run; batches already recorded stay recorded so
    /// the next run's overlap detection skips them.
    pub(crate) fn scrobble_tracks(
        &self,
        sink: &mut impl ScrobbleSink,
        mut tracks: Vec<PlayRecord>,
        mode: RunMode,
    ) -> Result<Vec<PlayRecord>> {
        if tracks.is_empty() {
            log::info!("No new tracks to scrobble");
            return Ok(tracks);
        }

        let timestamp = Utc::now().timestamp();
        for track in &mut tracks {
            track.submitted_at = Some(timestamp);
        }
        tracks.reverse();

        let batch_size = self.settings.batch_size.max(1);
        let batch_count = tracks.len().div_ceil(batch_size);
        for (batch_no, batch) in tracks.chunks(batch_size).enumerate() {
            let start = batch_no * batch_size;
            if let Err(err) = self.process_batch(sink, batch, mode) {
                log::error!("Failed to scrobble batch starting at index {start}: {err:#}");
                return Err(err.context(format!("batch starting at index {start} failed")));
            }
            if mode.persists() && batch_no + 1 < batch_count {
                thread::sleep(self.batch_pause);
            }
        }

        Ok(tracks)
    }

    fn process_batch(
        &self,
        sink: &mut impl ScrobbleSink,
        batch: &[PlayRecord],
        mode: RunMode,
    ) -> Result<()> {
        if mode.submits() {
            sink.scrobble_many(batch)?;
            log::info!("Scrobbled {} tracks", batch.len());
        }

        if mode.persists() {
            self.db.insert_tracks(batch)?;
        } else {
            log::info!("Dry-run: skip inserting {} tracks in database", batch.len());
        }
        Ok(())
    }

    pub(crate) fn cleanup_database(&self, mode: RunMode) -> Result<usize> {
        let keep = self.settings.max_synced_tracks;
        if !mode.persists() {
            log::info!("Dry-run: skipped cleaning database to keep only {keep} entries");
            return Ok(0);
        }

        let deleted = self.db.delete_except_latest(keep)?;
        log::info!("Database cleaned up, removed {deleted} and kept latest {keep} entries");
        Ok(deleted)
    }
}
