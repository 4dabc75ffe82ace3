//! Process configuration read from the environment.
//!
//! Sections are nested with a double underscore, e.g. `LASTFM__API_KEY`.
//! A dotenv file may seed the environment; real variables win.

use std::path::{Path, PathBuf};

use anyhow::Result;
use thiserror::Error;

use crate::paths::database_file_path;

/// Largest batch Last.fm accepts in one `track.scrobble` call.
pub const MAX_BATCH_SIZE: usize = 50;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {var}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: &'static str,
    },
    #[error("auth file not found: {0}")]
    AuthFileNotFound(PathBuf),
}

#[derive(Debug, Clone)]
pub struct LastFmSettings {
    pub api_key: String,
    pub shared_secret: String,
    pub registered_to: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct YtMusicSettings {
    pub auth_file: PathBuf,
    pub client_id: String,
    pub client_secret: String,
}

/// Tunables consumed by the scrobbling run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrobblerSettings {
    /// Matching tracks required before history is considered to overlap the log.
    pub sequence_match_length: usize,
    pub batch_size: usize,
    /// Rows kept in the database after a run.
    pub max_synced_tracks: usize,
}

impl Default for ScrobblerSettings {
    fn default() -> Self {
        Self {
            sequence_match_length: 50,
            batch_size: 50,
            max_synced_tracks: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub lastfm: LastFmSettings,
    pub ytmusic: YtMusicSettings,
    pub db_path: PathBuf,
    pub scrobbler: ScrobblerSettings,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let settings = Self::from_lookup(|key| std::env::var(key).ok())?;
        log::info!(
            "Configuration loaded: user={}, db={}, match_length={}, batch_size={}, keep={}",
            settings.lastfm.registered_to,
            settings.db_path.display(),
            settings.scrobbler.sequence_match_length,
            settings.scrobbler.batch_size,
            settings.scrobbler.max_synced_tracks
        );
        Ok(settings)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &'static str| -> Result<String, ConfigError> {
            // Blank counts as missing, but values are passed through untouched:
            // the password and shared secret are hashed byte for byte.
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or(ConfigError::Missing(key))
        };

        let lastfm = LastFmSettings {
            api_key: required("LASTFM__API_KEY")?,
            shared_secret: required("LASTFM__SHARED_SECRET")?,
            registered_to: required("LASTFM__REGISTERED_TO")?,
            password: required("LASTFM__PASSWORD")?,
        };

        let auth_file = PathBuf::from(required("YTMUSIC__AUTH_FILE")?);
        if !auth_file.is_file() {
            return Err(ConfigError::AuthFileNotFound(auth_file).into());
        }
        let ytmusic = YtMusicSettings {
            auth_file,
            client_id: required("YTMUSIC__CLIENT_ID")?,
            client_secret: required("YTMUSIC__CLIENT_SECRET")?,
        };

        Ok(Self {
            lastfm,
            ytmusic,
            db_path: db_path_from_lookup(&lookup)?,
            scrobbler: scrobbler_from_lookup(&lookup)?,
        })
    }
}

/// Database location alone, for commands that never talk to a remote service.
pub fn db_path_from_env() -> Result<PathBuf> {
    db_path_from_lookup(&|key: &str| std::env::var(key).ok())
}

fn db_path_from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<PathBuf> {
    match lookup("SQLITE__DB_PATH").filter(|value| !value.trim().is_empty()) {
        Some(path) => Ok(Path::new(path.trim()).to_path_buf()),
        None => database_file_path(),
    }
}

fn scrobbler_from_lookup(
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<ScrobblerSettings, ConfigError> {
    let defaults = ScrobblerSettings::default();
    let positive = |var: &'static str, default: usize| -> Result<usize, ConfigError> {
        let Some(raw) = lookup(var) else {
            return Ok(default);
        };
        match raw.trim().parse::<usize>() {
            Ok(value) if value >= 1 => Ok(value),
            _ => Err(ConfigError::Invalid {
                var,
                value: raw,
                reason: "expected a positive integer",
            }),
        }
    };

    let batch_size = positive("SCROBBLER__BATCH_SIZE", defaults.batch_size)?;
    if batch_size > MAX_BATCH_SIZE {
        return Err(ConfigError::Invalid {
            var: "SCROBBLER__BATCH_SIZE",
            value: batch_size.to_string(),
            reason: "Last.fm accepts at most 50 scrobbles per request",
        });
    }

    Ok(ScrobblerSettings {
        sequence_match_length: positive(
            "SCROBBLER__SEQUENCE_MATCH_LENGTH",
            defaults.sequence_match_length,
        )?,
        batch_size,
        max_synced_tracks: positive("SCROBBLER__MAX_SYNCED_TRACKS", defaults.max_synced_tracks)?,
    })
}
