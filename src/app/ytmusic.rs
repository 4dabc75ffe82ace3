use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::scrobbler::{HistorySource, RawArtist, RawTrack};
use crate::config::YtMusicSettings;
use crate::http::{Body, Request, RetryPolicy, send_with_retries};

const BROWSE_URL: &str = "https://music.youtube.com/youtubei/v1/browse";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const ORIGIN: &str = "https://music.youtube.com";
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0";
const HISTORY_BROWSE_ID: &str = "FEmusic_history";
const DELETED_TITLE: &str = "Song deleted";

/// Seconds before `expires_at` at which a token is already treated as stale.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// OAuth token file as written by the YouTube Music OAuth setup flow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub(crate) struct OAuthToken {
    pub(crate) access_token: String,
    pub(crate) refresh_token: String,
    #[serde(default)]
    pub(crate) expires_at: i64,
    #[serde(default = "default_token_type")]
    pub(crate) token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) expires_in: Option<i64>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

impl OAuthToken {
    pub(crate) fn is_expiring(&self, now: i64) -> bool {
        self.expires_at - EXPIRY_MARGIN_SECS <= now
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    expires_in: i64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
}

pub(crate) struct YtMusicClient {
    browse_url: String,
    token_url: String,
    auth_file: PathBuf,
    client_id: String,
    client_secret: String,
    token: OAuthToken,
    policy: RetryPolicy,
}

impl YtMusicClient {
    pub(crate) fn new(settings: &YtMusicSettings) -> Result<Self> {
        Self::with_endpoints(settings, BROWSE_URL, TOKEN_URL)
    }

    pub(crate) fn with_endpoints(
        settings: &YtMusicSettings,
        browse_url: &str,
        token_url: &str,
    ) -> Result<Self> {
        let raw = fs::read_to_string(&settings.auth_file).with_context(|| {
            format!("failed to read OAuth file {}", settings.auth_file.display())
        })?;
        let token: OAuthToken = serde_json::from_str(&raw).with_context(|| {
            format!("malformed OAuth file {}", settings.auth_file.display())
        })?;

        let client = Self {
            browse_url: browse_url.to_string(),
            token_url: token_url.to_string(),
            auth_file: settings.auth_file.clone(),
            client_id: settings.client_id.clone(),
            client_secret: settings.client_secret.clone(),
            token,
            policy: RetryPolicy::standard(),
        };
        log::info!("YouTube Music client initialized");
        Ok(client)
    }

    fn ensure_fresh_token(&mut self) -> Result<()> {
        let now = Utc::now().timestamp();
        if !self.token.is_expiring(now) {
            return Ok(());
        }

        log::debug!("Refreshing YouTube Music access token");
        let form = vec![
            ("client_id".to_string(), self.client_id.clone()),
            ("client_secret".to_string(), self.client_secret.clone()),
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), self.token.refresh_token.clone()),
        ];
        let body = send_with_retries(
            &Request::post(&self.token_url, Body::Form(&form)),
            &self.policy,
        )
        .map_err(|err| anyhow!("YouTube Music token refresh failed: {err}"))?;
        let refreshed: RefreshResponse =
            serde_json::from_str(&body).context("unexpected token refresh response")?;

        self.token.access_token = refreshed.access_token;
        self.token.expires_at = now + refreshed.expires_in;
        self.token.expires_in = Some(refreshed.expires_in);
        if let Some(scope) = refreshed.scope {
            self.token.scope = Some(scope);
        }
        if let Some(token_type) = refreshed.token_type {
            self.token.token_type = token_type;
        }

        let serialized = serde_json::to_string_pretty(&self.token)?;
        fs::write(&self.auth_file, serialized).with_context(|| {
            format!("failed to write OAuth file {}", self.auth_file.display())
        })?;
        Ok(())
    }
}

impl HistorySource for YtMusicClient {
    fn get_history(&mut self) -> Result<Vec<RawTrack>> {
        self.ensure_fresh_token()?;

        let payload = json!({
            "context": {
                "client": {
                    "clientName": "WEB_REMIX",
                    "clientVersion": format!("1.{}.01.00", Utc::now().format("%Y%m%d")),
                    "hl": "en",
                },
                "user": {},
            },
            "browseId": HISTORY_BROWSE_ID,
        })
        .to_string();
        let headers = vec![
            (
                "Authorization".to_string(),
                format!("{} {}", self.token.token_type, self.token.access_token),
            ),
            ("User-Agent".to_string(), USER_AGENT.to_string()),
            ("Origin".to_string(), ORIGIN.to_string()),
            ("X-Origin".to_string(), ORIGIN.to_string()),
            ("X-Goog-AuthUser".to_string(), "0".to_string()),
        ];
        let query = vec![
            ("alt".to_string(), "json".to_string()),
            ("prettyPrint".to_string(), "false".to_string()),
        ];
        let request = Request {
            method: "POST",
            url: &self.browse_url,
            headers: &headers,
            query: &query,
            body: Body::Json(&payload),
        };

        let body = send_with_retries(&request, &self.policy).map_err(|err| {
            log::error!("Failed to fetch YouTube Music history: {err}");
            anyhow!("YouTube Music history request failed: {err}")
        })?;
        parse_history_response(&body)
    }
}

/// Flattens the history page into entries, newest first.
///
/// Each shelf is one played-at bucket ("Today", "Yesterday", ...).
pub(crate) fn parse_history_response(raw: &str) -> Result<Vec<RawTrack>> {
    let parsed: Value = serde_json::from_str(raw).context("history response is not JSON")?;
    let sections = parsed
        .pointer("/contents/singleColumnBrowseResultsRenderer/tabs/0/tabRenderer/content/sectionListRenderer/contents")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("history response is missing the section list"))?;

    let mut tracks = Vec::new();
    for section in sections {
        let Some(shelf) = section.get("musicShelfRenderer") else {
            continue;
        };
        let played = shelf
            .pointer("/title/runs/0/text")
            .and_then(Value::as_str)
            .map(str::to_string);
        let Some(items) = shelf.get("contents").and_then(Value::as_array) else {
            continue;
        };

        tracks.extend(
            items
                .iter()
                .filter_map(|item| item.get("musicResponsiveListItemRenderer"))
                .filter_map(|renderer| parse_history_item(renderer, played.as_deref())),
        );
    }
    Ok(tracks)
}

fn parse_history_item(renderer: &Value, played: Option<&str>) -> Option<RawTrack> {
    let title_run = column_runs(renderer, 0).and_then(|runs| runs.first());
    let title = title_run
        .and_then(|run| run.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string);
    if title.as_deref() == Some(DELETED_TITLE) {
        return None;
    }

    let video_id = [
        renderer.pointer("/playlistItemData/videoId"),
        renderer.pointer("/overlay/musicItemThumbnailOverlayRenderer/content/musicPlayButtonRenderer/playNavigationEndpoint/watchEndpoint/videoId"),
        title_run.and_then(|run| run.pointer("/navigationEndpoint/watchEndpoint/videoId")),
    ]
    .into_iter()
    .flatten()
    .find_map(Value::as_str)
    .map(str::to_string);

    // Artist names sit on even runs; odd runs are " & " / " • " separators.
    let artists = column_runs(renderer, 1).map(|runs| {
        runs.iter()
            .step_by(2)
            .filter_map(|run| {
                let name = run.get("text")?.as_str()?;
                Some(RawArtist {
                    name: name.to_string(),
                    browse_id: run
                        .pointer("/navigationEndpoint/browseEndpoint/browseId")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                })
            })
            .collect::<Vec<_>>()
    });

    let album = column_runs(renderer, 2)
        .and_then(|runs| runs.first())
        .filter(|run| run.pointer("/navigationEndpoint/browseEndpoint").is_some())
        .and_then(|run| run.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Some(RawTrack {
        video_id,
        title,
        artists,
        album,
        played: played.map(str::to_string),
    })
}

fn column_runs(renderer: &Value, column: usize) -> Option<&Vec<Value>> {
    renderer
        .get("flexColumns")?
        .get(column)?
        .pointer("/musicResponsiveListItemFlexColumnRenderer/text/runs")?
        .as_array()
}
