use anyhow::{Context, Result, anyhow, bail};
use serde_json::Value;

use super::scrobbler::ScrobbleSink;
use crate::config::{LastFmSettings, MAX_BATCH_SIZE};
use crate::db::PlayRecord;
use crate::http::{Body, Request, RetryPolicy, send_with_retries};

const API_URL: &str = "https://ws.audioscrobbler.com/2.0/";

pub(crate) fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Request signature: every parameter except `format`/`callback`, sorted by
/// name, concatenated as name+value, followed by the shared secret.
pub(crate) fn sign(params: &[(String, String)], secret: &str) -> String {
    let mut sorted = params
        .iter()
        .filter(|(key, _)| key != "format" && key != "callback")
        .collect::<Vec<_>>();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));

    let mut payload = String::new();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }
    payload.push_str(secret);
    md5_hex(&payload)
}

pub(crate) fn scrobble_params(batch: &[PlayRecord]) -> Result<Vec<(String, String)>> {
    if batch.len() > MAX_BATCH_SIZE {
        bail!(
            "cannot scrobble {} tracks in one request (limit {MAX_BATCH_SIZE})",
            batch.len()
        );
    }

    let mut params = vec![("method".to_string(), "track.scrobble".to_string())];
    for (idx, track) in batch.iter().enumerate() {
        let timestamp = track
            .submitted_at
            .with_context(|| format!("track '{}' has no scrobble timestamp", track.title))?;
        params.push((format!("artist[{idx}]"), track.artist.clone()));
        params.push((format!("track[{idx}]"), track.title.clone()));
        params.push((format!("timestamp[{idx}]"), timestamp.to_string()));
        if !track.album.is_empty() {
            params.push((format!("album[{idx}]"), track.album.clone()));
        }
    }
    Ok(params)
}

fn api_error(parsed: &Value) -> Option<String> {
    let code = parsed.get("error")?;
    let message = parsed
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    Some(format!("Last.fm error {code}: {message}"))
}

fn count_field(value: Option<&Value>) -> u64 {
    match value {
        Some(Value::Number(number)) => number.as_u64().unwrap_or(0),
        Some(Value::String(text)) => text.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Accepted and ignored counts from a `track.scrobble` response.
pub(crate) fn scrobble_summary(parsed: &Value) -> Result<(u64, u64)> {
    if let Some(err) = api_error(parsed) {
        bail!(err);
    }
    let attr = parsed
        .pointer("/scrobbles/@attr")
        .ok_or_else(|| anyhow!("scrobble response is missing the summary"))?;
    Ok((
        count_field(attr.get("accepted")),
        count_field(attr.get("ignored")),
    ))
}

pub(crate) struct LastFmClient {
    api_url: String,
    api_key: String,
    shared_secret: String,
    session_key: String,
}

impl LastFmClient {
    /// Authenticates with a mobile session; fails before anything is scrobbled.
    pub(crate) fn connect(settings: &LastFmSettings) -> Result<Self> {
        Self::connect_to(settings, API_URL)
    }

    pub(crate) fn connect_to(settings: &LastFmSettings, api_url: &str) -> Result<Self> {
        let mut client = Self {
            api_url: api_url.to_string(),
            api_key: settings.api_key.clone(),
            shared_secret: settings.shared_secret.clone(),
            session_key: String::new(),
        };

        let auth_token = md5_hex(&format!(
            "{}{}",
            settings.registered_to,
            md5_hex(&settings.password)
        ));
        let parsed = client
            .call(
                vec![
                    ("method".to_string(), "auth.getMobileSession".to_string()),
                    ("username".to_string(), settings.registered_to.clone()),
                    ("authToken".to_string(), auth_token),
                ],
                &RetryPolicy::standard(),
            )
            .inspect_err(|err| log::error!("Last.fm authentication failed: {err:#}"))?;

        client.session_key = parsed
            .pointer("/session/key")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("Last.fm session response is missing the key"))?
            .to_string();
        log::info!("Successfully authenticated with Last.fm");
        Ok(client)
    }

    fn call(&self, mut params: Vec<(String, String)>, policy: &RetryPolicy) -> Result<Value> {
        params.push(("api_key".to_string(), self.api_key.clone()));
        if !self.session_key.is_empty() {
            params.push(("sk".to_string(), self.session_key.clone()));
        }
        let signature = sign(&params, &self.shared_secret);
        params.push(("api_sig".to_string(), signature));
        params.push(("format".to_string(), "json".to_string()));

        let body = send_with_retries(&Request::post(&self.api_url, Body::Form(&params)), policy)
            .map_err(|err| anyhow!("Last.fm request failed: {err}"))?;
        let parsed: Value = serde_json::from_str(&body).context("Last.fm response is not JSON")?;
        if let Some(err) = api_error(&parsed) {
            bail!(err);
        }
        Ok(parsed)
    }
}

impl ScrobbleSink for LastFmClient {
    fn scrobble_many(&mut self, batch: &[PlayRecord]) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let params = scrobble_params(batch)?;
        let parsed = self.call(params, &RetryPolicy::once())?;
        let (accepted, ignored) = scrobble_summary(&parsed)?;
        if ignored > 0 {
            log::warn!("Last.fm accepted {accepted} and ignored {ignored} scrobbles");
        }
        Ok(())
    }
}
