use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::models::CapturedProfile;
use crate::session::SessionCache;

const SESSION_ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadPayload {
    pub session_id: String,
    pub session_start: Option<DateTime<Utc>>,
    pub session_end: DateTime<Utc>,
    pub profile_count: usize,
    pub profiles: Vec<CapturedProfile>,
    pub metadata: UploadMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadMetadata {
    pub extension_version: String,
    pub browser: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReport {
    pub success: bool,
    pub session_id: Option<String>,
    pub profile_count: usize,
    pub attempts: u32,
    pub profiles_kept_in_cache: bool,
    pub message: String,
    pub response: Option<Value>,
}

/// Sends one session payload. Implementations report any non-2xx or
/// non-JSON response as an error.
pub trait Uploader {
    fn send(&self, payload: &UploadPayload) -> Result<Value>;
    fn endpoint(&self) -> &str;
}

pub struct HttpUploader {
    endpoint: String,
    client: reqwest::blocking::Client,
}

impl HttpUploader {
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            endpoint: settings.api_endpoint.clone(),
            client,
        })
    }
}

impl Uploader for HttpUploader {
    fn send(&self, payload: &UploadPayload) -> Result<Value> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("content-type", "application/json")
            .json(payload)
            .send()
            .with_context(|| format!("Failed to reach {}", self.endpoint))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!("Upload failed with status {}: {}", status, error_text));
        }

        response.json().context("Upload response was not JSON")
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// `session_<epoch millis>_<9 base-36 chars>`.
pub fn new_session_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| SESSION_ID_ALPHABET[rng.gen_range(0..SESSION_ID_ALPHABET.len())] as char)
        .collect();
    format!("session_{}_{}", now.timestamp_millis(), suffix)
}

/// Uploads the session cache with fixed-delay retries. On success the cache
/// is cleared when `clear_after_send` is set; on failure it is left intact.
pub fn upload_session(
    uploader: &dyn Uploader,
    cache: &SessionCache,
    settings: &SyncSettings,
) -> Result<UploadReport> {
    let session = cache.load()?;
    if session.profiles.is_empty() {
        return Ok(UploadReport {
            success: true,
            session_id: None,
            profile_count: 0,
            attempts: 0,
            profiles_kept_in_cache: false,
            message: "No profiles to send".to_string(),
            response: None,
        });
    }

    let now = Utc::now();
    let payload = UploadPayload {
        session_id: new_session_id(now),
        session_start: session.session_start,
        session_end: now,
        profile_count: session.profiles.len(),
        profiles: session.profiles,
        metadata: UploadMetadata {
            extension_version: env!("CARGO_PKG_VERSION").to_string(),
            browser: "autofill-cli".to_string(),
            timestamp: now,
        },
    };
    info!(
        "Uploading {} profiles to {} as {}",
        payload.profile_count,
        uploader.endpoint(),
        payload.session_id
    );

    let attempts = settings.retry_attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match uploader.send(&payload) {
            Ok(response) => {
                debug!("Upload accepted on attempt {}", attempt);
                if settings.clear_after_send {
                    cache.clear()?;
                }
                return Ok(UploadReport {
                    success: true,
                    session_id: Some(payload.session_id),
                    profile_count: payload.profile_count,
                    attempts: attempt,
                    profiles_kept_in_cache: !settings.clear_after_send,
                    message: format!("Sent {} profiles", payload.profile_count),
                    response: Some(response),
                });
            }
            Err(e) => {
                warn!("Upload attempt {}/{} failed: {:#}", attempt, attempts, e);
                last_error = Some(e);
                if attempt < attempts {
                    std::thread::sleep(Duration::from_millis(settings.retry_delay_ms));
                }
            }
        }
    }

    let reason = last_error.map(|e| format!("{:#}", e)).unwrap_or_default();
    Ok(UploadReport {
        success: false,
        session_id: Some(payload.session_id),
        profile_count: payload.profile_count,
        attempts,
        profiles_kept_in_cache: true,
        message: format!(
            "Upload failed after {} attempts ({}). {} profiles kept in cache.",
            attempts, reason, payload.profile_count
        ),
        response: None,
    })
}
