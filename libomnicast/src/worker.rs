//! Client for the browser-automation worker
//!
//! TikTok and YouTube have no usable posting API, so their adapters delegate
//! to an external worker process that drives a real browser. The worker
//! exposes a small JSON surface: GET /health, POST /login, POST /upload.
//! Every delegated call is gated on a health probe first so a dead worker
//! fails fast with `WorkerUnavailable` instead of timing out mid-upload.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::WorkerConfig;
use crate::error::{PlatformError, Result};
use crate::session::SessionData;
use crate::types::{AccountIdentity, Platform, PostContent, PostOutcome};

#[derive(Clone)]
pub struct WorkerClient {
    http: reqwest::Client,
    base_url: String,
    health_timeout: Duration,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    platform: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Deserialize)]
struct LoginResponse {
    session: serde_json::Value,
    #[serde(default)]
    user_id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    display_name: String,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    follower_count: i64,
}

#[derive(Serialize)]
struct UploadRequest<'a> {
    platform: &'a str,
    session: &'a serde_json::Value,
    text: &'a str,
    media_path: Option<&'a str>,
    title: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    post_id: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Deserialize)]
struct WorkerError {
    #[serde(default)]
    error: String,
}

impl WorkerClient {
    pub fn new(config: &WorkerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            health_timeout: Duration::from_secs(config.health_timeout_secs),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Probe the worker. Any failure (refused, timed out, non-2xx) reads as
    /// unhealthy; the probe never errors.
    pub async fn health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self
            .http
            .get(&url)
            .timeout(self.health_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "worker health probe failed");
                false
            }
        }
    }

    pub async fn ensure_available(&self) -> Result<()> {
        if self.health().await {
            Ok(())
        } else {
            Err(PlatformError::WorkerUnavailable(format!(
                "no healthy worker at {}",
                self.base_url
            ))
            .into())
        }
    }

    /// Log in through the worker's driven browser and return the captured
    /// session plus whatever identity fields the worker scraped.
    pub async fn login(
        &self,
        platform: Platform,
        username: &str,
        password: &str,
    ) -> Result<(SessionData, AccountIdentity)> {
        self.ensure_available().await?;

        let url = format!("{}/login", self.base_url);
        let body = LoginRequest {
            platform: platform.as_str(),
            username,
            password,
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_worker_error(platform, status, response).await.into());
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad worker login response: {}", e)))?;

        let identity = AccountIdentity {
            external_user_id: if login.user_id.is_empty() {
                login.username.clone()
            } else {
                login.user_id
            },
            username: login.username,
            display_name: login.display_name,
            avatar_url: login.avatar_url,
            follower_count: login.follower_count,
        };

        Ok((SessionData::new(login.session), identity))
    }

    /// Upload content through the worker using a previously captured session
    pub async fn upload(
        &self,
        platform: Platform,
        session: &SessionData,
        content: &PostContent,
    ) -> Result<PostOutcome> {
        self.ensure_available().await?;

        let url = format!("{}/upload", self.base_url);
        let body = UploadRequest {
            platform: platform.as_str(),
            session: session.as_value(),
            text: &content.text,
            media_path: content.media_path.as_deref(),
            title: content.title_or_excerpt(),
        };

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(map_worker_error(platform, status, response).await.into());
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad worker upload response: {}", e)))?;

        Ok(PostOutcome {
            external_post_id: upload.post_id,
            external_url: upload.url,
        })
    }
}

/// Map a worker error response onto the adapter taxonomy. 401 means the
/// captured session no longer works; 5xx is the worker itself misbehaving.
async fn map_worker_error(
    platform: Platform,
    status: reqwest::StatusCode,
    response: reqwest::Response,
) -> PlatformError {
    let detail = response
        .json::<WorkerError>()
        .await
        .map(|e| e.error)
        .unwrap_or_default();
    let detail = if detail.is_empty() {
        format!("worker returned {}", status)
    } else {
        detail
    };

    match status.as_u16() {
        401 => PlatformError::SessionExpired(format!("{}: {}", platform, detail)),
        403 => PlatformError::InvalidCredentials(format!("{}: {}", platform, detail)),
        422 => PlatformError::UnsupportedContent(format!("{}: {}", platform, detail)),
        500..=599 => PlatformError::WorkerUnavailable(format!("{}: {}", platform, detail)),
        _ => PlatformError::Unknown(format!("{}: {}", platform, detail)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str) -> WorkerClient {
        WorkerClient::new(&WorkerConfig {
            url: url.to_string(),
            health_timeout_secs: 1,
        })
    }

    #[test]
    fn test_base_url_normalized() {
        let client = client("http://localhost:3001/");
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[tokio::test]
    async fn test_health_false_when_unreachable() {
        // Reserved TEST-NET-1 address, nothing listens there
        let client = client("http://192.0.2.1:9");
        assert!(!client.health().await);
    }

    #[tokio::test]
    async fn test_login_gated_on_health() {
        let client = client("http://192.0.2.1:9");
        let err = client
            .login(Platform::TikTok, "user", "pass")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::WorkerUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_upload_gated_on_health() {
        let client = client("http://192.0.2.1:9");
        let session = SessionData::new(serde_json::json!({"cookie": "x"}));
        let err = client
            .upload(Platform::YouTube, &session, &PostContent::text("hi"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::WorkerUnavailable(_))
        ));
    }
}
