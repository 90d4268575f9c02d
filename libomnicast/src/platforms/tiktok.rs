//! TikTok adapter, delegated to the automation worker

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};
use crate::worker::WorkerClient;

pub struct TikTokClient {
    worker: WorkerClient,
}

impl TikTokClient {
    pub fn new(worker: WorkerClient) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl PlatformClient for TikTokClient {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<(SessionData, AccountIdentity)> {
        let (username, password) = match credentials {
            Credentials::Password {
                username, password, ..
            } => (username, password),
            _ => {
                return Err(PlatformError::InvalidCredentials(
                    "tiktok expects a username and password".to_string(),
                )
                .into())
            }
        };

        self.worker.login(Platform::TikTok, username, password).await
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        // The worker holds the only code path that can exercise the session,
        // so restoration checks shape locally and worker liveness remotely.
        if session.as_value().get("cookies").is_none() {
            return Err(
                PlatformError::InvalidSession("tiktok session missing cookies".to_string()).into(),
            );
        }
        self.worker.ensure_available().await
    }

    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        if !content.has_video() {
            return Err(PlatformError::UnsupportedContent(
                "tiktok requires a video attachment".to_string(),
            )
            .into());
        }

        self.worker.upload(Platform::TikTok, session, content).await
    }

    fn platform(&self) -> Platform {
        Platform::TikTok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorkerConfig;
    use serde_json::json;

    fn client() -> TikTokClient {
        TikTokClient::new(WorkerClient::new(&WorkerConfig {
            url: "http://192.0.2.1:9".to_string(),
            health_timeout_secs: 1,
        }))
    }

    #[tokio::test]
    async fn test_wrong_credential_shape() {
        let creds = Credentials::OAuthCode {
            code: "c".to_string(),
            code_verifier: None,
            redirect_uri: "http://localhost/cb".to_string(),
        };
        let err = client().authenticate(&creds).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_text_only_unsupported() {
        let session = SessionData::new(json!({"cookies": []}));
        let err = client()
            .post(&session, &PostContent::text("no video"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::UnsupportedContent(_))
        ));
    }

    #[tokio::test]
    async fn test_dead_worker_surfaces_unavailable() {
        let session = SessionData::new(json!({"cookies": []}));
        let content = PostContent {
            text: "clip".to_string(),
            media_path: Some("/tmp/clip.mp4".to_string()),
            media_kind: Some(crate::types::MediaKind::Video),
            title: None,
        };
        let err = client().post(&session, &content).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::WorkerUnavailable(_))
        ));
    }
}
