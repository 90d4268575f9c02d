//! YouTube adapter, delegated to the automation worker
//!
//! Uploads go up as Shorts. The video title comes from the post's explicit
//! title when set, otherwise from an excerpt of the text.

use async_trait::async_trait;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};
use crate::worker::WorkerClient;

pub struct YouTubeClient {
    worker: WorkerClient,
}

impl YouTubeClient {
    pub fn new(worker: WorkerClient) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl PlatformClient for YouTubeClient {
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
                    "youtube expects a username and password".to_string(),
                )
                .into())
            }
        };

        self.worker
            .login(Platform::YouTube, username, password)
            .await
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        if session.as_value().get("cookies").is_none() {
            return Err(
                PlatformError::InvalidSession("youtube session missing cookies".to_string()).into(),
            );
        }
        self.worker.ensure_available().await
    }

    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        if !content.has_video() {
            return Err(PlatformError::UnsupportedContent(
                "youtube requires a video attachment".to_string(),
            )
            .into());
        }

        self.worker.upload(Platform::YouTube, session, content).await
    }

    fn platform(&self) -> Platform {
        Platform::YouTube
    }
}
