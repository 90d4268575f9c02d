//! Mock platform adapter for testing
//!
//! A configurable adapter that can simulate successes, specific failures,
//! latency, transient faults, and even panics. Available in all builds so
//! integration tests can drive the connector and publisher without network
//! access or real credentials.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};

/// Configuration for mock adapter behavior
#[derive(Clone)]
pub struct MockConfig {
    pub platform: Platform,

    /// Error to return from authenticate, if any
    pub auth_error: Option<PlatformError>,

    /// Error to return from post, if any
    pub post_error: Option<PlatformError>,

    /// Error to return from restore_session, if any
    pub restore_error: Option<PlatformError>,

    /// Fail the first N post calls with a transient error, then succeed.
    /// Exercises the retry path.
    pub transient_failures: usize,

    /// Panic inside post (for isolation tests)
    pub panic_on_post: bool,

    /// Delay before completing operations
    pub delay: Duration,

    pub auth_calls: Arc<AtomicUsize>,
    pub post_calls: Arc<AtomicUsize>,
    pub restore_calls: Arc<AtomicUsize>,

    /// Content that reached post (for verification)
    pub posted: Arc<Mutex<Vec<String>>>,
}

impl MockConfig {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            auth_error: None,
            post_error: None,
            restore_error: None,
            transient_failures: 0,
            panic_on_post: false,
            delay: Duration::from_millis(0),
            auth_calls: Arc::new(AtomicUsize::new(0)),
            post_calls: Arc::new(AtomicUsize::new(0)),
            restore_calls: Arc::new(AtomicUsize::new(0)),
            posted: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock adapter for testing
pub struct MockClient {
    config: MockConfig,
    remaining_transient: AtomicUsize,
}

impl MockClient {
    pub fn new(config: MockConfig) -> Self {
        let remaining = config.transient_failures;
        Self {
            config,
            remaining_transient: AtomicUsize::new(remaining),
        }
    }

    /// Adapter that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockConfig::new(platform))
    }

    /// Adapter whose authenticate fails with the given error
    pub fn auth_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.auth_error = Some(error);
        Self::new(config)
    }

    /// Adapter whose post fails with the given error
    pub fn post_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.post_error = Some(error);
        Self::new(config)
    }

    /// Adapter whose restore_session fails with the given error
    pub fn restore_failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockConfig::new(platform);
        config.restore_error = Some(error);
        Self::new(config)
    }

    /// Adapter that fails the first `n` post calls transiently
    pub fn flaky(platform: Platform, n: usize) -> Self {
        let mut config = MockConfig::new(platform);
        config.transient_failures = n;
        Self::new(config)
    }

    /// Adapter that panics inside post
    pub fn panicking(platform: Platform) -> Self {
        let mut config = MockConfig::new(platform);
        config.panic_on_post = true;
        Self::new(config)
    }

    /// Adapter that sleeps before every operation
    pub fn slow(platform: Platform, delay: Duration) -> Self {
        let mut config = MockConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn auth_calls(&self) -> usize {
        self.config.auth_calls.load(Ordering::SeqCst)
    }

    pub fn post_calls(&self) -> usize {
        self.config.post_calls.load(Ordering::SeqCst)
    }

    pub fn restore_calls(&self) -> usize {
        self.config.restore_calls.load(Ordering::SeqCst)
    }

    pub fn posted(&self) -> Vec<String> {
        self.config.posted.lock().unwrap().clone()
    }

    /// Session material this mock considers valid
    pub fn session(&self) -> SessionData {
        SessionData::new(json!({
            "mock": true,
            "platform": self.config.platform.as_str(),
        }))
    }
}

#[async_trait]
impl PlatformClient for MockClient {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<(SessionData, AccountIdentity)> {
        self.config.auth_calls.fetch_add(1, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.auth_error {
            return Err(error.clone().into());
        }

        let username = match credentials {
            Credentials::Password { username, .. } => username.clone(),
            Credentials::Phone { phone, .. } => phone.clone(),
            Credentials::OAuthCode { .. } => "oauth-user".to_string(),
        };

        let identity = AccountIdentity {
            external_user_id: format!("mock-{}", username),
            username: username.clone(),
            display_name: username,
            avatar_url: None,
            follower_count: 100,
        };

        Ok((self.session(), identity))
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        self.config.restore_calls.fetch_add(1, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.restore_error {
            return Err(error.clone().into());
        }

        if session.as_value().get("mock").is_none() {
            return Err(
                PlatformError::InvalidSession("not a mock session".to_string()).into(),
            );
        }
        Ok(())
    }

    async fn post(&self, _session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        self.config.post_calls.fetch_add(1, Ordering::SeqCst);

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if self.config.panic_on_post {
            panic!("mock adapter panic");
        }

        if let Some(error) = &self.config.post_error {
            return Err(error.clone().into());
        }

        // Count down transient failures before succeeding
        let remaining = self.remaining_transient.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_transient.store(remaining - 1, Ordering::SeqCst);
            return Err(PlatformError::Network("mock transient failure".to_string()).into());
        }

        self.config.posted.lock().unwrap().push(content.text.clone());

        let id = format!("{}-mock-{}", self.config.platform, uuid::Uuid::new_v4());
        Ok(PostOutcome {
            external_url: Some(format!("https://example.com/{}", id)),
            external_post_id: Some(id),
        })
    }

    fn platform(&self) -> Platform {
        self.config.platform
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn password_creds() -> Credentials {
        Credentials::Password {
            username: "alice".to_string(),
            password: "pw".to_string(),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_mock_success_flow() {
        let mock = MockClient::success(Platform::Twitter);

        let (session, identity) = mock.authenticate(&password_creds()).await.unwrap();
        assert_eq!(identity.username, "alice");
        assert_eq!(mock.auth_calls(), 1);

        mock.restore_session(&session).await.unwrap();

        let outcome = mock.post(&session, &PostContent::text("hi")).await.unwrap();
        assert!(outcome.external_post_id.is_some());
        assert_eq!(mock.post_calls(), 1);
        assert_eq!(mock.posted(), vec!["hi".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_auth_failure() {
        let mock = MockClient::auth_failure(
            Platform::Instagram,
            PlatformError::InvalidCredentials("wrong password".to_string()),
        );
        let err = mock.authenticate(&password_creds()).await.unwrap_err();
        assert!(err.to_string().contains("wrong password"));
        assert_eq!(mock.auth_calls(), 1);
    }

    #[tokio::test]
    async fn test_mock_flaky_recovers() {
        let mock = MockClient::flaky(Platform::Twitter, 1);
        let session = mock.session();

        let err = mock.post(&session, &PostContent::text("a")).await.unwrap_err();
        match err {
            crate::error::OmnicastError::Platform(e) => assert!(e.is_transient()),
            other => panic!("unexpected error: {}", other),
        }

        mock.post(&session, &PostContent::text("a")).await.unwrap();
        assert_eq!(mock.post_calls(), 2);
    }

    #[tokio::test]
    async fn test_mock_rejects_foreign_session() {
        let mock = MockClient::success(Platform::Twitter);
        let session = SessionData::new(json!({"access_token": "real"}));
        assert!(mock.restore_session(&session).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_delay() {
        let mock = MockClient::slow(Platform::Twitter, Duration::from_millis(50));
        let session = mock.session();

        let start = std::time::Instant::now();
        mock.post(&session, &PostContent::text("x")).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
