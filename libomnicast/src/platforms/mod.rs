//! Platform adapters
//!
//! One adapter per platform, all behind the same trait so the connector and
//! publisher can treat every platform uniformly. Adapters map their native
//! failures onto `PlatformError` and never surface raw HTTP errors.
//!
//! Credential shapes differ per platform: Twitter takes an OAuth code,
//! Instagram a username/password, Telegram a phone + verification code, and
//! TikTok/YouTube delegate their password login to the automation worker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{ConfigError, Result};
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};
use crate::worker::WorkerClient;

pub mod instagram;
pub mod telegram;
pub mod tiktok;
pub mod twitter;
pub mod youtube;

// Mock adapter is available for all builds to support integration tests
pub mod mock;

/// Unified adapter interface
///
/// `authenticate` runs a full login with fresh credentials and returns the
/// captured session plus the account's identity. `restore_session` checks
/// that previously captured material still works without posting anything.
/// `post` publishes one piece of content with an existing session.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    /// Log in with fresh credentials. Returns session material to be
    /// encrypted and stored, and the identity of the authenticated account.
    async fn authenticate(&self, credentials: &Credentials)
        -> Result<(SessionData, AccountIdentity)>;

    /// Verify that stored session material is still usable.
    ///
    /// Returns `PlatformError::SessionExpired` when the platform rejects it,
    /// `PlatformError::InvalidSession` when the material itself is malformed.
    async fn restore_session(&self, session: &SessionData) -> Result<()>;

    /// Publish content using an existing session
    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome>;

    /// Which platform this adapter serves
    fn platform(&self) -> Platform;
}

/// Adapter lookup keyed by platform.
///
/// Built once at startup from config; unconfigured platforms simply have no
/// entry and resolve to `ConfigError::PlatformNotConfigured`.
#[derive(Clone, Default)]
pub struct PlatformRegistry {
    adapters: HashMap<Platform, Arc<dyn PlatformClient>>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry for every platform the config enables
    pub fn from_config(config: &Config) -> Self {
        let mut registry = Self::new();
        let worker = WorkerClient::new(&config.worker);

        if let Some(app) = &config.twitter {
            registry.register(Arc::new(twitter::TwitterClient::new(app.clone())));
        }
        if let Some(ig) = &config.instagram {
            registry.register(Arc::new(instagram::InstagramClient::new(ig.clone())));
        }
        if let Some(tg) = &config.telegram {
            registry.register(Arc::new(telegram::TelegramClient::new(tg.clone())));
        }
        registry.register(Arc::new(tiktok::TikTokClient::new(worker.clone())));
        registry.register(Arc::new(youtube::YouTubeClient::new(worker)));

        registry
    }

    pub fn register(&mut self, adapter: Arc<dyn PlatformClient>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Result<Arc<dyn PlatformClient>> {
        self.adapters
            .get(&platform)
            .cloned()
            .ok_or_else(|| ConfigError::PlatformNotConfigured(platform.to_string()).into())
    }

    pub fn platforms(&self) -> Vec<Platform> {
        let mut platforms: Vec<Platform> = self.adapters.keys().copied().collect();
        platforms.sort_by_key(|p| p.as_str());
        platforms
    }
}
