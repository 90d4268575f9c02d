//! Configuration management for Omnicast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::types::Platform;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    pub twitter: Option<OAuthAppConfig>,
    pub telegram: Option<TelegramConfig>,
    pub instagram: Option<InstagramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

/// Where the at-rest session passphrase comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// File containing the passphrase used to encrypt session blobs.
    /// `OMNICAST_SESSION_KEY` overrides it.
    pub passphrase_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Base URL of the browser-automation worker
    pub url: String,
    /// Seconds to wait for a worker health probe
    pub health_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:3001".to_string(),
            health_timeout_secs: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    /// Maximum in-flight posts per platform during fan-out
    pub per_platform_concurrency: usize,
    /// Per-call timeout for text posts, in seconds
    pub call_timeout_secs: u64,
    /// Per-call timeout when media is attached, in seconds
    pub media_timeout_secs: u64,
    /// Callback URL registered with the OAuth apps
    pub redirect_uri: String,
    /// Minutes before an issued OAuth state expires
    pub oauth_state_ttl_mins: i64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            per_platform_concurrency: 4,
            call_timeout_secs: 45,
            media_timeout_secs: 120,
            redirect_uri: "http://localhost:3000/connect/callback".to_string(),
            oauth_state_ttl_mins: 10,
        }
    }
}

/// OAuth application registration for one platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthAppConfig {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub profile_url: String,
    pub scopes: Vec<String>,
}

impl OAuthAppConfig {
    /// Registration defaults for Twitter's v2 OAuth surface
    pub fn twitter_defaults(client_id: String, client_secret: String) -> Self {
        Self {
            client_id,
            client_secret,
            auth_url: "https://twitter.com/i/oauth2/authorize".to_string(),
            token_url: "https://api.twitter.com/2/oauth2/token".to_string(),
            profile_url: "https://api.twitter.com/2/users/me".to_string(),
            scopes: vec![
                "tweet.read".to_string(),
                "tweet.write".to_string(),
                "users.read".to_string(),
                "offline.access".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub api_id: i64,
    pub api_hash: String,
    /// Auth gateway base URL; override for self-hosted gateways or tests
    #[serde(default = "default_telegram_base")]
    pub api_base: String,
}

fn default_telegram_base() -> String {
    "https://my.telegram.org".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstagramConfig {
    /// Web API base; override in tests
    #[serde(default = "default_instagram_base")]
    pub api_base: String,
}

fn default_instagram_base() -> String {
    "https://www.instagram.com".to_string()
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            database: DatabaseConfig {
                path: "~/.local/share/omnicast/omnicast.db".to_string(),
            },
            session: SessionConfig {
                passphrase_file: "~/.config/omnicast/session.key".to_string(),
            },
            worker: WorkerConfig::default(),
            publish: PublishConfig::default(),
            twitter: None,
            telegram: None,
            instagram: Some(InstagramConfig {
                api_base: default_instagram_base(),
            }),
        }
    }

    /// OAuth app registration for a platform, or an error naming it
    pub fn oauth_app(&self, platform: Platform) -> Result<&OAuthAppConfig> {
        match platform {
            Platform::Twitter => self.twitter.as_ref(),
            _ => None,
        }
        .ok_or_else(|| ConfigError::PlatformNotConfigured(platform.to_string()).into())
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("OMNICAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("omnicast").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default_config();
        assert!(config.database.path.contains("omnicast"));
        assert_eq!(config.publish.per_platform_concurrency, 4);
        assert_eq!(config.publish.oauth_state_ttl_mins, 10);
        assert!(config.twitter.is_none());
    }

    #[test]
    fn test_oauth_app_not_configured() {
        let config = Config::default_config();
        let result = config.oauth_app(Platform::Twitter);
        assert!(result.is_err());
        assert!(format!("{}", result.unwrap_err()).contains("twitter"));
    }

    #[test]
    fn test_twitter_defaults() {
        let app = OAuthAppConfig::twitter_defaults("id".to_string(), "secret".to_string());
        assert!(app.auth_url.contains("oauth2/authorize"));
        assert!(app.scopes.contains(&"tweet.write".to_string()));
    }

    #[test]
    fn test_parse_minimal_toml() {
        let toml_str = r#"
            [database]
            path = ":memory:"

            [session]
            passphrase_file = "/tmp/session.key"

            [twitter]
            client_id = "abc"
            client_secret = "def"
            auth_url = "https://twitter.com/i/oauth2/authorize"
            token_url = "https://api.twitter.com/2/oauth2/token"
            profile_url = "https://api.twitter.com/2/users/me"
            scopes = ["tweet.read", "tweet.write"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.path, ":memory:");
        assert_eq!(config.worker.url, "http://localhost:3001");
        assert_eq!(config.publish.call_timeout_secs, 45);
        assert!(config.oauth_app(Platform::Twitter).is_ok());
    }
}
