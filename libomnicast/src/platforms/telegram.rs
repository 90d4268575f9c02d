//! Telegram adapter (two-step phone login)
//!
//! Login runs in two steps: `send_code` asks the gateway to text a
//! verification code to the phone and returns a code hash; the caller then
//! authenticates with the phone, the code the user received, and that hash.
//! Posting sends a message to the account's "Saved Messages" channel.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::TelegramConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};

pub struct TelegramClient {
    config: TelegramConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct SendCodeResponse {
    code_hash: String,
}

#[derive(Deserialize, Default)]
struct SignInResponse {
    #[serde(default)]
    session: String,
    #[serde(default)]
    user_id: i64,
    #[serde(default)]
    username: String,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
}

#[derive(Deserialize)]
struct SendMessageResponse {
    #[serde(default)]
    message_id: Option<i64>,
}

impl TelegramClient {
    pub fn new(config: TelegramConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    /// Step one of the login: request a verification code for the phone.
    /// Returns the code hash the caller must present in step two.
    pub async fn send_code(&self, phone: &str) -> Result<String> {
        let url = format!("{}/auth/send_code", self.config.api_base);
        let body = json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "phone": phone,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(PlatformError::InvalidCredentials(format!(
                "telegram rejected phone number ({})",
                response.status()
            ))
            .into());
        }

        let sent: SendCodeResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad send_code response: {}", e)))?;
        Ok(sent.code_hash)
    }

    fn session_token(session: &SessionData) -> Result<String> {
        session.get_str("session").map(str::to_string).ok_or_else(|| {
            PlatformError::InvalidSession("telegram session missing token".to_string()).into()
        })
    }
}

#[async_trait]
impl PlatformClient for TelegramClient {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<(SessionData, AccountIdentity)> {
        let (phone, code, code_hash) = match credentials {
            Credentials::Phone {
                phone,
                code,
                code_hash,
            } => (phone, code, code_hash),
            _ => {
                return Err(PlatformError::InvalidCredentials(
                    "telegram expects a phone number and verification code".to_string(),
                )
                .into())
            }
        };

        let url = format!("{}/auth/sign_in", self.config.api_base);
        let body = json!({
            "api_id": self.config.api_id,
            "api_hash": self.config.api_hash,
            "phone": phone,
            "code": code,
            "code_hash": code_hash,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(PlatformError::InvalidCredentials(
                "telegram rejected the verification code".to_string(),
            )
            .into());
        }
        if !status.is_success() {
            return Err(PlatformError::Unknown(format!("sign_in returned {}", status)).into());
        }

        let signin: SignInResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad sign_in response: {}", e)))?;

        if signin.session.is_empty() {
            return Err(
                PlatformError::Unknown("sign_in succeeded without a session".to_string()).into(),
            );
        }

        let display_name = format!("{} {}", signin.first_name, signin.last_name)
            .trim()
            .to_string();
        let identity = AccountIdentity {
            external_user_id: signin.user_id.to_string(),
            username: signin.username,
            display_name,
            avatar_url: None,
            follower_count: 0,
        };

        let session = SessionData::new(json!({
            "session": signin.session,
            "user_id": signin.user_id,
            "phone": phone,
        }));

        Ok((session, identity))
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        let token = Self::session_token(session)?;

        let url = format!("{}/auth/check", self.config.api_base);
        let response = self
            .http
            .post(&url)
            .json(&json!({ "session": token }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                PlatformError::SessionExpired("telegram session rejected".to_string()).into(),
            );
        }
        if !response.status().is_success() {
            return Err(
                PlatformError::Unknown(format!("session check returned {}", response.status()))
                    .into(),
            );
        }
        Ok(())
    }

    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        let token = Self::session_token(session)?;

        let url = format!("{}/messages/send", self.config.api_base);
        let body = json!({
            "session": token,
            "peer": "me",
            "text": content.text,
            "media_path": content.media_path,
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(
                PlatformError::SessionExpired("telegram session rejected".to_string()).into(),
            );
        }
        if !response.status().is_success() {
            return Err(
                PlatformError::Unknown(format!("send returned {}", response.status())).into(),
            );
        }

        let sent: SendMessageResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad send response: {}", e)))?;

        Ok(PostOutcome {
            external_post_id: sent.message_id.map(|id| id.to_string()),
            external_url: None,
        })
    }

    fn platform(&self) -> Platform {
        Platform::Telegram
    }
}
