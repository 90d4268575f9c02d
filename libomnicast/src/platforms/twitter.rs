//! Twitter adapter (OAuth2 + PKCE, v2 API)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::OAuthAppConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, Platform, PostContent, PostOutcome};

pub struct TwitterClient {
    app: OAuthAppConfig,
    http: reqwest::Client,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize, Default)]
struct UserData {
    #[serde(default)]
    id: String,
    #[serde(default)]
    username: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    profile_image_url: Option<String>,
    #[serde(default)]
    public_metrics: Option<PublicMetrics>,
}

#[derive(Deserialize, Default)]
struct PublicMetrics {
    #[serde(default)]
    followers_count: i64,
}

#[derive(Deserialize)]
struct UserResponse {
    #[serde(default)]
    data: Option<UserData>,
}

#[derive(Deserialize)]
struct TweetResponse {
    data: TweetData,
}

#[derive(Deserialize)]
struct TweetData {
    id: String,
}

impl TwitterClient {
    pub fn new(app: OAuthAppConfig) -> Self {
        Self {
            app,
            http: reqwest::Client::new(),
        }
    }

    /// Exchange an authorization code for tokens. The PKCE verifier from the
    /// issued state must accompany the code.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", redirect_uri),
            ("client_id", &self.app.client_id),
            ("code_verifier", code_verifier),
        ];

        let response = self
            .http
            .post(&self.app.token_url)
            .basic_auth(&self.app.client_id, Some(&self.app.client_secret))
            .form(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::BAD_REQUEST || status == reqwest::StatusCode::UNAUTHORIZED
        {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::InvalidCredentials(format!(
                "token exchange rejected: {}",
                body
            ))
            .into());
        }
        if !status.is_success() {
            return Err(PlatformError::Unknown(format!("token exchange returned {}", status)).into());
        }

        response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad token response: {}", e)).into())
    }

    /// Fetch the authenticated user's profile. Tolerates partial responses;
    /// only a rejected token is an error.
    async fn fetch_identity(&self, access_token: &str) -> Result<AccountIdentity> {
        let response = self
            .http
            .get(&self.app.profile_url)
            .bearer_auth(access_token)
            .query(&[("user.fields", "profile_image_url,public_metrics")])
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PlatformError::SessionExpired("twitter token rejected".to_string()).into());
        }
        if !response.status().is_success() {
            return Err(
                PlatformError::Unknown(format!("profile fetch returned {}", response.status()))
                    .into(),
            );
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad profile response: {}", e)))?;
        let data = user.data.unwrap_or_default();

        Ok(AccountIdentity {
            external_user_id: data.id,
            username: data.username,
            display_name: data.name,
            avatar_url: data.profile_image_url,
            follower_count: data.public_metrics.map(|m| m.followers_count).unwrap_or(0),
        })
    }

    fn access_token(session: &SessionData) -> Result<String> {
        session
            .get_str("access_token")
            .map(str::to_string)
            .ok_or_else(|| {
                PlatformError::InvalidSession("twitter session missing access_token".to_string())
                    .into()
            })
    }
}

#[async_trait]
impl PlatformClient for TwitterClient {
    async fn authenticate(
        &self,
        credentials: &Credentials,
    ) -> Result<(SessionData, AccountIdentity)> {
        let (code, code_verifier, redirect_uri) = match credentials {
            Credentials::OAuthCode {
                code,
                code_verifier: Some(verifier),
                redirect_uri,
            } => (code, verifier, redirect_uri),
            Credentials::OAuthCode {
                code_verifier: None,
                ..
            } => {
                return Err(PlatformError::InvalidCredentials(
                    "twitter requires a PKCE verifier".to_string(),
                )
                .into())
            }
            _ => {
                return Err(PlatformError::InvalidCredentials(
                    "twitter expects an OAuth authorization code".to_string(),
                )
                .into())
            }
        };

        let tokens = self.exchange_code(code, code_verifier, redirect_uri).await?;
        let identity = self.fetch_identity(&tokens.access_token).await?;

        let expires_at = tokens
            .expires_in
            .map(|secs| chrono::Utc::now().timestamp() + secs);
        let session = SessionData::new(json!({
            "access_token": tokens.access_token,
            "refresh_token": tokens.refresh_token,
            "expires_at": expires_at,
        }));

        Ok((session, identity))
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        let token = Self::access_token(session)?;
        if let Some(expires_at) = session.get_i64("expires_at") {
            if chrono::Utc::now().timestamp() >= expires_at {
                return Err(
                    PlatformError::SessionExpired("twitter access token expired".to_string())
                        .into(),
                );
            }
        }
        self.fetch_identity(&token).await.map(|_| ())
    }

    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        // Media upload needs the v1.1 chunked endpoint; text only for now
        if content.has_media() {
            return Err(PlatformError::UnsupportedContent(
                "twitter adapter posts text only".to_string(),
            )
            .into());
        }

        let token = Self::access_token(session)?;
        let response = self
            .http
            .post("https://api.twitter.com/2/tweets")
            .bearer_auth(&token)
            .json(&json!({ "text": content.text }))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PlatformError::SessionExpired("twitter token rejected".to_string()).into());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PlatformError::Unknown(format!("tweet failed ({}): {}", status, body)).into());
        }

        let tweet: TweetResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad tweet response: {}", e)))?;

        Ok(PostOutcome {
            external_url: Some(format!("https://twitter.com/i/status/{}", tweet.data.id)),
            external_post_id: Some(tweet.data.id),
        })
    }

    fn platform(&self) -> Platform {
        Platform::Twitter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> TwitterClient {
        TwitterClient::new(OAuthAppConfig::twitter_defaults(
            "id".to_string(),
            "secret".to_string(),
        ))
    }

    #[tokio::test]
    async fn test_wrong_credential_shape() {
        let creds = Credentials::Password {
            username: "u".to_string(),
            password: "p".to_string(),
            email: None,
        };
        let err = client().authenticate(&creds).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_verifier_rejected() {
        let creds = Credentials::OAuthCode {
            code: "abc".to_string(),
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
    async fn test_session_missing_token() {
        let session = SessionData::new(serde_json::json!({"refresh_token": "r"}));
        let err = client().restore_session(&session).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::InvalidSession(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_session_rejected_locally() {
        let session = SessionData::new(serde_json::json!({
            "access_token": "t",
            "expires_at": 1,
        }));
        let err = client().restore_session(&session).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::SessionExpired(_))
        ));
    }

    #[tokio::test]
    async fn test_media_unsupported() {
        let session = SessionData::new(serde_json::json!({"access_token": "t"}));
        let content = PostContent {
            text: "hi".to_string(),
            media_path: Some("/tmp/x.jpg".to_string()),
            media_kind: Some(crate::types::MediaKind::Photo),
            title: None,
        };
        let err = client().post(&session, &content).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::UnsupportedContent(_))
        ));
    }
}
