//! Instagram adapter (web session emulation)
//!
//! Instagram has no posting API for ordinary accounts, so this adapter
//! emulates the web client: password login against the ajax endpoint, then
//! cookie-based uploads. A checkpoint challenge during login surfaces as
//! `VerificationRequired` so the caller can tell the user to resolve it in
//! the app.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::config::InstagramConfig;
use crate::error::{PlatformError, Result};
use crate::platforms::PlatformClient;
use crate::session::SessionData;
use crate::types::{AccountIdentity, Credentials, MediaKind, Platform, PostContent, PostOutcome};

pub struct InstagramClient {
    config: InstagramConfig,
    http: reqwest::Client,
}

#[derive(Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    authenticated: bool,
    #[serde(default)]
    user: bool,
    #[serde(rename = "userId", default)]
    user_id: String,
    #[serde(default)]
    checkpoint_url: Option<String>,
}

#[derive(Deserialize)]
struct UploadResponse {
    #[serde(default)]
    media_id: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

impl InstagramClient {
    pub fn new(config: InstagramConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }

    fn required(session: &SessionData, key: &str) -> Result<String> {
        session.get_str(key).map(str::to_string).ok_or_else(|| {
            PlatformError::InvalidSession(format!("instagram session missing {}", key)).into()
        })
    }
}

#[async_trait]
impl PlatformClient for InstagramClient {
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
                    "instagram expects a username and password".to_string(),
                )
                .into())
            }
        };

        let url = format!("{}/accounts/login/ajax/", self.config.api_base);
        // enc_password in plaintext mode; versioned prefix per the web client
        let enc_password = format!(
            "#PWD_INSTAGRAM_BROWSER:0:{}:{}",
            chrono::Utc::now().timestamp(),
            password
        );
        let params = [
            ("username", username.as_str()),
            ("enc_password", enc_password.as_str()),
        ];

        let response = self
            .http
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() && status != reqwest::StatusCode::BAD_REQUEST {
            return Err(PlatformError::Unknown(format!("login returned {}", status)).into());
        }

        // Capture cookies before consuming the body
        let mut sessionid = String::new();
        let mut csrftoken = String::new();
        for cookie in response.cookies() {
            match cookie.name() {
                "sessionid" => sessionid = cookie.value().to_string(),
                "csrftoken" => csrftoken = cookie.value().to_string(),
                _ => {}
            }
        }

        let login: LoginResponse = response.json().await.unwrap_or_default();

        if let Some(checkpoint) = login.checkpoint_url {
            return Err(PlatformError::VerificationRequired(format!(
                "instagram checkpoint challenge: {}",
                checkpoint
            ))
            .into());
        }
        if !login.authenticated {
            let detail = if login.user {
                "wrong password"
            } else {
                "unknown username"
            };
            return Err(PlatformError::InvalidCredentials(format!(
                "instagram login failed: {}",
                detail
            ))
            .into());
        }
        if sessionid.is_empty() {
            return Err(
                PlatformError::Unknown("login succeeded but no session cookie".to_string()).into(),
            );
        }

        let session = SessionData::new(json!({
            "user_id": login.user_id,
            "username": username,
            "sessionid": sessionid,
            "csrftoken": csrftoken,
        }));

        let identity = AccountIdentity {
            external_user_id: login.user_id,
            username: username.clone(),
            display_name: username.clone(),
            avatar_url: None,
            follower_count: 0,
        };

        Ok((session, identity))
    }

    async fn restore_session(&self, session: &SessionData) -> Result<()> {
        let sessionid = Self::required(session, "sessionid")?;
        Self::required(session, "csrftoken")?;

        let url = format!("{}/accounts/edit/", self.config.api_base);
        let response = self
            .http
            .get(&url)
            .header("Cookie", format!("sessionid={}", sessionid))
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        // Instagram redirects unauthenticated requests to the login page
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.url().path().contains("/accounts/login")
        {
            return Err(
                PlatformError::SessionExpired("instagram session rejected".to_string()).into(),
            );
        }
        Ok(())
    }

    async fn post(&self, session: &SessionData, content: &PostContent) -> Result<PostOutcome> {
        // Feed posts require media; Instagram has no text-only posts
        if content.media_kind != Some(MediaKind::Photo) || !content.has_media() {
            return Err(PlatformError::UnsupportedContent(
                "instagram requires a photo attachment".to_string(),
            )
            .into());
        }

        let sessionid = Self::required(session, "sessionid")?;
        let csrftoken = Self::required(session, "csrftoken")?;
        let media_path = content.media_path.as_deref().unwrap_or_default();

        let bytes = tokio::fs::read(media_path)
            .await
            .map_err(|e| PlatformError::Unknown(format!("cannot read media file: {}", e)))?;

        let upload_id = chrono::Utc::now().timestamp_millis().to_string();
        let url = format!("{}/rupload_igphoto/{}", self.config.api_base, upload_id);
        let response = self
            .http
            .post(&url)
            .header("Cookie", format!("sessionid={}; csrftoken={}", sessionid, csrftoken))
            .header("X-CSRFToken", &csrftoken)
            .header("X-Instagram-Rupload-Params", json!({"upload_id": upload_id}).to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(
                PlatformError::SessionExpired("instagram session rejected".to_string()).into(),
            );
        }
        if !response.status().is_success() {
            return Err(
                PlatformError::Unknown(format!("media upload returned {}", response.status()))
                    .into(),
            );
        }

        // Attach the caption and publish
        let configure_url = format!("{}/create/configure/", self.config.api_base);
        let params = [
            ("upload_id", upload_id.as_str()),
            ("caption", content.text.as_str()),
        ];
        let response = self
            .http
            .post(&configure_url)
            .header("Cookie", format!("sessionid={}; csrftoken={}", sessionid, csrftoken))
            .header("X-CSRFToken", &csrftoken)
            .form(&params)
            .send()
            .await
            .map_err(|e| PlatformError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(
                PlatformError::Unknown(format!("configure returned {}", response.status())).into(),
            );
        }

        let upload: UploadResponse = response
            .json()
            .await
            .map_err(|e| PlatformError::Unknown(format!("bad configure response: {}", e)))?;

        let external_url = upload
            .code
            .as_ref()
            .map(|code| format!("https://www.instagram.com/p/{}/", code));
        Ok(PostOutcome {
            external_post_id: upload.media_id,
            external_url,
        })
    }

    fn platform(&self) -> Platform {
        Platform::Instagram
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> InstagramClient {
        InstagramClient::new(InstagramConfig {
            api_base: "http://192.0.2.1:9".to_string(),
        })
    }

    #[tokio::test]
    async fn test_wrong_credential_shape() {
        let creds = Credentials::Phone {
            phone: "+123".to_string(),
            code: "000".to_string(),
            code_hash: "h".to_string(),
        };
        let err = client().authenticate(&creds).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::InvalidCredentials(_))
        ));
    }

    #[tokio::test]
    async fn test_text_only_unsupported() {
        let session = SessionData::new(json!({"sessionid": "s", "csrftoken": "c"}));
        let err = client()
            .post(&session, &PostContent::text("no media"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::UnsupportedContent(_))
        ));
    }

    #[tokio::test]
    async fn test_video_unsupported() {
        let session = SessionData::new(json!({"sessionid": "s", "csrftoken": "c"}));
        let content = PostContent {
            text: "clip".to_string(),
            media_path: Some("/tmp/clip.mp4".to_string()),
            media_kind: Some(MediaKind::Video),
            title: None,
        };
        let err = client().post(&session, &content).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::UnsupportedContent(_))
        ));
    }

    #[tokio::test]
    async fn test_session_missing_cookie() {
        let session = SessionData::new(json!({"username": "alice"}));
        let err = client().restore_session(&session).await.unwrap_err();
        assert!(matches!(
            err,
            crate::error::OmnicastError::Platform(PlatformError::InvalidSession(_))
        ));
    }
}
