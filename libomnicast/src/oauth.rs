//! OAuth2 authorization flow state
//!
//! Issues single-use state tokens bound to an owner and platform, carries
//! the PKCE verifier across the redirect, and enforces expiry at consume
//! time. States live in the database so any process in the deployment can
//! complete a flow another one started.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::RngCore;
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::{Config, OAuthAppConfig};
use crate::error::{OmnicastError, Result};
use crate::store::Database;
use crate::types::Platform;

/// One pending authorization flow
#[derive(Debug, Clone)]
pub struct OAuthState {
    pub state_token: String,
    pub owner_id: String,
    pub platform: Platform,
    /// PKCE verifier, present only for platforms that bind the code to one
    pub code_verifier: Option<String>,
    pub redirect_uri: String,
    pub created_at: i64,
    pub expires_at: i64,
}

impl OAuthState {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// What the caller needs to redirect the user
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorize_url: String,
    pub state_token: String,
}

pub struct OAuthStateManager {
    db: Database,
    redirect_uri: String,
    state_ttl_mins: i64,
}

impl OAuthStateManager {
    pub fn new(db: Database, config: &Config) -> Self {
        Self {
            db,
            redirect_uri: config.publish.redirect_uri.clone(),
            state_ttl_mins: config.publish.oauth_state_ttl_mins,
        }
    }

    /// Start an authorization flow: mint a state token (plus PKCE material
    /// where the platform requires it), persist it, and build the URL the
    /// user should be sent to.
    pub async fn begin(
        &self,
        owner_id: &str,
        platform: Platform,
        app: &OAuthAppConfig,
    ) -> Result<AuthorizationRequest> {
        let state_token = random_token();

        let (code_verifier, code_challenge) = if platform.uses_pkce() {
            let verifier = random_token();
            let challenge = pkce_challenge(&verifier);
            (Some(verifier), Some(challenge))
        } else {
            (None, None)
        };

        let now = chrono::Utc::now().timestamp();
        let state = OAuthState {
            state_token: state_token.clone(),
            owner_id: owner_id.to_string(),
            platform,
            code_verifier,
            redirect_uri: self.redirect_uri.clone(),
            created_at: now,
            expires_at: now + self.state_ttl_mins * 60,
        };
        self.db.insert_oauth_state(&state).await?;

        let mut authorize_url = Url::parse(&app.auth_url)
            .map_err(|e| OmnicastError::InvalidInput(format!("bad auth URL: {}", e)))?;
        {
            let mut query = authorize_url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &app.client_id)
                .append_pair("redirect_uri", &self.redirect_uri)
                .append_pair("scope", &app.scopes.join(" "))
                .append_pair("state", &state_token);
            if let Some(challenge) = &code_challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }

        tracing::debug!(platform = %platform, "issued oauth state");

        Ok(AuthorizationRequest {
            authorize_url: authorize_url.to_string(),
            state_token,
        })
    }

    /// Consume a state token exactly once.
    ///
    /// The token is removed whether or not it has expired, so a replay after
    /// an expiry failure reports not-found rather than expired.
    pub async fn consume(&self, state_token: &str) -> Result<OAuthState> {
        let state = self
            .db
            .take_oauth_state(state_token)
            .await?
            .ok_or(OmnicastError::StateNotFound)?;

        if state.is_expired(chrono::Utc::now().timestamp()) {
            tracing::warn!(platform = %state.platform, "oauth state expired");
            return Err(OmnicastError::StateExpired);
        }

        Ok(state)
    }
}

/// 32 random bytes, base64url without padding. Used for both state tokens
/// and PKCE verifiers.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// S256 code challenge for a PKCE verifier
fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}
