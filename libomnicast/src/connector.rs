//! Account connection flows
//!
//! Ties the pieces together for linking accounts: OAuth flows go through the
//! state manager, credential logins go straight to the adapter, and both
//! paths end in an encrypted session blob upserted into the store.

use crate::config::Config;
use crate::error::Result;
use crate::oauth::{AuthorizationRequest, OAuthStateManager};
use crate::platforms::PlatformRegistry;
use crate::session::SessionCipher;
use crate::store::Database;
use crate::types::{ConnectedAccount, Credentials, Platform};

pub struct AccountConnector {
    db: Database,
    registry: PlatformRegistry,
    cipher: SessionCipher,
    oauth: OAuthStateManager,
    config: Config,
}

impl AccountConnector {
    pub fn new(
        db: Database,
        registry: PlatformRegistry,
        cipher: SessionCipher,
        config: Config,
    ) -> Self {
        let oauth = OAuthStateManager::new(db.clone(), &config);
        Self {
            db,
            registry,
            cipher,
            oauth,
            config,
        }
    }

    /// Start an OAuth connect flow. Returns the URL to send the user to.
    pub async fn begin_oauth(
        &self,
        owner_id: &str,
        platform: Platform,
    ) -> Result<AuthorizationRequest> {
        let app = self.config.oauth_app(platform)?;
        self.oauth.begin(owner_id, platform, app).await
    }

    /// Finish an OAuth connect flow from the callback parameters.
    ///
    /// The state token identifies the owner and platform and is consumed
    /// exactly once; the code is exchanged by the platform adapter.
    pub async fn complete_oauth(&self, state_token: &str, code: &str) -> Result<ConnectedAccount> {
        let state = self.oauth.consume(state_token).await?;
        let adapter = self.registry.get(state.platform)?;

        let credentials = Credentials::OAuthCode {
            code: code.to_string(),
            code_verifier: state.code_verifier.clone(),
            redirect_uri: state.redirect_uri.clone(),
        };
        let (session, identity) = adapter.authenticate(&credentials).await?;

        let blob = self.cipher.encode(&session)?;
        let account =
            ConnectedAccount::from_identity(&state.owner_id, state.platform, &identity, blob);
        let stored = self.db.upsert_account(&account).await?;

        tracing::info!(
            platform = %state.platform,
            account_id = %stored.id,
            "connected account via oauth"
        );
        Ok(stored)
    }

    /// Connect a platform that authenticates with direct credentials
    /// (password or phone login) rather than OAuth.
    pub async fn connect_with_credentials(
        &self,
        owner_id: &str,
        platform: Platform,
        credentials: &Credentials,
    ) -> Result<ConnectedAccount> {
        let adapter = self.registry.get(platform)?;
        let (session, identity) = adapter.authenticate(credentials).await?;

        let blob = self.cipher.encode(&session)?;
        let account = ConnectedAccount::from_identity(owner_id, platform, &identity, blob);
        let stored = self.db.upsert_account(&account).await?;

        tracing::info!(
            platform = %platform,
            account_id = %stored.id,
            "connected account"
        );
        Ok(stored)
    }

    /// Disconnect an account. Soft: the row survives with is_active off, so
    /// reconnecting the same external account later revives it in place.
    pub async fn disconnect(&self, owner_id: &str, account_id: &str) -> Result<()> {
        self.db.deactivate_account(owner_id, account_id).await?;
        tracing::info!(account_id = %account_id, "disconnected account");
        Ok(())
    }

    pub async fn list_accounts(
        &self,
        owner_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<ConnectedAccount>> {
        self.db.get_accounts_for_owner(owner_id, platform).await
    }
}
