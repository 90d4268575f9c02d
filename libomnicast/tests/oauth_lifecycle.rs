//! OAuth flow lifecycle tests
//!
//! Covers the state token lifecycle across the full connector surface:
//! issuance, the authorization URL contract, single-use consumption,
//! expiry, and concurrent callback races.

use anyhow::Result;
use std::sync::Arc;
use tempfile::TempDir;
use url::Url;

use libomnicast::config::{Config, OAuthAppConfig};
use libomnicast::platforms::mock::MockClient;
use libomnicast::platforms::PlatformRegistry;
use libomnicast::types::Platform;
use libomnicast::{AccountConnector, Database, OmnicastError, SessionCipher};

async fn setup(ttl_mins: i64) -> Result<(TempDir, AccountConnector)> {
    let temp = TempDir::new()?;
    let db_path = temp.path().join("omnicast.db");
    let db = Database::new(db_path.to_str().unwrap()).await?;
    let cipher = SessionCipher::new("oauth-test-passphrase".to_string())?;

    let mut config = Config::default_config();
    config.twitter = Some(OAuthAppConfig::twitter_defaults(
        "client-id".to_string(),
        "client-secret".to_string(),
    ));
    config.publish.oauth_state_ttl_mins = ttl_mins;

    let mut registry = PlatformRegistry::new();
    registry.register(Arc::new(MockClient::success(Platform::Twitter)));

    Ok((temp, AccountConnector::new(db, registry, cipher, config)))
}

#[tokio::test]
async fn test_authorize_url_contract() -> Result<()> {
    let (_temp, connector) = setup(10).await?;

    let request = connector.begin_oauth("user-1", Platform::Twitter).await?;
    let url = Url::parse(&request.authorize_url)?;
    let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

    assert_eq!(url.host_str(), Some("twitter.com"));
    assert_eq!(pairs["response_type"], "code");
    assert_eq!(pairs["client_id"], "client-id");
    assert_eq!(pairs["state"], request.state_token);
    assert_eq!(pairs["code_challenge_method"], "S256");
    // Challenge is derived, never the verifier itself
    assert!(!pairs["code_challenge"].is_empty());
    assert_ne!(pairs["code_challenge"], request.state_token);
    Ok(())
}

#[tokio::test]
async fn test_distinct_flows_get_distinct_states() -> Result<()> {
    let (_temp, connector) = setup(10).await?;

    let first = connector.begin_oauth("user-1", Platform::Twitter).await?;
    let second = connector.begin_oauth("user-1", Platform::Twitter).await?;
    assert_ne!(first.state_token, second.state_token);

    // Both complete independently
    connector.complete_oauth(&first.state_token, "code-a").await?;
    connector.complete_oauth(&second.state_token, "code-b").await?;
    Ok(())
}

#[tokio::test]
async fn test_state_survives_only_one_callback() -> Result<()> {
    let (_temp, connector) = setup(10).await?;
    let connector = Arc::new(connector);

    let request = connector.begin_oauth("user-1", Platform::Twitter).await?;

    // Two callbacks race on the same state token
    let c1 = connector.clone();
    let c2 = connector.clone();
    let token1 = request.state_token.clone();
    let token2 = request.state_token.clone();
    let (r1, r2) = tokio::join!(
        tokio::spawn(async move { c1.complete_oauth(&token1, "code").await }),
        tokio::spawn(async move { c2.complete_oauth(&token2, "code").await }),
    );

    let outcomes = [r1.unwrap(), r2.unwrap()];
    let wins = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(wins, 1, "exactly one callback may win the state token");
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(OmnicastError::StateNotFound))));
    Ok(())
}

#[tokio::test]
async fn test_expired_state_rejected() -> Result<()> {
    let (_temp, connector) = setup(0).await?;

    let request = connector.begin_oauth("user-1", Platform::Twitter).await?;
    let err = connector
        .complete_oauth(&request.state_token, "code")
        .await
        .unwrap_err();
    assert!(matches!(err, OmnicastError::StateExpired));

    // Expiry also consumes the token
    let err = connector
        .complete_oauth(&request.state_token, "code")
        .await
        .unwrap_err();
    assert!(matches!(err, OmnicastError::StateNotFound));
    Ok(())
}

#[tokio::test]
async fn test_forged_state_rejected() -> Result<()> {
    let (_temp, connector) = setup(10).await?;

    connector.begin_oauth("user-1", Platform::Twitter).await?;
    let err = connector
        .complete_oauth("forged-state-token", "code")
        .await
        .unwrap_err();
    assert!(matches!(err, OmnicastError::StateNotFound));
    Ok(())
}

#[tokio::test]
async fn test_callback_binds_owner_from_state() -> Result<()> {
    let (_temp, connector) = setup(10).await?;

    let request = connector.begin_oauth("user-42", Platform::Twitter).await?;
    let account = connector
        .complete_oauth(&request.state_token, "code")
        .await?;

    // The connected account belongs to whoever started the flow
    assert_eq!(account.owner_id, "user-42");
    let listed = connector.list_accounts("user-42", None).await?;
    assert_eq!(listed.len(), 1);
    Ok(())
}
