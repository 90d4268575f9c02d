//! Core types for Omnicast

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroize;

/// Supported social platforms
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Twitter,
    Instagram,
    Telegram,
    TikTok,
    YouTube,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Twitter => "twitter",
            Platform::Instagram => "instagram",
            Platform::Telegram => "telegram",
            Platform::TikTok => "tiktok",
            Platform::YouTube => "youtube",
        }
    }

    /// Platforms whose only feasible integration is the browser-automation
    /// worker rather than a direct API client.
    pub fn worker_delegated(&self) -> bool {
        matches!(self, Platform::TikTok | Platform::YouTube)
    }

    /// Platforms that bind the authorization code to a PKCE verifier.
    pub fn uses_pkce(&self) -> bool {
        matches!(self, Platform::Twitter)
    }

    pub fn all() -> &'static [Platform] {
        &[
            Platform::Twitter,
            Platform::Instagram,
            Platform::Telegram,
            Platform::TikTok,
            Platform::YouTube,
        ]
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "twitter" | "x" => Ok(Platform::Twitter),
            "instagram" => Ok(Platform::Instagram),
            "telegram" => Ok(Platform::Telegram),
            "tiktok" => Ok(Platform::TikTok),
            "youtube" => Ok(Platform::YouTube),
            _ => Err(format!(
                "Unknown platform: '{}'. Valid options: twitter, instagram, telegram, tiktok, youtube",
                s
            )),
        }
    }
}

/// Connection state of a linked account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Pending,
    Connected,
    Expired,
    Error,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Connected => "connected",
            AccountStatus::Expired => "expired",
            AccountStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "connected" => AccountStatus::Connected,
            "expired" => AccountStatus::Expired,
            "error" => AccountStatus::Error,
            _ => AccountStatus::Pending,
        }
    }
}

/// A third-party account linked to an application identity
///
/// Rows are unique on (owner_id, platform, external_user_id). Disconnect
/// flips `is_active` only; rows are never deleted so the audit trail
/// survives reconnection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectedAccount {
    pub id: String,
    pub owner_id: String,
    pub platform: Platform,
    pub external_user_id: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
    /// Opaque encrypted session material. No field of this is interpreted
    /// outside the owning adapter + cipher pair.
    pub session_blob: String,
    pub status: AccountStatus,
    pub is_active: bool,
    pub connected_at: i64,
    pub last_sync_at: Option<i64>,
}

impl ConnectedAccount {
    /// Build a freshly connected account from an adapter identity
    pub fn from_identity(
        owner_id: &str,
        platform: Platform,
        identity: &AccountIdentity,
        session_blob: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            platform,
            external_user_id: identity.external_user_id.clone(),
            display_name: identity.display_name.clone(),
            avatar_url: identity.avatar_url.clone(),
            follower_count: identity.follower_count,
            session_blob,
            status: AccountStatus::Connected,
            is_active: true,
            connected_at: now,
            last_sync_at: Some(now),
        }
    }

    /// Eligible for publishing: active and in the connected state
    pub fn is_eligible(&self) -> bool {
        self.is_active && self.status == AccountStatus::Connected
    }
}

/// Normalized identity returned by a platform's profile surface
///
/// Field extraction is platform-specific and tolerates partial responses:
/// adapters default to empty/zero rather than failing the connect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountIdentity {
    pub external_user_id: String,
    pub username: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub follower_count: i64,
}

/// Credential material for one connect attempt, matched exhaustively per
/// platform. Secret fields are zeroed on drop and redacted from Debug.
#[derive(Clone)]
pub enum Credentials {
    /// OAuth authorization-code exchange (with PKCE where the platform
    /// requires it)
    OAuthCode {
        code: String,
        code_verifier: Option<String>,
        redirect_uri: String,
    },
    /// Direct username/password session emulation
    Password {
        username: String,
        password: String,
        email: Option<String>,
    },
    /// Two-step phone login: a verification code plus the hash issued when
    /// the code was sent
    Phone {
        phone: String,
        code: String,
        code_hash: String,
    },
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::OAuthCode { redirect_uri, .. } => f
                .debug_struct("OAuthCode")
                .field("code", &"<redacted>")
                .field("redirect_uri", redirect_uri)
                .finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::Phone { phone, .. } => f
                .debug_struct("Phone")
                .field("phone", phone)
                .field("code", &"<redacted>")
                .finish(),
        }
    }
}

impl Drop for Credentials {
    fn drop(&mut self) {
        match self {
            Credentials::OAuthCode { code, code_verifier, .. } => {
                code.zeroize();
                if let Some(v) = code_verifier {
                    v.zeroize();
                }
            }
            Credentials::Password { password, .. } => password.zeroize(),
            Credentials::Phone { code, code_hash, .. } => {
                code.zeroize();
                code_hash.zeroize();
            }
        }
    }
}

/// Kind of media attached to a post
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "photo" | "image" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }
}

/// Content of one publish request, fanned out to every target account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostContent {
    pub text: String,
    pub media_path: Option<String>,
    pub media_kind: Option<MediaKind>,
    /// Explicit title for platforms that want one (YouTube). Falls back to
    /// a truncation of the text.
    pub title: Option<String>,
}

impl PostContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn has_media(&self) -> bool {
        self.media_path.is_some()
    }

    pub fn has_video(&self) -> bool {
        self.media_kind == Some(MediaKind::Video) && self.has_media()
    }

    /// Title for upload surfaces: explicit title, else the first 100
    /// characters of the text.
    pub fn title_or_excerpt(&self) -> String {
        match &self.title {
            Some(t) if !t.is_empty() => t.clone(),
            _ => self.text.chars().take(100).collect(),
        }
    }
}

/// Aggregate status of a publish operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PostStatus {
    Scheduled,
    Publishing,
    Published,
    Partial,
    Failed,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Partial => "partial",
            PostStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "scheduled" => PostStatus::Scheduled,
            "published" => PostStatus::Published,
            "partial" => PostStatus::Partial,
            "failed" => PostStatus::Failed,
            _ => PostStatus::Publishing,
        }
    }

    /// Derive the aggregate status from per-account results.
    ///
    /// This is the single source of truth for the derivation: published iff
    /// every result succeeded, failed iff every result failed, partial for
    /// any mix. No other code path sets the aggregate directly.
    pub fn from_results(results: &[PostResult]) -> Self {
        if results.is_empty() {
            return PostStatus::Failed;
        }
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        if succeeded == results.len() {
            PostStatus::Published
        } else if succeeded > 0 {
            PostStatus::Partial
        } else {
            PostStatus::Failed
        }
    }
}

/// A publish operation and its content, persisted before fan-out begins
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub owner_id: String,
    pub content: PostContent,
    pub status: PostStatus,
    pub scheduled_for: Option<i64>,
    pub published_at: Option<i64>,
    pub created_at: i64,
}

impl Post {
    pub fn new(owner_id: &str, content: PostContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            content,
            status: PostStatus::Publishing,
            scheduled_for: None,
            published_at: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Per-result status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Pending,
    Published,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Pending => "pending",
            ResultStatus::Published => "published",
            ResultStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "published" => ResultStatus::Published,
            "failed" => ResultStatus::Failed,
            _ => ResultStatus::Pending,
        }
    }
}

/// Outcome of one account's publish attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostResult {
    pub id: Option<i64>,
    pub post_id: String,
    pub account_id: String,
    pub platform: Platform,
    pub status: ResultStatus,
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
    pub error_message: Option<String>,
    pub published_at: Option<i64>,
}

impl PostResult {
    pub fn published(
        post_id: &str,
        account_id: &str,
        platform: Platform,
        outcome: PostOutcome,
    ) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            account_id: account_id.to_string(),
            platform,
            status: ResultStatus::Published,
            external_post_id: outcome.external_post_id,
            external_url: outcome.external_url,
            error_message: None,
            published_at: Some(chrono::Utc::now().timestamp()),
        }
    }

    pub fn failed(post_id: &str, account_id: &str, platform: Platform, error: String) -> Self {
        Self {
            id: None,
            post_id: post_id.to_string(),
            account_id: account_id.to_string(),
            platform,
            status: ResultStatus::Failed,
            external_post_id: None,
            external_url: None,
            error_message: Some(error),
            published_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ResultStatus::Published
    }
}

/// What an adapter reports after a successful post
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PostOutcome {
    pub external_post_id: Option<String>,
    pub external_url: Option<String>,
}

/// Aggregated result of one publish operation, returned verbatim to the
/// caller after all accounts have reported
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishReport {
    pub post_id: String,
    pub status: PostStatus,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<PostResult>,
}

impl PublishReport {
    pub fn from_results(post_id: &str, results: Vec<PostResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        Self {
            post_id: post_id.to_string(),
            status: PostStatus::from_results(&results),
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(success: bool) -> PostResult {
        if success {
            PostResult::published("p", "a", Platform::Twitter, PostOutcome::default())
        } else {
            PostResult::failed("p", "a", Platform::Twitter, "boom".to_string())
        }
    }

    #[test]
    fn test_platform_from_str() {
        assert_eq!("twitter".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!("X".parse::<Platform>().unwrap(), Platform::Twitter);
        assert_eq!("TikTok".parse::<Platform>().unwrap(), Platform::TikTok);
        assert!("myspace".parse::<Platform>().is_err());
    }

    #[test]
    fn test_platform_serde_lowercase() {
        let json = serde_json::to_string(&Platform::YouTube).unwrap();
        assert_eq!(json, r#""youtube""#);
        let back: Platform = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Platform::YouTube);
    }

    #[test]
    fn test_worker_delegated_platforms() {
        assert!(Platform::TikTok.worker_delegated());
        assert!(Platform::YouTube.worker_delegated());
        assert!(!Platform::Twitter.worker_delegated());
        assert!(!Platform::Instagram.worker_delegated());
    }

    #[test]
    fn test_pkce_platforms() {
        assert!(Platform::Twitter.uses_pkce());
        // Worker-delegated platforms log in with credentials, never OAuth
        assert!(!Platform::TikTok.uses_pkce());
        assert!(!Platform::YouTube.uses_pkce());
        assert!(!Platform::Instagram.uses_pkce());
        assert!(!Platform::Telegram.uses_pkce());
    }

    #[test]
    fn test_account_eligibility() {
        let identity = AccountIdentity {
            external_user_id: "123".to_string(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: None,
            follower_count: 10,
        };
        let mut account =
            ConnectedAccount::from_identity("owner", Platform::Twitter, &identity, "blob".into());
        assert!(account.is_eligible());

        account.is_active = false;
        assert!(!account.is_eligible());

        account.is_active = true;
        account.status = AccountStatus::Expired;
        assert!(!account.is_eligible());
    }

    #[test]
    fn test_status_derivation_all_success() {
        let results = vec![result(true), result(true), result(true)];
        assert_eq!(PostStatus::from_results(&results), PostStatus::Published);
    }

    #[test]
    fn test_status_derivation_all_failed() {
        let results = vec![result(false), result(false)];
        assert_eq!(PostStatus::from_results(&results), PostStatus::Failed);
    }

    #[test]
    fn test_status_derivation_mixed() {
        let results = vec![result(true), result(false)];
        assert_eq!(PostStatus::from_results(&results), PostStatus::Partial);
    }

    #[test]
    fn test_status_derivation_single() {
        assert_eq!(PostStatus::from_results(&[result(true)]), PostStatus::Published);
        assert_eq!(PostStatus::from_results(&[result(false)]), PostStatus::Failed);
    }

    #[test]
    fn test_status_derivation_empty() {
        assert_eq!(PostStatus::from_results(&[]), PostStatus::Failed);
    }

    #[test]
    fn test_status_derivation_random_vectors() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        for _ in 0..200 {
            let len = rng.gen_range(1..=10);
            let outcomes: Vec<bool> = (0..len).map(|_| rng.gen_bool(0.5)).collect();
            let results: Vec<PostResult> = outcomes.iter().map(|&s| result(s)).collect();

            let status = PostStatus::from_results(&results);
            let all = outcomes.iter().all(|&s| s);
            let any = outcomes.iter().any(|&s| s);

            if all {
                assert_eq!(status, PostStatus::Published);
            } else if any {
                assert_eq!(status, PostStatus::Partial);
            } else {
                assert_eq!(status, PostStatus::Failed);
            }
        }
    }

    #[test]
    fn test_publish_report_counts() {
        let results = vec![result(true), result(false), result(true)];
        let report = PublishReport::from_results("post-1", results);

        assert_eq!(report.total, 3);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.status, PostStatus::Partial);
    }

    #[test]
    fn test_title_or_excerpt() {
        let content = PostContent {
            text: "a".repeat(150),
            title: None,
            ..Default::default()
        };
        assert_eq!(content.title_or_excerpt().chars().count(), 100);

        let content = PostContent {
            text: "body".to_string(),
            title: Some("Explicit title".to_string()),
            ..Default::default()
        };
        assert_eq!(content.title_or_excerpt(), "Explicit title");
    }

    #[test]
    fn test_post_new_defaults() {
        let post = Post::new("owner-1", PostContent::text("hello"));
        assert!(uuid::Uuid::parse_str(&post.id).is_ok());
        assert_eq!(post.owner_id, "owner-1");
        assert_eq!(post.status, PostStatus::Publishing);
        assert_eq!(post.published_at, None);
    }

    #[test]
    fn test_media_kind_parse() {
        assert_eq!(MediaKind::parse("photo"), Some(MediaKind::Photo));
        assert_eq!(MediaKind::parse("image"), Some(MediaKind::Photo));
        assert_eq!(MediaKind::parse("VIDEO"), Some(MediaKind::Video));
        assert_eq!(MediaKind::parse("audio"), None);
    }

    #[test]
    fn test_post_result_serialization() {
        let r = PostResult::published(
            "post-1",
            "acct-1",
            Platform::Instagram,
            PostOutcome {
                external_post_id: Some("media-9".to_string()),
                external_url: Some("https://instagram.com/p/media-9".to_string()),
            },
        );
        let json = serde_json::to_string(&r).unwrap();
        let back: PostResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.platform, Platform::Instagram);
        assert_eq!(back.status, ResultStatus::Published);
        assert_eq!(back.external_post_id, Some("media-9".to_string()));
    }
}
