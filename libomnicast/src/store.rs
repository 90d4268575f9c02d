//! Persistence layer for Omnicast
//!
//! Narrow read/write contract over SQLite: connected accounts (upsert on
//! owner+platform+external id), OAuth states (consume-once),
//! posts with per-account results, and the per-owner monthly post counter.

use sqlx::sqlite::SqlitePool;
use sqlx::Row;
use std::path::Path;

use crate::error::{Result, StoreError};
use crate::oauth::OAuthState;
use crate::types::{
    AccountStatus, ConnectedAccount, MediaKind, Platform, Post, PostContent, PostResult,
    PostStatus, ResultStatus,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if necessary) the database at the given path and run
    /// pending migrations. `:memory:` is supported for tests.
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();

        if expanded_path != ":memory:" {
            let path = Path::new(&expanded_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(StoreError::IoError)?;
            }
        }

        // Use forward slashes for the SQLite URL and mode=rwc so the file is
        // created on first open.
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        // An in-memory database exists per connection, so the pool must be
        // pinned to a single long-lived connection for it to be coherent.
        let pool = if expanded_path == ":memory:" {
            sqlx::sqlite::SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
        } else {
            SqlitePool::connect(&db_url).await
        }
        .map_err(StoreError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::MigrationError)?;

        Ok(Self { pool })
    }

    // ========================================================================
    // Connected accounts
    // ========================================================================

    /// Insert or refresh a connected account.
    ///
    /// Conflict key is (owner_id, platform, external_user_id); reconnection
    /// rotates the session blob and refreshes identity fields while keeping
    /// the original row id and connected_at.
    pub async fn upsert_account(&self, account: &ConnectedAccount) -> Result<ConnectedAccount> {
        sqlx::query(
            r#"
            INSERT INTO connected_accounts
                (id, owner_id, platform, external_user_id, display_name, avatar_url,
                 follower_count, session_blob, status, is_active, connected_at, last_sync_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id, platform, external_user_id) DO UPDATE SET
                display_name = excluded.display_name,
                avatar_url = excluded.avatar_url,
                follower_count = excluded.follower_count,
                session_blob = excluded.session_blob,
                status = excluded.status,
                is_active = excluded.is_active,
                last_sync_at = excluded.last_sync_at
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_id)
        .bind(account.platform.as_str())
        .bind(&account.external_user_id)
        .bind(&account.display_name)
        .bind(&account.avatar_url)
        .bind(account.follower_count)
        .bind(&account.session_blob)
        .bind(account.status.as_str())
        .bind(account.is_active as i64)
        .bind(account.connected_at)
        .bind(account.last_sync_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        // Read back so callers see the surviving row id on reconnection
        let row = sqlx::query(
            r#"
            SELECT * FROM connected_accounts
            WHERE owner_id = ? AND platform = ? AND external_user_id = ?
            "#,
        )
        .bind(&account.owner_id)
        .bind(account.platform.as_str())
        .bind(&account.external_user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        account_from_row(&row)
    }

    /// Get one account by id
    pub async fn get_account(&self, account_id: &str) -> Result<Option<ConnectedAccount>> {
        let row = sqlx::query("SELECT * FROM connected_accounts WHERE id = ?")
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        row.map(|r| account_from_row(&r)).transpose()
    }

    /// All accounts for an owner, optionally filtered by platform
    pub async fn get_accounts_for_owner(
        &self,
        owner_id: &str,
        platform: Option<Platform>,
    ) -> Result<Vec<ConnectedAccount>> {
        let rows = match platform {
            Some(p) => {
                sqlx::query(
                    "SELECT * FROM connected_accounts WHERE owner_id = ? AND platform = ? ORDER BY connected_at",
                )
                .bind(owner_id)
                .bind(p.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT * FROM connected_accounts WHERE owner_id = ? ORDER BY connected_at",
                )
                .bind(owner_id)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    /// Resolve an id set to the owner's accounts. Ids that don't exist or
    /// belong to someone else are silently dropped; eligibility filtering is
    /// the publisher's job.
    pub async fn get_accounts_by_ids(
        &self,
        owner_id: &str,
        account_ids: &[String],
    ) -> Result<Vec<ConnectedAccount>> {
        let mut accounts = Vec::with_capacity(account_ids.len());
        for id in account_ids {
            if let Some(account) = self.get_account(id).await? {
                if account.owner_id == owner_id {
                    accounts.push(account);
                }
            }
        }
        Ok(accounts)
    }

    /// Soft-deactivate an account. The row (and its audit trail) survives;
    /// only is_active flips.
    pub async fn deactivate_account(&self, owner_id: &str, account_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE connected_accounts SET is_active = 0 WHERE id = ? AND owner_id = ?",
        )
        .bind(account_id)
        .bind(owner_id)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AccountNotFound(account_id.to_string()).into());
        }
        Ok(())
    }

    /// Mark an account's connection state without touching its session
    pub async fn update_account_status(&self, account_id: &str, status: AccountStatus) -> Result<()> {
        sqlx::query("UPDATE connected_accounts SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    // ========================================================================
    // OAuth states
    // ========================================================================

    pub async fn insert_oauth_state(&self, state: &OAuthState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO oauth_states
                (state_token, owner_id, platform, code_verifier, redirect_uri, created_at, expires_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&state.state_token)
        .bind(&state.owner_id)
        .bind(state.platform.as_str())
        .bind(&state.code_verifier)
        .bind(&state.redirect_uri)
        .bind(state.created_at)
        .bind(state.expires_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    /// Atomically remove and return an OAuth state.
    ///
    /// Delete-with-returning in one statement, so two concurrent callbacks
    /// racing on the same token cannot both observe the row.
    pub async fn take_oauth_state(&self, state_token: &str) -> Result<Option<OAuthState>> {
        let row = sqlx::query("DELETE FROM oauth_states WHERE state_token = ? RETURNING *")
            .bind(state_token)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        row.map(|r| oauth_state_from_row(&r)).transpose()
    }

    // ========================================================================
    // Posts and results
    // ========================================================================

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts
                (id, owner_id, content, media_path, media_kind, title, status,
                 scheduled_for, published_at, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.content.text)
        .bind(&post.content.media_path)
        .bind(post.content.media_kind.map(|k| k.as_str()))
        .bind(&post.content.title)
        .bind(post.status.as_str())
        .bind(post.scheduled_for)
        .bind(post.published_at)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query("SELECT * FROM posts WHERE id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        row.map(|r| post_from_row(&r)).transpose()
    }

    /// Write the derived aggregate status after the fan-out join barrier
    pub async fn update_post_aggregate(
        &self,
        post_id: &str,
        status: PostStatus,
        published_at: Option<i64>,
    ) -> Result<()> {
        sqlx::query("UPDATE posts SET status = ?, published_at = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(published_at)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        Ok(())
    }

    pub async fn create_post_result(&self, result: &PostResult) -> Result<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO post_results
                (post_id, account_id, platform, status, external_post_id,
                 external_url, error_message, published_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.post_id)
        .bind(&result.account_id)
        .bind(result.platform.as_str())
        .bind(result.status.as_str())
        .bind(&result.external_post_id)
        .bind(&result.external_url)
        .bind(&result.error_message)
        .bind(result.published_at)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        Ok(row.last_insert_rowid())
    }

    pub async fn get_post_results(&self, post_id: &str) -> Result<Vec<PostResult>> {
        let rows = sqlx::query("SELECT * FROM post_results WHERE post_id = ? ORDER BY id")
            .bind(post_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        rows.iter().map(post_result_from_row).collect()
    }

    // ========================================================================
    // Monthly post counter (quota policy lives outside this crate)
    // ========================================================================

    pub async fn monthly_post_count(&self, owner_id: &str, month: &str) -> Result<i64> {
        let row = sqlx::query("SELECT count FROM post_counters WHERE owner_id = ? AND month = ?")
            .bind(owner_id)
            .bind(month)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::SqlxError)?;

        Ok(row.map(|r| r.get::<i64, _>("count")).unwrap_or(0))
    }

    pub async fn increment_monthly_post_count(&self, owner_id: &str, month: &str) -> Result<i64> {
        sqlx::query(
            r#"
            INSERT INTO post_counters (owner_id, month, count)
            VALUES (?, ?, 1)
            ON CONFLICT (owner_id, month) DO UPDATE SET count = count + 1
            "#,
        )
        .bind(owner_id)
        .bind(month)
        .execute(&self.pool)
        .await
        .map_err(StoreError::SqlxError)?;

        self.monthly_post_count(owner_id, month).await
    }
}

fn platform_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Platform> {
    let raw: String = row.get("platform");
    raw.parse::<Platform>()
        .map_err(|e| StoreError::SqlxError(sqlx::Error::Decode(e.into())).into())
}

fn account_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ConnectedAccount> {
    Ok(ConnectedAccount {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        platform: platform_from_row(row)?,
        external_user_id: row.get("external_user_id"),
        display_name: row.get("display_name"),
        avatar_url: row.get("avatar_url"),
        follower_count: row.get("follower_count"),
        session_blob: row.get("session_blob"),
        status: AccountStatus::parse(&row.get::<String, _>("status")),
        is_active: row.get::<i64, _>("is_active") != 0,
        connected_at: row.get("connected_at"),
        last_sync_at: row.get("last_sync_at"),
    })
}

fn oauth_state_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<OAuthState> {
    Ok(OAuthState {
        state_token: row.get("state_token"),
        owner_id: row.get("owner_id"),
        platform: platform_from_row(row)?,
        code_verifier: row.get("code_verifier"),
        redirect_uri: row.get("redirect_uri"),
        created_at: row.get("created_at"),
        expires_at: row.get("expires_at"),
    })
}

fn post_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Post> {
    Ok(Post {
        id: row.get("id"),
        owner_id: row.get("owner_id"),
        content: PostContent {
            text: row.get("content"),
            media_path: row.get("media_path"),
            media_kind: row
                .get::<Option<String>, _>("media_kind")
                .and_then(|k| MediaKind::parse(&k)),
            title: row.get("title"),
        },
        status: PostStatus::parse(&row.get::<String, _>("status")),
        scheduled_for: row.get("scheduled_for"),
        published_at: row.get("published_at"),
        created_at: row.get("created_at"),
    })
}

fn post_result_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<PostResult> {
    Ok(PostResult {
        id: Some(row.get("id")),
        post_id: row.get("post_id"),
        account_id: row.get("account_id"),
        platform: platform_from_row(row)?,
        status: ResultStatus::parse(&row.get::<String, _>("status")),
        external_post_id: row.get("external_post_id"),
        external_url: row.get("external_url"),
        error_message: row.get("error_message"),
        published_at: row.get("published_at"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AccountIdentity, PostOutcome};

    async fn test_db() -> Database {
        Database::new(":memory:").await.unwrap()
    }

    fn identity(id: &str) -> AccountIdentity {
        AccountIdentity {
            external_user_id: id.to_string(),
            username: "alice".to_string(),
            display_name: "Alice".to_string(),
            avatar_url: Some("https://example.com/a.png".to_string()),
            follower_count: 42,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_account() {
        let db = test_db().await;

        let account = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Twitter,
            &identity("ext-1"),
            "blob-1".to_string(),
        );
        let stored = db.upsert_account(&account).await.unwrap();
        assert_eq!(stored.id, account.id);

        let fetched = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(fetched.external_user_id, "ext-1");
        assert_eq!(fetched.follower_count, 42);
        assert!(fetched.is_active);
    }

    #[tokio::test]
    async fn test_upsert_conflict_keeps_row_id() {
        let db = test_db().await;

        let first = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Twitter,
            &identity("ext-1"),
            "blob-1".to_string(),
        );
        let stored_first = db.upsert_account(&first).await.unwrap();

        // Reconnect: new candidate row id, same conflict key
        let mut second = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Twitter,
            &identity("ext-1"),
            "blob-2".to_string(),
        );
        second.display_name = "Alice Updated".to_string();
        let stored_second = db.upsert_account(&second).await.unwrap();

        // Session rotated and identity refreshed, but the original id survives
        assert_eq!(stored_second.id, stored_first.id);
        assert_eq!(stored_second.session_blob, "blob-2");
        assert_eq!(stored_second.display_name, "Alice Updated");

        let all = db.get_accounts_for_owner("owner-1", None).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_deactivate_is_soft() {
        let db = test_db().await;

        let account = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Instagram,
            &identity("ext-2"),
            "blob".to_string(),
        );
        db.upsert_account(&account).await.unwrap();

        db.deactivate_account("owner-1", &account.id).await.unwrap();

        let fetched = db.get_account(&account.id).await.unwrap().unwrap();
        assert!(!fetched.is_active);
        // Status untouched by disconnect
        assert_eq!(fetched.status, AccountStatus::Connected);
    }

    #[tokio::test]
    async fn test_deactivate_wrong_owner() {
        let db = test_db().await;

        let account = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Instagram,
            &identity("ext-3"),
            "blob".to_string(),
        );
        db.upsert_account(&account).await.unwrap();

        let result = db.deactivate_account("owner-2", &account.id).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_get_accounts_by_ids_filters_foreign() {
        let db = test_db().await;

        let mine = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Twitter,
            &identity("ext-a"),
            "blob".to_string(),
        );
        let theirs = ConnectedAccount::from_identity(
            "owner-2",
            Platform::Twitter,
            &identity("ext-b"),
            "blob".to_string(),
        );
        db.upsert_account(&mine).await.unwrap();
        db.upsert_account(&theirs).await.unwrap();

        let ids = vec![mine.id.clone(), theirs.id.clone(), "missing".to_string()];
        let accounts = db.get_accounts_by_ids("owner-1", &ids).await.unwrap();
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].id, mine.id);
    }

    #[tokio::test]
    async fn test_update_account_status() {
        let db = test_db().await;

        let account = ConnectedAccount::from_identity(
            "owner-1",
            Platform::Twitter,
            &identity("ext-4"),
            "blob".to_string(),
        );
        db.upsert_account(&account).await.unwrap();

        db.update_account_status(&account.id, AccountStatus::Expired)
            .await
            .unwrap();

        let fetched = db.get_account(&account.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, AccountStatus::Expired);
        // Session blob and active flag untouched
        assert_eq!(fetched.session_blob, "blob");
        assert!(fetched.is_active);
        assert!(!fetched.is_eligible());
    }

    #[tokio::test]
    async fn test_take_oauth_state_once() {
        let db = test_db().await;

        let state = OAuthState {
            state_token: "tok-1".to_string(),
            owner_id: "owner-1".to_string(),
            platform: Platform::Twitter,
            code_verifier: Some("verifier".to_string()),
            redirect_uri: "http://localhost/cb".to_string(),
            created_at: 100,
            expires_at: 700,
        };
        db.insert_oauth_state(&state).await.unwrap();

        let taken = db.take_oauth_state("tok-1").await.unwrap();
        assert!(taken.is_some());
        assert_eq!(taken.unwrap().code_verifier, Some("verifier".to_string()));

        // Second take finds nothing
        let again = db.take_oauth_state("tok-1").await.unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn test_post_round_trip() {
        let db = test_db().await;

        let post = Post::new(
            "owner-1",
            PostContent {
                text: "hello".to_string(),
                media_path: Some("/tmp/pic.jpg".to_string()),
                media_kind: Some(MediaKind::Photo),
                title: None,
            },
        );
        db.create_post(&post).await.unwrap();

        let fetched = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched.content.text, "hello");
        assert_eq!(fetched.content.media_kind, Some(MediaKind::Photo));
        assert_eq!(fetched.status, PostStatus::Publishing);

        db.update_post_aggregate(&post.id, PostStatus::Partial, Some(123))
            .await
            .unwrap();
        let fetched = db.get_post(&post.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, PostStatus::Partial);
        assert_eq!(fetched.published_at, Some(123));
    }

    #[tokio::test]
    async fn test_post_results_round_trip() {
        let db = test_db().await;

        let post = Post::new("owner-1", PostContent::text("hi"));
        db.create_post(&post).await.unwrap();

        let ok = PostResult::published(
            &post.id,
            "acct-1",
            Platform::Twitter,
            PostOutcome {
                external_post_id: Some("tw-1".to_string()),
                external_url: None,
            },
        );
        let bad = PostResult::failed(&post.id, "acct-2", Platform::TikTok, "worker down".into());
        db.create_post_result(&ok).await.unwrap();
        db.create_post_result(&bad).await.unwrap();

        let results = db.get_post_results(&post.id).await.unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].succeeded());
        assert!(!results[1].succeeded());
        assert_eq!(results[1].error_message, Some("worker down".to_string()));
    }

    #[tokio::test]
    async fn test_monthly_counter() {
        let db = test_db().await;

        assert_eq!(db.monthly_post_count("owner-1", "2026-08").await.unwrap(), 0);
        assert_eq!(
            db.increment_monthly_post_count("owner-1", "2026-08")
                .await
                .unwrap(),
            1
        );
        assert_eq!(
            db.increment_monthly_post_count("owner-1", "2026-08")
                .await
                .unwrap(),
            2
        );
        // Other owners and months are independent
        assert_eq!(db.monthly_post_count("owner-2", "2026-08").await.unwrap(), 0);
        assert_eq!(db.monthly_post_count("owner-1", "2026-09").await.unwrap(), 0);
    }
}
