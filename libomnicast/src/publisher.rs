//! Publish orchestration
//!
//! Fans one piece of content out to every eligible target account, each on
//! its own task so a slow, failing, or panicking adapter cannot take the
//! others down. Per-platform semaphores cap concurrency against any single
//! platform; every adapter call runs under a timeout; transient failures get
//! one automatic retry. Results are persisted as they arrive and the
//! aggregate status is derived once, at the join barrier.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::{OmnicastError, PlatformError, Result};
use crate::platforms::PlatformRegistry;
use crate::session::SessionCipher;
use crate::store::Database;
use crate::types::{
    AccountStatus, ConnectedAccount, Platform, Post, PostContent, PostResult, PostStatus,
    PublishReport,
};

pub struct Publisher {
    db: Database,
    registry: PlatformRegistry,
    cipher: SessionCipher,
    per_platform_concurrency: usize,
    call_timeout: Duration,
    media_timeout: Duration,
}

impl Publisher {
    pub fn new(
        db: Database,
        registry: PlatformRegistry,
        cipher: SessionCipher,
        config: &Config,
    ) -> Self {
        Self {
            db,
            registry,
            cipher,
            per_platform_concurrency: config.publish.per_platform_concurrency.max(1),
            call_timeout: Duration::from_secs(config.publish.call_timeout_secs),
            media_timeout: Duration::from_secs(config.publish.media_timeout_secs),
        }
    }

    /// Publish content to the given accounts.
    ///
    /// Ineligible accounts (inactive or not connected) are dropped up front;
    /// if none survive, no post row is created and `NoEligibleAccounts` is
    /// returned. Otherwise every eligible account gets exactly one result,
    /// and the report's status reflects all of them.
    pub async fn publish(
        &self,
        owner_id: &str,
        content: PostContent,
        account_ids: &[String],
    ) -> Result<PublishReport> {
        if content.text.trim().is_empty() && !content.has_media() {
            return Err(OmnicastError::InvalidInput(
                "post needs text or media".to_string(),
            ));
        }
        if account_ids.is_empty() {
            return Err(OmnicastError::InvalidInput(
                "no target accounts given".to_string(),
            ));
        }

        let accounts = self.db.get_accounts_by_ids(owner_id, account_ids).await?;
        let eligible: Vec<ConnectedAccount> =
            accounts.into_iter().filter(|a| a.is_eligible()).collect();
        if eligible.is_empty() {
            return Err(OmnicastError::NoEligibleAccounts);
        }

        let post = Post::new(owner_id, content.clone());
        self.db.create_post(&post).await?;

        tracing::info!(
            post_id = %post.id,
            targets = eligible.len(),
            "starting publish fan-out"
        );

        let timeout = if content.has_media() {
            self.media_timeout
        } else {
            self.call_timeout
        };

        // One semaphore per platform present in the target set
        let mut semaphores: HashMap<Platform, Arc<Semaphore>> = HashMap::new();
        for account in &eligible {
            semaphores
                .entry(account.platform)
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_platform_concurrency)));
        }

        let mut handles: Vec<(ConnectedAccount, JoinHandle<PostResult>)> =
            Vec::with_capacity(eligible.len());
        for account in eligible {
            let semaphore = semaphores[&account.platform].clone();
            let db = self.db.clone();
            let registry = self.registry.clone();
            let cipher = self.cipher.clone();
            let content = content.clone();
            let post_id = post.id.clone();
            let task_account = account.clone();

            let handle = tokio::spawn(async move {
                // Closed only if the publisher is dropped mid-flight
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return PostResult::failed(
                            &post_id,
                            &task_account.id,
                            task_account.platform,
                            "publish cancelled".to_string(),
                        )
                    }
                };

                let result = publish_to_account(
                    &db, &registry, &cipher, &post_id, &task_account, &content, timeout,
                )
                .await;

                // Persist incrementally so a crash mid-fan-out leaves a
                // partial audit trail rather than nothing
                if let Err(e) = db.create_post_result(&result).await {
                    tracing::error!(
                        account_id = %task_account.id,
                        error = %e,
                        "failed to persist post result"
                    );
                }
                result
            });
            handles.push((account, handle));
        }

        let (in_flight, join_handles): (Vec<_>, Vec<_>) = handles.into_iter().unzip();
        let joined = futures::future::join_all(join_handles).await;

        let mut results = Vec::with_capacity(joined.len());
        for (account, outcome) in in_flight.into_iter().zip(joined) {
            match outcome {
                Ok(result) => results.push(result),
                Err(join_error) => {
                    // A panicking adapter only loses its own slot
                    tracing::error!(
                        account_id = %account.id,
                        error = %join_error,
                        "publish task aborted"
                    );
                    let result = PostResult::failed(
                        &post.id,
                        &account.id,
                        account.platform,
                        format!("publish task aborted: {}", join_error),
                    );
                    if let Err(e) = self.db.create_post_result(&result).await {
                        tracing::error!(error = %e, "failed to persist aborted result");
                    }
                    results.push(result);
                }
            }
        }

        let status = PostStatus::from_results(&results);
        let published_at = match status {
            PostStatus::Published | PostStatus::Partial => Some(chrono::Utc::now().timestamp()),
            _ => None,
        };
        self.db
            .update_post_aggregate(&post.id, status, published_at)
            .await?;

        if status != PostStatus::Failed {
            let month = chrono::Utc::now().format("%Y-%m").to_string();
            self.db
                .increment_monthly_post_count(owner_id, &month)
                .await?;
        }

        let report = PublishReport::from_results(&post.id, results);
        tracing::info!(
            post_id = %report.post_id,
            status = %status.as_str(),
            succeeded = report.succeeded,
            failed = report.failed,
            "publish fan-out complete"
        );
        Ok(report)
    }

    /// Fetch the persisted report for an earlier publish
    pub async fn report(&self, post_id: &str) -> Result<Option<PublishReport>> {
        match self.db.get_post(post_id).await? {
            Some(_) => {
                let results = self.db.get_post_results(post_id).await?;
                Ok(Some(PublishReport::from_results(post_id, results)))
            }
            None => Ok(None),
        }
    }
}

/// One account's complete publish attempt: decode, restore, post, with a
/// single retry when the failure is transient. Restore and post each run
/// under the caller's timeout, and a rejected session flips the account to
/// expired so later publishes skip it. Always returns a result, never an
/// error.
async fn publish_to_account(
    db: &Database,
    registry: &PlatformRegistry,
    cipher: &SessionCipher,
    post_id: &str,
    account: &ConnectedAccount,
    content: &PostContent,
    timeout: Duration,
) -> PostResult {
    let fail = |msg: String| PostResult::failed(post_id, &account.id, account.platform, msg);

    let adapter = match registry.get(account.platform) {
        Ok(adapter) => adapter,
        Err(e) => return fail(e.to_string()),
    };

    // A corrupt blob fails this account, not the whole post
    let session = match cipher.decode(&account.session_blob) {
        Ok(session) => session,
        Err(e) => {
            tracing::warn!(account_id = %account.id, error = %e, "session blob unreadable");
            return fail(e.to_string());
        }
    };

    match tokio::time::timeout(timeout, adapter.restore_session(&session)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            if matches!(
                e,
                OmnicastError::Platform(PlatformError::SessionExpired(_))
            ) {
                mark_session_expired(db, account).await;
            }
            return fail(e.to_string());
        }
        Err(_) => {
            return fail(
                PlatformError::Network(format!(
                    "session restore timed out after {:?}",
                    timeout
                ))
                .to_string(),
            )
        }
    }

    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = match tokio::time::timeout(timeout, adapter.post(&session, content)).await {
            Ok(result) => result,
            Err(_) => Err(PlatformError::Network(format!(
                "post timed out after {:?}",
                timeout
            ))
            .into()),
        };

        match outcome {
            Ok(outcome) => {
                tracing::debug!(
                    account_id = %account.id,
                    platform = %account.platform,
                    "published"
                );
                return PostResult::published(post_id, &account.id, account.platform, outcome);
            }
            Err(OmnicastError::Platform(e)) if e.is_transient() && attempts < 2 => {
                tracing::warn!(
                    account_id = %account.id,
                    error = %e,
                    "transient failure, retrying"
                );
            }
            Err(e) => {
                tracing::warn!(
                    account_id = %account.id,
                    platform = %account.platform,
                    error = %e,
                    "publish failed"
                );
                if matches!(
                    e,
                    OmnicastError::Platform(PlatformError::SessionExpired(_))
                ) {
                    mark_session_expired(db, account).await;
                }
                return fail(e.to_string());
            }
        }
    }
}

/// A platform rejecting stored session material means every future attempt
/// with that blob will fail too; record that on the account so it drops out
/// of the eligible set until the owner reconnects.
async fn mark_session_expired(db: &Database, account: &ConnectedAccount) {
    tracing::info!(
        account_id = %account.id,
        platform = %account.platform,
        "session rejected, marking account expired"
    );
    if let Err(e) = db
        .update_account_status(&account.id, AccountStatus::Expired)
        .await
    {
        tracing::error!(account_id = %account.id, error = %e, "failed to update account status");
    }
}
