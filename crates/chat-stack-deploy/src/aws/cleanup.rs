//! One-shot queue cleanup for teardown
//!
//! The chat server creates one SQS queue per chat room at runtime; those
//! queues are not declared in the stack graph and must be discovered and
//! deleted when the stack comes down. The run is idempotent: queues that
//! disappeared between listing and deletion count as already gone, and a
//! re-run over an empty account is a no-op.
//!
//! Per-queue failures are collected into the report rather than thrown, so
//! one refused deletion never blocks the rest of the teardown. The whole
//! run is bounded by a deadline; on exhaustion it is abandoned and reported
//! as timed out, never retried in-process.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use chat_stack_common::defaults::DEFAULT_CLEANUP_TIMEOUT_SECS;
use chat_stack_common::tags::{self, QUEUE_NAME_PREFIX};

use crate::aws::error::classify_anyhow_error;

/// One page of a queue listing
#[derive(Debug, Clone)]
pub struct QueuePage {
    pub queue_urls: Vec<String>,
    pub next_token: Option<String>,
}

/// Queue operations needed by the cleanup run
///
/// Implemented by [`crate::aws::SqsClient`] against real SQS and by an
/// in-memory fake in tests.
#[async_trait]
pub trait QueueApi {
    /// List one page of queue URLs whose name starts with `prefix`
    async fn list_queues(&self, prefix: &str, next_token: Option<&str>) -> Result<QueuePage>;

    /// Fetch the tags of a queue
    async fn queue_tags(&self, queue_url: &str) -> Result<HashMap<String, String>>;

    /// Delete a queue
    async fn delete_queue(&self, queue_url: &str) -> Result<()>;
}

/// Cleanup configuration
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Queue name prefix to enumerate
    pub queue_prefix: String,
    /// Actually delete queues (false = dry run)
    pub dry_run: bool,
    /// Maximum duration for the whole run
    pub timeout: Duration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            queue_prefix: QUEUE_NAME_PREFIX.to_string(),
            dry_run: true,
            timeout: Duration::from_secs(DEFAULT_CLEANUP_TIMEOUT_SECS),
        }
    }
}

/// A queue that could not be deleted
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub queue_url: String,
    pub reason: String,
}

/// Report of one cleanup run
#[derive(Debug, Default)]
pub struct CleanupReport {
    /// Queues deleted by this run
    pub deleted: usize,
    /// Queues left alone: unmanaged, already gone, or dry run
    pub skipped: usize,
    /// Per-queue failures; never fatal to the run
    pub errors: Vec<CleanupFailure>,
    /// The deadline expired before the run finished
    pub timed_out: bool,
}

impl CleanupReport {
    /// True if the operator should be warned about this run
    pub fn is_partial_failure(&self) -> bool {
        !self.errors.is_empty() || self.timed_out
    }
}

/// One-shot cleanup of dynamically created chat-room queues
pub struct QueueCleanup<Q> {
    queues: Q,
    config: CleanupConfig,
}

impl<Q: QueueApi> QueueCleanup<Q> {
    pub fn new(queues: Q, config: CleanupConfig) -> Self {
        Self { queues, config }
    }

    /// Run the cleanup once
    ///
    /// Returns `Err` only when enumeration itself fails or the run is
    /// cancelled; everything else is reported, not thrown.
    pub async fn run(&self, cancel: Option<&CancellationToken>) -> Result<CleanupReport> {
        let deadline = Instant::now() + self.config.timeout;
        let mut report = CleanupReport::default();

        info!(
            prefix = %self.config.queue_prefix,
            dry_run = self.config.dry_run,
            "Scanning for chat-room queues"
        );

        // Enumerate every page before deleting anything; a single page is
        // never taken as the full set.
        let mut queue_urls: Vec<String> = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            check_cancelled(cancel)?;

            let page = match bounded(
                deadline,
                self.queues
                    .list_queues(&self.config.queue_prefix, next_token.as_deref()),
            )
            .await
            {
                Some(result) => result.context("Failed to list queues")?,
                None => {
                    warn!("Queue listing timed out; abandoning run");
                    report.timed_out = true;
                    return Ok(report);
                }
            };

            queue_urls.extend(page.queue_urls);
            next_token = page.next_token;
            if next_token.is_none() {
                break;
            }
        }

        if queue_urls.is_empty() {
            info!("No queues found");
            return Ok(report);
        }
        info!(count = queue_urls.len(), "Found queues with matching prefix");

        for queue_url in &queue_urls {
            check_cancelled(cancel)?;

            if !self.cleanup_queue(deadline, queue_url, &mut report).await {
                warn!(
                    deleted = report.deleted,
                    remaining = queue_urls.len() - report.deleted - report.skipped,
                    "Queue cleanup timed out; abandoning run"
                );
                report.timed_out = true;
                return Ok(report);
            }
        }

        info!(
            deleted = report.deleted,
            skipped = report.skipped,
            failed = report.errors.len(),
            "Queue cleanup complete"
        );
        Ok(report)
    }

    /// Clean up a single queue; returns false if the deadline expired
    async fn cleanup_queue(
        &self,
        deadline: Instant,
        queue_url: &str,
        report: &mut CleanupReport,
    ) -> bool {
        let tags = match bounded(deadline, self.queues.queue_tags(queue_url)).await {
            None => return false,
            Some(Ok(tags)) => tags,
            Some(Err(e)) => {
                record_failure(queue_url, e, "Failed to read queue tags", report);
                return true;
            }
        };

        if !tags::is_managed(&tags) {
            debug!(queue = %queue_url, "Skipping queue not owned by the chat system");
            report.skipped += 1;
            return true;
        }

        if self.config.dry_run {
            info!(queue = %queue_url, "[DRY RUN] Would delete");
            report.skipped += 1;
            return true;
        }

        match bounded(deadline, self.queues.delete_queue(queue_url)).await {
            None => false,
            Some(Ok(())) => {
                info!(queue = %queue_url, "Deleted");
                report.deleted += 1;
                true
            }
            Some(Err(e)) => {
                record_failure(queue_url, e, "Failed to delete queue", report);
                true
            }
        }
    }
}

/// Classify one per-queue error: not-found is success, anything else is
/// collected into the report.
fn record_failure(
    queue_url: &str,
    error: anyhow::Error,
    what: &'static str,
    report: &mut CleanupReport,
) {
    let classified = classify_anyhow_error(&error);
    if classified.is_not_found() {
        debug!(queue = %queue_url, "Queue already deleted");
        report.skipped += 1;
        return;
    }

    match classified.suggestion() {
        Some(hint) => warn!(queue = %queue_url, error = ?error, hint, "{what}"),
        None => warn!(queue = %queue_url, error = ?error, "{what}"),
    }
    report.errors.push(CleanupFailure {
        queue_url: queue_url.to_string(),
        reason: format!("{error:#}"),
    });
}

/// Run a future against whatever remains of the deadline; None on expiry
async fn bounded<T>(deadline: Instant, fut: impl Future<Output = T>) -> Option<T> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    timeout(remaining, fut).await.ok()
}

fn check_cancelled(cancel: Option<&CancellationToken>) -> Result<()> {
    if let Some(token) = cancel {
        if token.is_cancelled() {
            bail!("Queue cleanup cancelled");
        }
    }
    Ok(())
}
