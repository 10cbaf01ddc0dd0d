//! AWS client modules for teardown cleanup
//!
//! This module provides:
//! - context: shared AWS SDK configuration
//! - sqs: queue listing, tagging, and deletion
//! - error: AWS error classification
//! - cleanup: the one-shot queue cleanup action

pub mod cleanup;
pub mod context;
pub mod error;
pub mod sqs;

pub use cleanup::{CleanupConfig, CleanupFailure, CleanupReport, QueueApi, QueueCleanup, QueuePage};
pub use context::AwsContext;
pub use error::{classify_anyhow_error, classify_aws_error, AwsError};
pub use sqs::SqsClient;
