//! AWS error classification
//!
//! Provides typed errors for SQS operations using the error `.code()`
//! instead of string matching on Debug format, with a debug-string
//! fallback for errors that arrive without typed metadata.

use thiserror::Error;

/// AWS error categories for cleanup logic
#[derive(Debug, Error)]
pub enum AwsError {
    /// Queue was not found (safe to skip in cleanup)
    #[error("Queue not found: {queue}")]
    NotFound { queue: String },

    /// Rate limit exceeded (retryable on a later run)
    #[error("Rate limit exceeded")]
    Throttled,

    /// The caller is missing SQS permissions
    #[error("Access denied")]
    AccessDenied,

    /// Generic AWS SDK error with code and message
    #[error("AWS error: {message}")]
    Sdk {
        code: Option<String>,
        message: String,
    },
}

impl AwsError {
    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, AwsError::NotFound { .. })
    }

    /// Check if this error may succeed on a later cleanup run
    pub fn is_retryable(&self) -> bool {
        matches!(self, AwsError::Throttled)
    }

    /// Get a user-friendly suggestion for resolving this error, if available
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            AwsError::AccessDenied => Some(
                "The cleanup role needs sqs:ListQueues, sqs:ListQueueTags, and sqs:DeleteQueue.",
            ),
            AwsError::Throttled => {
                Some("SQS API rate limit hit. Re-run the cleanup after a short wait.")
            }
            AwsError::Sdk { code: Some(c), .. } => suggestion_for_code(c),
            _ => None,
        }
    }
}

/// Known AWS error codes for "queue not found" conditions
const NOT_FOUND_CODES: &[&str] = &[
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    "NonExistentQueue",
];

/// Known AWS error codes for throttling/rate limiting
const THROTTLING_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestThrottled",
    "RequestLimitExceeded",
];

/// Known AWS error codes for missing permissions
const ACCESS_DENIED_CODES: &[&str] = &["AccessDenied", "AccessDeniedException"];

/// Classify an AWS SDK error using the error code
pub fn classify_aws_error(code: Option<&str>, message: Option<&str>) -> AwsError {
    let message = message.unwrap_or("Unknown error").to_string();

    match code {
        Some(c) if NOT_FOUND_CODES.contains(&c) => AwsError::NotFound { queue: message },
        Some(c) if THROTTLING_CODES.contains(&c) => AwsError::Throttled,
        Some(c) if ACCESS_DENIED_CODES.contains(&c) => AwsError::AccessDenied,
        _ => AwsError::Sdk {
            code: code.map(|s| s.to_string()),
            message,
        },
    }
}

/// Classify an error from an anyhow::Error by extracting the AWS error code
///
/// Walks the error chain using `ProvideErrorMetadata` to extract `.code()`
/// and `.message()` from any SQS SDK error. Falls back to string matching
/// on the Debug representation if no typed error is found.
pub fn classify_anyhow_error(error: &anyhow::Error) -> AwsError {
    use aws_sdk_sqs::error::ProvideErrorMetadata;

    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<aws_sdk_sqs::error::SdkError<
            aws_sdk_sqs::operation::list_queues::ListQueuesError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_sqs::error::SdkError<
            aws_sdk_sqs::operation::list_queue_tags::ListQueueTagsError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
        if let Some(e) = cause.downcast_ref::<aws_sdk_sqs::error::SdkError<
            aws_sdk_sqs::operation::delete_queue::DeleteQueueError,
        >>() {
            let meta = ProvideErrorMetadata::meta(e);
            return classify_aws_error(meta.code(), meta.message());
        }
    }

    // Fallback: extract error code from the debug string representation
    let debug_str = format!("{error:?}");
    if let Some(code) = extract_error_code(&debug_str) {
        return classify_aws_error(Some(&code), Some(&debug_str));
    }

    AwsError::Sdk {
        code: None,
        message: error.to_string(),
    }
}

/// All known AWS error codes for extraction from debug strings (flat list)
const ALL_KNOWN_CODES: &[&str] = &[
    // Not found
    "AWS.SimpleQueueService.NonExistentQueue",
    "QueueDoesNotExist",
    "NonExistentQueue",
    // Throttling
    "Throttling",
    "ThrottlingException",
    "RequestThrottled",
    "RequestLimitExceeded",
    // Permissions
    "AccessDenied",
    "AccessDeniedException",
    // Lifecycle
    "AWS.SimpleQueueService.QueueDeletedRecently",
];

/// Extract an AWS error code from a debug string representation
fn extract_error_code(debug_str: &str) -> Option<String> {
    for code in ALL_KNOWN_CODES {
        if debug_str.contains(code) {
            return Some((*code).to_string());
        }
    }

    // Try to extract any code from a `code: Some("...")` pattern
    if let Some(start) = debug_str.find("code: Some(\"") {
        let rest = &debug_str[start + 12..];
        if let Some(end) = rest.find('"') {
            return Some(rest[..end].to_string());
        }
    }

    None
}

/// Error code to user-friendly suggestion mapping
const SUGGESTIONS: &[(&str, &str)] = &[
    (
        "AWS.SimpleQueueService.QueueDeletedRecently",
        "The queue was deleted within the last 60 seconds; nothing to do.",
    ),
    (
        "RequestThrottled",
        "SQS API rate limit hit. Re-run the cleanup after a short wait.",
    ),
];

/// Get a user-friendly suggestion for a known error code
fn suggestion_for_code(code: &str) -> Option<&'static str> {
    SUGGESTIONS.iter().find(|(c, _)| *c == code).map(|(_, s)| *s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes() {
        for code in NOT_FOUND_CODES {
            let err = classify_aws_error(Some(code), Some("some message"));
            assert!(err.is_not_found(), "Expected NotFound for code: {code}");
        }
    }

    #[test]
    fn throttling_codes() {
        for code in THROTTLING_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(err.is_retryable(), "Expected retryable for code: {code}");
            assert!(matches!(err, AwsError::Throttled));
        }
    }

    #[test]
    fn access_denied_codes() {
        for code in ACCESS_DENIED_CODES {
            let err = classify_aws_error(Some(code), Some("msg"));
            assert!(matches!(err, AwsError::AccessDenied));
            assert!(err.suggestion().is_some());
        }
    }

    #[test]
    fn unknown_and_missing_codes() {
        let err = classify_aws_error(Some("SomeNewError"), Some("details"));
        assert!(matches!(err, AwsError::Sdk { .. }));

        let err2 = classify_aws_error(None, Some("something failed"));
        assert!(matches!(err2, AwsError::Sdk { code: None, .. }));
    }

    #[test]
    fn extract_known_codes_from_debug_string() {
        for code in ALL_KNOWN_CODES {
            let debug_str = format!("SdkError {{ code: Some(\"{code}\"), message: \"fail\" }}");
            assert!(
                extract_error_code(&debug_str).is_some(),
                "Failed to extract any code from string containing: {code}"
            );
        }
    }

    #[test]
    fn extract_code_from_code_field() {
        let debug_str = r#"SdkError { code: Some("SomeRandomCode"), message: "fail" }"#;
        assert_eq!(
            extract_error_code(debug_str).as_deref(),
            Some("SomeRandomCode")
        );
    }

    #[test]
    fn extract_none_from_unrelated_string() {
        assert!(extract_error_code("connection refused").is_none());
    }

    #[test]
    fn classify_anyhow_falls_back_to_debug_string() {
        let err = anyhow::anyhow!(
            "service error: AWS.SimpleQueueService.NonExistentQueue: queue is gone"
        );
        assert!(classify_anyhow_error(&err).is_not_found());

        let err = anyhow::anyhow!("service error: RequestThrottled: slow down");
        assert!(classify_anyhow_error(&err).is_retryable());

        let err = anyhow::anyhow!("connection refused");
        assert!(matches!(
            classify_anyhow_error(&err),
            AwsError::Sdk { code: None, .. }
        ));
    }
}
