//! SQS queue listing, tagging, and deletion

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_sqs::Client;
use tracing::{debug, info};

use crate::aws::cleanup::{QueueApi, QueuePage};
use crate::aws::context::AwsContext;

/// SQS client for managing dynamically created chat-room queues
pub struct SqsClient {
    client: Client,
}

impl SqsClient {
    /// Create a new SQS client
    pub async fn new(region: &str) -> Result<Self> {
        let ctx = AwsContext::new(region).await;
        Ok(Self::from_context(&ctx))
    }

    /// Create an SQS client from a pre-loaded AWS context
    pub fn from_context(ctx: &AwsContext) -> Self {
        Self {
            client: ctx.sqs_client(),
        }
    }
}

#[async_trait]
impl QueueApi for SqsClient {
    async fn list_queues(&self, prefix: &str, next_token: Option<&str>) -> Result<QueuePage> {
        debug!(prefix = %prefix, "Listing queues");

        let mut request = self.client.list_queues().queue_name_prefix(prefix);
        if let Some(token) = next_token {
            request = request.next_token(token);
        }
        let response = request.send().await.context("Failed to list queues")?;

        Ok(QueuePage {
            queue_urls: response.queue_urls().to_vec(),
            next_token: response.next_token().map(|s| s.to_string()),
        })
    }

    async fn queue_tags(&self, queue_url: &str) -> Result<HashMap<String, String>> {
        let response = self
            .client
            .list_queue_tags()
            .queue_url(queue_url)
            .send()
            .await
            .context("Failed to list queue tags")?;

        Ok(response.tags().cloned().unwrap_or_default())
    }

    async fn delete_queue(&self, queue_url: &str) -> Result<()> {
        info!(queue = %queue_url, "Deleting queue");

        self.client
            .delete_queue()
            .queue_url(queue_url)
            .send()
            .await
            .context("Failed to delete queue")?;

        Ok(())
    }
}
