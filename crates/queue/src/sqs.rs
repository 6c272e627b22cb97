//! AWS SQS queue implementation.

use std::time::Duration;

use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_sqs::config::BehaviorVersion;
use aws_sdk_sqs::types::MessageSystemAttributeName;
use aws_sdk_sqs::Client;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

use powermgmt_core::config::AwsConfig;

use crate::error::QueueError;
use crate::transport::{delivery_delay, Delivery, QueueConsumer, QueueProducer};

/// SQS-backed queue, used for both sending and receiving.
pub struct SqsQueue {
    client: Client,
    name: String,
    queue_url: String,
    visibility_timeout_secs: i32,
}

impl SqsQueue {
    pub fn new(aws: &AwsConfig, queue_name: &str, visibility_timeout_secs: u32) -> Result<Self, QueueError> {
        let queue_url = aws
            .queue_url(queue_name)
            .map_err(|e| QueueError::NotFound(e.to_string()))?;
        let region = aws_sdk_sqs::config::Region::new(aws.region.clone());

        // Build the SQS client config directly rather than from the shared
        // environment loader, which honours AWS_ENDPOINT_URL.
        let mut sqs_config = aws_sdk_sqs::Config::builder()
            .region(region)
            .behavior_version(BehaviorVersion::latest());

        if let (Some(key_id), Some(secret)) = (&aws.access_key_id, &aws.secret_access_key) {
            let creds = Credentials::new(
                key_id,
                secret,
                aws.session_token.clone(),
                None,
                "powermgmt-queue-static",
            );
            sqs_config = sqs_config.credentials_provider(creds);
        }

        if let Some(endpoint) = aws.endpoint_url.as_deref().filter(|e| !e.is_empty()) {
            let url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
                endpoint.to_string()
            } else {
                format!("https://{endpoint}")
            };
            sqs_config = sqs_config.endpoint_url(url);
        }

        let client = Client::from_conf(sqs_config.build());

        info!(
            queue_url = %queue_url,
            region = %aws.region,
            "SQS queue initialized"
        );

        Ok(Self {
            client,
            name: queue_name.to_string(),
            queue_url,
            visibility_timeout_secs: visibility_timeout_secs as i32,
        })
    }
}

#[async_trait]
impl QueueProducer for SqsQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, body: String, delay: Option<Duration>) -> Result<String, QueueError> {
        let mut request = self
            .client
            .send_message()
            .queue_url(&self.queue_url)
            .message_body(body);

        if let Some(delay) = delay {
            let secs = delivery_delay(&self.name, delay).as_secs() as i32;
            request = request.delay_seconds(secs);
        }

        let resp = request
            .send()
            .await
            .map_err(|e| QueueError::Send(format!("SQS send failed: {e:?}")))?;

        let id = resp.message_id().unwrap_or("unknown").to_string();
        debug!(queue = %self.name, message_id = %id, "Sent SQS message");
        Ok(id)
    }
}

#[async_trait]
impl QueueConsumer for SqsQueue {
    async fn receive(&self, max: u32) -> Result<Vec<Delivery>, QueueError> {
        // SQS caps at 10 messages per request.
        let capped = max.clamp(1, 10) as i32;

        debug!(queue = %self.name, max_messages = capped, "Polling SQS");

        let resp = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(capped)
            .wait_time_seconds(20)
            .visibility_timeout(self.visibility_timeout_secs)
            .message_system_attribute_names(MessageSystemAttributeName::All)
            .send()
            .await
            .map_err(|e| QueueError::Connection(format!("SQS receive failed: {e:?}")))?;

        let sqs_messages = resp.messages.unwrap_or_default();
        debug!(count = sqs_messages.len(), "Received SQS messages");

        let mut messages = Vec::with_capacity(sqs_messages.len());
        for msg in sqs_messages {
            let receipt = msg
                .receipt_handle()
                .ok_or_else(|| QueueError::Parse("missing receipt handle".into()))?
                .to_string();

            let attribute = |name: &MessageSystemAttributeName| {
                msg.attributes().and_then(|attrs| attrs.get(name)).cloned()
            };

            // SentTimestamp is epoch millis.
            let sent_at = attribute(&MessageSystemAttributeName::SentTimestamp)
                .and_then(|ts| ts.parse::<i64>().ok())
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
                .unwrap_or_else(Utc::now);

            let receive_count = attribute(&MessageSystemAttributeName::ApproximateReceiveCount)
                .and_then(|c| c.parse::<u32>().ok())
                .unwrap_or(1);

            messages.push(Delivery {
                message_id: msg.message_id().unwrap_or("unknown").to_string(),
                body: msg.body().unwrap_or("").to_string(),
                receipt,
                sent_at,
                receive_count,
            });
        }

        Ok(messages)
    }

    async fn ack(&self, receipt: &str) -> Result<(), QueueError> {
        debug!(queue = %self.name, "Deleting SQS message");

        self.client
            .delete_message()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .send()
            .await
            .map_err(|e| QueueError::Ack(format!("SQS delete failed: {e:?}")))?;

        Ok(())
    }

    async fn release(&self, receipt: &str) -> Result<(), QueueError> {
        debug!(queue = %self.name, "Releasing SQS message (visibility=0)");

        self.client
            .change_message_visibility()
            .queue_url(&self.queue_url)
            .receipt_handle(receipt)
            .visibility_timeout(0)
            .send()
            .await
            .map_err(|e| QueueError::Provider(format!("SQS visibility change failed: {e:?}")))?;

        Ok(())
    }
}
