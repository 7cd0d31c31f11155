//! Text message delivery.
//!
//! [`Notifier`] applies the phone number rules and hands the message to an
//! [`SmsGateway`]; [`SnsSmsGateway`] delivers through Amazon SNS.

use async_trait::async_trait;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client as SnsClient;
use std::sync::Arc;
use tracing::info;

use crate::{Error, Result};

/// Outbound text message transport.
#[async_trait]
pub trait SmsGateway: Send + Sync {
    /// Send `body` to `to`, returning the gateway's message id.
    async fn send_text(&self, to: &str, body: &str) -> Result<String>;
}

/// SMS delivery through SNS direct publish.
pub struct SnsSmsGateway {
    client: SnsClient,
    origination_number: Option<String>,
}

impl SnsSmsGateway {
    pub fn new(client: SnsClient, origination_number: Option<String>) -> Self {
        Self {
            client,
            origination_number,
        }
    }

    fn string_attribute(value: &str) -> Result<MessageAttributeValue> {
        MessageAttributeValue::builder()
            .data_type("String")
            .string_value(value)
            .build()
            .map_err(|e| Error::Aws(format!("Failed to build SMS attribute: {}", e)))
    }
}

#[async_trait]
impl SmsGateway for SnsSmsGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<String> {
        let mut request = self
            .client
            .publish()
            .phone_number(to)
            .message(body)
            .message_attributes("AWS.SNS.SMS.SMSType", Self::string_attribute("Transactional")?);

        if let Some(sender) = &self.origination_number {
            request = request.message_attributes(
                "AWS.MM.SMS.OriginationNumber",
                Self::string_attribute(sender)?,
            );
        }

        let output = request
            .send()
            .await
            .map_err(|e| Error::Gateway(format!("Failed to publish SMS: {}", e)))?;

        Ok(output.message_id().unwrap_or_default().to_string())
    }
}

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    Sent { message_id: String },
    Suppressed,
}

/// Turns "` 447700900123`" into "`+447700900123`".
///
/// A `+` in a query string decodes to a space, so numbers passed through a
/// URL arrive with a leading space.
pub fn normalize_phone_number(raw: &str) -> String {
    match raw.strip_prefix(' ') {
        Some(rest) => format!("+{}", rest),
        None => raw.to_string(),
    }
}

/// Sends one-line notifications to users.
pub struct Notifier {
    gateway: Arc<dyn SmsGateway>,
    suppressed_number: Option<String>,
}

impl Notifier {
    pub fn new(gateway: Arc<dyn SmsGateway>, suppressed_number: Option<String>) -> Self {
        Self {
            gateway,
            suppressed_number,
        }
    }

    /// Send `body` to `phone_number`. Gateway failures are returned, not
    /// retried.
    pub async fn send(&self, body: &str, phone_number: &str) -> Result<Delivery> {
        let phone_number = normalize_phone_number(phone_number);

        if self.suppressed_number.as_deref() == Some(phone_number.as_str()) {
            info!(phone_number = %phone_number, "Did not send to test number");
            return Ok(Delivery::Suppressed);
        }

        info!(phone_number = %phone_number, "Sending message");
        let message_id = self.gateway.send_text(&phone_number, body).await?;

        Ok(Delivery::Sent { message_id })
    }
}
