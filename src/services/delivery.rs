//! Outbound message delivery.
//!
//! Providers accept a destination and a rendered body and hand back a
//! delivery handle. Nothing waits on actual delivery: the initial state
//! (`queued` for most providers) is recorded and later updates would arrive
//! through a separate inbound channel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::SmsConfig;
use crate::db::MessageChannel;
use crate::error::ProviderError;

const TWILIO_API_BASE: &str = "https://api.twilio.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeliveryReceipt {
    pub provider_message_id: String,
    pub delivery_state: String,
    pub mock: bool,
}

#[async_trait]
pub trait MessageDelivery: Send + Sync {
    async fn send(
        &self,
        channel: MessageChannel,
        destination: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError>;
}

/// Accepts everything and returns a synthetic `mock_...` id in state `queued`.
#[derive(Debug, Default, Clone)]
pub struct MockDelivery;

#[async_trait]
impl MessageDelivery for MockDelivery {
    async fn send(
        &self,
        channel: MessageChannel,
        destination: &str,
        _body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let receipt = DeliveryReceipt {
            provider_message_id: format!("mock_{}", &id[..10]),
            delivery_state: "queued".to_string(),
            mock: true,
        };
        tracing::debug!(
            channel = channel.as_str(),
            destination,
            provider_message_id = %receipt.provider_message_id,
            "Mock delivery accepted message"
        );
        Ok(receipt)
    }
}

#[derive(Debug, Deserialize)]
struct TwilioMessageResponse {
    sid: String,
    status: Option<String>,
}

/// Twilio Programmable Messaging over its REST API. SMS only.
pub struct TwilioSmsDelivery {
    http: Client,
    base_url: String,
    account_sid: String,
    auth_token: SecretString,
    from_number: String,
}

impl TwilioSmsDelivery {
    pub fn new(
        account_sid: String,
        auth_token: SecretString,
        from_number: String,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| ProviderError::Request {
                provider: "twilio".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: TWILIO_API_BASE.to_string(),
            account_sid,
            auth_token,
            from_number,
        })
    }

    /// Point the client at a different API host (used against local stubs).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl MessageDelivery for TwilioSmsDelivery {
    async fn send(
        &self,
        channel: MessageChannel,
        destination: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        if channel != MessageChannel::Sms {
            return Err(ProviderError::UnsupportedChannel(channel.as_str().to_string()));
        }

        let url = format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.base_url, self.account_sid
        );
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&[
                ("To", destination),
                ("From", self.from_number.as_str()),
                ("Body", body),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "twilio".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                provider: "twilio".to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let parsed: TwilioMessageResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: "twilio".to_string(),
                    reason: e.to_string(),
                })?;
        Ok(DeliveryReceipt {
            provider_message_id: parsed.sid,
            delivery_state: parsed.status.unwrap_or_else(|| "queued".to_string()),
            mock: false,
        })
    }
}

/// Routes each channel to its provider.
#[derive(Clone)]
pub struct DeliveryRouter {
    email: Arc<dyn MessageDelivery>,
    sms: Arc<dyn MessageDelivery>,
}

impl DeliveryRouter {
    pub fn new(email: Arc<dyn MessageDelivery>, sms: Arc<dyn MessageDelivery>) -> Self {
        Self { email, sms }
    }

    /// Mock for every channel.
    pub fn mock() -> Self {
        Self::new(Arc::new(MockDelivery), Arc::new(MockDelivery))
    }

    /// Twilio for SMS when fully configured, mock otherwise. Email is always mock.
    pub fn from_config(sms: &SmsConfig) -> Result<Self, ProviderError> {
        let sms_provider: Arc<dyn MessageDelivery> =
            match (&sms.account_sid, &sms.auth_token, &sms.from_number) {
                (Some(sid), Some(token), Some(from)) => {
                    tracing::info!("SMS delivery via Twilio");
                    Arc::new(TwilioSmsDelivery::new(
                        sid.clone(),
                        SecretString::from(token.expose_secret().to_string()),
                        from.clone(),
                    )?)
                }
                _ => {
                    tracing::info!("Twilio not configured; SMS delivery runs in mock mode");
                    Arc::new(MockDelivery)
                }
            };
        Ok(Self::new(Arc::new(MockDelivery), sms_provider))
    }
}

#[async_trait]
impl MessageDelivery for DeliveryRouter {
    async fn send(
        &self,
        channel: MessageChannel,
        destination: &str,
        body: &str,
    ) -> Result<DeliveryReceipt, ProviderError> {
        match channel {
            MessageChannel::Email => self.email.send(channel, destination, body).await,
            MessageChannel::Sms => self.sms.send(channel, destination, body).await,
        }
    }
}
