//! Subscription billing sessions.
//!
//! Stripe Checkout and the customer portal are driven over Stripe's
//! form-encoded REST API. Without credentials the mock provider hands back
//! dashboard URLs so the rest of the product keeps working.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::config::BillingConfig;
use crate::error::ProviderError;

const STRIPE_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BillingSession {
    pub mock: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

#[async_trait]
pub trait BillingProvider: Send + Sync {
    async fn create_checkout(
        &self,
        workspace_slug: &str,
        email: Option<&str>,
    ) -> Result<BillingSession, ProviderError>;

    async fn create_portal(&self, customer_id: &str) -> Result<BillingSession, ProviderError>;
}

pub struct MockBilling {
    app_url: String,
}

impl MockBilling {
    pub fn new(app_url: impl Into<String>) -> Self {
        Self {
            app_url: app_url.into(),
        }
    }
}

#[async_trait]
impl BillingProvider for MockBilling {
    async fn create_checkout(
        &self,
        workspace_slug: &str,
        _email: Option<&str>,
    ) -> Result<BillingSession, ProviderError> {
        tracing::debug!(workspace = workspace_slug, "Mock checkout session");
        Ok(BillingSession {
            mock: true,
            url: format!("{}/dashboard?billing=mock", self.app_url),
            id: None,
        })
    }

    async fn create_portal(&self, _customer_id: &str) -> Result<BillingSession, ProviderError> {
        Ok(BillingSession {
            mock: true,
            url: format!("{}/dashboard?billing=mock-portal", self.app_url),
            id: None,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeSessionResponse {
    id: String,
    url: Option<String>,
}

pub struct StripeBilling {
    http: Client,
    base_url: String,
    secret_key: SecretString,
    price_id: String,
    app_url: String,
}

impl StripeBilling {
    pub fn new(
        secret_key: SecretString,
        price_id: String,
        app_url: String,
    ) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ProviderError::Request {
                provider: "stripe".to_string(),
                reason: format!("failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            base_url: STRIPE_API_BASE.to_string(),
            secret_key,
            price_id,
            app_url,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn post_form(
        &self,
        path: &str,
        form: &[(&str, &str)],
    ) -> Result<BillingSession, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.secret_key.expose_secret())
            .form(form)
            .send()
            .await
            .map_err(|e| ProviderError::Request {
                provider: "stripe".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Rejected {
                provider: "stripe".to_string(),
                status: status.as_u16(),
                body: body.chars().take(200).collect(),
            });
        }

        let session: StripeSessionResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: "stripe".to_string(),
                    reason: e.to_string(),
                })?;
        let url = session.url.ok_or_else(|| ProviderError::InvalidResponse {
            provider: "stripe".to_string(),
            reason: format!("session {} has no url", session.id),
        })?;
        Ok(BillingSession {
            mock: false,
            url,
            id: Some(session.id),
        })
    }
}

#[async_trait]
impl BillingProvider for StripeBilling {
    async fn create_checkout(
        &self,
        workspace_slug: &str,
        email: Option<&str>,
    ) -> Result<BillingSession, ProviderError> {
        let success_url = format!("{}/dashboard?billing=success", self.app_url);
        let cancel_url = format!("{}/dashboard?billing=cancelled", self.app_url);
        let mut form = vec![
            ("mode", "subscription"),
            ("line_items[0][price]", self.price_id.as_str()),
            ("line_items[0][quantity]", "1"),
            ("metadata[workspace_slug]", workspace_slug),
            ("success_url", success_url.as_str()),
            ("cancel_url", cancel_url.as_str()),
        ];
        if let Some(email) = email {
            form.push(("customer_email", email));
        }

        let session = self.post_form("/v1/checkout/sessions", &form).await?;
        tracing::info!(workspace = workspace_slug, "Created Stripe checkout session");
        Ok(session)
    }

    async fn create_portal(&self, customer_id: &str) -> Result<BillingSession, ProviderError> {
        let return_url = format!("{}/dashboard", self.app_url);
        self.post_form(
            "/v1/billing_portal/sessions",
            &[("customer", customer_id), ("return_url", return_url.as_str())],
        )
        .await
    }
}

/// Stripe when the secret key and price id are both set, mock otherwise.
pub fn billing_from_config(
    billing: &BillingConfig,
    app_url: &str,
) -> Result<Arc<dyn BillingProvider>, ProviderError> {
    match (&billing.secret_key, &billing.price_id) {
        (Some(key), Some(price)) => {
            tracing::info!("Billing via Stripe");
            Ok(Arc::new(StripeBilling::new(
                SecretString::from(key.expose_secret().to_string()),
                price.clone(),
                app_url.to_string(),
            )?))
        }
        _ => {
            tracing::info!("Stripe not configured; billing runs in mock mode");
            Ok(Arc::new(MockBilling::new(app_url)))
        }
    }
}
