//! Inbound webhooks: Stripe billing events and Twilio SMS replies.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::db::{CreateMessageEventParams, Database, MessageChannel, MessageDirection};
use crate::error::{ProviderError, RecoveryError};
use crate::recovery::audit::{self, AuditAction};

type HmacSha256 = Hmac<Sha256>;
type HmacSha1 = Hmac<Sha1>;

/// Default replay window for signed payloads.
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

pub const HANDLED_EVENT_TYPES: [&str; 3] = [
    "checkout.session.completed",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

const PAID_PLAN: &str = "pro";
const FREE_PLAN: &str = "trial";

/// Check a `Stripe-Signature` header (`t=<unix>,v1=<hex>[,v1=...]`).
///
/// The expected signature is HMAC-SHA256 over `"{t}.{payload}"` keyed by the
/// endpoint secret. Any matching `v1` entry is accepted; timestamps outside
/// `tolerance_secs` of `now` are rejected.
pub fn verify_stripe_signature(
    payload: &str,
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: DateTime<Utc>,
) -> Result<(), ProviderError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<&str> = Vec::new();
    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => candidates.push(value),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ProviderError::InvalidSignature("Unable to extract timestamp from header".to_string())
    })?;
    if candidates.is_empty() {
        return Err(ProviderError::InvalidSignature(
            "No v1 signatures found in header".to_string(),
        ));
    }
    if (now.timestamp() - timestamp).abs() > tolerance_secs {
        return Err(ProviderError::InvalidSignature(
            "Timestamp outside the tolerance zone".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload.as_bytes());
    let expected = hex::encode(mac.finalize().into_bytes());

    let matched = candidates
        .iter()
        .any(|candidate| bool::from(candidate.as_bytes().ct_eq(expected.as_bytes())));
    if matched {
        Ok(())
    } else {
        Err(ProviderError::InvalidSignature(
            "No signatures found matching the expected signature for payload".to_string(),
        ))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub data: StripeEventData,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StripeEventData {
    #[serde(default)]
    pub object: serde_json::Value,
}

impl StripeEvent {
    pub fn parse(payload: &str) -> Result<Self, ProviderError> {
        serde_json::from_str(payload).map_err(|e| ProviderError::InvalidResponse {
            provider: "stripe".to_string(),
            reason: format!("Invalid webhook payload: {e}"),
        })
    }

    pub fn is_handled(&self) -> bool {
        HANDLED_EVENT_TYPES.contains(&self.event_type.as_str())
    }

    /// `metadata.workspace_slug` of the event object, set at checkout creation.
    pub fn workspace_slug(&self) -> Option<&str> {
        self.data
            .object
            .get("metadata")
            .and_then(|metadata| metadata.get("workspace_slug"))
            .and_then(serde_json::Value::as_str)
            .filter(|slug| !slug.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum WebhookOutcome {
    Handled {
        ok: bool,
        #[serde(rename = "type")]
        event_type: String,
        id: String,
    },
    Ignored {
        ok: bool,
        ignored: String,
    },
}

/// Apply a verified event. Completed checkouts move the workspace to the paid
/// plan and deleted subscriptions move it back; other handled types are
/// acknowledged without writes.
pub async fn handle_stripe_event(
    db: &dyn Database,
    event: &StripeEvent,
) -> Result<WebhookOutcome, RecoveryError> {
    if !event.is_handled() {
        tracing::debug!(event_type = %event.event_type, "Ignoring Stripe event");
        return Ok(WebhookOutcome::Ignored {
            ok: true,
            ignored: event.event_type.clone(),
        });
    }

    let plan = match event.event_type.as_str() {
        "checkout.session.completed" => Some(PAID_PLAN),
        "customer.subscription.deleted" => Some(FREE_PLAN),
        _ => None,
    };

    if let (Some(plan), Some(slug)) = (plan, event.workspace_slug()) {
        match db.get_workspace_by_slug(slug).await? {
            Some(workspace) => {
                db.update_workspace_plan(workspace.id, plan).await?;
                tracing::info!(workspace = slug, plan, event_id = %event.id, "Workspace plan updated");
                audit::record(
                    db,
                    workspace.id,
                    &ActorContext::system(),
                    AuditAction::UpdateWorkspacePlan,
                    "workspace",
                    workspace.id,
                    serde_json::json!({ "plan": plan, "stripe_event": event.id }),
                )
                .await;
            }
            None => {
                tracing::warn!(workspace = slug, event_id = %event.id, "Stripe event for unknown workspace");
            }
        }
    }

    Ok(WebhookOutcome::Handled {
        ok: true,
        event_type: event.event_type.clone(),
        id: event.id.clone(),
    })
}

// --- Twilio inbound SMS ---

/// Check an `X-Twilio-Signature` header.
///
/// Twilio signs the full webhook URL followed by every POST parameter, sorted
/// by name, as `name` + `value` with no separators. The signature is the
/// base64 HMAC-SHA1 of that string keyed by the account's auth token.
pub fn verify_twilio_signature(
    url: &str,
    params: &[(String, String)],
    header: &str,
    token: &str,
) -> Result<(), ProviderError> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut mac = HmacSha1::new_from_slice(token.as_bytes())
        .map_err(|e| ProviderError::InvalidSignature(e.to_string()))?;
    mac.update(url.as_bytes());
    for (key, value) in sorted {
        mac.update(key.as_bytes());
        mac.update(value.as_bytes());
    }
    let expected = BASE64.encode(mac.finalize().into_bytes());

    if bool::from(header.trim().as_bytes().ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        Err(ProviderError::InvalidSignature(
            "Twilio signature does not match the request".to_string(),
        ))
    }
}

/// The fields of a Twilio inbound message this service reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundSms {
    pub from: String,
    pub body: String,
    pub message_sid: Option<String>,
}

impl InboundSms {
    /// Pick `From`, `Body` and `MessageSid` out of the form parameters.
    pub fn from_params(params: &[(String, String)]) -> Result<Self, ProviderError> {
        let field = |name: &str| {
            params
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.clone())
        };
        let from = field("From")
            .filter(|from| !from.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse {
                provider: "twilio".to_string(),
                reason: "Inbound message has no From number".to_string(),
            })?;
        Ok(Self {
            from,
            body: field("Body").unwrap_or_default(),
            message_sid: field("MessageSid").filter(|sid| !sid.is_empty()),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSmsOutcome {
    pub ok: bool,
    pub from: String,
    pub body: String,
    pub message_sid: Option<String>,
    /// The invoice the reply was attached to, if the sender is a known client.
    pub invoice_id: Option<Uuid>,
}

/// Digits only, so `+1 (555) 010-0` and `15550100` compare equal.
fn phone_key(raw: &str) -> String {
    raw.chars().filter(char::is_ascii_digit).collect()
}

/// Attach an inbound SMS to the sender's oldest open invoice in the workspace.
///
/// The sender is matched on the client's primary phone. Replies from unknown
/// numbers are acknowledged without writes.
pub async fn record_inbound_sms(
    db: &dyn Database,
    workspace_slug: &str,
    sms: &InboundSms,
) -> Result<InboundSmsOutcome, RecoveryError> {
    let mut outcome = InboundSmsOutcome {
        ok: true,
        from: sms.from.clone(),
        body: sms.body.clone(),
        message_sid: sms.message_sid.clone(),
        invoice_id: None,
    };

    let sender = phone_key(&sms.from);
    let Some(workspace) = db.get_workspace_by_slug(workspace_slug).await? else {
        tracing::warn!(workspace = workspace_slug, "Inbound SMS for unknown workspace");
        return Ok(outcome);
    };

    let mut matched = None;
    // Oldest due date first.
    for invoice in db.list_invoices(workspace.id).await? {
        if invoice.status.is_terminal() {
            continue;
        }
        let Some(client) = db.get_client(invoice.client_id).await? else {
            continue;
        };
        if client
            .primary_phone
            .as_deref()
            .is_some_and(|phone| !sender.is_empty() && phone_key(phone) == sender)
        {
            matched = Some(invoice);
            break;
        }
    }

    let Some(invoice) = matched else {
        tracing::info!(message_sid = ?sms.message_sid, "Inbound SMS from unknown sender");
        return Ok(outcome);
    };

    let stage = db
        .get_escalation_run(invoice.id)
        .await?
        .and_then(|run| run.current_stage);
    db.append_message_event(&CreateMessageEventParams {
        invoice_id: invoice.id,
        stage,
        channel: MessageChannel::Sms,
        direction: MessageDirection::Inbound,
        body: sms.body.clone(),
        provider_message_id: sms.message_sid.clone(),
        delivery_state: Some("received".to_string()),
        metadata: serde_json::json!({ "from": sms.from }),
    })
    .await?;

    tracing::info!(invoice_id = %invoice.id, message_sid = ?sms.message_sid, "Inbound SMS recorded");
    audit::record(
        db,
        workspace.id,
        &ActorContext::system(),
        AuditAction::ReceiveInboundSms,
        "invoice",
        invoice.id,
        serde_json::json!({ "from": sms.from, "message_sid": sms.message_sid }),
    )
    .await;

    outcome.invoice_id = Some(invoice.id);
    Ok(outcome)
}
