//! Small-claims preparation packet.
//!
//! The packet is a fixed checklist filled in from the invoice. It is
//! informational only; regenerating replaces the stored content.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tera::Context;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::config::EscalationConfig;
use crate::db::{Database, LegalPacketRecord, UpsertLegalPacketParams};
use crate::error::RecoveryError;
use crate::recovery::audit::{self, AuditAction};
use crate::recovery::preview::{days_overdue, format_currency};
use crate::recovery::{load_invoice_detail, load_workspace};

const PACKET_TEMPLATE: &str = "\
Small-Claims Preparation Template

Disclaimer: This document is informational and not legal advice.

Workspace: {{ workspace_name }}
Client: {{ client_name }}
Invoice: {{ invoice_number }}
Amount: {{ amount }}
Days overdue: {{ days_overdue }}
Jurisdiction: {{ jurisdiction }}

Suggested filing checklist:
{% for item in checklist %}{{ loop.index }}. {{ item }}
{% endfor %}";

const CHECKLIST: [&str; 4] = [
    "Confirm signed scope/contract and invoice delivery proof.",
    "Attach payment reminders and response history.",
    "Attach this invoice summary and amount calculation.",
    "File in the court matching your contract or debtor location.",
];

pub struct PacketFields<'a> {
    pub workspace_name: &'a str,
    pub client_name: &'a str,
    pub invoice_number: &'a str,
    pub amount: String,
    pub days_overdue: i64,
    pub jurisdiction: &'a str,
}

pub fn render_packet(fields: &PacketFields<'_>) -> Result<String, RecoveryError> {
    let mut context = Context::new();
    context.insert("workspace_name", fields.workspace_name);
    context.insert("client_name", fields.client_name);
    context.insert("invoice_number", fields.invoice_number);
    context.insert("amount", &fields.amount);
    context.insert("days_overdue", &fields.days_overdue);
    context.insert("jurisdiction", fields.jurisdiction);
    context.insert("checklist", &CHECKLIST);

    let rendered = tera::Tera::one_off(PACKET_TEMPLATE, &context, false)
        .map_err(|err| RecoveryError::validation(format!("failed to render packet: {err}")))?;
    Ok(rendered.trim_end().to_string())
}

#[derive(Clone)]
pub struct PacketService {
    db: Arc<dyn Database>,
    config: EscalationConfig,
}

impl PacketService {
    pub fn new(db: Arc<dyn Database>, config: EscalationConfig) -> Self {
        Self { db, config }
    }

    /// Render and store the packet. A blank jurisdiction uses the configured default.
    pub async fn generate(
        &self,
        invoice_id: Uuid,
        jurisdiction: Option<&str>,
        actor: &ActorContext,
    ) -> Result<LegalPacketRecord, RecoveryError> {
        self.generate_at(invoice_id, jurisdiction, actor, Utc::now())
            .await
    }

    pub async fn generate_at(
        &self,
        invoice_id: Uuid,
        jurisdiction: Option<&str>,
        actor: &ActorContext,
        now: DateTime<Utc>,
    ) -> Result<LegalPacketRecord, RecoveryError> {
        let db = self.db.as_ref();
        let detail = load_invoice_detail(db, invoice_id).await?;
        let workspace = load_workspace(db, detail.invoice.workspace_id).await?;
        let jurisdiction = jurisdiction
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.config.default_jurisdiction);

        let content = render_packet(&PacketFields {
            workspace_name: &workspace.name,
            client_name: &detail.client.name,
            invoice_number: &detail.invoice.invoice_number,
            amount: format_currency(detail.invoice.amount_cents, &detail.invoice.currency),
            days_overdue: days_overdue(detail.invoice.due_date, now.date_naive()),
            jurisdiction,
        })?;

        let packet = db
            .upsert_legal_packet(
                invoice_id,
                &UpsertLegalPacketParams {
                    jurisdiction: jurisdiction.to_string(),
                    content,
                    generated_at: now,
                },
            )
            .await?;

        tracing::info!(invoice_id = %invoice_id, jurisdiction, "Legal packet generated");
        audit::record(
            db,
            detail.invoice.workspace_id,
            actor,
            AuditAction::GenerateLegalPacket,
            "invoice",
            invoice_id,
            serde_json::json!({ "jurisdiction": jurisdiction }),
        )
        .await;

        Ok(packet)
    }
}
