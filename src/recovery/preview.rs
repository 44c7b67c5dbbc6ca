//! Read-only "what would be sent next" computation.

use std::collections::HashMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::db::{ClientRecord, EscalationStage, InvoiceRecord, MessageChannel, WorkspaceRecord};
use crate::recovery::InvoiceDetail;
use crate::recovery::stage::next_stage;
use crate::recovery::templates::{render_template, template_for};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePreview {
    pub invoice_id: Uuid,
    pub stage: EscalationStage,
    /// Present iff the client has a primary email.
    pub email_body: Option<String>,
    /// Present iff the client has a primary phone.
    pub sms_body: Option<String>,
    /// Advisory only; nothing is enqueued for this time.
    pub recommended_send_at: DateTime<Utc>,
}

impl StagePreview {
    pub fn body(&self, channel: MessageChannel) -> Option<&str> {
        match channel {
            MessageChannel::Email => self.email_body.as_deref(),
            MessageChannel::Sms => self.sms_body.as_deref(),
        }
    }

    /// Channels with a non-empty rendered body, in `MessageChannel::ALL` order.
    pub fn deliverable_channels(&self) -> Vec<MessageChannel> {
        MessageChannel::ALL
            .into_iter()
            .filter(|channel| self.body(*channel).is_some_and(|body| !body.is_empty()))
            .collect()
    }
}

/// Whole calendar days past due; zero when due today or later.
pub fn days_overdue(due_date: NaiveDate, today: NaiveDate) -> i64 {
    (today - due_date).num_days().max(0)
}

fn currency_symbol(code: &str) -> Option<&'static str> {
    match code {
        "USD" => Some("$"),
        "EUR" => Some("€"),
        "GBP" => Some("£"),
        "CAD" => Some("CA$"),
        "AUD" => Some("A$"),
        "JPY" => Some("¥"),
        _ => None,
    }
}

fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (idx, ch) in digits.chars().enumerate() {
        if idx > 0 && (digits.len() - idx) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// en-US style money: `$1,450.00`, `€12.50`, `¥1,450`, `CHF 99.00`.
pub fn format_currency(amount_cents: i64, currency: &str) -> String {
    let code = currency.trim().to_ascii_uppercase();
    let sign = if amount_cents < 0 { "-" } else { "" };
    let abs = amount_cents.unsigned_abs();
    let (units, fraction) = (abs / 100, abs % 100);

    let number = if code == "JPY" {
        group_thousands(units + u64::from(fraction >= 50))
    } else {
        format!("{}.{fraction:02}", group_thousands(units))
    };

    match currency_symbol(&code) {
        Some(symbol) => format!("{sign}{symbol}{number}"),
        None => format!("{sign}{code} {number}"),
    }
}

/// Placeholder values shared by every template.
pub fn build_preview_context(
    invoice: &InvoiceRecord,
    client: &ClientRecord,
    workspace: &WorkspaceRecord,
    today: NaiveDate,
    target_offset_days: u16,
) -> HashMap<String, String> {
    let target_date = today
        .checked_add_days(Days::new(u64::from(target_offset_days)))
        .unwrap_or(today);

    HashMap::from([
        ("client_name".to_string(), client.name.clone()),
        ("invoice_number".to_string(), invoice.invoice_number.clone()),
        (
            "amount".to_string(),
            format_currency(invoice.amount_cents, &invoice.currency),
        ),
        (
            "due_date".to_string(),
            invoice.due_date.format("%Y-%m-%d").to_string(),
        ),
        (
            "days_overdue".to_string(),
            days_overdue(invoice.due_date, today).to_string(),
        ),
        (
            "target_date".to_string(),
            target_date.format("%Y-%m-%d").to_string(),
        ),
        ("workspace_name".to_string(), workspace.name.clone()),
    ])
}

/// Pure preview over an already-loaded detail view.
pub fn build_preview(
    detail: &InvoiceDetail,
    workspace: &WorkspaceRecord,
    now: DateTime<Utc>,
    target_offset_days: u16,
) -> StagePreview {
    let stage = next_stage(&detail.steps);
    let context = build_preview_context(
        &detail.invoice,
        &detail.client,
        workspace,
        now.date_naive(),
        target_offset_days,
    );
    let render = |channel: MessageChannel| render_template(template_for(stage, channel), &context);

    StagePreview {
        invoice_id: detail.invoice.id,
        stage,
        email_body: detail
            .client
            .primary_email
            .as_ref()
            .map(|_| render(MessageChannel::Email)),
        sms_body: detail
            .client
            .primary_phone
            .as_ref()
            .map(|_| render(MessageChannel::Sms)),
        recommended_send_at: now,
    }
}
