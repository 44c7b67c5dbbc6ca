//! Invoice creation and lookup.
//!
//! Workspaces and clients are created on first reference. Every invoice gets
//! its escalation run at creation time, so callers may rely on a run existing
//! for any invoice id they can see.

use std::sync::Arc;

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::config::EscalationConfig;
use crate::db::{
    CreateClientParams, CreateInvoiceParams, Database, InvoiceStatus, WorkspaceRecord,
};
use crate::error::RecoveryError;
use crate::recovery::audit::{self, AuditAction};
use crate::recovery::{InvoiceDetail, load_invoice_detail};

pub const MISSING_FIELDS: &str = "Missing required invoice fields.";

const DEFAULT_PLAN: &str = "trial";
const DEFAULT_CURRENCY: &str = "USD";

/// Manual invoice entry. Field names follow the JSON API (`clientName`, ...).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceInput {
    #[serde(default)]
    pub workspace_slug: Option<String>,
    pub client_name: String,
    #[serde(default)]
    pub client_email: Option<String>,
    #[serde(default)]
    pub client_phone: Option<String>,
    pub invoice_number: String,
    pub amount_cents: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub due_date: String,
    #[serde(default)]
    pub issue_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `acme-co_labs` -> `Acme Co Labs`.
pub fn title_case(slug: &str) -> String {
    slug.split(|c: char| c == '-' || c == '_' || c.is_whitespace())
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| {
            let mut chars = chunk.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Accepts `YYYY-MM-DD`, or a timestamp that starts with one.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, RecoveryError> {
    let trimmed = raw.trim();
    let candidate = trimmed.get(..10).unwrap_or(trimmed);
    NaiveDate::parse_from_str(candidate, "%Y-%m-%d")
        .map_err(|_| RecoveryError::validation(format!("Invalid {field}: {trimmed}")))
}

fn normalize_currency(raw: Option<&str>) -> Result<String, RecoveryError> {
    let code = raw
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .unwrap_or(DEFAULT_CURRENCY);
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(RecoveryError::validation(format!(
            "Currency must be a three-letter code: {code}"
        )));
    }
    Ok(code.to_ascii_uppercase())
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

#[derive(Clone)]
pub struct InvoiceService {
    db: Arc<dyn Database>,
    config: EscalationConfig,
}

impl InvoiceService {
    pub fn new(db: Arc<dyn Database>, config: EscalationConfig) -> Self {
        Self { db, config }
    }

    pub fn default_workspace_slug(&self) -> &str {
        &self.config.default_workspace_slug
    }

    /// Blank slugs resolve to the configured default workspace.
    pub fn resolve_slug<'a>(&'a self, slug: Option<&'a str>) -> &'a str {
        slug.map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or(&self.config.default_workspace_slug)
    }

    pub async fn ensure_workspace_by_slug(
        &self,
        slug: Option<&str>,
    ) -> Result<WorkspaceRecord, RecoveryError> {
        let slug = self.resolve_slug(slug);
        Ok(self
            .db
            .ensure_workspace(slug, &title_case(slug), DEFAULT_PLAN)
            .await?)
    }

    /// Validate and create an invoice, reusing its workspace and client.
    pub async fn create_invoice(
        &self,
        input: &CreateInvoiceInput,
        actor: &ActorContext,
    ) -> Result<InvoiceDetail, RecoveryError> {
        let detail = self.create_invoice_unaudited(input).await?;
        audit::record(
            self.db.as_ref(),
            detail.invoice.workspace_id,
            actor,
            AuditAction::CreateInvoice,
            "invoice",
            detail.invoice.id,
            serde_json::json!({
                "invoice_number": detail.invoice.invoice_number,
                "amount_cents": detail.invoice.amount_cents,
            }),
        )
        .await;
        Ok(detail)
    }

    /// The creation path shared with bulk import, which audits once per batch.
    pub(crate) async fn create_invoice_unaudited(
        &self,
        input: &CreateInvoiceInput,
    ) -> Result<InvoiceDetail, RecoveryError> {
        let client_name = input.client_name.trim();
        let invoice_number = input.invoice_number.trim();
        if client_name.is_empty() || invoice_number.is_empty() || input.due_date.trim().is_empty()
        {
            return Err(RecoveryError::validation(MISSING_FIELDS));
        }
        if input.amount_cents <= 0 {
            return Err(RecoveryError::validation(
                "Invoice amount must be greater than zero.",
            ));
        }
        let client_email = non_blank(input.client_email.as_deref());
        if client_email.as_deref().is_some_and(|email| !email.contains('@')) {
            return Err(RecoveryError::validation("Invalid client email."));
        }
        let currency = normalize_currency(input.currency.as_deref())?;
        let due_date = parse_date("due date", &input.due_date)?;
        let issue_date = match non_blank(input.issue_date.as_deref()) {
            Some(raw) => Some(parse_date("issue date", &raw)?),
            None => None,
        };

        let workspace = self
            .ensure_workspace_by_slug(input.workspace_slug.as_deref())
            .await?;
        let client = self
            .db
            .ensure_client(
                workspace.id,
                &CreateClientParams {
                    name: client_name.to_string(),
                    email: client_email,
                    phone: non_blank(input.client_phone.as_deref()),
                },
            )
            .await?;
        let invoice = self
            .db
            .create_invoice(&CreateInvoiceParams {
                workspace_id: workspace.id,
                client_id: client.id,
                invoice_number: invoice_number.to_string(),
                amount_cents: input.amount_cents,
                currency,
                issue_date,
                due_date,
                status: InvoiceStatus::AtRisk,
                notes: non_blank(input.notes.as_deref()),
            })
            .await?;
        self.db.ensure_escalation_run(invoice.id).await?;

        tracing::debug!(
            invoice_id = %invoice.id,
            workspace = %workspace.slug,
            invoice_number = %invoice.invoice_number,
            "Invoice created"
        );
        load_invoice_detail(self.db.as_ref(), invoice.id).await
    }

    pub async fn get_invoice_detail(&self, invoice_id: Uuid) -> Result<InvoiceDetail, RecoveryError> {
        load_invoice_detail(self.db.as_ref(), invoice_id).await
    }

    /// Every invoice of the workspace with its relations, by due date.
    pub async fn list_invoices(&self, slug: Option<&str>) -> Result<Vec<InvoiceDetail>, RecoveryError> {
        let workspace = self.ensure_workspace_by_slug(slug).await?;
        let invoices = self.db.list_invoices(workspace.id).await?;
        let mut details = Vec::with_capacity(invoices.len());
        for invoice in invoices {
            details.push(load_invoice_detail(self.db.as_ref(), invoice.id).await?);
        }
        Ok(details)
    }

    pub(crate) fn db(&self) -> &dyn Database {
        self.db.as_ref()
    }
}
