//! Bulk invoice import.
//!
//! Rows are independent: each one goes through the same creation path as a
//! manual invoice and a bad row only lands in `failed`. There is no batch
//! transaction, so a partial import is a normal result.

use std::str::FromStr;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::auth::ActorContext;
use crate::error::RecoveryError;
use crate::recovery::audit::{self, AuditAction};
use crate::recovery::lifecycle::{CreateInvoiceInput, InvoiceService, MISSING_FIELDS};

/// One CSV line, already mapped onto known columns. All values are raw text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CsvInvoiceRow {
    pub client_name: String,
    pub client_email: Option<String>,
    pub client_phone: Option<String>,
    pub invoice_number: String,
    pub amount: Option<String>,
    pub amount_cents: Option<String>,
    pub currency: Option<String>,
    pub due_date: String,
    pub issue_date: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportFailure {
    /// 1-based position among the data rows.
    pub row: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub created: usize,
    pub failed: Vec<ImportFailure>,
}

/// Resolve an amount to integer cents.
///
/// Everything except digits, `.` and `-` is dropped first. A value with a
/// decimal point is in major units and is scaled by 100 and rounded; a value
/// without one is already cents. Unparseable input yields 0.
pub fn parse_amount_cents(raw: &str) -> i64 {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return 0;
    }
    let Ok(value) = Decimal::from_str(&cleaned) else {
        return 0;
    };
    let scaled = if raw.contains('.') {
        // Out-of-range amounts resolve to 0 so the row is rejected, not the batch.
        match value.checked_mul(Decimal::ONE_HUNDRED) {
            Some(scaled) => scaled,
            None => return 0,
        }
    } else {
        value
    };
    scaled
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
        .to_i64()
        .unwrap_or(0)
}

/// `amount_cents` wins over `amount` when both are present.
fn resolve_amount(row: &CsvInvoiceRow) -> i64 {
    match (&row.amount_cents, &row.amount) {
        (Some(cents), _) => parse_amount_cents(cents),
        (None, Some(amount)) => parse_amount_cents(amount),
        (None, None) => 0,
    }
}

const COLUMN_ALIASES: [(&str, &str); 10] = [
    ("clientName", "client_name"),
    ("clientEmail", "client_email"),
    ("clientPhone", "client_phone"),
    ("invoiceNumber", "invoice_number"),
    ("amount", "amount"),
    ("amountCents", "amount_cents"),
    ("currency", "currency"),
    ("dueDate", "due_date"),
    ("issueDate", "issue_date"),
    ("notes", "notes"),
];

/// Parse CSV text with a header row. Headers are trimmed and may be camelCase
/// or snake_case; unknown columns are ignored. Blank lines are skipped.
pub fn parse_csv(text: &str) -> Result<Vec<CsvInvoiceRow>, RecoveryError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::Headers)
        .from_reader(text.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| RecoveryError::validation(format!("CSV parsing failed: {e}")))?
        .clone();
    let index_of: Vec<Option<usize>> = COLUMN_ALIASES
        .iter()
        .map(|(camel, snake)| {
            headers
                .iter()
                .position(|h| h == *camel)
                .or_else(|| headers.iter().position(|h| h == *snake))
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record =
            record.map_err(|e| RecoveryError::validation(format!("CSV parsing failed: {e}")))?;
        let field = |column: usize| -> Option<String> {
            index_of[column]
                .and_then(|idx| record.get(idx))
                .map(str::to_string)
        };
        rows.push(CsvInvoiceRow {
            client_name: field(0).unwrap_or_default(),
            client_email: field(1),
            client_phone: field(2),
            invoice_number: field(3).unwrap_or_default(),
            amount: field(4),
            amount_cents: field(5).filter(|v| !v.trim().is_empty()),
            currency: field(6),
            due_date: field(7).unwrap_or_default(),
            issue_date: field(8),
            notes: field(9),
        });
    }
    Ok(rows)
}

/// Create one invoice per row, collecting per-row failures.
pub async fn import_rows(
    service: &InvoiceService,
    workspace_slug: Option<&str>,
    rows: &[CsvInvoiceRow],
    actor: &ActorContext,
) -> Result<ImportReport, RecoveryError> {
    let workspace = service.ensure_workspace_by_slug(workspace_slug).await?;
    let mut report = ImportReport::default();

    for (index, row) in rows.iter().enumerate() {
        let amount_cents = resolve_amount(row);
        let result = if row.client_name.trim().is_empty()
            || row.invoice_number.trim().is_empty()
            || row.due_date.trim().is_empty()
            || amount_cents == 0
        {
            Err(RecoveryError::validation(MISSING_FIELDS))
        } else {
            service
                .create_invoice_unaudited(&CreateInvoiceInput {
                    workspace_slug: Some(workspace.slug.clone()),
                    client_name: row.client_name.clone(),
                    client_email: row.client_email.clone(),
                    client_phone: row.client_phone.clone(),
                    invoice_number: row.invoice_number.clone(),
                    amount_cents,
                    currency: row.currency.clone(),
                    due_date: row.due_date.clone(),
                    issue_date: row.issue_date.clone(),
                    notes: row.notes.clone(),
                })
                .await
                .map(|_| ())
        };

        match result {
            Ok(()) => report.created += 1,
            Err(e) => report.failed.push(ImportFailure {
                row: index + 1,
                reason: e.to_string(),
            }),
        }
    }

    tracing::info!(
        workspace = %workspace.slug,
        created = report.created,
        failed = report.failed.len(),
        "Invoice import finished"
    );
    audit::record(
        service.db(),
        workspace.id,
        actor,
        AuditAction::ImportInvoices,
        "workspace",
        workspace.id,
        serde_json::json!({ "created": report.created, "failed": report.failed.len() }),
    )
    .await;

    Ok(report)
}
