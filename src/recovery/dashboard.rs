//! Workspace summary counters.

use chrono::{DateTime, Datelike, Utc};
use serde::Serialize;

use crate::db::{EscalationState, InvoiceStatus};
use crate::error::RecoveryError;
use crate::recovery::InvoiceDetail;
use crate::recovery::lifecycle::InvoiceService;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    /// Sum over every invoice that is not paid, mixed currencies included.
    /// Saturates at `i64::MAX`.
    pub total_outstanding_cents: i64,
    pub active_recoveries: usize,
    pub awaiting_approval: usize,
    /// Paid invoices last updated in the calendar month of `now`.
    pub resolved_this_month: usize,
}

pub fn compute_stats(details: &[InvoiceDetail], now: DateTime<Utc>) -> DashboardStats {
    let mut stats = DashboardStats::default();
    for detail in details {
        let invoice = &detail.invoice;
        match invoice.status {
            InvoiceStatus::Paid => {
                if invoice.updated_at.year() == now.year()
                    && invoice.updated_at.month() == now.month()
                {
                    stats.resolved_this_month += 1;
                }
            }
            status => {
                stats.total_outstanding_cents =
                    stats.total_outstanding_cents.saturating_add(invoice.amount_cents);
                if status == InvoiceStatus::InRecovery {
                    stats.active_recoveries += 1;
                }
            }
        }
        if detail.run.state == EscalationState::AwaitingApproval {
            stats.awaiting_approval += 1;
        }
    }
    stats
}

pub async fn dashboard_stats(
    service: &InvoiceService,
    workspace_slug: Option<&str>,
) -> Result<DashboardStats, RecoveryError> {
    let details = service.list_invoices(workspace_slug).await?;
    Ok(compute_stats(&details, Utc::now()))
}
