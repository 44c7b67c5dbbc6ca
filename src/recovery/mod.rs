//! Overdue-invoice recovery domain.
//!
//! Leaves first: `templates` and `stage` are pure; `preview` composes them;
//! `escalation` owns run transitions; `lifecycle` creates invoices and their
//! runs; `import` fans rows into `lifecycle`. `packet` and `dashboard` are
//! read-mostly views over the same store.

pub mod audit;
pub mod dashboard;
pub mod escalation;
pub mod import;
pub mod lifecycle;
pub mod packet;
pub mod preview;
pub mod stage;
pub mod templates;

use serde::Serialize;
use uuid::Uuid;

use crate::db::{
    ClientRecord, Database, EscalationRunRecord, EscalationStepRecord, InvoiceRecord,
    LegalPacketRecord, MessageEventRecord, WorkspaceRecord,
};
use crate::error::RecoveryError;

/// An invoice with everything it owns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceDetail {
    pub invoice: InvoiceRecord,
    pub client: ClientRecord,
    pub run: EscalationRunRecord,
    pub steps: Vec<EscalationStepRecord>,
    pub events: Vec<MessageEventRecord>,
    pub legal_packet: Option<LegalPacketRecord>,
}

/// Load the detail view. Read-only: an invoice without an escalation run is
/// reported as not found.
pub async fn load_invoice_detail(
    db: &dyn Database,
    invoice_id: Uuid,
) -> Result<InvoiceDetail, RecoveryError> {
    let invoice = db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| RecoveryError::not_found("Invoice", invoice_id))?;
    let client = db
        .get_client(invoice.client_id)
        .await?
        .ok_or_else(|| RecoveryError::not_found("Client", invoice.client_id))?;
    let run = db
        .get_escalation_run(invoice_id)
        .await?
        .ok_or_else(|| RecoveryError::not_found("Escalation run", invoice_id))?;
    let steps = db.list_escalation_steps(run.id).await?;
    let events = db.list_message_events(invoice_id).await?;
    let legal_packet = db.get_legal_packet(invoice_id).await?;

    Ok(InvoiceDetail {
        invoice,
        client,
        run,
        steps,
        events,
        legal_packet,
    })
}

pub(crate) async fn load_workspace(
    db: &dyn Database,
    workspace_id: Uuid,
) -> Result<WorkspaceRecord, RecoveryError> {
    db.get_workspace(workspace_id)
        .await?
        .ok_or_else(|| RecoveryError::not_found("Workspace", workspace_id))
}
