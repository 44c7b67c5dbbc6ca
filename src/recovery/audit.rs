//! Best-effort audit trail over the `audit_logs` store.

use uuid::Uuid;

use crate::auth::ActorContext;
use crate::db::{CreateAuditLogParams, Database};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    CreateInvoice,
    ImportInvoices,
    ApproveEscalationStep,
    DispatchEscalationSteps,
    PauseEscalation,
    MarkInvoicePaid,
    GenerateLegalPacket,
    UpdateWorkspacePlan,
    ReceiveInboundSms,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateInvoice => "create_invoice",
            Self::ImportInvoices => "import_invoices",
            Self::ApproveEscalationStep => "approve_escalation_step",
            Self::DispatchEscalationSteps => "dispatch_escalation_steps",
            Self::PauseEscalation => "pause_escalation",
            Self::MarkInvoicePaid => "mark_invoice_paid",
            Self::GenerateLegalPacket => "generate_legal_packet",
            Self::UpdateWorkspacePlan => "update_workspace_plan",
            Self::ReceiveInboundSms => "receive_inbound_sms",
        }
    }
}

/// Write one audit entry. Failures are logged and swallowed so the primary
/// transition is never rolled back or failed by the audit write.
pub async fn record(
    db: &dyn Database,
    workspace_id: Uuid,
    actor: &ActorContext,
    action: AuditAction,
    entity_type: &str,
    entity_id: impl ToString,
    payload: serde_json::Value,
) {
    let entry = CreateAuditLogParams {
        workspace_id,
        actor: actor.actor().to_string(),
        action: action.as_str().to_string(),
        entity_type: entity_type.to_string(),
        entity_id: entity_id.to_string(),
        payload,
    };
    if let Err(e) = db.record_audit_log(&entry).await {
        tracing::warn!(
            workspace = %workspace_id,
            action = action.as_str(),
            entity_id = %entry.entity_id,
            "Failed to write audit entry: {}",
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{AuditAction, record};
    use crate::auth::ActorContext;
    use crate::db::memory::InMemoryBackend;
    use crate::db::Database;

    #[tokio::test]
    async fn entries_carry_actor_or_system() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let ws = db
            .ensure_workspace("acme", "Acme", "trial")
            .await
            .expect("workspace");

        record(
            db.as_ref(),
            ws.id,
            &ActorContext::system(),
            AuditAction::PauseEscalation,
            "invoice",
            "inv-1",
            serde_json::json!({}),
        )
        .await;
        record(
            db.as_ref(),
            ws.id,
            &ActorContext::from_email(Some("ops@acme.test")),
            AuditAction::MarkInvoicePaid,
            "invoice",
            "inv-1",
            serde_json::json!({}),
        )
        .await;

        let entries = db.list_audit_logs(ws.id, 10).await.expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].actor, "ops@acme.test");
        assert_eq!(entries[0].action, "mark_invoice_paid");
        assert_eq!(entries[1].actor, "system");
        assert_eq!(entries[1].entity_id, "inv-1");
    }
}
