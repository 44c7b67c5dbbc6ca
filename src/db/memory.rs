//! In-memory `Database` implementation.
//!
//! Every `InMemoryBackend` owns its own state; there is no process-wide store,
//! so tests construct a fresh backend each and never observe each other.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{
    AuditLogRecord, AuditLogStore, ClientRecord, ClientStore, CreateAuditLogParams,
    CreateClientParams, CreateInvoiceParams, CreateMessageEventParams, Database,
    EscalationRunRecord, EscalationStage, EscalationState, EscalationStepRecord, EscalationStore,
    InvoiceRecord, InvoiceStatus, InvoiceStore, LegalPacketRecord, LegalPacketStore,
    MessageEventRecord, MessageEventStore, StepStatus, UpsertEscalationStepParams, UpsertLegalPacketParams,
    WorkspaceRecord, WorkspaceStore, metadata_object, normalize_client_name,
};
use crate::error::DatabaseError;

#[derive(Debug, Default)]
struct MemoryState {
    workspaces: Vec<WorkspaceRecord>,
    clients: Vec<ClientRecord>,
    invoices: Vec<InvoiceRecord>,
    runs: Vec<EscalationRunRecord>,
    steps: Vec<EscalationStepRecord>,
    events: Vec<MessageEventRecord>,
    packets: Vec<LegalPacketRecord>,
    audit: Vec<AuditLogRecord>,
}

#[derive(Debug, Default)]
pub struct InMemoryBackend {
    state: Mutex<MemoryState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, DatabaseError> {
        self.state
            .lock()
            .map_err(|e| DatabaseError::Pool(format!("in-memory store lock poisoned: {e}")))
    }
}

#[async_trait]
impl WorkspaceStore for InMemoryBackend {
    async fn ensure_workspace(
        &self,
        slug: &str,
        name: &str,
        plan: &str,
    ) -> Result<WorkspaceRecord, DatabaseError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.workspaces.iter().find(|ws| ws.slug == slug) {
            return Ok(existing.clone());
        }
        let record = WorkspaceRecord {
            id: Uuid::new_v4(),
            slug: slug.to_string(),
            name: name.to_string(),
            plan: plan.to_string(),
            created_at: Utc::now(),
        };
        state.workspaces.push(record.clone());
        Ok(record)
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state.workspaces.iter().find(|ws| ws.id == id).cloned())
    }

    async fn get_workspace_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state.workspaces.iter().find(|ws| ws.slug == slug).cloned())
    }

    async fn update_workspace_plan(
        &self,
        id: Uuid,
        plan: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let mut state = self.lock()?;
        Ok(state
            .workspaces
            .iter_mut()
            .find(|ws| ws.id == id)
            .map(|ws| {
                ws.plan = plan.to_string();
                ws.clone()
            }))
    }
}

#[async_trait]
impl ClientStore for InMemoryBackend {
    async fn ensure_client(
        &self,
        workspace_id: Uuid,
        input: &CreateClientParams,
    ) -> Result<ClientRecord, DatabaseError> {
        let normalized = normalize_client_name(&input.name);
        if normalized.is_empty() {
            return Err(DatabaseError::Serialization(
                "client name cannot be empty".to_string(),
            ));
        }

        let mut state = self.lock()?;
        if let Some(existing) = state.clients.iter().find(|client| {
            client.workspace_id == workspace_id && normalize_client_name(&client.name) == normalized
        }) {
            return Ok(existing.clone());
        }

        let record = ClientRecord {
            id: Uuid::new_v4(),
            workspace_id,
            name: input.name.trim().to_string(),
            primary_email: input.email.clone(),
            primary_phone: input.phone.clone(),
            created_at: Utc::now(),
        };
        state.clients.push(record.clone());
        Ok(record)
    }

    async fn get_client(&self, id: Uuid) -> Result<Option<ClientRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state.clients.iter().find(|client| client.id == id).cloned())
    }

    async fn find_client_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<ClientRecord>, DatabaseError> {
        let normalized = normalize_client_name(name);
        let state = self.lock()?;
        Ok(state
            .clients
            .iter()
            .find(|client| {
                client.workspace_id == workspace_id
                    && normalize_client_name(&client.name) == normalized
            })
            .cloned())
    }
}

#[async_trait]
impl InvoiceStore for InMemoryBackend {
    async fn create_invoice(
        &self,
        input: &CreateInvoiceParams,
    ) -> Result<InvoiceRecord, DatabaseError> {
        let mut state = self.lock()?;
        if !state
            .clients
            .iter()
            .any(|client| client.id == input.client_id && client.workspace_id == input.workspace_id)
        {
            return Err(DatabaseError::Constraint(format!(
                "client {} does not belong to workspace {}",
                input.client_id, input.workspace_id
            )));
        }

        let now = Utc::now();
        let record = InvoiceRecord {
            id: Uuid::new_v4(),
            workspace_id: input.workspace_id,
            client_id: input.client_id,
            invoice_number: input.invoice_number.clone(),
            amount_cents: input.amount_cents,
            currency: input.currency.clone(),
            issue_date: input.issue_date,
            due_date: input.due_date,
            status: input.status,
            notes: input.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        state.invoices.push(record.clone());
        Ok(record)
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state.invoices.iter().find(|inv| inv.id == id).cloned())
    }

    async fn list_invoices(&self, workspace_id: Uuid) -> Result<Vec<InvoiceRecord>, DatabaseError> {
        let state = self.lock()?;
        let mut out: Vec<InvoiceRecord> = state
            .invoices
            .iter()
            .filter(|inv| inv.workspace_id == workspace_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(out)
    }

    async fn set_invoice_status_unless_paid(
        &self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let mut state = self.lock()?;
        Ok(state.invoices.iter_mut().find(|inv| inv.id == id).map(|inv| {
            if inv.status != InvoiceStatus::Paid {
                inv.status = status;
                inv.updated_at = Utc::now();
            }
            inv.clone()
        }))
    }

    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let mut state = self.lock()?;
        Ok(state.invoices.iter_mut().find(|inv| inv.id == id).map(|inv| {
            inv.status = InvoiceStatus::Paid;
            inv.updated_at = Utc::now();
            inv.clone()
        }))
    }
}

#[async_trait]
impl EscalationStore for InMemoryBackend {
    async fn ensure_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<EscalationRunRecord, DatabaseError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.runs.iter().find(|run| run.invoice_id == invoice_id) {
            return Ok(existing.clone());
        }
        if !state.invoices.iter().any(|inv| inv.id == invoice_id) {
            return Err(DatabaseError::Constraint(format!(
                "escalation run references unknown invoice {invoice_id}"
            )));
        }
        let now = Utc::now();
        let record = EscalationRunRecord {
            id: Uuid::new_v4(),
            invoice_id,
            state: EscalationState::New,
            current_stage: None,
            created_at: now,
            updated_at: now,
        };
        state.runs.push(record.clone());
        Ok(record)
    }

    async fn get_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state
            .runs
            .iter()
            .find(|run| run.invoice_id == invoice_id)
            .cloned())
    }

    async fn update_escalation_run(
        &self,
        run_id: Uuid,
        run_state: EscalationState,
        current_stage: Option<EscalationStage>,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError> {
        let mut state = self.lock()?;
        Ok(state.runs.iter_mut().find(|run| run.id == run_id).map(|run| {
            run.state = run_state;
            if let Some(stage) = current_stage {
                run.current_stage = Some(stage);
            }
            run.updated_at = Utc::now();
            run.clone()
        }))
    }

    async fn upsert_escalation_step(
        &self,
        input: &UpsertEscalationStepParams,
    ) -> Result<EscalationStepRecord, DatabaseError> {
        let mut state = self.lock()?;
        if let Some(existing) = state.steps.iter_mut().find(|step| {
            step.run_id == input.run_id && step.stage == input.stage && step.channel == input.channel
        }) {
            existing.status = input.status;
            existing.preview_body = input.preview_body.clone();
            existing.scheduled_for = input.scheduled_for;
            existing.approved_at = input.approved_at;
            return Ok(existing.clone());
        }

        let record = EscalationStepRecord {
            id: Uuid::new_v4(),
            run_id: input.run_id,
            stage: input.stage,
            channel: input.channel,
            status: input.status,
            preview_body: input.preview_body.clone(),
            scheduled_for: input.scheduled_for,
            approved_at: input.approved_at,
            sent_at: None,
            created_at: Utc::now(),
        };
        state.steps.push(record.clone());
        Ok(record)
    }

    async fn set_escalation_step_status(
        &self,
        step_id: Uuid,
        status: StepStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<Option<EscalationStepRecord>, DatabaseError> {
        let mut state = self.lock()?;
        Ok(state
            .steps
            .iter_mut()
            .find(|step| step.id == step_id)
            .map(|step| {
                step.status = status;
                if sent_at.is_some() {
                    step.sent_at = sent_at;
                }
                step.clone()
            }))
    }

    async fn list_escalation_steps(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<EscalationStepRecord>, DatabaseError> {
        let state = self.lock()?;
        let mut out: Vec<EscalationStepRecord> = state
            .steps
            .iter()
            .filter(|step| step.run_id == run_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep insertion order.
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(out)
    }
}

#[async_trait]
impl MessageEventStore for InMemoryBackend {
    async fn append_message_event(
        &self,
        input: &CreateMessageEventParams,
    ) -> Result<MessageEventRecord, DatabaseError> {
        let mut state = self.lock()?;
        let record = MessageEventRecord {
            id: Uuid::new_v4(),
            invoice_id: input.invoice_id,
            stage: input.stage,
            channel: input.channel,
            direction: input.direction,
            body: input.body.clone(),
            provider_message_id: input.provider_message_id.clone(),
            delivery_state: input.delivery_state.clone(),
            metadata: metadata_object(&input.metadata),
            created_at: Utc::now(),
        };
        state.events.push(record.clone());
        Ok(record)
    }

    async fn list_message_events(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<MessageEventRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|event| event.invoice_id == invoice_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LegalPacketStore for InMemoryBackend {
    async fn upsert_legal_packet(
        &self,
        invoice_id: Uuid,
        input: &UpsertLegalPacketParams,
    ) -> Result<LegalPacketRecord, DatabaseError> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .packets
            .iter_mut()
            .find(|packet| packet.invoice_id == invoice_id)
        {
            existing.jurisdiction = input.jurisdiction.clone();
            existing.content = input.content.clone();
            existing.generated_at = input.generated_at;
            return Ok(existing.clone());
        }
        let record = LegalPacketRecord {
            id: Uuid::new_v4(),
            invoice_id,
            jurisdiction: input.jurisdiction.clone(),
            content: input.content.clone(),
            generated_at: input.generated_at,
        };
        state.packets.push(record.clone());
        Ok(record)
    }

    async fn get_legal_packet(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<LegalPacketRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state
            .packets
            .iter()
            .find(|packet| packet.invoice_id == invoice_id)
            .cloned())
    }
}

#[async_trait]
impl AuditLogStore for InMemoryBackend {
    async fn record_audit_log(&self, input: &CreateAuditLogParams) -> Result<(), DatabaseError> {
        let mut state = self.lock()?;
        state.audit.push(AuditLogRecord {
            id: Uuid::new_v4(),
            workspace_id: input.workspace_id,
            actor: input.actor.clone(),
            action: input.action.clone(),
            entity_type: input.entity_type.clone(),
            entity_id: input.entity_id.clone(),
            payload: input.payload.clone(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        workspace_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, DatabaseError> {
        let state = self.lock()?;
        Ok(state
            .audit
            .iter()
            .rev()
            .filter(|entry| entry.workspace_id == workspace_id)
            .take(limit)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl Database for InMemoryBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}
