//! Escalation run state machine.
//!
//! Every mutating transition for an invoice runs under that invoice's lock, so
//! approve / pause / mark-paid / dispatch never interleave for the same
//! invoice. Different invoices proceed in parallel.
//!
//! ```text
//!   new ──approve──▶ scheduled ──dispatch──▶ (steps sent | failed)
//!    │                  │  ▲
//!    └─────pause────▶ paused ─┘ (approve)
//!   any ──mark-paid──▶ completed   (invoice status = paid, final)
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::auth::ActorContext;
use crate::config::EscalationConfig;
use crate::db::{
    ClientRecord, CreateMessageEventParams, Database, EscalationState, InvoiceStatus,
    MessageChannel, MessageDirection, StepStatus, UpsertEscalationStepParams,
};
use crate::error::RecoveryError;
use crate::recovery::audit::{self, AuditAction};
use crate::recovery::preview::{StagePreview, build_preview};
use crate::recovery::{InvoiceDetail, load_invoice_detail, load_workspace};
use crate::services::MessageDelivery;

const ALREADY_PAID: &str = "Invoice is already paid.";

/// Create the invoice's run if it has none. Only state-changing operations
/// call this; reads never create runs.
async fn ensure_run(db: &dyn Database, invoice_id: Uuid) -> Result<(), RecoveryError> {
    if db.get_invoice(invoice_id).await?.is_none() {
        return Err(RecoveryError::not_found("Invoice", invoice_id));
    }
    db.ensure_escalation_run(invoice_id).await?;
    Ok(())
}

/// One async mutex per invoice id, created on demand.
#[derive(Debug, Default)]
pub struct InvoiceLocks {
    inner: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl InvoiceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `invoice_id`. Idle entries are pruned on
    /// each call so the map only holds invoices that are in use.
    pub async fn acquire(&self, invoice_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(map.entry(invoice_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of invoices currently locked or waited on.
    pub fn active(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        map.values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

/// Outcome of delivering an invoice's scheduled steps.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
    pub invoice: InvoiceDetail,
}

#[derive(Clone)]
pub struct EscalationEngine {
    db: Arc<dyn Database>,
    locks: Arc<InvoiceLocks>,
    config: EscalationConfig,
    delivery: Arc<dyn MessageDelivery>,
}

impl EscalationEngine {
    pub fn new(
        db: Arc<dyn Database>,
        config: EscalationConfig,
        delivery: Arc<dyn MessageDelivery>,
    ) -> Self {
        Self {
            db,
            locks: Arc::new(InvoiceLocks::new()),
            config,
            delivery,
        }
    }

    pub fn locks(&self) -> &InvoiceLocks {
        &self.locks
    }

    /// What approving right now would send. Never writes.
    pub async fn preview_step(&self, invoice_id: Uuid) -> Result<StagePreview, RecoveryError> {
        let detail = load_invoice_detail(self.db.as_ref(), invoice_id).await?;
        let workspace = load_workspace(self.db.as_ref(), detail.invoice.workspace_id).await?;
        Ok(build_preview(
            &detail,
            &workspace,
            Utc::now(),
            self.config.target_offset_days,
        ))
    }

    /// Approve the next stage: schedule one step per deliverable channel and
    /// record a queued outbound event for each.
    pub async fn approve_step(
        &self,
        invoice_id: Uuid,
        actor: &ActorContext,
    ) -> Result<InvoiceDetail, RecoveryError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let db = self.db.as_ref();

        ensure_run(db, invoice_id).await?;
        let detail = load_invoice_detail(db, invoice_id).await?;
        if detail.invoice.status == InvoiceStatus::Paid {
            return Err(RecoveryError::validation(ALREADY_PAID));
        }
        let workspace = load_workspace(db, detail.invoice.workspace_id).await?;
        let now = Utc::now();
        let preview = build_preview(&detail, &workspace, now, self.config.target_offset_days);
        let channels = preview.deliverable_channels();

        db.update_escalation_run(detail.run.id, EscalationState::Scheduled, Some(preview.stage))
            .await?;

        for channel in &channels {
            let body = preview.body(*channel).unwrap_or_default().to_string();
            db.upsert_escalation_step(&UpsertEscalationStepParams {
                run_id: detail.run.id,
                stage: preview.stage,
                channel: *channel,
                status: StepStatus::Scheduled,
                preview_body: Some(body.clone()),
                scheduled_for: Some(preview.recommended_send_at),
                approved_at: Some(now),
            })
            .await?;
            db.append_message_event(&CreateMessageEventParams {
                invoice_id,
                stage: Some(preview.stage),
                channel: *channel,
                direction: MessageDirection::Outbound,
                body,
                provider_message_id: None,
                delivery_state: Some("queued".to_string()),
                metadata: serde_json::json!({ "approved_at": now.to_rfc3339() }),
            })
            .await?;
        }

        db.set_invoice_status_unless_paid(invoice_id, InvoiceStatus::InRecovery)
            .await?;

        let channel_names: Vec<&str> = channels.iter().map(|c| c.as_str()).collect();
        if channels.is_empty() {
            tracing::warn!(
                invoice_id = %invoice_id,
                stage = preview.stage.as_str(),
                "Approved stage with no deliverable channel"
            );
        }
        tracing::info!(
            invoice_id = %invoice_id,
            stage = preview.stage.as_str(),
            channels = ?channel_names,
            "Escalation step approved"
        );
        audit::record(
            db,
            detail.invoice.workspace_id,
            actor,
            AuditAction::ApproveEscalationStep,
            "invoice",
            invoice_id,
            serde_json::json!({ "stage": preview.stage.as_str(), "channels": channel_names }),
        )
        .await;

        load_invoice_detail(db, invoice_id).await
    }

    /// Pause the run. A second pause changes nothing.
    pub async fn pause(
        &self,
        invoice_id: Uuid,
        actor: &ActorContext,
    ) -> Result<InvoiceDetail, RecoveryError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let db = self.db.as_ref();

        ensure_run(db, invoice_id).await?;
        let detail = load_invoice_detail(db, invoice_id).await?;
        if detail.invoice.status == InvoiceStatus::Paid {
            return Err(RecoveryError::validation(ALREADY_PAID));
        }

        db.update_escalation_run(detail.run.id, EscalationState::Paused, None)
            .await?;
        db.set_invoice_status_unless_paid(invoice_id, InvoiceStatus::Paused)
            .await?;

        tracing::info!(invoice_id = %invoice_id, "Escalation paused");
        audit::record(
            db,
            detail.invoice.workspace_id,
            actor,
            AuditAction::PauseEscalation,
            "invoice",
            invoice_id,
            serde_json::json!({}),
        )
        .await;

        load_invoice_detail(db, invoice_id).await
    }

    /// Mark the invoice paid and complete its run. Safe to repeat.
    pub async fn mark_paid(
        &self,
        invoice_id: Uuid,
        actor: &ActorContext,
    ) -> Result<InvoiceDetail, RecoveryError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let db = self.db.as_ref();

        ensure_run(db, invoice_id).await?;
        let detail = load_invoice_detail(db, invoice_id).await?;
        db.mark_invoice_paid(invoice_id).await?;
        db.update_escalation_run(detail.run.id, EscalationState::Completed, None)
            .await?;

        tracing::info!(invoice_id = %invoice_id, "Invoice marked paid");
        audit::record(
            db,
            detail.invoice.workspace_id,
            actor,
            AuditAction::MarkInvoicePaid,
            "invoice",
            invoice_id,
            serde_json::json!({}),
        )
        .await;

        load_invoice_detail(db, invoice_id).await
    }

    /// Hand every `scheduled` step to its delivery provider.
    ///
    /// Each step is settled independently: a provider error marks that step
    /// `failed` and moves on. Every attempt appends an outbound event with the
    /// provider's handle and initial state.
    pub async fn dispatch_scheduled(
        &self,
        invoice_id: Uuid,
        actor: &ActorContext,
    ) -> Result<DispatchReport, RecoveryError> {
        let _guard = self.locks.acquire(invoice_id).await;
        let db = self.db.as_ref();

        let detail = load_invoice_detail(db, invoice_id).await?;
        if detail.invoice.status == InvoiceStatus::Paid {
            return Err(RecoveryError::validation(ALREADY_PAID));
        }
        if detail.run.state == EscalationState::Paused {
            return Err(RecoveryError::validation("Escalation is paused."));
        }

        let mut sent = 0;
        let mut failed = 0;
        for step in detail
            .steps
            .iter()
            .filter(|step| step.status == StepStatus::Scheduled)
        {
            let body = step.preview_body.clone().unwrap_or_default();
            let outcome = match destination(&detail.client, step.channel) {
                Some(dest) => self
                    .delivery
                    .send(step.channel, dest, &body)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err(format!("client has no {} destination", step.channel.as_str())),
            };
            let now = Utc::now();

            let (event_params, status, sent_at) = match outcome {
                Ok(receipt) => {
                    sent += 1;
                    (
                        CreateMessageEventParams {
                            invoice_id,
                            stage: Some(step.stage),
                            channel: step.channel,
                            direction: MessageDirection::Outbound,
                            body,
                            provider_message_id: Some(receipt.provider_message_id),
                            delivery_state: Some(receipt.delivery_state),
                            metadata: serde_json::json!({
                                "dispatched_at": now.to_rfc3339(),
                                "mock": receipt.mock,
                            }),
                        },
                        StepStatus::Sent,
                        Some(now),
                    )
                }
                Err(reason) => {
                    failed += 1;
                    tracing::warn!(
                        invoice_id = %invoice_id,
                        stage = step.stage.as_str(),
                        channel = step.channel.as_str(),
                        "Delivery failed: {}",
                        reason
                    );
                    (
                        CreateMessageEventParams {
                            invoice_id,
                            stage: Some(step.stage),
                            channel: step.channel,
                            direction: MessageDirection::Outbound,
                            body,
                            provider_message_id: None,
                            delivery_state: Some("failed".to_string()),
                            metadata: serde_json::json!({
                                "dispatched_at": now.to_rfc3339(),
                                "error": reason,
                            }),
                        },
                        StepStatus::Failed,
                        None,
                    )
                }
            };

            db.append_message_event(&event_params).await?;
            db.set_escalation_step_status(step.id, status, sent_at)
                .await?;
        }

        tracing::info!(invoice_id = %invoice_id, sent, failed, "Scheduled steps dispatched");
        if sent + failed > 0 {
            audit::record(
                db,
                detail.invoice.workspace_id,
                actor,
                AuditAction::DispatchEscalationSteps,
                "invoice",
                invoice_id,
                serde_json::json!({ "sent": sent, "failed": failed }),
            )
            .await;
        }

        Ok(DispatchReport {
            sent,
            failed,
            invoice: load_invoice_detail(db, invoice_id).await?,
        })
    }
}

fn destination(client: &ClientRecord, channel: MessageChannel) -> Option<&str> {
    match channel {
        MessageChannel::Email => client.primary_email.as_deref(),
        MessageChannel::Sms => client.primary_phone.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::{EscalationEngine, InvoiceLocks};
    use crate::auth::ActorContext;
    use crate::config::EscalationConfig;
    use crate::db::memory::InMemoryBackend;
    use crate::db::{
        Database, EscalationStage, EscalationState, InvoiceStatus, MessageChannel,
        StepStatus,
    };
    use crate::error::{ErrorKind, ProviderError};
    use crate::services::{DeliveryReceipt, MessageDelivery, MockDelivery};
    use crate::testing::{seed_invoice, seed_invoice_without_run};

    fn engine_with(db: Arc<dyn Database>, delivery: Arc<dyn MessageDelivery>) -> EscalationEngine {
        EscalationEngine::new(db, EscalationConfig::default(), delivery)
    }

    fn engine(db: Arc<dyn Database>) -> EscalationEngine {
        engine_with(db, Arc::new(MockDelivery))
    }

    struct RejectingDelivery;

    #[async_trait]
    impl MessageDelivery for RejectingDelivery {
        async fn send(
            &self,
            _channel: MessageChannel,
            _destination: &str,
            _body: &str,
        ) -> Result<DeliveryReceipt, ProviderError> {
            Err(ProviderError::Rejected {
                provider: "test".to_string(),
                status: 400,
                body: "invalid number".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn approve_schedules_each_channel_and_advances_invoice() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), Some("+15550100")).await;
        let engine = engine(Arc::clone(&db));

        let detail = engine
            .approve_step(invoice.id, &ActorContext::from_email(Some("ops@demo.test")))
            .await
            .expect("approve");

        assert_eq!(detail.invoice.status, InvoiceStatus::InRecovery);
        assert_eq!(detail.run.state, EscalationState::Scheduled);
        assert_eq!(detail.run.current_stage, Some(EscalationStage::PoliteNudge));
        assert_eq!(detail.steps.len(), 2);
        assert!(detail.steps.iter().all(|s| s.status == StepStatus::Scheduled));
        assert_eq!(detail.events.len(), 2);
        assert!(
            detail
                .events
                .iter()
                .all(|e| e.delivery_state.as_deref() == Some("queued"))
        );

        let audit = db
            .list_audit_logs(invoice.workspace_id, 10)
            .await
            .expect("audit");
        assert_eq!(audit[0].action, "approve_escalation_step");
        assert_eq!(audit[0].actor, "ops@demo.test");
        assert_eq!(
            audit[0].payload,
            serde_json::json!({ "stage": "polite_nudge", "channels": ["email", "sms"] })
        );
    }

    #[tokio::test]
    async fn repeated_approval_upserts_steps_but_appends_events() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), None).await;
        let engine = engine(db);
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("first");
        let detail = engine.approve_step(invoice.id, &actor).await.expect("second");

        assert_eq!(detail.steps.len(), 1);
        assert_eq!(detail.steps[0].stage, EscalationStage::PoliteNudge);
        assert_eq!(detail.events.len(), 2);
    }

    #[tokio::test]
    async fn concurrent_approvals_leave_one_step_per_channel() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), Some("+15550100")).await;
        let engine = engine(db);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move {
                    engine
                        .approve_step(invoice.id, &ActorContext::system())
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.expect("join").expect("approve");
        }

        let detail = crate::recovery::load_invoice_detail(engine.db.as_ref(), invoice.id)
            .await
            .expect("detail");
        assert_eq!(detail.steps.len(), 2);
        assert_eq!(detail.events.len(), 8);
        assert_eq!(engine.locks().active(), 0);
    }

    #[tokio::test]
    async fn mark_paid_wins_over_later_pause_and_approve() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), None).await;
        let engine = engine(db);
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("approve");
        engine.pause(invoice.id, &actor).await.expect("pause");
        let paid = engine.mark_paid(invoice.id, &actor).await.expect("paid");
        assert_eq!(paid.invoice.status, InvoiceStatus::Paid);
        assert_eq!(paid.run.state, EscalationState::Completed);

        let err = engine.pause(invoice.id, &actor).await.expect_err("paused after paid");
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = engine
            .approve_step(invoice.id, &actor)
            .await
            .expect_err("approved after paid");
        assert_eq!(err.to_string(), "Invoice is already paid.");

        let again = engine.mark_paid(invoice.id, &actor).await.expect("idempotent");
        assert_eq!(again.invoice.status, InvoiceStatus::Paid);
        assert_eq!(again.run.state, EscalationState::Completed);
    }

    #[tokio::test]
    async fn mark_paid_wins_against_concurrent_approvals() {
        for round in 0..10 {
            let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
            let invoice =
                seed_invoice(db.as_ref(), Some("ap@northridge.test"), Some("+15550100")).await;
            let engine = engine(Arc::clone(&db));

            let mut handles = Vec::new();
            for task in 0..6 {
                let engine = engine.clone();
                let id = invoice.id;
                handles.push(tokio::spawn(async move {
                    let actor = ActorContext::system();
                    if task == round % 6 {
                        engine.mark_paid(id, &actor).await.map(|_| ())
                    } else {
                        engine.approve_step(id, &actor).await.map(|_| ())
                    }
                }));
            }
            for handle in handles {
                if let Err(err) = handle.await.expect("join") {
                    // Approvals that land after payment are rejected.
                    assert_eq!(err.to_string(), "Invoice is already paid.");
                }
            }

            let detail = crate::recovery::load_invoice_detail(db.as_ref(), invoice.id)
                .await
                .expect("detail");
            assert_eq!(detail.invoice.status, InvoiceStatus::Paid, "round {round}");
            assert_eq!(detail.run.state, EscalationState::Completed, "round {round}");
            assert_eq!(engine.locks().active(), 0);
        }
    }

    #[tokio::test]
    async fn preview_never_creates_a_run() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice_without_run(db.as_ref(), Some("ap@northridge.test"), None).await;
        let engine = engine(Arc::clone(&db));

        let err = engine.preview_step(invoice.id).await.expect_err("no run yet");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.get_escalation_run(invoice.id).await.expect("lookup").is_none());

        let approved = engine
            .approve_step(invoice.id, &ActorContext::system())
            .await
            .expect("approve creates the run");
        assert_eq!(approved.run.state, EscalationState::Scheduled);
        assert!(db.get_escalation_run(invoice.id).await.expect("lookup").is_some());
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found_without_creating_a_run() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let engine = engine(Arc::clone(&db));
        let id = uuid::Uuid::new_v4();

        let err = engine
            .mark_paid(id, &ActorContext::system())
            .await
            .expect_err("missing invoice");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(db.get_escalation_run(id).await.expect("lookup").is_none());
    }

    #[tokio::test]
    async fn pause_is_idempotent_and_keeps_stage() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), None, Some("+15550100")).await;
        let engine = engine(db);
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("approve");
        engine.pause(invoice.id, &actor).await.expect("pause");
        let detail = engine.pause(invoice.id, &actor).await.expect("pause again");

        assert_eq!(detail.invoice.status, InvoiceStatus::Paused);
        assert_eq!(detail.run.state, EscalationState::Paused);
        assert_eq!(detail.run.current_stage, Some(EscalationStage::PoliteNudge));
        assert_eq!(detail.events.len(), 1);
    }

    #[tokio::test]
    async fn approval_without_contact_still_transitions() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), None, None).await;
        let engine = engine(db);

        let preview = engine.preview_step(invoice.id).await.expect("preview");
        assert_eq!(preview.email_body, None);
        assert_eq!(preview.sms_body, None);

        let detail = engine
            .approve_step(invoice.id, &ActorContext::system())
            .await
            .expect("approve");
        assert!(detail.steps.is_empty());
        assert!(detail.events.is_empty());
        assert_eq!(detail.run.state, EscalationState::Scheduled);
        assert_eq!(detail.invoice.status, InvoiceStatus::InRecovery);
    }

    #[tokio::test]
    async fn unknown_invoice_is_not_found() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let engine = engine(db);
        let err = engine
            .mark_paid(uuid::Uuid::new_v4(), &ActorContext::system())
            .await
            .expect_err("missing");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn dispatch_sends_scheduled_steps_and_advances_stage() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), Some("+15550100")).await;
        let engine = engine(db);
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("approve");
        let report = engine
            .dispatch_scheduled(invoice.id, &actor)
            .await
            .expect("dispatch");
        assert_eq!((report.sent, report.failed), (2, 0));
        assert!(report.invoice.steps.iter().all(|s| s.status == StepStatus::Sent));
        assert!(report.invoice.steps.iter().all(|s| s.sent_at.is_some()));
        assert_eq!(report.invoice.events.len(), 4);

        let preview = engine.preview_step(invoice.id).await.expect("preview");
        assert_eq!(preview.stage, EscalationStage::FirmFollowUp);

        let repeat = engine
            .dispatch_scheduled(invoice.id, &actor)
            .await
            .expect("nothing left");
        assert_eq!((repeat.sent, repeat.failed), (0, 0));
    }

    #[tokio::test]
    async fn dispatch_failure_marks_step_failed() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), None, Some("+15550100")).await;
        let engine = engine_with(db, Arc::new(RejectingDelivery));
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("approve");
        let report = engine
            .dispatch_scheduled(invoice.id, &actor)
            .await
            .expect("dispatch");
        assert_eq!((report.sent, report.failed), (0, 1));
        assert_eq!(report.invoice.steps[0].status, StepStatus::Failed);
        let last = report.invoice.events.last().expect("event");
        assert_eq!(last.delivery_state.as_deref(), Some("failed"));
    }

    #[tokio::test]
    async fn dispatch_refuses_paused_run() {
        let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
        let invoice = seed_invoice(db.as_ref(), Some("ap@northridge.test"), None).await;
        let engine = engine(db);
        let actor = ActorContext::system();

        engine.approve_step(invoice.id, &actor).await.expect("approve");
        engine.pause(invoice.id, &actor).await.expect("pause");
        let err = engine
            .dispatch_scheduled(invoice.id, &actor)
            .await
            .expect_err("paused");
        assert_eq!(err.to_string(), "Escalation is paused.");
    }

    #[tokio::test]
    async fn locks_are_released_and_pruned() {
        let locks = InvoiceLocks::new();
        let id = uuid::Uuid::new_v4();
        {
            let _guard = locks.acquire(id).await;
            assert_eq!(locks.active(), 1);
        }
        assert_eq!(locks.active(), 0);
        let _again = locks.acquire(id).await;
    }
}
