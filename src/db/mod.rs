//! Database abstraction layer.
//!
//! Provides a backend-agnostic `Database` trait that unifies all persistence
//! operations for the recovery pipeline. Two implementations exist:
//!
//! - `memory`: per-instance in-memory store, used by tests and demo runs
//! - `libsql` (default feature): libSQL (Turso's SQLite fork) for embedded use
//!
//! Domain code only ever holds an `Arc<dyn Database>`; which backend sits
//! behind it is decided once, at startup, by `connect_from_config`.

pub mod memory;

#[cfg(feature = "libsql")]
pub mod libsql;

#[cfg(feature = "libsql")]
pub mod libsql_migrations;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::DatabaseError;

/// Create a database backend from configuration, run migrations, and return it.
pub async fn connect_from_config(
    config: &DatabaseConfig,
) -> Result<Arc<dyn Database>, DatabaseError> {
    match config.backend {
        DatabaseBackend::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Ok(Arc::new(memory::InMemoryBackend::new()))
        }
        #[cfg(feature = "libsql")]
        DatabaseBackend::LibSql => {
            let backend = libsql::LibSqlBackend::new_local(&config.libsql_path)
                .await
                .map_err(|e| DatabaseError::Pool(e.to_string()))?;
            backend.run_migrations().await?;
            Ok(Arc::new(backend))
        }
        #[cfg(not(feature = "libsql"))]
        DatabaseBackend::LibSql => Err(DatabaseError::Pool(
            "libSQL backend requested but the 'libsql' feature is disabled".to_string(),
        )),
    }
}

/// Invoice lifecycle status. `Paid` and `ClosedUnresolved` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    New,
    AtRisk,
    InRecovery,
    Paused,
    Paid,
    ClosedUnresolved,
}

impl InvoiceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AtRisk => "at_risk",
            Self::InRecovery => "in_recovery",
            Self::Paused => "paused",
            Self::Paid => "paid",
            Self::ClosedUnresolved => "closed_unresolved",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "at_risk" => Some(Self::AtRisk),
            "in_recovery" => Some(Self::InRecovery),
            "paused" => Some(Self::Paused),
            "paid" => Some(Self::Paid),
            "closed_unresolved" => Some(Self::ClosedUnresolved),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Paid | Self::ClosedUnresolved)
    }
}

/// Escalation run lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationState {
    New,
    AwaitingApproval,
    Scheduled,
    Paused,
    Completed,
}

impl EscalationState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::New => "new",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Scheduled => "scheduled",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "new" => Some(Self::New),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "scheduled" => Some(Self::Scheduled),
            "paused" => Some(Self::Paused),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// Ordered message severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationStage {
    PoliteNudge,
    FirmFollowUp,
    CollectionsWarning,
    SmallClaimsTemplate,
}

impl EscalationStage {
    /// Canonical escalation order.
    pub const ORDER: [EscalationStage; 4] = [
        Self::PoliteNudge,
        Self::FirmFollowUp,
        Self::CollectionsWarning,
        Self::SmallClaimsTemplate,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::PoliteNudge => "polite_nudge",
            Self::FirmFollowUp => "firm_follow_up",
            Self::CollectionsWarning => "collections_warning",
            Self::SmallClaimsTemplate => "small_claims_template",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "polite_nudge" => Some(Self::PoliteNudge),
            "firm_follow_up" => Some(Self::FirmFollowUp),
            "collections_warning" => Some(Self::CollectionsWarning),
            "small_claims_template" => Some(Self::SmallClaimsTemplate),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::PoliteNudge => "Polite nudge",
            Self::FirmFollowUp => "Firm follow-up",
            Self::CollectionsWarning => "Collections warning",
            Self::SmallClaimsTemplate => "Small-claims prep",
        }
    }
}

/// Outbound/inbound message channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageChannel {
    Email,
    Sms,
}

impl MessageChannel {
    pub const ALL: [MessageChannel; 2] = [Self::Email, Self::Sms];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Sms => "sms",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "email" => Some(Self::Email),
            "sms" => Some(Self::Sms),
            _ => None,
        }
    }
}

/// Lifecycle of a single (stage, channel) step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Drafted,
    AwaitingApproval,
    Scheduled,
    Sent,
    Acknowledged,
    Failed,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Scheduled => "scheduled",
            Self::Sent => "sent",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "drafted" => Some(Self::Drafted),
            "awaiting_approval" => Some(Self::AwaitingApproval),
            "scheduled" => Some(Self::Scheduled),
            "sent" => Some(Self::Sent),
            "acknowledged" => Some(Self::Acknowledged),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Steps that have not left the approval/scheduling pipeline yet.
    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::Drafted | Self::AwaitingApproval | Self::Scheduled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Outbound,
    Inbound,
}

impl MessageDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Outbound => "outbound",
            Self::Inbound => "inbound",
        }
    }

    pub fn from_db_value(value: &str) -> Option<Self> {
        match value {
            "outbound" => Some(Self::Outbound),
            "inbound" => Some(Self::Inbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceRecord {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub plan: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub name: String,
    pub primary_email: Option<String>,
    pub primary_phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateClientParams {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateInvoiceParams {
    pub workspace_id: Uuid,
    pub client_id: Uuid,
    pub invoice_number: String,
    pub amount_cents: i64,
    pub currency: String,
    pub issue_date: Option<NaiveDate>,
    pub due_date: NaiveDate,
    pub status: InvoiceStatus,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationRunRecord {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub state: EscalationState,
    pub current_stage: Option<EscalationStage>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationStepRecord {
    pub id: Uuid,
    pub run_id: Uuid,
    pub stage: EscalationStage,
    pub channel: MessageChannel,
    pub status: StepStatus,
    pub preview_body: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Step write keyed by (run, stage, channel); an existing row is updated in place.
#[derive(Debug, Clone)]
pub struct UpsertEscalationStepParams {
    pub run_id: Uuid,
    pub stage: EscalationStage,
    pub channel: MessageChannel,
    pub status: StepStatus,
    pub preview_body: Option<String>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEventRecord {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub stage: Option<EscalationStage>,
    pub channel: MessageChannel,
    pub direction: MessageDirection,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub delivery_state: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateMessageEventParams {
    pub invoice_id: Uuid,
    pub stage: Option<EscalationStage>,
    pub channel: MessageChannel,
    pub direction: MessageDirection,
    pub body: String,
    pub provider_message_id: Option<String>,
    pub delivery_state: Option<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegalPacketRecord {
    pub id: Uuid,
    pub invoice_id: Uuid,
    pub jurisdiction: String,
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpsertLegalPacketParams {
    pub jurisdiction: String,
    pub content: String,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogRecord {
    pub id: Uuid,
    pub workspace_id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAuditLogParams {
    pub workspace_id: Uuid,
    pub actor: String,
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: serde_json::Value,
}

/// Key used for case-insensitive client reuse within a workspace.
pub fn normalize_client_name(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Coerce event metadata to a JSON object; anything else is stored as `{}`.
pub(crate) fn metadata_object(value: &serde_json::Value) -> serde_json::Value {
    if value.is_object() {
        value.clone()
    } else {
        serde_json::json!({})
    }
}

// ==================== Sub-traits ====================
//
// Each sub-trait groups related persistence methods. The `Database` supertrait
// combines them all; leaf consumers can depend on a specific sub-trait instead.

#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    /// Insert a workspace for `slug` if none exists, else return the existing one.
    async fn ensure_workspace(
        &self,
        slug: &str,
        name: &str,
        plan: &str,
    ) -> Result<WorkspaceRecord, DatabaseError>;
    async fn get_workspace(&self, id: Uuid) -> Result<Option<WorkspaceRecord>, DatabaseError>;
    async fn get_workspace_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError>;
    async fn update_workspace_plan(
        &self,
        id: Uuid,
        plan: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    /// Insert a client if no client with the same case-insensitive name exists
    /// in the workspace, else return the existing one unchanged.
    async fn ensure_client(
        &self,
        workspace_id: Uuid,
        input: &CreateClientParams,
    ) -> Result<ClientRecord, DatabaseError>;
    async fn get_client(&self, id: Uuid) -> Result<Option<ClientRecord>, DatabaseError>;
    async fn find_client_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<ClientRecord>, DatabaseError>;
}

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn create_invoice(
        &self,
        input: &CreateInvoiceParams,
    ) -> Result<InvoiceRecord, DatabaseError>;
    async fn get_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError>;
    /// Invoices of a workspace, ordered by due date ascending.
    async fn list_invoices(&self, workspace_id: Uuid) -> Result<Vec<InvoiceRecord>, DatabaseError>;
    /// Write `status` unless the stored status is `paid`. Returns the stored
    /// invoice after the write (unchanged if it was paid), `None` if missing.
    async fn set_invoice_status_unless_paid(
        &self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<InvoiceRecord>, DatabaseError>;
    /// Unconditionally set `paid`; the only write allowed to override any status.
    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError>;
}

#[async_trait]
pub trait EscalationStore: Send + Sync {
    /// Return the invoice's run, creating it (state `new`, no stage) if absent.
    async fn ensure_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<EscalationRunRecord, DatabaseError>;
    async fn get_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError>;
    /// Set the run state; `current_stage` is only written when `Some`.
    async fn update_escalation_run(
        &self,
        run_id: Uuid,
        state: EscalationState,
        current_stage: Option<EscalationStage>,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError>;
    async fn upsert_escalation_step(
        &self,
        input: &UpsertEscalationStepParams,
    ) -> Result<EscalationStepRecord, DatabaseError>;
    /// Set a step's delivery status; `sent_at` is only written when `Some`.
    async fn set_escalation_step_status(
        &self,
        step_id: Uuid,
        status: StepStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<Option<EscalationStepRecord>, DatabaseError>;
    /// Steps of a run, ordered by creation time.
    async fn list_escalation_steps(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<EscalationStepRecord>, DatabaseError>;
}

#[async_trait]
pub trait MessageEventStore: Send + Sync {
    /// Insert-only; events are never updated.
    async fn append_message_event(
        &self,
        input: &CreateMessageEventParams,
    ) -> Result<MessageEventRecord, DatabaseError>;
    async fn list_message_events(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<MessageEventRecord>, DatabaseError>;
}

#[async_trait]
pub trait LegalPacketStore: Send + Sync {
    async fn upsert_legal_packet(
        &self,
        invoice_id: Uuid,
        input: &UpsertLegalPacketParams,
    ) -> Result<LegalPacketRecord, DatabaseError>;
    async fn get_legal_packet(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<LegalPacketRecord>, DatabaseError>;
}

#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn record_audit_log(&self, input: &CreateAuditLogParams) -> Result<(), DatabaseError>;
    /// Most recent entries first.
    async fn list_audit_logs(
        &self,
        workspace_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, DatabaseError>;
}

/// Backend-agnostic database supertrait.
#[async_trait]
pub trait Database:
    WorkspaceStore
    + ClientStore
    + InvoiceStore
    + EscalationStore
    + MessageEventStore
    + LegalPacketStore
    + AuditLogStore
    + Send
    + Sync
{
    /// Run schema migrations for this backend.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::{EscalationStage, InvoiceStatus, StepStatus, normalize_client_name};

    #[test]
    fn enum_db_values_round_trip_for_every_variant() {
        for stage in EscalationStage::ORDER {
            assert_eq!(EscalationStage::from_db_value(stage.as_str()), Some(stage));
        }
        assert_eq!(InvoiceStatus::from_db_value("settled"), None);
        assert_eq!(StepStatus::from_db_value(""), None);
    }

    #[test]
    fn pending_step_statuses() {
        assert!(StepStatus::Drafted.is_pending());
        assert!(StepStatus::AwaitingApproval.is_pending());
        assert!(StepStatus::Scheduled.is_pending());
        assert!(!StepStatus::Sent.is_pending());
        assert!(!StepStatus::Acknowledged.is_pending());
        assert!(!StepStatus::Failed.is_pending());
    }

    #[test]
    fn client_names_normalize_case_insensitively() {
        assert_eq!(normalize_client_name("  North Ridge LABS "), "north ridge labs");
        assert_eq!(
            normalize_client_name("north ridge labs"),
            normalize_client_name("NORTH RIDGE LABS")
        );
    }

    #[test]
    fn only_paid_and_closed_are_terminal() {
        assert!(InvoiceStatus::Paid.is_terminal());
        assert!(InvoiceStatus::ClosedUnresolved.is_terminal());
        assert!(!InvoiceStatus::Paused.is_terminal());
        assert!(!InvoiceStatus::AtRisk.is_terminal());
    }
}
