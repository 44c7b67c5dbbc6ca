//! Fixtures shared by unit and integration tests.
//!
//! Every helper builds fresh state; nothing here is global, so tests can run
//! in any order and in parallel.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use uuid::Uuid;

use crate::db::memory::InMemoryBackend;
use crate::db::{
    ClientRecord, CreateClientParams, CreateInvoiceParams, Database, EscalationRunRecord,
    EscalationStage, EscalationState, EscalationStepRecord, InvoiceRecord, InvoiceStatus,
    MessageChannel, StepStatus, WorkspaceRecord,
};
use crate::recovery::InvoiceDetail;

/// A libSQL database in a temp directory. Keep the `TempDir` alive for the
/// lifetime of the test.
#[cfg(feature = "libsql")]
pub async fn test_db() -> (Arc<dyn Database>, tempfile::TempDir) {
    use crate::db::libsql::LibSqlBackend;

    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("test.db");
    let backend = LibSqlBackend::new_local(&path)
        .await
        .expect("open libsql database");
    backend.run_migrations().await.expect("run migrations");
    (Arc::new(backend), dir)
}

/// A fresh in-memory store.
pub fn memory_db() -> Arc<dyn Database> {
    Arc::new(InMemoryBackend::new())
}

pub fn sample_workspace() -> WorkspaceRecord {
    WorkspaceRecord {
        id: Uuid::new_v4(),
        slug: "demo-workspace".to_string(),
        name: "Demo Workspace".to_string(),
        plan: "trial".to_string(),
        created_at: Utc::now(),
    }
}

/// An in-memory detail view for North Ridge Labs / INV-2041 ($1,450.00).
pub fn sample_detail(email: Option<&str>, phone: Option<&str>, due: NaiveDate) -> InvoiceDetail {
    let now = Utc::now();
    let workspace_id = Uuid::new_v4();
    let client = ClientRecord {
        id: Uuid::new_v4(),
        workspace_id,
        name: "North Ridge Labs".to_string(),
        primary_email: email.map(str::to_string),
        primary_phone: phone.map(str::to_string),
        created_at: now,
    };
    let invoice = InvoiceRecord {
        id: Uuid::new_v4(),
        workspace_id,
        client_id: client.id,
        invoice_number: "INV-2041".to_string(),
        amount_cents: 145_000,
        currency: "USD".to_string(),
        issue_date: None,
        due_date: due,
        status: InvoiceStatus::AtRisk,
        notes: None,
        created_at: now,
        updated_at: now,
    };
    let run = EscalationRunRecord {
        id: Uuid::new_v4(),
        invoice_id: invoice.id,
        state: EscalationState::New,
        current_stage: None,
        created_at: now,
        updated_at: now,
    };
    InvoiceDetail {
        invoice,
        client,
        run,
        steps: Vec::new(),
        events: Vec::new(),
        legal_packet: None,
    }
}

pub fn sample_step(run_id: Uuid, stage: EscalationStage, status: StepStatus) -> EscalationStepRecord {
    let now = Utc::now();
    EscalationStepRecord {
        id: Uuid::new_v4(),
        run_id,
        stage,
        channel: MessageChannel::Email,
        status,
        preview_body: None,
        scheduled_for: None,
        approved_at: None,
        sent_at: None,
        created_at: now,
    }
}

/// Persist an invoice 30 days past due in `demo-workspace`, with its run.
pub async fn seed_invoice(
    db: &dyn Database,
    email: Option<&str>,
    phone: Option<&str>,
) -> InvoiceRecord {
    let invoice = seed_invoice_without_run(db, email, phone).await;
    db.ensure_escalation_run(invoice.id)
        .await
        .expect("seed run");
    invoice
}

/// Like [`seed_invoice`] but leaves the invoice without an escalation run.
pub async fn seed_invoice_without_run(
    db: &dyn Database,
    email: Option<&str>,
    phone: Option<&str>,
) -> InvoiceRecord {
    let workspace = db
        .ensure_workspace("demo-workspace", "Demo Workspace", "trial")
        .await
        .expect("seed workspace");
    let client = db
        .ensure_client(
            workspace.id,
            &CreateClientParams {
                name: "North Ridge Labs".to_string(),
                email: email.map(str::to_string),
                phone: phone.map(str::to_string),
            },
        )
        .await
        .expect("seed client");
    let today = Utc::now().date_naive();
    db.create_invoice(&CreateInvoiceParams {
        workspace_id: workspace.id,
        client_id: client.id,
        invoice_number: format!("INV-{}", &Uuid::new_v4().simple().to_string()[..6]),
        amount_cents: 145_000,
        currency: "USD".to_string(),
        issue_date: None,
        due_date: today.checked_sub_days(Days::new(30)).unwrap_or(today),
        status: InvoiceStatus::AtRisk,
        notes: None,
    })
    .await
    .expect("seed invoice")
}
