//! SQLite-dialect schema for the libSQL backend.
//!
//! Applied on every startup; idempotent via `IF NOT EXISTS`.
//!
//! Type mapping:
//! - ids -> `TEXT` (hyphenated UUID)
//! - timestamps -> `TEXT` (RFC 3339, microseconds, `Z` suffix, so they sort lexically)
//! - calendar dates -> `TEXT` (`YYYY-MM-DD`)
//! - JSON payloads -> `TEXT`

pub const SCHEMA: &str = r#"

CREATE TABLE IF NOT EXISTS _migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ==================== Tenancy ====================

CREATE TABLE IF NOT EXISTS workspaces (
    id TEXT PRIMARY KEY,
    slug TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    plan TEXT NOT NULL DEFAULT 'trial',
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id),
    name TEXT NOT NULL,
    name_normalized TEXT NOT NULL,
    primary_email TEXT,
    primary_phone TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (workspace_id, name_normalized)
);

-- ==================== Invoices ====================

CREATE TABLE IF NOT EXISTS invoices (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL REFERENCES workspaces(id),
    client_id TEXT NOT NULL REFERENCES clients(id),
    invoice_number TEXT NOT NULL,
    amount_cents INTEGER NOT NULL,
    currency TEXT NOT NULL DEFAULT 'USD',
    issue_date TEXT,
    due_date TEXT NOT NULL,
    status TEXT NOT NULL,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_invoices_workspace_due ON invoices(workspace_id, due_date);

-- A paid invoice never changes status again, whichever code path issues the write.
CREATE TRIGGER IF NOT EXISTS trg_invoices_paid_is_final
BEFORE UPDATE OF status ON invoices
FOR EACH ROW WHEN OLD.status = 'paid' AND NEW.status <> 'paid'
BEGIN
    SELECT RAISE(ABORT, 'invoice is paid');
END;

-- ==================== Escalation ====================

CREATE TABLE IF NOT EXISTS escalation_runs (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL UNIQUE REFERENCES invoices(id),
    state TEXT NOT NULL DEFAULT 'new',
    current_stage TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS escalation_steps (
    id TEXT PRIMARY KEY,
    run_id TEXT NOT NULL REFERENCES escalation_runs(id),
    stage TEXT NOT NULL,
    channel TEXT NOT NULL,
    status TEXT NOT NULL,
    preview_body TEXT,
    scheduled_for TEXT,
    approved_at TEXT,
    sent_at TEXT,
    created_at TEXT NOT NULL,
    UNIQUE (run_id, stage, channel)
);

CREATE TABLE IF NOT EXISTS message_events (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL REFERENCES invoices(id),
    stage TEXT,
    channel TEXT NOT NULL,
    direction TEXT NOT NULL,
    body TEXT NOT NULL,
    provider_message_id TEXT,
    delivery_state TEXT,
    metadata TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_message_events_invoice ON message_events(invoice_id, created_at);

CREATE TABLE IF NOT EXISTS legal_packets (
    id TEXT PRIMARY KEY,
    invoice_id TEXT NOT NULL UNIQUE REFERENCES invoices(id),
    jurisdiction TEXT NOT NULL,
    content TEXT NOT NULL,
    generated_at TEXT NOT NULL
);

-- ==================== Audit ====================

CREATE TABLE IF NOT EXISTS audit_logs (
    id TEXT PRIMARY KEY,
    workspace_id TEXT NOT NULL,
    actor TEXT NOT NULL,
    action TEXT NOT NULL,
    entity_type TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_workspace ON audit_logs(workspace_id, created_at);

INSERT OR IGNORE INTO _migrations (version, name) VALUES (1, 'initial_schema');
"#;
