use chrono::{DateTime, Utc};
use libsql::params;
use uuid::Uuid;

use crate::db::{
    AuditLogRecord, AuditLogStore, ClientRecord, ClientStore, CreateAuditLogParams,
    CreateClientParams, CreateInvoiceParams, CreateMessageEventParams, EscalationRunRecord,
    EscalationStage, EscalationState, EscalationStepRecord, EscalationStore, InvoiceRecord,
    InvoiceStatus, InvoiceStore, LegalPacketRecord, LegalPacketStore, MessageChannel,
    MessageDirection, MessageEventRecord, MessageEventStore, StepStatus,
    UpsertEscalationStepParams, UpsertLegalPacketParams, WorkspaceRecord, WorkspaceStore,
    metadata_object, normalize_client_name,
};
use crate::error::DatabaseError;

use super::{
    LibSqlBackend, fmt_date, fmt_ts, get_i64, get_opt_text, get_text, opt_text, opt_ts,
    parse_date, parse_timestamp,
};

const WORKSPACE_COLUMNS: &str = "id, slug, name, plan, created_at";
const CLIENT_COLUMNS: &str = "id, workspace_id, name, primary_email, primary_phone, created_at";
const INVOICE_COLUMNS: &str = "id, workspace_id, client_id, invoice_number, amount_cents, currency, \
     issue_date, due_date, status, notes, created_at, updated_at";
const RUN_COLUMNS: &str = "id, invoice_id, state, current_stage, created_at, updated_at";
const STEP_COLUMNS: &str = "id, run_id, stage, channel, status, preview_body, scheduled_for, \
     approved_at, sent_at, created_at";
const EVENT_COLUMNS: &str = "id, invoice_id, stage, channel, direction, body, provider_message_id, \
     delivery_state, metadata, created_at";
const PACKET_COLUMNS: &str = "id, invoice_id, jurisdiction, content, generated_at";
const AUDIT_COLUMNS: &str =
    "id, workspace_id, actor, action, entity_type, entity_id, payload, created_at";

fn parse_uuid(raw: &str, field: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw)
        .map_err(|e| DatabaseError::Serialization(format!("invalid {field} uuid: {e}")))
}

fn parse_ts(raw: &str) -> Result<DateTime<Utc>, DatabaseError> {
    parse_timestamp(raw).map_err(DatabaseError::Serialization)
}

fn parse_ts_opt(raw: Option<String>) -> Result<Option<DateTime<Utc>>, DatabaseError> {
    raw.as_deref().map(parse_ts).transpose()
}

fn parse_enum<T>(
    raw: &str,
    field: &str,
    decode: fn(&str) -> Option<T>,
) -> Result<T, DatabaseError> {
    decode(raw).ok_or_else(|| DatabaseError::Serialization(format!("invalid {field} '{raw}'")))
}

fn parse_json_object(raw: &str) -> Result<serde_json::Value, DatabaseError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::json!({}));
    }
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DatabaseError::Serialization(e.to_string()))?;
    Ok(metadata_object(&value))
}

fn to_json_text(value: &serde_json::Value) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn row_to_workspace_record(row: &libsql::Row) -> Result<WorkspaceRecord, DatabaseError> {
    Ok(WorkspaceRecord {
        id: parse_uuid(&get_text(row, 0), "workspaces.id")?,
        slug: get_text(row, 1),
        name: get_text(row, 2),
        plan: get_text(row, 3),
        created_at: parse_ts(&get_text(row, 4))?,
    })
}

fn row_to_client_record(row: &libsql::Row) -> Result<ClientRecord, DatabaseError> {
    Ok(ClientRecord {
        id: parse_uuid(&get_text(row, 0), "clients.id")?,
        workspace_id: parse_uuid(&get_text(row, 1), "clients.workspace_id")?,
        name: get_text(row, 2),
        primary_email: get_opt_text(row, 3),
        primary_phone: get_opt_text(row, 4),
        created_at: parse_ts(&get_text(row, 5))?,
    })
}

fn row_to_invoice_record(row: &libsql::Row) -> Result<InvoiceRecord, DatabaseError> {
    let issue_date = get_opt_text(row, 6)
        .as_deref()
        .map(parse_date)
        .transpose()
        .map_err(DatabaseError::Serialization)?;
    Ok(InvoiceRecord {
        id: parse_uuid(&get_text(row, 0), "invoices.id")?,
        workspace_id: parse_uuid(&get_text(row, 1), "invoices.workspace_id")?,
        client_id: parse_uuid(&get_text(row, 2), "invoices.client_id")?,
        invoice_number: get_text(row, 3),
        amount_cents: get_i64(row, 4),
        currency: get_text(row, 5),
        issue_date,
        due_date: parse_date(&get_text(row, 7)).map_err(DatabaseError::Serialization)?,
        status: parse_enum(&get_text(row, 8), "invoice status", InvoiceStatus::from_db_value)?,
        notes: get_opt_text(row, 9),
        created_at: parse_ts(&get_text(row, 10))?,
        updated_at: parse_ts(&get_text(row, 11))?,
    })
}

fn row_to_run_record(row: &libsql::Row) -> Result<EscalationRunRecord, DatabaseError> {
    let current_stage = match get_opt_text(row, 3) {
        Some(raw) => Some(parse_enum(
            &raw,
            "escalation stage",
            EscalationStage::from_db_value,
        )?),
        None => None,
    };
    Ok(EscalationRunRecord {
        id: parse_uuid(&get_text(row, 0), "escalation_runs.id")?,
        invoice_id: parse_uuid(&get_text(row, 1), "escalation_runs.invoice_id")?,
        state: parse_enum(
            &get_text(row, 2),
            "escalation state",
            EscalationState::from_db_value,
        )?,
        current_stage,
        created_at: parse_ts(&get_text(row, 4))?,
        updated_at: parse_ts(&get_text(row, 5))?,
    })
}

fn row_to_step_record(row: &libsql::Row) -> Result<EscalationStepRecord, DatabaseError> {
    Ok(EscalationStepRecord {
        id: parse_uuid(&get_text(row, 0), "escalation_steps.id")?,
        run_id: parse_uuid(&get_text(row, 1), "escalation_steps.run_id")?,
        stage: parse_enum(
            &get_text(row, 2),
            "escalation stage",
            EscalationStage::from_db_value,
        )?,
        channel: parse_enum(&get_text(row, 3), "channel", MessageChannel::from_db_value)?,
        status: parse_enum(&get_text(row, 4), "step status", StepStatus::from_db_value)?,
        preview_body: get_opt_text(row, 5),
        scheduled_for: parse_ts_opt(get_opt_text(row, 6))?,
        approved_at: parse_ts_opt(get_opt_text(row, 7))?,
        sent_at: parse_ts_opt(get_opt_text(row, 8))?,
        created_at: parse_ts(&get_text(row, 9))?,
    })
}

fn row_to_event_record(row: &libsql::Row) -> Result<MessageEventRecord, DatabaseError> {
    let stage = match get_opt_text(row, 2) {
        Some(raw) => Some(parse_enum(
            &raw,
            "escalation stage",
            EscalationStage::from_db_value,
        )?),
        None => None,
    };
    Ok(MessageEventRecord {
        id: parse_uuid(&get_text(row, 0), "message_events.id")?,
        invoice_id: parse_uuid(&get_text(row, 1), "message_events.invoice_id")?,
        stage,
        channel: parse_enum(&get_text(row, 3), "channel", MessageChannel::from_db_value)?,
        direction: parse_enum(
            &get_text(row, 4),
            "direction",
            MessageDirection::from_db_value,
        )?,
        body: get_text(row, 5),
        provider_message_id: get_opt_text(row, 6),
        delivery_state: get_opt_text(row, 7),
        metadata: parse_json_object(&get_text(row, 8))?,
        created_at: parse_ts(&get_text(row, 9))?,
    })
}

fn row_to_packet_record(row: &libsql::Row) -> Result<LegalPacketRecord, DatabaseError> {
    Ok(LegalPacketRecord {
        id: parse_uuid(&get_text(row, 0), "legal_packets.id")?,
        invoice_id: parse_uuid(&get_text(row, 1), "legal_packets.invoice_id")?,
        jurisdiction: get_text(row, 2),
        content: get_text(row, 3),
        generated_at: parse_ts(&get_text(row, 4))?,
    })
}

fn row_to_audit_record(row: &libsql::Row) -> Result<AuditLogRecord, DatabaseError> {
    Ok(AuditLogRecord {
        id: parse_uuid(&get_text(row, 0), "audit_logs.id")?,
        workspace_id: parse_uuid(&get_text(row, 1), "audit_logs.workspace_id")?,
        actor: get_text(row, 2),
        action: get_text(row, 3),
        entity_type: get_text(row, 4),
        entity_id: get_text(row, 5),
        payload: serde_json::from_str(&get_text(row, 6))
            .map_err(|e| DatabaseError::Serialization(e.to_string()))?,
        created_at: parse_ts(&get_text(row, 7))?,
    })
}

#[async_trait::async_trait]
impl WorkspaceStore for LibSqlBackend {
    async fn ensure_workspace(
        &self,
        slug: &str,
        name: &str,
        plan: &str,
    ) -> Result<WorkspaceRecord, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO workspaces (id, slug, name, plan, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) ON CONFLICT(slug) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                slug,
                name,
                plan,
                fmt_ts(&Utc::now())
            ],
        )
        .await?;

        self.get_workspace_by_slug(slug)
            .await?
            .ok_or_else(|| DatabaseError::Query(format!("failed to load workspace '{slug}'")))
    }

    async fn get_workspace(&self, id: Uuid) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_workspace_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn get_workspace_by_slug(
        &self,
        slug: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {WORKSPACE_COLUMNS} FROM workspaces WHERE slug = ?1 LIMIT 1"),
                params![slug],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_workspace_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn update_workspace_plan(
        &self,
        id: Uuid,
        plan: &str,
    ) -> Result<Option<WorkspaceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE workspaces SET plan = ?2 WHERE id = ?1",
            params![id.to_string(), plan],
        )
        .await?;
        self.get_workspace(id).await
    }
}

#[async_trait::async_trait]
impl ClientStore for LibSqlBackend {
    async fn ensure_client(
        &self,
        workspace_id: Uuid,
        input: &CreateClientParams,
    ) -> Result<ClientRecord, DatabaseError> {
        let normalized_name = normalize_client_name(&input.name);
        if normalized_name.is_empty() {
            return Err(DatabaseError::Serialization(
                "client name cannot be empty".to_string(),
            ));
        }

        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO clients (id, workspace_id, name, name_normalized, primary_email, primary_phone, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
             ON CONFLICT(workspace_id, name_normalized) DO NOTHING",
            params![
                Uuid::new_v4().to_string(),
                workspace_id.to_string(),
                input.name.trim(),
                normalized_name.as_str(),
                opt_text(input.email.as_deref()),
                opt_text(input.phone.as_deref()),
                fmt_ts(&Utc::now()),
            ],
        )
        .await?;

        self.find_client_by_name(workspace_id, &input.name)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load ensured client".to_string()))
    }

    async fn get_client(&self, id: Uuid) -> Result<Option<ClientRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {CLIENT_COLUMNS} FROM clients WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_client_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn find_client_by_name(
        &self,
        workspace_id: Uuid,
        name: &str,
    ) -> Result<Option<ClientRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {CLIENT_COLUMNS} FROM clients \
                     WHERE workspace_id = ?1 AND name_normalized = ?2 LIMIT 1"
                ),
                params![workspace_id.to_string(), normalize_client_name(name)],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_client_record(&row).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl InvoiceStore for LibSqlBackend {
    async fn create_invoice(
        &self,
        input: &CreateInvoiceParams,
    ) -> Result<InvoiceRecord, DatabaseError> {
        let conn = self.connect().await?;
        let owner = conn
            .query(
                "SELECT 1 FROM clients WHERE id = ?1 AND workspace_id = ?2 LIMIT 1",
                params![input.client_id.to_string(), input.workspace_id.to_string()],
            )
            .await?
            .next()
            .await?;
        if owner.is_none() {
            return Err(DatabaseError::Constraint(format!(
                "client {} does not belong to workspace {}",
                input.client_id, input.workspace_id
            )));
        }

        let id = Uuid::new_v4();
        let now = fmt_ts(&Utc::now());
        conn.execute(
            "INSERT INTO invoices (id, workspace_id, client_id, invoice_number, amount_cents, currency, \
             issue_date, due_date, status, notes, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
            params![
                id.to_string(),
                input.workspace_id.to_string(),
                input.client_id.to_string(),
                input.invoice_number.as_str(),
                input.amount_cents,
                input.currency.as_str(),
                opt_text(input.issue_date.map(|d| fmt_date(&d)).as_deref()),
                fmt_date(&input.due_date),
                input.status.as_str(),
                opt_text(input.notes.as_deref()),
                now,
            ],
        )
        .await?;

        self.get_invoice(id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load created invoice".to_string()))
    }

    async fn get_invoice(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?1 LIMIT 1"),
                params![id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_invoice_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_invoices(&self, workspace_id: Uuid) -> Result<Vec<InvoiceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {INVOICE_COLUMNS} FROM invoices WHERE workspace_id = ?1 \
                     ORDER BY due_date ASC, rowid ASC"
                ),
                params![workspace_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_invoice_record(&row)?);
        }
        Ok(out)
    }

    async fn set_invoice_status_unless_paid(
        &self,
        id: Uuid,
        status: InvoiceStatus,
    ) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE invoices SET status = ?2, updated_at = ?3 WHERE id = ?1 AND status <> 'paid'",
            params![id.to_string(), status.as_str(), fmt_ts(&Utc::now())],
        )
        .await?;
        self.get_invoice(id).await
    }

    async fn mark_invoice_paid(&self, id: Uuid) -> Result<Option<InvoiceRecord>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE invoices SET status = 'paid', updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), fmt_ts(&Utc::now())],
        )
        .await?;
        self.get_invoice(id).await
    }
}

#[async_trait::async_trait]
impl EscalationStore for LibSqlBackend {
    async fn ensure_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<EscalationRunRecord, DatabaseError> {
        if let Some(existing) = self.get_escalation_run(invoice_id).await? {
            return Ok(existing);
        }

        let conn = self.connect().await?;
        let now = fmt_ts(&Utc::now());
        // INSERT ... SELECT keeps the run from pointing at a missing invoice.
        let inserted = conn
            .execute(
                "INSERT INTO escalation_runs (id, invoice_id, state, current_stage, created_at, updated_at) \
                 SELECT ?1, id, 'new', NULL, ?3, ?3 FROM invoices WHERE id = ?2 \
                 ON CONFLICT(invoice_id) DO NOTHING",
                params![Uuid::new_v4().to_string(), invoice_id.to_string(), now],
            )
            .await?;

        match self.get_escalation_run(invoice_id).await? {
            Some(run) => Ok(run),
            None if inserted == 0 => Err(DatabaseError::Constraint(format!(
                "escalation run references unknown invoice {invoice_id}"
            ))),
            None => Err(DatabaseError::Query(
                "failed to load created escalation run".to_string(),
            )),
        }
    }

    async fn get_escalation_run(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {RUN_COLUMNS} FROM escalation_runs WHERE invoice_id = ?1 LIMIT 1"
                ),
                params![invoice_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_run_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn update_escalation_run(
        &self,
        run_id: Uuid,
        state: EscalationState,
        current_stage: Option<EscalationStage>,
    ) -> Result<Option<EscalationRunRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let now = fmt_ts(&Utc::now());
        match current_stage {
            Some(stage) => {
                conn.execute(
                    "UPDATE escalation_runs SET state = ?2, current_stage = ?3, updated_at = ?4 \
                     WHERE id = ?1",
                    params![run_id.to_string(), state.as_str(), stage.as_str(), now],
                )
                .await?
            }
            None => {
                conn.execute(
                    "UPDATE escalation_runs SET state = ?2, updated_at = ?3 WHERE id = ?1",
                    params![run_id.to_string(), state.as_str(), now],
                )
                .await?
            }
        };

        let mut rows = conn
            .query(
                &format!("SELECT {RUN_COLUMNS} FROM escalation_runs WHERE id = ?1 LIMIT 1"),
                params![run_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_run_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn upsert_escalation_step(
        &self,
        input: &UpsertEscalationStepParams,
    ) -> Result<EscalationStepRecord, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO escalation_steps (id, run_id, stage, channel, status, preview_body, \
             scheduled_for, approved_at, sent_at, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9) \
             ON CONFLICT(run_id, stage, channel) DO UPDATE SET \
               status = excluded.status, \
               preview_body = excluded.preview_body, \
               scheduled_for = excluded.scheduled_for, \
               approved_at = excluded.approved_at",
            params![
                Uuid::new_v4().to_string(),
                input.run_id.to_string(),
                input.stage.as_str(),
                input.channel.as_str(),
                input.status.as_str(),
                opt_text(input.preview_body.as_deref()),
                opt_ts(input.scheduled_for),
                opt_ts(input.approved_at),
                fmt_ts(&Utc::now()),
            ],
        )
        .await?;

        let row = conn
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM escalation_steps \
                     WHERE run_id = ?1 AND stage = ?2 AND channel = ?3 LIMIT 1"
                ),
                params![
                    input.run_id.to_string(),
                    input.stage.as_str(),
                    input.channel.as_str()
                ],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load upserted step".to_string()))?;
        row_to_step_record(&row)
    }

    async fn set_escalation_step_status(
        &self,
        step_id: Uuid,
        status: StepStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<Option<EscalationStepRecord>, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "UPDATE escalation_steps SET status = ?2, sent_at = COALESCE(?3, sent_at) WHERE id = ?1",
            params![step_id.to_string(), status.as_str(), opt_ts(sent_at)],
        )
        .await?;

        let mut rows = conn
            .query(
                &format!("SELECT {STEP_COLUMNS} FROM escalation_steps WHERE id = ?1 LIMIT 1"),
                params![step_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_step_record(&row).map(Some),
            None => Ok(None),
        }
    }

    async fn list_escalation_steps(
        &self,
        run_id: Uuid,
    ) -> Result<Vec<EscalationStepRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {STEP_COLUMNS} FROM escalation_steps WHERE run_id = ?1 \
                     ORDER BY created_at ASC, rowid ASC"
                ),
                params![run_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_step_record(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl MessageEventStore for LibSqlBackend {
    async fn append_message_event(
        &self,
        input: &CreateMessageEventParams,
    ) -> Result<MessageEventRecord, DatabaseError> {
        let conn = self.connect().await?;
        let id = Uuid::new_v4().to_string();
        conn.execute(
            "INSERT INTO message_events (id, invoice_id, stage, channel, direction, body, \
             provider_message_id, delivery_state, metadata, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                id.as_str(),
                input.invoice_id.to_string(),
                opt_text(input.stage.map(EscalationStage::as_str)),
                input.channel.as_str(),
                input.direction.as_str(),
                input.body.as_str(),
                opt_text(input.provider_message_id.as_deref()),
                opt_text(input.delivery_state.as_deref()),
                to_json_text(&metadata_object(&input.metadata))?,
                fmt_ts(&Utc::now()),
            ],
        )
        .await?;

        let row = conn
            .query(
                &format!("SELECT {EVENT_COLUMNS} FROM message_events WHERE id = ?1 LIMIT 1"),
                params![id.as_str()],
            )
            .await?
            .next()
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load appended event".to_string()))?;
        row_to_event_record(&row)
    }

    async fn list_message_events(
        &self,
        invoice_id: Uuid,
    ) -> Result<Vec<MessageEventRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM message_events WHERE invoice_id = ?1 \
                     ORDER BY created_at ASC, rowid ASC"
                ),
                params![invoice_id.to_string()],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_event_record(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl LegalPacketStore for LibSqlBackend {
    async fn upsert_legal_packet(
        &self,
        invoice_id: Uuid,
        input: &UpsertLegalPacketParams,
    ) -> Result<LegalPacketRecord, DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO legal_packets (id, invoice_id, jurisdiction, content, generated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5) \
             ON CONFLICT(invoice_id) DO UPDATE SET \
               jurisdiction = excluded.jurisdiction, \
               content = excluded.content, \
               generated_at = excluded.generated_at",
            params![
                Uuid::new_v4().to_string(),
                invoice_id.to_string(),
                input.jurisdiction.as_str(),
                input.content.as_str(),
                fmt_ts(&input.generated_at),
            ],
        )
        .await?;

        self.get_legal_packet(invoice_id)
            .await?
            .ok_or_else(|| DatabaseError::Query("failed to load upserted packet".to_string()))
    }

    async fn get_legal_packet(
        &self,
        invoice_id: Uuid,
    ) -> Result<Option<LegalPacketRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {PACKET_COLUMNS} FROM legal_packets WHERE invoice_id = ?1 LIMIT 1"
                ),
                params![invoice_id.to_string()],
            )
            .await?;
        match rows.next().await? {
            Some(row) => row_to_packet_record(&row).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait::async_trait]
impl AuditLogStore for LibSqlBackend {
    async fn record_audit_log(&self, input: &CreateAuditLogParams) -> Result<(), DatabaseError> {
        let conn = self.connect().await?;
        conn.execute(
            "INSERT INTO audit_logs (id, workspace_id, actor, action, entity_type, entity_id, payload, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                input.workspace_id.to_string(),
                input.actor.as_str(),
                input.action.as_str(),
                input.entity_type.as_str(),
                input.entity_id.as_str(),
                to_json_text(&input.payload)?,
                fmt_ts(&Utc::now()),
            ],
        )
        .await?;
        Ok(())
    }

    async fn list_audit_logs(
        &self,
        workspace_id: Uuid,
        limit: usize,
    ) -> Result<Vec<AuditLogRecord>, DatabaseError> {
        let conn = self.connect().await?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {AUDIT_COLUMNS} FROM audit_logs WHERE workspace_id = ?1 \
                     ORDER BY created_at DESC, rowid DESC LIMIT ?2"
                ),
                params![workspace_id.to_string(), limit],
            )
            .await?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().await? {
            out.push(row_to_audit_record(&row)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use libsql::params;
    use pretty_assertions::assert_eq;
    use uuid::Uuid;

    use crate::db::libsql::LibSqlBackend;
    use crate::db::{
        AuditLogStore, ClientStore, CreateAuditLogParams, CreateClientParams,
        CreateInvoiceParams, CreateMessageEventParams, Database, EscalationStage,
        EscalationState, EscalationStore, InvoiceStatus, InvoiceStore, MessageChannel,
        MessageDirection, MessageEventStore, StepStatus, UpsertEscalationStepParams,
        WorkspaceStore,
    };

    async fn backend_with_invoice() -> (LibSqlBackend, Uuid, Uuid) {
        let db = LibSqlBackend::new_memory().await.expect("libsql memory");
        let ws = db
            .ensure_workspace("demo-workspace", "Demo Workspace", "trial")
            .await
            .expect("workspace");
        let client = db
            .ensure_client(
                ws.id,
                &CreateClientParams {
                    name: "North Ridge Labs".to_string(),
                    email: Some("ap@northridge.test".to_string()),
                    phone: None,
                },
            )
            .await
            .expect("client");
        let invoice = db
            .create_invoice(&CreateInvoiceParams {
                workspace_id: ws.id,
                client_id: client.id,
                invoice_number: "INV-2041".to_string(),
                amount_cents: 145_000,
                currency: "USD".to_string(),
                issue_date: NaiveDate::from_ymd_opt(2026, 1, 1),
                due_date: NaiveDate::from_ymd_opt(2026, 1, 31).expect("date"),
                status: InvoiceStatus::AtRisk,
                notes: None,
            })
            .await
            .expect("invoice");
        (db, ws.id, invoice.id)
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = LibSqlBackend::new_memory().await.expect("libsql memory");
        db.run_migrations().await.expect("second run");
    }

    #[tokio::test]
    async fn file_backend_persists_across_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("recovery.db");
        {
            let db = LibSqlBackend::new_local(&path).await.expect("open");
            db.run_migrations().await.expect("migrate");
            db.ensure_workspace("acme", "Acme", "trial")
                .await
                .expect("workspace");
        }
        let reopened = LibSqlBackend::new_local(&path).await.expect("reopen");
        reopened.run_migrations().await.expect("migrate");
        assert!(
            reopened
                .get_workspace_by_slug("acme")
                .await
                .expect("lookup")
                .is_some()
        );
    }

    #[tokio::test]
    async fn workspace_and_client_are_reused() {
        let (db, ws_id, _) = backend_with_invoice().await;
        let again = db
            .ensure_workspace("demo-workspace", "Other Name", "pro")
            .await
            .expect("workspace");
        assert_eq!(again.id, ws_id);
        assert_eq!(again.name, "Demo Workspace");

        let first = db
            .find_client_by_name(ws_id, "north ridge labs")
            .await
            .expect("lookup")
            .expect("client");
        let reused = db
            .ensure_client(
                ws_id,
                &CreateClientParams {
                    name: "  NORTH RIDGE LABS ".to_string(),
                    email: None,
                    phone: Some("+15550100".to_string()),
                },
            )
            .await
            .expect("ensure");
        assert_eq!(reused.id, first.id);
        assert_eq!(reused.primary_email.as_deref(), Some("ap@northridge.test"));
        assert_eq!(reused.primary_phone, None);
    }

    #[tokio::test]
    async fn paid_status_survives_guarded_and_raw_writes() {
        let (db, _, invoice_id) = backend_with_invoice().await;
        db.mark_invoice_paid(invoice_id).await.expect("paid");

        let guarded = db
            .set_invoice_status_unless_paid(invoice_id, InvoiceStatus::Paused)
            .await
            .expect("guarded write")
            .expect("invoice");
        assert_eq!(guarded.status, InvoiceStatus::Paid);

        let conn = db.connect().await.expect("conn");
        let raw = conn
            .execute(
                "UPDATE invoices SET status = 'in_recovery' WHERE id = ?1",
                params![invoice_id.to_string()],
            )
            .await;
        assert!(raw.is_err(), "trigger must reject regressing a paid invoice");

        // Re-marking paid stays allowed.
        db.mark_invoice_paid(invoice_id).await.expect("paid again");
    }

    #[tokio::test]
    async fn run_and_steps_round_trip() {
        let (db, _, invoice_id) = backend_with_invoice().await;
        let run = db.ensure_escalation_run(invoice_id).await.expect("run");
        assert_eq!(run.state, EscalationState::New);
        assert_eq!(run.current_stage, None);
        assert_eq!(
            db.ensure_escalation_run(invoice_id).await.expect("run").id,
            run.id
        );

        let base = UpsertEscalationStepParams {
            run_id: run.id,
            stage: EscalationStage::PoliteNudge,
            channel: MessageChannel::Email,
            status: StepStatus::Scheduled,
            preview_body: Some("Hi".to_string()),
            scheduled_for: Some(chrono::Utc::now()),
            approved_at: Some(chrono::Utc::now()),
        };
        let first = db.upsert_escalation_step(&base).await.expect("step");
        let again = db.upsert_escalation_step(&base).await.expect("step");
        assert_eq!(first.id, again.id);
        db.upsert_escalation_step(&UpsertEscalationStepParams {
            channel: MessageChannel::Sms,
            ..base.clone()
        })
        .await
        .expect("sms step");

        let steps = db.list_escalation_steps(run.id).await.expect("steps");
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[0].channel, MessageChannel::Email);

        let scheduled = db
            .update_escalation_run(
                run.id,
                EscalationState::Scheduled,
                Some(EscalationStage::PoliteNudge),
            )
            .await
            .expect("update")
            .expect("run");
        let paused = db
            .update_escalation_run(run.id, EscalationState::Paused, None)
            .await
            .expect("update")
            .expect("run");
        assert_eq!(scheduled.current_stage, Some(EscalationStage::PoliteNudge));
        assert_eq!(paused.current_stage, Some(EscalationStage::PoliteNudge));
        assert_eq!(paused.state, EscalationState::Paused);
    }

    #[tokio::test]
    async fn run_for_unknown_invoice_is_rejected() {
        let db = LibSqlBackend::new_memory().await.expect("libsql memory");
        assert!(db.ensure_escalation_run(Uuid::new_v4()).await.is_err());
    }

    #[tokio::test]
    async fn events_keep_metadata_objects_only() {
        let (db, _, invoice_id) = backend_with_invoice().await;
        let event = db
            .append_message_event(&CreateMessageEventParams {
                invoice_id,
                stage: Some(EscalationStage::FirmFollowUp),
                channel: MessageChannel::Sms,
                direction: MessageDirection::Outbound,
                body: "Invoice INV-2041 is overdue".to_string(),
                provider_message_id: None,
                delivery_state: Some("queued".to_string()),
                metadata: serde_json::json!(["not", "an", "object"]),
            })
            .await
            .expect("event");
        assert_eq!(event.metadata, serde_json::json!({}));
        assert_eq!(event.stage, Some(EscalationStage::FirmFollowUp));
        assert_eq!(
            db.list_message_events(invoice_id).await.expect("events").len(),
            1
        );
    }

    #[tokio::test]
    async fn audit_entries_list_newest_first() {
        let (db, ws_id, invoice_id) = backend_with_invoice().await;
        for action in ["approve_escalation_step", "mark_invoice_paid"] {
            db.record_audit_log(&CreateAuditLogParams {
                workspace_id: ws_id,
                actor: "system".to_string(),
                action: action.to_string(),
                entity_type: "invoice".to_string(),
                entity_id: invoice_id.to_string(),
                payload: serde_json::json!({ "stage": "polite_nudge" }),
            })
            .await
            .expect("audit");
        }
        let entries = db.list_audit_logs(ws_id, 10).await.expect("list");
        let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
        assert_eq!(actions, vec!["mark_invoice_paid", "approve_escalation_step"]);
        assert_eq!(db.list_audit_logs(ws_id, 1).await.expect("list").len(), 1);
    }
}
