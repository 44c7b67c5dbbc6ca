//! Request and response DTOs for the HTTP API.
//!
//! Request bodies use the camelCase field names the dashboard sends; the
//! records nested inside responses keep their snake_case storage names.

use serde::{Deserialize, Serialize};

use crate::db::{EscalationStage, LegalPacketRecord};
use crate::recovery::InvoiceDetail;
use crate::recovery::dashboard::DashboardStats;
use crate::recovery::escalation::DispatchReport;
use crate::recovery::import::ImportFailure;
use crate::recovery::preview::StagePreview;
use crate::recovery::templates::{MessageTone, StageTemplate};
use crate::services::BillingSession;

// --- Errors ---

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// One of `not_found`, `validation`, `persistence`, `external_service`,
    /// or `unauthorized` for gateway-level rejections.
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

// --- Health ---

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// --- Invoices ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkspaceQuery {
    pub workspace_slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceListResponse {
    pub workspace_slug: String,
    pub count: usize,
    pub invoices: Vec<InvoiceDetail>,
}

#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice: InvoiceDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCsvRequest {
    #[serde(default)]
    pub workspace_slug: Option<String>,
    pub csv: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportCsvResponse {
    pub workspace_slug: String,
    pub created: usize,
    pub failed: Vec<ImportFailure>,
}

// --- Escalations ---

#[derive(Debug, Serialize)]
pub struct PreviewResponse {
    pub preview: StagePreview,
}

#[derive(Debug, Serialize)]
pub struct DispatchResponse {
    #[serde(flatten)]
    pub report: DispatchReport,
}

// --- Legal packets ---

#[derive(Debug, Default, Deserialize)]
pub struct GeneratePacketRequest {
    #[serde(default)]
    pub jurisdiction: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PacketResponse {
    pub packet: LegalPacketRecord,
}

// --- Templates ---

#[derive(Debug, Serialize)]
pub struct TemplatesResponse {
    pub templates: &'static [StageTemplate],
}

#[derive(Debug, Deserialize)]
pub struct RewriteRequest {
    pub stage: EscalationStage,
    pub body: String,
    #[serde(default)]
    pub tone: Option<MessageTone>,
}

#[derive(Debug, Serialize)]
pub struct RewriteResponse {
    pub rewritten: String,
}

// --- Dashboard ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub workspace_slug: String,
    pub stats: DashboardStats,
}

// --- Billing ---

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub workspace_slug: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub checkout: BillingSession,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalRequest {
    #[serde(default)]
    pub customer_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PortalResponse {
    pub portal: BillingSession,
}

#[derive(Debug, Serialize)]
pub struct WebhookMockResponse {
    pub ok: bool,
    pub mode: &'static str,
}
