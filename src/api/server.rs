//! Axum HTTP server for the recovery API.
//!
//! Handles invoice, escalation, legal-packet, template, dashboard, billing and
//! webhook routes. Every domain failure is returned as
//! `{ "error", "kind", "details" }` with a status derived from its kind.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    body::Bytes,
    extract::{
        Path, Query, Request, State,
        rejection::{FormRejection, JsonRejection},
    },
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use subtle::ConstantTimeEq;
use tokio::sync::oneshot;
use tower_http::cors::{AllowHeaders, AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::api::types::*;
use crate::auth::ActorContext;
use crate::config::Config;
use crate::db::Database;
use crate::error::{GatewayError, RecoveryError};
use crate::recovery::dashboard::dashboard_stats;
use crate::recovery::escalation::EscalationEngine;
use crate::recovery::import::{import_rows, parse_csv};
use crate::recovery::lifecycle::{CreateInvoiceInput, InvoiceService};
use crate::recovery::packet::PacketService;
use crate::recovery::templates::{
    MIN_REWRITE_BODY_CHARS, MessageTone, all_templates, rewrite_message,
};
use crate::services::webhooks::{
    DEFAULT_TOLERANCE_SECS, InboundSms, InboundSmsOutcome, StripeEvent, handle_stripe_event,
    record_inbound_sms, verify_stripe_signature, verify_twilio_signature,
};
use crate::services::{BillingProvider, MessageDelivery};

/// Header carrying the acting user's email for audit attribution.
pub const ACTOR_HEADER: &str = "x-actor-email";
const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";
const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";
pub const TWILIO_WEBHOOK_PATH: &str = "/api/webhooks/twilio";

/// Shared state for all API handlers.
pub struct ApiState {
    pub db: Arc<dyn Database>,
    pub invoices: InvoiceService,
    pub escalations: EscalationEngine,
    pub packets: PacketService,
    pub billing: Arc<dyn BillingProvider>,
    /// Live Stripe credentials are configured; otherwise webhooks answer in mock mode.
    pub stripe_enabled: bool,
    pub webhook_secret: Option<SecretString>,
    /// Inbound SMS are rejected while this is unset.
    pub twilio_webhook_token: Option<SecretString>,
    /// The URL Twilio signs, which may differ from the listen address behind a proxy.
    pub twilio_webhook_url: String,
    pub default_tone: MessageTone,
}

impl ApiState {
    pub fn new(
        db: Arc<dyn Database>,
        config: &Config,
        delivery: Arc<dyn MessageDelivery>,
        billing: Arc<dyn BillingProvider>,
    ) -> Self {
        let escalation = config.escalation.clone();
        Self {
            invoices: InvoiceService::new(Arc::clone(&db), escalation.clone()),
            escalations: EscalationEngine::new(Arc::clone(&db), escalation.clone(), delivery),
            packets: PacketService::new(Arc::clone(&db), escalation.clone()),
            db,
            billing,
            stripe_enabled: config.billing.has_stripe_config(),
            webhook_secret: config
                .billing
                .webhook_secret
                .as_ref()
                .map(|secret| SecretString::from(secret.expose_secret().to_string())),
            twilio_webhook_token: config
                .sms
                .webhook_token
                .as_ref()
                .map(|token| SecretString::from(token.expose_secret().to_string())),
            twilio_webhook_url: config
                .sms
                .webhook_url
                .clone()
                .unwrap_or_else(|| format!("{}{TWILIO_WEBHOOK_PATH}", config.gateway.app_url)),
            default_tone: escalation.default_tone,
        }
    }
}

// --- Errors ---

/// A JSON error response with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorResponse,
}

impl ApiError {
    /// Map a domain error: not-found 404, validation 400, persistence 500,
    /// external-service 502.
    pub fn recovery(context: &str, err: RecoveryError) -> Self {
        let kind = err.kind();
        let status = match kind {
            crate::error::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            crate::error::ErrorKind::Validation => StatusCode::BAD_REQUEST,
            crate::error::ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
            crate::error::ErrorKind::ExternalService => StatusCode::BAD_GATEWAY,
        };
        if status.is_server_error() {
            tracing::error!(kind = kind.as_str(), "{}: {}", context, err);
        }
        Self {
            status,
            body: ErrorResponse {
                error: context.to_string(),
                kind: kind.as_str(),
                details: Some(err.to_string()),
            },
        }
    }

    pub fn bad_request(error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            body: ErrorResponse {
                error: error.into(),
                kind: "validation",
                details,
            },
        }
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            body: ErrorResponse {
                error: error.into(),
                kind: "unauthorized",
                details: None,
            },
        }
    }

    pub fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            body: ErrorResponse {
                error: "Unauthorized.".to_string(),
                kind: "unauthorized",
                details: None,
            },
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &ErrorResponse {
        &self.body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>, context: &str) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| ApiError::bad_request(context, Some(rejection.body_text())))
}

/// Empty bodies take the defaults; anything else must be valid JSON.
fn optional_json_body<T: DeserializeOwned + Default>(
    body: &Bytes,
    context: &str,
) -> Result<T, ApiError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(context, Some(e.to_string())))
}

fn actor_from_headers(headers: &HeaderMap) -> ActorContext {
    ActorContext::from_email(headers.get(ACTOR_HEADER).and_then(|v| v.to_str().ok()))
}

/// Invoice ids that are not UUIDs cannot exist, so they are reported as missing.
fn parse_invoice_id(raw: &str) -> Result<Uuid, RecoveryError> {
    Uuid::parse_str(raw.trim()).map_err(|_| RecoveryError::not_found("Invoice", raw))
}

// --- Auth ---

#[derive(Clone)]
pub struct AuthState {
    token: Arc<SecretString>,
}

/// Bearer-token gate for the protected routes. Constant-time comparison.
async fn auth_middleware(State(auth): State<AuthState>, request: Request, next: Next) -> Response {
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);

    match presented {
        Some(token)
            if bool::from(
                token
                    .as_bytes()
                    .ct_eq(auth.token.expose_secret().as_bytes()),
            ) =>
        {
            next.run(request).await
        }
        _ => ApiError::unauthorized().into_response(),
    }
}

// --- Router ---

/// Build the full router. When `auth_token` is set, every route except health
/// and the Stripe webhook requires `Authorization: Bearer <token>`.
pub fn build_router(
    state: Arc<ApiState>,
    auth_token: Option<&SecretString>,
    app_url: &str,
    cors_allow_any: bool,
) -> Router {
    let public = Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/webhooks/stripe", post(stripe_webhook_handler))
        .route(TWILIO_WEBHOOK_PATH, post(twilio_webhook_handler));

    let mut protected = Router::new()
        // Invoices
        .route(
            "/api/invoices",
            get(invoices_list_handler).post(invoices_create_handler),
        )
        .route("/api/invoices/import-csv", post(invoices_import_handler))
        .route("/api/invoices/{id}", get(invoices_detail_handler))
        // Escalations
        .route(
            "/api/escalations/{id}/preview-step",
            post(escalation_preview_handler),
        )
        .route(
            "/api/escalations/{id}/approve-step",
            post(escalation_approve_handler),
        )
        .route("/api/escalations/{id}/pause", post(escalation_pause_handler))
        .route(
            "/api/escalations/{id}/mark-paid",
            post(escalation_mark_paid_handler),
        )
        .route(
            "/api/escalations/{id}/dispatch",
            post(escalation_dispatch_handler),
        )
        // Legal packets
        .route(
            "/api/legal-packets/{id}/generate",
            post(legal_packet_generate_handler),
        )
        // Templates
        .route("/api/templates", get(templates_list_handler))
        .route("/api/templates/rewrite", post(templates_rewrite_handler))
        // Dashboard
        .route("/api/dashboard/stats", get(dashboard_stats_handler))
        // Billing
        .route("/api/billing/checkout", post(billing_checkout_handler))
        .route("/api/billing/portal", post(billing_portal_handler));

    if let Some(token) = auth_token {
        let auth_state = AuthState {
            token: Arc::new(SecretString::from(token.expose_secret().to_string())),
        };
        protected = protected.route_layer(middleware::from_fn_with_state(auth_state, auth_middleware));
    } else {
        tracing::warn!("No gateway auth token configured; API routes are unauthenticated");
    }

    let origin = if cors_allow_any {
        AllowOrigin::from(Any)
    } else {
        match HeaderValue::from_str(app_url) {
            Ok(value) => AllowOrigin::exact(value),
            Err(e) => {
                tracing::warn!(app_url, "App URL is not a valid origin, CORS disabled: {}", e);
                AllowOrigin::list(Vec::<HeaderValue>::new())
            }
        }
    };
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
        .allow_headers(AllowHeaders::list([
            header::CONTENT_TYPE,
            header::AUTHORIZATION,
            HeaderName::from_static(ACTOR_HEADER),
        ]));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// A running server. Dropping the handle without calling `shutdown` leaves
/// the server running until the runtime stops.
pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown_tx: oneshot::Sender<()>,
    task: tokio::task::JoinHandle<()>,
}

impl ServerHandle {
    /// Stop accepting connections and wait for in-flight requests to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(());
        if let Err(e) = self.task.await {
            tracing::error!("Gateway task ended abnormally: {}", e);
        }
    }
}

/// Bind and serve in a background task. Returns the bound address (useful
/// when binding to port 0).
pub async fn start_server(addr: SocketAddr, router: Router) -> Result<ServerHandle, GatewayError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::StartupFailed {
            addr: addr.to_string(),
            reason: format!("failed to bind: {e}"),
        })?;
    let bound_addr = listener
        .local_addr()
        .map_err(|e| GatewayError::StartupFailed {
            addr: addr.to_string(),
            reason: format!("failed to get local addr: {e}"),
        })?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Gateway shutting down");
            })
            .await
        {
            tracing::error!("Gateway server error: {}", e);
        }
    });

    tracing::info!(addr = %bound_addr, "Gateway listening");
    Ok(ServerHandle {
        addr: bound_addr,
        shutdown_tx,
        task,
    })
}

// --- Health ---

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// --- Invoices ---

async fn invoices_list_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<InvoiceListResponse>, ApiError> {
    let slug = state
        .invoices
        .resolve_slug(query.workspace_slug.as_deref())
        .to_string();
    let invoices = state
        .invoices
        .list_invoices(Some(&slug))
        .await
        .map_err(|e| ApiError::recovery("Failed to load invoices.", e))?;
    Ok(Json(InvoiceListResponse {
        workspace_slug: slug,
        count: invoices.len(),
        invoices,
    }))
}

async fn invoices_create_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<CreateInvoiceInput>, JsonRejection>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let input = json_body(payload, "Failed to create invoice.")?;
    let invoice = state
        .invoices
        .create_invoice(&input, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery("Failed to create invoice.", e))?;
    Ok(Json(InvoiceResponse { invoice }))
}

async fn invoices_detail_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let context = "Failed to load invoice.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let invoice = state
        .invoices
        .get_invoice_detail(id)
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(InvoiceResponse { invoice }))
}

async fn invoices_import_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    payload: Result<Json<ImportCsvRequest>, JsonRejection>,
) -> Result<Json<ImportCsvResponse>, ApiError> {
    let context = "Failed to import invoices.";
    let request = json_body(payload, context)?;
    if request.csv.trim().is_empty() {
        return Err(ApiError::bad_request(context, Some("csv must not be empty".to_string())));
    }
    let rows = parse_csv(&request.csv).map_err(|e| ApiError::recovery("CSV parsing failed.", e))?;
    let slug = state
        .invoices
        .resolve_slug(request.workspace_slug.as_deref())
        .to_string();
    let report = import_rows(&state.invoices, Some(&slug), &rows, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(ImportCsvResponse {
        workspace_slug: slug,
        created: report.created,
        failed: report.failed,
    }))
}

// --- Escalations ---

async fn escalation_preview_handler(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let context = "Failed to preview escalation step.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let preview = state
        .escalations
        .preview_step(id)
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(PreviewResponse { preview }))
}

async fn escalation_approve_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let context = "Failed to approve escalation step.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let invoice = state
        .escalations
        .approve_step(id, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(InvoiceResponse { invoice }))
}

async fn escalation_pause_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let context = "Failed to pause escalation.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let invoice = state
        .escalations
        .pause(id, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(InvoiceResponse { invoice }))
}

async fn escalation_mark_paid_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<InvoiceResponse>, ApiError> {
    let context = "Failed to mark invoice paid.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let invoice = state
        .escalations
        .mark_paid(id, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(InvoiceResponse { invoice }))
}

async fn escalation_dispatch_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<DispatchResponse>, ApiError> {
    let context = "Failed to dispatch escalation steps.";
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let report = state
        .escalations
        .dispatch_scheduled(id, &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(DispatchResponse { report }))
}

// --- Legal packets ---

async fn legal_packet_generate_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<PacketResponse>, ApiError> {
    let context = "Failed to generate legal packet.";
    let request: GeneratePacketRequest = optional_json_body(&body, context)?;
    let id = parse_invoice_id(&id).map_err(|e| ApiError::recovery(context, e))?;
    let packet = state
        .packets
        .generate(id, request.jurisdiction.as_deref(), &actor_from_headers(&headers))
        .await
        .map_err(|e| ApiError::recovery(context, e))?;
    Ok(Json(PacketResponse { packet }))
}

// --- Templates ---

async fn templates_list_handler() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: all_templates(),
    })
}

async fn templates_rewrite_handler(
    State(state): State<Arc<ApiState>>,
    payload: Result<Json<RewriteRequest>, JsonRejection>,
) -> Result<Json<RewriteResponse>, ApiError> {
    let context = "Failed to rewrite template.";
    let request = json_body(payload, context)?;
    if request.body.chars().count() < MIN_REWRITE_BODY_CHARS {
        return Err(ApiError::bad_request(
            context,
            Some(format!(
                "body must be at least {MIN_REWRITE_BODY_CHARS} characters"
            )),
        ));
    }
    let tone = request.tone.unwrap_or(state.default_tone);
    Ok(Json(RewriteResponse {
        rewritten: rewrite_message(request.stage, &request.body, tone),
    }))
}

// --- Dashboard ---

async fn dashboard_stats_handler(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<WorkspaceQuery>,
) -> Result<Json<DashboardResponse>, ApiError> {
    let slug = state
        .invoices
        .resolve_slug(query.workspace_slug.as_deref())
        .to_string();
    let stats = dashboard_stats(&state.invoices, Some(&slug))
        .await
        .map_err(|e| ApiError::recovery("Failed to load dashboard stats.", e))?;
    Ok(Json(DashboardResponse {
        workspace_slug: slug,
        stats,
    }))
}

// --- Billing ---

async fn billing_checkout_handler(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let context = "Failed to create checkout session.";
    let request: CheckoutRequest = optional_json_body(&body, context)?;
    let email = request
        .email
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if email.is_some_and(|value| !value.contains('@')) {
        return Err(ApiError::bad_request(context, Some("Invalid email.".to_string())));
    }
    let slug = state
        .invoices
        .resolve_slug(request.workspace_slug.as_deref())
        .to_string();
    let checkout = state
        .billing
        .create_checkout(&slug, email)
        .await
        .map_err(|e| ApiError::recovery(context, e.into()))?;
    Ok(Json(CheckoutResponse { checkout }))
}

async fn billing_portal_handler(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<PortalResponse>, ApiError> {
    let context = "Failed to create billing portal session.";
    let request: PortalRequest = optional_json_body(&body, context)?;
    let Some(customer_id) = request
        .customer_id
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    else {
        return Err(ApiError::bad_request("customerId is required.", None));
    };
    let portal = state
        .billing
        .create_portal(customer_id)
        .await
        .map_err(|e| ApiError::recovery(context, e.into()))?;
    Ok(Json(PortalResponse { portal }))
}

// --- Webhooks ---

async fn stripe_webhook_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, ApiError> {
    if !state.stripe_enabled {
        return Ok(Json(WebhookMockResponse {
            ok: true,
            mode: "mock",
        })
        .into_response());
    }

    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let (Some(signature), Some(secret)) = (signature, state.webhook_secret.as_ref()) else {
        return Err(ApiError::bad_request(
            "Stripe webhook signature configuration is missing.",
            None,
        ));
    };

    verify_stripe_signature(
        &body,
        signature,
        secret.expose_secret(),
        DEFAULT_TOLERANCE_SECS,
        Utc::now(),
    )
    .map_err(|e| ApiError::bad_request(e.to_string(), None))?;
    let event = StripeEvent::parse(&body)
        .map_err(|e| ApiError::bad_request("Invalid webhook payload.", Some(e.to_string())))?;

    let outcome = handle_stripe_event(state.db.as_ref(), &event)
        .await
        .map_err(|e| ApiError::recovery("Failed to handle Stripe webhook.", e))?;
    Ok(Json(outcome).into_response())
}

/// Inbound SMS replies. Requests must carry a valid `X-Twilio-Signature`;
/// without a configured token every request is refused.
async fn twilio_webhook_handler(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Result<Json<InboundSmsOutcome>, ApiError> {
    let Some(token) = state.twilio_webhook_token.as_ref() else {
        tracing::warn!("Inbound SMS refused: no Twilio webhook token configured");
        return Err(ApiError::forbidden("Twilio webhook is not configured."));
    };
    let signature = headers
        .get(TWILIO_SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    let Form(params) =
        form.map_err(|e| ApiError::bad_request("Invalid webhook payload.", Some(e.body_text())))?;

    if let Err(e) = verify_twilio_signature(
        &state.twilio_webhook_url,
        &params,
        signature,
        token.expose_secret(),
    ) {
        tracing::warn!("Inbound SMS rejected: {}", e);
        return Err(ApiError::forbidden("Invalid Twilio signature."));
    }

    let sms = InboundSms::from_params(&params)
        .map_err(|e| ApiError::bad_request("Invalid webhook payload.", Some(e.to_string())))?;
    let slug = state.invoices.resolve_slug(None).to_string();
    let outcome = record_inbound_sms(state.db.as_ref(), &slug, &sms)
        .await
        .map_err(|e| ApiError::recovery("Failed to record inbound SMS.", e))?;
    Ok(Json(outcome))
}
