//! End-to-end tests for the HTTP gateway.
//!
//! Each test starts a real Axum server on a random port over an in-memory
//! store and drives it with reqwest.

use std::net::SocketAddr;
use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use secrecy::SecretString;
use serde_json::{Value, json};
use sha2::Sha256;

use invoice_recovery::api::{ApiState, ServerHandle, build_router, start_server};
use invoice_recovery::config::Config;
use invoice_recovery::db::memory::InMemoryBackend;
use invoice_recovery::db::Database;
use invoice_recovery::services::{DeliveryRouter, MockBilling};
use invoice_recovery::settings::Settings;

const AUTH_TOKEN: &str = "test-token-12345";
const WEBHOOK_SECRET: &str = "whsec_test";

struct TestServer {
    handle: ServerHandle,
    db: Arc<dyn Database>,
    client: reqwest::Client,
}

impl TestServer {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.handle.addr, path)
    }

    async fn post(&self, path: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .bearer_auth(AUTH_TOKEN)
            .header("x-actor-email", "owner@demo.test")
            .json(&body)
            .send()
            .await
            .expect("request")
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(AUTH_TOKEN)
            .send()
            .await
            .expect("request")
    }
}

const TWILIO_TOKEN: &str = "tw-token";
const TWILIO_URL: &str = "https://recovery.example.com/api/webhooks/twilio";

async fn start_test_server(stripe_enabled: bool) -> TestServer {
    let db: Arc<dyn Database> = Arc::new(InMemoryBackend::new());
    let config = Config::resolve(&Settings::default()).expect("default config");
    let mut state = ApiState::new(
        Arc::clone(&db),
        &config,
        Arc::new(DeliveryRouter::mock()),
        Arc::new(MockBilling::new("http://localhost:3000")),
    );
    state.stripe_enabled = stripe_enabled;
    state.webhook_secret = stripe_enabled.then(|| SecretString::from(WEBHOOK_SECRET.to_string()));
    state.twilio_webhook_token = Some(SecretString::from(TWILIO_TOKEN.to_string()));
    state.twilio_webhook_url = TWILIO_URL.to_string();

    let token = SecretString::from(AUTH_TOKEN.to_string());
    let router = build_router(Arc::new(state), Some(&token), "http://localhost:3000", false);
    let addr: SocketAddr = "127.0.0.1:0".parse().expect("addr");
    let handle = start_server(addr, router).await.expect("start server");
    TestServer {
        handle,
        db,
        client: reqwest::Client::new(),
    }
}

fn sign(payload: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).expect("hmac key");
    mac.update(format!("{timestamp}.{payload}").as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn twilio_sign(params: &[(&str, &str)]) -> String {
    use base64::Engine;

    let mut sorted = params.to_vec();
    sorted.sort();
    let signed: String = sorted.iter().fold(TWILIO_URL.to_string(), |mut acc, (k, v)| {
        acc.push_str(k);
        acc.push_str(v);
        acc
    });
    let mut mac = Hmac::<sha1::Sha1>::new_from_slice(TWILIO_TOKEN.as_bytes()).expect("hmac key");
    mac.update(signed.as_bytes());
    base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes())
}

async fn create_invoice(server: &TestServer, number: &str) -> String {
    let response = server
        .post(
            "/api/invoices",
            json!({
                "clientName": "North Ridge Labs",
                "clientEmail": "ap@northridge.test",
                "invoiceNumber": number,
                "amountCents": 145000,
                "dueDate": "2026-01-15",
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    body["invoice"]["invoice"]["id"]
        .as_str()
        .expect("invoice id")
        .to_string()
}

#[tokio::test]
async fn health_is_public_and_api_requires_token() {
    let server = start_test_server(false).await;

    let health = server
        .client
        .get(server.url("/api/health"))
        .send()
        .await
        .expect("health");
    assert_eq!(health.status(), 200);
    let body: Value = health.json().await.expect("json");
    assert_eq!(body["status"], "ok");

    let anonymous = server
        .client
        .get(server.url("/api/invoices"))
        .send()
        .await
        .expect("list");
    assert_eq!(anonymous.status(), 401);

    let wrong = server
        .client
        .get(server.url("/api/invoices"))
        .bearer_auth("nope")
        .send()
        .await
        .expect("list");
    assert_eq!(wrong.status(), 401);

    let ok = server.get("/api/invoices").await;
    assert_eq!(ok.status(), 200);
    let body: Value = ok.json().await.expect("json");
    assert_eq!(body["workspaceSlug"], "demo-workspace");
    assert_eq!(body["count"], 0);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn create_approve_dispatch_and_stats() {
    let server = start_test_server(false).await;
    let id = create_invoice(&server, "INV-2041").await;

    let preview = server
        .post(&format!("/api/escalations/{id}/preview-step"), json!({}))
        .await;
    assert_eq!(preview.status(), 200);
    let body: Value = preview.json().await.expect("json");
    assert_eq!(body["preview"]["stage"], "polite_nudge");
    assert!(
        body["preview"]["email_body"]
            .as_str()
            .expect("email body")
            .contains("$1,450.00")
    );

    let approved = server
        .post(&format!("/api/escalations/{id}/approve-step"), json!({}))
        .await;
    assert_eq!(approved.status(), 200);
    let body: Value = approved.json().await.expect("json");
    assert_eq!(body["invoice"]["invoice"]["status"], "in_recovery");
    assert_eq!(body["invoice"]["run"]["state"], "scheduled");

    let dispatched = server
        .post(&format!("/api/escalations/{id}/dispatch"), json!({}))
        .await;
    assert_eq!(dispatched.status(), 200);
    let body: Value = dispatched.json().await.expect("json");
    assert_eq!(body["sent"], 1);
    assert_eq!(body["failed"], 0);
    assert_eq!(body["invoice"]["steps"][0]["status"], "sent");

    let stats = server.get("/api/dashboard/stats").await;
    let body: Value = stats.json().await.expect("json");
    assert_eq!(body["stats"]["total_outstanding_cents"], 145000);
    assert_eq!(body["stats"]["active_recoveries"], 1);

    let paid = server
        .post(&format!("/api/escalations/{id}/mark-paid"), json!({}))
        .await;
    assert_eq!(paid.status(), 200);
    let rejected = server
        .post(&format!("/api/escalations/{id}/approve-step"), json!({}))
        .await;
    assert_eq!(rejected.status(), 400);
    let body: Value = rejected.json().await.expect("json");
    assert_eq!(body["error"], "Failed to approve escalation step.");
    assert_eq!(body["kind"], "validation");

    server.handle.shutdown().await;
}

#[tokio::test]
async fn invalid_input_maps_to_client_errors() {
    let server = start_test_server(false).await;

    let missing = server
        .post(
            "/api/invoices",
            json!({
                "clientName": "",
                "invoiceNumber": "INV-1",
                "amountCents": 100,
                "dueDate": "2026-01-15",
            }),
        )
        .await;
    assert_eq!(missing.status(), 400);
    let body: Value = missing.json().await.expect("json");
    assert_eq!(body["details"], "Missing required invoice fields.");

    let unknown = server
        .post(
            "/api/escalations/7d3f0a52-2f43-4d8e-9a57-9a0c6f1f7a10/pause",
            json!({}),
        )
        .await;
    assert_eq!(unknown.status(), 404);

    let portal = server.post("/api/billing/portal", json!({})).await;
    assert_eq!(portal.status(), 400);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn csv_import_reports_failed_rows() {
    let server = start_test_server(false).await;
    let csv = "client_name,client_email,invoice_number,amount,due_date\n\
               Acme Co,ap@acme.test,A-1,250.50,2026-01-10\n\
               Bad Dates,ap@bad.test,A-2,100,not-a-date\n";

    let response = server
        .post(
            "/api/invoices/import-csv",
            json!({ "workspaceSlug": "imports", "csv": csv }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["workspaceSlug"], "imports");
    assert_eq!(body["created"], 1);
    assert_eq!(body["failed"][0]["row"], 2);

    let listed = server.get("/api/invoices?workspaceSlug=imports").await;
    let body: Value = listed.json().await.expect("json");
    assert_eq!(body["count"], 1);
    assert_eq!(body["invoices"][0]["invoice"]["amount_cents"], 25050);

    server.handle.shutdown().await;
}

#[tokio::test]
async fn legal_packet_and_templates() {
    let server = start_test_server(false).await;
    let id = create_invoice(&server, "INV-3100").await;

    let packet = server
        .post(
            &format!("/api/legal-packets/{id}/generate"),
            json!({ "jurisdiction": "US - California" }),
        )
        .await;
    assert_eq!(packet.status(), 200);
    let body: Value = packet.json().await.expect("json");
    assert_eq!(body["packet"]["jurisdiction"], "US - California");

    let detail = server.get(&format!("/api/invoices/{id}")).await;
    let body: Value = detail.json().await.expect("json");
    assert_eq!(body["invoice"]["legal_packet"]["jurisdiction"], "US - California");

    let templates = server.get("/api/templates").await;
    let body: Value = templates.json().await.expect("json");
    assert_eq!(body["templates"].as_array().map(Vec::len), Some(4));

    let rewrite = server
        .post(
            "/api/templates/rewrite",
            json!({
                "stage": "firm_follow_up",
                "body": "Please settle the balance.",
                "tone": "assertive",
            }),
        )
        .await;
    assert_eq!(rewrite.status(), 200);
    let body: Value = rewrite.json().await.expect("json");
    assert!(
        body["rewritten"]
            .as_str()
            .expect("rewritten")
            .starts_with("Please settle the balance.")
    );

    server.handle.shutdown().await;
}

#[tokio::test]
async fn stripe_webhook_upgrades_workspace_plan() {
    let server = start_test_server(true).await;
    server
        .db
        .ensure_workspace("acme", "Acme", "trial")
        .await
        .expect("workspace");

    let payload = json!({
        "id": "evt_1",
        "type": "checkout.session.completed",
        "data": { "object": { "metadata": { "workspace_slug": "acme" } } },
    })
    .to_string();

    let unsigned = server
        .client
        .post(server.url("/api/webhooks/stripe"))
        .body(payload.clone())
        .send()
        .await
        .expect("webhook");
    assert_eq!(unsigned.status(), 400);

    let forged = server
        .client
        .post(server.url("/api/webhooks/stripe"))
        .header("stripe-signature", sign("{}", Utc::now().timestamp()))
        .body(payload.clone())
        .send()
        .await
        .expect("webhook");
    assert_eq!(forged.status(), 400);

    let signed = server
        .client
        .post(server.url("/api/webhooks/stripe"))
        .header("stripe-signature", sign(&payload, Utc::now().timestamp()))
        .body(payload)
        .send()
        .await
        .expect("webhook");
    assert_eq!(signed.status(), 200);
    let body: Value = signed.json().await.expect("json");
    assert_eq!(body["type"], "checkout.session.completed");

    let workspace = server
        .db
        .get_workspace_by_slug("acme")
        .await
        .expect("lookup")
        .expect("workspace");
    assert_eq!(workspace.plan, "pro");

    server.handle.shutdown().await;
}

#[tokio::test]
async fn twilio_reply_is_public_but_signed() {
    let server = start_test_server(false).await;
    let response = server
        .post(
            "/api/invoices",
            json!({
                "clientName": "Harbor & Finch",
                "clientPhone": "+15550100",
                "invoiceNumber": "INV-4100",
                "amountCents": 50000,
                "dueDate": "2026-01-15",
            }),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.expect("json");
    let id = body["invoice"]["invoice"]["id"].as_str().expect("id").to_string();

    let params = [("From", "+15550100"), ("Body", "Check is in the mail"), ("MessageSid", "SM7")];

    let forged = server
        .client
        .post(server.url("/api/webhooks/twilio"))
        .header("x-twilio-signature", "bm90LWEtc2lnbmF0dXJl")
        .form(&params)
        .send()
        .await
        .expect("webhook");
    assert_eq!(forged.status(), 403);

    let signed = server
        .client
        .post(server.url("/api/webhooks/twilio"))
        .header("x-twilio-signature", twilio_sign(&params))
        .form(&params)
        .send()
        .await
        .expect("webhook");
    assert_eq!(signed.status(), 200);
    let body: Value = signed.json().await.expect("json");
    assert_eq!(body["from"], "+15550100");
    assert_eq!(body["messageSid"], "SM7");
    assert_eq!(body["invoiceId"], id.as_str());

    let detail = server.get(&format!("/api/invoices/{id}")).await;
    let body: Value = detail.json().await.expect("json");
    let events = body["invoice"]["events"].as_array().expect("events");
    assert!(events.iter().any(|event| event["direction"] == "inbound"));

    server.handle.shutdown().await;
}
