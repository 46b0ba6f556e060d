use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::PgPool;
use tower::ServiceExt;

use leadq_api::config::ServerConfig;
use leadq_api::router::build_app_router;
use leadq_api::state::AppState;
use leadq_core::criteria::{weight_from_external, CriterionDataType};
use leadq_core::training::TrainingConfig;
use leadq_core::types::DbId;
use leadq_db::models::criterion::CreateCriterion;
use leadq_db::models::lead::{CreateLead, Lead};
use leadq_db::models::webhook::{CreateWebhook, Webhook};
use leadq_db::repositories::{CriteriaRepo, LeadRepo, WebhookRepo};
use leadq_events::delivery::{
    DeliveryTransport, OutboundRequest, TransportError, TransportResponse,
};
use leadq_events::EventBus;

pub const ORG: DbId = 1;
pub const OTHER_ORG: DbId = 2;

/// Build a test `ServerConfig` with small training thresholds so tests can
/// reach them with a handful of outcomes.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        training: TrainingConfig {
            min_total: 10,
            min_per_class: 3,
            retrain_trigger: 5,
        },
        ..ServerConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Transport stub
// ---------------------------------------------------------------------------

/// Answers every delivery with 200 and counts the requests it saw.
#[derive(Default)]
pub struct StubTransport {
    pub sent: AtomicUsize,
}

impl StubTransport {
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeliveryTransport for StubTransport {
    async fn send(&self, _request: &OutboundRequest) -> Result<TransportResponse, TransportError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(TransportResponse {
            status: 200,
            body: "ok".to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// App construction
// ---------------------------------------------------------------------------

/// Build the shared state the way `main.rs` does, with a stubbed transport.
pub fn build_test_state(pool: PgPool, transport: Arc<StubTransport>) -> AppState {
    AppState::new(pool, test_config(), Arc::new(EventBus::default()), transport)
}

/// Build the full application router with all middleware layers.
pub fn build_test_app(pool: PgPool) -> Router {
    let state = build_test_state(pool, Arc::new(StubTransport::default()));
    build_app_router(state, &test_config())
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::GET, uri, Body::empty(), false).await
}

pub async fn post_json(app: Router, uri: &str, json: Value) -> Response<Body> {
    send(app, Method::POST, uri, Body::from(json.to_string()), true).await
}

pub async fn post_empty(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::POST, uri, Body::empty(), false).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    send(app, Method::DELETE, uri, Body::empty(), false).await
}

async fn send(app: Router, method: Method, uri: &str, body: Body, json: bool) -> Response<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if json {
        builder = builder.header("content-type", "application/json");
    }
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

// ---------------------------------------------------------------------------
// Seed helpers
// ---------------------------------------------------------------------------

/// Budget `$50k+` at 80% and industry `SaaS` at 20%.
pub async fn seed_example_criteria(pool: &PgPool, org: DbId) {
    for (name, data_type, weight, ideal, position) in [
        ("Budget", CriterionDataType::Budget, 80, "$50k+", 0),
        ("Industry", CriterionDataType::Industry, 20, "SaaS", 1),
    ] {
        let input = CreateCriterion {
            name: name.to_string(),
            data_type,
            weight,
            ideal_values: vec![ideal.to_string()],
            position: Some(position),
        };
        CriteriaRepo::create(pool, org, &input, weight_from_external(weight).unwrap())
            .await
            .unwrap();
    }
}

pub async fn seed_lead(pool: &PgPool, org: DbId, budget: &str, industry: &str) -> Lead {
    LeadRepo::create(
        pool,
        org,
        &CreateLead {
            company_name: Some("Acme".to_string()),
            budget: Some(budget.to_string()),
            industry: Some(industry.to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap()
}

pub async fn seed_webhook(pool: &PgPool, org: DbId, events: &[&str]) -> Webhook {
    WebhookRepo::create(
        pool,
        org,
        &CreateWebhook {
            name: "CRM".to_string(),
            url: "https://crm.example.com/hooks".to_string(),
            secret: "s3cret".to_string(),
            event_types: events.iter().map(|e| e.to_string()).collect(),
            is_active: Some(true),
        },
    )
    .await
    .unwrap()
}
