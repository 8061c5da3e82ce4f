//! HTTP API for Warden.

use crate::engine::LicenseStatusView;
use crate::error::Error;
use crate::node::AppState;
use crate::ws::ws_license_handler;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use warden_core::{AccessDecision, EffectiveState, License, Member, MemberRole};

/// Actor recorded when a request does not name one.
const DEFAULT_ACTOR: &str = "api";

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    // CORS layer for browser access
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health (at root and under /api/v1 for compatibility)
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        .route("/ready", get(ready))
        // Licenses
        .route("/api/v1/licenses", get(list_licenses))
        .route(
            "/api/v1/licenses/:tenant_id",
            put(issue_license).delete(revoke_license),
        )
        .route("/api/v1/licenses/:tenant_id/status", get(license_status))
        .route("/api/v1/licenses/:tenant_id/disable", post(disable))
        .route("/api/v1/licenses/:tenant_id/reactivate", post(reactivate))
        .route("/api/v1/licenses/:tenant_id/check", post(force_check))
        // Access gate
        .route("/api/v1/access/:tenant_id", get(check_access))
        // Members
        .route(
            "/api/v1/tenants/:tenant_id/members/:member_id",
            put(upsert_member).delete(remove_member),
        )
        // WebSocket for real-time license events
        .route("/api/v1/ws", get(ws_license_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

// --- Error mapping ---

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidTransition(_) => StatusCode::CONFLICT,
            Error::InvalidInput(_) | Error::Model(_) => StatusCode::BAD_REQUEST,
            Error::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
            Error::Serialization(_) | Error::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::warn!("API request failed: {}", self);
        }
        (
            status,
            Json(ErrorBody {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = std::result::Result<T, Error>;

// --- Health endpoints ---

async fn health() -> &'static str {
    "OK"
}

/// Ready once the watcher loop is running.
async fn ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if state.watcher.is_running() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "watcher not running")
    }
}

// --- License endpoints ---

async fn list_licenses(State(state): State<AppState>) -> ApiResult<Json<Vec<License>>> {
    Ok(Json(state.engine.list_licenses().await?))
}

#[derive(Debug, Deserialize)]
struct IssueLicenseRequest {
    capacity: u32,
    expiry: DateTime<Utc>,
    actor_id: Option<String>,
}

async fn issue_license(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Json(req): Json<IssueLicenseRequest>,
) -> ApiResult<Json<License>> {
    let actor = req.actor_id.as_deref().unwrap_or(DEFAULT_ACTOR);
    let license = state
        .engine
        .issue_license(&tenant_id, req.capacity, req.expiry, actor)
        .await?;
    Ok(Json(license))
}

#[derive(Debug, Default, Deserialize)]
struct ActorQuery {
    actor_id: Option<String>,
}

impl ActorQuery {
    fn actor(&self) -> &str {
        self.actor_id.as_deref().unwrap_or(DEFAULT_ACTOR)
    }
}

async fn revoke_license(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ActorQuery>,
) -> ApiResult<StatusCode> {
    state.engine.revoke_license(&tenant_id, query.actor()).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn license_status(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<LicenseStatusView>> {
    Ok(Json(state.engine.license_status(&tenant_id).await?))
}

#[derive(Debug, Default, Deserialize)]
struct OverrideRequest {
    actor_id: Option<String>,
}

async fn disable(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    body: Option<Json<OverrideRequest>>,
) -> ApiResult<Json<License>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let actor = req.actor_id.as_deref().unwrap_or(DEFAULT_ACTOR);
    Ok(Json(state.engine.disable(&tenant_id, actor).await?))
}

async fn reactivate(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    body: Option<Json<OverrideRequest>>,
) -> ApiResult<Json<License>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let actor = req.actor_id.as_deref().unwrap_or(DEFAULT_ACTOR);
    Ok(Json(state.engine.reactivate(&tenant_id, actor).await?))
}

async fn force_check(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<EffectiveState>> {
    Ok(Json(state.watcher.force_check(&tenant_id).await?))
}

// --- Access gate ---

#[derive(Debug, Deserialize)]
struct AccessQuery {
    #[serde(default)]
    requires_capacity: bool,
}

async fn check_access(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Query(query): Query<AccessQuery>,
) -> ApiResult<Json<AccessDecision>> {
    let decision = state
        .engine
        .gate()
        .check_access(&tenant_id, query.requires_capacity)
        .await?;
    Ok(Json(decision))
}

// --- Member endpoints ---

#[derive(Debug, Default, Deserialize)]
struct MemberRequest {
    #[serde(default)]
    role: MemberRole,
    active: Option<bool>,
}

/// Tenant state after a membership change. `state` is absent while the
/// tenant holds no license.
#[derive(Debug, Serialize)]
struct MemberChange {
    member: Option<Member>,
    state: Option<EffectiveState>,
}

async fn upsert_member(
    State(state): State<AppState>,
    Path((tenant_id, member_id)): Path<(String, String)>,
    body: Option<Json<MemberRequest>>,
) -> ApiResult<Json<MemberChange>> {
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let member = Member {
        member_id,
        tenant_id,
        role: req.role,
        active: req.active.unwrap_or(true),
    };
    let effective = state.engine.upsert_member(&member).await?;
    Ok(Json(MemberChange {
        member: Some(member),
        state: effective,
    }))
}

async fn remove_member(
    State(state): State<AppState>,
    Path((tenant_id, member_id)): Path<(String, String)>,
) -> ApiResult<Json<MemberChange>> {
    let effective = state.engine.remove_member(&tenant_id, &member_id).await?;
    Ok(Json(MemberChange {
        member: None,
        state: effective,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineConfig, LicenseEngine};
    use crate::node::NodeState;
    use crate::push::BroadcastChannel;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Method, Request};
    use chrono::Duration;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        let push = BroadcastChannel::default();
        let config = EngineConfig {
            scan_interval: std::time::Duration::from_secs(3600),
            ..EngineConfig::default()
        };
        let engine = Arc::new(LicenseEngine::with_store(store, Arc::new(push.clone()), config));
        build_router(Arc::new(NodeState::new(engine, push)))
    }

    async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn issue_body(capacity: u32, days: i64) -> Value {
        json!({
            "capacity": capacity,
            "expiry": Utc::now() + Duration::days(days),
            "actor_id": "root",
        })
    }

    #[tokio::test]
    async fn health_is_ok() {
        let app = app();
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn issue_then_status() {
        let app = app();
        let (status, license) =
            call(&app, Method::PUT, "/api/v1/licenses/college-a", Some(issue_body(2, 30))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(license["capacity"], 2);
        assert_eq!(license["updated_by"], "root");

        let (status, view) = call(&app, Method::GET, "/api/v1/licenses/college-a/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["status"], "active");
        assert_eq!(view["reason"], "none");
        assert_eq!(view["limitReached"], false);
    }

    #[tokio::test]
    async fn gate_denies_full_tenant_growth() {
        let app = app();
        call(&app, Method::PUT, "/api/v1/licenses/college-a", Some(issue_body(1, 30))).await;
        let (status, change) = call(
            &app,
            Method::PUT,
            "/api/v1/tenants/college-a/members/s1",
            Some(json!({ "role": "student" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(change["state"]["limit_reached"], true);

        let (_, decision) = call(
            &app,
            Method::GET,
            "/api/v1/access/college-a?requires_capacity=true",
            None,
        )
        .await;
        assert_eq!(decision, json!({ "allowed": false, "reason": "limit_reached" }));

        let (_, decision) = call(&app, Method::GET, "/api/v1/access/college-a", None).await;
        assert_eq!(decision["allowed"], true);
    }

    #[tokio::test]
    async fn overrides_round_trip() {
        let app = app();
        call(&app, Method::PUT, "/api/v1/licenses/college-a", Some(issue_body(5, 30))).await;

        let (status, license) =
            call(&app, Method::POST, "/api/v1/licenses/college-a/disable", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(license["manual_status"], "suspended");
        assert_eq!(license["updated_by"], "api");

        let (_, decision) = call(&app, Method::GET, "/api/v1/access/college-a", None).await;
        assert_eq!(decision["reason"], "manual_suspend");

        let (_, license) = call(
            &app,
            Method::POST,
            "/api/v1/licenses/college-a/reactivate",
            Some(json!({ "actor_id": "ops" })),
        )
        .await;
        assert_eq!(license["manual_status"], "active");
        assert_eq!(license["updated_by"], "ops");
    }

    #[tokio::test]
    async fn errors_map_to_status_codes() {
        let app = app();
        let (status, body) = call(&app, Method::GET, "/api/v1/access/nobody", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("nobody"));

        call(&app, Method::PUT, "/api/v1/tenants/college-b/members/s1", None).await;
        let (status, _) = call(&app, Method::POST, "/api/v1/licenses/college-b/disable", None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) =
            call(&app, Method::PUT, "/api/v1/licenses/college-c", Some(issue_body(0, 30))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = call(&app, Method::PUT, "/api/v1/tenants/a:b/members/x1", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn revoke_removes_license() {
        let app = app();
        call(&app, Method::PUT, "/api/v1/licenses/college-a", Some(issue_body(5, 30))).await;
        let (status, _) = call(&app, Method::DELETE, "/api/v1/licenses/college-a", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, list) = call(&app, Method::GET, "/api/v1/licenses", None).await;
        assert_eq!(list, json!([]));
    }
}
