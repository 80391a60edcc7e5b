// REST endpoints: the launchpad-facing surface and the admin surface.

use axum::{
    Router,
    extract::{Extension, Path, State},
    http::StatusCode,
    middleware,
    response::Json,
    routing::{delete, get, post},
};
use http::HeaderMap;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::pipeline::{AuthPipeline, auth_middleware};
use crate::auth::{AuthContext, claims, identity};
use crate::types::{OriginRole, Username};

pub type AppState = Arc<AuthPipeline>;

pub fn create_public_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/sap/detect-environment", get(detect_environment))
        .route("/sap/profile", get(profile))
        .route("/sap/debug-context", get(debug_context))
        .route("/sap/login", post(mock_login))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

pub fn create_admin_router(state: AppState) -> Router {
    Router::new()
        .route("/sso/health", get(admin_health))
        .route("/sso/cache", delete(clear_cache))
        .route("/sso/cache/{username}", delete(invalidate_user))
        .route("/sso/me", get(whoami))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state)
}

async fn health_check() -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Report whether the request carries recognizable launchpad trust signals.
/// Useful for frontends deciding between SSO and a local login form.
async fn detect_environment(headers: HeaderMap) -> Json<Value> {
    let claims = claims::from_headers(&headers);
    let username = identity::username(&headers, &claims);
    let identity_headers: Vec<&str> = identity::recognized_headers()
        .into_iter()
        .filter(|name| headers.contains_key(*name))
        .collect();

    Json(serde_json::json!({
        "sso_detected": username.is_some(),
        "username": username,
        "token_present": claims::resolve_token(&headers).is_some(),
        "identity_headers": identity_headers,
    }))
}

/// The authenticated user's profile, from the cached permission record.
async fn profile(
    State(state): State<AppState>,
    context: Option<Extension<AuthContext>>,
) -> Result<Json<Value>, StatusCode> {
    let Some(Extension(context)) = context else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    let record = state.cache().get(&context.principal).await;

    Ok(Json(serde_json::json!({
        "username": context.principal,
        "display_name": record.as_ref().and_then(|r| r.display_name.clone()),
        "email": record.as_ref().and_then(|r| r.email.clone()),
        "roles": record.as_ref().map(|r| r.source_roles.clone()).unwrap_or_default(),
        "authorities": sorted_authorities(&context),
        "origin": context.origin,
    })))
}

/// Everything the resolver saw and decided, for troubleshooting launchpad
/// deployments where identity arrives in unexpected places.
async fn debug_context(
    headers: HeaderMap,
    context: Option<Extension<AuthContext>>,
) -> Json<Value> {
    let claims = claims::from_headers(&headers);

    let mut identity_headers = serde_json::Map::new();
    for name in identity::recognized_headers() {
        if let Some(value) = headers.get(name).and_then(|v| v.to_str().ok()) {
            identity_headers.insert(name.to_string(), Value::String(value.to_string()));
        }
    }

    Json(serde_json::json!({
        "identity_headers": identity_headers,
        "token_present": claims::resolve_token(&headers).is_some(),
        "claim_names": claims.keys().collect::<Vec<_>>(),
        "resolved": {
            "username": identity::username(&headers, &claims),
            "display_name": identity::display_name(&headers, &claims),
            "email": identity::email(&headers, &claims),
            "raw_roles": identity::raw_roles(&headers, &claims),
        },
        "auth_context": context.map(|Extension(c)| c),
    }))
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    #[serde(default)]
    roles: Vec<String>,
}

/// Establish a session without launchpad trust signals. Intended for local
/// development and frontend work outside the launchpad.
async fn mock_login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<Value>, StatusCode> {
    let username = request.username.trim();
    if username.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let roles = request.roles.into_iter().map(OriginRole::new).collect();
    let record = state
        .authenticate_local(Username::new(username), roles)
        .await;
    let context = AuthContext::from_record(&record);

    Ok(Json(serde_json::json!({
        "username": context.principal,
        "authorities": sorted_authorities(&context),
        "origin": context.origin,
    })))
}

async fn admin_health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "cache_entries": state.cache().len().await,
        "mapping_strategy": state.mapping_strategy(),
        "sync_provider": state.sync_provider(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn clear_cache(State(state): State<AppState>) -> Json<Value> {
    state.cache().clear().await;
    Json(serde_json::json!({ "status": "ok", "invalidated": "all" }))
}

async fn invalidate_user(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Json<Value> {
    state.cache().invalidate(&Username::new(username.as_str())).await;
    Json(serde_json::json!({ "status": "ok", "invalidated": username }))
}

/// The caller's own authentication, as the middleware resolved it.
async fn whoami(context: Option<Extension<AuthContext>>) -> Json<Value> {
    let Some(Extension(context)) = context else {
        return Json(serde_json::json!({ "authenticated": false }));
    };

    Json(serde_json::json!({
        "authenticated": true,
        "username": context.principal,
        "authorities": sorted_authorities(&context),
        "origin": context.origin,
    }))
}

/// Authority sets are unordered; responses sort them for stable output.
fn sorted_authorities(context: &AuthContext) -> Vec<String> {
    let mut authorities: Vec<String> = context.authorities.iter().cloned().collect();
    authorities.sort();
    authorities
}
