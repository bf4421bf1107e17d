use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::sync::Arc;

use crate::cas::CasPrincipal;
use crate::tenants::{ConfigError, TenantConfig, TenantId};
use crate::AppState;

/// Liveness probe - always returns OK if the process is running
pub async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe - ready once at least one tenant is configured
pub async fn readyz_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.tenants.is_empty().await {
        tracing::warn!("Readiness check failed: no tenants configured");
        (StatusCode::SERVICE_UNAVAILABLE, "not ready: no tenants configured")
    } else {
        (StatusCode::OK, "ready")
    }
}

/// Portal login action behind the CAS filter
///
/// Reached with a principal once CAS authenticated the session, or without
/// one when CAS is not engaged for the tenant.
pub async fn portal_login_handler(principal: Option<CasPrincipal>) -> impl IntoResponse {
    match principal {
        Some(CasPrincipal(login)) => {
            tracing::info!(login = %login, "Portal login via CAS");
            Json(json!({ "status": "authenticated", "login": login }))
        }
        None => Json(json!({ "status": "cas_not_engaged" })),
    }
}

/// Portal logout action; only reached when CAS is not engaged
pub async fn portal_logout_handler() -> impl IntoResponse {
    Json(json!({ "status": "logged_out" }))
}

/// Drop a tenant's cached validator so the next request rebuilds it
pub async fn reload_tenant_handler(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<TenantId>,
) -> impl IntoResponse {
    tracing::info!(event = "cas_reload", tenant_id = tenant_id, "Reload requested");
    state.cas_filter.reload(tenant_id);
    StatusCode::NO_CONTENT
}

/// Replace a tenant's CAS settings and reload its validator
pub async fn update_tenant_handler(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<TenantId>,
    Json(config): Json<TenantConfig>,
) -> Response {
    match state.tenants.update_config(tenant_id, config).await {
        Ok(()) => {
            state.cas_filter.reload(tenant_id);
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error @ ConfigError::UnknownTenant(_)) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": error.to_string() })),
        )
            .into_response(),
        Err(error) => {
            tracing::warn!(
                tenant_id = tenant_id,
                error = %error,
                "Rejected tenant CAS configuration"
            );
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({ "error": error.to_string() })),
            )
                .into_response()
        }
    }
}
