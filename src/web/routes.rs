use super::handlers::{
    healthz_handler, portal_login_handler, portal_logout_handler, readyz_handler,
    reload_tenant_handler, update_tenant_handler,
};
use crate::{
    cas::{cas_filter, LOGIN_PATH, LOGOUT_PATH},
    AppState,
};
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Only the portal login/logout actions pass through the CAS filter
    let portal = Router::new()
        .route(LOGIN_PATH, get(portal_login_handler).post(portal_login_handler))
        .route(LOGOUT_PATH, get(portal_logout_handler).post(portal_logout_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), cas_filter));

    Router::new()
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/admin/tenants/{tenant_id}/reload", post(reload_tenant_handler))
        .route("/admin/tenants/{tenant_id}/cas", put(update_tenant_handler))
        .merge(portal)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
