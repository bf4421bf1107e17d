//! Axum middleware running the CAS filter in front of the portal login/logout routes

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::extractors::{CasError, CasPrincipal};
use super::filter::{CasRequest, Decision};
use super::helpers::{append_cookie, clear_session_cookie, extract_cookie, found, session_cookie};
use super::session::Session;
use crate::tenants::VirtualHostResolver;
use crate::AppState;

/// Session named by the request's cookie, or a deferred one
///
/// A deferred session only reaches the store when the filter writes to it.
async fn load_session(state: &AppState, headers: &axum::http::HeaderMap) -> Result<Session, CasError> {
    if let Some(id) = extract_cookie(headers, &state.config.session_cookie_name) {
        if state.sessions.exists(&id).await? {
            return Ok(Session::existing(state.sessions.clone(), id));
        }
        tracing::debug!("Session cookie names an unknown or expired session");
    }

    Ok(Session::deferred(state.sessions.clone()))
}

fn request_host(request: &Request) -> Option<String> {
    request
        .headers()
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
        .or_else(|| request.uri().host().map(str::to_string))
}

pub async fn cas_filter(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request_host(&request).unwrap_or_default();

    let resolved = match state.tenants.resolve(&host).await {
        Ok(resolved) => resolved,
        Err(error) => {
            tracing::error!(
                event = "cas_tenant_unresolved",
                host = %host,
                error = %error,
                "Unable to resolve tenant; request is not CAS protected"
            );
            return next.run(request).await;
        }
    };

    let Some(config) = state.cas_filter.enabled_config(resolved.tenant_id).await else {
        return next.run(request).await;
    };

    let session = match load_session(&state, request.headers()).await {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(
                event = "cas_session_unavailable",
                tenant_id = resolved.tenant_id,
                error = %error,
                "Unable to load portal session"
            );
            return error.into_response();
        }
    };

    let had_session = session.id().is_some();

    let path = request.uri().path().to_string();
    let query = request.uri().query().map(str::to_string);
    let cas_request = CasRequest {
        tenant_id: resolved.tenant_id,
        path: &path,
        query: query.as_deref(),
        virtual_hostnames: &resolved.virtual_hostnames,
    };

    let decision = state
        .cas_filter
        .process(&config, &cas_request, &session)
        .await;

    let mut response = match decision {
        Ok(Decision::ForceLogout { location }) | Ok(Decision::LoginRedirect { location }) => {
            found(&location)
        }
        Ok(Decision::Logout { location }) => {
            let mut response = found(&location);
            append_cookie(&mut response, &clear_session_cookie(&state.config));
            return response;
        }
        Ok(Decision::Authenticated { login }) | Ok(Decision::Validated { login }) => {
            request.extensions_mut().insert(CasPrincipal(login));
            next.run(request).await
        }
        Err(error) => error.into_response(),
    };

    if !had_session {
        if let Some(id) = session.id() {
            append_cookie(&mut response, &session_cookie(&state.config, id));
        }
    }

    response
}
