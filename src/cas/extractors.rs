use axum::{
    extract::OptionalFromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::convert::Infallible;

use super::session::SessionError;
use super::validator::{TicketValidationError, ValidatorConstructionError};
use crate::tenants::TenantId;

/// Errors the CAS filter surfaces to the caller
#[derive(Debug, thiserror::Error)]
pub enum CasError {
    #[error("CAS configuration error for tenant {tenant_id}: {reason}")]
    Configuration { tenant_id: TenantId, reason: String },

    #[error("unable to build CAS ticket validator for tenant {tenant_id}: {source}")]
    ValidatorConstruction {
        tenant_id: TenantId,
        #[source]
        source: ValidatorConstructionError,
    },

    #[error("Unable to validate CAS ticket: {ticket}")]
    TicketValidation {
        ticket: String,
        #[source]
        source: TicketValidationError,
    },

    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl IntoResponse for CasError {
    fn into_response(self) -> Response {
        match self {
            CasError::TicketValidation { ref source, .. } => (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "error": "Authentication failed",
                    "message": self.to_string(),
                    "reason": source.to_string(),
                    "code": "CAS_TICKET_INVALID"
                })),
            )
                .into_response(),

            CasError::Configuration { .. } | CasError::ValidatorConstruction { .. } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "CAS configuration error",
                    "message": self.to_string()
                })),
            )
                .into_response(),

            CasError::Session(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Internal server error",
                    "message": self.to_string()
                })),
            )
                .into_response(),
        }
    }
}

/// Principal the CAS filter authenticated for this request
///
/// Inserted into request extensions by the filter middleware before the
/// request is handed to the next handler. Absent when CAS is not engaged for
/// the tenant, so handlers take it as an `Option`.
///
/// Usage:
/// ```rust,ignore
/// async fn handler(principal: Option<CasPrincipal>) {
///     if let Some(CasPrincipal(login)) = principal {
///         tracing::info!(%login, "portal login");
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CasPrincipal(pub String);

impl<S> OptionalFromRequestParts<S> for CasPrincipal
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> Result<Option<Self>, Self::Rejection> {
        Ok(parts.extensions.get::<CasPrincipal>().cloned())
    }
}
