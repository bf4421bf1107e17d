//! CAS login/logout state machine
//!
//! Evaluated top to bottom, first match wins:
//!
//! 1. CAS disabled for the tenant: not engaged (see [`CasFilter::enabled_config`])
//! 2. Force-logout marker in session: clear it, redirect to CAS logout
//! 3. Portal logout path: invalidate the session, redirect to CAS logout
//! 4. `CAS_LOGIN` already in session: continue down the chain
//! 5. No `ticket` parameter: redirect to CAS login with the service URL
//! 6. Ticket present: validate it, store the principal, continue down the chain

use std::sync::Arc;
use url::form_urlencoded;

use super::cache::ValidatorCache;
use super::extractors::CasError;
use super::service_url::{build_login_redirect_url, construct_service_url, TICKET_PARAMETER};
use super::session::Session;
use crate::tenants::{TenantConfig, TenantConfigProvider, TenantId};

/// Portal login action the filter is mounted on
pub const LOGIN_PATH: &str = "/c/portal/login";
/// Portal logout action the filter is mounted on
pub const LOGOUT_PATH: &str = "/c/portal/logout";

const LOGOUT_PATH_MARKER: &str = "/portal/logout";

/// Request inputs the filter decides on
#[derive(Debug, Clone)]
pub struct CasRequest<'a> {
    pub tenant_id: TenantId,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub virtual_hostnames: &'a [String],
}

impl CasRequest<'_> {
    pub fn is_logout(&self) -> bool {
        self.path.contains(LOGOUT_PATH_MARKER)
    }

    /// First non-blank `ticket` query parameter
    pub fn ticket(&self) -> Option<String> {
        self.query.and_then(|query| {
            form_urlencoded::parse(query.as_bytes())
                .find(|(name, value)| name == TICKET_PARAMETER && !value.trim().is_empty())
                .map(|(_, value)| value.trim().to_string())
        })
    }
}

/// Outcome of one pass through the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Force-logout marker consumed; redirect to CAS logout
    ForceLogout { location: String },
    /// Session invalidated; redirect to CAS logout
    Logout { location: String },
    /// Session already authenticated; continue down the chain
    Authenticated { login: String },
    /// No ticket yet; redirect to CAS login
    LoginRedirect { location: String },
    /// Ticket validated and stored; continue down the chain
    Validated { login: String },
}

pub struct CasFilter {
    tenants: Arc<dyn TenantConfigProvider>,
    validators: Arc<ValidatorCache>,
}

impl CasFilter {
    pub fn new(tenants: Arc<dyn TenantConfigProvider>, validators: Arc<ValidatorCache>) -> Self {
        Self {
            tenants,
            validators,
        }
    }

    /// Configuration of a tenant with CAS switched on
    ///
    /// `None` means the filter does not engage. Unreadable configuration is
    /// logged at error level and also leaves the filter disengaged.
    pub async fn enabled_config(&self, tenant_id: TenantId) -> Option<TenantConfig> {
        match self.tenants.get(tenant_id).await {
            Ok(config) if config.enabled => Some(config),
            Ok(_) => {
                tracing::debug!(tenant_id = tenant_id, "CAS disabled for tenant");
                None
            }
            Err(error) => {
                tracing::error!(
                    event = "cas_config_unavailable",
                    tenant_id = tenant_id,
                    error = %error,
                    "Unable to read CAS configuration; request is not CAS protected"
                );
                None
            }
        }
    }

    /// Drop the tenant's cached validator after a configuration change
    pub fn reload(&self, tenant_id: TenantId) {
        self.validators.invalidate(tenant_id);
    }

    /// Run the state machine for an engaged request
    pub async fn process(
        &self,
        config: &TenantConfig,
        request: &CasRequest<'_>,
        session: &Session,
    ) -> Result<Decision, CasError> {
        let tenant_id = request.tenant_id;

        if session.take_force_logout().await? {
            tracing::info!(
                event = "cas_force_logout",
                tenant_id = tenant_id,
                session = %session.log_id(),
                "Force logout requested; redirecting to CAS logout"
            );
            return Ok(Decision::ForceLogout {
                location: config.logout_url.clone(),
            });
        }

        if request.is_logout() {
            session.invalidate().await?;
            tracing::info!(
                event = "cas_logout",
                tenant_id = tenant_id,
                session = %session.log_id(),
                "Session invalidated; redirecting to CAS logout"
            );
            return Ok(Decision::Logout {
                location: config.logout_url.clone(),
            });
        }

        if let Some(login) = session.cas_login().await? {
            tracing::debug!(
                tenant_id = tenant_id,
                login = %login,
                "Session already authenticated via CAS"
            );
            return Ok(Decision::Authenticated { login });
        }

        let service_url = construct_service_url(
            config,
            request.virtual_hostnames,
            request.path,
            request.query,
        )
        .map_err(|e| CasError::Configuration {
            tenant_id,
            reason: e.to_string(),
        })?;

        let Some(ticket) = request.ticket() else {
            let location = build_login_redirect_url(&config.login_url, &service_url);
            tracing::info!(
                event = "cas_login_redirect",
                tenant_id = tenant_id,
                service_url = %service_url,
                "No ticket; redirecting to CAS login"
            );
            return Ok(Decision::LoginRedirect { location });
        };

        // The configuration passed in was read when the request arrived; a
        // reload since then must not leave a validator for the old server cached.
        let generation = self.validators.generation(tenant_id);
        let current = self
            .tenants
            .get(tenant_id)
            .await
            .map_err(|e| CasError::Configuration {
                tenant_id,
                reason: e.to_string(),
            })?;

        let validator = self
            .validators
            .get_or_create_at(tenant_id, &current, generation)
            .map_err(|source| {
                tracing::error!(
                    event = "cas_validator_construction_failed",
                    tenant_id = tenant_id,
                    error = %source,
                    "Unable to build CAS ticket validator"
                );
                CasError::ValidatorConstruction { tenant_id, source }
            })?;

        let assertion = match validator.validate(&ticket, &service_url).await {
            Ok(assertion) => assertion,
            Err(error) => {
                if tracing::enabled!(tracing::Level::DEBUG) {
                    tracing::debug!(
                        event = "cas_ticket_invalid",
                        tenant_id = tenant_id,
                        ticket = %ticket,
                        service_url = %service_url,
                        timeout = error.is_timeout(),
                        error = ?error,
                        "CAS ticket validation failed"
                    );
                } else {
                    tracing::info!(
                        event = "cas_ticket_invalid",
                        tenant_id = tenant_id,
                        error = %error,
                        "CAS ticket validation failed"
                    );
                }
                return Err(CasError::TicketValidation {
                    ticket,
                    source: error,
                });
            }
        };

        let login = assertion.principal.name;
        session.set_cas_login(login.clone()).await?;

        tracing::info!(
            event = "cas_login_success",
            tenant_id = tenant_id,
            login = %login,
            session = %session.log_id(),
            "CAS ticket validated"
        );

        Ok(Decision::Validated { login })
    }
}
