//! CAS gateway library
//!
//! Multi-tenant CAS single-sign-on filter for the portal login and logout actions.

#![deny(dead_code)]

pub mod cas;
pub mod config;
pub mod tenants;
pub mod web;

use cas::{helpers::create_http_client, CasFilter, SessionStore, ValidatorCache};
use config::Config;
use std::sync::Arc;
use tenants::TenantRegistry;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tenants: Arc<TenantRegistry>,
    pub sessions: Arc<dyn SessionStore>,
    /// Owned here so the admin reload path and the filter share one cache
    pub validators: Arc<ValidatorCache>,
    pub cas_filter: Arc<CasFilter>,
}

impl AppState {
    /// Wire the filter, validator cache and session store together
    pub fn new(
        config: Config,
        tenants: TenantRegistry,
        sessions: Arc<dyn SessionStore>,
    ) -> anyhow::Result<Self> {
        let http_client =
            create_http_client(config.http_connect_timeout_secs, config.http_request_timeout_secs)
                .map_err(|e| anyhow::anyhow!("Failed to build HTTP client for CAS: {}", e))?;

        let tenants = Arc::new(tenants);
        let validators = Arc::new(ValidatorCache::new(http_client));
        let cas_filter = Arc::new(CasFilter::new(tenants.clone(), validators.clone()));

        Ok(Self {
            config: Arc::new(config),
            tenants,
            sessions,
            validators,
            cas_filter,
        })
    }
}
