//! Per-tenant ticket validator cache
//!
//! Validators are built lazily from the tenant's configuration and live until
//! `invalidate` is called for that tenant. Entries never expire on their own.
//!
//! Every tenant carries a generation that `invalidate` bumps. A validator built
//! from configuration read before an invalidation is handed back to its caller
//! but never stored.

use dashmap::DashMap;
use std::sync::Arc;

use super::validator::{Cas20ProxyTicketValidator, ValidatorConstructionError};
use crate::tenants::{TenantConfig, TenantId};

pub struct ValidatorCache {
    validators: DashMap<TenantId, Arc<Cas20ProxyTicketValidator>>,
    /// Invalidation count per tenant; locked while an entry is stored or dropped
    generations: DashMap<TenantId, u64>,
    /// Shared by every validator; carries the validation timeouts
    client: reqwest::Client,
}

impl ValidatorCache {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            validators: DashMap::new(),
            generations: DashMap::new(),
            client,
        }
    }

    /// Current generation of a tenant's entry
    ///
    /// Take it before reading the configuration passed to
    /// [`ValidatorCache::get_or_create_at`].
    pub fn generation(&self, tenant_id: TenantId) -> u64 {
        self.generations
            .get(&tenant_id)
            .map(|generation| *generation)
            .unwrap_or_default()
    }

    /// Cached validator for `tenant_id`, building it from `config` on first use
    ///
    /// Construction failures are returned and leave the cache untouched.
    pub fn get_or_create(
        &self,
        tenant_id: TenantId,
        config: &TenantConfig,
    ) -> Result<Arc<Cas20ProxyTicketValidator>, ValidatorConstructionError> {
        self.get_or_create_at(tenant_id, config, self.generation(tenant_id))
    }

    /// Like [`ValidatorCache::get_or_create`], for a `config` read at `generation`
    ///
    /// When the tenant was invalidated since, the new validator is returned
    /// without being cached.
    pub fn get_or_create_at(
        &self,
        tenant_id: TenantId,
        config: &TenantConfig,
        generation: u64,
    ) -> Result<Arc<Cas20ProxyTicketValidator>, ValidatorConstructionError> {
        if let Some(validator) = self.validators.get(&tenant_id) {
            return Ok(Arc::clone(validator.value()));
        }

        let validator = Arc::new(Cas20ProxyTicketValidator::for_tenant(
            config,
            self.client.clone(),
        )?);

        let current = self.generations.entry(tenant_id).or_insert(0);
        if *current != generation {
            tracing::debug!(
                tenant_id = tenant_id,
                "Tenant reloaded while building validator; not caching it"
            );
            return Ok(validator);
        }

        tracing::info!(
            event = "cas_validator_created",
            tenant_id = tenant_id,
            cas_server = %validator.server_url(),
            "Created CAS ticket validator"
        );

        self.validators.insert(tenant_id, Arc::clone(&validator));
        drop(current);
        Ok(validator)
    }

    /// Drop the tenant's validator so the next request rebuilds it
    pub fn invalidate(&self, tenant_id: TenantId) {
        let mut generation = self.generations.entry(tenant_id).or_insert(0);
        *generation += 1;

        if self.validators.remove(&tenant_id).is_some() {
            tracing::info!(
                event = "cas_validator_invalidated",
                tenant_id = tenant_id,
                "Dropped cached CAS ticket validator"
            );
        }
    }

    pub fn contains(&self, tenant_id: TenantId) -> bool {
        self.validators.contains_key(&tenant_id)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::test_support::enabled_config;

    fn cache() -> ValidatorCache {
        ValidatorCache::new(reqwest::Client::new())
    }

    #[test]
    fn test_get_or_create_reuses_instance() {
        let cache = cache();
        let config = enabled_config();

        let first = cache.get_or_create(1, &config).unwrap();
        let second = cache.get_or_create(1, &config).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cached_validator_ignores_later_config_until_invalidated() {
        let cache = cache();
        let first = cache.get_or_create(1, &enabled_config()).unwrap();

        let mut changed = enabled_config();
        changed.server_url = "https://cas2.example.com/cas".to_string();

        let still_cached = cache.get_or_create(1, &changed).unwrap();
        assert!(Arc::ptr_eq(&first, &still_cached));
        assert_eq!(still_cached.server_url(), "https://cas.example.com/cas");

        cache.invalidate(1);
        let rebuilt = cache.get_or_create(1, &changed).unwrap();
        assert_eq!(rebuilt.server_url(), "https://cas2.example.com/cas");
    }

    #[test]
    fn test_construction_failure_is_not_cached() {
        let cache = cache();
        let mut broken = enabled_config();
        broken.server_url = "::not a url::".to_string();

        assert!(cache.get_or_create(1, &broken).is_err());
        assert!(!cache.contains(1));
        assert!(cache.is_empty());

        assert!(cache.get_or_create(1, &enabled_config()).is_ok());
        assert!(cache.contains(1));
    }

    #[test]
    fn test_invalidate_only_touches_one_tenant() {
        let cache = cache();
        cache.get_or_create(1, &enabled_config()).unwrap();
        cache.get_or_create(2, &enabled_config()).unwrap();

        cache.invalidate(1);
        assert!(!cache.contains(1));
        assert!(cache.contains(2));

        // Absent entries are a no-op
        cache.invalidate(1);
        cache.invalidate(42);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_validator_built_before_invalidate_is_not_cached() {
        let cache = cache();
        let generation = cache.generation(2);

        // Configuration changes and the tenant is reloaded mid-build
        cache.invalidate(2);

        let stale = cache.get_or_create_at(2, &enabled_config(), generation).unwrap();
        assert_eq!(stale.server_url(), "https://cas.example.com/cas");
        assert!(!cache.contains(2));

        let mut changed = enabled_config();
        changed.server_url = "https://cas2.example.com/cas".to_string();
        let fresh = cache.get_or_create(2, &changed).unwrap();
        assert_eq!(fresh.server_url(), "https://cas2.example.com/cas");
        assert!(cache.contains(2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_get_or_create_leaves_one_entry() {
        let cache = Arc::new(cache());
        let config = enabled_config();

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let config = config.clone();
                tokio::spawn(async move { cache.get_or_create(7, &config) })
            })
            .collect();

        for handle in handles {
            let validator = handle.await.unwrap().unwrap();
            assert_eq!(validator.server_url(), "https://cas.example.com/cas");
        }

        assert_eq!(cache.len(), 1);
        assert!(cache.contains(7));
    }
}
