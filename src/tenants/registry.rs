//! Tenant resolution and per-tenant CAS configuration
//!
//! The host portal owns tenant configuration and virtual-host mapping. The
//! filter only sees the two traits below; `TenantRegistry` is the in-memory
//! implementation used by the standalone gateway and the tests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use tokio::sync::RwLock;

use super::models::{TenantConfig, TenantDescriptor, TenantEntry, TenantId};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no CAS configuration for tenant {0}")]
    UnknownTenant(TenantId),
    #[error("no tenant serves host {0:?} and no default tenant is configured")]
    UnresolvedHost(String),
    #[error("invalid CAS configuration for tenant {tenant_id}: {reason}")]
    Invalid { tenant_id: TenantId, reason: String },
}

/// Tenant and virtual hostnames the current request was routed to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedHost {
    pub tenant_id: TenantId,
    /// Hostnames of the site that matched; empty when the default tenant was used
    pub virtual_hostnames: Vec<String>,
}

/// Latest committed CAS configuration per tenant
#[async_trait]
pub trait TenantConfigProvider: Send + Sync {
    async fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, ConfigError>;
}

/// Virtual-host to tenant mapping
#[async_trait]
pub trait VirtualHostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<ResolvedHost, ConfigError>;
}

#[derive(Default)]
struct Tenants {
    by_id: HashMap<TenantId, TenantEntry>,
    by_host: HashMap<String, TenantId>,
    default_tenant: Option<TenantId>,
}

/// In-memory tenant store built from the tenant descriptor
#[derive(Default)]
pub struct TenantRegistry {
    inner: RwLock<Tenants>,
}

impl fmt::Debug for TenantRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantRegistry").finish_non_exhaustive()
    }
}

impl TenantRegistry {
    pub fn from_descriptor(descriptor: TenantDescriptor) -> Self {
        let mut tenants = Tenants::default();

        for entry in descriptor.tenants {
            for hostname in &entry.virtual_hostnames {
                tenants
                    .by_host
                    .insert(normalize_host(hostname), entry.id);
            }
            if entry.default {
                tenants.default_tenant = Some(entry.id);
            }
            tenants.by_id.insert(entry.id, entry);
        }

        Self {
            inner: RwLock::new(tenants),
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.by_id.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Replace a tenant's CAS settings
    ///
    /// Callers must reload the tenant's cached validator afterwards so the
    /// next request picks up the new server URL.
    pub async fn update_config(
        &self,
        tenant_id: TenantId,
        config: TenantConfig,
    ) -> Result<(), ConfigError> {
        config
            .validate(tenant_id)
            .map_err(|e| ConfigError::Invalid {
                tenant_id,
                reason: e.to_string(),
            })?;

        let mut tenants = self.inner.write().await;
        let entry = tenants
            .by_id
            .get_mut(&tenant_id)
            .ok_or(ConfigError::UnknownTenant(tenant_id))?;
        entry.cas = config;

        tracing::info!(
            event = "tenant_config_updated",
            tenant_id = tenant_id,
            enabled = entry.cas.enabled,
            "Tenant CAS configuration updated"
        );

        Ok(())
    }
}

#[async_trait]
impl TenantConfigProvider for TenantRegistry {
    async fn get(&self, tenant_id: TenantId) -> Result<TenantConfig, ConfigError> {
        self.inner
            .read()
            .await
            .by_id
            .get(&tenant_id)
            .map(|entry| entry.cas.clone())
            .ok_or(ConfigError::UnknownTenant(tenant_id))
    }
}

#[async_trait]
impl VirtualHostResolver for TenantRegistry {
    async fn resolve(&self, host: &str) -> Result<ResolvedHost, ConfigError> {
        let tenants = self.inner.read().await;
        let normalized = normalize_host(host);

        if let Some(entry) = tenants
            .by_host
            .get(&normalized)
            .and_then(|id| tenants.by_id.get(id))
        {
            return Ok(ResolvedHost {
                tenant_id: entry.id,
                virtual_hostnames: entry.virtual_hostnames.clone(),
            });
        }

        match tenants.default_tenant {
            Some(tenant_id) => {
                tracing::debug!(
                    host = %normalized,
                    tenant_id = tenant_id,
                    "No virtual host matched, using default tenant"
                );
                Ok(ResolvedHost {
                    tenant_id,
                    virtual_hostnames: Vec::new(),
                })
            }
            None => Err(ConfigError::UnresolvedHost(normalized)),
        }
    }
}

/// Lowercase a Host header value and strip its port
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let without_port = if let Some(rest) = host.strip_prefix('[') {
        // IPv6 literal: keep the brackets, drop anything after them
        match rest.find(']') {
            Some(end) => &host[..end + 2],
            None => host,
        }
    } else {
        host.split(':').next().unwrap_or(host)
    };
    without_port.to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::test_support::{enabled_config, sample_descriptor};

    #[test]
    fn test_normalize_host() {
        assert_eq!(normalize_host("Portal.Example.com"), "portal.example.com");
        assert_eq!(normalize_host("portal.example.com:8443"), "portal.example.com");
        assert_eq!(normalize_host("[::1]:8080"), "[::1]");
        assert_eq!(normalize_host(" localhost "), "localhost");
    }

    #[tokio::test]
    async fn test_resolve_matches_virtual_hostname() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());

        let resolved = registry.resolve("www.acme.test:443").await.unwrap();
        assert_eq!(resolved.tenant_id, 2);
        assert_eq!(
            resolved.virtual_hostnames,
            vec!["acme.test".to_string(), "www.acme.test".to_string()]
        );
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_default_without_hostnames() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());

        let resolved = registry.resolve("unknown.test").await.unwrap();
        assert_eq!(resolved.tenant_id, 1);
        assert!(resolved.virtual_hostnames.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_without_default_fails() {
        let mut descriptor = sample_descriptor();
        for tenant in &mut descriptor.tenants {
            tenant.default = false;
        }
        let registry = TenantRegistry::from_descriptor(descriptor);

        let err = registry.resolve("unknown.test").await.unwrap_err();
        assert_eq!(err, ConfigError::UnresolvedHost("unknown.test".to_string()));
    }

    #[test]
    fn test_debug_does_not_dump_tenant_settings() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());
        let rendered = format!("{:?}", registry);
        assert!(rendered.starts_with("TenantRegistry"));
        assert!(!rendered.contains("cas.example.com"));
    }

    #[tokio::test]
    async fn test_get_unknown_tenant() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());
        assert_eq!(
            registry.get(99).await.unwrap_err(),
            ConfigError::UnknownTenant(99)
        );
    }

    #[tokio::test]
    async fn test_update_config_is_visible_on_next_get() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());

        let mut config = enabled_config();
        config.server_url = "https://cas2.example.com/cas".to_string();
        registry.update_config(2, config.clone()).await.unwrap();

        assert_eq!(registry.get(2).await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_update_config_rejects_incomplete_settings() {
        let registry = TenantRegistry::from_descriptor(sample_descriptor());

        let mut config = enabled_config();
        config.logout_url = String::new();
        let err = registry.update_config(2, config).await.unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { tenant_id: 2, .. }));

        // Previous configuration is untouched
        assert_eq!(registry.get(2).await.unwrap(), enabled_config());
    }
}
