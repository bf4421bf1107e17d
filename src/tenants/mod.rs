pub mod models;
pub mod registry;

pub use models::{DescriptorError, TenantConfig, TenantDescriptor, TenantEntry, TenantId};
pub use registry::{
    normalize_host, ConfigError, ResolvedHost, TenantConfigProvider, TenantRegistry,
    VirtualHostResolver,
};

use crate::config::TenantSource;

/// Load and validate the tenant descriptor from the configured source
///
/// Never logs the raw descriptor; only a per-tenant summary.
pub fn load_tenants(source: &TenantSource) -> anyhow::Result<TenantRegistry> {
    let (descriptor, source_name) = match source {
        TenantSource::Json(json) => (TenantDescriptor::from_json(json)?, "env-json"),
        TenantSource::File(path) => (TenantDescriptor::from_file(path)?, "file-path"),
    };

    if let Err(error) = descriptor.validate() {
        tracing::error!(
            source = source_name,
            error = %error,
            "Tenant descriptor validation failed"
        );
        return Err(anyhow::anyhow!(
            "Tenant descriptor validation failed ({}): {}",
            source_name,
            error
        ));
    }

    for tenant in &descriptor.tenants {
        tracing::info!(
            source = source_name,
            tenant_id = tenant.id,
            default = tenant.default,
            cas_enabled = tenant.cas.enabled,
            virtual_hostnames = ?tenant.virtual_hostnames,
            "Tenant loaded"
        );
    }

    Ok(TenantRegistry::from_descriptor(descriptor))
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    pub(crate) fn enabled_config() -> TenantConfig {
        TenantConfig {
            enabled: true,
            server_url: "https://cas.example.com/cas".to_string(),
            login_url: "https://cas.example.com/cas/login".to_string(),
            logout_url: "https://cas.example.com/cas/logout".to_string(),
            server_name: "portal.example.com".to_string(),
            service_url: String::new(),
            accept_any_proxy: false,
            allowed_proxy_chains: Vec::new(),
        }
    }

    /// Tenant 1 is the default, tenant 2 serves two acme hostnames,
    /// tenant 3 has CAS switched off.
    pub(crate) fn sample_descriptor() -> TenantDescriptor {
        TenantDescriptor {
            tenants: vec![
                TenantEntry {
                    id: 1,
                    default: true,
                    virtual_hostnames: vec!["portal.example.com".to_string()],
                    cas: enabled_config(),
                },
                TenantEntry {
                    id: 2,
                    default: false,
                    virtual_hostnames: vec!["acme.test".to_string(), "www.acme.test".to_string()],
                    cas: enabled_config(),
                },
                TenantEntry {
                    id: 3,
                    default: false,
                    virtual_hostnames: vec!["plain.test".to_string()],
                    cas: TenantConfig {
                        enabled: false,
                        ..enabled_config()
                    },
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_tenants_from_json_source() {
        let json = serde_json::to_string(&test_support::sample_descriptor()).unwrap();
        let registry = load_tenants(&TenantSource::Json(json)).unwrap();
        assert_eq!(registry.len().await, 3);
    }

    #[tokio::test]
    async fn test_load_tenants_from_file_source() {
        let temp_file = std::env::temp_dir().join("cas_gateway_test_tenants.json");
        let json = serde_json::to_string(&test_support::sample_descriptor()).unwrap();
        std::fs::write(&temp_file, json).unwrap();

        let registry =
            load_tenants(&TenantSource::File(temp_file.to_string_lossy().to_string())).unwrap();
        assert_eq!(registry.len().await, 3);

        std::fs::remove_file(&temp_file).ok();
    }

    #[test]
    fn test_load_tenants_rejects_invalid_descriptor() {
        let mut descriptor = test_support::sample_descriptor();
        descriptor.tenants[1].id = 1;
        let json = serde_json::to_string(&descriptor).unwrap();

        let err = load_tenants(&TenantSource::Json(json)).unwrap_err();
        assert!(err.to_string().contains("duplicate tenant id 1"));
    }

    #[test]
    fn test_load_tenants_rejects_malformed_json() {
        let err = load_tenants(&TenantSource::Json("{not json".to_string())).unwrap_err();
        assert!(err.to_string().contains("Invalid tenant descriptor"));
    }
}
