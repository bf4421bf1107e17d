use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Portal tenant identifier (one company / instance)
pub type TenantId = i64;

/// CAS settings for one tenant
///
/// Read-only view of the host's configuration store. Empty strings mean
/// "not configured", matching how the portal stores unset values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    #[serde(default)]
    pub enabled: bool,
    /// CAS server URL prefix, e.g. https://cas.example.com/cas
    #[serde(default, rename = "serverURL")]
    pub server_url: String,
    #[serde(default, rename = "loginURL")]
    pub login_url: String,
    #[serde(default, rename = "logoutURL")]
    pub logout_url: String,
    /// Fallback server name used when no virtual host is known
    #[serde(default)]
    pub server_name: String,
    /// Explicit callback URL; wins over any derived value when non-empty
    #[serde(default, rename = "serviceURL")]
    pub service_url: String,
    /// Accept proxy tickets from any proxy chain
    #[serde(default)]
    pub accept_any_proxy: bool,
    /// Proxy chains accepted when `accept_any_proxy` is false
    #[serde(default)]
    pub allowed_proxy_chains: Vec<Vec<String>>,
}

impl TenantConfig {
    /// Explicit service URL override, if configured
    pub fn service_url_override(&self) -> Option<&str> {
        let trimmed = self.service_url.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

/// One tenant entry of the descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantEntry {
    pub id: TenantId,
    /// Used when the request host matches no virtual hostname
    #[serde(default)]
    pub default: bool,
    /// Ordered; the first entry is used to derive the service URL
    #[serde(default)]
    pub virtual_hostnames: Vec<String>,
    pub cas: TenantConfig,
}

/// Tenant descriptor as loaded from CAS_TENANTS_JSON / CAS_TENANTS_PATH
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantDescriptor {
    pub tenants: Vec<TenantEntry>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("duplicate tenant id {0}")]
    DuplicateTenant(TenantId),
    #[error("virtual hostname {0} is assigned to more than one tenant")]
    DuplicateHostname(String),
    #[error("more than one default tenant ({0} and {1})")]
    MultipleDefaults(TenantId, TenantId),
    #[error("tenant {tenant_id} is enabled but {field} is empty")]
    MissingField {
        tenant_id: TenantId,
        field: &'static str,
    },
}

impl TenantDescriptor {
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        serde_json::from_str(json).map_err(|e| anyhow::anyhow!("Invalid tenant descriptor: {}", e))
    }

    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read tenant descriptor {}: {}", path, e))?;
        Self::from_json(&json)
    }

    /// Reject descriptors the registry could not resolve unambiguously
    pub fn validate(&self) -> Result<(), DescriptorError> {
        let mut ids = HashSet::new();
        let mut hostnames = HashSet::new();
        let mut default_tenant: Option<TenantId> = None;

        for tenant in &self.tenants {
            if !ids.insert(tenant.id) {
                return Err(DescriptorError::DuplicateTenant(tenant.id));
            }

            for hostname in &tenant.virtual_hostnames {
                if !hostnames.insert(hostname.to_lowercase()) {
                    return Err(DescriptorError::DuplicateHostname(hostname.clone()));
                }
            }

            if tenant.default {
                if let Some(existing) = default_tenant {
                    return Err(DescriptorError::MultipleDefaults(existing, tenant.id));
                }
                default_tenant = Some(tenant.id);
            }

            tenant.cas.validate(tenant.id)?;
        }

        Ok(())
    }
}

impl TenantConfig {
    /// Enabled tenants need every endpoint the filter redirects to
    pub fn validate(&self, tenant_id: TenantId) -> Result<(), DescriptorError> {
        if !self.enabled {
            return Ok(());
        }

        let required = [
            ("serverURL", &self.server_url),
            ("loginURL", &self.login_url),
            ("logoutURL", &self.logout_url),
        ];

        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(DescriptorError::MissingField { tenant_id, field });
            }
        }

        Ok(())
    }
}
