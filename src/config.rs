use std::env;

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Development,
    Production,
}

/// Source for the tenant descriptor
#[derive(Debug, Clone)]
pub enum TenantSource {
    /// Descriptor provided as JSON string via CAS_TENANTS_JSON env var
    Json(String),
    /// Descriptor loaded from file path via CAS_TENANTS_PATH env var
    File(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    // Environment configuration
    pub environment: Environment,

    // Server configuration
    pub server_host: String,
    pub server_port: u16,

    // Session cookie configuration (None = host-only cookie, Some = domain cookie)
    pub session_cookie_name: String,
    pub cookie_domain: Option<String>,
    pub session_idle_timeout_secs: u64,

    // HTTP client timeout configuration for ticket validation (in seconds)
    pub http_connect_timeout_secs: u64,
    pub http_request_timeout_secs: u64,

    // Where the per-tenant CAS settings come from
    pub tenants: TenantSource,
}

impl Config {
    /// Load configuration from environment variables using std::env::var
    pub fn load() -> anyhow::Result<Self> {
        let environment = match env::var("ENVIRONMENT")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        };

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());

        let server_port = env::var("SERVER_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(3000);

        let session_cookie_name = env::var("SESSION_COOKIE_NAME")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "CAS_GATEWAY_SESSION".to_string());

        // Cookie domain: if not set or empty, use host-only cookies (no Domain attribute)
        let cookie_domain = env::var("COOKIE_DOMAIN").ok().filter(|s| !s.is_empty());

        let session_idle_timeout_secs = env::var("SESSION_IDLE_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(1800);

        let http_connect_timeout_secs = env::var("HTTP_CONNECT_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(10);

        let http_request_timeout_secs = env::var("HTTP_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(30);

        // Tenant descriptor (primary: JSON env var, fallback: file path)
        let tenants = if let Ok(json) = env::var("CAS_TENANTS_JSON") {
            TenantSource::Json(json)
        } else if let Ok(path) = env::var("CAS_TENANTS_PATH") {
            TenantSource::File(path)
        } else {
            return Err(anyhow::anyhow!(
                "Either CAS_TENANTS_JSON or CAS_TENANTS_PATH environment variable is required"
            ));
        };

        Ok(Config {
            environment,
            server_host,
            server_port,
            session_cookie_name,
            cookie_domain,
            session_idle_timeout_secs,
            http_connect_timeout_secs,
            http_request_timeout_secs,
            tenants,
        })
    }

    /// Check if running in production mode
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Get cookie security flags based on environment
    pub fn cookie_secure_flag(&self) -> &str {
        if self.is_production() {
            "; Secure"
        } else {
            ""
        }
    }

    /// Get cookie domain attribute string (empty if host-only cookie)
    pub fn cookie_domain_attr(&self) -> String {
        match &self.cookie_domain {
            Some(domain) => format!("; Domain={}", domain),
            None => String::new(),
        }
    }

    /// Get bind address for server
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    /// Development defaults used by tests
    #[cfg(test)]
    pub fn for_tests() -> Self {
        Config {
            environment: Environment::Development,
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            session_cookie_name: "CAS_GATEWAY_SESSION".to_string(),
            cookie_domain: None,
            session_idle_timeout_secs: 1800,
            http_connect_timeout_secs: 2,
            http_request_timeout_secs: 5,
            tenants: TenantSource::Json(r#"{"tenants":[]}"#.to_string()),
        }
    }
}
