//! Service (callback) URL derivation
//!
//! Precedence: explicit `serviceURL` override, then the first virtual hostname
//! of the site the request was routed to, then the tenant's `serverName`.
//! The login redirect and the later ticket validation must produce the exact
//! same string, so everything here is a pure function of the request context.

use url::form_urlencoded;

use crate::tenants::TenantConfig;

/// Query parameter carrying the callback URL to the CAS server
pub const SERVICE_PARAMETER: &str = "service";
/// Query parameter carrying the ticket back from the CAS server
pub const TICKET_PARAMETER: &str = "ticket";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ServiceUrlError {
    #[error("no virtual hostname, serverName or serviceURL to build the service URL from")]
    NoServerName,
}

/// Base URL for the callback: `https://<first virtual host>/` or `serverName`
pub fn resolve_server_name(virtual_hostnames: &[String], config: &TenantConfig) -> String {
    virtual_hostnames
        .first()
        .map(|hostname| format!("https://{}/", hostname))
        .unwrap_or_else(|| config.server_name.clone())
}

/// Service URL for the current request
pub fn construct_service_url(
    config: &TenantConfig,
    virtual_hostnames: &[String],
    path: &str,
    query: Option<&str>,
) -> Result<String, ServiceUrlError> {
    if let Some(service_url) = config.service_url_override() {
        return Ok(service_url.to_string());
    }

    let server_name = resolve_server_name(virtual_hostnames, config);
    build_callback_url(&server_name, path, query)
}

/// Combine a server name with the request path and query, minus the CAS parameters
///
/// Server names without a scheme are forced onto https.
pub fn build_callback_url(
    server_name: &str,
    path: &str,
    query: Option<&str>,
) -> Result<String, ServiceUrlError> {
    let server_name = server_name.trim();
    if server_name.is_empty() {
        return Err(ServiceUrlError::NoServerName);
    }

    let base = if server_name.starts_with("https://") || server_name.starts_with("http://") {
        server_name.to_string()
    } else {
        format!("https://{}", server_name)
    };

    let mut url = base.trim_end_matches('/').to_string();
    if !path.starts_with('/') {
        url.push('/');
    }
    url.push_str(path);

    let retained: Vec<(String, String)> = query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .filter(|(name, _)| name != SERVICE_PARAMETER && name != TICKET_PARAMETER)
                .map(|(name, value)| (name.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default();

    if !retained.is_empty() {
        let encoded = form_urlencoded::Serializer::new(String::new())
            .extend_pairs(retained)
            .finish();
        url.push('?');
        url.push_str(&encoded);
    }

    Ok(url)
}

/// Append `name=value` to a URL that may already carry a query string
pub fn add_parameter(url: &str, name: &str, value: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}{}={}",
        url,
        separator,
        urlencoding::encode(name),
        urlencoding::encode(value)
    )
}

/// CAS login URL carrying the service URL
pub fn build_login_redirect_url(login_url: &str, service_url: &str) -> String {
    add_parameter(login_url, SERVICE_PARAMETER, service_url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenants::test_support::enabled_config;

    fn hostnames(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolve_server_name_prefers_first_virtual_host() {
        let config = enabled_config();
        assert_eq!(
            resolve_server_name(&hostnames(&["acme.test", "www.acme.test"]), &config),
            "https://acme.test/"
        );
    }

    #[test]
    fn test_resolve_server_name_falls_back_to_config() {
        let config = enabled_config();
        assert_eq!(resolve_server_name(&[], &config), "portal.example.com");
    }

    #[test]
    fn test_override_is_used_verbatim() {
        let mut config = enabled_config();
        config.service_url = "https://fixed.example.com/sso?x=1&ticket=keep".to_string();

        let url = construct_service_url(
            &config,
            &hostnames(&["acme.test"]),
            "/c/portal/login",
            Some("ticket=ST-1"),
        )
        .unwrap();
        assert_eq!(url, "https://fixed.example.com/sso?x=1&ticket=keep");
    }

    #[test]
    fn test_virtual_host_service_url() {
        let url = construct_service_url(
            &enabled_config(),
            &hostnames(&["acme.test"]),
            "/c/portal/login",
            None,
        )
        .unwrap();
        assert_eq!(url, "https://acme.test/c/portal/login");
    }

    #[test]
    fn test_server_name_without_scheme_is_forced_to_https() {
        let url = construct_service_url(&enabled_config(), &[], "/c/portal/login", None).unwrap();
        assert_eq!(url, "https://portal.example.com/c/portal/login");
    }

    #[test]
    fn test_server_name_with_scheme_is_kept() {
        let mut config = enabled_config();
        config.server_name = "http://intranet.local:8080".to_string();
        let url = construct_service_url(&config, &[], "/c/portal/login", None).unwrap();
        assert_eq!(url, "http://intranet.local:8080/c/portal/login");
    }

    #[test]
    fn test_cas_parameters_are_stripped_and_others_kept() {
        let url = build_callback_url(
            "https://acme.test/",
            "/c/portal/login",
            Some("redirect=%2Fweb%2Fguest&ticket=ST-1&service=x&p_l_id=42"),
        )
        .unwrap();
        assert_eq!(
            url,
            "https://acme.test/c/portal/login?redirect=%2Fweb%2Fguest&p_l_id=42"
        );
    }

    #[test]
    fn test_missing_server_name_is_an_error() {
        let mut config = enabled_config();
        config.server_name = "  ".to_string();
        assert_eq!(
            construct_service_url(&config, &[], "/c/portal/login", None),
            Err(ServiceUrlError::NoServerName)
        );
    }

    #[test]
    fn test_login_and_validation_service_urls_match() {
        let config = enabled_config();
        let hosts = hostnames(&["acme.test"]);

        let at_login =
            construct_service_url(&config, &hosts, "/c/portal/login", Some("redirect=%2Fhome"))
                .unwrap();
        let at_validation = construct_service_url(
            &config,
            &hosts,
            "/c/portal/login",
            Some("redirect=%2Fhome&ticket=ST-123"),
        )
        .unwrap();

        assert_eq!(at_login, at_validation);
    }

    #[test]
    fn test_build_login_redirect_url_encodes_service() {
        let url = build_login_redirect_url(
            "https://cas.example.com/cas/login",
            "https://acme.test/c/portal/login",
        );
        assert_eq!(
            url,
            "https://cas.example.com/cas/login?service=https%3A%2F%2Facme.test%2Fc%2Fportal%2Flogin"
        );
    }

    #[test]
    fn test_add_parameter_to_existing_query() {
        let url = add_parameter("https://cas.example.com/cas/login?locale=en", "service", "a b");
        assert_eq!(url, "https://cas.example.com/cas/login?locale=en&service=a%20b");
    }
}
