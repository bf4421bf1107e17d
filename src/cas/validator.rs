//! CAS 2.0 proxy ticket validation
//!
//! A validator is bound to one CAS server URL prefix. `validate` exchanges a
//! ticket for an [`Assertion`] by calling `<prefix>/proxyValidate` and parsing
//! the XML `serviceResponse`. Tickets are single use: a failed validation is
//! final and is never retried here.

use std::collections::BTreeMap;
use url::Url;
use xml::reader::{EventReader, XmlEvent};

use crate::tenants::TenantConfig;

/// Endpoint suffix for CAS 2.0 proxy ticket validation
const PROXY_VALIDATE_SUFFIX: &str = "proxyValidate";

/// Largest `serviceResponse` body read from a CAS server
pub const MAX_RESPONSE_BYTES: usize = 256 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ValidatorConstructionError {
    #[error("invalid CAS server URL {url:?}: {source}")]
    InvalidServerUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("CAS server URL {0:?} must use http or https")]
    UnsupportedScheme(String),
}

#[derive(Debug, thiserror::Error)]
pub enum TicketValidationError {
    #[error("CAS server rejected ticket ({code}): {message}")]
    Rejected { code: String, message: String },
    #[error("invalid proxy chain: {0:?}")]
    InvalidProxyChain(Vec<String>),
    #[error("CAS server request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("CAS server answered with HTTP {0}")]
    UnexpectedStatus(u16),
    #[error("malformed CAS response: {0}")]
    MalformedResponse(String),
    #[error("CAS response exceeds {0} bytes")]
    ResponseTooLarge(usize),
}

impl TicketValidationError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TicketValidationError::Transport(e) if e.is_timeout())
    }
}

/// Authenticated principal returned by the CAS server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributePrincipal {
    pub name: String,
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Result of a successful ticket validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assertion {
    pub principal: AttributePrincipal,
    /// Proxies the ticket travelled through, most recent first
    pub proxies: Vec<String>,
    pub proxy_granting_ticket_iou: Option<String>,
}

/// Which proxy chains a proxy ticket may arrive through
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyPolicy {
    pub accept_any_proxy: bool,
    pub allowed_proxy_chains: Vec<Vec<String>>,
}

impl ProxyPolicy {
    pub fn accepts(&self, proxies: &[String]) -> bool {
        self.accept_any_proxy
            || proxies.is_empty()
            || self
                .allowed_proxy_chains
                .iter()
                .any(|chain| chain.as_slice() == proxies)
    }
}

pub struct Cas20ProxyTicketValidator {
    server_url: Url,
    custom_parameters: BTreeMap<String, String>,
    proxy_policy: ProxyPolicy,
    client: reqwest::Client,
}

impl std::fmt::Debug for Cas20ProxyTicketValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cas20ProxyTicketValidator")
            .field("server_url", &self.server_url.as_str())
            .field("custom_parameters", &self.custom_parameters)
            .field("proxy_policy", &self.proxy_policy)
            .finish()
    }
}

impl Cas20ProxyTicketValidator {
    /// Bind a validator to a CAS server URL prefix (e.g. https://cas.example.com/cas)
    pub fn new(
        server_url: &str,
        client: reqwest::Client,
    ) -> Result<Self, ValidatorConstructionError> {
        let trimmed = server_url.trim();
        let mut parsed =
            Url::parse(trimmed).map_err(|source| ValidatorConstructionError::InvalidServerUrl {
                url: trimmed.to_string(),
                source,
            })?;

        if !matches!(parsed.scheme(), "http" | "https") || parsed.cannot_be_a_base() {
            return Err(ValidatorConstructionError::UnsupportedScheme(
                trimmed.to_string(),
            ));
        }

        parsed.set_query(None);
        parsed.set_fragment(None);

        Ok(Self {
            server_url: parsed,
            custom_parameters: BTreeMap::new(),
            proxy_policy: ProxyPolicy::default(),
            client,
        })
    }

    /// Build the validator for one tenant's configuration
    ///
    /// The custom parameters are sent along with every validation request.
    pub fn for_tenant(
        config: &TenantConfig,
        client: reqwest::Client,
    ) -> Result<Self, ValidatorConstructionError> {
        let parameters = BTreeMap::from([
            ("casServerLoginUrl".to_string(), config.login_url.clone()),
            ("casServerUrlPrefix".to_string(), config.server_url.clone()),
            ("redirectAfterValidation".to_string(), "false".to_string()),
            ("serverName".to_string(), config.server_name.clone()),
        ]);

        Ok(Self::new(&config.server_url, client)?
            .with_custom_parameters(parameters)
            .with_proxy_policy(ProxyPolicy {
                accept_any_proxy: config.accept_any_proxy,
                allowed_proxy_chains: config.allowed_proxy_chains.clone(),
            }))
    }

    pub fn with_custom_parameters(mut self, parameters: BTreeMap<String, String>) -> Self {
        self.custom_parameters = parameters;
        self
    }

    pub fn with_proxy_policy(mut self, policy: ProxyPolicy) -> Self {
        self.proxy_policy = policy;
        self
    }

    pub fn server_url(&self) -> &str {
        self.server_url.as_str()
    }

    pub fn custom_parameters(&self) -> &BTreeMap<String, String> {
        &self.custom_parameters
    }

    /// Full validation URL for a ticket / service pair
    pub fn validation_url(&self, ticket: &str, service_url: &str) -> Url {
        let mut url = self.server_url.clone();
        let path = url.path().to_string();
        let separator = if path.ends_with('/') { "" } else { "/" };
        url.set_path(&format!("{}{}{}", path, separator, PROXY_VALIDATE_SUFFIX));

        {
            let mut query = url.query_pairs_mut();
            query.append_pair("ticket", ticket);
            query.append_pair("service", service_url);
            for (name, value) in &self.custom_parameters {
                query.append_pair(name, value);
            }
        }

        url
    }

    /// Exchange a ticket for an assertion
    pub async fn validate(
        &self,
        ticket: &str,
        service_url: &str,
    ) -> Result<Assertion, TicketValidationError> {
        let url = self.validation_url(ticket, service_url);

        tracing::debug!(
            cas_server = %self.server_url,
            service_url = %service_url,
            ticket_len = ticket.len(),
            "Validating CAS ticket"
        );

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(TicketValidationError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TicketValidationError::UnexpectedStatus(status.as_u16()));
        }

        let body = read_body(response).await?;

        let assertion = parse_service_response(&body)?;

        if !self.proxy_policy.accepts(&assertion.proxies) {
            return Err(TicketValidationError::InvalidProxyChain(assertion.proxies));
        }

        tracing::debug!(
            principal = %assertion.principal.name,
            proxies = assertion.proxies.len(),
            "CAS ticket validated"
        );

        Ok(assertion)
    }
}

/// Read the response body, refusing anything over [`MAX_RESPONSE_BYTES`]
async fn read_body(mut response: reqwest::Response) -> Result<String, TicketValidationError> {
    if response
        .content_length()
        .is_some_and(|len| len > MAX_RESPONSE_BYTES as u64)
    {
        return Err(TicketValidationError::ResponseTooLarge(MAX_RESPONSE_BYTES));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(TicketValidationError::Transport)?
    {
        if body.len() + chunk.len() > MAX_RESPONSE_BYTES {
            return Err(TicketValidationError::ResponseTooLarge(MAX_RESPONSE_BYTES));
        }
        body.extend_from_slice(&chunk);
    }

    String::from_utf8(body)
        .map_err(|e| TicketValidationError::MalformedResponse(e.to_string()))
}

/// Parse a CAS 2.0 `serviceResponse` document
pub fn parse_service_response(body: &str) -> Result<Assertion, TicketValidationError> {
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut success = false;
    let mut failure: Option<(String, String)> = None;
    let mut user: Option<String> = None;
    let mut pgt_iou: Option<String> = None;
    let mut proxies = Vec::new();
    let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for event in EventReader::new(body.as_bytes()) {
        match event.map_err(|e| TicketValidationError::MalformedResponse(e.to_string()))? {
            XmlEvent::StartElement {
                name, attributes: attrs, ..
            } => {
                match name.local_name.as_str() {
                    "authenticationSuccess" => success = true,
                    "authenticationFailure" => {
                        let code = attrs
                            .iter()
                            .find(|a| a.name.local_name == "code")
                            .map(|a| a.value.clone())
                            .unwrap_or_default();
                        failure = Some((code, String::new()));
                    }
                    _ => {}
                }
                path.push(name.local_name);
                text.clear();
            }
            XmlEvent::Characters(s) | XmlEvent::CData(s) => text.push_str(&s),
            XmlEvent::EndElement { name } => {
                let value = text.trim().to_string();
                text.clear();

                let parent = path
                    .len()
                    .checked_sub(2)
                    .and_then(|i| path.get(i))
                    .map(String::as_str);

                match (parent, name.local_name.as_str()) {
                    (_, "authenticationFailure") => {
                        if let Some((_, message)) = failure.as_mut() {
                            *message = value;
                        }
                    }
                    (Some("authenticationSuccess"), "user") => user = Some(value),
                    (Some("authenticationSuccess"), "proxyGrantingTicket") => {
                        pgt_iou = Some(value)
                    }
                    (Some("proxies"), "proxy") => proxies.push(value),
                    (Some("attributes"), attribute) => {
                        attributes
                            .entry(attribute.to_string())
                            .or_default()
                            .push(value);
                    }
                    _ => {}
                }

                path.pop();
            }
            _ => {}
        }
    }

    if let Some((code, message)) = failure {
        return Err(TicketValidationError::Rejected { code, message });
    }

    if !success {
        return Err(TicketValidationError::MalformedResponse(
            "no authentication reply from CAS server".to_string(),
        ));
    }

    let name = user
        .filter(|u| !u.is_empty())
        .ok_or_else(|| {
            TicketValidationError::MalformedResponse("no principal was found".to_string())
        })?;

    Ok(Assertion {
        principal: AttributePrincipal { name, attributes },
        proxies,
        proxy_granting_ticket_iou: pgt_iou,
    })
}
