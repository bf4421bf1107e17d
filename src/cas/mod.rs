//! CAS relying-party filter
//!
//! ## Structure
//!
//! - `filter`: the per-request state machine
//! - `middleware`: axum middleware binding the filter to requests and sessions
//! - `validator`: CAS 2.0 proxy ticket validation client
//! - `cache`: per-tenant validator cache
//! - `service_url`: callback URL derivation
//! - `session`: portal session access
//! - `extractors`: error type and the authenticated principal extractor
//! - `helpers`: HTTP client, cookie and redirect helpers
//!
//! ## Authentication Flow
//!
//! 1. Browser hits `/c/portal/login` → redirect to the tenant's CAS login with `service=`
//! 2. CAS authenticates → redirect back with `ticket=ST-...`
//! 3. Filter validates the ticket server-side → stores `CAS_LOGIN` → portal login continues
//! 4. Browser hits `/c/portal/logout` → session invalidated → redirect to CAS logout

pub mod cache;
pub mod extractors;
pub mod filter;
pub mod helpers;
pub mod middleware;
pub mod service_url;
pub mod session;
pub mod validator;

pub use cache::ValidatorCache;
pub use extractors::{CasError, CasPrincipal};
pub use filter::{CasFilter, CasRequest, Decision, LOGIN_PATH, LOGOUT_PATH};
pub use middleware::cas_filter;
pub use service_url::{construct_service_url, resolve_server_name};
pub use session::{MemorySessionStore, Session, SessionError, SessionStore};
pub use validator::{
    Assertion, AttributePrincipal, Cas20ProxyTicketValidator, ProxyPolicy, TicketValidationError,
    ValidatorConstructionError,
};
