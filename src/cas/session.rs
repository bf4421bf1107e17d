//! Portal session access
//!
//! The host portal owns sessions; the filter only needs per-session
//! key/value access. `MemorySessionStore` is the standalone implementation.
//!
//! A request without a live session gets a deferred [`Session`]: nothing is
//! stored until the filter writes to it, so anonymous redirects and failed
//! validations leave the store untouched.

use async_trait::async_trait;
use dashmap::{mapref::one::RefMut, DashMap};
use rand::{distributions::Alphanumeric, Rng};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;

/// Set by an external login component; read once and cleared by the filter
pub const CAS_FORCE_LOGOUT: &str = "CAS_FORCE_LOGOUT";
/// Principal name of the CAS-authenticated user for this session
pub const CAS_LOGIN: &str = "CAS_LOGIN";

const SESSION_ID_LEN: usize = 32;
const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("session {0} does not exist")]
    NotFound(String),
    #[error("session store unavailable: {0}")]
    Unavailable(String),
}

/// Key/value session storage; every operation is atomic for one session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create an empty session and return its id
    async fn create(&self) -> Result<String, SessionError>;
    async fn exists(&self, session_id: &str) -> Result<bool, SessionError>;
    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError>;
    async fn set(&self, session_id: &str, key: &str, value: String) -> Result<(), SessionError>;
    /// Remove `key`, returning the value it held
    async fn remove(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError>;
    /// Drop the whole session
    async fn invalidate(&self, session_id: &str) -> Result<(), SessionError>;
}

struct StoredSession {
    values: HashMap<String, String>,
    last_access: Instant,
}

impl StoredSession {
    fn new() -> Self {
        Self {
            values: HashMap::new(),
            last_access: Instant::now(),
        }
    }
}

/// Process-local session store
///
/// Sessions idle for longer than the timeout are treated as gone and are
/// dropped on access or by [`MemorySessionStore::purge_expired`].
pub struct MemorySessionStore {
    sessions: DashMap<String, StoredSession>,
    idle_timeout: Duration,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::with_idle_timeout(DEFAULT_IDLE_TIMEOUT)
    }
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop every idle session, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| session.last_access.elapsed() <= self.idle_timeout);
        before.saturating_sub(self.sessions.len())
    }

    /// Live session with its idle clock reset
    fn touch(&self, session_id: &str) -> Option<RefMut<'_, String, StoredSession>> {
        let mut session = self.sessions.get_mut(session_id)?;
        if session.last_access.elapsed() > self.idle_timeout {
            drop(session);
            self.sessions
                .remove_if(session_id, |_, s| s.last_access.elapsed() > self.idle_timeout);
            return None;
        }
        session.last_access = Instant::now();
        Some(session)
    }
}

fn generate_session_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SESSION_ID_LEN)
        .map(char::from)
        .collect()
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self) -> Result<String, SessionError> {
        loop {
            let id = generate_session_id();
            if let dashmap::mapref::entry::Entry::Vacant(entry) = self.sessions.entry(id.clone()) {
                entry.insert(StoredSession::new());
                return Ok(id);
            }
        }
    }

    async fn exists(&self, session_id: &str) -> Result<bool, SessionError> {
        Ok(self.touch(session_id).is_some())
    }

    async fn get(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError> {
        let session = self
            .touch(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(session.values.get(key).cloned())
    }

    async fn set(&self, session_id: &str, key: &str, value: String) -> Result<(), SessionError> {
        let mut session = self
            .touch(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        session.values.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove(&self, session_id: &str, key: &str) -> Result<Option<String>, SessionError> {
        let mut session = self
            .touch(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        Ok(session.values.remove(key))
    }

    async fn invalidate(&self, session_id: &str) -> Result<(), SessionError> {
        self.sessions.remove(session_id);
        Ok(())
    }
}

/// Periodically purge idle sessions from `store`
pub fn spawn_session_sweeper(store: Arc<MemorySessionStore>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let purged = store.purge_expired();
            if purged > 0 {
                tracing::debug!(
                    purged = purged,
                    remaining = store.len(),
                    "Purged idle sessions"
                );
            }
        }
    })
}

/// One browser session bound to its store
pub struct Session {
    store: Arc<dyn SessionStore>,
    id: OnceCell<String>,
}

impl Session {
    /// Session named by the request's cookie
    pub fn existing(store: Arc<dyn SessionStore>, id: String) -> Self {
        Self {
            store,
            id: OnceCell::from(id),
        }
    }

    /// Session that is created in the store on its first write
    pub fn deferred(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            id: OnceCell::new(),
        }
    }

    /// Session id; `None` until a deferred session is written to
    pub fn id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    /// Short digest of the session id, safe to log
    pub fn log_id(&self) -> String {
        match self.id() {
            Some(id) => format!("{:x}", md5::compute(id.as_bytes())),
            None => "-".to_string(),
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, SessionError> {
        match self.id() {
            Some(id) => self.store.get(id, key).await,
            None => Ok(None),
        }
    }

    pub async fn set(&self, key: &str, value: String) -> Result<(), SessionError> {
        let id = self.id.get_or_try_init(|| self.store.create()).await?;
        self.store.set(id, key, value).await
    }

    pub async fn remove(&self, key: &str) -> Result<Option<String>, SessionError> {
        match self.id() {
            Some(id) => self.store.remove(id, key).await,
            None => Ok(None),
        }
    }

    pub async fn invalidate(&self) -> Result<(), SessionError> {
        match self.id() {
            Some(id) => self.store.invalidate(id).await,
            None => Ok(()),
        }
    }

    /// Consume the force-logout marker; true when it was present
    pub async fn take_force_logout(&self) -> Result<bool, SessionError> {
        Ok(self.remove(CAS_FORCE_LOGOUT).await?.is_some())
    }

    /// Ask the filter to send this session through CAS logout on its next request
    pub async fn mark_force_logout(&self) -> Result<(), SessionError> {
        self.set(CAS_FORCE_LOGOUT, "true".to_string()).await
    }

    /// Authenticated principal, ignoring blank values
    pub async fn cas_login(&self) -> Result<Option<String>, SessionError> {
        Ok(self
            .get(CAS_LOGIN)
            .await?
            .filter(|login| !login.trim().is_empty()))
    }

    pub async fn set_cas_login(&self, login: String) -> Result<(), SessionError> {
        self.set(CAS_LOGIN, login).await
    }
}
