use actix_session::storage::{
    CookieSessionStore, LoadError, RedisSessionStore, SaveError, SessionKey, SessionStore,
    UpdateError,
};
use actix_session::Session;
use actix_web::cookie::time::Duration;
use actix_web::http::header::AUTHORIZATION;
use actix_web::HttpRequest;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use uuid::Uuid;

/// Session key the host application sets once the viewer has signed in.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

/// Session key holding the id the completion flag is scoped to.
pub const VIEWER_KEY: &str = "tour_viewer";

/// Only signed-in viewers may restart the tour. Either a bearer token on the
/// request or a token stored in the session counts.
pub fn is_authenticated(req: &HttpRequest, session: &Session) -> bool {
    let bearer = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| !token.trim().is_empty());
    if bearer {
        return true;
    }
    match session.get::<String>(AUTH_TOKEN_KEY) {
        Ok(token) => token.is_some_and(|t| !t.trim().is_empty()),
        Err(e) => {
            log::warn!("Could not read the session token: {}", e);
            false
        }
    }
}

/// The browser's stable id, created on first use. It outlives page reloads for
/// as long as the session cookie does.
pub fn viewer_id(session: &Session) -> String {
    match session.get::<String>(VIEWER_KEY) {
        Ok(Some(id)) if !id.is_empty() => return id,
        Ok(_) => {}
        Err(e) => log::warn!("Could not read the viewer id, issuing a new one: {}", e),
    }
    let id = Uuid::new_v4().to_string();
    if let Err(e) = session.insert(VIEWER_KEY, &id) {
        log::warn!("Could not store the viewer id. The tour flag will not survive a reload: {}", e);
    }
    id
}

type SessionState = HashMap<String, String>;

struct StoredSession {
    state: SessionState,
    expires_at: Instant,
}

fn expiry(ttl: &Duration) -> Instant {
    Instant::now() + std::time::Duration::from_secs(ttl.whole_seconds().max(0) as u64)
}

#[derive(Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<Mutex<HashMap<String, StoredSession>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<String, StoredSession>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SessionStore for InMemoryBackend {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        let mut sessions = self.sessions();
        let key = session_key.as_ref();
        match sessions.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => Ok(Some(stored.state.clone())),
            Some(_) => {
                sessions.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        let session_key = actix_session::storage::generate_session_key();
        let stored = StoredSession { state: session_state, expires_at: expiry(ttl) };
        self.sessions().insert(session_key.as_ref().to_string(), stored);
        Ok(session_key)
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let stored = StoredSession { state: session_state, expires_at: expiry(ttl) };
        self.sessions().insert(session_key.as_ref().to_string(), stored);
        Ok(session_key)
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        if let Some(stored) = self.sessions().get_mut(session_key.as_ref()) {
            stored.expires_at = expiry(ttl);
        }
        Ok(())
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        self.sessions().remove(session_key.as_ref());
        Ok(())
    }
}

#[derive(Clone)]
pub enum RuntimeSessionStore {
    Cookie(Arc<CookieSessionStore>),
    InMemory(InMemoryBackend),
    Redis(RedisSessionStore),
}

impl SessionStore for RuntimeSessionStore {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.load(session_key).await,
            RuntimeSessionStore::InMemory(s) => s.load(session_key).await,
            RuntimeSessionStore::Redis(s) => s.load(session_key).await,
        }
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.save(session_state, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.save(session_state, ttl).await,
            RuntimeSessionStore::Redis(s) => s.save(session_state, ttl).await,
        }
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.update(session_key, session_state, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.update(session_key, session_state, ttl).await,
            RuntimeSessionStore::Redis(s) => s.update(session_key, session_state, ttl).await,
        }
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.update_ttl(session_key, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.update_ttl(session_key, ttl).await,
            RuntimeSessionStore::Redis(s) => s.update_ttl(session_key, ttl).await,
        }
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.delete(session_key).await,
            RuntimeSessionStore::InMemory(s) => s.delete(session_key).await,
            RuntimeSessionStore::Redis(s) => s.delete(session_key).await,
        }
    }
}
