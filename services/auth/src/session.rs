//! Server-side sessions
//!
//! A session is identified by an opaque random id carried in a cookie. The
//! record behind it holds the signed-in user (if any) and pending flash
//! messages. Handlers see a [`Session`] handle placed in the request
//! extensions by [`crate::middleware::session_middleware`]; changes made
//! through the handle are persisted once the handler has produced its
//! response.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use axum::{
    async_trait as axum_async_trait,
    extract::FromRequestParts,
    http::{StatusCode, request::Parts},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Duration, Utc};
use common::cache::RedisPool;
use common::error::DatabaseError;
use mockable::Clock;
use rand::RngCore;
use sqlx::{PgPool, Row, types::Json};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{FlashKind, FlashMessage, SessionRecord};

/// Name of the cookie carrying the session id
pub const SESSION_COOKIE: &str = "devjobs.sid";

const SESSION_ID_BYTES: usize = 32;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Session cache error: {0}")]
    Cache(#[from] anyhow::Error),

    #[error("Session payload could not be encoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persistent storage for session records
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Store a record under a freshly issued id
    async fn save(&self, id: &str, record: &SessionRecord, ttl_seconds: u64)
    -> Result<(), SessionError>;

    /// Overwrite the record of a live session.
    ///
    /// Writes nothing and returns `false` when `id` no longer exists, so a
    /// session deleted by logout cannot be brought back.
    async fn update(
        &self,
        id: &str,
        record: &SessionRecord,
        ttl_seconds: u64,
    ) -> Result<bool, SessionError>;

    async fn delete(&self, id: &str) -> Result<(), SessionError>;
}

/// Sessions stored in the application database
#[derive(Clone)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Remove expired session rows, returning how many were deleted
    pub async fn purge_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query("DELETE FROM sessions WHERE expires_at <= NOW()")
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        info!("Purged {} expired sessions", result.rows_affected());
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let row = sqlx::query("SELECT data FROM sessions WHERE id = $1 AND expires_at > NOW()")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(row.map(|row| row.get::<Json<SessionRecord>, _>("data").0))
    }

    async fn save(
        &self,
        id: &str,
        record: &SessionRecord,
        _ttl_seconds: u64,
    ) -> Result<(), SessionError> {
        sqlx::query("INSERT INTO sessions (id, data, expires_at) VALUES ($1, $2, $3)")
            .bind(id)
            .bind(Json(record))
            .bind(record.expires_at)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        record: &SessionRecord,
        _ttl_seconds: u64,
    ) -> Result<bool, SessionError> {
        let result = sqlx::query("UPDATE sessions SET data = $2, expires_at = $3 WHERE id = $1")
            .bind(id)
            .bind(Json(record))
            .bind(record.expires_at)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::Query)?;

        Ok(())
    }
}

/// Sessions stored in Redis, expiring with the key TTL
#[derive(Clone)]
pub struct RedisSessionStore {
    redis_pool: RedisPool,
}

impl RedisSessionStore {
    pub fn new(redis_pool: RedisPool) -> Self {
        Self { redis_pool }
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        let key = self.redis_pool.key("session", id);
        Ok(self.redis_pool.get_json(&key).await?)
    }

    async fn save(
        &self,
        id: &str,
        record: &SessionRecord,
        ttl_seconds: u64,
    ) -> Result<(), SessionError> {
        let key = self.redis_pool.key("session", id);
        self.redis_pool
            .set_json(&key, record, Some(ttl_seconds))
            .await?;
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        record: &SessionRecord,
        ttl_seconds: u64,
    ) -> Result<bool, SessionError> {
        let key = self.redis_pool.key("session", id);
        Ok(self
            .redis_pool
            .replace_json(&key, record, ttl_seconds)
            .await?)
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        let key = self.redis_pool.key("session", id);
        self.redis_pool.delete(&key).await?;
        Ok(())
    }
}

/// Process-local session store
#[derive(Default)]
pub struct InMemorySessionStore {
    records: RwLock<HashMap<String, SessionRecord>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn load(&self, id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn save(
        &self,
        id: &str,
        record: &SessionRecord,
        _ttl_seconds: u64,
    ) -> Result<(), SessionError> {
        self.records
            .write()
            .await
            .insert(id.to_string(), record.clone());
        Ok(())
    }

    async fn update(
        &self,
        id: &str,
        record: &SessionRecord,
        _ttl_seconds: u64,
    ) -> Result<bool, SessionError> {
        match self.records.write().await.get_mut(id) {
            Some(existing) => {
                *existing = record.clone();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<(), SessionError> {
        self.records.write().await.remove(id);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SessionState {
    user_id: Option<Uuid>,
    flashes: Vec<FlashMessage>,
    dirty: bool,
    rotate: bool,
}

/// Request-scoped handle on the current session
///
/// Cheap to clone; all clones share the same state for the lifetime of the
/// request.
#[derive(Debug, Clone, Default)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// A fresh, anonymous session
    pub fn new() -> Self {
        Self::default()
    }

    fn from_record(record: SessionRecord) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                user_id: record.user_id,
                flashes: record.flashes,
                dirty: false,
                rotate: false,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.lock().user_id
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id().is_some()
    }

    /// Attach `user_id` as the session identity; the session id is rotated
    pub fn login(&self, user_id: Uuid) {
        let mut state = self.lock();
        state.user_id = Some(user_id);
        state.dirty = true;
        state.rotate = true;
    }

    /// Drop the session identity; the old session id stops resolving
    pub fn logout(&self) {
        let mut state = self.lock();
        state.user_id = None;
        state.flashes.clear();
        state.dirty = true;
        state.rotate = true;
    }

    pub fn flash(&self, kind: FlashKind, message: impl Into<String>) {
        let mut state = self.lock();
        state.flashes.push(FlashMessage {
            kind,
            message: message.into(),
        });
        state.dirty = true;
    }

    pub fn flash_error(&self, message: impl Into<String>) {
        self.flash(FlashKind::Error, message);
    }

    pub fn flash_success(&self, message: impl Into<String>) {
        self.flash(FlashKind::Success, message);
    }

    /// Remove and return every pending flash message
    pub fn take_flashes(&self) -> Vec<FlashMessage> {
        let mut state = self.lock();
        if state.flashes.is_empty() {
            return Vec::new();
        }
        state.dirty = true;
        std::mem::take(&mut state.flashes)
    }
}

#[axum_async_trait]
impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions.get::<Session>().cloned().ok_or((
            StatusCode::INTERNAL_SERVER_ERROR,
            "session middleware is not installed",
        ))
    }
}

/// Loads and persists sessions around each request
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    clock: Arc<dyn Clock + Send + Sync>,
    ttl: Duration,
    cookie_secure: bool,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        clock: Arc<dyn Clock + Send + Sync>,
        ttl: Duration,
        cookie_secure: bool,
    ) -> Self {
        Self {
            store,
            clock,
            ttl,
            cookie_secure,
        }
    }

    fn new_session_id() -> String {
        let mut bytes = [0u8; SESSION_ID_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Resolve the session referenced by the request cookie, if still live
    pub async fn load(&self, jar: &CookieJar) -> Result<(Option<String>, Session), SessionError> {
        let Some(id) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) else {
            return Ok((None, Session::new()));
        };

        match self.store.load(&id).await? {
            Some(record) if record.is_live_at(self.now()) => {
                Ok((Some(id), Session::from_record(record)))
            }
            Some(_) => {
                debug!("Discarding expired session");
                self.store.delete(&id).await?;
                Ok((None, Session::new()))
            }
            None => Ok((None, Session::new())),
        }
    }

    /// Persist the session after the handler ran and update the cookie jar
    pub async fn commit(
        &self,
        jar: CookieJar,
        current_id: Option<String>,
        session: &Session,
    ) -> Result<CookieJar, SessionError> {
        let (mut user_id, flashes, rotate) = {
            let state = session.lock();
            if !state.dirty {
                return Ok(jar);
            }
            (state.user_id, state.flashes.clone(), state.rotate)
        };
        let empty = user_id.is_none() && flashes.is_empty();

        if let Some(id) = current_id.as_deref() {
            if rotate || empty {
                self.store.delete(id).await?;
            }
        }

        if empty {
            return Ok(match current_id {
                Some(_) => jar.remove(Cookie::build(SESSION_COOKIE).path("/")),
                None => jar,
            });
        }

        let ttl_seconds = self.ttl.num_seconds().max(1) as u64;
        let expires_at = self.now() + self.ttl;

        if let Some(id) = current_id.filter(|_| !rotate) {
            let record = SessionRecord {
                user_id,
                flashes: flashes.clone(),
                expires_at,
            };
            if self.store.update(&id, &record, ttl_seconds).await? {
                return Ok(jar.add(self.cookie(id)));
            }

            // Another request ended this session meanwhile; keep only the flashes.
            debug!("Session ended concurrently, dropping its identity");
            user_id = None;
            if flashes.is_empty() {
                return Ok(jar.remove(Cookie::build(SESSION_COOKIE).path("/")));
            }
        }

        let id = Self::new_session_id();
        let record = SessionRecord {
            user_id,
            flashes,
            expires_at,
        };
        self.store.save(&id, &record, ttl_seconds).await?;

        Ok(jar.add(self.cookie(id)))
    }

    fn cookie(&self, id: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE, id))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.cookie_secure)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockable::DefaultClock;

    fn manager(store: Arc<InMemorySessionStore>) -> SessionManager {
        SessionManager::new(store, Arc::new(DefaultClock), Duration::hours(1), false)
    }

    fn jar_with(id: &str) -> CookieJar {
        CookieJar::new().add(Cookie::new(SESSION_COOKIE, id.to_string()))
    }

    #[tokio::test]
    async fn untouched_anonymous_session_is_not_persisted() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();

        assert!(jar.get(SESSION_COOKIE).is_none());
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn login_persists_identity_under_new_cookie() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());
        let user_id = Uuid::new_v4();

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        session.login(user_id);
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();

        let cookie = jar.get(SESSION_COOKIE).unwrap().value().to_string();
        let (_, restored) = manager.load(&jar_with(&cookie)).await.unwrap();
        assert_eq!(restored.user_id(), Some(user_id));
        assert!(restored.is_authenticated());
    }

    #[tokio::test]
    async fn logout_invalidates_previous_session_id() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        session.login(Uuid::new_v4());
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();
        let old_id = jar.get(SESSION_COOKIE).unwrap().value().to_string();

        let (id, session) = manager.load(&jar_with(&old_id)).await.unwrap();
        session.logout();
        session.flash_success("Signed out");
        let jar = manager.commit(jar_with(&old_id), id, &session).await.unwrap();

        let (_, stale) = manager.load(&jar_with(&old_id)).await.unwrap();
        assert!(!stale.is_authenticated());

        let new_id = jar.get(SESSION_COOKIE).unwrap().value().to_string();
        assert_ne!(new_id, old_id);
        let (_, fresh) = manager.load(&jar_with(&new_id)).await.unwrap();
        assert!(!fresh.is_authenticated());
        assert_eq!(fresh.take_flashes().len(), 1);
    }

    #[tokio::test]
    async fn overlapping_request_cannot_restore_a_logged_out_session() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        session.login(Uuid::new_v4());
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();
        let old_id = jar.get(SESSION_COOKIE).unwrap().value().to_string();

        // Both requests carry the signed-in cookie; the slower one commits last.
        let (first_id, first) = manager.load(&jar_with(&old_id)).await.unwrap();
        let (second_id, second) = manager.load(&jar_with(&old_id)).await.unwrap();
        assert!(second.is_authenticated());

        first.logout();
        manager
            .commit(jar_with(&old_id), first_id, &first)
            .await
            .unwrap();

        second.flash_error("Invalid file format");
        let jar = manager
            .commit(jar_with(&old_id), second_id, &second)
            .await
            .unwrap();

        let (_, stale) = manager.load(&jar_with(&old_id)).await.unwrap();
        assert!(!stale.is_authenticated());

        let new_id = jar.get(SESSION_COOKIE).unwrap().value().to_string();
        assert_ne!(new_id, old_id);
        let (_, fresh) = manager.load(&jar_with(&new_id)).await.unwrap();
        assert!(!fresh.is_authenticated());
        assert_eq!(fresh.take_flashes()[0].message, "Invalid file format");
    }

    #[tokio::test]
    async fn overlapping_request_without_changes_to_keep_drops_the_cookie() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        session.login(Uuid::new_v4());
        session.flash_success("Welcome");
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();
        let old_id = jar.get(SESSION_COOKIE).unwrap().value().to_string();

        let (first_id, first) = manager.load(&jar_with(&old_id)).await.unwrap();
        let (second_id, second) = manager.load(&jar_with(&old_id)).await.unwrap();

        first.logout();
        manager
            .commit(jar_with(&old_id), first_id, &first)
            .await
            .unwrap();

        // Reading the flash marks the session dirty but leaves it without flashes.
        assert_eq!(second.take_flashes().len(), 1);
        let jar = manager
            .commit(jar_with(&old_id), second_id, &second)
            .await
            .unwrap();

        assert!(jar.get(SESSION_COOKIE).is_none());
        assert_eq!(store.len().await, 0);
        let (_, stale) = manager.load(&jar_with(&old_id)).await.unwrap();
        assert!(!stale.is_authenticated());
    }

    #[tokio::test]
    async fn update_never_creates_a_record() {
        let store = InMemorySessionStore::new();
        let record = SessionRecord {
            user_id: Some(Uuid::new_v4()),
            flashes: Vec::new(),
            expires_at: Utc::now() + Duration::hours(1),
        };

        assert!(!store.update("gone", &record, 3600).await.unwrap());
        assert!(store.load("gone").await.unwrap().is_none());

        store.save("live", &record, 3600).await.unwrap();
        assert!(store.update("live", &record, 3600).await.unwrap());
    }

    #[tokio::test]
    async fn flashes_survive_exactly_one_read() {
        let store = Arc::new(InMemorySessionStore::new());
        let manager = manager(store.clone());

        let (id, session) = manager.load(&CookieJar::new()).await.unwrap();
        session.flash_error("Invalid file format");
        let jar = manager.commit(CookieJar::new(), id, &session).await.unwrap();
        let sid = jar.get(SESSION_COOKIE).unwrap().value().to_string();

        let (id, session) = manager.load(&jar_with(&sid)).await.unwrap();
        let flashes = session.take_flashes();
        assert_eq!(flashes.len(), 1);
        assert_eq!(flashes[0].kind, FlashKind::Error);
        manager.commit(jar_with(&sid), id, &session).await.unwrap();

        // Nothing left, so the record is dropped entirely.
        assert_eq!(store.len().await, 0);
    }

    #[tokio::test]
    async fn expired_records_are_ignored() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .save(
                "stale",
                &SessionRecord {
                    user_id: Some(Uuid::new_v4()),
                    flashes: Vec::new(),
                    expires_at: Utc::now() - Duration::minutes(1),
                },
                60,
            )
            .await
            .unwrap();
        let manager = manager(store.clone());

        let (id, session) = manager.load(&jar_with("stale")).await.unwrap();
        assert!(id.is_none());
        assert!(!session.is_authenticated());
        assert_eq!(store.len().await, 0);
    }
}
