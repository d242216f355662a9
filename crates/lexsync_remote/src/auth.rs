//! Auth session handling.
//!
//! Every remote operation batch must carry a non-expired session. The
//! engine calls [`fresh_session`] before each call; it refreshes
//! proactively when the token is close to expiry so a long-running sync
//! survives a token refresh mid-run.

use crate::error::{RemoteError, RemoteResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration as TimeDelta, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

/// An authenticated session against the backend.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthSession {
    /// Bearer token sent with every request.
    pub access_token: String,
    /// The authenticated user.
    pub user_id: Uuid,
    /// Token expiry.
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    /// True when the session expires within the given leeway.
    pub fn expires_within(&self, leeway: std::time::Duration) -> bool {
        let leeway = TimeDelta::seconds(leeway.as_secs() as i64);
        self.expires_at - Utc::now() <= leeway
    }
}

/// Source of auth sessions.
///
/// Implemented by the embedding application over whatever identity
/// provider it uses; the engine only needs "current session" and
/// "refresh".
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Returns the current session, if any.
    async fn session(&self) -> RemoteResult<Option<AuthSession>>;

    /// Refreshes and returns a new session.
    async fn refresh(&self) -> RemoteResult<AuthSession>;
}

/// Returns a session guaranteed to outlive `leeway`, refreshing if needed.
///
/// Fails fast with [`RemoteError::SessionExpired`] when no session exists
/// or the refresh does not produce a usable one.
pub async fn fresh_session(
    provider: &dyn SessionProvider,
    leeway: std::time::Duration,
) -> RemoteResult<AuthSession> {
    match provider.session().await? {
        Some(session) if !session.expires_within(leeway) => Ok(session),
        Some(_) => {
            tracing::debug!("auth session close to expiry, refreshing");
            let refreshed = provider.refresh().await?;
            if refreshed.expires_within(leeway) {
                Err(RemoteError::SessionExpired)
            } else {
                Ok(refreshed)
            }
        }
        None => Err(RemoteError::SessionExpired),
    }
}

/// A scripted session provider for tests.
pub struct StaticSessions {
    current: Mutex<Option<AuthSession>>,
    refreshed: Mutex<Option<AuthSession>>,
    fail_refresh: AtomicBool,
    refresh_calls: AtomicU64,
}

impl StaticSessions {
    /// Creates a provider holding a session valid for one hour.
    pub fn logged_in(user_id: Uuid) -> Self {
        Self::with_session(AuthSession {
            access_token: "token-0".into(),
            user_id,
            expires_at: Utc::now() + TimeDelta::hours(1),
        })
    }

    /// Creates a provider holding the given session.
    pub fn with_session(session: AuthSession) -> Self {
        Self {
            current: Mutex::new(Some(session)),
            refreshed: Mutex::new(None),
            fail_refresh: AtomicBool::new(false),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Creates a provider with no session at all.
    pub fn logged_out() -> Self {
        Self {
            current: Mutex::new(None),
            refreshed: Mutex::new(None),
            fail_refresh: AtomicBool::new(false),
            refresh_calls: AtomicU64::new(0),
        }
    }

    /// Marks the current session as already expired.
    pub fn expire_now(&self) {
        if let Some(session) = self.current.lock().as_mut() {
            session.expires_at = Utc::now() - TimeDelta::seconds(1);
        }
    }

    /// Sets the session that the next refresh will produce.
    pub fn refresh_into(&self, session: AuthSession) {
        *self.refreshed.lock() = Some(session);
    }

    /// Makes every refresh fail.
    pub fn fail_refresh(&self) {
        self.fail_refresh.store(true, Ordering::SeqCst);
    }

    /// Number of refresh calls observed.
    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for StaticSessions {
    async fn session(&self) -> RemoteResult<Option<AuthSession>> {
        Ok(self.current.lock().clone())
    }

    async fn refresh(&self) -> RemoteResult<AuthSession> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(RemoteError::SessionExpired);
        }

        let user_id = self
            .current
            .lock()
            .as_ref()
            .map(|s| s.user_id)
            .unwrap_or_else(Uuid::nil);

        let next = self.refreshed.lock().take().unwrap_or(AuthSession {
            access_token: format!("token-{}", self.refresh_calls()),
            user_id,
            expires_at: Utc::now() + TimeDelta::hours(1),
        });

        *self.current.lock() = Some(next.clone());
        Ok(next)
    }
}
