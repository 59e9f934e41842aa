//! In-memory session state mirrored to durable storage
//!
//! Every mutation updates memory and storage under one lock, memory first,
//! then publishes a [`SessionSnapshot`] to subscribers.

use super::codec::{self, Claims};
use super::storage::{PersistedTokens, TokenStorage};
use crate::types::UserProfile;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{debug, warn};

/// Role that lands on the vendor dashboard after login
pub const VENDOR_ROLE: &str = "vendor";

/// Who the session belongs to
///
/// Derived from the access token claims and enriched with the backend
/// profile; never authoritative on its own.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub full_name: Option<String>,
    /// Last profile fetched from the backend
    pub profile: Option<UserProfile>,
}

impl Identity {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            id: claims.subject(),
            email: claims.email.clone(),
            role: claims.role.clone(),
            full_name: None,
            profile: None,
        }
    }

    /// Overlay the fields the profile provides
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        if self.id.is_none() {
            self.id = profile.id.as_ref().map(|id| match id {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            });
        }
        if profile.email.is_some() {
            self.email.clone_from(&profile.email);
        }
        if profile.role.is_some() {
            self.role.clone_from(&profile.role);
        }
        if profile.full_name.is_some() {
            self.full_name.clone_from(&profile.full_name);
        }
        self.profile = Some(profile);
        self
    }

    pub fn is_vendor(&self) -> bool {
        self.role.as_deref() == Some(VENDOR_ROLE)
    }
}

/// What the view layer sees
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionSnapshot {
    pub identity: Option<Identity>,
    /// False until the initial restore finished
    pub ready: bool,
    pub authenticated: bool,
}

#[derive(Debug, Default)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    identity: Option<Identity>,
    ready: bool,
    /// Bumped on every login and logout
    epoch: u64,
}

impl SessionState {
    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            identity: self.identity.clone(),
            ready: self.ready,
            authenticated: self.access_token.is_some(),
        }
    }

    fn persisted(&self) -> PersistedTokens {
        PersistedTokens {
            access: self.access_token.clone(),
            refresh: self.refresh_token.clone(),
        }
    }
}

/// Holds the current tokens, identity and readiness
pub struct SessionStore {
    state: Mutex<SessionState>,
    storage: Arc<dyn TokenStorage>,
    updates: watch::Sender<SessionSnapshot>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
        let (updates, _) = watch::channel(SessionSnapshot::default());
        Self {
            state: Mutex::new(SessionState::default()),
            storage,
            updates,
        }
    }

    /// Pull persisted tokens into memory
    ///
    /// An access token without a refresh token is discarded. Identity is
    /// derived only when the access token is still valid.
    pub fn load_persisted(&self) -> PersistedTokens {
        let persisted = match self.storage.load() {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, "failed to read persisted tokens, starting empty");
                PersistedTokens::default()
            }
        };

        let mut state = self.lock();
        state.refresh_token = persisted.refresh;
        state.access_token = if state.refresh_token.is_some() {
            persisted.access
        } else {
            if persisted.access.is_some() {
                warn!("discarding persisted access token without a refresh token");
            }
            None
        };
        state.identity = state
            .access_token
            .as_deref()
            .and_then(|token| valid_identity(token, codec::now_millis()));

        if state.access_token.is_none() && state.refresh_token.is_none() {
            // Drop any stray half of a pair.
            if let Err(e) = self.storage.clear() {
                warn!(error = %e, "failed to clear persisted tokens");
            }
        }

        let loaded = state.persisted();
        self.publish(&state);
        loaded
    }

    /// Install a freshly issued session, starting a new epoch
    pub fn establish(&self, access: String, refresh: String, identity: Identity) -> u64 {
        let mut state = self.lock();
        state.epoch += 1;
        state.access_token = Some(access);
        state.refresh_token = Some(refresh);
        state.identity = Some(identity);
        state.ready = true;
        self.persist(&state);
        self.publish(&state);
        debug!(epoch = state.epoch, "session established");
        state.epoch
    }

    /// Rotate tokens within `epoch`
    ///
    /// Returns false, changing nothing, when the session moved on (logout or
    /// a new login) since `epoch` was observed.
    pub fn set_tokens(&self, epoch: u64, access: String, refresh: Option<String>) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch {
            debug!(expected = epoch, current = state.epoch, "ignoring stale token update");
            return false;
        }

        let identity = codec::decode(&access).ok().map(|claims| {
            let derived = Identity::from_claims(&claims);
            // Keep profile details while the user stays the same.
            match state.identity.take() {
                Some(previous) if previous.id == derived.id => match previous.profile {
                    Some(profile) => derived.with_profile(profile),
                    None => derived,
                },
                _ => derived,
            }
        });

        state.access_token = Some(access);
        if refresh.is_some() {
            state.refresh_token = refresh;
        }
        state.identity = identity;
        self.persist(&state);
        self.publish(&state);
        true
    }

    /// Replace the identity within `epoch`
    pub fn set_identity(&self, epoch: u64, identity: Identity) -> bool {
        let mut state = self.lock();
        if state.epoch != epoch || state.access_token.is_none() {
            return false;
        }
        state.identity = Some(identity);
        self.publish(&state);
        true
    }

    /// Forget everything, in memory and on disk, starting a new epoch
    pub fn clear(&self) {
        let mut state = self.lock();
        state.epoch += 1;
        state.access_token = None;
        state.refresh_token = None;
        state.identity = None;
        state.ready = true;
        if let Err(e) = self.storage.clear() {
            warn!(error = %e, "failed to clear persisted tokens");
        }
        self.publish(&state);
    }

    /// Allow the view layer to render protected screens
    pub fn mark_ready(&self) {
        let mut state = self.lock();
        state.ready = true;
        self.publish(&state);
    }

    pub fn access_token(&self) -> Option<String> {
        self.lock().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.lock().refresh_token.clone()
    }

    pub fn identity(&self) -> Option<Identity> {
        self.lock().identity.clone()
    }

    pub fn epoch(&self) -> u64 {
        self.lock().epoch
    }

    pub fn is_ready(&self) -> bool {
        self.lock().ready
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.lock().snapshot()
    }

    /// Receiver notified after every change
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.updates.subscribe()
    }

    fn persist(&self, state: &SessionState) {
        if let Err(e) = self.storage.save(&state.persisted()) {
            warn!(error = %e, "failed to persist tokens; in-memory session remains active");
        }
    }

    fn publish(&self, state: &SessionState) {
        self.updates.send_replace(state.snapshot());
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Identity for `token` when it decodes and has not expired at `now_millis`
pub(crate) fn valid_identity(token: &str, now_millis: i64) -> Option<Identity> {
    if codec::is_expired(token, now_millis) {
        return None;
    }
    codec::decode(token).ok().map(|claims| Identity::from_claims(&claims))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::storage::{MemoryTokenStorage, MockTokenStorage};
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use campus_core::CoreError;
    use serde_json::json;

    fn token(user_id: u64, exp_offset_secs: i64) -> String {
        let exp = chrono::Utc::now().timestamp() + exp_offset_secs;
        let payload = json!({"user_id": user_id, "exp": exp, "email": "u@campus.test"});
        format!(
            "{}.{}.sig",
            URL_SAFE_NO_PAD.encode(b"{}"),
            URL_SAFE_NO_PAD.encode(payload.to_string())
        )
    }

    #[test]
    fn test_load_persisted_valid_token_derives_identity() {
        let access = token(5, 600);
        let storage = Arc::new(MemoryTokenStorage::with_tokens(Some(&access), Some("R1")));
        let store = SessionStore::new(storage);

        let loaded = store.load_persisted();
        assert_eq!(loaded.access.as_deref(), Some(access.as_str()));
        assert_eq!(store.identity().unwrap().id.as_deref(), Some("5"));
        assert!(!store.is_ready());
    }

    #[test]
    fn test_load_persisted_drops_access_without_refresh() {
        let storage = Arc::new(MemoryTokenStorage::with_tokens(Some(&token(5, 600)), None));
        let store = SessionStore::new(storage.clone());

        let loaded = store.load_persisted();
        assert!(loaded.is_empty());
        assert!(store.access_token().is_none());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_expired_access_has_no_identity() {
        let storage = Arc::new(MemoryTokenStorage::with_tokens(
            Some(&token(5, -10)),
            Some("R1"),
        ));
        let store = SessionStore::new(storage);
        store.load_persisted();
        assert!(store.access_token().is_some());
        assert!(store.identity().is_none());
    }

    #[test]
    fn test_set_tokens_rejects_stale_epoch() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let store = SessionStore::new(storage.clone());
        let epoch = store.establish(token(1, 600), "R1".into(), Identity::default());

        store.clear();
        assert!(!store.set_tokens(epoch, token(1, 900), Some("R2".into())));
        assert!(store.access_token().is_none());
        assert!(storage.load().unwrap().is_empty());
    }

    #[test]
    fn test_set_tokens_keeps_refresh_when_not_rotated() {
        let storage = Arc::new(MemoryTokenStorage::new());
        let store = SessionStore::new(storage.clone());
        let epoch = store.establish(token(1, 600), "R1".into(), Identity::default());

        let rotated = token(1, 900);
        assert!(store.set_tokens(epoch, rotated.clone(), None));
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
        assert_eq!(storage.load().unwrap().access.as_deref(), Some(rotated.as_str()));
    }

    #[test]
    fn test_set_tokens_keeps_profile_for_same_user() {
        let store = SessionStore::new(Arc::new(MemoryTokenStorage::new()));
        let profile = UserProfile {
            full_name: Some("Ada Wanjiru".into()),
            role: Some("vendor".into()),
            ..UserProfile::default()
        };
        let identity = Identity {
            id: Some("1".into()),
            ..Identity::default()
        }
        .with_profile(profile);
        let epoch = store.establish(token(1, 600), "R1".into(), identity);

        assert!(store.set_tokens(epoch, token(1, 900), None));
        let identity = store.identity().unwrap();
        assert_eq!(identity.full_name.as_deref(), Some("Ada Wanjiru"));
        assert!(identity.is_vendor());
    }

    #[test]
    fn test_subscribers_see_logout() {
        let store = SessionStore::new(Arc::new(MemoryTokenStorage::new()));
        let mut rx = store.subscribe();
        store.establish(token(1, 600), "R1".into(), Identity::default());
        assert!(rx.borrow_and_update().authenticated);

        store.clear();
        assert!(rx.has_changed().unwrap());
        let snapshot = rx.borrow_and_update().clone();
        assert!(!snapshot.authenticated);
        assert!(snapshot.identity.is_none());
        assert!(snapshot.ready);
    }

    #[test]
    fn test_storage_failure_keeps_memory_authoritative() {
        let mut storage = MockTokenStorage::new();
        storage
            .expect_save()
            .returning(|_| Err(CoreError::io_error("read-only filesystem")));
        let store = SessionStore::new(Arc::new(storage));

        store.establish(token(1, 600), "R1".into(), Identity::default());
        assert!(store.snapshot().authenticated);
        assert_eq!(store.refresh_token().as_deref(), Some("R1"));
    }
}
