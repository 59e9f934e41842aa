//! Client-side session lifecycle
//!
//! [`Session`] owns the token store, the refresh scheduler and the request
//! gateway, and exposes the operations the view layer drives: restore on
//! startup, login, logout, and authenticated requests.

pub mod codec;
pub mod error;
pub mod gateway;
pub mod navigator;
pub mod scheduler;
pub mod storage;
pub mod store;

pub use codec::{Claims, DecodeError};
pub use error::{GatewayError, LoginError, RefreshError};
pub use gateway::{ApiRequest, RequestGateway, is_public_endpoint};
pub use navigator::{Navigator, NoopNavigator, RecordingNavigator};
pub use scheduler::{RefreshPolicy, RefreshScheduler, SchedulerState};
pub use storage::{FileTokenStorage, MemoryTokenStorage, PersistedTokens, TokenStorage};
pub use store::{Identity, SessionSnapshot, SessionStore};

pub use crate::types::LoginRequest as Credentials;

use crate::client::ApiClient;
use crate::client::error::ClientError;
use campus_core::{ClientConfig, RouteConfig};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Result of a successful login
#[derive(Debug, Clone, PartialEq)]
pub struct LoginOutcome {
    pub user: Identity,
    /// Where the view layer should go next
    pub redirect_to: String,
}

/// The process-wide session
pub struct Session {
    config: ClientConfig,
    client: ApiClient,
    store: Arc<SessionStore>,
    scheduler: Arc<RefreshScheduler>,
    gateway: RequestGateway,
}

impl Session {
    pub fn new(
        config: ClientConfig,
        storage: Arc<dyn TokenStorage>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let client = ApiClient::from_config(&config.api)?;
        let store = Arc::new(SessionStore::new(storage));
        let policy = RefreshPolicy {
            skew: config.session.refresh_skew(),
            timeout: config.api.refresh_timeout(),
            login_path: config.routes.login.clone(),
        };
        let scheduler = Arc::new(RefreshScheduler::new(
            client.clone(),
            Arc::clone(&store),
            navigator,
            policy,
        ));
        let gateway = RequestGateway::new(client.clone(), Arc::clone(&store), Arc::clone(&scheduler));

        Ok(Self {
            config,
            client,
            store,
            scheduler,
            gateway,
        })
    }

    /// Build a session whose storage follows `session.storage_path`
    pub fn from_config(
        config: ClientConfig,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ClientError> {
        let storage: Arc<dyn TokenStorage> = match &config.session.storage_path {
            Some(path) => Arc::new(FileTokenStorage::new(path)),
            None => Arc::new(MemoryTokenStorage::new()),
        };
        Self::new(config, storage, navigator)
    }

    /// Rebuild the session from persisted tokens
    ///
    /// Always ends with the session marked ready, whatever fails on the way.
    pub async fn restore(&self) {
        let persisted = self.store.load_persisted();

        if let Some(access) = persisted.access {
            if codec::is_expired(&access, codec::now_millis()) {
                debug!("persisted access token expired, refreshing");
                // Failure has already logged the session out.
                let _ = self.scheduler.refresh_now().await;
            } else {
                self.scheduler.schedule();
                self.load_profile(&access).await;
            }
        }

        self.store.mark_ready();
        debug!(authenticated = self.store.snapshot().authenticated, "session restored");
    }

    /// Exchange credentials for a session
    ///
    /// On failure the previous session state is left exactly as it was.
    pub async fn login(
        &self,
        credentials: &Credentials,
        from: Option<&str>,
    ) -> Result<LoginOutcome, LoginError> {
        if credentials.email.trim().is_empty() || credentials.password.is_empty() {
            return Err(LoginError::MissingCredentials);
        }

        let response = self
            .client
            .login(credentials, self.config.api.login_timeout())
            .await
            .map_err(|e| {
                warn!(error = %e, "login request failed");
                LoginError::from(e)
            })?;

        let (Some(access), Some(refresh)) = (response.access, response.refresh) else {
            warn!("login response is missing a token");
            return Err(LoginError::InvalidResponse);
        };
        let claims = codec::decode(&access).map_err(|e| {
            warn!(error = %e, "login returned an unreadable access token");
            LoginError::InvalidResponse
        })?;

        let mut user = Identity::from_claims(&claims);
        if let Some(profile) = response.user {
            user = user.with_profile(profile);
        }

        self.store.establish(access, refresh, user.clone());
        self.scheduler.schedule();

        let redirect_to = redirect_target(&self.config.routes, &user, from);
        info!(user_id = ?user.id, role = ?user.role, "logged in");
        Ok(LoginOutcome { user, redirect_to })
    }

    /// Drop the session locally; the backend is not contacted
    pub fn logout(&self) {
        self.scheduler.cancel();
        self.store.clear();
        info!("logged out");
    }

    /// Refresh now, joining any refresh already in flight
    pub async fn refresh_now(&self) -> Result<String, RefreshError> {
        self.scheduler.refresh_now().await
    }

    /// Authenticated request path
    pub const fn gateway(&self) -> &RequestGateway {
        &self.gateway
    }

    pub fn user(&self) -> Option<Identity> {
        self.store.identity()
    }

    /// True until [`Session::restore`] finished
    pub fn is_loading(&self) -> bool {
        !self.store.is_ready()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.store.subscribe()
    }

    pub fn scheduler_state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    async fn load_profile(&self, access: &str) {
        let epoch = self.store.epoch();
        match self.client.profile(access).await {
            Ok(profile) => {
                if let Some(identity) = self.store.identity() {
                    self.store.set_identity(epoch, identity.with_profile(profile));
                }
            }
            Err(e) if e.status() == Some(401) => {
                debug!("profile rejected the restored token, refreshing");
                let _ = self.scheduler.refresh_now().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to load profile, clearing session");
                self.logout();
            }
        }
    }
}

/// Where to land after login: vendors go to their dashboard, everyone else
/// back to the page they were sent away from, or home.
pub fn redirect_target(routes: &RouteConfig, user: &Identity, from: Option<&str>) -> String {
    if user.is_vendor() {
        return routes.vendor_dashboard.clone();
    }
    from.filter(|path| !path.is_empty() && *path != routes.login)
        .map_or_else(|| routes.home.clone(), str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with_role(role: &str) -> Identity {
        Identity {
            role: Some(role.to_string()),
            ..Identity::default()
        }
    }

    #[test]
    fn test_vendor_goes_to_dashboard() {
        let routes = RouteConfig::default();
        assert_eq!(
            redirect_target(&routes, &user_with_role("vendor"), Some("/cart")),
            "/vendor/dashboard"
        );
    }

    #[test]
    fn test_customer_returns_to_origin_or_home() {
        let routes = RouteConfig::default();
        let customer = user_with_role("customer");
        assert_eq!(redirect_target(&routes, &customer, Some("/checkout")), "/checkout");
        assert_eq!(redirect_target(&routes, &customer, None), "/home");
        assert_eq!(redirect_target(&routes, &customer, Some("")), "/home");
        assert_eq!(redirect_target(&routes, &customer, Some("/login")), "/home");
    }
}
