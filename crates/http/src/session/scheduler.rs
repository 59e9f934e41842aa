//! Proactive access token refresh
//!
//! One timer per session, armed `skew` before the current access token
//! expires. Every refresh, whether fired by the timer or requested by the
//! gateway after a 401, goes through [`RefreshScheduler::refresh_now`], which
//! coalesces overlapping triggers onto a single backend call.

use super::codec;
use super::error::RefreshError;
use super::navigator::Navigator;
use super::store::SessionStore;
use crate::client::ApiClient;
use crate::types::RefreshRequest;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type SharedRefresh = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// Where the scheduler stands for the current access token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No token to schedule against
    Idle,
    /// Timer armed
    Scheduled { fires_at: DateTime<Utc> },
    /// A refresh call is in flight
    Refreshing,
}

struct Timer {
    generation: u64,
    fires_at: DateTime<Utc>,
    handle: JoinHandle<()>,
}

/// Timing knobs for the scheduler
#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    /// Refresh this long before the access token expires
    pub skew: Duration,
    /// Bound on the refresh call itself
    pub timeout: Duration,
    /// Where to send the user when the session dies
    pub login_path: String,
}

pub struct RefreshScheduler {
    client: ApiClient,
    store: Arc<SessionStore>,
    navigator: Arc<dyn Navigator>,
    policy: RefreshPolicy,
    timer: Mutex<Option<Timer>>,
    generation: AtomicU64,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl RefreshScheduler {
    pub fn new(
        client: ApiClient,
        store: Arc<SessionStore>,
        navigator: Arc<dyn Navigator>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            client,
            store,
            navigator,
            policy,
            timer: Mutex::new(None),
            generation: AtomicU64::new(0),
            in_flight: Mutex::new(None),
        }
    }

    pub fn state(&self) -> SchedulerState {
        if lock(&self.in_flight).is_some() {
            return SchedulerState::Refreshing;
        }
        match lock(&self.timer).as_ref() {
            Some(timer) => SchedulerState::Scheduled {
                fires_at: timer.fires_at,
            },
            None => SchedulerState::Idle,
        }
    }

    /// Arm the timer for the current access token, replacing any armed one
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(self: &Arc<Self>) {
        let Some(access) = self.store.access_token() else {
            self.cancel();
            return;
        };

        let now = codec::now_millis();
        let skew_ms = i64::try_from(self.policy.skew.as_millis()).unwrap_or(i64::MAX);
        // An unreadable token is treated as already expired.
        let delay_ms = codec::expiry_millis(&access)
            .map_or(0, |expiry| expiry.saturating_sub(now).saturating_sub(skew_ms))
            .max(0);
        let delay = Duration::from_millis(delay_ms.unsigned_abs());
        let fires_at = chrono::Duration::try_milliseconds(delay_ms)
            .and_then(|delay| Utc::now().checked_add_signed(delay))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let weak: Weak<Self> = Arc::downgrade(self);

        let mut slot = lock(&self.timer);
        if let Some(previous) = slot.take() {
            previous.handle.abort();
        }

        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(scheduler) = weak.upgrade() else {
                return;
            };
            if !scheduler.claim_timer(generation) {
                return;
            }
            debug!(generation, "refresh timer fired");
            // Failures are handled inside the refresh path.
            let _ = scheduler.refresh_now().await;
        });

        debug!(generation, delay_ms, "refresh timer armed");
        *slot = Some(Timer {
            generation,
            fires_at,
            handle,
        });
    }

    /// Disarm the timer, if any
    pub fn cancel(&self) {
        if let Some(timer) = lock(&self.timer).take() {
            debug!(generation = timer.generation, "refresh timer cancelled");
            timer.handle.abort();
        }
    }

    /// Refresh the access token now, or join the refresh already in flight
    ///
    /// All callers that overlap with one refresh observe its single outcome.
    /// On failure the session has already been logged out and redirected.
    pub async fn refresh_now(self: &Arc<Self>) -> Result<String, RefreshError> {
        let shared = {
            let mut slot = lock(&self.in_flight);
            if let Some(existing) = slot.as_ref() {
                debug!("joining in-flight refresh");
                existing.clone()
            } else {
                let epoch = self.store.epoch();
                let scheduler = Arc::clone(self);
                let task = tokio::spawn(async move {
                    let _slot = InFlightSlot(Arc::clone(&scheduler));
                    scheduler.perform_refresh().await
                });
                let scheduler = Arc::clone(self);
                let shared = async move {
                    match task.await {
                        Ok(outcome) => outcome,
                        Err(e) => {
                            warn!(error = %e, "refresh task aborted");
                            if scheduler.store.epoch() == epoch {
                                scheduler.force_logout();
                            }
                            Err(RefreshError::Aborted(e.to_string()))
                        }
                    }
                }
                .boxed()
                .shared();
                *slot = Some(shared.clone());
                shared
            }
        };

        shared.await
    }

    /// Clear the session and send the user to the login screen
    pub(crate) fn force_logout(&self) {
        warn!("session is no longer usable, logging out");
        self.cancel();
        self.store.clear();
        self.navigator.redirect(&self.policy.login_path);
    }

    fn claim_timer(&self, generation: u64) -> bool {
        let mut slot = lock(&self.timer);
        match slot.as_ref() {
            Some(timer) if timer.generation == generation => {
                *slot = None;
                true
            }
            _ => false,
        }
    }

    async fn perform_refresh(self: &Arc<Self>) -> Result<String, RefreshError> {
        let epoch = self.store.epoch();

        match self.request_new_tokens(epoch).await {
            Ok(access) => {
                info!("access token refreshed");
                self.schedule();
                self.spawn_profile_reload(epoch, access.clone());
                Ok(access)
            }
            Err(RefreshError::Superseded) => {
                debug!("refresh result discarded, session changed meanwhile");
                Err(RefreshError::Superseded)
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                if self.store.epoch() == epoch {
                    self.force_logout();
                }
                Err(e)
            }
        }
    }

    async fn request_new_tokens(&self, epoch: u64) -> Result<String, RefreshError> {
        let refresh = self
            .store
            .refresh_token()
            .ok_or(RefreshError::MissingRefreshToken)?;
        if codec::is_expired(&refresh, codec::now_millis()) {
            return Err(RefreshError::RefreshTokenExpired);
        }

        let response = self
            .client
            .refresh(&RefreshRequest { refresh }, self.policy.timeout)
            .await?;

        let access = response
            .access
            .filter(|token| codec::expiry_millis(token).is_some())
            .ok_or(RefreshError::InvalidResponse)?;

        if self.store.set_tokens(epoch, access.clone(), response.refresh) {
            Ok(access)
        } else {
            Err(RefreshError::Superseded)
        }
    }

    fn spawn_profile_reload(&self, epoch: u64, access: String) {
        let client = self.client.clone();
        let store = Arc::clone(&self.store);
        tokio::spawn(async move {
            match client.profile(&access).await {
                Ok(profile) => {
                    if let Some(identity) = store.identity() {
                        store.set_identity(epoch, identity.with_profile(profile));
                    }
                }
                Err(e) => warn!(error = %e, "failed to reload profile after refresh"),
            }
        });
    }
}

/// Frees the in-flight slot when the refresh task ends, panics included
struct InFlightSlot(Arc<RefreshScheduler>);

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        *lock(&self.0.in_flight) = None;
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
