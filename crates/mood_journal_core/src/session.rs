//! crates/mood_journal_core/src/session.rs
//!
//! The auth session monitor.
//!
//! Owns the sign-in state machine and keeps a simplified `AuthSnapshot` current.
//! The identity provider's cached user goes stale when the user verifies their email
//! out of band, so while a signed-in user is unverified a single cancellable task
//! re-reads the user on a fixed interval. The task starts when the state machine
//! enters `SignedInUnverified` and is cancelled the moment it leaves it.
//!
//! Identity errors during reconciliation are logged and never change state.

use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use parking_lot::Mutex;

use crate::domain::{AuthSnapshot, UserSession};
use crate::ports::{DeviceStore, IdentityResult, IdentityService};

/// Device key prefix for the durable "email verified" marker.
pub const VERIFIED_MARKER_PREFIX: &str = "auth/verified/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    pub poll_interval: Duration,
    /// Minimum time between two manual refreshes.
    pub refresh_cooldown: Duration,
    /// Disabled in development builds.
    pub throttle_refresh: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            refresh_cooldown: Duration::from_secs(30),
            throttle_refresh: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SignedInUnverified(UserSession),
    SignedInVerified(UserSession),
}

impl AuthState {
    pub fn user(&self) -> Option<&UserSession> {
        match self {
            AuthState::SignedOut => None,
            AuthState::SignedInUnverified(user) | AuthState::SignedInVerified(user) => Some(user),
        }
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, AuthState::SignedInVerified(_))
    }

    fn name(&self) -> &'static str {
        match self {
            AuthState::SignedOut => "signed-out",
            AuthState::SignedInUnverified(_) => "signed-in-unverified",
            AuthState::SignedInVerified(_) => "signed-in-verified",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshOutcome {
    Reconciled,
    Throttled,
    Offline,
    /// Nothing to reconcile: signed out or already verified.
    NotApplicable,
}

struct Inner {
    state: AuthState,
    poller: Option<CancellationToken>,
    last_manual_refresh: Option<Instant>,
}

pub struct AuthSessionMonitor {
    identity: Arc<dyn IdentityService>,
    device: Arc<dyn DeviceStore>,
    config: MonitorConfig,
    inner: Mutex<Inner>,
    connectivity: watch::Receiver<bool>,
    snapshot: watch::Sender<AuthSnapshot>,
    shutdown: CancellationToken,
}

//=========================================================================================
// Lifecycle
//=========================================================================================

impl AuthSessionMonitor {
    /// Builds the monitor in `SignedOut` and starts watching connectivity.
    pub fn create(
        identity: Arc<dyn IdentityService>,
        device: Arc<dyn DeviceStore>,
        connectivity: watch::Receiver<bool>,
        config: MonitorConfig,
    ) -> Arc<Self> {
        let is_online = *connectivity.borrow();
        let (snapshot, _) = watch::channel(AuthSnapshot {
            user: None,
            is_verified: false,
            is_online,
        });

        let monitor = Arc::new(Self {
            identity,
            device,
            config,
            inner: Mutex::new(Inner {
                state: AuthState::SignedOut,
                poller: None,
                last_manual_refresh: None,
            }),
            connectivity: connectivity.clone(),
            snapshot,
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::watch_connectivity(
            Arc::downgrade(&monitor),
            connectivity,
            monitor.shutdown.clone(),
        ));
        monitor
    }

    /// Adopts the identity provider's cached user, if any.
    ///
    /// A cached user still flagged unverified but carrying the durable verified
    /// marker is treated as verified.
    pub async fn restore(self: &Arc<Self>) -> AuthSnapshot {
        match self.identity.current_user().await {
            Ok(Some(user)) => {
                info!("Restoring session for user {}.", user.user_id);
                self.adopt(user, true).await;
                self.reconcile().await;
            }
            Ok(None) => self.transition(AuthState::SignedOut),
            Err(e) => {
                warn!("Could not read cached identity, starting signed out: {}", e);
                self.transition(AuthState::SignedOut);
            }
        }
        self.snapshot()
    }

    /// Cancels the reconciliation and connectivity tasks.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        if let Some(poller) = self.inner.lock().poller.take() {
            poller.cancel();
        }
        debug!("Auth session monitor disposed.");
    }

    async fn watch_connectivity(
        monitor: Weak<Self>,
        mut connectivity: watch::Receiver<bool>,
        shutdown: CancellationToken,
    ) {
        let mut was_online = *connectivity.borrow_and_update();
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                changed = connectivity.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *connectivity.borrow_and_update();
                    let Some(monitor) = monitor.upgrade() else { break };
                    monitor.publish();
                    if online && !was_online {
                        info!("Connectivity restored, reconciling session.");
                        monitor.reconcile().await;
                    }
                    was_online = online;
                }
            }
        }
    }
}

//=========================================================================================
// Public Operations
//=========================================================================================

impl AuthSessionMonitor {
    pub async fn sign_in(self: &Arc<Self>, email: &str, password: &str) -> IdentityResult<AuthSnapshot> {
        let user = self.identity.sign_in(email, password).await.map_err(|e| {
            warn!("Sign-in failed: {}", e);
            e
        })?;
        info!("Signed in as {}.", user.user_id);
        Ok(self.adopt(user, false).await)
    }

    /// Creates the account and sends the first verification email.
    pub async fn sign_up(self: &Arc<Self>, email: &str, password: &str) -> IdentityResult<AuthSnapshot> {
        let user = self.identity.sign_up(email, password).await.map_err(|e| {
            warn!("Sign-up failed: {}", e);
            e
        })?;
        info!("Signed up as {}.", user.user_id);
        if !user.email_verified {
            if let Err(e) = self.identity.send_verification_email().await {
                warn!("Could not send verification email: {}", e);
            }
        }
        Ok(self.adopt(user, false).await)
    }

    /// Signs out locally even if the provider call fails.
    pub async fn sign_out(self: &Arc<Self>) -> AuthSnapshot {
        if let Err(e) = self.identity.sign_out().await {
            warn!("Identity sign-out failed, clearing local session anyway: {}", e);
        }
        self.transition(AuthState::SignedOut);
        self.snapshot()
    }

    pub async fn send_verification_email(&self) -> IdentityResult<()> {
        self.identity.send_verification_email().await
    }

    pub async fn send_password_reset(&self, email: &str) -> IdentityResult<()> {
        self.identity.send_password_reset(email).await
    }

    /// A user-triggered re-check, throttled to one per cooldown window.
    pub async fn refresh_now(self: &Arc<Self>) -> RefreshOutcome {
        if self.pending_user().is_none() {
            return RefreshOutcome::NotApplicable;
        }
        if !self.is_online() {
            return RefreshOutcome::Offline;
        }
        if self.config.throttle_refresh {
            let now = Instant::now();
            let mut inner = self.inner.lock();
            if let Some(last) = inner.last_manual_refresh {
                if now.duration_since(last) < self.config.refresh_cooldown {
                    debug!("Manual refresh throttled.");
                    return RefreshOutcome::Throttled;
                }
            }
            inner.last_manual_refresh = Some(now);
        }
        self.reconcile().await;
        RefreshOutcome::Reconciled
    }

    pub fn state(&self) -> AuthState {
        self.inner.lock().state.clone()
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AuthSnapshot> {
        self.snapshot.subscribe()
    }

    /// Whether the reconciliation task is currently scheduled.
    pub fn is_reconciling(&self) -> bool {
        self.inner
            .lock()
            .poller
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }
}

//=========================================================================================
// State Machine
//=========================================================================================

impl AuthSessionMonitor {
    // `trust_marker` is only set for cached users, whose verified flag may be stale.
    async fn adopt(self: &Arc<Self>, user: UserSession, trust_marker: bool) -> AuthSnapshot {
        let next = if user.email_verified {
            self.write_marker(&user).await;
            AuthState::SignedInVerified(user)
        } else if trust_marker && self.has_marker(&user).await {
            AuthState::SignedInVerified(user)
        } else {
            AuthState::SignedInUnverified(user)
        };
        self.transition(next);
        self.snapshot()
    }

    fn transition(self: &Arc<Self>, next: AuthState) {
        {
            let mut inner = self.inner.lock();
            self.set_state(&mut inner, next);
        }
        self.publish();
    }

    // Starts or stops the reconciliation task according to the state being entered.
    fn set_state(self: &Arc<Self>, inner: &mut Inner, next: AuthState) {
        if matches!(next, AuthState::SignedInUnverified(_)) {
            if inner.poller.is_none() {
                inner.poller = Some(self.spawn_poller());
            }
        } else if let Some(poller) = inner.poller.take() {
            poller.cancel();
            debug!("Reconciliation stopped.");
        }
        if inner.state.name() != next.name() {
            info!("Auth state {} -> {}.", inner.state.name(), next.name());
        }
        inner.state = next;
    }

    fn publish(&self) {
        let snapshot = {
            let inner = self.inner.lock();
            AuthSnapshot {
                user: inner.state.user().cloned(),
                is_verified: inner.state.is_verified(),
                is_online: self.is_online(),
            }
        };
        self.snapshot.send_replace(snapshot);
    }

    fn pending_user(&self) -> Option<UserSession> {
        match &self.inner.lock().state {
            AuthState::SignedInUnverified(user) => Some(user.clone()),
            _ => None,
        }
    }

    fn spawn_poller(self: &Arc<Self>) -> CancellationToken {
        let token = self.shutdown.child_token();
        let cancelled = token.clone();
        let monitor = Arc::downgrade(self);
        let period = self.config.poll_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        let Some(monitor) = monitor.upgrade() else { break };
                        monitor.reconcile().await;
                    }
                }
            }
            debug!("Reconciliation task exited.");
        });
        debug!("Reconciliation started every {:?}.", period);
        token
    }

    /// Re-reads the user once. Offline ticks and provider errors leave state as is.
    async fn reconcile(self: &Arc<Self>) {
        let Some(pending) = self.pending_user() else {
            return;
        };
        if !self.is_online() {
            debug!("Offline, skipping reconciliation.");
            return;
        }

        match self.identity.reload_user().await {
            Ok(fresh) => {
                if let Some(verified) = self.apply_reload(&pending.user_id, fresh) {
                    info!("Email verified for user {}.", verified.user_id);
                    self.write_marker(&verified).await;
                }
            }
            Err(e) => warn!("Session reconciliation failed, will retry: {}", e),
        }
    }

    // Applies a reload result against the state at completion time. Returns the
    // user when this reload is the one that verified them.
    fn apply_reload(self: &Arc<Self>, expected: &str, fresh: Option<UserSession>) -> Option<UserSession> {
        let verified = {
            let mut inner = self.inner.lock();
            let still_pending = matches!(
                &inner.state,
                AuthState::SignedInUnverified(user) if user.user_id == expected
            );
            if !still_pending {
                debug!("Discarding reload result for a session that already changed.");
                return None;
            }

            let next = match fresh {
                None => {
                    info!("Identity provider reports no current user.");
                    AuthState::SignedOut
                }
                Some(user) if user.email_verified => AuthState::SignedInVerified(user),
                Some(user) => AuthState::SignedInUnverified(user),
            };
            let verified = match &next {
                AuthState::SignedInVerified(user) => Some(user.clone()),
                _ => None,
            };
            self.set_state(&mut inner, next);
            verified
        };
        self.publish();
        verified
    }

    async fn write_marker(&self, user: &UserSession) {
        let key = format!("{VERIFIED_MARKER_PREFIX}{}", user.user_id);
        if let Err(e) = self.device.set(&key, b"1").await {
            warn!("Failed to persist verified marker: {}", e);
        }
    }

    async fn has_marker(&self, user: &UserSession) -> bool {
        let key = format!("{VERIFIED_MARKER_PREFIX}{}", user.user_id);
        match self.device.get(&key).await {
            Ok(value) => value.is_some(),
            Err(e) => {
                warn!("Failed to read verified marker: {}", e);
                false
            }
        }
    }
}
