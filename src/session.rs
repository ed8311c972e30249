use std::{
    collections::HashSet,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        watch,
    },
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    error::{PortalError, ValidationError},
    models::{Role, UserIdentity},
    prompt::{Confirmation, Notice, Notifier, PendingAction},
    provider::{AuthEvent, AuthProviderState},
};

/// RolePolicy
///
/// Data-driven source of the admin role: an identity is `Admin` when its id is
/// listed in configuration or the provider issued it an `admin` role claim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RolePolicy {
    admin_ids: HashSet<Uuid>,
}

impl RolePolicy {
    pub fn new(admin_ids: impl IntoIterator<Item = Uuid>) -> Self {
        Self {
            admin_ids: admin_ids.into_iter().collect(),
        }
    }

    pub fn role_for(&self, identity: &UserIdentity) -> Role {
        let claimed = identity
            .role_claim
            .as_deref()
            .is_some_and(|claim| claim.eq_ignore_ascii_case("admin"));

        if claimed || self.admin_ids.contains(&identity.id) {
            Role::Admin
        } else {
            Role::Viewer
        }
    }
}

/// Session
///
/// The current identity and the role derived from it. The two are only ever
/// constructed together through `resolve`, so the role cannot go stale
/// relative to the identity it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    identity: Option<UserIdentity>,
    role: Role,
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn resolve(identity: Option<UserIdentity>, policy: &RolePolicy) -> Self {
        let role = identity
            .as_ref()
            .map(|id| policy.role_for(id))
            .unwrap_or_default();
        Self { identity, role }
    }

    pub fn identity(&self) -> Option<&UserIdentity> {
        self.identity.as_ref()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_admin(&self) -> bool {
        self.identity.is_some() && self.role == Role::Admin
    }
}

/// SessionHandle
///
/// Read-only view of the session, passed explicitly into every store and
/// controller that needs it. Queries read the session at call time, never a
/// captured copy.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    rx: watch::Receiver<Session>,
}

impl SessionHandle {
    /// A handle pinned to one session, e.g. the caller of a single HTTP request.
    pub fn fixed(session: Session) -> Self {
        let (_tx, rx) = watch::channel(session);
        Self { rx }
    }

    pub fn current(&self) -> Session {
        self.rx.borrow().clone()
    }

    pub fn identity_id(&self) -> Option<Uuid> {
        self.rx.borrow().identity().map(|identity| identity.id)
    }

    /// Waits for the next session replacement. `None` once the owning
    /// `AuthSession` is gone.
    pub async fn changed(&mut self) -> Option<Session> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    SignedOut,
    Cancelled,
}

/// AuthSession
///
/// Owns the current session. Initialization does exactly one lookup of an
/// already-established provider session; afterwards every provider event
/// replaces the session atomically and wakes all handles at once.
pub struct AuthSession {
    provider: AuthProviderState,
    policy: Arc<RolePolicy>,
    state: Arc<watch::Sender<Session>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl AuthSession {
    pub async fn init(provider: AuthProviderState, policy: RolePolicy) -> Self {
        let policy = Arc::new(policy);

        // Subscribe first so an event racing the lookup is not lost.
        let events = provider.subscribe();

        let identity = match provider.current_session().await {
            Ok(found) => found.map(|session| session.identity),
            Err(e) => {
                tracing::warn!(error = %e, "initial session lookup failed, starting signed out");
                None
            }
        };

        let session = Session::resolve(identity, &policy);
        tracing::info!(
            authenticated = session.identity().is_some(),
            role = ?session.role(),
            "auth session initialized"
        );

        let (tx, _rx) = watch::channel(session);
        let state = Arc::new(tx);
        let listener = spawn_listener(events, state.clone(), policy.clone());

        Self {
            provider,
            policy,
            state,
            listener: Mutex::new(Some(listener)),
        }
    }

    pub fn session(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            rx: self.state.subscribe(),
        }
    }

    pub fn policy(&self) -> &RolePolicy {
        &self.policy
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, PortalError> {
        ValidationError::require("email", email)?;
        ValidationError::require("password", password)?;

        let granted = self.provider.sign_in_with_password(email, password).await?;
        tracing::info!(user_id = %granted.identity.id, "login accepted by provider");
        Ok(granted.identity)
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserIdentity, PortalError> {
        ValidationError::require("email", email)?;
        ValidationError::require("password", password)?;
        ValidationError::require("full_name", full_name)?;

        let identity = self.provider.sign_up(email, password, full_name).await?;
        tracing::info!(user_id = %identity.id, "registration accepted by provider");
        Ok(identity)
    }

    /// logout
    ///
    /// Asks for confirmation, signs out remotely, then tells the user. The
    /// session itself flips when the provider's sign-out event is delivered,
    /// which may be after the notice.
    pub async fn logout(
        &self,
        confirmation: &dyn Confirmation,
        notifier: &dyn Notifier,
    ) -> Result<LogoutOutcome, PortalError> {
        if !confirmation
            .request_confirmation(&PendingAction::SignOut)
            .await
        {
            return Ok(LogoutOutcome::Cancelled);
        }

        self.provider.sign_out().await?;
        notifier.notify(Notice::success("You have been signed out."));
        Ok(LogoutOutcome::SignedOut)
    }

    /// Replaces the provider subscription with a fresh one.
    pub fn resubscribe(&self) {
        let events = self.provider.subscribe();
        let next = spawn_listener(events, self.state.clone(), self.policy.clone());
        let previous = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(next);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    /// Drops the provider subscription. Safe to call any number of times.
    pub fn teardown(&self) {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(listener) = listener {
            listener.abort();
            tracing::debug!("auth session unsubscribed from provider");
        }
    }
}

impl Drop for AuthSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_listener(
    mut events: broadcast::Receiver<AuthEvent>,
    state: Arc<watch::Sender<Session>>,
    policy: Arc<RolePolicy>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let session = Session::resolve(event.identity, &policy);
                    tracing::info!(
                        kind = ?event.kind,
                        authenticated = session.identity().is_some(),
                        role = ?session.role(),
                        "session replaced"
                    );
                    state.send_replace(session);
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "auth event stream lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}
