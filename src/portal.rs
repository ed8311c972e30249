use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;

use crate::{
    error::PortalError,
    models::{
        Complaint, ComplaintDraft, LostFoundDraft, LostFoundItem, UserIdentity, VolunteerDraft,
        VolunteerRegistration,
    },
    moderation::ModerationController,
    navigation::{NavigationRoleGate, View},
    prompt::{Confirmation, Notice, Notifier},
    provider::AuthProviderState,
    repository::Collections,
    session::{AuthSession, LogoutOutcome, RolePolicy, Session},
    storage::{StorageState, StorageUploader, UploadFile},
    store::ResourceStore,
};

/// Portal
///
/// Client-side composition root: one `AuthSession`, the navigation gate, the
/// three member-facing stores, the moderation controller and the uploader.
/// A follower task re-evaluates the gate and reloads the stores on every
/// session change.
pub struct Portal {
    auth: AuthSession,
    shared: Arc<Shared>,
    follower: Mutex<Option<JoinHandle<()>>>,
}

struct Shared {
    gate: Mutex<NavigationRoleGate>,
    complaints: ResourceStore<Complaint>,
    lost_found: ResourceStore<LostFoundItem>,
    volunteers: ResourceStore<VolunteerRegistration>,
    moderation: ModerationController,
    uploader: StorageUploader,
    notifier: Arc<dyn Notifier>,
}

impl Portal {
    /// start
    ///
    /// 1. Initialize the auth session (one lookup of an existing session).
    /// 2. Build the gate and stores around a handle to that session.
    /// 3. Load the initial lists, then follow session changes.
    pub async fn start(
        provider: AuthProviderState,
        policy: RolePolicy,
        collections: Collections,
        storage: StorageState,
        confirmation: Arc<dyn Confirmation>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let auth = AuthSession::init(provider, policy).await;
        let handle = auth.handle();
        let session = handle.current();

        let shared = Arc::new(Shared {
            gate: Mutex::new(NavigationRoleGate::new(&session)),
            complaints: ResourceStore::owned(collections.complaints.clone(), handle.clone()),
            lost_found: ResourceStore::owned(collections.lost_found.clone(), handle.clone()),
            volunteers: ResourceStore::owned(collections.volunteers.clone(), handle.clone()),
            moderation: ModerationController::new(&collections, handle.clone(), confirmation),
            uploader: StorageUploader::new(storage),
            notifier,
        });

        shared.reload(&session).await;

        let follower = {
            let shared = shared.clone();
            let mut handle = handle;
            tokio::spawn(async move {
                while let Some(session) = handle.changed().await {
                    let view = shared.gate().on_session_change(&session);
                    tracing::debug!(?view, "navigation re-evaluated after session change");
                    shared.reload(&session).await;
                }
            })
        };

        Self {
            auth,
            shared,
            follower: Mutex::new(Some(follower)),
        }
    }

    pub fn auth(&self) -> &AuthSession {
        &self.auth
    }

    pub fn session(&self) -> Session {
        self.auth.session()
    }

    /// The view to draw now, re-checked against the current role.
    pub fn active_view(&self) -> View {
        self.shared.gate().render(&self.session())
    }

    pub fn select_view(&self, requested: View) -> View {
        self.shared.gate().select(requested, &self.session())
    }

    pub fn reachable_views(&self) -> Vec<View> {
        NavigationRoleGate::reachable_views(&self.session())
    }

    pub fn complaints(&self) -> &ResourceStore<Complaint> {
        &self.shared.complaints
    }

    pub fn lost_found(&self) -> &ResourceStore<LostFoundItem> {
        &self.shared.lost_found
    }

    pub fn volunteers(&self) -> &ResourceStore<VolunteerRegistration> {
        &self.shared.volunteers
    }

    pub fn moderation(&self) -> &ModerationController {
        &self.shared.moderation
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserIdentity, PortalError> {
        let result = self.auth.login(email, password).await;
        self.shared.report(&result, "Signed in.");
        result
    }

    pub async fn register(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserIdentity, PortalError> {
        let result = self.auth.register(email, password, full_name).await;
        self.shared
            .report(&result, "Registration successful. Please sign in.");
        result
    }

    pub async fn logout(&self, confirmation: &dyn Confirmation) -> Result<LogoutOutcome, PortalError> {
        let result = self
            .auth
            .logout(confirmation, self.shared.notifier.as_ref())
            .await;
        if let Err(e) = &result {
            self.shared.notifier.notify(Notice::error(e.to_string()));
        }
        result
    }

    pub async fn submit_complaint(&self, draft: ComplaintDraft) -> Result<(), PortalError> {
        let result = self.shared.complaints.create(draft).await;
        self.shared.report(&result, "Complaint submitted.");
        result
    }

    pub async fn report_item(
        &self,
        draft: LostFoundDraft,
        image: Option<UploadFile>,
    ) -> Result<(), PortalError> {
        let result = self
            .shared
            .lost_found
            .create_with_image(draft, image, &self.shared.uploader)
            .await;
        self.shared.report(&result, "Item reported.");
        result
    }

    pub async fn register_volunteer(&self, draft: VolunteerDraft) -> Result<(), PortalError> {
        let result = self.shared.volunteers.create(draft).await;
        self.shared.report(&result, "Registration received.");
        result
    }

    /// Stops following session changes and drops the provider subscription.
    /// Safe to call more than once.
    pub fn teardown(&self) {
        let follower = self
            .follower
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(follower) = follower {
            follower.abort();
        }
        self.auth.teardown();
    }
}

impl Drop for Portal {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl Shared {
    fn gate(&self) -> std::sync::MutexGuard<'_, NavigationRoleGate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reloads every store visible to `session`. Signed out, the member stores
    /// clear themselves without a remote call.
    async fn reload(&self, session: &Session) {
        let (complaints, lost_found, volunteers) = tokio::join!(
            self.complaints.list(),
            self.lost_found.list(),
            self.volunteers.list()
        );
        for result in [complaints.err(), lost_found.err(), volunteers.err()]
            .into_iter()
            .flatten()
        {
            self.report_reload_error(result);
        }

        if session.is_admin() {
            if let Err(e) = self.moderation.refresh_all().await {
                self.report_reload_error(e);
            }
        }
    }

    fn report_reload_error(&self, error: PortalError) {
        match error {
            // A newer session change is already on its way.
            PortalError::StaleSession | PortalError::Forbidden => {
                tracing::debug!(error = %error, "reload superseded");
            }
            other => self.notifier.notify(Notice::error(other.to_string())),
        }
    }

    fn report<T>(&self, result: &Result<T, PortalError>, success: &str) {
        match result {
            Ok(_) => self.notifier.notify(Notice::success(success)),
            Err(e) => self.notifier.notify(Notice::error(e.to_string())),
        }
    }
}
