use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use crate::{error::AuthError, models::UserIdentity};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEventKind {
    SignedIn,
    SignedOut,
    TokenRefreshed,
}

/// AuthEvent
///
/// One entry of the provider's identity-change stream. `identity` is the
/// identity in effect after the event (`None` after a sign-out).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthEvent {
    pub kind: AuthEventKind,
    pub identity: Option<UserIdentity>,
}

/// ProviderSession
///
/// An established provider session: the identity plus the tokens that prove it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSession {
    pub identity: UserIdentity,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ProviderSession {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// AuthProvider
///
/// Contract for the external identity service. Implementations broadcast an
/// `AuthEvent` for every sign-in, sign-out and token refresh they perform;
/// dropping the receiver returned by `subscribe` unsubscribes.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError>;

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError>;

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserIdentity, AuthError>;

    async fn sign_out(&self) -> Result<(), AuthError>;
}

pub type AuthProviderState = Arc<dyn AuthProvider>;

// --- Supabase GoTrue client ---

#[derive(Debug, Default, Deserialize)]
struct AppMetadata {
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    full_name: Option<String>,
}

/// SupabaseUser
///
/// The subset of the GoTrue user object this portal reads.
#[derive(Debug, Deserialize)]
struct SupabaseUser {
    id: Uuid,
    email: Option<String>,
    #[serde(default)]
    app_metadata: AppMetadata,
    #[serde(default)]
    user_metadata: UserMetadata,
}

impl SupabaseUser {
    fn into_identity(self) -> UserIdentity {
        UserIdentity {
            id: self.id,
            email: self.email.unwrap_or_default(),
            full_name: self.user_metadata.full_name,
            role_claim: self.app_metadata.role,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    expires_at: Option<i64>,
    user: SupabaseUser,
}

impl TokenResponse {
    fn into_session(self) -> ProviderSession {
        let expires_at = self
            .expires_at
            .and_then(|at| DateTime::from_timestamp(at, 0))
            .or_else(|| self.expires_in.map(|secs| Utc::now() + Duration::seconds(secs)));

        ProviderSession {
            identity: self.user.into_identity(),
            access_token: self.access_token,
            refresh_token: self.refresh_token,
            expires_at,
        }
    }
}

/// GoTrue reports failures under different keys depending on the endpoint.
#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error_description: Option<String>,
    msg: Option<String>,
    message: Option<String>,
    error: Option<String>,
}

impl ErrorBody {
    fn into_message(self) -> Option<String> {
        self.error_description
            .or(self.msg)
            .or(self.message)
            .or(self.error)
    }
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, AuthError> {
    let status = response.status();
    if !status.is_success() {
        let body: ErrorBody = response.json().await.unwrap_or_default();
        return Err(AuthError::new(
            body.into_message().unwrap_or_else(|| status.to_string()),
        ));
    }
    response
        .json::<T>()
        .await
        .map_err(|e| AuthError::new(e.to_string()))
}

/// SupabaseAuthClient
///
/// Talks to the Supabase Auth (GoTrue) REST API with the project's anon key and
/// keeps the resulting session in process, the way the browser SDK does.
pub struct SupabaseAuthClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    current: RwLock<Option<ProviderSession>>,
    events: broadcast::Sender<AuthEvent>,
}

impl SupabaseAuthClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            current: RwLock::new(None),
            events,
        }
    }

    fn emit(&self, kind: AuthEventKind, identity: Option<UserIdentity>) {
        // No subscribers is not an error.
        let _ = self.events.send(AuthEvent { kind, identity });
    }

    async fn token_grant(&self, grant_type: &str, body: Value) -> Result<ProviderSession, AuthError> {
        let url = format!("{}/auth/v1/token?grant_type={}", self.base_url, grant_type);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AuthError::new(e.to_string()))?;

        let payload: TokenResponse = read_json(response).await?;
        Ok(payload.into_session())
    }

    async fn store(&self, session: ProviderSession, kind: AuthEventKind) -> ProviderSession {
        *self.current.write().await = Some(session.clone());
        self.emit(kind, Some(session.identity.clone()));
        session
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthClient {
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError> {
        let Some(session) = self.current.read().await.clone() else {
            return Ok(None);
        };
        if !session.is_expired() {
            return Ok(Some(session));
        }

        // Expired access token: trade the refresh token for a new one.
        let Some(refresh_token) = session.refresh_token else {
            *self.current.write().await = None;
            self.emit(AuthEventKind::SignedOut, None);
            return Ok(None);
        };

        match self
            .token_grant("refresh_token", json!({ "refresh_token": refresh_token }))
            .await
        {
            Ok(refreshed) => Ok(Some(self.store(refreshed, AuthEventKind::TokenRefreshed).await)),
            Err(e) => {
                *self.current.write().await = None;
                self.emit(AuthEventKind::SignedOut, None);
                Err(e)
            }
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError> {
        let session = self
            .token_grant("password", json!({ "email": email, "password": password }))
            .await?;
        Ok(self.store(session, AuthEventKind::SignedIn).await)
    }

    /// sign_up
    ///
    /// Registers through `/auth/v1/signup`, storing the full name in user
    /// metadata. Projects with auto-confirm return a full session, which is
    /// adopted as a sign-in; otherwise only the user object comes back.
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserIdentity, AuthError> {
        let url = format!("{}/auth/v1/signup", self.base_url);
        let response = self
            .http
            .post(url)
            .header("apikey", &self.api_key)
            .json(&json!({
                "email": email,
                "password": password,
                "data": { "full_name": full_name },
            }))
            .send()
            .await
            .map_err(|e| AuthError::new(e.to_string()))?;

        let body: Value = read_json(response).await?;

        if body.get("access_token").is_some() {
            let granted: TokenResponse =
                serde_json::from_value(body).map_err(|e| AuthError::new(e.to_string()))?;
            let session = self.store(granted.into_session(), AuthEventKind::SignedIn).await;
            return Ok(session.identity);
        }

        let user_json = body.get("user").cloned().unwrap_or(body);
        let user: SupabaseUser =
            serde_json::from_value(user_json).map_err(|e| AuthError::new(e.to_string()))?;
        Ok(user.into_identity())
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        let current = self.current.read().await.clone();

        if let Some(session) = current {
            let url = format!("{}/auth/v1/logout", self.base_url);
            let response = self
                .http
                .post(url)
                .header("apikey", &self.api_key)
                .bearer_auth(&session.access_token)
                .send()
                .await
                .map_err(|e| AuthError::new(e.to_string()))?;

            if !response.status().is_success() {
                let status = response.status();
                let body: ErrorBody = response.json().await.unwrap_or_default();
                return Err(AuthError::new(
                    body.into_message().unwrap_or_else(|| status.to_string()),
                ));
            }
        }

        *self.current.write().await = None;
        self.emit(AuthEventKind::SignedOut, None);
        Ok(())
    }
}

// --- In-memory provider (tests, local demos) ---

struct MockAccount {
    password: String,
    identity: UserIdentity,
}

/// MockAuthProvider
///
/// In-memory stand-in for the identity service. Mirrors the provider's
/// user-facing messages so callers can assert on them.
pub struct MockAuthProvider {
    accounts: Mutex<HashMap<String, MockAccount>>,
    current: Mutex<Option<ProviderSession>>,
    events: broadcast::Sender<AuthEvent>,
    session_lookups: AtomicUsize,
    fail_lookup: AtomicBool,
}

impl Default for MockAuthProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAuthProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            accounts: Mutex::new(HashMap::new()),
            current: Mutex::new(None),
            events,
            session_lookups: AtomicUsize::new(0),
            fail_lookup: AtomicBool::new(false),
        }
    }

    /// Registers an account directly, bypassing sign-up, and returns its identity.
    pub fn add_account(&self, email: &str, password: &str) -> UserIdentity {
        let identity = UserIdentity::new(Uuid::new_v4(), email);
        self.accounts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                email.to_lowercase(),
                MockAccount {
                    password: password.to_string(),
                    identity: identity.clone(),
                },
            );
        identity
    }

    /// Pretends a session already exists before anyone subscribes.
    pub fn establish(&self, identity: UserIdentity) {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Self::grant(identity));
    }

    pub fn fail_session_lookup(&self) {
        self.fail_lookup.store(true, Ordering::SeqCst);
    }

    pub fn session_lookups(&self) -> usize {
        self.session_lookups.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }

    /// Changes the role claim the provider issues for `email`, including on the
    /// live session. Takes effect for listeners at the next `refresh`.
    pub fn set_role_claim(&self, email: &str, claim: Option<&str>) {
        let claim = claim.map(str::to_string);
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(account) = accounts.get_mut(&email.to_lowercase()) else {
            return;
        };
        account.identity.role_claim = claim.clone();

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let id = account.identity.id;
        if let Some(session) = current.as_mut().filter(|s| s.identity.id == id) {
            session.identity.role_claim = claim;
        }
    }

    /// Emits a token refresh for the current session, if any.
    pub fn refresh(&self) {
        let identity = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|session| session.identity.clone());
        if identity.is_some() {
            let _ = self.events.send(AuthEvent {
                kind: AuthEventKind::TokenRefreshed,
                identity,
            });
        }
    }

    fn grant(identity: UserIdentity) -> ProviderSession {
        ProviderSession {
            identity,
            access_token: Uuid::new_v4().simple().to_string(),
            refresh_token: Some(Uuid::new_v4().simple().to_string()),
            expires_at: Some(Utc::now() + Duration::hours(1)),
        }
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn current_session(&self) -> Result<Option<ProviderSession>, AuthError> {
        self.session_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_lookup.load(Ordering::SeqCst) {
            return Err(AuthError::new("Failed to fetch"));
        }
        Ok(self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<ProviderSession, AuthError> {
        let identity = {
            let accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
            match accounts.get(&email.to_lowercase()) {
                Some(account) if account.password == password => account.identity.clone(),
                _ => return Err(AuthError::new("Invalid login credentials")),
            }
        };

        let session = Self::grant(identity.clone());
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        let _ = self.events.send(AuthEvent {
            kind: AuthEventKind::SignedIn,
            identity: Some(identity),
        });
        Ok(session)
    }

    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        full_name: &str,
    ) -> Result<UserIdentity, AuthError> {
        let mut accounts = self.accounts.lock().unwrap_or_else(PoisonError::into_inner);
        let key = email.to_lowercase();
        if accounts.contains_key(&key) {
            return Err(AuthError::new("User already registered"));
        }

        let mut identity = UserIdentity::new(Uuid::new_v4(), email);
        identity.full_name = Some(full_name.to_string());
        accounts.insert(
            key,
            MockAccount {
                password: password.to_string(),
                identity: identity.clone(),
            },
        );
        Ok(identity)
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = None;
        let _ = self.events.send(AuthEvent {
            kind: AuthEventKind::SignedOut,
            identity: None,
        });
        Ok(())
    }
}
