use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::{AppConfig, Env},
    error::PortalError,
    models::UserIdentity,
    session::{RolePolicy, Session, SessionHandle},
    PolicyState,
};

/// Audience the identity provider stamps on user access tokens.
pub const TOKEN_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

/// Claims
///
/// Payload of a provider-issued access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Identity id.
    pub sub: Uuid,
    #[serde(default)]
    pub email: String,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<String>,
    #[serde(default)]
    pub app_metadata: AppMetadata,
    #[serde(default)]
    pub user_metadata: UserMetadata,
}

impl Claims {
    pub fn into_identity(self) -> UserIdentity {
        UserIdentity {
            id: self.sub,
            email: self.email,
            full_name: self.user_metadata.full_name,
            role_claim: self.app_metadata.role,
        }
    }
}

/// AuthUser
///
/// The caller of an authenticated request, with the session (identity and
/// derived role) the portal core runs that request under.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub identity: UserIdentity,
    pub session: Session,
}

impl AuthUser {
    fn resolve(identity: UserIdentity, policy: &RolePolicy) -> Self {
        Self {
            session: Session::resolve(Some(identity.clone()), policy),
            identity,
        }
    }

    /// A session handle pinned to this request's caller.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle::fixed(self.session.clone())
    }
}

/// AuthUser Extractor Implementation
///
/// 1. Dependency Resolution: AppConfig and the role policy from state.
/// 2. Local Bypass: `x-user-id` (+ optional `x-user-email`) in `Env::Local`.
/// 3. Bearer token extraction.
/// 4. HS256 validation against the provider's JWT secret and audience.
/// 5. Role resolution through the policy.
///
/// Rejection: `PortalError::Unauthenticated` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    PolicyState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = PortalError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // 1. Dependency Resolution
        let policy = PolicyState::from_ref(state);
        let config = AppConfig::from_ref(state);

        // 2. Local Development Bypass Check
        if config.env == Env::Local {
            if let Some(identity) = bypass_identity(&parts.headers) {
                tracing::debug!(user_id = %identity.id, "local auth bypass");
                return Ok(AuthUser::resolve(identity, &policy));
            }
        }

        // 3. Token Extraction
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(PortalError::Unauthenticated)?;

        // 4. Decode and Validate the Token
        let identity = decode_identity(token, &config.jwt_secret)?;

        // 5. Role Resolution
        Ok(AuthUser::resolve(identity, &policy))
    }
}

/// decode_identity
///
/// Validates signature, expiry and audience, then maps the claims to an identity.
pub fn decode_identity(token: &str, secret: &str) -> Result<UserIdentity, PortalError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[TOKEN_AUDIENCE]);

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Ok(data.claims.into_identity()),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("rejected expired token"),
                other => tracing::debug!("rejected token: {:?}", other),
            }
            Err(PortalError::Unauthenticated)
        }
    }
}

fn bypass_identity(headers: &HeaderMap) -> Option<UserIdentity> {
    let id = headers
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value).ok())?;

    let email = headers
        .get("x-user-email")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{id}@localhost"));

    Some(UserIdentity::new(id, email))
}
