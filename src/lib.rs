use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Portal core.
pub mod error;
pub mod models;
pub mod navigation;
pub mod portal;
pub mod prompt;
pub mod provider;
pub mod moderation;
pub mod repository;
pub mod session;
pub mod storage;
pub mod store;

// HTTP surface.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use error::PortalError;
pub use provider::{AuthProviderState, MockAuthProvider, SupabaseAuthClient};
pub use repository::{Collections, InMemoryCollections};
pub use session::RolePolicy;
pub use storage::{MockStorageService, S3StorageClient, StorageState};

/// PolicyState
///
/// The role policy shared by every request; the `AuthUser` extractor resolves
/// roles through it.
pub type PolicyState = Arc<RolePolicy>;

/// ApiDoc
///
/// OpenAPI document for every routed handler, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::get_me, handlers::get_navigation,
        handlers::list_complaints, handlers::create_complaint,
        handlers::list_lost_found, handlers::create_lost_found,
        handlers::list_volunteers, handlers::create_volunteer,
        handlers::get_admin_overview, handlers::get_admin_listing,
        handlers::update_status, handlers::delete_record
    ),
    components(
        schemas(
            models::UserIdentity, models::Role, models::Complaint, models::ComplaintDraft,
            models::ComplaintCategory, models::ComplaintStatus, models::LostFoundItem,
            models::LostFoundDraft, models::LostFoundForm, models::ItemKind, models::ItemStatus,
            models::VolunteerRegistration, models::VolunteerDraft, models::Availability,
            models::RegisterUserRequest, models::StatusUpdateRequest, models::MeResponse,
            models::NavigationResponse, models::AdminOverview, navigation::View,
            moderation::EntityKind, moderation::Listing,
        )
    ),
    tags(
        (name = "campus-portal", description = "Campus Services Portal API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Everything a request needs, cloned cheaply into each handler.
#[derive(Clone)]
pub struct AppState {
    /// One remote collection per entity kind.
    pub collections: Collections,
    /// Bucket for lost/found photos.
    pub storage: StorageState,
    /// Identity provider, used for registration.
    pub auth: AuthProviderState,
    pub policy: PolicyState,
    pub config: AppConfig,
}

impl AppState {
    pub fn new(
        collections: Collections,
        storage: StorageState,
        auth: AuthProviderState,
        config: AppConfig,
    ) -> Self {
        Self {
            policy: Arc::new(config.role_policy()),
            collections,
            storage,
            auth,
            config,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for Collections {
    fn from_ref(app_state: &AppState) -> Collections {
        app_state.collections.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AuthProviderState {
    fn from_ref(app_state: &AppState) -> AuthProviderState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for PolicyState {
    fn from_ref(app_state: &AppState) -> PolicyState {
        app_state.policy.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Rejects the request with 401 unless `AuthUser` can be extracted.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing tree, scoped middleware and observability layers.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        // The admin role itself is checked by the moderation controller.
        .nest("/admin", admin::admin_routes())
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
