use crate::{AppState, handlers};
use axum::{
    Router,
    routing::get,
};

/// Authenticated Router Module
///
/// Member-facing routes. Wrapped in `auth_middleware`, so every handler here
/// receives a validated `AuthUser` whose session scopes its store.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Identity, derived role and reachable views.
        .route("/me", get(handlers::get_me))
        // GET /navigation?view=admin
        // Gate resolution for a requested view.
        .route("/navigation", get(handlers::get_navigation))
        // GET/POST /complaints
        // Own complaints; new ones are owned by the caller and start `Submitted`.
        .route(
            "/complaints",
            get(handlers::list_complaints).post(handlers::create_complaint),
        )
        // GET/POST /lost-found
        // Shared lost/found board; POST is multipart with an optional image.
        .route(
            "/lost-found",
            get(handlers::list_lost_found).post(handlers::create_lost_found),
        )
        // GET/POST /volunteers
        // Own volunteer registrations.
        .route(
            "/volunteers",
            get(handlers::list_volunteers).post(handlers::create_volunteer),
        )
}
