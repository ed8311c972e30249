use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{delete, get, put},
};

/// Admin Router Module
///
/// Moderation endpoints, nested under `/admin`. `{kind}` is one of
/// `complaints`, `lost-found`, `volunteers`.
///
/// Every handler authenticates through `AuthUser` and then goes through
/// `ModerationController`, which rejects non-admin sessions with 403.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        // GET /admin/overview
        // Dashboard counts (open complaints, pending items, volunteers).
        .route("/overview", get(handlers::get_admin_overview))
        // GET /admin/{kind}
        // A whole collection, no ownership filter.
        .route("/{kind}", get(handlers::get_admin_listing))
        // PUT /admin/{kind}/{id}/status
        // Status transition, validated against the entity's closed set.
        .route("/{kind}/{id}/status", put(handlers::update_status))
        // DELETE /admin/{kind}/{id}?confirm=true
        // Two-phase delete; without confirmation nothing is removed (428).
        .route("/{kind}/{id}", delete(handlers::delete_record))
}
