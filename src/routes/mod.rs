/// Router Module Index
///
/// Routes split by who may call them; access control is applied per module
/// through axum layers and extractors.

/// Health and registration; no identity required.
pub mod public;

/// Member features. Every handler runs under the caller's session.
pub mod authenticated;

/// Moderation. The admin role is checked inside the moderation controller.
pub mod admin;
