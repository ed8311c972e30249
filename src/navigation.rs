use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::session::Session;

/// View
///
/// The top-level screens of the portal. `Login` is the only one reachable
/// without an identity; `Admin` only with the admin role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "kebab-case")]
#[ts(export)]
pub enum View {
    LostFound,
    Complaints,
    Volunteer,
    Admin,
    Login,
}

impl View {
    /// Where an authenticated identity lands by default.
    pub const LANDING: View = View::LostFound;

    const MEMBER_VIEWS: [View; 3] = [View::LostFound, View::Complaints, View::Volunteer];
}

/// NavigationRoleGate
///
/// Holds the active view and re-evaluates it on every session change and
/// every explicit tab selection:
/// - no identity forces `Login`, whatever was requested;
/// - `Admin` without the admin role falls back to the landing view, so an
///   identity swap never inherits a moderation screen;
/// - everything else honors the selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRoleGate {
    active: View,
}

impl NavigationRoleGate {
    pub fn new(session: &Session) -> Self {
        Self {
            active: Self::resolve(View::LANDING, session),
        }
    }

    pub fn active_view(&self) -> View {
        self.active
    }

    /// Session transition: keep the current view if it is still allowed.
    pub fn on_session_change(&mut self, session: &Session) -> View {
        let requested = match self.active {
            // Coming back from the login surface lands on the default view.
            View::Login => View::LANDING,
            other => other,
        };
        self.apply(requested, session)
    }

    /// Explicit tab selection.
    pub fn select(&mut self, requested: View, session: &Session) -> View {
        self.apply(requested, session)
    }

    /// The view to draw right now.
    ///
    /// Role is derived fresh from the session on each call, so this is checked
    /// at render time as well as on transitions.
    pub fn render(&self, session: &Session) -> View {
        Self::resolve(self.active, session)
    }

    /// Views offered in the navigation bar for this session.
    pub fn reachable_views(session: &Session) -> Vec<View> {
        if session.identity().is_none() {
            return vec![View::Login];
        }
        let mut views = View::MEMBER_VIEWS.to_vec();
        if session.is_admin() {
            views.push(View::Admin);
        }
        views
    }

    /// Pure gate rule, shared by transitions and the HTTP navigation endpoint.
    pub fn resolve(requested: View, session: &Session) -> View {
        if session.identity().is_none() {
            return View::Login;
        }
        match requested {
            View::Admin if !session.is_admin() => View::LANDING,
            View::Login => View::LANDING,
            other => other,
        }
    }

    fn apply(&mut self, requested: View, session: &Session) -> View {
        let next = Self::resolve(requested, session);
        if next != requested {
            tracing::debug!(?requested, ?next, "navigation request redirected by role gate");
        }
        self.active = next;
        next
    }
}
