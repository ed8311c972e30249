use async_trait::async_trait;
use uuid::Uuid;

use crate::moderation::EntityKind;

/// PendingAction
///
/// A destructive action waiting on the user's yes/no answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    SignOut,
    Remove { kind: EntityKind, id: Uuid },
}

impl PendingAction {
    pub fn describe(&self) -> String {
        match self {
            PendingAction::SignOut => "Are you sure you want to sign out?".to_string(),
            PendingAction::Remove { kind, id } => {
                format!("You are about to delete {} {}. Continue?", kind.label(), id)
            }
        }
    }
}

/// Confirmation
///
/// First phase of every destructive operation. The destructive call is issued
/// only when this resolves to `true`; how the question is presented (modal,
/// terminal prompt, query flag) is up to the implementation.
#[async_trait]
pub trait Confirmation: Send + Sync {
    async fn request_confirmation(&self, action: &PendingAction) -> bool;
}

/// Preconfirmed
///
/// Answer decided before the operation starts, e.g. an explicit `confirm=true`
/// on an HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preconfirmed(pub bool);

#[async_trait]
impl Confirmation for Preconfirmed {
    async fn request_confirmation(&self, action: &PendingAction) -> bool {
        if !self.0 {
            tracing::debug!(prompt = %action.describe(), "confirmation not given");
        }
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// Notice
///
/// A dismissible message for the user (toast, alert, log line).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, notice: Notice);
}

/// Writes notices to the tracing pipeline. Used where no UI is attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice.level {
            NoticeLevel::Success => tracing::info!(notice = %notice.message, "user notice"),
            NoticeLevel::Error => tracing::warn!(notice = %notice.message, "user notice"),
        }
    }
}
