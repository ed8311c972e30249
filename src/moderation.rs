use std::{fmt, str::FromStr, sync::Arc};

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::{PortalError, ValidationError},
    models::{
        AdminOverview, Complaint, ComplaintPatch, ComplaintStatus, ItemStatus, LostFoundItem,
        LostFoundPatch, VolunteerRegistration,
    },
    prompt::{Confirmation, PendingAction},
    repository::Collections,
    session::SessionHandle,
    store::ResourceStore,
};

/// EntityKind
///
/// The three moderated collections, named as they appear in admin URLs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum EntityKind {
    #[serde(rename = "complaints")]
    Complaint,
    #[serde(rename = "lost-found")]
    LostFoundItem,
    #[serde(rename = "volunteers")]
    Volunteer,
}

impl EntityKind {
    pub const ALL: [EntityKind; 3] = [
        EntityKind::Complaint,
        EntityKind::LostFoundItem,
        EntityKind::Volunteer,
    ];

    pub fn as_path(&self) -> &'static str {
        match self {
            EntityKind::Complaint => "complaints",
            EntityKind::LostFoundItem => "lost-found",
            EntityKind::Volunteer => "volunteers",
        }
    }

    /// Human-readable name used in prompts and notices.
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Complaint => "complaint",
            EntityKind::LostFoundItem => "lost & found item",
            EntityKind::Volunteer => "volunteer registration",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_path())
    }
}

impl FromStr for EntityKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_path() == s)
            .ok_or_else(|| ValidationError::invalid("entity kind", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    /// The confirmation step said no; nothing was deleted.
    Declined,
}

/// Listing
///
/// One unrestricted collection as shown in the moderation panel.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(untagged)]
pub enum Listing {
    Complaints(Vec<Complaint>),
    LostFound(Vec<LostFoundItem>),
    Volunteers(Vec<VolunteerRegistration>),
}

impl Listing {
    pub fn len(&self) -> usize {
        match self {
            Listing::Complaints(rows) => rows.len(),
            Listing::LostFound(rows) => rows.len(),
            Listing::Volunteers(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// ModerationController
///
/// Admin-only surface over unrestricted stores of all three collections.
/// Every operation re-checks the admin role against the session current at
/// call time. Operations on different collections are independent and may
/// interleave freely.
pub struct ModerationController {
    complaints: ResourceStore<Complaint>,
    lost_found: ResourceStore<LostFoundItem>,
    volunteers: ResourceStore<VolunteerRegistration>,
    session: SessionHandle,
    confirmation: Arc<dyn Confirmation>,
}

impl ModerationController {
    pub fn new(
        collections: &Collections,
        session: SessionHandle,
        confirmation: Arc<dyn Confirmation>,
    ) -> Self {
        Self {
            complaints: ResourceStore::unrestricted(
                collections.complaints.clone(),
                session.clone(),
            ),
            lost_found: ResourceStore::unrestricted(
                collections.lost_found.clone(),
                session.clone(),
            ),
            volunteers: ResourceStore::unrestricted(
                collections.volunteers.clone(),
                session.clone(),
            ),
            session,
            confirmation,
        }
    }

    pub fn complaints(&self) -> &ResourceStore<Complaint> {
        &self.complaints
    }

    pub fn lost_found(&self) -> &ResourceStore<LostFoundItem> {
        &self.lost_found
    }

    pub fn volunteers(&self) -> &ResourceStore<VolunteerRegistration> {
        &self.volunteers
    }

    /// set_status
    ///
    /// Parses `new_status` into the closed status set of `kind` before any
    /// remote call. Volunteer registrations have no status.
    pub async fn set_status(
        &self,
        kind: EntityKind,
        id: Uuid,
        new_status: &str,
    ) -> Result<(), PortalError> {
        self.require_admin()?;

        match kind {
            EntityKind::Complaint => {
                let status: ComplaintStatus = new_status.parse()?;
                self.complaints.update(id, ComplaintPatch { status }).await?;
            }
            EntityKind::LostFoundItem => {
                let status: ItemStatus = new_status.parse()?;
                self.lost_found.update(id, LostFoundPatch { status }).await?;
            }
            EntityKind::Volunteer => {
                return Err(ValidationError::Unsupported(
                    "volunteer registrations have no status".to_string(),
                )
                .into());
            }
        }

        tracing::info!(%kind, %id, status = new_status, "status changed by moderator");
        Ok(())
    }

    /// remove
    ///
    /// Two-phase: nothing is deleted unless the confirmation resolves to `true`.
    /// Only the application row goes away; the identity that filed it is untouched.
    pub async fn remove(&self, kind: EntityKind, id: Uuid) -> Result<Removal, PortalError> {
        self.require_admin()?;

        if !self
            .confirmation
            .request_confirmation(&PendingAction::Remove { kind, id })
            .await
        {
            return Ok(Removal::Declined);
        }

        match kind {
            EntityKind::Complaint => self.complaints.delete(id).await?,
            EntityKind::LostFoundItem => self.lost_found.delete(id).await?,
            EntityKind::Volunteer => self.volunteers.delete(id).await?,
        }

        tracing::info!(%kind, %id, "record removed by moderator");
        Ok(Removal::Removed)
    }

    pub async fn list(&self, kind: EntityKind) -> Result<Listing, PortalError> {
        self.require_admin()?;

        Ok(match kind {
            EntityKind::Complaint => Listing::Complaints(self.complaints.list().await?),
            EntityKind::LostFoundItem => Listing::LostFound(self.lost_found.list().await?),
            EntityKind::Volunteer => Listing::Volunteers(self.volunteers.list().await?),
        })
    }

    /// Reloads all three collections concurrently. The first failure is returned;
    /// stores that did load keep their fresh rows.
    pub async fn refresh_all(&self) -> Result<(), PortalError> {
        self.require_admin()?;

        let (complaints, lost_found, volunteers) = tokio::join!(
            self.complaints.list(),
            self.lost_found.list(),
            self.volunteers.list()
        );
        complaints?;
        lost_found?;
        volunteers?;
        Ok(())
    }

    /// overview
    ///
    /// Fresh counts across all three collections for the dashboard header.
    pub async fn overview(&self) -> Result<AdminOverview, PortalError> {
        self.refresh_all().await?;

        let complaints = self.complaints.items();
        let items = self.lost_found.items();

        Ok(AdminOverview {
            total_complaints: complaints.len(),
            open_complaints: complaints
                .iter()
                .filter(|c| c.status != ComplaintStatus::Resolved)
                .count(),
            total_items: items.len(),
            pending_items: items
                .iter()
                .filter(|i| i.status == ItemStatus::Pending)
                .count(),
            volunteers: self.volunteers.items().len(),
        })
    }

    fn require_admin(&self) -> Result<(), PortalError> {
        let session = self.session.current();
        if session.identity().is_none() {
            return Err(PortalError::Unauthenticated);
        }
        if !session.is_admin() {
            tracing::warn!("moderation attempted without admin role");
            return Err(PortalError::Forbidden);
        }
        Ok(())
    }
}
