use std::sync::{
    RwLock,
    atomic::{AtomicBool, Ordering},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    error::{PortalError, ValidationError},
    models::{
        Complaint, ComplaintDraft, ComplaintInsert, ComplaintPatch, ComplaintStatus, ItemStatus,
        LostFoundDraft, LostFoundInsert, LostFoundItem, LostFoundPatch, NoPatch, UserIdentity,
        VolunteerDraft, VolunteerInsert, VolunteerRegistration,
    },
    repository::{CollectionState, ColumnValue, Filter, Order},
    session::SessionHandle,
    storage::{StorageUploader, UploadFile},
};

/// Resource Trait
///
/// Everything `ResourceStore` needs to know about one entity kind: where it
/// lives, who owns a row, what the user may submit and which fields the store
/// fills in itself.
pub trait Resource: Clone + Send + Sync + Unpin + 'static {
    const COLLECTION: &'static str;

    /// User-supplied fields.
    type Draft: Send;
    /// Draft plus the server-of-truth fields injected by `prepare`.
    type Insert: Clone + Send + Sync;
    type Patch: Send + Sync;

    fn id(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;

    /// The ownership predicate for `identity`. `None` means the collection is
    /// shared by every authenticated identity.
    fn owner_filter(identity: &UserIdentity) -> Option<Filter>;

    fn default_order() -> Order {
        Order::newest_first()
    }

    fn validate(draft: &Self::Draft) -> Result<(), ValidationError>;
    fn prepare(draft: Self::Draft, identity: &UserIdentity) -> Self::Insert;
    fn materialize(insert: Self::Insert, id: Uuid, created_at: DateTime<Utc>) -> Self;

    fn insert_columns(insert: &Self::Insert) -> Vec<(&'static str, ColumnValue)>;
    fn patch_columns(patch: &Self::Patch) -> Vec<(&'static str, ColumnValue)>;
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Value of a filterable column, for in-process filtering.
    fn column(&self, name: &str) -> Option<ColumnValue>;
}

impl Resource for Complaint {
    const COLLECTION: &'static str = "complaints";

    type Draft = ComplaintDraft;
    type Insert = ComplaintInsert;
    type Patch = ComplaintPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_filter(identity: &UserIdentity) -> Option<Filter> {
        Some(Filter::eq(
            "user_email",
            ColumnValue::Text(identity.email.clone()),
        ))
    }

    fn validate(draft: &ComplaintDraft) -> Result<(), ValidationError> {
        ValidationError::require("description", &draft.description)
    }

    fn prepare(draft: ComplaintDraft, identity: &UserIdentity) -> ComplaintInsert {
        ComplaintInsert {
            owner_email: identity.email.clone(),
            category: draft.category,
            description: draft.description,
            status: ComplaintStatus::default(),
        }
    }

    fn materialize(insert: ComplaintInsert, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_email: insert.owner_email,
            category: insert.category,
            description: insert.description,
            status: insert.status,
            created_at,
        }
    }

    fn insert_columns(insert: &ComplaintInsert) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("user_email", ColumnValue::Text(insert.owner_email.clone())),
            ("category", ColumnValue::Text(insert.category.as_str().into())),
            ("description", ColumnValue::Text(insert.description.clone())),
            ("status", ColumnValue::Text(insert.status.as_str().into())),
        ]
    }

    fn patch_columns(patch: &ComplaintPatch) -> Vec<(&'static str, ColumnValue)> {
        vec![("status", ColumnValue::Text(patch.status.as_str().into()))]
    }

    fn apply_patch(&mut self, patch: &ComplaintPatch) {
        self.status = patch.status;
    }

    fn column(&self, name: &str) -> Option<ColumnValue> {
        match name {
            "id" => Some(ColumnValue::Uuid(self.id)),
            "user_email" => Some(ColumnValue::Text(self.owner_email.clone())),
            "category" => Some(ColumnValue::Text(self.category.as_str().into())),
            "status" => Some(ColumnValue::Text(self.status.as_str().into())),
            _ => None,
        }
    }
}

impl Resource for LostFoundItem {
    const COLLECTION: &'static str = "lost_found_items";

    type Draft = LostFoundDraft;
    type Insert = LostFoundInsert;
    type Patch = LostFoundPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_filter(_identity: &UserIdentity) -> Option<Filter> {
        None
    }

    fn validate(draft: &LostFoundDraft) -> Result<(), ValidationError> {
        ValidationError::require("title", &draft.title)?;
        ValidationError::require("description", &draft.description)
    }

    fn prepare(draft: LostFoundDraft, _identity: &UserIdentity) -> LostFoundInsert {
        LostFoundInsert {
            title: draft.title,
            description: draft.description,
            kind: draft.kind,
            status: ItemStatus::default(),
            image_url: draft.image_url,
        }
    }

    fn materialize(insert: LostFoundInsert, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: insert.title,
            description: insert.description,
            kind: insert.kind,
            status: insert.status,
            image_url: insert.image_url,
            created_at,
        }
    }

    fn insert_columns(insert: &LostFoundInsert) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("title", ColumnValue::Text(insert.title.clone())),
            ("description", ColumnValue::Text(insert.description.clone())),
            ("type", ColumnValue::Text(insert.kind.as_str().into())),
            ("status", ColumnValue::Text(insert.status.as_str().into())),
            ("image_url", ColumnValue::OptionalText(insert.image_url.clone())),
        ]
    }

    fn patch_columns(patch: &LostFoundPatch) -> Vec<(&'static str, ColumnValue)> {
        vec![("status", ColumnValue::Text(patch.status.as_str().into()))]
    }

    fn apply_patch(&mut self, patch: &LostFoundPatch) {
        self.status = patch.status;
    }

    fn column(&self, name: &str) -> Option<ColumnValue> {
        match name {
            "id" => Some(ColumnValue::Uuid(self.id)),
            "type" => Some(ColumnValue::Text(self.kind.as_str().into())),
            "status" => Some(ColumnValue::Text(self.status.as_str().into())),
            "image_url" => Some(ColumnValue::OptionalText(self.image_url.clone())),
            _ => None,
        }
    }
}

impl Resource for VolunteerRegistration {
    const COLLECTION: &'static str = "volunteers";

    type Draft = VolunteerDraft;
    type Insert = VolunteerInsert;
    type Patch = NoPatch;

    fn id(&self) -> Uuid {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn owner_filter(identity: &UserIdentity) -> Option<Filter> {
        Some(Filter::eq("user_id", ColumnValue::Uuid(identity.id)))
    }

    fn validate(draft: &VolunteerDraft) -> Result<(), ValidationError> {
        ValidationError::require("full_name", &draft.full_name)?;
        ValidationError::require("event_name", &draft.event_name)
    }

    fn prepare(draft: VolunteerDraft, identity: &UserIdentity) -> VolunteerInsert {
        VolunteerInsert {
            owner_id: identity.id,
            full_name: draft.full_name,
            event_name: draft.event_name,
            availability: draft.availability,
        }
    }

    fn materialize(insert: VolunteerInsert, id: Uuid, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            owner_id: insert.owner_id,
            full_name: insert.full_name,
            event_name: insert.event_name,
            availability: insert.availability,
            created_at,
        }
    }

    fn insert_columns(insert: &VolunteerInsert) -> Vec<(&'static str, ColumnValue)> {
        vec![
            ("user_id", ColumnValue::Uuid(insert.owner_id)),
            ("full_name", ColumnValue::Text(insert.full_name.clone())),
            ("event_name", ColumnValue::Text(insert.event_name.clone())),
            (
                "availability",
                ColumnValue::Text(insert.availability.as_str().into()),
            ),
        ]
    }

    fn patch_columns(patch: &NoPatch) -> Vec<(&'static str, ColumnValue)> {
        match *patch {}
    }

    fn apply_patch(&mut self, patch: &NoPatch) {
        match *patch {}
    }

    fn column(&self, name: &str) -> Option<ColumnValue> {
        match name {
            "id" => Some(ColumnValue::Uuid(self.id)),
            "user_id" => Some(ColumnValue::Uuid(self.owner_id)),
            "availability" => Some(ColumnValue::Text(self.availability.as_str().into())),
            _ => None,
        }
    }
}

/// Whether a store applies the ownership predicate to its listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Rows owned by the current identity; an admin session still sees all.
    Owned,
    /// Every row, regardless of identity. Used by moderation.
    Unrestricted,
}

/// ResourceStore
///
/// Generic CRUD surface over one remote collection. The store keeps the last
/// successfully listed rows and refreshes them after every successful write
/// rather than patching them locally, so ids and timestamps always come from
/// the server.
///
/// Every `list()` captures the identity it was issued under. A result that
/// arrives after the identity changed is discarded and reported as
/// `PortalError::StaleSession`, leaving the published rows untouched.
pub struct ResourceStore<T: Resource> {
    remote: CollectionState<T>,
    session: SessionHandle,
    scope: Scope,
    items: RwLock<Vec<T>>,
    submitting: AtomicBool,
}

struct SubmitGuard<'a>(&'a AtomicBool);

impl Drop for SubmitGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: Resource> ResourceStore<T> {
    pub fn owned(remote: CollectionState<T>, session: SessionHandle) -> Self {
        Self::with_scope(remote, session, Scope::Owned)
    }

    pub fn unrestricted(remote: CollectionState<T>, session: SessionHandle) -> Self {
        Self::with_scope(remote, session, Scope::Unrestricted)
    }

    fn with_scope(remote: CollectionState<T>, session: SessionHandle, scope: Scope) -> Self {
        Self {
            remote,
            session,
            scope,
            items: RwLock::new(Vec::new()),
            submitting: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    /// The rows published by the last successful `list()`.
    pub fn items(&self) -> Vec<T> {
        self.items
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// True while a `create` from this store's form is pending.
    pub fn is_submitting(&self) -> bool {
        self.submitting.load(Ordering::Acquire)
    }

    /// list
    ///
    /// Fetches the collection for the identity current at call time.
    ///
    /// 1. No identity: publish and return an empty list without a remote call.
    /// 2. Build the ownership filter (skipped for unrestricted stores and admins).
    /// 3. Select newest first.
    /// 4. Drop the result if the session (identity or role) changed while it
    ///    was in flight.
    pub async fn list(&self) -> Result<Vec<T>, PortalError> {
        let session = self.session.current();
        let Some(identity) = session.identity() else {
            self.publish(Vec::new());
            return Ok(Vec::new());
        };

        let filter = match self.scope {
            Scope::Owned if !session.is_admin() => T::owner_filter(identity),
            _ => None,
        };

        let rows = self.remote.select(filter, T::default_order()).await?;

        if self.session.current() != session {
            tracing::debug!(
                collection = T::COLLECTION,
                issued_for = %identity.id,
                "discarding listing fetched for a previous session"
            );
            return Err(PortalError::StaleSession);
        }

        self.publish(rows.clone());
        Ok(rows)
    }

    /// create
    ///
    /// Validates the draft, injects owner and default status, inserts, then
    /// refreshes. Fails fast with `Busy` while another create from this store
    /// is pending.
    pub async fn create(&self, draft: T::Draft) -> Result<(), PortalError> {
        T::validate(&draft)?;
        let _guard = self.begin_submit()?;
        self.insert_and_refresh(draft).await
    }

    /// Unrestricted by ownership; only moderation issues updates.
    pub async fn update(&self, id: Uuid, patch: T::Patch) -> Result<(), PortalError> {
        self.require_identity()?;
        self.remote.update(id, &patch).await?;
        tracing::info!(collection = T::COLLECTION, %id, "record updated");
        self.refresh().await;
        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), PortalError> {
        self.require_identity()?;
        self.remote.delete(id).await?;
        tracing::info!(collection = T::COLLECTION, %id, "record deleted");
        self.refresh().await;
        Ok(())
    }

    async fn insert_and_refresh(&self, draft: T::Draft) -> Result<(), PortalError> {
        let session = self.session.current();
        let identity = session.identity().ok_or(PortalError::Unauthenticated)?;

        let record = T::prepare(draft, identity);
        self.remote.insert(record).await?;
        tracing::info!(collection = T::COLLECTION, user_id = %identity.id, "record created");

        self.refresh().await;
        Ok(())
    }

    /// The write already succeeded, so a failed refresh only leaves the
    /// previous rows on display.
    async fn refresh(&self) {
        if let Err(e) = self.list().await {
            tracing::warn!(collection = T::COLLECTION, error = %e, "refresh after write failed");
        }
    }

    fn require_identity(&self) -> Result<(), PortalError> {
        self.session
            .identity_id()
            .map(|_| ())
            .ok_or(PortalError::Unauthenticated)
    }

    fn begin_submit(&self) -> Result<SubmitGuard<'_>, PortalError> {
        if self.submitting.swap(true, Ordering::AcqRel) {
            return Err(PortalError::Busy);
        }
        Ok(SubmitGuard(&self.submitting))
    }

    fn publish(&self, rows: Vec<T>) {
        *self
            .items
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = rows;
    }
}

impl ResourceStore<LostFoundItem> {
    /// create_with_image
    ///
    /// Lost/found create with an optional photo. The photo is uploaded first;
    /// if the upload fails nothing is inserted, so a submitted image never
    /// silently turns into an image-less record.
    pub async fn create_with_image(
        &self,
        mut draft: LostFoundDraft,
        image: Option<UploadFile>,
        uploader: &StorageUploader,
    ) -> Result<(), PortalError> {
        LostFoundItem::validate(&draft)?;
        let _guard = self.begin_submit()?;
        self.require_identity()?;

        if let Some(file) = image {
            draft.image_url = Some(uploader.upload(&file).await?);
        }

        self.insert_and_refresh(draft).await
    }
}
