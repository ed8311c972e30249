use std::sync::Arc;

use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::MultipartError},
    http::StatusCode,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::{PortalError, ValidationError},
    models::{
        AdminOverview, Complaint, ComplaintDraft, ItemKind, LostFoundDraft, LostFoundForm,
        LostFoundItem, MeResponse, NavigationResponse, RegisterUserRequest, StatusUpdateRequest,
        UserIdentity, VolunteerDraft, VolunteerRegistration,
    },
    moderation::{EntityKind, Listing, ModerationController, Removal},
    navigation::{NavigationRoleGate, View},
    prompt::Preconfirmed,
    provider::AuthProviderState,
    repository::Collections,
    storage::{StorageState, StorageUploader, UploadFile},
    store::ResourceStore,
};

// --- Query Structs ---

#[derive(Deserialize, utoipa::IntoParams)]
pub struct NavigationQuery {
    /// Requested view, e.g. `admin` or `lost-found`.
    pub view: View,
}

/// DeleteQuery
///
/// Deletion is two-phase over HTTP: the client shows its own prompt and only
/// sends `confirm=true` once the user agreed.
#[derive(Deserialize, utoipa::IntoParams)]
pub struct DeleteQuery {
    #[serde(default)]
    pub confirm: bool,
}

// --- Public ---

/// register_user
///
/// [Public Route] Creates an identity with the auth provider. The provider's
/// message is returned verbatim on rejection (e.g. "User already registered").
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 201, description = "Registered", body = UserIdentity),
        (status = 400, description = "Rejected by the auth provider"),
        (status = 422, description = "Missing field")
    )
)]
pub async fn register_user(
    State(provider): State<AuthProviderState>,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<(StatusCode, Json<UserIdentity>), PortalError> {
    ValidationError::require("email", &payload.email)?;
    ValidationError::require("password", &payload.password)?;
    ValidationError::require("full_name", &payload.full_name)?;

    let identity = provider
        .sign_up(&payload.email, &payload.password, &payload.full_name)
        .await?;

    tracing::info!(user_id = %identity.id, "registered new identity");
    Ok((StatusCode::CREATED, Json(identity)))
}

// --- Session & Navigation ---

/// get_me
///
/// [Authenticated Route] The caller's identity, derived role and the views the
/// navigation gate lets them reach.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Current session", body = MeResponse))
)]
pub async fn get_me(AuthUser { identity, session }: AuthUser) -> Json<MeResponse> {
    Json(MeResponse {
        role: session.role(),
        views: NavigationRoleGate::reachable_views(&session),
        landing: NavigationRoleGate::resolve(View::LANDING, &session),
        identity,
    })
}

/// get_navigation
///
/// [Authenticated Route] Which view the gate actually grants for a requested one.
#[utoipa::path(
    get,
    path = "/navigation",
    params(NavigationQuery),
    responses((status = 200, description = "Resolved view", body = NavigationResponse))
)]
pub async fn get_navigation(
    AuthUser { session, .. }: AuthUser,
    Query(query): Query<NavigationQuery>,
) -> Json<NavigationResponse> {
    Json(NavigationResponse {
        requested: query.view,
        active: NavigationRoleGate::resolve(query.view, &session),
    })
}

// --- Complaints ---

/// list_complaints
///
/// [Authenticated Route] The caller's own complaints, newest first. Admins see all.
#[utoipa::path(
    get,
    path = "/complaints",
    responses((status = 200, description = "Complaints", body = [Complaint]))
)]
pub async fn list_complaints(
    user: AuthUser,
    State(collections): State<Collections>,
) -> Result<Json<Vec<Complaint>>, PortalError> {
    let store = ResourceStore::owned(collections.complaints, user.handle());
    Ok(Json(store.list().await?))
}

/// create_complaint
///
/// [Authenticated Route] Files a complaint owned by the caller with status
/// `Submitted`, then returns the refreshed list. A listing failure after the
/// insert is reported as 502 rather than as an empty list.
#[utoipa::path(
    post,
    path = "/complaints",
    request_body = ComplaintDraft,
    responses(
        (status = 201, description = "Created; refreshed list", body = [Complaint]),
        (status = 422, description = "Missing field"),
        (status = 502, description = "Insert or follow-up listing failed")
    )
)]
pub async fn create_complaint(
    user: AuthUser,
    State(collections): State<Collections>,
    Json(draft): Json<ComplaintDraft>,
) -> Result<(StatusCode, Json<Vec<Complaint>>), PortalError> {
    let store = ResourceStore::owned(collections.complaints, user.handle());
    store.create(draft).await?;
    Ok((StatusCode::CREATED, Json(store.list().await?)))
}

// --- Lost & Found ---

/// list_lost_found
///
/// [Authenticated Route] Every lost/found report, newest first.
#[utoipa::path(
    get,
    path = "/lost-found",
    responses((status = 200, description = "Items", body = [LostFoundItem]))
)]
pub async fn list_lost_found(
    user: AuthUser,
    State(collections): State<Collections>,
) -> Result<Json<Vec<LostFoundItem>>, PortalError> {
    let store = ResourceStore::owned(collections.lost_found, user.handle());
    Ok(Json(store.list().await?))
}

/// create_lost_found
///
/// [Authenticated Route] Reports an item from a multipart form. When an
/// `image` part is present it is uploaded first; an upload failure aborts the
/// report.
#[utoipa::path(
    post,
    path = "/lost-found",
    request_body(content = LostFoundForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created; refreshed list", body = [LostFoundItem]),
        (status = 422, description = "Missing or invalid field"),
        (status = 502, description = "Image upload failed")
    )
)]
pub async fn create_lost_found(
    user: AuthUser,
    State(collections): State<Collections>,
    State(storage): State<StorageState>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<Vec<LostFoundItem>>), PortalError> {
    let (draft, image) = read_lost_found_form(multipart).await?;

    let store = ResourceStore::owned(collections.lost_found, user.handle());
    store
        .create_with_image(draft, image, &StorageUploader::new(storage))
        .await?;
    Ok((StatusCode::CREATED, Json(store.list().await?)))
}

/// read_lost_found_form
///
/// Collects `title`, `description`, `type` and an optional `image` part.
/// A file input left empty arrives as a nameless, zero-length part and counts
/// as no image.
async fn read_lost_found_form(
    mut multipart: Multipart,
) -> Result<(LostFoundDraft, Option<UploadFile>), PortalError> {
    let mut title = String::new();
    let mut description = String::new();
    let mut kind: Option<ItemKind> = None;
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "title" => title = field.text().await.map_err(malformed)?,
            "description" => description = field.text().await.map_err(malformed)?,
            "type" => kind = Some(field.text().await.map_err(malformed)?.parse()?),
            "image" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field.bytes().await.map_err(malformed)?.to_vec();
                if !(file_name.is_empty() && bytes.is_empty()) {
                    image = Some(UploadFile {
                        file_name,
                        content_type,
                        bytes,
                    });
                }
            }
            _ => {}
        }
    }

    let kind = kind.ok_or(ValidationError::MissingField { field: "type" })?;
    Ok((
        LostFoundDraft {
            title,
            description,
            kind,
            image_url: None,
        },
        image,
    ))
}

fn malformed(e: MultipartError) -> PortalError {
    ValidationError::invalid("multipart body", e.body_text()).into()
}

// --- Volunteers ---

/// list_volunteers
///
/// [Authenticated Route] The caller's own registrations. Admins see all.
#[utoipa::path(
    get,
    path = "/volunteers",
    responses((status = 200, description = "Registrations", body = [VolunteerRegistration]))
)]
pub async fn list_volunteers(
    user: AuthUser,
    State(collections): State<Collections>,
) -> Result<Json<Vec<VolunteerRegistration>>, PortalError> {
    let store = ResourceStore::owned(collections.volunteers, user.handle());
    Ok(Json(store.list().await?))
}

#[utoipa::path(
    post,
    path = "/volunteers",
    request_body = VolunteerDraft,
    responses(
        (status = 201, description = "Created; refreshed list", body = [VolunteerRegistration]),
        (status = 422, description = "Missing field"),
        (status = 502, description = "Insert or follow-up listing failed")
    )
)]
pub async fn create_volunteer(
    user: AuthUser,
    State(collections): State<Collections>,
    Json(draft): Json<VolunteerDraft>,
) -> Result<(StatusCode, Json<Vec<VolunteerRegistration>>), PortalError> {
    let store = ResourceStore::owned(collections.volunteers, user.handle());
    store.create(draft).await?;
    Ok((StatusCode::CREATED, Json(store.list().await?)))
}

// --- Admin ---

fn moderation(user: &AuthUser, collections: &Collections, confirmed: bool) -> ModerationController {
    ModerationController::new(collections, user.handle(), Arc::new(Preconfirmed(confirmed)))
}

/// get_admin_overview
///
/// [Admin Route] Dashboard counts across all three collections.
#[utoipa::path(
    get,
    path = "/admin/overview",
    responses(
        (status = 200, description = "Counts", body = AdminOverview),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn get_admin_overview(
    user: AuthUser,
    State(collections): State<Collections>,
) -> Result<Json<AdminOverview>, PortalError> {
    Ok(Json(moderation(&user, &collections, false).overview().await?))
}

/// get_admin_listing
///
/// [Admin Route] One collection without any ownership filter.
#[utoipa::path(
    get,
    path = "/admin/{kind}",
    params(("kind" = EntityKind, Path, description = "complaints | lost-found | volunteers")),
    responses(
        (status = 200, description = "All records", body = Listing),
        (status = 403, description = "Not an administrator")
    )
)]
pub async fn get_admin_listing(
    user: AuthUser,
    State(collections): State<Collections>,
    Path(kind): Path<EntityKind>,
) -> Result<Json<Listing>, PortalError> {
    Ok(Json(moderation(&user, &collections, false).list(kind).await?))
}

/// update_status
///
/// [Admin Route] Moves a complaint or lost/found item to another status label.
/// Labels outside the entity's closed set are rejected before any write.
#[utoipa::path(
    put,
    path = "/admin/{kind}/{id}/status",
    params(
        ("kind" = EntityKind, Path, description = "complaints | lost-found"),
        ("id" = Uuid, Path, description = "Record ID")
    ),
    request_body = StatusUpdateRequest,
    responses(
        (status = 204, description = "Updated"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found"),
        (status = 422, description = "Invalid status")
    )
)]
pub async fn update_status(
    user: AuthUser,
    State(collections): State<Collections>,
    Path((kind, id)): Path<(EntityKind, Uuid)>,
    Json(payload): Json<StatusUpdateRequest>,
) -> Result<StatusCode, PortalError> {
    moderation(&user, &collections, false)
        .set_status(kind, id, &payload.status)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// delete_record
///
/// [Admin Route] Removes one record. Without `confirm=true` nothing is
/// deleted and 428 is returned. The identity behind the record is never touched.
#[utoipa::path(
    delete,
    path = "/admin/{kind}/{id}",
    params(
        ("kind" = EntityKind, Path, description = "complaints | lost-found | volunteers"),
        ("id" = Uuid, Path, description = "Record ID"),
        DeleteQuery
    ),
    responses(
        (status = 204, description = "Deleted"),
        (status = 403, description = "Not an administrator"),
        (status = 404, description = "Not Found"),
        (status = 428, description = "Confirmation required")
    )
)]
pub async fn delete_record(
    user: AuthUser,
    State(collections): State<Collections>,
    Path((kind, id)): Path<(EntityKind, Uuid)>,
    Query(query): Query<DeleteQuery>,
) -> Result<StatusCode, PortalError> {
    match moderation(&user, &collections, query.confirm)
        .remove(kind, id)
        .await?
    {
        Removal::Removed => Ok(StatusCode::NO_CONTENT),
        Removal::Declined => Ok(StatusCode::PRECONDITION_REQUIRED),
    }
}
