use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Row, postgres::PgRow};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{error::ValidationError, navigation::View};

// --- Identity ---

/// UserIdentity
///
/// The authenticated principal as reported by the identity provider. Only the
/// provider creates these; application code never deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    /// Role claim issued by the provider (`app_metadata.role`), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_claim: Option<String>,
}

impl UserIdentity {
    pub fn new(id: Uuid, email: impl Into<String>) -> Self {
        Self {
            id,
            email: email.into(),
            full_name: None,
            role_claim: None,
        }
    }
}

/// Role
///
/// Derived from the identity on every session change, never stored on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    #[default]
    Viewer,
    Admin,
}

// --- Closed label sets ---
//
// Every enum below is stored in its collection as the human-readable label the
// portal has always written, so `as_str` doubles as the wire format.

fn parse_label<T: Copy + fmt::Debug>(
    all: &[T],
    label: fn(&T) -> &'static str,
    kind: &'static str,
    raw: &str,
) -> Result<T, ValidationError> {
    let wanted = raw.trim();
    all.iter()
        .copied()
        .find(|v| {
            label(v).eq_ignore_ascii_case(wanted) || format!("{v:?}").eq_ignore_ascii_case(wanted)
        })
        .ok_or_else(|| ValidationError::invalid(kind, raw))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum ComplaintCategory {
    Internet,
    Electricity,
    #[serde(rename = "Water Supply")]
    Water,
    Maintenance,
}

impl ComplaintCategory {
    pub const ALL: [ComplaintCategory; 4] = [
        ComplaintCategory::Internet,
        ComplaintCategory::Electricity,
        ComplaintCategory::Water,
        ComplaintCategory::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintCategory::Internet => "Internet",
            ComplaintCategory::Electricity => "Electricity",
            ComplaintCategory::Water => "Water Supply",
            ComplaintCategory::Maintenance => "Maintenance",
        }
    }
}

/// ComplaintStatus
///
/// Admin-driven only. Any transition between the three states is allowed,
/// forwards or backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum ComplaintStatus {
    #[default]
    Submitted,
    #[serde(rename = "In Progress")]
    InProgress,
    Resolved,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 3] = [
        ComplaintStatus::Submitted,
        ComplaintStatus::InProgress,
        ComplaintStatus::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ComplaintStatus::Submitted => "Submitted",
            ComplaintStatus::InProgress => "In Progress",
            ComplaintStatus::Resolved => "Resolved",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum ItemKind {
    Lost,
    Found,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Lost, ItemKind::Found];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Lost => "Lost",
            ItemKind::Found => "Found",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum ItemStatus {
    #[default]
    Pending,
    #[serde(rename = "Found/Returned")]
    Returned,
}

impl ItemStatus {
    pub const ALL: [ItemStatus; 2] = [ItemStatus::Pending, ItemStatus::Returned];

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "Pending",
            ItemStatus::Returned => "Found/Returned",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub enum Availability {
    #[serde(rename = "Morning Shift")]
    Morning,
    #[serde(rename = "Evening Shift")]
    Evening,
    #[serde(rename = "Full Day")]
    FullDay,
}

impl Availability {
    pub const ALL: [Availability; 3] = [
        Availability::Morning,
        Availability::Evening,
        Availability::FullDay,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Availability::Morning => "Morning Shift",
            Availability::Evening => "Evening Shift",
            Availability::FullDay => "Full Day",
        }
    }
}

impl FromStr for ComplaintCategory {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(&Self::ALL, Self::as_str, "complaint category", s)
    }
}

impl FromStr for ComplaintStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(&Self::ALL, Self::as_str, "complaint status", s)
    }
}

impl FromStr for ItemKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(&Self::ALL, Self::as_str, "item type", s)
    }
}

impl FromStr for ItemStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(&Self::ALL, Self::as_str, "item status", s)
    }
}

impl FromStr for Availability {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_label(&Self::ALL, Self::as_str, "availability", s)
    }
}

macro_rules! display_as_label {
    ($($ty:ty),*) => {
        $(impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        })*
    };
}

display_as_label!(ComplaintCategory, ComplaintStatus, ItemKind, ItemStatus, Availability);

// --- Core Application Records ---

/// Complaint
///
/// A facility complaint from the `complaints` table. Owned by the email of the
/// identity that filed it; the owner column is never taken from the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Complaint {
    pub id: Uuid,
    #[serde(rename = "user_email")]
    pub owner_email: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub status: ComplaintStatus,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// LostFoundItem
///
/// A flat shared record from `lost_found_items`: no owner column, visible to and
/// insertable by every authenticated identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LostFoundItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub image_url: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// VolunteerRegistration
///
/// A sign-up from the `volunteers` table, owned by the registering identity's id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VolunteerRegistration {
    pub id: Uuid,
    #[serde(rename = "user_id")]
    pub owner_id: Uuid,
    pub full_name: String,
    pub event_name: String,
    pub availability: Availability,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

fn decode_label<T>(row: &PgRow, column: &str) -> Result<T, sqlx::Error>
where
    T: FromStr<Err = ValidationError>,
{
    let raw: String = row.try_get(column)?;
    raw.parse().map_err(|e: ValidationError| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

impl<'r> FromRow<'r, PgRow> for Complaint {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_email: row.try_get("user_email")?,
            category: decode_label(row, "category")?,
            description: row.try_get("description")?,
            status: decode_label(row, "status")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for LostFoundItem {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            // `type` is reserved in Rust, hence `kind`.
            kind: decode_label(row, "type")?,
            status: decode_label(row, "status")?,
            image_url: row.try_get("image_url")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

impl<'r> FromRow<'r, PgRow> for VolunteerRegistration {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            owner_id: row.try_get("user_id")?,
            full_name: row.try_get("full_name")?,
            event_name: row.try_get("event_name")?,
            availability: decode_label(row, "availability")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

// --- Drafts (user-supplied fields only) ---

/// ComplaintDraft
///
/// What the complaint form submits. Owner and status are injected by the store,
/// so an owner field in the incoming JSON is simply ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ComplaintDraft {
    pub category: ComplaintCategory,
    pub description: String,
}

/// LostFoundDraft
///
/// `image_url` is only ever filled by the upload path and never deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LostFoundDraft {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[serde(skip)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct VolunteerDraft {
    pub full_name: String,
    pub event_name: String,
    pub availability: Availability,
}

// --- Insert rows (drafts plus server-of-truth fields) ---

#[derive(Debug, Clone, PartialEq)]
pub struct ComplaintInsert {
    pub owner_email: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LostFoundInsert {
    pub title: String,
    pub description: String,
    pub kind: ItemKind,
    pub status: ItemStatus,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VolunteerInsert {
    pub owner_id: Uuid,
    pub full_name: String,
    pub event_name: String,
    pub availability: Availability,
}

// --- Patches ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplaintPatch {
    pub status: ComplaintStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LostFoundPatch {
    pub status: ItemStatus,
}

/// Volunteer registrations carry no mutable status, so no patch can be built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoPatch {}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for the public registration endpoint (POST /register).
/// The password is passed straight through to the identity provider and never logged.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

/// StatusUpdateRequest
///
/// Raw status label from the moderation panel; checked against the entity's closed set.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct StatusUpdateRequest {
    #[schema(example = "Resolved")]
    pub status: String,
}

/// LostFoundForm
///
/// Documentation-only description of the multipart body accepted by POST /lost-found.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LostFoundForm {
    pub title: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    #[schema(value_type = Option<String>, format = Binary)]
    pub image: Option<Vec<u8>>,
}

// --- Profile & Dashboard Schemas (Output) ---

/// MeResponse
///
/// The caller's identity, derived role and the views the navigation gate lets them reach.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct MeResponse {
    pub identity: UserIdentity,
    pub role: Role,
    pub views: Vec<View>,
    pub landing: View,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct NavigationResponse {
    pub requested: View,
    pub active: View,
}

/// AdminOverview
///
/// Output schema for the moderation dashboard (GET /admin/overview).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AdminOverview {
    pub total_complaints: usize,
    /// Complaints not yet marked `Resolved`.
    pub open_complaints: usize,
    pub total_items: usize,
    pub pending_items: usize,
    pub volunteers: usize,
}
