use campus_portal::{
    error::{PortalError, RemoteError, UploadError, ValidationError},
    models::{
        Availability, Complaint, ComplaintCategory, ComplaintDraft, ComplaintPatch,
        ComplaintStatus, ItemKind, ItemStatus, LostFoundDraft, LostFoundItem,
        UserIdentity, VolunteerDraft, VolunteerRegistration,
    },
    provider::MockAuthProvider,
    repository::InMemoryCollection,
    session::{AuthSession, RolePolicy, Session, SessionHandle},
    storage::{MockStorageService, StorageUploader, UploadFile},
    store::ResourceStore,
};
use chrono::{Duration as ChronoDuration, Utc};
use std::{sync::Arc, time::Duration};
use uuid::Uuid;

// --- Helpers ---

fn identity(email: &str) -> UserIdentity {
    UserIdentity::new(Uuid::new_v4(), email)
}

fn handle_for(identity: &UserIdentity) -> SessionHandle {
    SessionHandle::fixed(Session::resolve(Some(identity.clone()), &RolePolicy::default()))
}

fn admin_handle(identity: &UserIdentity) -> SessionHandle {
    SessionHandle::fixed(Session::resolve(
        Some(identity.clone()),
        &RolePolicy::new([identity.id]),
    ))
}

fn complaint(owner: &str, minutes_ago: i64) -> Complaint {
    Complaint {
        id: Uuid::new_v4(),
        owner_email: owner.to_string(),
        category: ComplaintCategory::Internet,
        description: format!("Wi-Fi down ({owner})"),
        status: ComplaintStatus::Submitted,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}

fn item(title: &str, minutes_ago: i64) -> LostFoundItem {
    LostFoundItem {
        id: Uuid::new_v4(),
        title: title.to_string(),
        description: "Left in the library".to_string(),
        kind: ItemKind::Lost,
        status: ItemStatus::Pending,
        image_url: None,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
    }
}

fn lost_draft() -> LostFoundDraft {
    LostFoundDraft {
        title: "Blue umbrella".to_string(),
        description: "Near the cafeteria".to_string(),
        kind: ItemKind::Found,
        image_url: None,
    }
}

fn photo() -> UploadFile {
    UploadFile {
        file_name: "umbrella.jpg".to_string(),
        content_type: "image/jpeg".to_string(),
        bytes: vec![0xFF, 0xD8, 0xFF],
    }
}

// --- list() ---

#[tokio::test]
async fn test_list_without_identity_is_empty_and_skips_remote() {
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 1));
    let store = ResourceStore::<Complaint>::owned(remote.clone(), SessionHandle::fixed(Session::anonymous()));

    assert!(store.list().await.unwrap().is_empty());
    assert_eq!(remote.select_calls(), 0);
}

#[tokio::test]
async fn test_complaints_are_scoped_to_owner_email() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 5));
    remote.seed(complaint("ben@campus.edu", 3));
    remote.seed(complaint("ana@campus.edu", 1));

    let store = ResourceStore::<Complaint>::owned(remote.clone(), handle_for(&ana));
    let rows = store.list().await.unwrap();

    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|c| c.owner_email == "ana@campus.edu"));
    assert!(rows[0].created_at > rows[1].created_at);
    assert_eq!(store.items(), rows);
}

#[tokio::test]
async fn test_admin_sees_every_complaint() {
    let dean = identity("dean@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 2));
    remote.seed(complaint("ben@campus.edu", 1));

    let store = ResourceStore::<Complaint>::owned(remote.clone(), admin_handle(&dean));

    assert_eq!(store.list().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_volunteers_are_scoped_to_owner_id() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<VolunteerRegistration>::new());
    for owner in [ana.id, Uuid::new_v4()] {
        remote.seed(VolunteerRegistration {
            id: Uuid::new_v4(),
            owner_id: owner,
            full_name: "Someone".to_string(),
            event_name: "Blood Drive".to_string(),
            availability: Availability::FullDay,
            created_at: Utc::now(),
        });
    }

    let store = ResourceStore::<VolunteerRegistration>::owned(remote.clone(), handle_for(&ana));
    let rows = store.list().await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].owner_id, ana.id);
}

#[tokio::test]
async fn test_lost_found_is_shared_and_newest_first() {
    let ben = identity("ben@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    remote.seed(item("Old keys", 30));
    remote.seed(item("New phone", 1));
    remote.seed(item("Wallet", 10));

    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ben));
    let titles: Vec<String> = store
        .list()
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.title)
        .collect();

    assert_eq!(titles, vec!["New phone", "Wallet", "Old keys"]);
}

#[tokio::test]
async fn test_list_failure_keeps_previous_items() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 1));
    let store = ResourceStore::<Complaint>::owned(remote.clone(), handle_for(&ana));
    let before = store.list().await.unwrap();

    remote.fail_with("permission denied for table complaints");
    let err = store.list().await.unwrap_err();

    assert_eq!(
        err,
        PortalError::Remote(RemoteError::Query(
            "permission denied for table complaints".to_string()
        ))
    );
    assert_eq!(store.items(), before);
}

// --- create() ---

#[tokio::test]
async fn test_create_injects_owner_and_default_status_then_refreshes() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    let store = ResourceStore::<Complaint>::owned(remote.clone(), handle_for(&ana));

    store
        .create(ComplaintDraft {
            category: ComplaintCategory::Water,
            description: "No water on floor 3".to_string(),
        })
        .await
        .unwrap();

    let items = store.items();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].owner_email, "ana@campus.edu");
    assert_eq!(items[0].status, ComplaintStatus::Submitted);
    assert_eq!(items[0].category, ComplaintCategory::Water);
    assert_eq!(items[0].description, "No water on floor 3");
    assert_eq!(remote.select_calls(), 1);
}

#[tokio::test]
async fn test_create_volunteer_is_owned_by_creator() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<VolunteerRegistration>::new());
    let store = ResourceStore::<VolunteerRegistration>::owned(remote.clone(), handle_for(&ana));

    store
        .create(VolunteerDraft {
            full_name: "Ana Ruiz".to_string(),
            event_name: "Campus Cleanup".to_string(),
            availability: Availability::Morning,
        })
        .await
        .unwrap();

    assert_eq!(remote.rows()[0].owner_id, ana.id);
    assert_eq!(store.items().len(), 1);
}

#[tokio::test]
async fn test_create_with_blank_field_never_reaches_remote() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    let store = ResourceStore::<Complaint>::owned(remote.clone(), handle_for(&ana));

    let err = store
        .create(ComplaintDraft {
            category: ComplaintCategory::Maintenance,
            description: "  ".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PortalError::Validation(ValidationError::MissingField {
            field: "description"
        })
    );
    assert_eq!(remote.insert_calls(), 0);
}

#[tokio::test]
async fn test_create_without_identity_is_rejected() {
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), SessionHandle::fixed(Session::anonymous()));

    assert_eq!(
        store.create(lost_draft()).await.unwrap_err(),
        PortalError::Unauthenticated
    );
    assert_eq!(remote.insert_calls(), 0);
}

#[tokio::test]
async fn test_create_failure_leaves_items_untouched() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    remote.seed(item("Wallet", 1));
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana));
    let before = store.list().await.unwrap();

    remote.fail_with("connection refused");
    let err = store.create(lost_draft()).await.unwrap_err();

    assert_eq!(err.to_string(), "connection refused");
    assert_eq!(store.items(), before);
    assert!(!store.is_submitting());
}

#[tokio::test]
async fn test_second_create_while_pending_is_busy() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    // The post-insert refresh stalls, keeping the first create in flight.
    remote.delay_selects(Duration::from_millis(300));
    let store = Arc::new(ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana)));

    let first = {
        let store = store.clone();
        tokio::spawn(async move { store.create(lost_draft()).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(store.is_submitting());
    assert_eq!(store.create(lost_draft()).await.unwrap_err(), PortalError::Busy);

    first.await.unwrap().unwrap();
    assert!(!store.is_submitting());
    assert_eq!(remote.insert_calls(), 1);
}

// --- update() / delete() ---

#[tokio::test]
async fn test_update_and_delete_refresh_the_store() {
    let dean = identity("dean@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    let target = complaint("ana@campus.edu", 1);
    remote.seed(target.clone());
    let store = ResourceStore::<Complaint>::unrestricted(remote.clone(), admin_handle(&dean));

    store
        .update(target.id, ComplaintPatch { status: ComplaintStatus::Resolved })
        .await
        .unwrap();
    assert_eq!(store.items()[0].status, ComplaintStatus::Resolved);

    store.delete(target.id).await.unwrap();
    assert!(store.items().is_empty());
    assert!(remote.rows().is_empty());
}

#[tokio::test]
async fn test_delete_missing_record_reports_not_found() {
    let dean = identity("dean@campus.edu");
    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    let store = ResourceStore::<Complaint>::unrestricted(remote.clone(), admin_handle(&dean));
    let missing = Uuid::new_v4();

    assert_eq!(
        store.delete(missing).await.unwrap_err(),
        PortalError::Remote(RemoteError::NotFound(missing))
    );
}

// --- create_with_image() ---

#[tokio::test]
async fn test_create_with_image_stores_public_url() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    let storage = Arc::new(MockStorageService::new());
    let uploader = StorageUploader::new(storage.clone());
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana));

    store
        .create_with_image(lost_draft(), Some(photo()), &uploader)
        .await
        .unwrap();

    let url = store.items()[0].image_url.clone().expect("image url");
    assert!(url.starts_with("http://localhost:9000/mock-bucket/"));
    assert!(url.ends_with(".jpg"));
    assert_eq!(storage.upload_count(), 1);
}

#[tokio::test]
async fn test_create_without_image_leaves_url_empty() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    let storage = Arc::new(MockStorageService::new());
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana));

    store
        .create_with_image(lost_draft(), None, &StorageUploader::new(storage.clone()))
        .await
        .unwrap();

    assert_eq!(store.items()[0].image_url, None);
    assert_eq!(storage.upload_count(), 0);
}

#[tokio::test]
async fn test_upload_failure_aborts_the_create() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    let uploader = StorageUploader::new(Arc::new(MockStorageService::new_failing()));
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana));

    let err = store
        .create_with_image(lost_draft(), Some(photo()), &uploader)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        PortalError::Upload(UploadError::new("Mock Storage Error: Simulation requested"))
    );
    assert_eq!(remote.insert_calls(), 0);
}

#[tokio::test]
async fn test_invalid_draft_is_rejected_before_upload() {
    let ana = identity("ana@campus.edu");
    let remote = Arc::new(InMemoryCollection::<LostFoundItem>::new());
    let storage = Arc::new(MockStorageService::new());
    let store = ResourceStore::<LostFoundItem>::owned(remote.clone(), handle_for(&ana));
    let mut draft = lost_draft();
    draft.title.clear();

    let err = store
        .create_with_image(draft, Some(photo()), &StorageUploader::new(storage.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, PortalError::Validation(_)));
    assert_eq!(storage.upload_count(), 0);
}

// --- identity change during list() ---

#[tokio::test]
async fn test_listing_for_previous_identity_is_discarded() {
    let provider = Arc::new(MockAuthProvider::new());
    provider.add_account("ana@campus.edu", "pw");
    provider.add_account("ben@campus.edu", "pw");
    let auth = AuthSession::init(provider.clone(), RolePolicy::default()).await;
    let mut watcher = auth.handle();

    auth.login("ana@campus.edu", "pw").await.unwrap();
    watcher.changed().await.unwrap();

    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 1));
    let store = Arc::new(ResourceStore::<Complaint>::owned(remote.clone(), auth.handle()));

    remote.delay_selects(Duration::from_millis(200));
    let in_flight = {
        let store = store.clone();
        tokio::spawn(async move { store.list().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    auth.login("ben@campus.edu", "pw").await.unwrap();
    watcher.changed().await.unwrap();

    assert_eq!(in_flight.await.unwrap(), Err(PortalError::StaleSession));
    assert!(store.items().is_empty());
}

#[tokio::test]
async fn test_listing_for_revoked_admin_role_is_discarded() {
    let provider = Arc::new(MockAuthProvider::new());
    provider.add_account("dean@campus.edu", "pw");
    provider.set_role_claim("dean@campus.edu", Some("admin"));
    let auth = AuthSession::init(provider.clone(), RolePolicy::default()).await;
    let mut watcher = auth.handle();

    auth.login("dean@campus.edu", "pw").await.unwrap();
    let session = watcher.changed().await.unwrap();
    assert!(session.is_admin());

    let remote = Arc::new(InMemoryCollection::<Complaint>::new());
    remote.seed(complaint("ana@campus.edu", 2));
    remote.seed(complaint("ben@campus.edu", 1));
    let store = Arc::new(ResourceStore::<Complaint>::owned(remote.clone(), auth.handle()));

    remote.delay_selects(Duration::from_millis(200));
    let in_flight = {
        let store = store.clone();
        tokio::spawn(async move { store.list().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Same identity id, but the refreshed token no longer carries the claim.
    provider.set_role_claim("dean@campus.edu", None);
    provider.refresh();
    let session = watcher.changed().await.unwrap();
    assert!(!session.is_admin());

    assert_eq!(in_flight.await.unwrap(), Err(PortalError::StaleSession));
    assert!(store.items().is_empty());
}
