use campus_portal::{
    error::PortalError,
    models::{
        Complaint, ComplaintCategory, ComplaintDraft, ComplaintStatus, ItemKind, LostFoundDraft,
    },
    navigation::View,
    portal::Portal,
    prompt::{Notice, NoticeLevel, Notifier, Preconfirmed},
    provider::MockAuthProvider,
    repository::InMemoryCollections,
    session::{LogoutOutcome, RolePolicy},
    storage::{MockStorageService, UploadFile},
};
use chrono::Utc;
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use uuid::Uuid;

// --- Helpers ---

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn last(&self) -> Option<Notice> {
        self.notices().last().cloned()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

struct TestPortal {
    portal: Portal,
    provider: Arc<MockAuthProvider>,
    remote: InMemoryCollections,
    storage: Arc<MockStorageService>,
    notifier: Arc<RecordingNotifier>,
}

async fn start(admin_emails: &[&str]) -> TestPortal {
    let provider = Arc::new(MockAuthProvider::new());
    provider.add_account("ana@campus.edu", "pw");
    provider.add_account("ben@campus.edu", "pw");
    let admins: Vec<Uuid> = admin_emails
        .iter()
        .map(|email| provider.add_account(email, "pw").id)
        .collect();

    let remote = InMemoryCollections::new();
    remote.complaints.seed(complaint_from("ana@campus.edu"));
    remote.complaints.seed(complaint_from("ben@campus.edu"));

    let storage = Arc::new(MockStorageService::new());
    let notifier = Arc::new(RecordingNotifier::default());

    let portal = Portal::start(
        provider.clone(),
        RolePolicy::new(admins),
        remote.collections(),
        storage.clone(),
        Arc::new(Preconfirmed(true)),
        notifier.clone(),
    )
    .await;

    TestPortal {
        portal,
        provider,
        remote,
        storage,
        notifier,
    }
}

fn complaint_from(email: &str) -> Complaint {
    Complaint {
        id: Uuid::new_v4(),
        owner_email: email.to_string(),
        category: ComplaintCategory::Water,
        description: "Tap leaking in block C".to_string(),
        status: ComplaintStatus::Submitted,
        created_at: Utc::now(),
    }
}

fn owners(portal: &Portal) -> Vec<String> {
    portal
        .complaints()
        .items()
        .into_iter()
        .map(|c| c.owner_email)
        .collect()
}

// --- Startup ---

#[tokio::test]
async fn test_starts_on_login_without_remote_calls() {
    let t = start(&[]).await;

    assert_eq!(t.portal.active_view(), View::Login);
    assert_eq!(t.portal.reachable_views(), vec![View::Login]);
    assert!(t.portal.complaints().items().is_empty());
    assert_eq!(t.remote.complaints.select_calls(), 0);
}

// --- Session transitions ---

#[tokio::test]
async fn test_login_lands_on_lost_found_and_loads_own_rows() {
    let t = start(&[]).await;

    t.portal.login("ana@campus.edu", "pw").await.unwrap();

    wait_until(|| owners(&t.portal) == vec!["ana@campus.edu".to_string()]).await;
    assert_eq!(t.portal.active_view(), View::LostFound);
    assert_eq!(
        t.notifier.last(),
        Some(Notice::success("Signed in."))
    );
}

#[tokio::test]
async fn test_failed_login_notifies_provider_message() {
    let t = start(&[]).await;

    let err = t.portal.login("ana@campus.edu", "nope").await.unwrap_err();

    assert_eq!(err.to_string(), "Invalid login credentials");
    assert_eq!(
        t.notifier.last(),
        Some(Notice::error("Invalid login credentials"))
    );
    assert_eq!(t.portal.active_view(), View::Login);
}

#[tokio::test]
async fn test_admin_reaches_moderation_with_all_rows() {
    let t = start(&["dean@campus.edu"]).await;

    t.portal.login("dean@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.moderation().complaints().items().len() == 2).await;

    assert_eq!(t.portal.select_view(View::Admin), View::Admin);
    assert_eq!(t.portal.active_view(), View::Admin);
    // The owned store of an admin is not narrowed to their email either.
    assert_eq!(t.portal.complaints().items().len(), 2);
}

#[tokio::test]
async fn test_switching_to_viewer_drops_admin_view() {
    let t = start(&["dean@campus.edu"]).await;
    t.portal.login("dean@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.moderation().complaints().items().len() == 2).await;
    t.portal.select_view(View::Admin);

    t.portal.login("ben@campus.edu", "pw").await.unwrap();
    wait_until(|| owners(&t.portal) == vec!["ben@campus.edu".to_string()]).await;
    assert_eq!(t.portal.active_view(), View::LostFound);

    // The gate itself moved off Admin, so signing the admin back in does not
    // resurrect the old view.
    t.portal.login("dean@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.complaints().items().len() == 2).await;
    assert_eq!(t.portal.active_view(), View::LostFound);
}

#[tokio::test]
async fn test_viewer_cannot_select_admin() {
    let t = start(&[]).await;
    t.portal.login("ana@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.session().identity().is_some()).await;

    assert_eq!(t.portal.select_view(View::Admin), View::LostFound);
    assert!(!t.portal.reachable_views().contains(&View::Admin));
}

#[tokio::test]
async fn test_logout_returns_to_login_and_clears_stores() {
    let t = start(&[]).await;
    t.portal.login("ana@campus.edu", "pw").await.unwrap();
    wait_until(|| !t.portal.complaints().items().is_empty()).await;

    let outcome = t.portal.logout(&Preconfirmed(true)).await.unwrap();

    assert_eq!(outcome, LogoutOutcome::SignedOut);
    wait_until(|| t.portal.complaints().items().is_empty()).await;
    assert_eq!(t.portal.active_view(), View::Login);
}

#[tokio::test]
async fn test_logout_cancelled_keeps_everything() {
    let t = start(&[]).await;
    t.portal.login("ana@campus.edu", "pw").await.unwrap();
    wait_until(|| !t.portal.complaints().items().is_empty()).await;

    let outcome = t.portal.logout(&Preconfirmed(false)).await.unwrap();

    assert_eq!(outcome, LogoutOutcome::Cancelled);
    assert_eq!(t.portal.active_view(), View::LostFound);
    assert_eq!(t.portal.complaints().items().len(), 1);
}

// --- Submissions ---

#[tokio::test]
async fn test_submit_complaint_notifies_and_refreshes() {
    let t = start(&[]).await;
    t.portal.login("ana@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.complaints().items().len() == 1).await;

    t.portal
        .submit_complaint(ComplaintDraft {
            category: ComplaintCategory::Internet,
            description: "Wi-Fi down in library".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(t.notifier.last(), Some(Notice::success("Complaint submitted.")));
    assert_eq!(t.portal.complaints().items().len(), 2);
}

#[tokio::test]
async fn test_submit_while_signed_out_is_refused() {
    let t = start(&[]).await;

    let err = t
        .portal
        .submit_complaint(ComplaintDraft {
            category: ComplaintCategory::Internet,
            description: "Wi-Fi down".to_string(),
        })
        .await
        .unwrap_err();

    assert_eq!(err, PortalError::Unauthenticated);
    assert_eq!(t.notifier.last().map(|n| n.level), Some(NoticeLevel::Error));
    assert_eq!(t.remote.complaints.insert_calls(), 0);
}

#[tokio::test]
async fn test_report_item_with_photo() {
    let t = start(&[]).await;
    t.portal.login("ana@campus.edu", "pw").await.unwrap();
    wait_until(|| t.portal.session().identity().is_some()).await;

    t.portal
        .report_item(
            LostFoundDraft {
                title: "Umbrella".to_string(),
                description: "Black, left in hall B".to_string(),
                kind: ItemKind::Found,
                image_url: None,
            },
            Some(UploadFile {
                file_name: "umbrella.png".to_string(),
                content_type: "image/png".to_string(),
                bytes: vec![1, 2, 3],
            }),
        )
        .await
        .unwrap();

    assert_eq!(t.storage.upload_count(), 1);
    let rows = t.remote.lost_found.rows();
    assert_eq!(rows.len(), 1);
    assert!(rows[0].image_url.as_deref().unwrap().ends_with(".png"));
    assert_eq!(t.notifier.last(), Some(Notice::success("Item reported.")));
}

// --- Lifecycle ---

#[tokio::test]
async fn test_teardown_is_idempotent_and_unsubscribes() {
    let t = start(&[]).await;
    assert!(t.provider.subscriber_count() > 0);

    t.portal.teardown();
    t.portal.teardown();

    wait_until(|| t.provider.subscriber_count() == 0).await;
}
