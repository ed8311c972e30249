use campus_portal::{
    models::UserIdentity,
    navigation::{NavigationRoleGate, View},
    session::{RolePolicy, Session},
};
use uuid::Uuid;

fn viewer() -> Session {
    Session::resolve(
        Some(UserIdentity::new(Uuid::from_u128(1), "ana@campus.edu")),
        &RolePolicy::default(),
    )
}

fn admin() -> Session {
    let id = Uuid::from_u128(2);
    Session::resolve(
        Some(UserIdentity::new(id, "dean@campus.edu")),
        &RolePolicy::new([id]),
    )
}

#[test]
fn test_no_identity_forces_login_whatever_is_requested() {
    let anonymous = Session::anonymous();
    let mut gate = NavigationRoleGate::new(&anonymous);
    assert_eq!(gate.active_view(), View::Login);

    for requested in [View::LostFound, View::Complaints, View::Volunteer, View::Admin] {
        assert_eq!(gate.select(requested, &anonymous), View::Login);
    }
}

#[test]
fn test_sign_in_lands_on_lost_found() {
    let mut gate = NavigationRoleGate::new(&Session::anonymous());

    assert_eq!(gate.on_session_change(&viewer()), View::LostFound);
}

#[test]
fn test_viewer_cannot_select_admin() {
    let session = viewer();
    let mut gate = NavigationRoleGate::new(&session);
    gate.select(View::Complaints, &session);

    assert_eq!(gate.select(View::Admin, &session), View::LostFound);
}

#[test]
fn test_viewer_moves_freely_among_member_views() {
    let session = viewer();
    let mut gate = NavigationRoleGate::new(&session);

    assert_eq!(gate.select(View::Volunteer, &session), View::Volunteer);
    assert_eq!(gate.select(View::Complaints, &session), View::Complaints);
    assert_eq!(gate.select(View::LostFound, &session), View::LostFound);
}

#[test]
fn test_admin_view_is_kept_for_admin() {
    let session = admin();
    let mut gate = NavigationRoleGate::new(&session);

    assert_eq!(gate.select(View::Admin, &session), View::Admin);
    assert_eq!(gate.on_session_change(&session), View::Admin);
}

#[test]
fn test_identity_swap_drops_admin_view() {
    let mut gate = NavigationRoleGate::new(&admin());
    gate.select(View::Admin, &admin());

    assert_eq!(gate.on_session_change(&viewer()), View::LostFound);
}

#[test]
fn test_member_view_survives_identity_swap() {
    let mut gate = NavigationRoleGate::new(&viewer());
    gate.select(View::Volunteer, &viewer());

    assert_eq!(gate.on_session_change(&admin()), View::Volunteer);
}

#[test]
fn test_render_rechecks_role() {
    let mut gate = NavigationRoleGate::new(&admin());
    gate.select(View::Admin, &admin());

    // No transition event in between: render alone must refuse the view.
    assert_eq!(gate.render(&viewer()), View::LostFound);
    assert_eq!(gate.render(&Session::anonymous()), View::Login);
    assert_eq!(gate.render(&admin()), View::Admin);
}

#[test]
fn test_login_view_resolves_to_landing_when_signed_in() {
    assert_eq!(NavigationRoleGate::resolve(View::Login, &viewer()), View::LostFound);
}

#[test]
fn test_reachable_views_by_role() {
    assert_eq!(
        NavigationRoleGate::reachable_views(&Session::anonymous()),
        vec![View::Login]
    );
    assert!(!NavigationRoleGate::reachable_views(&viewer()).contains(&View::Admin));
    assert_eq!(
        NavigationRoleGate::reachable_views(&admin()),
        vec![View::LostFound, View::Complaints, View::Volunteer, View::Admin]
    );
}

#[test]
fn test_sign_out_forces_login() {
    let mut gate = NavigationRoleGate::new(&viewer());
    gate.select(View::Complaints, &viewer());

    assert_eq!(gate.on_session_change(&Session::anonymous()), View::Login);
}
