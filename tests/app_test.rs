mod common;

use agrirent::app::{App, SignUpForm};
use agrirent::booking::BookingDenied;
use agrirent::model::{AuthEvent, ListingStatus, Role};
use agrirent::notify::NotificationKind;
use agrirent::router::{Route, View};
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_sign_in_lands_on_role_dashboard() {
    let backend = Arc::new(
        RecordingBackend::default()
            .with_user(1, "Mike Johnson", &["owner", "farmer"])
            .await
            .with_account(1, "mike@farm.io", "secret")
            .await,
    );
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);

    app.sign_in(" mike@farm.io ", "secret").await.unwrap();
    // The sign-in is resolved once, from the backend's event.
    assert_eq!(backend.calls_named("current_identity").await, 1);

    assert_eq!(app.state().view(), View::MachineOwnerDashboard);
    let user = app.state().user().unwrap();
    assert_eq!(user.role, Role::Owner);
    assert_eq!(
        sink.messages(),
        vec![(NotificationKind::Success, "Welcome, Mike Johnson!".to_string())]
    );

    // Owners are kept out of the admin dashboard.
    assert_eq!(
        app.state_mut().navigate("admin-dashboard"),
        Route::Forbidden {
            requested: View::AdminDashboard,
            role: Role::Owner
        }
    );
}

#[tokio::test]
async fn test_failed_sign_in_keeps_guest_state() {
    let backend = Arc::new(
        RecordingBackend::default()
            .with_account(1, "mike@farm.io", "secret")
            .await,
    );
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend, notifier);

    assert!(app.sign_in("mike@farm.io", "guess").await.is_err());
    assert!(app.state().user().is_none());
    assert_eq!(app.state().view(), View::Home);
    assert_eq!(
        sink.messages(),
        vec![(NotificationKind::Error, "Invalid login credentials".to_string())]
    );
}

#[tokio::test]
async fn test_restored_session_is_silent_and_sign_out_goes_home() {
    let backend = Arc::new(RecordingBackend::default().with_user(2, "Asha", &["admin"]).await);
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);

    backend.emit(AuthEvent::InitialSession(Some(session_for(
        2,
        "asha@farm.io",
    ))));
    app.sync_auth().await.unwrap();
    assert_eq!(app.state().view(), View::AdminDashboard);
    assert!(sink.messages().is_empty());

    app.sign_out().await.unwrap();
    assert!(app.state().user().is_none());
    assert_eq!(app.state().view(), View::Home);
    assert_eq!(backend.calls_named("sign_out").await, 1);
}

#[tokio::test]
async fn test_sign_up_sends_profile_and_shows_login() {
    let backend = Arc::new(RecordingBackend::default());
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);

    let form = SignUpForm {
        email: "new@farm.io".into(),
        password: "pw".into(),
        name: " Ravi ".into(),
        phone: "".into(),
        region: "Punjab".into(),
        role: Some(Role::Owner),
    };
    app.sign_up(&form).await.unwrap();

    let signups = backend.signups.lock().await.clone();
    assert_eq!(signups.len(), 1);
    assert_eq!(signups[0].0, "new@farm.io");
    assert_eq!(signups[0].1.display_name, "Ravi");
    assert_eq!(signups[0].1.role, Role::Owner);
    assert!(signups[0].1.phone.is_none());

    assert_eq!(app.state().view(), View::Login);
    assert_eq!(
        sink.texts(),
        vec!["Confirmation email sent. Please check your inbox."]
    );
}

#[tokio::test]
async fn test_guest_booking_redirects_to_login() {
    let backend = Arc::new(RecordingBackend::default().with_user(3, "Sarah", &["farmer"]).await);
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);
    let item = listing(1, "John Deere 5075E", id(10), ListingStatus::Available);

    assert_eq!(
        app.open_booking(item.clone()).unwrap_err(),
        BookingDenied::NotSignedIn
    );
    assert_eq!(app.state().view(), View::Login);
    assert_eq!(sink.texts(), vec!["Please login to book equipment"]);

    backend.emit(AuthEvent::SignedIn(session_for(3, "sarah@farm.io")));
    app.sync_auth().await.unwrap();
    let flow = app.open_booking(item).unwrap();
    assert_eq!(flow.form.full_name, "Sarah");
    assert_eq!(flow.form.email, "sarah@farm.io");
}

#[tokio::test]
async fn test_state_follows_backend_auth_events() {
    let backend = Arc::new(
        RecordingBackend::default()
            .with_user(4, "Grace", &["farmer"])
            .await
            .with_user(5, "Mike", &["owner"])
            .await,
    );
    let (notifier, sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);

    // Nothing delivered yet.
    app.sync_auth().await.unwrap();
    assert!(app.state().user().is_none());

    backend.emit(AuthEvent::SignedIn(session_for(4, "grace@farm.io")));
    app.sync_auth().await.unwrap();
    assert_eq!(app.state().view(), View::FarmerDashboard);

    // Several queued events are applied in delivery order.
    backend.emit(AuthEvent::SignedOut);
    backend.emit(AuthEvent::TokenRefreshed(session_for(5, "mike@farm.io")));
    app.sync_auth().await.unwrap();
    assert_eq!(app.state().user().unwrap().id, id(5));
    assert_eq!(app.state().view(), View::MachineOwnerDashboard);

    backend.emit(AuthEvent::SignedOut);
    app.sync_auth().await.unwrap();
    assert!(app.state().user().is_none());
    assert_eq!(app.state().view(), View::Home);
    assert_eq!(sink.texts(), vec!["Welcome, Grace!"]);
}

#[tokio::test]
async fn test_failed_lookups_never_keep_the_previous_user() {
    let backend = Arc::new(
        RecordingBackend::default()
            .with_user(1, "Ann", &["admin"])
            .await
            .with_user(2, "Bob", &["owner"])
            .await
            .with_account(1, "ann@farm.io", "a")
            .await
            .with_account(2, "bob@farm.io", "b")
            .await,
    );
    backend.failing_role_lookups.lock().await.push(id(2));
    let (notifier, _sink) = recording_notifier();
    let mut app = App::new(backend.clone(), notifier);

    app.sign_in("ann@farm.io", "a").await.unwrap();
    assert_eq!(app.state().user().unwrap().role, Role::Admin);

    // Roles are unavailable for Bob, so Bob is a plain user, never Ann's admin.
    app.sign_in("bob@farm.io", "b").await.unwrap();
    let user = app.state().user().unwrap();
    assert_eq!(user.id, id(2));
    assert_eq!(user.role, Role::User);
    assert_eq!(user.name, "Bob");
    assert_eq!(app.state().view(), View::Home);

    backend.failing_identities.lock().await.push(id(1));
    assert!(app.sign_in("ann@farm.io", "a").await.is_err());
    assert!(app.state().user().is_none());
    assert_eq!(app.state().view(), View::Home);
}
