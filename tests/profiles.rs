//! Integration tests for profiles and object permissions.

mod common;

use common::TestApp;
use userbase::db::{ObjectRef, CHANGE_PROFILE, VIEW_PROFILE};
use userbase::{Privacy, ProfileUpdate, PublicProfile, UserbaseError};

#[tokio::test]
async fn test_new_user_owns_their_profile() {
    let t = TestApp::new().await;
    let alice = t.active_user("alice").await;

    let perms = t
        .app
        .permissions()
        .get_perms(alice.id, ObjectRef::profile(alice.id))
        .await
        .unwrap();
    assert!(perms.contains(VIEW_PROFILE));
    assert!(perms.contains(CHANGE_PROFILE));

    let profile = t.app.profiles().get_profile("alice").await.unwrap().unwrap();
    assert_eq!(profile.privacy(), Privacy::Registered);
    assert_eq!(profile.display_name(), "alice");
    assert!(profile
        .mugshot_url(&t.app.config().mugshot)
        .unwrap()
        .starts_with("https://secure.gravatar.com/avatar/"));
}

#[tokio::test]
async fn test_privacy_levels_end_to_end() {
    let t = TestApp::new().await;
    let alice = t.active_user("alice").await;
    let bob = t.active_user("bob").await;
    let profiles = t.app.profiles();

    profiles
        .update_profile(&alice, "alice", &ProfileUpdate::new().privacy(Privacy::Closed))
        .await
        .unwrap();
    assert!(matches!(
        profiles.get_profile_for(Some(&bob), "alice").await,
        Err(UserbaseError::Permission(_))
    ));

    profiles
        .update_profile(&alice, "alice", &ProfileUpdate::new().privacy(Privacy::Open))
        .await
        .unwrap();
    let view = profiles.get_profile_for(None, "alice").await.unwrap();
    assert_eq!(view.username, "alice");
    assert_eq!(view.privacy, Privacy::Open);

    let listed = profiles.list_profiles(None, 1, 10).await.unwrap();
    assert_eq!(listed.total, 1);
}

#[tokio::test]
async fn test_superuser_edits_any_profile() {
    let t = TestApp::new().await;
    t.active_user("alice").await;
    let bob = t.active_user("bob").await;
    let root = userbase::User {
        is_superuser: true,
        is_staff: true,
        ..bob.clone()
    };

    assert!(t
        .app
        .profiles()
        .update_profile(&bob, "alice", &ProfileUpdate::new().location("Nowhere"))
        .await
        .is_err());
    let updated = t
        .app
        .profiles()
        .update_profile(&root, "alice", &ProfileUpdate::new().location("Wonderland"))
        .await
        .unwrap();
    assert_eq!(updated.profile.location, "Wonderland");
}
