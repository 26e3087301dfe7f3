//! Integration tests for the account lifecycle.
//!
//! Signup, activation, expiry, reissue, sign-in and email change, driven
//! through the public Application API.

mod common;

use std::collections::HashSet;

use common::{key_from_body, test_config, TestApp, PASSWORD};
use userbase::auth::token::{is_key_format, ACTIVATED};
use userbase::{AccountState, ActivationStatus, AuthError, SignupRequest, UserbaseError};

#[tokio::test]
async fn test_alice_signs_up_and_activates() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();

    let alice = accounts
        .create_inactive_user("alice", "alice@example.com", "swordfish")
        .await
        .unwrap();
    assert!(!alice.is_active);
    assert_eq!(t.mail.len(), 1);

    let email = t.mail.last().unwrap();
    assert_eq!(email.to, vec!["alice@example.com".to_string()]);
    let token = t.last_key();
    assert!(email
        .body
        .contains(&format!("https://example.com/accounts/activate/alice/{token}/")));

    let activated = accounts.activate_user("alice", &token).await.unwrap().unwrap();
    assert!(activated.is_active);

    let account = accounts.get_account(alice.id).await.unwrap().unwrap();
    assert_eq!(account.activation_key, ACTIVATED);
    assert_eq!(account.state(7, t.app.now()), AccountState::Active);

    // The consumed token never works twice.
    assert!(accounts.activate_user("alice", &token).await.unwrap().is_none());
    assert_eq!(
        accounts.check_expired_activation("alice", &token).await.unwrap(),
        ActivationStatus::AlreadyActivated
    );
}

#[tokio::test]
async fn test_tokens_are_hex_and_unique() {
    let t = TestApp::new().await;
    let mut seen = HashSet::new();
    for i in 0..10 {
        let name = format!("user{i}");
        t.app
            .accounts()
            .signup(&SignupRequest::new(
                name.clone(),
                format!("{name}@example.com"),
                PASSWORD,
            ))
            .await
            .unwrap();
        let token = t.last_key();
        assert!(is_key_format(&token));
        assert!(seen.insert(token));
    }
}

#[tokio::test]
async fn test_expired_activation_stays_pending_and_is_swept() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();
    let bob = accounts
        .create_inactive_user("bob", "bob@example.com", PASSWORD)
        .await
        .unwrap();
    let token = t.last_key();
    t.active_user("carol").await;

    t.advance_days(8);
    assert!(accounts.activate_user("bob", &token).await.unwrap().is_none());
    assert_eq!(
        accounts.check_expired_activation("bob", &token).await.unwrap(),
        ActivationStatus::Expired
    );

    let account = accounts.get_account(bob.id).await.unwrap().unwrap();
    assert_eq!(account.activation_key, token);
    assert_eq!(account.state(7, t.app.now()), AccountState::Expired);
    assert!(!accounts.get_user("bob").await.unwrap().unwrap().is_active);

    let deleted = accounts.delete_expired_users().await.unwrap();
    assert_eq!(
        deleted.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(),
        vec!["bob"]
    );
    assert!(accounts.get_user("bob").await.unwrap().is_none());
    assert!(accounts.get_account(bob.id).await.unwrap().is_none());
    assert!(accounts.get_user("carol").await.unwrap().is_some());
}

#[tokio::test]
async fn test_reissue_after_expiry() {
    let mut config = test_config();
    config.accounts.activation_retry = true;
    let t = TestApp::with_config(config).await;
    let accounts = t.app.accounts();

    accounts
        .create_inactive_user("dave", "dave@example.com", PASSWORD)
        .await
        .unwrap();
    let old = t.last_key();

    assert!(!accounts.reissue_activation("dave", &old).await.unwrap());
    t.advance_days(8);
    assert!(accounts.reissue_activation("dave", &old).await.unwrap());
    assert_eq!(t.mail.len(), 2);

    let fresh = t.last_key();
    assert_ne!(fresh, old);
    assert!(accounts.activate_user("dave", &old).await.unwrap().is_none());
    assert!(accounts.activate_user("dave", &fresh).await.unwrap().is_some());
}

#[tokio::test]
async fn test_reminder_sent_once_before_expiry() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();
    accounts
        .create_inactive_user("erin", "erin@example.com", PASSWORD)
        .await
        .unwrap();
    t.mail.clear();

    assert!(accounts.notify_almost_expired().await.unwrap().is_empty());
    t.advance_days(3);
    let notified = accounts.notify_almost_expired().await.unwrap();
    assert_eq!(notified.len(), 1);
    assert_eq!(t.mail.len(), 1);
    assert!(accounts.notify_almost_expired().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_signin_after_activation() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();
    accounts
        .signup(&SignupRequest::new("frank", "Frank@Example.com", PASSWORD))
        .await
        .unwrap();

    assert!(matches!(
        accounts.signin("frank", PASSWORD).await,
        Err(UserbaseError::Auth(AuthError::Inactive))
    ));

    let token = t.last_key();
    accounts.activate_user("frank", &token).await.unwrap().unwrap();

    let user = accounts.signin("frank@example.com", PASSWORD).await.unwrap();
    assert_eq!(user.username, "frank");
    assert_eq!(user.last_login, Some(t.app.now()));
    assert!(matches!(
        accounts.signin("frank", "wrong-password").await,
        Err(UserbaseError::Auth(AuthError::InvalidCredentials))
    ));
}

#[tokio::test]
async fn test_change_and_confirm_email() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();
    let grace = t.active_user("grace").await;

    accounts
        .change_email(grace.id, "grace@new.example.com")
        .await
        .unwrap();
    let outbox = t.mail.outbox();
    assert_eq!(outbox.len(), 2);
    let confirmation = outbox
        .iter()
        .find(|m| m.to == vec!["grace@new.example.com".to_string()])
        .unwrap();
    let token = key_from_body(&confirmation.body).unwrap();
    assert!(outbox
        .iter()
        .any(|m| m.to == vec!["grace@example.com".to_string()]));

    // A wrong token leaves the primary email alone.
    assert!(accounts
        .confirm_email("grace", &"0".repeat(40))
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        accounts.get_user("grace").await.unwrap().unwrap().email,
        "grace@example.com"
    );

    let confirmed = accounts.confirm_email("grace", &token).await.unwrap().unwrap();
    assert_eq!(confirmed.email, "grace@new.example.com");
    let account = accounts.get_account(grace.id).await.unwrap().unwrap();
    assert!(account.email_unconfirmed.is_empty());
    assert!(account.email_confirmation_key.is_empty());

    // Used once, never again.
    assert!(accounts.confirm_email("grace", &token).await.unwrap().is_none());
}

#[tokio::test]
async fn test_change_password_then_signin() {
    let t = TestApp::new().await;
    let accounts = t.app.accounts();
    let heidi = t.active_user("heidi").await;

    accounts
        .change_password(heidi.id, PASSWORD, "correct horse", "correct horse")
        .await
        .unwrap();
    assert!(accounts.signin("heidi", PASSWORD).await.is_err());
    assert!(accounts.signin("heidi", "correct horse").await.is_ok());
}
