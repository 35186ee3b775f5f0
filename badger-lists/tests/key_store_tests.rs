//! List key store: creation, sharing, revocation, rotation and reconcile.

mod support;

use badger_crypto::{decrypt_string, encrypt_string, key_id};
use badger_lists::memory::InMemoryDocumentStore;
use badger_lists::{DocumentStore, ListError, ReconcileReport, WrapEntry};
use chrono::Utc;
use pretty_assertions::assert_eq;
use support::{Device, ALICE, BOB, CAROL};

fn members(ids: &[&str]) -> Vec<String> {
    ids.iter().map(|id| id.to_string()).collect()
}

#[tokio::test]
async fn create_then_get_returns_same_key() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;

    let created = alice.key_store.create_key("list-1").await.unwrap();
    let fetched = alice.key_store.get_key("list-1").await.unwrap();

    assert_eq!(created.version, 1);
    assert_eq!(fetched.version, 1);
    assert_eq!(fetched.key, created.key);
}

#[tokio::test]
async fn create_twice_is_rejected() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;

    alice.key_store.create_key("list-1").await.unwrap();
    let err = alice.key_store.create_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::InvalidArgument(_)));
}

#[tokio::test]
async fn create_without_private_key_fails() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::install(&remote, ALICE, badger_lists::ListsConfig::test()).await;

    let err = alice.key_store.create_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::PrivateKeyMissing { .. }));
}

#[tokio::test]
async fn shared_user_unwraps_identical_key() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    let key = alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    let bob_key = bob.key_store.get_key("list-1").await.unwrap();
    assert_eq!(bob_key.key, key.key);
    assert_eq!(bob_key.version, key.version);

    let entry = remote.get_wrap_entry("list-1", BOB).await.unwrap().unwrap();
    assert_eq!(entry.wrapped_by, ALICE);
    assert_eq!(
        entry.recipient_key_id,
        bob.keys.retrieve_private_key(BOB).await.unwrap().key_id()
    );
}

#[tokio::test]
async fn user_without_entry_gets_key_not_found() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();

    let err = bob.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { ref list_id } if list_id == "list-1"));
}

#[tokio::test]
async fn share_with_user_without_public_key_fails() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;

    alice.key_store.create_key("list-1").await.unwrap();
    let err = alice.key_store.share_with("list-1", CAROL).await.unwrap_err();

    assert!(matches!(err, ListError::RecipientKeyUnavailable { ref user_id } if user_id == CAROL));
    assert_eq!(remote.wrap_entry_count("list-1").await, 1);
}

#[tokio::test]
async fn non_holder_cannot_share() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let _carol = Device::ready(&remote, CAROL).await;

    alice.key_store.create_key("list-1").await.unwrap();
    let err = bob.key_store.share_with("list-1", CAROL).await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { .. }));
}

#[tokio::test]
async fn revoke_removes_access() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    assert!(bob.key_store.get_key("list-1").await.is_ok());

    alice.key_store.revoke("list-1", BOB).await.unwrap();
    let err = bob.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { .. }));
}

#[tokio::test]
async fn signed_out_user_is_not_authenticated() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    alice.key_store.create_key("list-1").await.unwrap();

    alice.identity.sign_out();
    let err = alice.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::NotAuthenticated));
}

#[tokio::test]
async fn lost_private_key_is_reported_as_missing() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    alice.key_store.create_key("list-1").await.unwrap();

    alice.prefs.clear().await;
    let err = alice.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::PrivateKeyMissing { .. }));
}

// ── Rotation ──

#[tokio::test]
async fn rotation_excludes_revoked_user() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    let bob_old = bob.key_store.get_key("list-1").await.unwrap();

    let rotated = alice
        .key_store
        .rotate("list-1", &members(&[ALICE]))
        .await
        .unwrap();
    assert_eq!(rotated.version, 2);
    assert_ne!(rotated.key, bob_old.key);

    let err = bob.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { .. }));
    assert_eq!(remote.wrap_entry_count("list-1").await, 1);

    let fresh = encrypt_string(&rotated.key, "new item", Some("ctx")).unwrap();
    assert!(decrypt_string(&bob_old.key, &fresh, Some("ctx")).is_err());

    let alice_key = alice.key_store.get_key("list-1").await.unwrap();
    assert_eq!(alice_key.key, rotated.key);
}

#[tokio::test]
async fn rotation_rewraps_for_every_authorized_user() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let carol = Device::ready(&remote, CAROL).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    let rotated = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL, BOB]))
        .await
        .unwrap();

    for device in [&alice, &bob, &carol] {
        let key = device.key_store.get_key("list-1").await.unwrap();
        assert_eq!(key.key, rotated.key);
        assert_eq!(key.version, 2);
    }
    assert_eq!(remote.wrap_entry_count("list-1").await, 3);
}

#[tokio::test]
async fn share_racing_rotation_fails_closed() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let carol = Device::ready(&remote, CAROL).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    // Bob reads the v1 key and starts sharing with Carol.
    let stale = bob.key_store.get_key("list-1").await.unwrap();
    let carol_public = bob.keys.fetch_public_key(CAROL).await.unwrap().unwrap();

    // Alice rotates before Bob's write lands.
    alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB]))
        .await
        .unwrap();

    remote
        .put_wrap_entry(&WrapEntry {
            list_id: "list-1".into(),
            user_id: CAROL.into(),
            wrapped_key: bob.keys.wrap(&stale.key, &carol_public).unwrap(),
            key_version: stale.version,
            recipient_key_id: key_id(&carol_public),
            wrapped_by: BOB.into(),
            created_at: Utc::now(),
            pending: None,
        })
        .await
        .unwrap();

    let err = carol.key_store.get_key("list-1").await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { .. }));
}

#[tokio::test]
async fn rotation_with_unpublished_member_changes_nothing() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;

    let original = alice.key_store.create_key("list-1").await.unwrap();
    let err = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, CAROL]))
        .await
        .unwrap_err();
    assert!(matches!(err, ListError::RecipientKeyUnavailable { .. }));

    let current = alice.key_store.get_key("list-1").await.unwrap();
    assert_eq!(current.version, 1);
    assert_eq!(current.key, original.key);
}

#[tokio::test]
async fn interrupted_rotation_can_be_retried() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let carol = Device::ready(&remote, CAROL).await;

    let original = alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    alice.key_store.share_with("list-1", CAROL).await.unwrap();

    // One wrap entry lands, then the connection drops.
    remote.set_write_budget(Some(1)).await;
    let err = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    remote.set_write_budget(None).await;

    // The rotating user still holds the old key.
    let still = alice.key_store.get_key("list-1").await.unwrap();
    assert_eq!(still.version, 1);
    assert_eq!(still.key, original.key);

    let rotated = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap();
    assert_eq!(rotated.version, 2);
    for device in [&alice, &bob, &carol] {
        assert_eq!(device.key_store.get_key("list-1").await.unwrap().key, rotated.key);
    }
}

#[tokio::test]
async fn rotation_failing_at_commit_keeps_every_holder_on_current_key() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let carol = Device::ready(&remote, CAROL).await;

    let original = alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    alice.key_store.share_with("list-1", CAROL).await.unwrap();

    // Every wrap entry is staged, then the key state write fails.
    remote.set_write_budget(Some(3)).await;
    let err = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    remote.set_write_budget(None).await;

    for device in [&alice, &bob, &carol] {
        let key = device.key_store.get_key("list-1").await.unwrap();
        assert_eq!(key.version, 1);
        assert_eq!(key.key, original.key);
    }

    let rotated = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap();
    assert_eq!(rotated.version, 2);
    for device in [&alice, &bob, &carol] {
        assert_eq!(device.key_store.get_key("list-1").await.unwrap().key, rotated.key);
    }
    for entry in alice.key_store.entries("list-1").await.unwrap() {
        assert_eq!(entry.key_version, 2);
        assert!(entry.pending.is_none());
    }
}

#[tokio::test]
async fn rotation_failing_after_commit_serves_staged_key() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;
    let carol = Device::ready(&remote, CAROL).await;

    let original = alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    alice.key_store.share_with("list-1", CAROL).await.unwrap();

    // Staging and the key state land; promotion does not.
    remote.set_write_budget(Some(4)).await;
    let err = alice
        .key_store
        .rotate("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    remote.set_write_budget(None).await;

    let next = alice.key_store.get_key("list-1").await.unwrap();
    assert_eq!(next.version, 2);
    assert_ne!(next.key, original.key);
    for device in [&bob, &carol] {
        assert_eq!(device.key_store.get_key("list-1").await.unwrap().key, next.key);
    }
    let old = bob.key_store.key_for_version("list-1", 1).await.unwrap();
    assert_eq!(old.key, original.key);

    let report = alice
        .key_store
        .reconcile("list-1", &members(&[ALICE, BOB, CAROL]))
        .await
        .unwrap();
    assert_eq!(report.rewrapped, members(&[ALICE, BOB, CAROL]));
    for entry in alice.key_store.entries("list-1").await.unwrap() {
        assert_eq!(entry.key_version, 2);
        assert!(entry.pending.is_none());
    }
    for device in [&alice, &bob, &carol] {
        assert_eq!(device.key_store.get_key("list-1").await.unwrap().key, next.key);
    }
}

#[tokio::test]
async fn older_versions_resolve_through_history() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    let v1 = alice.key_store.create_key("list-1").await.unwrap();
    let everyone = members(&[ALICE, BOB]);
    let v2 = alice.key_store.rotate("list-1", &everyone).await.unwrap();
    let v3 = alice.key_store.rotate("list-1", &everyone).await.unwrap();
    assert_eq!(v3.version, 3);

    // Bob joined at v2 but can still read v1 content.
    let old = bob.key_store.key_for_version("list-1", 1).await.unwrap();
    assert_eq!(old.key, v1.key);
    assert_eq!(old.version, 1);
    let mid = bob.key_store.key_for_version("list-1", 2).await.unwrap();
    assert_eq!(mid.key, v2.key);
    let current = bob.key_store.key_for_version("list-1", 3).await.unwrap();
    assert_eq!(current.key, v3.key);

    let err = bob.key_store.key_for_version("list-1", 4).await.unwrap_err();
    assert!(matches!(err, ListError::KeyNotFound { .. }));
}

#[tokio::test]
async fn delete_all_removes_key_material() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let _bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();
    alice.key_store.delete_all("list-1").await.unwrap();

    assert_eq!(remote.wrap_entry_count("list-1").await, 0);
    assert!(remote.get_key_state("list-1").await.unwrap().is_none());
    assert!(matches!(
        alice.key_store.get_key("list-1").await.unwrap_err(),
        ListError::KeyNotFound { .. }
    ));
}

// ── Reconcile ──

#[tokio::test]
async fn reconcile_rewraps_for_reinstalled_member() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let bob = Device::ready(&remote, BOB).await;

    let key = alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    let bob = bob.reinstall(&remote).await;
    let err = bob.key_store.get_key("list-1").await.unwrap_err();
    assert!(err.is_locked(), "got {err:?}");

    let report = alice
        .key_store
        .reconcile("list-1", &members(&[ALICE, BOB]))
        .await
        .unwrap();
    assert_eq!(
        report,
        ReconcileReport {
            rewrapped: vec![BOB.to_string()],
            removed: vec![],
            pending: vec![],
        }
    );

    assert_eq!(bob.key_store.get_key("list-1").await.unwrap().key, key.key);
}

#[tokio::test]
async fn reconcile_removes_non_members_and_reports_pending() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let _bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    let report = alice
        .key_store
        .reconcile("list-1", &members(&[ALICE, CAROL]))
        .await
        .unwrap();
    assert_eq!(report.removed, vec![BOB.to_string()]);
    assert_eq!(report.pending, vec![CAROL.to_string()]);
    assert!(report.rewrapped.is_empty());
    assert!(remote.get_wrap_entry("list-1", BOB).await.unwrap().is_none());
}

#[tokio::test]
async fn reconcile_is_a_no_op_when_consistent() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let _bob = Device::ready(&remote, BOB).await;

    alice.key_store.create_key("list-1").await.unwrap();
    alice.key_store.share_with("list-1", BOB).await.unwrap();

    let report = alice
        .key_store
        .reconcile("list-1", &members(&[ALICE, BOB]))
        .await
        .unwrap();
    assert!(report.is_clean());
}

#[tokio::test]
async fn concurrent_readers_see_the_same_key() {
    let remote = InMemoryDocumentStore::new();
    let alice = Device::ready(&remote, ALICE).await;
    let created = alice.key_store.create_key("list-1").await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..10 {
        let store = alice.key_store.clone();
        handles.push(tokio::spawn(async move { store.get_key("list-1").await }));
    }
    for handle in handles {
        let key = handle.await.unwrap().unwrap();
        assert_eq!(key.key, created.key);
    }
}
