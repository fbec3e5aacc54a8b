//! Integration tests for token encryption at the repository boundary.
//!
//! These exercise the full encrypt-store-load-decrypt path against a real
//! database, including the AAD binding that ties each ciphertext to the
//! row it was written for.

use chrono::{Duration, Utc};
use qbo_sync::crypto::{self, CryptoKey};
use qbo_sync::models::{connection, pending_authorization};
use qbo_sync::qbo::TokenGrant;
use qbo_sync::repositories::connection::ConnectionRepository;
use qbo_sync::repositories::pending_authorization::PendingAuthorizationRepository;
use std::sync::Arc;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

fn test_grant(access: &str, refresh: &str) -> TokenGrant {
    TokenGrant {
        access_token: access.to_string(),
        refresh_token: refresh.to_string(),
        expires_at: Utc::now() + Duration::hours(1),
    }
}

#[tokio::test]
async fn stored_connection_tokens_roundtrip_and_never_hit_disk_in_plaintext() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = ConnectionRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    let user_id = Uuid::new_v4();
    let grant = test_grant("access-token-12345", "refresh-token-67890");

    let stored = repo
        .upsert_tokens(user_id, "4620816365291405970", &grant)
        .await
        .expect("upsert succeeds");

    // Versioned ciphertext, no plaintext fragments.
    assert_eq!(stored.access_token_ciphertext.first().copied(), Some(0x01));
    assert_eq!(stored.refresh_token_ciphertext.first().copied(), Some(0x01));
    assert!(
        !stored
            .access_token_ciphertext
            .windows(b"access-token-12345".len())
            .any(|w| w == b"access-token-12345")
    );

    let loaded = repo
        .find_by_user(user_id)
        .await
        .expect("lookup succeeds")
        .expect("connection exists");
    let (access, refresh) = repo.decrypt_tokens(&loaded).expect("decryption succeeds");

    assert_eq!(access, "access-token-12345");
    assert_eq!(refresh, "refresh-token-67890");
}

#[tokio::test]
async fn connection_ciphertext_is_bound_to_its_owner() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = ConnectionRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    let stored = repo
        .upsert_tokens(Uuid::new_v4(), "9130001", &test_grant("AT1", "RT1"))
        .await
        .expect("upsert succeeds");

    // Re-attributing the ciphertext to another user must fail the AAD check.
    let reattributed = connection::Model {
        user_id: Uuid::new_v4(),
        ..stored.clone()
    };
    assert!(repo.decrypt_tokens(&reattributed).is_err());

    // So must re-pointing it at another realm.
    let moved_realm = connection::Model {
        realm_id: "9130002".to_string(),
        ..stored
    };
    assert!(repo.decrypt_tokens(&moved_realm).is_err());
}

#[tokio::test]
async fn same_tokens_for_two_users_produce_distinct_ciphertexts() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = ConnectionRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    let grant = test_grant("shared-access", "shared-refresh");
    let first = repo
        .upsert_tokens(Uuid::new_v4(), "realm-a", &grant)
        .await
        .expect("first upsert succeeds");
    let second = repo
        .upsert_tokens(Uuid::new_v4(), "realm-b", &grant)
        .await
        .expect("second upsert succeeds");

    assert_ne!(
        first.access_token_ciphertext,
        second.access_token_ciphertext
    );

    // Each still decrypts under its own context.
    let (access_a, _) = repo.decrypt_tokens(&first).expect("first decrypts");
    let (access_b, _) = repo.decrypt_tokens(&second).expect("second decrypts");
    assert_eq!(access_a, "shared-access");
    assert_eq!(access_b, "shared-access");
}

#[tokio::test]
async fn legacy_plaintext_rows_pass_through_decryption() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = ConnectionRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    // A row written before encryption was introduced holds raw bytes with
    // no version marker.
    let now = Utc::now();
    let legacy = connection::Model {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        realm_id: "legacy-realm".to_string(),
        access_token_ciphertext: b"plaintext-access".to_vec(),
        refresh_token_ciphertext: b"plaintext-refresh".to_vec(),
        expires_at: now.into(),
        created_at: now.into(),
        updated_at: now.into(),
    };

    let (access, refresh) = repo.decrypt_tokens(&legacy).expect("legacy rows pass through");
    assert_eq!(access, "plaintext-access");
    assert_eq!(refresh, "plaintext-refresh");
}

#[tokio::test]
async fn pending_authorization_ciphertext_is_bound_to_the_row_id() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = PendingAuthorizationRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    let user_id = Uuid::new_v4();
    let record = repo
        .create_encrypted(user_id, "9130003", &test_grant("parked-AT", "parked-RT"), 600)
        .await
        .expect("create succeeds");

    let (access, refresh) = repo.decrypt_tokens(&record).expect("own row decrypts");
    assert_eq!(access, "parked-AT");
    assert_eq!(refresh, "parked-RT");

    // Ciphertext copied onto a different row id fails to decrypt.
    let copied = pending_authorization::Model {
        id: Uuid::new_v4(),
        ..record
    };
    assert!(repo.decrypt_tokens(&copied).is_err());
}

#[tokio::test]
async fn cleanup_removes_only_expired_pending_rows() {
    let db = Arc::new(
        test_utils::setup_test_db()
            .await
            .expect("test database setup failed"),
    );
    let repo = PendingAuthorizationRepository::new(Arc::clone(&db), test_utils::test_crypto_key());

    let user_id = Uuid::new_v4();
    let expired = repo
        .create_encrypted(user_id, "realm-1", &test_grant("AT1", "RT1"), 0)
        .await
        .expect("expired row created");
    let live = repo
        .create_encrypted(user_id, "realm-2", &test_grant("AT2", "RT2"), 600)
        .await
        .expect("live row created");

    let removed = repo.cleanup_expired().await.expect("cleanup succeeds");
    assert_eq!(removed, 1);

    assert!(
        repo.claim(expired.id, user_id)
            .await
            .expect("claim lookup succeeds")
            .is_none()
    );
    assert!(
        repo.claim(live.id, user_id)
            .await
            .expect("claim lookup succeeds")
            .is_some()
    );
}

#[test]
fn key_material_is_rejected_at_the_wrong_length() {
    assert!(CryptoKey::new(vec![0u8; 31]).is_err());
    assert!(CryptoKey::new(vec![0u8; 33]).is_err());
    assert!(CryptoKey::new(vec![0u8; 32]).is_ok());
}

#[test]
fn distinct_keys_cannot_read_each_other() {
    let key_a = CryptoKey::new(vec![1u8; 32]).expect("valid key");
    let key_b = CryptoKey::new(vec![2u8; 32]).expect("valid key");
    let aad = crypto::connection_aad(Uuid::new_v4(), "9991");

    let (access_ct, refresh_ct) =
        crypto::encrypt_token_pair(&key_a, &aad, "AT", "RT").expect("encryption succeeds");

    assert!(crypto::decrypt_token_pair(&key_b, &aad, &access_ct, &refresh_ct).is_err());
}
