//! # Pending Authorization Repository
//!
//! Server-side parking lot for token grants obtained by a callback that
//! arrived without service credentials. The popup page is handed only the
//! opaque row id; the tokens stay here, encrypted, until an authenticated
//! claim picks them up. Claims are single-use and rows expire on a short
//! TTL.

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::models::pending_authorization::{self, ActiveModel, Entity, Model};
use crate::qbo::TokenGrant;

/// Repository for pending authorization database operations
pub struct PendingAuthorizationRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl PendingAuthorizationRepository {
    /// Create a new pending authorization repository
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Park a freshly exchanged token grant until it is claimed.
    ///
    /// The tokens are encrypted with the row id as AAD, so a ciphertext
    /// copied onto a different row fails to decrypt.
    pub async fn create_encrypted(
        &self,
        user_id: Uuid,
        realm_id: &str,
        grant: &TokenGrant,
        ttl_seconds: u64,
    ) -> Result<Model> {
        let id = Uuid::new_v4();
        let aad = crypto::pending_aad(id);
        let (access_ciphertext, refresh_ciphertext) = crypto::encrypt_token_pair(
            &self.crypto_key,
            &aad,
            &grant.access_token,
            &grant.refresh_token,
        )
        .context("Failed to encrypt pending authorization tokens")?;

        let now = Utc::now();
        let record = Model {
            id,
            user_id,
            realm_id: realm_id.to_string(),
            access_token_ciphertext: access_ciphertext,
            refresh_token_ciphertext: refresh_ciphertext,
            token_expires_at: grant.expires_at.into(),
            expires_at: (now + Duration::seconds(ttl_seconds as i64)).into(),
            created_at: now.into(),
        };

        let active = ActiveModel {
            id: Set(record.id),
            user_id: Set(record.user_id),
            realm_id: Set(record.realm_id.clone()),
            access_token_ciphertext: Set(record.access_token_ciphertext.clone()),
            refresh_token_ciphertext: Set(record.refresh_token_ciphertext.clone()),
            token_expires_at: Set(record.token_expires_at),
            expires_at: Set(record.expires_at),
            created_at: Set(record.created_at),
        };

        // exec_without_returning sidesteps last-insert-id unpacking, which
        // does not work for UUID primary keys on SQLite.
        Entity::insert(active)
            .exec_without_returning(&*self.db)
            .await
            .context("Failed to store pending authorization")?;

        Ok(record)
    }

    /// Claim a pending authorization for the user it was parked for.
    ///
    /// Returns `None` when the id is unknown, expired, bound to another
    /// user, or already claimed. With concurrent claimers the delete
    /// arbitrates: exactly one observes `rows_affected > 0` and receives
    /// the row.
    pub async fn claim(&self, id: Uuid, user_id: Uuid) -> Result<Option<Model>> {
        let found = Entity::find()
            .filter(pending_authorization::Column::Id.eq(id))
            .filter(pending_authorization::Column::UserId.eq(user_id))
            .filter(pending_authorization::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await
            .context("Failed to look up pending authorization")?;

        let Some(record) = found else {
            return Ok(None);
        };

        let result = Entity::delete_by_id(record.id)
            .exec(&*self.db)
            .await
            .context("Failed to claim pending authorization")?;
        if result.rows_affected == 0 {
            // Lost the race to another claimer.
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Decrypt the token pair parked on a claimed row
    pub fn decrypt_tokens(&self, record: &Model) -> Result<(String, String)> {
        let aad = crypto::pending_aad(record.id);
        crypto::decrypt_token_pair(
            &self.crypto_key,
            &aad,
            &record.access_token_ciphertext,
            &record.refresh_token_ciphertext,
        )
        .context("Failed to decrypt pending authorization tokens")
    }

    /// Clean up expired pending authorizations
    pub async fn cleanup_expired(&self) -> Result<u64> {
        let result = Entity::delete_many()
            .filter(pending_authorization::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await
            .context("Failed to clean up expired pending authorizations")?;

        Ok(result.rows_affected)
    }
}
