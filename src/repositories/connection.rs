//! # Connection Repository
//!
//! Database operations for QuickBooks connections. Tokens never touch the
//! database in plaintext: this repository encrypts on the way in and
//! decrypts on the way out, binding each ciphertext to its owning user and
//! realm through the AAD.

use anyhow::{Context, Result};
use chrono::Utc;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::{self, CryptoKey};
use crate::error::is_unique_violation;
use crate::models::connection::{self, ActiveModel, Entity, Model};
use crate::qbo::TokenGrant;

/// Repository for connection database operations
pub struct ConnectionRepository {
    db: Arc<DatabaseConnection>,
    crypto_key: CryptoKey,
}

impl ConnectionRepository {
    /// Create a new connection repository
    pub fn new(db: Arc<DatabaseConnection>, crypto_key: CryptoKey) -> Self {
        Self { db, crypto_key }
    }

    /// Find the connection owned by a user
    pub async fn find_by_user(&self, user_id: Uuid) -> Result<Option<Model>> {
        Entity::find()
            .filter(connection::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await
            .context("Failed to load connection")
    }

    /// Create or replace the single connection held by a user.
    ///
    /// Reconnecting overwrites the stored realm and tokens in place, so a
    /// user who authorizes a different company ends up with exactly one
    /// connection pointing at the new realm.
    pub async fn upsert_tokens(
        &self,
        user_id: Uuid,
        realm_id: &str,
        grant: &TokenGrant,
    ) -> Result<Model> {
        let aad = crypto::connection_aad(user_id, realm_id);
        let (access_ciphertext, refresh_ciphertext) = crypto::encrypt_token_pair(
            &self.crypto_key,
            &aad,
            &grant.access_token,
            &grant.refresh_token,
        )
        .context("Failed to encrypt connection tokens")?;

        if let Some(existing) = self.find_by_user(user_id).await? {
            return self
                .overwrite(existing, realm_id, access_ciphertext, refresh_ciphertext, grant)
                .await;
        }

        let now = Utc::now();
        let record = Model {
            id: Uuid::new_v4(),
            user_id,
            realm_id: realm_id.to_string(),
            access_token_ciphertext: access_ciphertext,
            refresh_token_ciphertext: refresh_ciphertext,
            expires_at: grant.expires_at.into(),
            created_at: now.into(),
            updated_at: now.into(),
        };

        let active = ActiveModel {
            id: Set(record.id),
            user_id: Set(record.user_id),
            realm_id: Set(record.realm_id.clone()),
            access_token_ciphertext: Set(record.access_token_ciphertext.clone()),
            refresh_token_ciphertext: Set(record.refresh_token_ciphertext.clone()),
            expires_at: Set(record.expires_at),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
        };

        // exec_without_returning sidesteps last-insert-id unpacking, which
        // does not work for UUID primary keys on SQLite.
        match Entity::insert(active).exec_without_returning(&*self.db).await {
            Ok(_) => Ok(record),
            Err(err) if is_unique_violation(&err) => {
                // Raced a concurrent upsert for the same user. The unique
                // index arbitrated; apply ours as an overwrite instead.
                let existing = self
                    .find_by_user(user_id)
                    .await?
                    .context("Connection disappeared during upsert")?;
                self.overwrite(
                    existing,
                    realm_id,
                    record.access_token_ciphertext,
                    record.refresh_token_ciphertext,
                    grant,
                )
                .await
            }
            Err(err) => Err(err).context("Failed to store connection"),
        }
    }

    async fn overwrite(
        &self,
        existing: Model,
        realm_id: &str,
        access_ciphertext: Vec<u8>,
        refresh_ciphertext: Vec<u8>,
        grant: &TokenGrant,
    ) -> Result<Model> {
        let mut active: ActiveModel = existing.into();
        active.realm_id = Set(realm_id.to_string());
        active.access_token_ciphertext = Set(access_ciphertext);
        active.refresh_token_ciphertext = Set(refresh_ciphertext);
        active.expires_at = Set(grant.expires_at.into());
        active.updated_at = Set(Utc::now().into());

        Entity::update(active)
            .exec(&*self.db)
            .await
            .context("Failed to update connection")
    }

    /// Persist a rotated token pair on an existing connection.
    ///
    /// QuickBooks rotates the refresh token on every grant, so both
    /// ciphertexts are replaced together.
    pub async fn update_tokens(&self, record: &Model, grant: &TokenGrant) -> Result<Model> {
        let aad = crypto::connection_aad(record.user_id, &record.realm_id);
        let (access_ciphertext, refresh_ciphertext) = crypto::encrypt_token_pair(
            &self.crypto_key,
            &aad,
            &grant.access_token,
            &grant.refresh_token,
        )
        .context("Failed to encrypt connection tokens")?;

        let mut active: ActiveModel = record.clone().into();
        active.access_token_ciphertext = Set(access_ciphertext);
        active.refresh_token_ciphertext = Set(refresh_ciphertext);
        active.expires_at = Set(grant.expires_at.into());
        active.updated_at = Set(Utc::now().into());

        Entity::update(active)
            .exec(&*self.db)
            .await
            .context("Failed to update connection tokens")
    }

    /// Decrypt the token pair stored on a connection.
    ///
    /// Rows written before encryption was introduced hold plaintext; those
    /// pass through with a warning so operators know re-encryption is due.
    pub fn decrypt_tokens(&self, record: &Model) -> Result<(String, String)> {
        if !crypto::is_encrypted_payload(&record.access_token_ciphertext) {
            warn!(connection_id = %record.id, "Connection holds legacy plaintext tokens");
            let access = String::from_utf8(record.access_token_ciphertext.clone())
                .context("Legacy access token is not valid UTF-8")?;
            let refresh = String::from_utf8(record.refresh_token_ciphertext.clone())
                .context("Legacy refresh token is not valid UTF-8")?;
            return Ok((access, refresh));
        }

        let aad = crypto::connection_aad(record.user_id, &record.realm_id);
        crypto::decrypt_token_pair(
            &self.crypto_key,
            &aad,
            &record.access_token_ciphertext,
            &record.refresh_token_ciphertext,
        )
        .context("Failed to decrypt connection tokens")
    }

    /// Delete the connection owned by a user.
    ///
    /// Returns whether a row was removed, so callers can treat repeat
    /// disconnects as a no-op.
    pub async fn delete_by_user(&self, user_id: Uuid) -> Result<bool> {
        let result = Entity::delete_many()
            .filter(connection::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await
            .context("Failed to delete connection")?;

        Ok(result.rows_affected > 0)
    }
}
