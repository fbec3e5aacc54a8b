//! # OAuth State Repository
//!
//! Database operations for the anti-forgery state tokens issued when an
//! OAuth flow starts. States are single-use: consumption deletes the row,
//! and only the caller whose delete removed it wins.

use chrono::{Duration, Utc};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use std::sync::Arc;
use uuid::Uuid;

use crate::models::oauth_state::{self, ActiveModel, Entity, Model};

/// Repository for OAuth state database operations
pub struct OAuthStateRepository {
    db: Arc<DatabaseConnection>,
}

impl OAuthStateRepository {
    /// Create a new OAuth state repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Persist a freshly issued state token for the given user
    pub async fn create(
        &self,
        user_id: Uuid,
        state: &str,
        ttl_seconds: u64,
    ) -> Result<Model, sea_orm::DbErr> {
        let now = Utc::now();
        let expires_at = now + Duration::seconds(ttl_seconds as i64);

        let record = Model {
            id: Uuid::new_v4(),
            state: state.to_string(),
            user_id,
            expires_at: expires_at.into(),
            created_at: now.into(),
        };

        let active = ActiveModel {
            id: Set(record.id),
            state: Set(record.state.clone()),
            user_id: Set(record.user_id),
            expires_at: Set(record.expires_at),
            created_at: Set(record.created_at),
        };

        // exec_without_returning sidesteps last-insert-id unpacking, which
        // does not work for UUID primary keys on SQLite.
        Entity::insert(active)
            .exec_without_returning(&*self.db)
            .await?;

        Ok(record)
    }

    /// Find an unexpired state and consume it.
    ///
    /// Returns `None` when the state is unknown, expired, or was already
    /// consumed. With concurrent callers the delete arbitrates: exactly one
    /// observes `rows_affected > 0` and receives the row.
    pub async fn consume(&self, state: &str) -> Result<Option<Model>, sea_orm::DbErr> {
        let found = Entity::find()
            .filter(oauth_state::Column::State.eq(state))
            .filter(oauth_state::Column::ExpiresAt.gt(Utc::now()))
            .one(&*self.db)
            .await?;

        let Some(record) = found else {
            return Ok(None);
        };

        let result = Entity::delete_by_id(record.id).exec(&*self.db).await?;
        if result.rows_affected == 0 {
            // Lost the race to another consumer.
            return Ok(None);
        }

        Ok(Some(record))
    }

    /// Clean up expired OAuth states
    pub async fn cleanup_expired(&self) -> Result<u64, sea_orm::DbErr> {
        let result = Entity::delete_many()
            .filter(oauth_state::Column::ExpiresAt.lt(Utc::now()))
            .exec(&*self.db)
            .await?;

        Ok(result.rows_affected)
    }
}
