//! Connection entity model
//!
//! This module contains the SeaORM entity model for the connections table,
//! which stores the single QuickBooks authorization held by each user.

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Connection entity binding one local user to one QuickBooks realm
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "connections")]
pub struct Model {
    /// Unique identifier for the connection (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Owning user (unique: at most one connection per user)
    pub user_id: Uuid,

    /// QuickBooks company (realm) identifier
    pub realm_id: String,

    /// Encrypted access token
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted refresh token
    pub refresh_token_ciphertext: Vec<u8>,

    /// Absolute access-token expiry
    pub expires_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the connection was last updated
    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Whether the stored access token has expired as of `now`
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Connection status as reported to the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionStatus {
    /// Whether a QuickBooks connection exists for the user
    pub connected: bool,
    /// Realm identifier of the connected company, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm_id: Option<String>,
    /// Access-token expiry, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    /// When the connection was first established, when connected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            realm_id: None,
            expires_at: None,
            created_at: None,
        }
    }
}

impl From<Model> for ConnectionStatus {
    fn from(model: Model) -> Self {
        Self {
            connected: true,
            realm_id: Some(model.realm_id),
            expires_at: Some(model.expires_at.to_utc()),
            created_at: Some(model.created_at.to_utc()),
        }
    }
}
