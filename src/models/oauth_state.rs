//! # OAuth State Model
//!
//! This module contains the OAuth state entity for storing anti-forgery
//! state tokens issued at flow initiation. A state row is consumed the first
//! time its value comes back on a callback; unknown or expired values reject
//! the callback.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// OAuth state entity for callback verification
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "oauth_states")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// State token echoed back by the provider (unique)
    pub state: String,

    /// User that initiated the flow
    pub user_id: Uuid,

    /// Expiration timestamp
    pub expires_at: DateTimeWithTimeZone,

    /// When the state was created
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
