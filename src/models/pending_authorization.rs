//! # Pending Authorization Model
//!
//! Token bundles produced by an OAuth callback that arrived without service
//! credentials. The popup hands the row id to the opener window, which claims
//! the bundle with its own credentials. A row is claimed at most once.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use uuid::Uuid;

/// Pending authorization entity awaiting an authenticated claim
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "pending_authorizations")]
pub struct Model {
    /// Opaque claim token handed to the popup page (primary key)
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// User that initiated the flow (from the consumed OAuth state)
    pub user_id: Uuid,

    /// QuickBooks company (realm) identifier
    pub realm_id: String,

    /// Encrypted access token
    pub access_token_ciphertext: Vec<u8>,

    /// Encrypted refresh token
    pub refresh_token_ciphertext: Vec<u8>,

    /// Access-token expiry computed at exchange time
    pub token_expires_at: DateTimeWithTimeZone,

    /// Claim deadline; unclaimed rows past this are dead
    pub expires_at: DateTimeWithTimeZone,

    /// When the bundle was parked
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
