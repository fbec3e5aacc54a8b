//! Customer entity model
//!
//! Local mirror of QuickBooks customer records. Rows are written only by the
//! sync engine; the dashboard reads them.

use chrono::{DateTime, Utc};
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Customer entity mirroring one QuickBooks customer for one user
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "customers")]
pub struct Model {
    /// Primary key UUID
    #[sea_orm(primary_key)]
    pub id: Uuid,

    /// Owning user; (user_id, qbo_id) is unique
    pub user_id: Uuid,

    /// QuickBooks customer identifier
    pub qbo_id: String,

    pub display_name: String,
    pub company_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address_line1: Option<String>,
    pub billing_address_city: Option<String>,
    pub billing_address_state: Option<String>,
    pub billing_address_postal_code: Option<String>,
    pub billing_address_country: Option<String>,
    pub active: bool,
    pub balance: f64,

    /// When this row was last written by a sync
    pub synced_at: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// Customer record as served to the dashboard
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CustomerRecord {
    pub id: Uuid,
    pub qbo_id: String,
    pub display_name: String,
    pub company_name: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub billing_address_line1: Option<String>,
    pub billing_address_city: Option<String>,
    pub billing_address_state: Option<String>,
    pub billing_address_postal_code: Option<String>,
    pub billing_address_country: Option<String>,
    pub active: bool,
    pub balance: f64,
    pub synced_at: DateTime<Utc>,
}

impl From<Model> for CustomerRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            qbo_id: model.qbo_id,
            display_name: model.display_name,
            company_name: model.company_name,
            given_name: model.given_name,
            family_name: model.family_name,
            email: model.email,
            phone: model.phone,
            billing_address_line1: model.billing_address_line1,
            billing_address_city: model.billing_address_city,
            billing_address_state: model.billing_address_state,
            billing_address_postal_code: model.billing_address_postal_code,
            billing_address_country: model.billing_address_country,
            active: model.active,
            balance: model.balance,
            synced_at: model.synced_at.to_utc(),
        }
    }
}
