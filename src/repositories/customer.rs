//! # Customer Repository
//!
//! Database operations for synced QuickBooks customers. A sync batch is
//! applied inside a single transaction, so a failed run leaves the previous
//! snapshot untouched.

use chrono::{DateTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::customer::{self, ActiveModel, Entity, Model};

/// One customer as observed upstream, keyed by its QuickBooks id.
#[derive(Debug, Clone)]
pub struct CustomerUpsert {
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
}

/// Repository for customer database operations
pub struct CustomerRepository {
    db: Arc<DatabaseConnection>,
}

impl CustomerRepository {
    /// Create a new customer repository
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Apply a sync batch for one user atomically.
    ///
    /// Rows matching an existing `(user_id, qbo_id)` pair are updated in
    /// place and everything else is inserted. Rows absent from the batch
    /// are left as they were. Returns the number of customers written.
    pub async fn upsert_batch(
        &self,
        user_id: Uuid,
        customers: &[CustomerUpsert],
        synced_at: DateTime<Utc>,
    ) -> Result<u64, sea_orm::DbErr> {
        let txn = self.db.begin().await?;

        let existing: HashMap<String, Model> = Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .all(&txn)
            .await?
            .into_iter()
            .map(|m| (m.qbo_id.clone(), m))
            .collect();

        // Ids inserted earlier in this batch. A duplicate id later in the
        // same batch becomes an update instead of a unique-index violation.
        let mut inserted: HashMap<String, Uuid> = HashMap::new();
        let mut written = 0u64;

        for upsert in customers {
            let known_id = existing
                .get(&upsert.qbo_id)
                .map(|m| m.id)
                .or_else(|| inserted.get(&upsert.qbo_id).copied());

            match known_id {
                Some(id) => {
                    let active = ActiveModel {
                        id: Set(id),
                        user_id: Set(user_id),
                        qbo_id: Set(upsert.qbo_id.clone()),
                        display_name: Set(upsert.display_name.clone()),
                        company_name: Set(upsert.company_name.clone()),
                        given_name: Set(upsert.given_name.clone()),
                        family_name: Set(upsert.family_name.clone()),
                        email: Set(upsert.email.clone()),
                        phone: Set(upsert.phone.clone()),
                        billing_address_line1: Set(upsert.billing_address_line1.clone()),
                        billing_address_city: Set(upsert.billing_address_city.clone()),
                        billing_address_state: Set(upsert.billing_address_state.clone()),
                        billing_address_postal_code: Set(
                            upsert.billing_address_postal_code.clone()
                        ),
                        billing_address_country: Set(upsert.billing_address_country.clone()),
                        active: Set(upsert.active),
                        balance: Set(upsert.balance),
                        synced_at: Set(synced_at.into()),
                        created_at: sea_orm::ActiveValue::NotSet,
                    };
                    Entity::update(active).exec(&txn).await?;
                }
                None => {
                    let id = Uuid::new_v4();
                    let active = ActiveModel {
                        id: Set(id),
                        user_id: Set(user_id),
                        qbo_id: Set(upsert.qbo_id.clone()),
                        display_name: Set(upsert.display_name.clone()),
                        company_name: Set(upsert.company_name.clone()),
                        given_name: Set(upsert.given_name.clone()),
                        family_name: Set(upsert.family_name.clone()),
                        email: Set(upsert.email.clone()),
                        phone: Set(upsert.phone.clone()),
                        billing_address_line1: Set(upsert.billing_address_line1.clone()),
                        billing_address_city: Set(upsert.billing_address_city.clone()),
                        billing_address_state: Set(upsert.billing_address_state.clone()),
                        billing_address_postal_code: Set(
                            upsert.billing_address_postal_code.clone()
                        ),
                        billing_address_country: Set(upsert.billing_address_country.clone()),
                        active: Set(upsert.active),
                        balance: Set(upsert.balance),
                        synced_at: Set(synced_at.into()),
                        created_at: Set(synced_at.into()),
                    };
                    // exec_without_returning sidesteps last-insert-id
                    // unpacking, which does not work for UUID primary keys
                    // on SQLite.
                    Entity::insert(active).exec_without_returning(&txn).await?;
                    inserted.insert(upsert.qbo_id.clone(), id);
                }
            }

            written += 1;
        }

        txn.commit().await?;

        Ok(written)
    }

    /// List all customers for a user, ordered by display name
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Model>, sea_orm::DbErr> {
        Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .order_by_asc(customer::Column::DisplayName)
            .order_by_asc(customer::Column::QboId)
            .all(&*self.db)
            .await
    }

    /// Count customers stored for a user
    pub async fn count_by_user(&self, user_id: Uuid) -> Result<u64, sea_orm::DbErr> {
        Entity::find()
            .filter(customer::Column::UserId.eq(user_id))
            .count(&*self.db)
            .await
    }
}
