//! Database migrations for the QBO Sync API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2026_07_10_090000_create_connections;
mod m2026_07_10_090100_create_customers;
mod m2026_07_10_090200_create_oauth_states;
mod m2026_07_10_090300_create_pending_authorizations;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2026_07_10_090000_create_connections::Migration),
            Box::new(m2026_07_10_090100_create_customers::Migration),
            Box::new(m2026_07_10_090200_create_oauth_states::Migration),
            Box::new(m2026_07_10_090300_create_pending_authorizations::Migration),
        ]
    }
}
