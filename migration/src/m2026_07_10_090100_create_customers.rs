//! Migration to create the customers table.
//!
//! Local mirror of QuickBooks customer records, keyed by (user_id, qbo_id).
//! Sync overwrites whole rows and never deletes.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Customers::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Customers::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Customers::UserId).uuid().not_null())
                    .col(ColumnDef::new(Customers::QboId).text().not_null())
                    .col(
                        ColumnDef::new(Customers::DisplayName)
                            .text()
                            .not_null()
                            .default(""),
                    )
                    .col(ColumnDef::new(Customers::CompanyName).text().null())
                    .col(ColumnDef::new(Customers::GivenName).text().null())
                    .col(ColumnDef::new(Customers::FamilyName).text().null())
                    .col(ColumnDef::new(Customers::Email).text().null())
                    .col(ColumnDef::new(Customers::Phone).text().null())
                    .col(
                        ColumnDef::new(Customers::BillingAddressLine1)
                            .text()
                            .null(),
                    )
                    .col(ColumnDef::new(Customers::BillingAddressCity).text().null())
                    .col(
                        ColumnDef::new(Customers::BillingAddressState)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Customers::BillingAddressPostalCode)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Customers::BillingAddressCountry)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Customers::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Customers::Balance)
                            .double()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Customers::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Customers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Composite unique key for idempotent upserts
        manager
            .create_index(
                Index::create()
                    .name("idx_customers_user_qbo")
                    .table(Customers::Table)
                    .col(Customers::UserId)
                    .col(Customers::QboId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_customers_user_id")
                    .table(Customers::Table)
                    .col(Customers::UserId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_customers_user_qbo").to_owned())
            .await?;

        manager
            .drop_index(Index::drop().name("idx_customers_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Customers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Customers {
    Table,
    Id,
    UserId,
    QboId,
    DisplayName,
    CompanyName,
    GivenName,
    FamilyName,
    Email,
    Phone,
    BillingAddressLine1,
    BillingAddressCity,
    BillingAddressState,
    BillingAddressPostalCode,
    BillingAddressCountry,
    Active,
    Balance,
    SyncedAt,
    CreatedAt,
}
