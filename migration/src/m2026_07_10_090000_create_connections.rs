//! Migration to create the connections table.
//!
//! One QuickBooks connection per user: realm identifier, encrypted token
//! pair, and the absolute access-token expiry.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::UserId).uuid().not_null())
                    .col(ColumnDef::new(Connections::RealmId).text().not_null())
                    .col(
                        ColumnDef::new(Connections::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Connections::RefreshTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Connections::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // One connection per user
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_user_id")
                    .table(Connections::Table)
                    .col(Connections::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(Index::drop().name("idx_connections_user_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    UserId,
    RealmId,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    CreatedAt,
    UpdatedAt,
}
