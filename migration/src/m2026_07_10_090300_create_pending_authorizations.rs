//! Migration to create the pending_authorizations table.
//!
//! Holds token bundles exchanged by an unauthenticated OAuth callback until
//! the initiating user claims them. Rows are claimed at most once
//! (delete-on-read) and expire on a short TTL.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PendingAuthorizations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PendingAuthorizations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::UserId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::RealmId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::AccessTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::RefreshTokenCiphertext)
                            .binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::TokenExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PendingAuthorizations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pending_authorizations_user_id")
                    .table(PendingAuthorizations::Table)
                    .col(PendingAuthorizations::UserId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_pending_authorizations_expires_at")
                    .table(PendingAuthorizations::Table)
                    .col(PendingAuthorizations::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_pending_authorizations_user_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_pending_authorizations_expires_at")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(
                Table::drop()
                    .table(PendingAuthorizations::Table)
                    .to_owned(),
            )
            .await
    }
}

#[derive(DeriveIden)]
enum PendingAuthorizations {
    Table,
    Id,
    UserId,
    RealmId,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    TokenExpiresAt,
    ExpiresAt,
    CreatedAt,
}
