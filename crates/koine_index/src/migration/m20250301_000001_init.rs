use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_orm::DatabaseBackend;

use crate::db::{Membership, MembershipTxOperations};

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let backend = manager.get_database_backend();

        manager
            .create_table(
                Table::create()
                    .table(Membership::Table)
                    .if_not_exists()
                    .col(id_col(backend, Membership::SubjectId, false))
                    .col(id_col(backend, Membership::Property, false))
                    .col(id_col(backend, Membership::ObjectId, false))
                    .col(id_col(backend, Membership::SourceId, false))
                    .col(
                        ColumnDef::new(Membership::StartTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Membership::EndTime)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MembershipTxOperations::Table)
                    .if_not_exists()
                    .col(id_col(backend, MembershipTxOperations::SubjectId, false))
                    .col(id_col(backend, MembershipTxOperations::Property, false))
                    .col(id_col(backend, MembershipTxOperations::ObjectId, false))
                    .col(id_col(backend, MembershipTxOperations::SourceId, false))
                    .col(
                        ColumnDef::new(MembershipTxOperations::StartTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MembershipTxOperations::EndTime)
                            .big_integer()
                            .not_null(),
                    )
                    .col(id_col(backend, MembershipTxOperations::TxId, false))
                    .col(
                        ColumnDef::new(MembershipTxOperations::Operation)
                            .string_len(10)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(MembershipTxOperations::ForceFlag)
                            .string_len(10)
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        create_indexes(manager).await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(
                Table::drop()
                    .table(MembershipTxOperations::Table)
                    .if_exists()
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Membership::Table).if_exists().to_owned())
            .await?;
        Ok(())
    }
}

async fn create_indexes(manager: &SchemaManager<'_>) -> Result<(), DbErr> {
    let backend = manager.get_database_backend();

    manager
        .create_index(identity_index(
            backend,
            Membership::Table,
            "membership_identity_idx",
            [
                Membership::SourceId,
                Membership::SubjectId,
                Membership::Property,
                Membership::ObjectId,
            ],
        ))
        .await?;

    manager
        .create_index(
            Index::create()
                .name("membership_subject_end_idx")
                .table(Membership::Table)
                .if_not_exists()
                .col(Membership::SubjectId)
                .col(Membership::EndTime)
                .to_owned(),
        )
        .await?;

    manager
        .create_index(identity_index(
            backend,
            MembershipTxOperations::Table,
            "membership_tx_identity_idx",
            [
                MembershipTxOperations::SourceId,
                MembershipTxOperations::SubjectId,
                MembershipTxOperations::Property,
                MembershipTxOperations::ObjectId,
            ],
        ))
        .await?;

    manager
        .create_index(
            Index::create()
                .name("membership_tx_tx_idx")
                .table(MembershipTxOperations::Table)
                .if_not_exists()
                .col(MembershipTxOperations::TxId)
                .to_owned(),
        )
        .await?;

    Ok(())
}

// MySQL/MariaDB cap composite index keys at 3072 bytes, so the four-column
// identity index prefixes each utf8mb4 id column there.
fn identity_index<T, C>(
    backend: DatabaseBackend,
    table: T,
    name: &str,
    columns: [C; 4],
) -> IndexCreateStatement
where
    T: IntoTableRef,
    C: IntoIden + Copy,
{
    let mut index = Index::create()
        .name(name)
        .table(table)
        .if_not_exists()
        .to_owned();
    for column in columns {
        match backend {
            DatabaseBackend::MySql => {
                index.col((column, 128u32));
            }
            _ => {
                index.col(column);
            }
        }
    }
    index
}

fn id_col(backend: DatabaseBackend, col: impl Iden + 'static, nullable: bool) -> ColumnDef {
    let mut col_def = ColumnDef::new(col);
    match backend {
        DatabaseBackend::MySql => {
            col_def.string_len(503);
        }
        DatabaseBackend::Postgres => {
            col_def.text();
        }
        DatabaseBackend::Sqlite => {
            col_def.text();
        }
        _ => {
            col_def.text();
        }
    }
    if nullable {
        col_def.null();
    } else {
        col_def.not_null();
    }
    col_def.to_owned()
}
