use sea_orm_migration::prelude::*;

use super::m20261017_000001_create_users::Users;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(MemoryFacts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MemoryFacts::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MemoryFacts::UserId).uuid().not_null())
                    .col(ColumnDef::new(MemoryFacts::Key).string().not_null())
                    .col(ColumnDef::new(MemoryFacts::Value).text().not_null())
                    .col(
                        ColumnDef::new(MemoryFacts::Category)
                            .string_len(32)
                            .not_null()
                            .default("general"),
                    )
                    .col(
                        ColumnDef::new(MemoryFacts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_memory_fact_user")
                            .from(MemoryFacts::Table, MemoryFacts::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Not unique: manual saves may repeat a key.
        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_memory_facts_user_key")
                    .table(MemoryFacts::Table)
                    .col(MemoryFacts::UserId)
                    .col(MemoryFacts::Key)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(MemoryFacts::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum MemoryFacts {
    Table,
    Id,
    UserId,
    Key,
    Value,
    Category,
    CreatedAt,
}
