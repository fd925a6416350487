use super::m20250101_000001_create_users_table::Users;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum StaffRegions {
    Table,
    Id,
    UserId,
    StateCode,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(StaffRegions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(StaffRegions::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(StaffRegions::UserId).integer().not_null())
                    .col(
                        ColumnDef::new(StaffRegions::StateCode)
                            .string_len(3)
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_staff_regions_user")
                            .from(StaffRegions::Table, StaffRegions::UserId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_staff_regions_user_state")
                    .table(StaffRegions::Table)
                    .col(StaffRegions::UserId)
                    .col(StaffRegions::StateCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_staff_regions_state")
                    .table(StaffRegions::Table)
                    .col(StaffRegions::StateCode)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(StaffRegions::Table).to_owned())
            .await
    }
}
