use super::m20250101_000001_create_users_table::Users;
use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum Issues {
    Table,
    Id,
    Title,
    Description,
    Category,
    Status,
    Lat,
    Lng,
    Address,
    Country,
    StateCode,
    CreatedById,
    AssignedToId,
    CreatedAt,
    UpdatedAt,
    InProgressAt,
    ResolvedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Issues::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Issues::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Issues::Title).string_len(200).not_null())
                    .col(ColumnDef::new(Issues::Description).text().null())
                    .col(ColumnDef::new(Issues::Category).string_len(120).null())
                    .col(
                        ColumnDef::new(Issues::Status)
                            .string_len(20)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Issues::Lat).double().null())
                    .col(ColumnDef::new(Issues::Lng).double().null())
                    .col(ColumnDef::new(Issues::Address).string_len(300).null())
                    .col(ColumnDef::new(Issues::Country).string_len(2).null())
                    .col(ColumnDef::new(Issues::StateCode).string_len(3).null())
                    .col(ColumnDef::new(Issues::CreatedById).integer().null())
                    .col(ColumnDef::new(Issues::AssignedToId).integer().null())
                    .col(
                        ColumnDef::new(Issues::CreatedAt)
                            .timestamp()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Issues::UpdatedAt).timestamp().null())
                    .col(ColumnDef::new(Issues::InProgressAt).timestamp().null())
                    .col(ColumnDef::new(Issues::ResolvedAt).timestamp().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_issues_created_by")
                            .from(Issues::Table, Issues::CreatedById)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_issues_assigned_to")
                            .from(Issues::Table, Issues::AssignedToId)
                            .to(Users::Table, Users::Id)
                            .on_delete(ForeignKeyAction::SetNull),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Issues::Table).to_owned())
            .await
    }
}
