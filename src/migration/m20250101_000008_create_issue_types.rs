use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(DeriveIden)]
enum IssueTypes {
    Table,
    Id,
    Name,
    Slug,
    Description,
    Color,
    DisplayOrder,
    IsActive,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(IssueTypes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(IssueTypes::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(IssueTypes::Name)
                            .string_len(120)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(IssueTypes::Slug)
                            .string_len(140)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(IssueTypes::Description).text().null())
                    .col(
                        ColumnDef::new(IssueTypes::Color)
                            .string_len(20)
                            .not_null()
                            .default("#4f46e5"),
                    )
                    .col(
                        ColumnDef::new(IssueTypes::DisplayOrder)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(IssueTypes::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(IssueTypes::Table).to_owned())
            .await
    }
}
