use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

const INDEXES: &[(&str, &str)] = &[
    (
        "idx_issues_created_at",
        "CREATE INDEX IF NOT EXISTS idx_issues_created_at ON issues (created_at DESC)",
    ),
    (
        "idx_issues_status_assignee",
        "CREATE INDEX IF NOT EXISTS idx_issues_status_assignee ON issues (status, assigned_to_id)",
    ),
    (
        "idx_issues_category_created",
        "CREATE INDEX IF NOT EXISTS idx_issues_category_created ON issues (category, created_at DESC)",
    ),
    (
        "idx_issues_state_code",
        "CREATE INDEX IF NOT EXISTS idx_issues_state_code ON issues (state_code)",
    ),
    (
        "idx_issues_created_by",
        "CREATE INDEX IF NOT EXISTS idx_issues_created_by ON issues (created_by_id)",
    ),
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for (_, sql) in INDEXES {
            db.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        for (name, _) in INDEXES {
            db.execute_unprepared(&format!("DROP INDEX IF EXISTS {}", name))
                .await?;
        }
        Ok(())
    }
}
