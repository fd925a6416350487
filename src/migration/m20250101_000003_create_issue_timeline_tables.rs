use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS issue_attachments (
                id SERIAL PRIMARY KEY,
                issue_id INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                url VARCHAR(500) NOT NULL,
                content_type VARCHAR(100) NOT NULL,
                size INTEGER NOT NULL
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS issue_activity (
                id SERIAL PRIMARY KEY,
                issue_id INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                kind VARCHAR(20) NOT NULL,
                at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS issue_comments (
                id SERIAL PRIMARY KEY,
                issue_id INTEGER NOT NULL REFERENCES issues(id) ON DELETE CASCADE,
                user_id INTEGER REFERENCES users(id) ON DELETE SET NULL,
                body TEXT NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
        )
        .await?;

        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_issue_attachments_issue ON issue_attachments (issue_id)",
        )
        .await?;
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_issue_activity_issue_at ON issue_activity (issue_id, at)",
        )
        .await?;
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_issue_comments_issue_created
             ON issue_comments (issue_id, created_at)",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS issue_comments")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS issue_activity")
            .await?;
        db.execute_unprepared("DROP TABLE IF EXISTS issue_attachments")
            .await?;
        Ok(())
    }
}
