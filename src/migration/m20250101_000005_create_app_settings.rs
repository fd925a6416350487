use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();

        db.execute_unprepared(
            "CREATE TABLE IF NOT EXISTS app_settings (
                id SERIAL PRIMARY KEY,
                allow_anonymous_reporting BOOLEAN NOT NULL DEFAULT FALSE,
                require_email_verification BOOLEAN NOT NULL DEFAULT TRUE,
                features JSONB,
                sla_hours INTEGER NOT NULL DEFAULT 48,
                sla_reminder_hours INTEGER,
                city_logo_url VARCHAR(500),
                support_email VARCHAR(255),
                website_url VARCHAR(255),
                auto_email_on_status_change BOOLEAN NOT NULL DEFAULT TRUE,
                push_notifications_enabled BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP
            )",
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let db = manager.get_connection();
        db.execute_unprepared("DROP TABLE IF EXISTS app_settings")
            .await?;
        Ok(())
    }
}
