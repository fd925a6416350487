use sea_orm_migration::prelude::*;

mod m20250101_000001_create_users_table;
mod m20250101_000002_create_issues_table;
mod m20250101_000003_create_issue_timeline_tables;
mod m20250101_000004_create_staff_regions;
mod m20250101_000005_create_app_settings;
mod m20250101_000006_add_auto_assign_setting;
mod m20250101_000007_create_push_and_refresh_tokens;
mod m20250101_000008_create_issue_types;
mod m20250101_000009_add_issue_indexes;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250101_000001_create_users_table::Migration),
            Box::new(m20250101_000002_create_issues_table::Migration),
            Box::new(m20250101_000003_create_issue_timeline_tables::Migration),
            Box::new(m20250101_000004_create_staff_regions::Migration),
            Box::new(m20250101_000005_create_app_settings::Migration),
            Box::new(m20250101_000006_add_auto_assign_setting::Migration),
            Box::new(m20250101_000007_create_push_and_refresh_tokens::Migration),
            Box::new(m20250101_000008_create_issue_types::Migration),
            Box::new(m20250101_000009_add_issue_indexes::Migration),
        ]
    }
}
