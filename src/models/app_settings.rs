use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Single-row runtime configuration. Created lazily on first read.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "app_settings")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub allow_anonymous_reporting: bool,
    pub require_email_verification: bool,
    pub auto_assign_issues: bool,
    pub features: Option<Json>,
    pub sla_hours: i32,
    pub sla_reminder_hours: Option<i32>,
    #[sea_orm(column_type = "String(StringLen::N(500))", nullable)]
    pub city_logo_url: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub support_email: Option<String>,
    #[sea_orm(column_type = "String(StringLen::N(255))", nullable)]
    pub website_url: Option<String>,
    pub auto_email_on_status_change: bool,
    pub push_notifications_enabled: bool,
    pub created_at: DateTime,
    pub updated_at: Option<DateTime>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
