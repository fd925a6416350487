use crate::{
    error::{AppError, AppResult},
    models::{app_settings, AppSettings, AppSettingsModel},
};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    QueryOrder, Statement,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Immutable snapshot of the `app_settings` row. Call
/// [`SettingsService::load`] again to observe later changes.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Settings {
    pub allow_anonymous_reporting: bool,
    pub require_email_verification: bool,
    pub auto_assign_issues: bool,
    #[schema(value_type = Object)]
    pub features: serde_json::Value,
    pub sla_hours: i32,
    pub sla_reminder_hours: Option<i32>,
    pub city_logo_url: Option<String>,
    pub support_email: Option<String>,
    pub website_url: Option<String>,
    pub auto_email_on_status_change: bool,
    pub push_notifications_enabled: bool,
    pub updated_at: Option<chrono::NaiveDateTime>,
}

pub const DEFAULT_SLA_HOURS: i32 = 48;

impl Default for Settings {
    fn default() -> Self {
        Self {
            allow_anonymous_reporting: false,
            require_email_verification: true,
            auto_assign_issues: false,
            features: serde_json::json!({}),
            sla_hours: DEFAULT_SLA_HOURS,
            sla_reminder_hours: None,
            city_logo_url: None,
            support_email: None,
            website_url: None,
            auto_email_on_status_change: true,
            push_notifications_enabled: true,
            updated_at: None,
        }
    }
}

impl From<AppSettingsModel> for Settings {
    fn from(m: AppSettingsModel) -> Self {
        Self {
            allow_anonymous_reporting: m.allow_anonymous_reporting,
            require_email_verification: m.require_email_verification,
            auto_assign_issues: m.auto_assign_issues,
            features: m.features.unwrap_or_else(|| serde_json::json!({})),
            sla_hours: m.sla_hours,
            sla_reminder_hours: m.sla_reminder_hours,
            city_logo_url: m.city_logo_url,
            support_email: m.support_email,
            website_url: m.website_url,
            auto_email_on_status_change: m.auto_email_on_status_change,
            push_notifications_enabled: m.push_notifications_enabled,
            updated_at: m.updated_at,
        }
    }
}

/// Partial update; absent fields are left unchanged. For the nullable
/// text fields an empty string clears the value.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct SettingsPatch {
    pub allow_anonymous_reporting: Option<bool>,
    pub require_email_verification: Option<bool>,
    pub auto_assign_issues: Option<bool>,
    #[schema(value_type = Option<Object>)]
    pub features: Option<serde_json::Value>,
    pub sla_hours: Option<i32>,
    pub sla_reminder_hours: Option<i32>,
    pub city_logo_url: Option<String>,
    pub support_email: Option<String>,
    pub website_url: Option<String>,
    pub auto_email_on_status_change: Option<bool>,
    pub push_notifications_enabled: Option<bool>,
}

impl SettingsPatch {
    pub fn validate(&self) -> AppResult<()> {
        if let Some(h) = self.sla_hours {
            if !(1..=8760).contains(&h) {
                return Err(AppError::validation("sla_hours must be between 1 and 8760"));
            }
        }
        if let Some(h) = self.sla_reminder_hours {
            if h < 0 {
                return Err(AppError::validation("sla_reminder_hours must be >= 0"));
            }
        }
        if let Some(f) = &self.features {
            if !f.is_object() {
                return Err(AppError::validation("features must be a JSON object"));
            }
        }
        Ok(())
    }
}

fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub struct SettingsService {
    db: DatabaseConnection,
}

impl SettingsService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Load the settings row, creating it with defaults if absent.
    pub async fn load(&self) -> AppResult<Settings> {
        self.ensure_schema().await?;
        Ok(self.row().await?.into())
    }

    /// Settings for side channels: fall back to defaults instead of failing.
    pub async fn load_or_default(&self) -> Settings {
        match self.load().await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!("Could not read app settings, using defaults: {}", e);
                Settings::default()
            }
        }
    }

    pub async fn update(&self, patch: SettingsPatch) -> AppResult<Settings> {
        patch.validate()?;
        self.ensure_schema().await?;

        let row = self.row().await?;
        let mut active: app_settings::ActiveModel = row.into();

        if let Some(v) = patch.allow_anonymous_reporting {
            active.allow_anonymous_reporting = sea_orm::ActiveValue::Set(v);
        }
        if let Some(v) = patch.require_email_verification {
            active.require_email_verification = sea_orm::ActiveValue::Set(v);
        }
        if let Some(v) = patch.auto_assign_issues {
            active.auto_assign_issues = sea_orm::ActiveValue::Set(v);
        }
        if let Some(v) = patch.features {
            active.features = sea_orm::ActiveValue::Set(Some(v));
        }
        if let Some(v) = patch.sla_hours {
            active.sla_hours = sea_orm::ActiveValue::Set(v);
        }
        if let Some(v) = patch.sla_reminder_hours {
            active.sla_reminder_hours = sea_orm::ActiveValue::Set(Some(v));
        }
        if let Some(v) = patch.city_logo_url {
            active.city_logo_url = sea_orm::ActiveValue::Set(blank_to_none(v));
        }
        if let Some(v) = patch.support_email {
            active.support_email = sea_orm::ActiveValue::Set(blank_to_none(v));
        }
        if let Some(v) = patch.website_url {
            active.website_url = sea_orm::ActiveValue::Set(blank_to_none(v));
        }
        if let Some(v) = patch.auto_email_on_status_change {
            active.auto_email_on_status_change = sea_orm::ActiveValue::Set(v);
        }
        if let Some(v) = patch.push_notifications_enabled {
            active.push_notifications_enabled = sea_orm::ActiveValue::Set(v);
        }
        active.updated_at = sea_orm::ActiveValue::Set(Some(chrono::Utc::now().naive_utc()));

        let updated = active.update(&self.db).await?;
        tracing::info!("App settings updated");
        Ok(updated.into())
    }

    /// First row by id; inserted with column defaults when the table is empty.
    async fn row(&self) -> AppResult<AppSettingsModel> {
        if let Some(row) = AppSettings::find()
            .order_by_asc(app_settings::Column::Id)
            .one(&self.db)
            .await?
        {
            return Ok(row);
        }

        let defaults = Settings::default();
        let row = app_settings::ActiveModel {
            allow_anonymous_reporting: sea_orm::ActiveValue::Set(
                defaults.allow_anonymous_reporting,
            ),
            require_email_verification: sea_orm::ActiveValue::Set(
                defaults.require_email_verification,
            ),
            auto_assign_issues: sea_orm::ActiveValue::Set(defaults.auto_assign_issues),
            features: sea_orm::ActiveValue::Set(Some(defaults.features)),
            sla_hours: sea_orm::ActiveValue::Set(defaults.sla_hours),
            sla_reminder_hours: sea_orm::ActiveValue::Set(None),
            city_logo_url: sea_orm::ActiveValue::Set(None),
            support_email: sea_orm::ActiveValue::Set(None),
            website_url: sea_orm::ActiveValue::Set(None),
            auto_email_on_status_change: sea_orm::ActiveValue::Set(
                defaults.auto_email_on_status_change,
            ),
            push_notifications_enabled: sea_orm::ActiveValue::Set(
                defaults.push_notifications_enabled,
            ),
            created_at: sea_orm::ActiveValue::Set(chrono::Utc::now().naive_utc()),
            updated_at: sea_orm::ActiveValue::Set(None),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        tracing::info!("Created default app settings row");
        Ok(row)
    }

    /// Fail with a migration hint when the newest settings column is absent,
    /// instead of surfacing a raw column error.
    async fn ensure_schema(&self) -> AppResult<()> {
        let probe = self
            .db
            .query_one(Statement::from_string(
                DatabaseBackend::Postgres,
                "SELECT 1 FROM information_schema.columns \
                 WHERE table_name = 'app_settings' AND column_name = 'auto_assign_issues'"
                    .to_string(),
            ))
            .await?;

        if probe.is_none() {
            return Err(AppError::MigrationRequired(
                "app_settings.auto_assign_issues column missing".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_notifications() {
        let s = Settings::default();
        assert!(s.auto_email_on_status_change);
        assert!(s.push_notifications_enabled);
        assert!(!s.auto_assign_issues);
        assert_eq!(s.sla_hours, 48);
    }

    #[test]
    fn patch_validation() {
        let ok = SettingsPatch {
            sla_hours: Some(72),
            ..Default::default()
        };
        assert!(ok.validate().is_ok());

        let bad = SettingsPatch {
            sla_hours: Some(0),
            ..Default::default()
        };
        assert!(bad.validate().is_err());

        let bad = SettingsPatch {
            features: Some(serde_json::json!([1, 2])),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn blank_strings_clear_optional_fields() {
        assert_eq!(blank_to_none("  ".to_string()), None);
        assert_eq!(
            blank_to_none(" ops@city.in ".to_string()).as_deref(),
            Some("ops@city.in")
        );
    }
}
