use crate::{
    error::{AppError, AppResult},
    models::{issue, issue_type, Issue, IssueStatus, IssueType, IssueTypeModel},
};
use sea_orm::{
    sea_query::{Expr, Func},
    ActiveModelTrait, ColumnTrait, DatabaseBackend, DatabaseConnection, EntityTrait,
    FromQueryResult, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Statement,
};
use serde::Serialize;
use utoipa::ToSchema;

pub const DEFAULT_COLOR: &str = "#6366f1";
const NAME_LEN: std::ops::RangeInclusive<usize> = 3..=40;

#[derive(Debug, Clone, Serialize, ToSchema, FromQueryResult)]
pub struct IssueTypeWithCount {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub color: String,
    pub display_order: i32,
    pub is_active: bool,
    pub issue_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueTypeStats {
    pub total_count: u64,
    pub last_7d_count: u64,
    pub avg_resolution_hours: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct IssueTypeInput {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub display_order: Option<i32>,
    pub is_active: Option<bool>,
}

pub fn validate_name(raw: &str) -> AppResult<String> {
    let name = raw.trim();
    if !NAME_LEN.contains(&name.chars().count()) {
        return Err(AppError::validation("Name must be 3-40 characters"));
    }
    Ok(name.to_string())
}

/// Lower-case, ASCII alphanumerics joined by single dashes.
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn validate_color(raw: &str) -> AppResult<String> {
    let color = raw.trim();
    let hex = color.strip_prefix('#').unwrap_or("");
    if !matches!(hex.len(), 3 | 6) || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(AppError::validation("Color must be a hex value like #4f46e5"));
    }
    Ok(color.to_ascii_lowercase())
}

const LIST_WITH_COUNTS_SQL: &str = r#"
    SELECT t.id, t.name, t.slug, t.description, t.color, t.display_order, t.is_active,
           COUNT(i.id) AS issue_count
    FROM issue_types t
    LEFT JOIN issues i ON i.category = t.name
    GROUP BY t.id
    ORDER BY t.display_order, t.name
"#;

pub struct IssueTypeService {
    db: DatabaseConnection,
}

impl IssueTypeService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Active types for the report form, alphabetical.
    pub async fn list_active(&self) -> AppResult<Vec<IssueTypeModel>> {
        Ok(IssueType::find()
            .filter(issue_type::Column::IsActive.eq(true))
            .order_by_asc(issue_type::Column::Name)
            .all(&self.db)
            .await?)
    }

    pub async fn list_with_counts(&self) -> AppResult<Vec<IssueTypeWithCount>> {
        Ok(IssueTypeWithCount::find_by_statement(Statement::from_string(
            DatabaseBackend::Postgres,
            LIST_WITH_COUNTS_SQL.to_string(),
        ))
        .all(&self.db)
        .await?)
    }

    async fn find(&self, id: i32) -> AppResult<IssueTypeModel> {
        IssueType::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(AppError::NotFound)
    }

    async fn ensure_unique(&self, name: &str, except: Option<i32>) -> AppResult<()> {
        let mut q = IssueType::find().filter(
            Expr::expr(Func::lower(Expr::col(issue_type::Column::Name))).eq(name.to_lowercase()),
        );
        if let Some(id) = except {
            q = q.filter(issue_type::Column::Id.ne(id));
        }
        if q.one(&self.db).await?.is_some() {
            return Err(AppError::Conflict("Type already exists".to_string()));
        }
        Ok(())
    }

    /// New types go to the end of the display order.
    pub async fn create(&self, input: IssueTypeInput) -> AppResult<IssueTypeModel> {
        let name = validate_name(input.name.as_deref().unwrap_or_default())?;
        self.ensure_unique(&name, None).await?;
        let color = match input.color.as_deref() {
            Some(c) => validate_color(c)?,
            None => DEFAULT_COLOR.to_string(),
        };

        let max_order: Option<i32> = IssueType::find()
            .select_only()
            .expr(Expr::col(issue_type::Column::DisplayOrder).max())
            .into_tuple()
            .one(&self.db)
            .await?
            .flatten();

        let created = issue_type::ActiveModel {
            slug: sea_orm::ActiveValue::Set(slugify(&name)),
            name: sea_orm::ActiveValue::Set(name),
            description: sea_orm::ActiveValue::Set(
                input.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
            ),
            color: sea_orm::ActiveValue::Set(color),
            display_order: sea_orm::ActiveValue::Set(
                input.display_order.unwrap_or(max_order.unwrap_or(0) + 1),
            ),
            is_active: sea_orm::ActiveValue::Set(input.is_active.unwrap_or(true)),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        tracing::info!(issue_type_id = created.id, name = %created.name, "Issue type created");
        Ok(created)
    }

    pub async fn update(&self, id: i32, input: IssueTypeInput) -> AppResult<IssueTypeModel> {
        let existing = self.find(id).await?;
        let mut active: issue_type::ActiveModel = existing.into();

        if let Some(raw) = input.name.as_deref() {
            let name = validate_name(raw)?;
            self.ensure_unique(&name, Some(id)).await?;
            active.slug = sea_orm::ActiveValue::Set(slugify(&name));
            active.name = sea_orm::ActiveValue::Set(name);
        }
        if let Some(description) = input.description {
            let description = description.trim().to_string();
            active.description =
                sea_orm::ActiveValue::Set((!description.is_empty()).then_some(description));
        }
        if let Some(color) = input.color.as_deref() {
            active.color = sea_orm::ActiveValue::Set(validate_color(color)?);
        }
        if let Some(order) = input.display_order {
            active.display_order = sea_orm::ActiveValue::Set(order);
        }
        if let Some(is_active) = input.is_active {
            active.is_active = sea_orm::ActiveValue::Set(is_active);
        }
        Ok(active.update(&self.db).await?)
    }

    /// Types still referenced by issues must be deactivated instead.
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let existing = self.find(id).await?;
        let in_use = Issue::find()
            .filter(issue::Column::Category.eq(existing.name.as_str()))
            .count(&self.db)
            .await?;
        if in_use > 0 {
            return Err(AppError::Validation(format!(
                "Cannot delete: {} issue(s) use this type",
                in_use
            )));
        }
        IssueType::delete_by_id(id).exec(&self.db).await?;
        Ok(())
    }

    pub async fn stats(&self, id: i32) -> AppResult<IssueTypeStats> {
        let existing = self.find(id).await?;
        let since = chrono::Utc::now().naive_utc() - chrono::Duration::days(7);

        let total_count = Issue::find()
            .filter(issue::Column::Category.eq(existing.name.as_str()))
            .count(&self.db)
            .await?;
        let last_7d_count = Issue::find()
            .filter(issue::Column::Category.eq(existing.name.as_str()))
            .filter(issue::Column::CreatedAt.gte(since))
            .count(&self.db)
            .await?;

        let resolved: Vec<(chrono::NaiveDateTime, Option<chrono::NaiveDateTime>)> = Issue::find()
            .select_only()
            .column(issue::Column::CreatedAt)
            .column(issue::Column::ResolvedAt)
            .filter(issue::Column::Category.eq(existing.name.as_str()))
            .filter(issue::Column::Status.eq(IssueStatus::Resolved))
            .into_tuple()
            .all(&self.db)
            .await?;
        let hours: Vec<f64> = resolved
            .into_iter()
            .filter_map(|(created, resolved)| {
                resolved.map(|r| (r - created).num_seconds() as f64 / 3600.0)
            })
            .collect();
        let avg_resolution_hours =
            (!hours.is_empty()).then(|| hours.iter().sum::<f64>() / hours.len() as f64);

        Ok(IssueTypeStats {
            total_count,
            last_7d_count,
            avg_resolution_hours,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_length_checked() {
        assert!(validate_name("ab").is_err());
        assert!(validate_name(&"x".repeat(41)).is_err());
        assert_eq!(validate_name("  Water Leak ").unwrap(), "Water Leak");
    }

    #[test]
    fn slug_from_name() {
        assert_eq!(slugify("Garbage & Waste"), "garbage-waste");
        assert_eq!(slugify("  Street  Lights "), "street-lights");
    }

    #[test]
    fn colors_must_be_hex() {
        assert_eq!(validate_color("#ABCDEF").unwrap(), "#abcdef");
        assert!(validate_color("red").is_err());
        assert!(validate_color("#12345").is_err());
    }
}
