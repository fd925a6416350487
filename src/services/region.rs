use crate::{
    error::{AppError, AppResult},
    models::{staff_region, StaffRegion, StaffRegionModel, User},
};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
};

/// Upper-case and check a state code (2-3 letters or digits).
pub fn normalize_state_code(raw: &str) -> AppResult<String> {
    let code = raw.trim().to_ascii_uppercase();
    if !(2..=3).contains(&code.len()) || !code.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(AppError::validation("state_code must be 2-3 letters or digits"));
    }
    Ok(code)
}

pub struct RegionService {
    db: DatabaseConnection,
}

impl RegionService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn list(&self, user_id: i32) -> AppResult<Vec<StaffRegionModel>> {
        self.ensure_user(user_id).await?;
        Ok(StaffRegion::find()
            .filter(staff_region::Column::UserId.eq(user_id))
            .order_by_asc(staff_region::Column::StateCode)
            .all(&self.db)
            .await?)
    }

    pub async fn add(&self, user_id: i32, state_code: &str) -> AppResult<StaffRegionModel> {
        let code = normalize_state_code(state_code)?;
        self.ensure_user(user_id).await?;

        let exists = StaffRegion::find()
            .filter(staff_region::Column::UserId.eq(user_id))
            .filter(staff_region::Column::StateCode.eq(code.as_str()))
            .one(&self.db)
            .await?
            .is_some();
        if exists {
            return Err(AppError::Conflict(format!(
                "Region {} is already assigned to this user",
                code
            )));
        }

        let region = staff_region::ActiveModel {
            user_id: sea_orm::ActiveValue::Set(user_id),
            state_code: sea_orm::ActiveValue::Set(code),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;
        tracing::info!(user_id, state_code = %region.state_code, "Region assigned");
        Ok(region)
    }

    pub async fn remove(&self, region_id: i32) -> AppResult<()> {
        let result = StaffRegion::delete_by_id(region_id).exec(&self.db).await?;
        if result.rows_affected == 0 {
            return Err(AppError::NotFound);
        }
        Ok(())
    }

    async fn ensure_user(&self, user_id: i32) -> AppResult<()> {
        User::find_by_id(user_id)
            .one(&self.db)
            .await?
            .map(|_| ())
            .ok_or(AppError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_are_upper_cased() {
        assert_eq!(normalize_state_code(" ka ").unwrap(), "KA");
        assert_eq!(normalize_state_code("up1").unwrap(), "UP1");
    }

    #[test]
    fn malformed_state_codes_rejected() {
        assert!(normalize_state_code("").is_err());
        assert!(normalize_state_code("K").is_err());
        assert!(normalize_state_code("KARN").is_err());
        assert!(normalize_state_code("K-").is_err());
    }
}
