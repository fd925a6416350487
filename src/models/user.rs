use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    #[sea_orm(string_value = "citizen")]
    Citizen,
    #[sea_orm(string_value = "staff")]
    Staff,
    #[sea_orm(string_value = "admin")]
    Admin,
    #[sea_orm(string_value = "super_admin")]
    SuperAdmin,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Citizen => "citizen",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "citizen" => Some(Self::Citizen),
            "staff" => Some(Self::Staff),
            "admin" => Some(Self::Admin),
            "super_admin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }

    /// Staff, admin or super admin.
    pub fn is_staff_or_above(&self) -> bool {
        !matches!(self, Self::Citizen)
    }

    pub fn is_admin_or_above(&self) -> bool {
        matches!(self, Self::Admin | Self::SuperAdmin)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub email: String,
    #[serde(skip_serializing)]
    pub hashed_password: String,
    pub name: String,
    pub mobile: Option<String>,
    pub role: UserRole,
    pub is_active: bool,
    pub is_verified: bool,
    #[serde(skip_serializing)]
    pub email_verify_code: Option<String>,
    #[serde(skip_serializing)]
    pub email_verify_expires_at: Option<DateTime>,
    pub last_login: Option<DateTime>,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::staff_region::Entity")]
    StaffRegion,
    #[sea_orm(has_many = "super::push_subscription::Entity")]
    PushSubscription,
}

impl Related<super::staff_region::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::StaffRegion.def()
    }
}

impl Related<super::push_subscription::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PushSubscription.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            UserRole::Citizen,
            UserRole::Staff,
            UserRole::Admin,
            UserRole::SuperAdmin,
        ] {
            assert_eq!(UserRole::parse(role.as_str()), Some(role));
        }
        assert_eq!(UserRole::parse("banned"), None);
    }

    #[test]
    fn role_hierarchy() {
        assert!(!UserRole::Citizen.is_staff_or_above());
        assert!(UserRole::Staff.is_staff_or_above());
        assert!(!UserRole::Staff.is_admin_or_above());
        assert!(UserRole::SuperAdmin.is_admin_or_above());
    }
}
