use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> axum::response::Response {
        Json(self).into_response()
    }
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    /// Same envelope, sent with `201 Created`.
    pub fn created(data: T) -> (StatusCode, Self) {
        (StatusCode::CREATED, Self::ok(data))
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaginatedResponse<T: Serialize> {
    pub items: Vec<T>,
    pub total: u64,
    pub offset: u64,
    pub limit: u64,
    pub has_more: bool,
}

impl<T: Serialize> PaginatedResponse<T> {
    pub fn new(items: Vec<T>, total: u64, offset: u64, limit: u64) -> Self {
        let has_more = offset.saturating_add(items.len() as u64) < total;
        Self {
            items,
            total,
            offset,
            limit,
            has_more,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, ToSchema)]
pub struct PaginationQuery {
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl PaginationQuery {
    /// Clamp to `1..=MAX_LIMIT`, defaulting to `DEFAULT_LIMIT`.
    pub fn resolve(&self) -> (u64, u64) {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        (self.offset.unwrap_or(0), limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_more_when_page_is_not_last() {
        let resp = PaginatedResponse::new(vec![1, 2], 5, 0, 2);
        assert!(resp.has_more);
    }

    #[test]
    fn no_more_on_last_page() {
        let resp = PaginatedResponse::new(vec![1], 5, 4, 2);
        assert!(!resp.has_more);
    }

    #[test]
    fn empty_result_has_no_more() {
        let resp = PaginatedResponse::<i32>::new(vec![], 0, 0, 20);
        assert!(!resp.has_more);
    }

    #[test]
    fn limit_is_clamped() {
        let q = PaginationQuery {
            limit: Some(1000),
            offset: None,
        };
        assert_eq!(q.resolve(), (0, MAX_LIMIT));

        let q = PaginationQuery {
            limit: Some(0),
            offset: Some(40),
        };
        assert_eq!(q.resolve(), (40, 1));
    }

    #[test]
    fn defaults_apply() {
        assert_eq!(PaginationQuery::default().resolve(), (0, DEFAULT_LIMIT));
    }
}
