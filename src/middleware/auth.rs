use crate::{
    error::{AppError, AppResult},
    models::{User, UserRole},
    utils::jwt::{decode_jwt, is_access_token},
};
use axum::{
    extract::{FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
    Extension,
};
use sea_orm::{DatabaseConnection, EntityTrait};

/// Authenticated caller, loaded from the database on every request so role
/// and activation changes apply immediately.
#[derive(Debug, Clone, Copy)]
pub struct AuthUser {
    pub user_id: i32,
    pub role: UserRole,
}

impl AuthUser {
    pub fn is_staff_or_above(&self) -> bool {
        self.role.is_staff_or_above()
    }

    pub fn is_admin_or_above(&self) -> bool {
        self.role.is_admin_or_above()
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == UserRole::SuperAdmin
    }

    /// Reject the caller unless their role is one of `allowed`.
    pub fn require_roles(&self, allowed: &[UserRole]) -> AppResult<()> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden)
        }
    }

    pub fn require_admin(&self) -> AppResult<()> {
        self.require_roles(&[UserRole::Admin, UserRole::SuperAdmin])
    }

    pub fn require_super_admin(&self) -> AppResult<()> {
        self.require_roles(&[UserRole::SuperAdmin])
    }
}

/// Present on optional-auth routes; `None` for anonymous callers.
#[derive(Debug, Clone, Copy)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

async fn resolve_user(db: &DatabaseConnection, token: &str) -> AppResult<AuthUser> {
    let claims = decode_jwt(token).map_err(|_| AppError::Unauthorized)?;

    // Refresh tokens are only accepted by /auth/refresh.
    if !is_access_token(&claims) {
        return Err(AppError::Unauthorized);
    }

    let user_id: i32 = claims.sub.parse().map_err(|_| AppError::Unauthorized)?;

    let user = User::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or(AppError::Unauthorized)?;

    if !user.is_active {
        return Err(AppError::Forbidden);
    }

    Ok(AuthUser {
        user_id: user.id,
        role: user.role,
    })
}

/// Bearer authentication for protected routes.
pub async fn auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&headers).ok_or(AppError::Unauthorized)?;
    let auth_user = resolve_user(&db, &token).await?;
    request.extensions_mut().insert(auth_user);
    Ok(next.run(request).await)
}

/// Like [`auth_middleware`] but lets anonymous callers through. A token that
/// is present but invalid is still rejected.
pub async fn optional_auth_middleware(
    Extension(db): Extension<DatabaseConnection>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let user = match extract_bearer_token(&headers) {
        Some(token) => Some(resolve_user(&db, &token).await?),
        None => None,
    };
    if let Some(user) = user {
        request.extensions_mut().insert(user);
    }
    request.extensions_mut().insert(MaybeAuthUser(user));
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())?;

    let token = auth_header.strip_prefix("Bearer ")?;
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or(AppError::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<MaybeAuthUser>()
            .copied()
            .unwrap_or(MaybeAuthUser(None)))
    }
}
