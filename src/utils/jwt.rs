use crate::models::UserRole;
use anyhow::Result;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

static JWT_CONFIG: OnceLock<crate::config::jwt::JwtConfig> = OnceLock::new();

pub const ACCESS: &str = "access";
pub const REFRESH: &str = "refresh";

/// Purposes carried by single-use email tokens.
pub const PURPOSE_VERIFY: &str = "verify";
pub const PURPOSE_RESET: &str = "reset";

/// Initialize JWT config from environment. Must be called once at startup.
pub fn init_jwt_config(config: crate::config::jwt::JwtConfig) -> Result<()> {
    JWT_CONFIG
        .set(config)
        .map_err(|_| anyhow::anyhow!("JWT config already initialized"))?;
    Ok(())
}

fn get_config() -> Result<&'static crate::config::jwt::JwtConfig> {
    JWT_CONFIG
        .get()
        .ok_or_else(|| anyhow::anyhow!("JWT config not initialized"))
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub role: UserRole,
    pub exp: usize,
    pub iat: usize,
    pub token_type: String,
    /// Random per-token nonce so two refresh tokens minted in the same
    /// second never hash to the same stored value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jti: Option<String>,
}

/// Single-purpose token keyed by email (verification, password reset).
#[derive(Debug, Serialize, Deserialize)]
pub struct PurposeClaims {
    pub sub: String,
    pub purpose: String,
    pub exp: usize,
    pub iat: usize,
}

fn now() -> usize {
    chrono::Utc::now().timestamp() as usize
}

fn sign<T: Serialize>(claims: &T) -> Result<String> {
    let config = get_config()?;
    encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(config.secret.as_bytes()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to encode token: {}", e))
}

pub fn encode_access_token(user_id: i32, role: UserRole) -> Result<String> {
    let config = get_config()?;
    let now = now();
    sign(&Claims {
        sub: user_id.to_string(),
        role,
        exp: now + config.access_token_expiry as usize,
        iat: now,
        token_type: ACCESS.to_string(),
        jti: None,
    })
}

pub fn encode_refresh_token(user_id: i32, role: UserRole) -> Result<String> {
    let config = get_config()?;
    let now = now();
    sign(&Claims {
        sub: user_id.to_string(),
        role,
        exp: now + config.refresh_token_expiry as usize,
        iat: now,
        token_type: REFRESH.to_string(),
        jti: Some(uuid::Uuid::new_v4().to_string()),
    })
}

pub fn encode_purpose_token(email: &str, purpose: &str) -> Result<String> {
    let now = now();
    sign(&PurposeClaims {
        sub: email.to_owned(),
        purpose: purpose.to_owned(),
        exp: now + crate::config::jwt::PURPOSE_TOKEN_EXPIRY as usize,
        iat: now,
    })
}

pub fn decode_jwt(token: &str) -> Result<Claims> {
    let config = get_config()?;

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| anyhow::anyhow!("Failed to decode JWT: {}", e))
}

/// Decode a purpose token and return the email it was issued for.
pub fn decode_purpose_token(token: &str, expected_purpose: &str) -> Result<String> {
    let config = get_config()?;
    let claims = decode::<PurposeClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| anyhow::anyhow!("Failed to decode purpose token: {}", e))?;

    if claims.purpose != expected_purpose {
        anyhow::bail!("Token purpose mismatch");
    }
    Ok(claims.sub)
}

pub fn is_refresh_token(claims: &Claims) -> bool {
    claims.token_type == REFRESH
}

pub fn is_access_token(claims: &Claims) -> bool {
    claims.token_type == ACCESS
}

/// Digest stored in `refresh_tokens.token`.
pub fn hash_refresh_token(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub fn access_token_expiry_seconds() -> u64 {
    get_config().map(|c| c.access_token_expiry).unwrap_or(900)
}

pub fn refresh_token_expiry_seconds() -> u64 {
    get_config().map(|c| c.refresh_token_expiry).unwrap_or(604_800)
}
