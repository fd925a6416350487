use super::env_parse;
use anyhow::Result;
use std::env;

/// Lifetime of single-purpose tokens (email verification, password reset).
pub const PURPOSE_TOKEN_EXPIRY: u64 = 3600;

#[derive(Debug, Clone)]
pub struct JwtConfig {
    pub secret: String,
    pub access_token_expiry: u64,  // 15 minutes
    pub refresh_token_expiry: u64, // 7 days
}

impl JwtConfig {
    pub fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET")
            .map_err(|_| anyhow::anyhow!("JWT_SECRET environment variable must be set"))?;

        if secret.len() < 32 {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be at least 32 characters"
            ));
        }

        Ok(Self {
            secret,
            access_token_expiry: env_parse("JWT_ACCESS_EXPIRATION", 900),
            refresh_token_expiry: env_parse("JWT_REFRESH_EXPIRATION", 604_800),
        })
    }
}
