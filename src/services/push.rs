use crate::config::push::PushConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use std::sync::Arc;

/// VAPID tokens are valid for 12 hours; push services reject anything over 24.
const VAPID_TOKEN_LIFETIME_SECS: i64 = 12 * 3600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Delivered,
    /// The push service no longer knows this endpoint; drop the subscription.
    Gone,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, endpoint: &str) -> Result<PushOutcome>;
}

#[derive(Debug, Serialize)]
struct VapidClaims {
    aud: String,
    exp: i64,
    sub: String,
}

/// Payload-less Web Push: the service worker wakes and fetches what changed.
pub struct WebPushSender {
    client: reqwest::Client,
    key: EncodingKey,
    public_key: String,
    subject: String,
    ttl_seconds: u32,
}

impl WebPushSender {
    pub fn new(cfg: &PushConfig) -> Result<Self> {
        let key = EncodingKey::from_ec_pem(cfg.private_key_pem.as_bytes())
            .context("VAPID_PRIVATE_KEY_PEM is not a valid P-256 PKCS#8 key")?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            key,
            public_key: cfg.public_key.clone(),
            subject: cfg.subject.clone(),
            ttl_seconds: cfg.ttl_seconds,
        })
    }

    fn vapid_token(&self, endpoint: &str) -> Result<String> {
        let claims = VapidClaims {
            aud: audience(endpoint)?,
            exp: chrono::Utc::now().timestamp() + VAPID_TOKEN_LIFETIME_SECS,
            sub: self.subject.clone(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::ES256), &claims, &self.key)
            .context("Failed to sign VAPID token")
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(&self, endpoint: &str) -> Result<PushOutcome> {
        let token = self.vapid_token(endpoint)?;
        let response = self
            .client
            .post(endpoint)
            .header("TTL", self.ttl_seconds.to_string())
            .header(
                reqwest::header::AUTHORIZATION,
                format!("vapid t={}, k={}", token, self.public_key),
            )
            .header(reqwest::header::CONTENT_LENGTH, "0")
            .send()
            .await?;

        classify_status(response.status().as_u16())
    }
}

/// Used when VAPID keys are not configured.
pub struct DisabledPush;

#[async_trait]
impl PushSender for DisabledPush {
    async fn send(&self, endpoint: &str) -> Result<PushOutcome> {
        tracing::debug!("Push disabled, skipping {}", endpoint);
        Ok(PushOutcome::Delivered)
    }
}

pub fn build_push_sender(cfg: Option<&PushConfig>) -> Arc<dyn PushSender> {
    match cfg.map(WebPushSender::new) {
        Some(Ok(sender)) => {
            tracing::info!("Web Push configured");
            Arc::new(sender)
        }
        Some(Err(e)) => {
            tracing::warn!("Invalid VAPID configuration, push disabled: {e:#}");
            Arc::new(DisabledPush)
        }
        None => {
            tracing::warn!("VAPID keys not set, push notifications disabled");
            Arc::new(DisabledPush)
        }
    }
}

/// The VAPID `aud` claim is the origin of the push endpoint.
fn audience(endpoint: &str) -> Result<String> {
    let url = reqwest::Url::parse(endpoint).context("Invalid push endpoint")?;
    let origin = url.origin();
    if !origin.is_tuple() {
        anyhow::bail!("Push endpoint has no origin: {}", endpoint);
    }
    Ok(origin.ascii_serialization())
}

fn classify_status(status: u16) -> Result<PushOutcome> {
    match status {
        200..=299 => Ok(PushOutcome::Delivered),
        404 | 410 => Ok(PushOutcome::Gone),
        other => anyhow::bail!("Push service responded with HTTP {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audience_is_endpoint_origin() {
        assert_eq!(
            audience("https://fcm.googleapis.com/fcm/send/abc:123").unwrap(),
            "https://fcm.googleapis.com"
        );
        assert_eq!(
            audience("https://push.example.com:8443/x").unwrap(),
            "https://push.example.com:8443"
        );
        assert!(audience("not a url").is_err());
    }

    #[test]
    fn status_classification() {
        assert_eq!(classify_status(201).unwrap(), PushOutcome::Delivered);
        assert_eq!(classify_status(410).unwrap(), PushOutcome::Gone);
        assert_eq!(classify_status(404).unwrap(), PushOutcome::Gone);
        assert!(classify_status(429).is_err());
        assert!(classify_status(500).is_err());
    }
}
