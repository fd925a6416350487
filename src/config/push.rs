use std::env;

/// VAPID credentials for Web Push. Absent keys disable push delivery.
#[derive(Clone)]
pub struct PushConfig {
    pub public_key: String,
    pub private_key_pem: String,
    pub subject: String,
    pub ttl_seconds: u32,
}

impl PushConfig {
    pub fn from_env() -> Option<Self> {
        let public_key = env::var("VAPID_PUBLIC_KEY").ok()?;
        let raw_private = env::var("VAPID_PRIVATE_KEY_PEM").ok()?;
        // Allow single-line env values with literal "\n" separators.
        let private_key_pem = raw_private.replace("\\n", "\n");
        let subject = env::var("VAPID_SUBJECT")
            .unwrap_or_else(|_| "mailto:admin@improve-my-city.local".to_string());

        Some(Self {
            public_key,
            private_key_pem,
            subject,
            ttl_seconds: super::env_parse("PUSH_TTL_SECONDS", 86_400),
        })
    }
}
