use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailProvider {
    Smtp,
    /// Render and log messages without delivering them.
    Log,
}

#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

#[derive(Clone)]
pub struct EmailConfig {
    pub provider: EmailProvider,
    pub smtp: Option<SmtpConfig>,
    pub from_address: String,
    pub frontend_url: String,
    /// When set, every message is delivered here instead of the real recipient.
    pub redirect_to: Option<String>,
}

impl EmailConfig {
    pub fn from_env() -> Self {
        let smtp = env::var("SMTP_HOST").ok().and_then(|host| {
            Some(SmtpConfig {
                host,
                port: super::env_parse("SMTP_PORT", 587),
                username: env::var("SMTP_USERNAME").ok()?,
                password: env::var("SMTP_PASSWORD").ok()?,
            })
        });

        let provider = match env::var("EMAIL_PROVIDER")
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase()
            .as_str()
        {
            "log" => EmailProvider::Log,
            "smtp" => EmailProvider::Smtp,
            _ if smtp.is_some() => EmailProvider::Smtp,
            _ => EmailProvider::Log,
        };

        let from_address = env::var("SMTP_FROM").unwrap_or_else(|_| {
            let addr = smtp
                .as_ref()
                .map(|s| s.username.clone())
                .unwrap_or_else(|| "noreply@improve-my-city.local".to_string());
            format!("Improve My City <{}>", addr)
        });

        let frontend_url = env::var("FRONTEND_URL")
            .unwrap_or_else(|_| "http://localhost:5173".to_string())
            .trim_end_matches('/')
            .to_string();

        let redirect_to = env::var("EMAIL_REDIRECT_TO")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        Self {
            provider,
            smtp,
            from_address,
            frontend_url,
            redirect_to,
        }
    }
}
