use crate::config::email::{EmailConfig, EmailProvider};
use anyhow::Result;
use async_trait::async_trait;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound email channel used by the notification workers.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &EmailMessage) -> Result<()>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    redirect_to: Option<String>,
}

impl SmtpMailer {
    pub fn new(cfg: &EmailConfig) -> Result<Self> {
        let smtp = cfg
            .smtp
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP_HOST/SMTP_USERNAME/SMTP_PASSWORD not set"))?;
        let creds = Credentials::new(smtp.username.clone(), smtp.password.clone());
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.host)?
            .port(smtp.port)
            .credentials(creds)
            .build();
        let from: Mailbox = cfg
            .from_address
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                anyhow::anyhow!("Invalid from address '{}': {}", cfg.from_address, e)
            })?;

        Ok(Self {
            transport,
            from,
            redirect_to: cfg.redirect_to.clone(),
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        let message = apply_redirect(message, self.redirect_to.as_deref());
        let to: Mailbox = message
            .to
            .parse()
            .map_err(|e: lettre::address::AddressError| {
                anyhow::anyhow!("Invalid to address '{}': {}", message.to, e)
            })?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&message.subject)
            .header(ContentType::TEXT_PLAIN)
            .body(message.body.clone())?;

        self.transport.send(email).await?;
        tracing::info!("Email sent to {}: {}", message.to, message.subject);
        Ok(())
    }
}

/// Logs messages instead of delivering them (development, CI).
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        tracing::info!(
            to = %message.to,
            subject = %message.subject,
            "Email (log provider):\n{}",
            message.body
        );
        Ok(())
    }
}

pub fn build_mailer(cfg: &EmailConfig) -> Arc<dyn Mailer> {
    match cfg.provider {
        EmailProvider::Smtp => match SmtpMailer::new(cfg) {
            Ok(m) => {
                tracing::info!("SMTP email provider configured");
                Arc::new(m)
            }
            Err(e) => {
                tracing::warn!("Failed to build SMTP transport, logging emails instead: {e}");
                Arc::new(LogMailer)
            }
        },
        EmailProvider::Log => {
            tracing::warn!("Email provider is 'log', messages will not be delivered");
            Arc::new(LogMailer)
        }
    }
}

/// Test mode: deliver to `redirect_to` and prepend the intended recipient.
fn apply_redirect(message: &EmailMessage, redirect_to: Option<&str>) -> EmailMessage {
    match redirect_to {
        Some(target) if !target.eq_ignore_ascii_case(&message.to) => EmailMessage {
            to: target.to_string(),
            subject: message.subject.clone(),
            body: format!(
                "[Test mode] This email was redirected to {}. Original recipient: {}\n\n{}",
                target, message.to, message.body
            ),
        },
        _ => message.clone(),
    }
}

/// Plain-text bodies for every outbound email.
#[derive(Debug, Clone)]
pub struct EmailTemplates {
    frontend_url: String,
}

impl EmailTemplates {
    pub fn new(frontend_url: impl Into<String>) -> Self {
        Self {
            frontend_url: frontend_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn link(&self, path: &str) -> String {
        format!("{}/{}", self.frontend_url, path.trim_start_matches('/'))
    }

    pub fn verify_email(&self, to: &str, name: &str, code: &str, token: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Verify your email".to_string(),
            body: format!(
                "Hello {name},\n\nThank you for creating an account with Improve My City.\n\n\
                 Your verification code is: {code}\n\n\
                 Or verify by opening this link:\n{link}\n\n\
                 The code expires in 60 minutes.",
                link = self.link(&format!("verify-email?token={token}")),
            ),
        }
    }

    pub fn password_reset(&self, to: &str, token: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Reset your password".to_string(),
            body: format!(
                "A password reset was requested for your account.\n\n\
                 Open the link below to choose a new password:\n{}\n\n\
                 This link expires in 1 hour. If you did not request this, you can safely ignore this email.",
                self.link(&format!("reset-password?token={token}")),
            ),
        }
    }

    pub fn account_created(&self, to: &str, name: &str, role: &str, token: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: "Your Improve My City account".to_string(),
            body: format!(
                "Hello {name},\n\nAn administrator created a {role} account for you.\n\n\
                 Set your password here:\n{}\n\nThis link expires in 1 hour.",
                self.link(&format!("reset-password?token={token}")),
            ),
        }
    }

    pub fn report_confirmation(&self, to: &str, issue_id: i32, title: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: format!("We received your report #{issue_id}"),
            body: format!(
                "Thank you for reporting \"{title}\".\n\n\
                 Your report has been logged as issue #{issue_id}. Track it here:\n{}",
                self.link(&format!("issues/{issue_id}")),
            ),
        }
    }

    pub fn status_changed(
        &self,
        to: &str,
        issue_id: i32,
        title: &str,
        status_label: &str,
        comment: Option<&str>,
    ) -> EmailMessage {
        let note = comment
            .filter(|c| !c.trim().is_empty())
            .map(|c| format!("\n\nNote from the team:\n{c}"))
            .unwrap_or_default();
        EmailMessage {
            to: to.to_string(),
            subject: format!("Issue #{issue_id} is now {status_label}"),
            body: format!(
                "The status of \"{title}\" changed to {status_label}.{note}\n\nView the issue:\n{}",
                self.link(&format!("issues/{issue_id}")),
            ),
        }
    }

    pub fn comment_added(
        &self,
        to: &str,
        issue_id: i32,
        title: &str,
        author: &str,
        body: &str,
    ) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: format!("New comment on issue #{issue_id}"),
            body: format!(
                "{author} commented on \"{title}\":\n\n{body}\n\nReply here:\n{}",
                self.link(&format!("issues/{issue_id}")),
            ),
        }
    }

    pub fn assigned(&self, to: &str, name: &str, issue_id: i32, title: &str) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            subject: format!("Issue #{issue_id} assigned to you"),
            body: format!(
                "Hello {name},\n\n\"{title}\" has been assigned to you.\n\n{}",
                self.link(&format!("admin/issues/{issue_id}")),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg() -> EmailMessage {
        EmailMessage {
            to: "citizen@example.in".to_string(),
            subject: "s".to_string(),
            body: "hello".to_string(),
        }
    }

    #[test]
    fn redirect_rewrites_recipient_and_names_original() {
        let out = apply_redirect(&msg(), Some("qa@example.in"));
        assert_eq!(out.to, "qa@example.in");
        assert!(out.body.contains("citizen@example.in"));
        assert!(out.body.ends_with("hello"));
    }

    #[test]
    fn no_redirect_passes_through() {
        assert_eq!(apply_redirect(&msg(), None), msg());
        assert_eq!(apply_redirect(&msg(), Some("CITIZEN@example.in")), msg());
    }

    #[test]
    fn links_use_frontend_url() {
        let t = EmailTemplates::new("https://city.example/");
        let m = t.password_reset("a@b.in", "tok");
        assert!(m.body.contains("https://city.example/reset-password?token=tok"));

        let m = t.verify_email("a@b.in", "Asha", "123456", "vt");
        assert!(m.body.contains("123456"));
        assert!(m.body.contains("verify-email?token=vt"));
    }

    #[test]
    fn status_email_includes_comment_only_when_present() {
        let t = EmailTemplates::new("http://x");
        let with = t.status_changed("a@b.in", 3, "Pothole", "Resolved", Some("Filled"));
        assert!(with.body.contains("Filled"));
        assert_eq!(with.subject, "Issue #3 is now Resolved");

        let without = t.status_changed("a@b.in", 3, "Pothole", "Resolved", Some("  "));
        assert!(!without.body.contains("Note from the team"));
    }
}
