//! Mail delivery boundary.
//!
//! Handlers hand a [`MailMessage`] to a [`Mailer`]. Delivery is not part of
//! this service: the default [`LogMailer`] records the message and returns
//! `Ok(())`, and deployments plug in a real sender behind the same trait.
//! Mail failures never fail the request that triggered them.

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

/// Templates rendered by the delivery side.
pub const TEMPLATE_WELCOME: &str = "welcome";
pub const TEMPLATE_BANNED: &str = "banned";

#[derive(Clone, Debug, PartialEq)]
pub struct MailMessage {
    pub recipient: String,
    pub template: &'static str,
    pub data: Value,
    pub subject: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    /// Deliver a message.
    async fn send_mail(&self, message: MailMessage) -> Result<()>;
}

/// Local dev mailer that logs the payload instead of sending real mail.
#[derive(Clone, Copy, Debug)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, message: MailMessage) -> Result<()> {
        info!(
            recipient = %message.recipient,
            template = message.template,
            subject = %message.subject,
            data = %message.data,
            "mail send stub"
        );
        Ok(())
    }
}

/// Send and log failures; callers never fail on mail.
pub async fn send_best_effort(mailer: &dyn Mailer, message: MailMessage) {
    let template = message.template;
    if let Err(err) = mailer.send_mail(message).await {
        warn!(template, "Failed to send mail: {err:#}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingMailer {
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Mailer for FailingMailer {
        async fn send_mail(&self, _message: MailMessage) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("smtp down"))
        }
    }

    fn message() -> MailMessage {
        MailMessage {
            recipient: "zoe@gmail.com".to_string(),
            template: TEMPLATE_WELCOME,
            data: json!({"username": "Zoe"}),
            subject: "Welcome".to_string(),
        }
    }

    #[tokio::test]
    async fn log_mailer_accepts_messages() -> Result<()> {
        LogMailer.send_mail(message()).await
    }

    #[tokio::test]
    async fn best_effort_swallows_failures() {
        let mailer = FailingMailer {
            attempts: AtomicUsize::new(0),
        };
        send_best_effort(&mailer, message()).await;
        assert_eq!(mailer.attempts.load(Ordering::SeqCst), 1);
    }
}
