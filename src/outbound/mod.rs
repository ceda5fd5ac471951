//! Outbound email transport.
//!
//! The campaign executor only depends on the [`EmailTransport`] trait; the
//! production implementation relays through SMTP via lettre. Tests inject
//! their own transport.

use crate::config::EmailConfig;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub html_body: String,
    pub from_email: String,
    pub from_name: String,
}

#[derive(Debug, Error)]
pub enum TransportError {
    /// Address rejected or otherwise unrecoverable for this recipient.
    #[error("permanent delivery failure: {0}")]
    Permanent(String),
    /// Relay or connection trouble; a later resend may succeed.
    #[error("transient delivery failure: {0}")]
    Transient(String),
}

impl TransportError {
    pub fn bounce_type(&self) -> &'static str {
        match self {
            Self::Permanent(_) => "hard",
            Self::Transient(_) => "soft",
        }
    }
}

pub trait EmailTransport: Send + Sync {
    fn send(&self, mail: &OutboundEmail) -> Result<(), TransportError>;
}

pub struct SmtpMailer {
    config: EmailConfig,
}

impl SmtpMailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }
}

impl EmailTransport for SmtpMailer {
    fn send(&self, mail: &OutboundEmail) -> Result<(), TransportError> {
        let from = format!("{} <{}>", mail.from_name, mail.from_email)
            .parse()
            .map_err(|e| TransportError::Permanent(format!("Invalid from address: {e}")))?;
        let to = mail
            .to
            .parse()
            .map_err(|e| TransportError::Permanent(format!("Invalid recipient address: {e}")))?;

        let message = Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html_body.clone())
            .map_err(|e| TransportError::Permanent(format!("Failed to build message: {e}")))?;

        let creds = Credentials::new(self.config.username.clone(), self.config.password.clone());
        let mailer = SmtpTransport::relay(&self.config.smtp_server)
            .map_err(|e| TransportError::Transient(format!("SMTP relay setup failed: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(&message)
            .map(|_| ())
            .map_err(|e| TransportError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounce_type_mapping() {
        assert_eq!(TransportError::Permanent("bad".into()).bounce_type(), "hard");
        assert_eq!(TransportError::Transient("busy".into()).bounce_type(), "soft");
    }

    #[test]
    fn test_invalid_recipient_is_permanent() {
        let mailer = SmtpMailer::new(EmailConfig {
            smtp_server: "localhost".into(),
            smtp_port: 587,
            username: String::new(),
            password: String::new(),
            from_email: "noreply@example.com".into(),
            from_name: "CRM".into(),
        });
        let result = mailer.send(&OutboundEmail {
            to: "not-an-address".into(),
            subject: "s".into(),
            html_body: "<p>b</p>".into(),
            from_email: "noreply@example.com".into(),
            from_name: "CRM".into(),
        });
        assert!(matches!(result, Err(TransportError::Permanent(_))));
    }
}
