use async_trait::async_trait;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("mail delivery failed: {0}")]
pub struct MailerError(pub String);

/// The messages the service sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Sent on registration, carries the first activation token.
    Welcome { user_id: i64, activation_token: String },
    /// Sent when a user asks for a fresh activation token.
    Activation { activation_token: String },
}

impl Message {
    pub fn subject(&self) -> &'static str {
        match self {
            Message::Welcome { .. } => "Welcome to the movie database!",
            Message::Activation { .. } => "Activate your movie database account",
        }
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, recipient: &str, message: &Message) -> Result<(), MailerError>;
}

/// Writes outgoing mail to the log instead of delivering it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, recipient: &str, message: &Message) -> Result<(), MailerError> {
        info!(recipient, subject = message.subject(), "Sending mail.");
        debug!(?message, "Mail body.");
        Ok(())
    }
}
