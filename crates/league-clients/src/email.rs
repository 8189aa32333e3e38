use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use crate::error::SinkError;

/// A named mailbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub name: String,
    pub address: String,
}

impl Identity {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// RFC 5322 mailbox form: `Name <address>`, or the bare address when
    /// there is no name.
    pub fn mailbox(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            return self.address.clone();
        }
        if name.contains(|c: char| matches!(c, ',' | ';' | '<' | '>' | '"' | '@' | '\\')) {
            let quoted = name.replace('\\', "\\\\").replace('"', "\\\"");
            format!("\"{}\" <{}>", quoted, self.address)
        } else {
            format!("{} <{}>", name, self.address)
        }
    }
}

/// A fully rendered message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Email {
    pub from: Identity,
    pub to: Identity,
    pub reply_to: Identity,
    pub subject: String,
    pub plain_text: String,
    pub html: String,
}

/// Outbound mail transport. Returns an error on anything other than an
/// accepted message.
#[async_trait]
pub trait EmailSink: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, email: &Email) -> Result<(), SinkError>;
}

/// Writes messages to the log instead of sending them. Used when no mail
/// provider is configured.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl EmailSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, email: &Email) -> Result<(), SinkError> {
        info!(
            to = %email.to.mailbox(),
            from = %email.from.mailbox(),
            subject = %email.subject,
            "email (not sent, no mail provider configured)"
        );
        Ok(())
    }
}
