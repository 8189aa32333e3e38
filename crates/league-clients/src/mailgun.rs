use async_trait::async_trait;
use league_core::config::MailgunConfig;
use tracing::{debug, warn};

use crate::email::{Email, EmailSink};
use crate::error::SinkError;

/// Mailgun HTTP API sender.
pub struct MailgunClient {
    client: reqwest::Client,
    base_url: String,
    domain: String,
    api_key: String,
}

impl MailgunClient {
    pub fn new(config: &MailgunConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            domain: config.domain.clone(),
            api_key: config.api_key.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/v3/{}/messages", self.base_url, self.domain)
    }
}

/// Form body for the messages endpoint.
fn form_fields(email: &Email) -> Vec<(&'static str, String)> {
    vec![
        ("from", email.from.mailbox()),
        ("to", email.to.mailbox()),
        ("h:Reply-To", email.reply_to.mailbox()),
        ("subject", email.subject.clone()),
        ("text", email.plain_text.clone()),
        ("html", email.html.clone()),
    ]
}

#[async_trait]
impl EmailSink for MailgunClient {
    fn name(&self) -> &str {
        "mailgun"
    }

    async fn send(&self, email: &Email) -> Result<(), SinkError> {
        debug!(to = %email.to.address, subject = %email.subject, "sending via mailgun");

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(&self.api_key))
            .form(&form_fields(email))
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "mailgun rejected message");
            return Err(SinkError::Rejected { status, body });
        }
        Ok(())
    }
}
