use crate::traits::Notifier;
use crate::types::{ChangeEvent, MailSettings, MailgunConfig, MonitorConfig, OutboundMessage, Result, WatchError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const HEARTBEAT_TEXT: &str = "I am alive!";

/// HTTP-date style, e.g. `Tue, 05 Mar 2024 09:07:01 GMT`.
pub fn mail_timestamp(at: &DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Subject line for a change notification.
pub fn change_subject(event: &ChangeEvent) -> String {
    if event.header.is_empty() || event.header == event.id.as_str() {
        format!("Forandring i møteplanen: ({})", event.id)
    } else {
        format!("Forandring i møteplanen: ({} {})", event.header, event.id)
    }
}

pub fn change_html(event: &ChangeEvent, detail_url: &str) -> String {
    let previous = event.previous.as_ref().map(|s| s.as_str()).unwrap_or("");
    format!(
        r#"
            Ny oppdatering {timestamp}
            <br>
            <a href="{url}">{url}</a>
            <br>
            <h1>Ny data:</h1>
            <div style="padding: 15px; background: #f4f4f4;">
                {new}
            </div>
            <br>
            <br>
            <h1>Gammel data:</h1>
            <div style="padding: 15px; background: #f4f4f4;">
                {previous}
            </div>
        "#,
        timestamp = mail_timestamp(&event.detected_at),
        url = detail_url,
        new = event.new,
        previous = previous,
    )
}

pub fn change_text(event: &ChangeEvent, detail_url: &str) -> String {
    let previous = event.previous.as_ref().map(|s| s.as_str()).unwrap_or("");
    format!(
        "Ny oppdatering {}\n{}\n\nNy data:\n{}\n\nGammel data:\n{}\n",
        mail_timestamp(&event.detected_at),
        detail_url,
        event.new,
        previous
    )
}

/// Composes messages and hands them to a notifier. Sending never fails from the
/// caller's point of view; errors only reach the log.
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    mail: MailSettings,
    monitor: MonitorConfig,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, mail: MailSettings, monitor: MonitorConfig) -> Self {
        Self { notifier, mail, monitor }
    }

    pub fn change_message(&self, event: &ChangeEvent) -> OutboundMessage {
        let detail_url = self.monitor.detail_url(&event.id);
        OutboundMessage {
            from: self.mail.from.clone(),
            to: self.mail.change_recipients.clone(),
            subject: change_subject(event),
            text: change_text(event, &detail_url),
            html: change_html(event, &detail_url),
        }
    }

    pub fn heartbeat_message(&self) -> OutboundMessage {
        OutboundMessage {
            from: self.mail.from.clone(),
            to: vec![self.mail.heartbeat_recipient.clone()],
            subject: HEARTBEAT_TEXT.to_string(),
            text: HEARTBEAT_TEXT.to_string(),
            html: HEARTBEAT_TEXT.to_string(),
        }
    }

    pub async fn notify_change(&self, event: &ChangeEvent) {
        let message = self.change_message(event);
        self.deliver(&message).await;
    }

    pub async fn notify_heartbeat(&self) {
        let message = self.heartbeat_message();
        self.deliver(&message).await;
    }

    async fn deliver(&self, message: &OutboundMessage) {
        match self.notifier.send(message).await {
            Ok(()) => info!(
                "Sent '{}' to {} via {}",
                message.subject,
                message.to.join(", "),
                self.notifier.name()
            ),
            Err(e) => error!("Failed to send '{}': {}", message.subject, e),
        }
    }
}

/// Sends through the Mailgun messages API.
pub struct MailgunNotifier {
    client: Client,
    config: MailgunConfig,
}

impl MailgunNotifier {
    pub fn new(config: MailgunConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn messages_url(&self) -> String {
        format!(
            "{}/{}/messages",
            self.config.api_base.trim_end_matches('/'),
            self.config.domain
        )
    }
}

#[async_trait]
impl Notifier for MailgunNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        let mut form: Vec<(&str, &str)> = vec![("from", message.from.as_str())];
        for recipient in &message.to {
            form.push(("to", recipient.as_str()));
        }
        form.push(("subject", message.subject.as_str()));
        form.push(("text", message.text.as_str()));
        form.push(("html", message.html.as_str()));

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth("api", Some(&self.config.api_key))
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WatchError::Notification(format!(
                "HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "mailgun"
    }
}

/// Writes messages to the log instead of sending them.
#[derive(Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &OutboundMessage) -> Result<()> {
        info!(
            "[dry run] from={} to={} subject={}\n{}",
            message.from,
            message.to.join(", "),
            message.subject,
            message.text
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
