// SMTP notifier implementation
// reason: lettre for message building and async STARTTLS delivery
use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use std::fmt;
use tracing::{error, info};

use regwatch_core::application::BatchReport;
use regwatch_core::port::{NotifyError, ReportNotifier};

/// Submission port used when none is configured
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// SMTP connection and addressing
///
/// Loaded from `REGWATCH_SMTP_*` environment variables only, so secrets
/// never live in config files.
#[derive(Clone)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Mailbox,
    pub to: Vec<Mailbox>,
}

impl fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from.to_string())
            .field("to", &self.to.iter().map(ToString::to_string).collect::<Vec<_>>())
            .finish()
    }
}

impl SmtpSettings {
    /// Read settings from the process environment
    ///
    /// # Errors
    /// `NotConfigured` when host, sender or recipients are missing or invalid
    pub fn from_env() -> Result<Self, NotifyError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read settings through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, NotifyError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let require = |key: &str| get(key).ok_or_else(|| NotifyError::NotConfigured(format!("{} is not set", key)));

        let host = require("REGWATCH_SMTP_HOST")?;
        let port = match get("REGWATCH_SMTP_PORT") {
            Some(port) => port
                .parse()
                .map_err(|_| NotifyError::NotConfigured(format!("invalid REGWATCH_SMTP_PORT: {}", port)))?,
            None => DEFAULT_SMTP_PORT,
        };

        let username = get("REGWATCH_SMTP_USERNAME");
        let from_raw = get("REGWATCH_SMTP_FROM")
            .or_else(|| username.clone())
            .ok_or_else(|| NotifyError::NotConfigured("REGWATCH_SMTP_FROM is not set".to_string()))?;
        let from = parse_mailbox(&from_raw)?;

        let to = require("REGWATCH_SMTP_TO")?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_mailbox)
            .collect::<Result<Vec<_>, _>>()?;
        if to.is_empty() {
            return Err(NotifyError::NotConfigured("REGWATCH_SMTP_TO has no recipients".to_string()));
        }

        Ok(Self {
            host,
            port,
            username,
            password: get("REGWATCH_SMTP_PASSWORD"),
            from,
            to,
        })
    }
}

fn parse_mailbox(raw: &str) -> Result<Mailbox, NotifyError> {
    raw.parse()
        .map_err(|e| NotifyError::NotConfigured(format!("invalid address {}: {}", raw, e)))
}

/// Minimal HTML escaping for the `<pre>` body
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// HTML alternative of the plain-text summary
pub fn render_html(summary: &str) -> String {
    format!(
        "<html>\n<body>\n<pre style=\"font-family: monospace; font-size: 12px; \
         background-color: #f5f5f5; padding: 10px; border-radius: 5px;\">\n{}</pre>\n</body>\n</html>\n",
        escape_html(summary)
    )
}

/// Sends the batch report as a multipart/alternative email
pub struct SmtpNotifier {
    settings: SmtpSettings,
}

impl SmtpNotifier {
    pub fn new(settings: SmtpSettings) -> Self {
        Self { settings }
    }

    pub fn build_message(&self, report: &BatchReport) -> Result<Message, NotifyError> {
        let summary = report.summary_text();
        let mut builder = Message::builder()
            .from(self.settings.from.clone())
            .subject(report.subject());
        for recipient in &self.settings.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .multipart(MultiPart::alternative_plain_html(
                summary.clone(),
                render_html(&summary),
            ))
            .map_err(|e| NotifyError::Message(e.to_string()))
    }

    fn transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, NotifyError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.settings.host)
            .map_err(|e| NotifyError::Transport(e.to_string()))?
            .port(self.settings.port);
        if let (Some(user), Some(pass)) = (&self.settings.username, &self.settings.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(builder.build())
    }
}

#[async_trait]
impl ReportNotifier for SmtpNotifier {
    async fn send_report(&self, report: &BatchReport) -> Result<(), NotifyError> {
        let message = self.build_message(report)?;
        let transport = self.transport()?;

        match transport.send(message).await {
            Ok(_) => {
                info!(
                    host = %self.settings.host,
                    recipients = self.settings.to.len(),
                    "Report email sent"
                );
                Ok(())
            }
            Err(e) => {
                error!(host = %self.settings.host, error = %e, "Failed to send report email");
                Err(NotifyError::Transport(e.to_string()))
            }
        }
    }
}
