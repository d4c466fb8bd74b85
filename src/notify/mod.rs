pub mod compose;
pub mod message;
pub mod smtp;
pub mod tls;

use crate::alerts::Alert;
use crate::config::EmailConfig;
use chrono::{DateTime, Local};
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("smtp connect to {addr} failed: {source}")]
    Connect { addr: String, source: io::Error },
    #[error("smtp {step} timed out")]
    Timeout { step: &'static str },
    #[error("smtp i/o failed: {0}")]
    Io(#[from] io::Error),
    #[error("smtp server closed the connection during {step}")]
    Closed { step: &'static str },
    #[error("smtp server rejected {step}: {code} {text}")]
    Rejected {
        step: &'static str,
        code: u16,
        text: String,
    },
    #[error("malformed smtp reply: {0:?}")]
    Malformed(String),
    #[error("refusing to send smtp credentials over an unencrypted connection")]
    InsecureAuth,
    #[error("STARTTLS trust roots unavailable: {0}")]
    TrustRoots(String),
    #[error("invalid TLS server name {0:?}")]
    ServerName(String),
    #[error("TLS handshake failed: {0}")]
    Handshake(io::Error),
    #[error("failed to read attachment {path}: {source}")]
    Attachment { path: String, source: io::Error },
    #[error("failed to launch {program}: {source}")]
    Compose { program: String, source: io::Error },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub body: String,
    pub attachment: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    ComposeOpened,
    Failed,
}

pub trait Notifier {
    fn deliver(&self, notification: &Notification) -> impl Future<Output = Delivery>;
}

pub fn compose_notification(
    hostname: &str,
    alerts: &[Alert],
    report_path: Option<&Path>,
    generated_at: DateTime<Local>,
) -> Notification {
    let (subject, mut body) = if alerts.is_empty() {
        (
            format!("✓ System Report: {hostname} - All systems normal"),
            format!("Daily system report for {hostname}.\n\nAll systems are operating normally.\n"),
        )
    } else {
        let lines: Vec<&str> = alerts.iter().map(|a| a.message.as_str()).collect();
        (
            format!(
                "⚠️ System Alert: {hostname} - {} issues detected",
                alerts.len()
            ),
            format!("System Health Alert!\n\n{}", lines.join("\n")),
        )
    };
    body.push_str(&format!(
        "\n\nDetailed report attached.\n\nGenerated: {}",
        generated_at.format("%Y-%m-%d %H:%M:%S")
    ));

    Notification {
        subject,
        body,
        attachment: report_path.map(Path::to_path_buf),
    }
}

pub struct MailNotifier {
    cfg: EmailConfig,
}

impl MailNotifier {
    pub fn new(cfg: EmailConfig) -> Self {
        Self { cfg }
    }

    fn credentials(&self) -> Option<smtp::Credentials> {
        if !self.cfg.use_authentication {
            return None;
        }
        match std::env::var(&self.cfg.password_env) {
            Ok(password) => Some(smtp::Credentials {
                username: self
                    .cfg
                    .username
                    .clone()
                    .unwrap_or_else(|| self.cfg.from_email.clone()),
                password,
            }),
            Err(_) => {
                warn!(
                    var = %self.cfg.password_env,
                    "smtp password variable not set, sending without auth"
                );
                None
            }
        }
    }

    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let attachment = notification
            .attachment
            .as_deref()
            .and_then(|path| match message::Attachment::read(path) {
                Ok(attachment) => Some(attachment),
                Err(err) => {
                    warn!(error = %err, "sending notification without attachment");
                    None
                }
            });
        let mail = message::build(
            &self.cfg.from_email,
            &self.cfg.to_emails,
            notification,
            attachment.as_ref(),
            Local::now(),
        );

        let client = smtp::SmtpClient::connect(
            &self.cfg.smtp_server,
            self.cfg.smtp_port,
            self.cfg.timeout(),
        )
        .await?
        .with_ca_file(self.cfg.ca_file.clone());
        client
            .send_mail(
                self.credentials().as_ref(),
                &self.cfg.from_email,
                &self.cfg.to_emails,
                &mail,
            )
            .await
    }
}

impl Notifier for MailNotifier {
    async fn deliver(&self, notification: &Notification) -> Delivery {
        match self.send(notification).await {
            Ok(()) => {
                info!(to = ?self.cfg.to_emails, "notification email sent");
                Delivery::Sent
            }
            Err(err) => {
                error!(error = %err, "failed to send notification email");
                match compose::open(&self.cfg.compose_program, &self.cfg.to_emails, notification) {
                    Ok(()) => {
                        info!(
                            program = %self.cfg.compose_program,
                            "notification opened for manual sending"
                        );
                        Delivery::ComposeOpened
                    }
                    Err(err) => {
                        error!(error = %err, "mail client unavailable, notification not delivered");
                        Delivery::Failed
                    }
                }
            }
        }
    }
}
