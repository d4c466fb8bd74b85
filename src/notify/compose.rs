use super::{Notification, NotifyError};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use url::form_urlencoded::byte_serialize;

/// Opens a compose window in the local mail client. The child is not awaited;
/// the user sends the message by hand.
pub fn open(program: &str, to: &[String], notification: &Notification) -> Result<(), NotifyError> {
    let body = match &notification.attachment {
        Some(path) => with_attachment_note(&notification.body, path),
        None => notification.body.clone(),
    };
    let url = mailto_url(to, &notification.subject, &body);

    Command::new(program)
        .arg("-compose")
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(drop)
        .map_err(|source| NotifyError::Compose {
            program: program.to_string(),
            source,
        })
}

/// mailto links cannot carry attachments, so the body names the file instead.
pub fn with_attachment_note(body: &str, attachment: &Path) -> String {
    format!(
        "{body}\n\nNote: Please attach the report file:\n{}",
        attachment.display()
    )
}

pub fn mailto_url(to: &[String], subject: &str, body: &str) -> String {
    format!(
        "mailto:{}?subject={}&body={}",
        to.join(","),
        percent_encode(subject),
        percent_encode(body)
    )
}

fn percent_encode(text: &str) -> String {
    // form encoding turns spaces into '+', which mail clients show literally
    byte_serialize(text.as_bytes())
        .collect::<String>()
        .replace('+', "%20")
}
