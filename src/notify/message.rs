use super::{Notification, NotifyError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Local};
use std::fs;
use std::path::Path;

const LINE_WIDTH: usize = 76;
const ATTACHMENT_TYPE: &str = "application/vnd.oasis.opendocument.text";

pub struct Attachment {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl Attachment {
    pub fn read(path: &Path) -> Result<Self, NotifyError> {
        let bytes = fs::read(path).map_err(|source| NotifyError::Attachment {
            path: path.display().to_string(),
            source,
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "report.odt".to_string());
        Ok(Self { file_name, bytes })
    }
}

/// Renders a `multipart/mixed` message with CRLF line endings. The text part
/// and the attachment are base64 so the payload is 7-bit clean.
pub fn build(
    from: &str,
    to: &[String],
    notification: &Notification,
    attachment: Option<&Attachment>,
    date: DateTime<Local>,
) -> String {
    let boundary = format!(
        "hostwatch-{}",
        date.timestamp_nanos_opt().unwrap_or_else(|| date.timestamp())
    );
    let mut out = String::new();

    header(&mut out, "From", from);
    header(&mut out, "To", &to.join(", "));
    header(&mut out, "Subject", &encode_header(&notification.subject));
    header(&mut out, "Date", &date.to_rfc2822());
    header(&mut out, "MIME-Version", "1.0");
    header(
        &mut out,
        "Content-Type",
        &format!("multipart/mixed; boundary=\"{boundary}\""),
    );
    out.push_str("\r\n");

    out.push_str(&format!("--{boundary}\r\n"));
    header(&mut out, "Content-Type", "text/plain; charset=UTF-8");
    header(&mut out, "Content-Transfer-Encoding", "base64");
    out.push_str("\r\n");
    push_base64(&mut out, notification.body.as_bytes());

    if let Some(att) = attachment {
        let name = att.file_name.replace(['"', '\\', '\r', '\n'], "_");
        out.push_str(&format!("--{boundary}\r\n"));
        header(
            &mut out,
            "Content-Type",
            &format!("{ATTACHMENT_TYPE}; name=\"{name}\""),
        );
        header(&mut out, "Content-Transfer-Encoding", "base64");
        header(
            &mut out,
            "Content-Disposition",
            &format!("attachment; filename=\"{name}\""),
        );
        out.push_str("\r\n");
        push_base64(&mut out, &att.bytes);
    }

    out.push_str(&format!("--{boundary}--\r\n"));
    out
}

fn header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}

/// RFC 2047 `B` encoding for non-ASCII header values.
pub fn encode_header(value: &str) -> String {
    if value.is_ascii() {
        value.to_string()
    } else {
        format!("=?UTF-8?B?{}?=", STANDARD.encode(value.as_bytes()))
    }
}

fn push_base64(out: &mut String, bytes: &[u8]) {
    let encoded = STANDARD.encode(bytes);
    // base64 output is ASCII, so byte chunks are valid str boundaries.
    for chunk in encoded.as_bytes().chunks(LINE_WIDTH) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push_str("\r\n");
    }
}

/// Escapes lines starting with `.` and normalises bare LF to CRLF, ready for
/// the DATA phase.
pub fn dot_stuff(message: &str) -> String {
    let mut out = String::with_capacity(message.len() + 16);
    for line in message.split_inclusive('\n') {
        let text = line.trim_end_matches('\n').trim_end_matches('\r');
        if text.starts_with('.') {
            out.push('.');
        }
        out.push_str(text);
        out.push_str("\r\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn notification(subject: &str, body: &str) -> Notification {
        Notification {
            subject: subject.to_string(),
            body: body.to_string(),
            attachment: None,
        }
    }

    fn date() -> DateTime<Local> {
        Local
            .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
            .single()
            .expect("valid time")
    }

    #[test]
    fn ascii_subject_is_left_alone() {
        assert_eq!(encode_header("Daily report"), "Daily report");
    }

    #[test]
    fn unicode_subject_is_encoded_word() {
        let encoded = encode_header("✓ ok");
        assert_eq!(encoded, format!("=?UTF-8?B?{}?=", STANDARD.encode("✓ ok")));
    }

    #[test]
    fn message_has_text_and_attachment_parts() {
        let att = Attachment {
            file_name: "system_report_20240301_080000.odt".to_string(),
            bytes: vec![0u8; 200],
        };
        let msg = build(
            "monitor@localhost",
            &["a@example.com".to_string(), "b@example.com".to_string()],
            &notification("✓ System Report", "hello"),
            Some(&att),
            date(),
        );

        assert!(msg.contains("To: a@example.com, b@example.com\r\n"));
        assert!(msg.contains("MIME-Version: 1.0\r\n"));
        assert!(msg.contains(&STANDARD.encode("hello")));
        assert!(msg.contains("filename=\"system_report_20240301_080000.odt\""));
        assert!(msg.lines().all(|l| l.len() <= 998));
        assert!(msg
            .lines()
            .filter(|l| l.starts_with("AAAA"))
            .all(|l| l.len() <= LINE_WIDTH));

        let boundary_count = msg.matches("--hostwatch-").count();
        assert_eq!(boundary_count, 3);
        assert!(msg.ends_with("--\r\n"));
    }

    #[test]
    fn dot_stuffing_escapes_leading_dots() {
        assert_eq!(dot_stuff("a\n.b\r\n..c"), "a\r\n..b\r\n...c\r\n");
        assert_eq!(dot_stuff(""), "");
    }
}
