use crate::alerts::Alert;
use crate::snapshot::HealthSnapshot;
use chrono::{DateTime, Local, NaiveDateTime};
use std::fmt::Write as _;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const REPORT_PREFIX: &str = "system_report_";
pub const REPORT_EXTENSION: &str = "odt";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const ODT_MIMETYPE: &str = "application/vnd.oasis.opendocument.text";
const MAX_REPORTS_PER_SECOND: u32 = 100;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to create report directory {path}: {source}")]
    CreateDir { path: String, source: io::Error },
    #[error("failed to write report {path}: {source}")]
    Write { path: String, source: io::Error },
    #[error("failed to package report {path}: {source}")]
    Package {
        path: String,
        source: zip::result::ZipError,
    },
}

pub trait ReportRenderer {
    fn render(&self, snapshot: &HealthSnapshot, alerts: &[Alert]) -> Result<PathBuf, ReportError>;
}

pub fn report_file_name(at: &DateTime<Local>) -> String {
    format!(
        "{REPORT_PREFIX}{}.{REPORT_EXTENSION}",
        at.format(TIMESTAMP_FORMAT)
    )
}

fn numbered_report_file_name(at: &DateTime<Local>, n: u32) -> String {
    format!(
        "{REPORT_PREFIX}{}_{n}.{REPORT_EXTENSION}",
        at.format(TIMESTAMP_FORMAT)
    )
}

/// True only for names produced by [`report_file_name`], including the
/// `_N` variants used when a second already has a report.
pub fn is_report_file_name(name: &str) -> bool {
    let Some(rest) = name
        .strip_prefix(REPORT_PREFIX)
        .and_then(|rest| rest.strip_suffix(REPORT_EXTENSION))
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return false;
    };
    let Some(stamp) = rest.get(..15) else {
        return false;
    };
    let counter_ok = match &rest[15..] {
        "" => true,
        tail => tail
            .strip_prefix('_')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
    };
    counter_ok && NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).is_ok()
}

/// Creates the report file without ever replacing an existing one.
fn create_report_file(dir: &Path, at: &DateTime<Local>) -> Result<(PathBuf, File), ReportError> {
    for n in 0..MAX_REPORTS_PER_SECOND {
        let name = match n {
            0 => report_file_name(at),
            n => numbered_report_file_name(at, n),
        };
        let path = dir.join(name);
        match File::options().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(source) => {
                return Err(ReportError::Write {
                    path: path.display().to_string(),
                    source,
                })
            }
        }
    }
    Err(ReportError::Write {
        path: dir.join(report_file_name(at)).display().to_string(),
        source: io::Error::new(
            io::ErrorKind::AlreadyExists,
            "too many reports within one second",
        ),
    })
}

pub struct OdtReportRenderer {
    output_dir: PathBuf,
}

impl OdtReportRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }
}

impl ReportRenderer for OdtReportRenderer {
    fn render(&self, snapshot: &HealthSnapshot, alerts: &[Alert]) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.output_dir).map_err(|source| ReportError::CreateDir {
            path: self.output_dir.display().to_string(),
            source,
        })?;

        let (path, file) = create_report_file(&self.output_dir, &Local::now())?;
        write_package(&path, file, &content_xml(snapshot, alerts))?;
        info!(path = %path.display(), "report saved");
        Ok(path)
    }
}

fn write_package(path: &Path, file: File, content: &str) -> Result<(), ReportError> {
    let path_display = path.display().to_string();

    let package_err = |source| ReportError::Package {
        path: path_display.clone(),
        source,
    };
    let write_err = |source| ReportError::Write {
        path: path_display.clone(),
        source,
    };

    let mut zip = ZipWriter::new(file);
    for (name, body) in [
        ("mimetype", ODT_MIMETYPE),
        ("META-INF/manifest.xml", MANIFEST_XML),
        ("styles.xml", STYLES_XML),
        ("content.xml", content),
    ] {
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        zip.start_file(name, options).map_err(package_err)?;
        zip.write_all(body.as_bytes()).map_err(write_err)?;
    }
    let file = zip.finish().map_err(package_err)?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

/// Builds `content.xml`. Text is escaped; sections follow the snapshot layout.
pub fn content_xml(s: &HealthSnapshot, alerts: &[Alert]) -> String {
    let mut doc = Document::default();

    doc.heading(1, &format!("System Health Report - {}", s.hostname));
    doc.para(&format!(
        "Generated: {}",
        s.timestamp.format("%Y-%m-%d %H:%M:%S")
    ));
    doc.para(&format!("System: {}", s.platform));
    doc.para(&format!("Uptime: {}", s.uptime));
    doc.blank();

    if !alerts.is_empty() {
        doc.heading(2, "⚠️ Alerts");
        doc.list(alerts.iter().map(|a| a.message.as_str()));
        doc.blank();
    }

    doc.heading(2, "CPU Information");
    doc.para(&format!("CPU Cores: {}", s.cpu.count));
    doc.para(&format!("Average Usage: {:.1}%", s.cpu.percent_avg));
    if s.cpu.frequency_mhz > 0.0 {
        doc.para(&format!("Frequency: {:.0} MHz", s.cpu.frequency_mhz));
    }
    let [one, five, fifteen] = s.cpu.load_average;
    doc.para(&format!("Load Average: {one:.2}, {five:.2}, {fifteen:.2}"));
    doc.blank();

    doc.heading(2, "Memory Information");
    doc.para(&format!("Total: {} GB", s.memory.total_gb));
    doc.para(&format!(
        "Used: {} GB ({:.1}%)",
        s.memory.used_gb, s.memory.percent
    ));
    doc.para(&format!("Available: {} GB", s.memory.available_gb));
    doc.para(&format!(
        "Swap Used: {} GB ({:.1}%)",
        s.memory.swap_used_gb, s.memory.swap_percent
    ));
    doc.blank();

    doc.heading(2, "Disk Usage");
    for d in &s.disks {
        doc.para(&format!("{} ({}, {}):", d.mountpoint, d.device, d.fstype));
        doc.para(&format!(
            "  Used: {} GB / {} GB ({:.1}%)",
            d.used_gb, d.total_gb, d.percent
        ));
    }
    doc.blank();

    doc.heading(2, "Network Statistics");
    doc.para(&format!("Data Sent: {} GB", s.network.bytes_sent_gb));
    doc.para(&format!("Data Received: {} GB", s.network.bytes_recv_gb));
    doc.para(&format!(
        "Packets Sent/Received: {} / {}",
        s.network.packets_sent, s.network.packets_recv
    ));
    doc.para(&format!(
        "Active Connections: {}",
        s.network.established_connections
    ));
    doc.para(&format!("Listening Ports: {}", s.network.listening_sockets));
    doc.blank();

    doc.heading(2, "Top Processes");
    doc.para(&format!("Total Processes: {}", s.processes.total));
    doc.para("By CPU Usage:");
    for p in &s.processes.top_cpu {
        doc.para(&format!("  {} ({}): {:.1}%", p.name, p.pid, p.percent));
    }
    doc.blank();
    doc.para("By Memory Usage:");
    for p in &s.processes.top_memory {
        doc.para(&format!("  {} ({}): {:.1}%", p.name, p.pid, p.percent));
    }
    doc.blank();

    doc.heading(2, "Service Status");
    for svc in &s.services {
        doc.para(&format!("{}: {}", svc.name, svc.status.label()));
    }
    doc.blank();

    if let Some(sensors) = &s.temperature {
        doc.heading(2, "Temperatures");
        for (sensor, reading) in sensors {
            let mut line = format!("{sensor}: {:.1}°C", reading.current);
            if let Some(high) = reading.high {
                let _ = write!(line, " (high {high:.1}°C)");
            }
            if let Some(critical) = reading.critical {
                let _ = write!(line, " (critical {critical:.1}°C)");
            }
            doc.para(&line);
        }
        doc.blank();
    }

    if !s.logs.is_empty() {
        doc.heading(2, "Recent Log Events");
        if !s.logs.errors.is_empty() {
            doc.para(&format!("Recent Errors ({}):", s.logs.errors.len()));
            for entry in last_n(&s.logs.errors, 3) {
                doc.para(&format!("  {}...", clip(&entry.line, 100)));
            }
        }
        if !s.logs.warnings.is_empty() {
            doc.para(&format!("Warnings: {}", s.logs.warnings.len()));
        }
        if !s.logs.auth_failures.is_empty() {
            doc.para(&format!(
                "Authentication Failures ({}):",
                s.logs.auth_failures.len()
            ));
            for entry in last_n(&s.logs.auth_failures, 3) {
                doc.para(&format!("  {}...", clip(&entry.line, 100)));
            }
        }
    }

    doc.finish()
}

fn last_n<T>(items: &[T], n: usize) -> &[T] {
    &items[items.len().saturating_sub(n)..]
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

#[derive(Default)]
struct Document {
    body: String,
}

impl Document {
    fn heading(&mut self, level: u8, text: &str) {
        let _ = write!(
            self.body,
            r#"<text:h text:style-name="Heading_20_{level}" text:outline-level="{level}">{}</text:h>"#,
            escape_xml(text)
        );
    }

    fn para(&mut self, text: &str) {
        let _ = write!(self.body, "<text:p>{}</text:p>", escape_xml(text));
    }

    fn blank(&mut self) {
        self.body.push_str("<text:p/>");
    }

    fn list<'a>(&mut self, items: impl Iterator<Item = &'a str>) {
        self.body.push_str("<text:list>");
        for item in items {
            let _ = write!(
                self.body,
                "<text:list-item><text:p>{}</text:p></text:list-item>",
                escape_xml(item)
            );
        }
        self.body.push_str("</text:list>");
    }

    fn finish(self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-content xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:text="urn:oasis:names:tc:opendocument:xmlns:text:1.0" xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" xmlns:fo="urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0" office:version="1.2"><office:body><office:text>{}</office:text></office:body></office:document-content>"#,
            self.body
        )
    }
}

pub fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            // XML 1.0 forbids most control characters; log lines can carry them.
            c if (c as u32) < 0x20 && !matches!(c, '\t' | '\n' | '\r') => {}
            c => out.push(c),
        }
    }
    out
}

const MANIFEST_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<manifest:manifest xmlns:manifest="urn:oasis:names:tc:opendocument:xmlns:manifest:1.0" manifest:version="1.2">
 <manifest:file-entry manifest:full-path="/" manifest:version="1.2" manifest:media-type="application/vnd.oasis.opendocument.text"/>
 <manifest:file-entry manifest:full-path="content.xml" manifest:media-type="text/xml"/>
 <manifest:file-entry manifest:full-path="styles.xml" manifest:media-type="text/xml"/>
</manifest:manifest>
"#;

const STYLES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<office:document-styles xmlns:office="urn:oasis:names:tc:opendocument:xmlns:office:1.0" xmlns:style="urn:oasis:names:tc:opendocument:xmlns:style:1.0" xmlns:fo="urn:oasis:names:tc:opendocument:xmlns:xsl-fo-compatible:1.0" office:version="1.2">
 <office:styles>
  <style:style style:name="Heading_20_1" style:display-name="Heading 1" style:family="paragraph">
   <style:text-properties fo:font-size="24pt" fo:font-weight="bold"/>
  </style:style>
  <style:style style:name="Heading_20_2" style:display-name="Heading 2" style:family="paragraph">
   <style:text-properties fo:font-size="18pt" fo:font-weight="bold"/>
  </style:style>
 </office:styles>
</office:document-styles>
"#;
