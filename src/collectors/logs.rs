use crate::snapshot::{LogEntry, LogFindings};
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_MAX_LINES: usize = 1000;
pub const MAX_LINE_CHARS: usize = 200;
pub const MAX_ENTRIES: usize = 10;

const TAIL_CHUNK: u64 = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogClass {
    Error,
    Warning,
    AuthFailure,
}

/// First match wins: a line is counted in at most one bucket.
pub fn classify(line: &str) -> Option<LogClass> {
    let lower = line.to_lowercase();
    if lower.contains("error") || lower.contains("failed") {
        Some(LogClass::Error)
    } else if lower.contains("warning") || lower.contains("warn") {
        Some(LogClass::Warning)
    } else if lower.contains("authentication failure") || lower.contains("invalid user") {
        Some(LogClass::AuthFailure)
    } else {
        None
    }
}

pub fn scan_logs(paths: &[PathBuf], max_lines: usize) -> LogFindings {
    let mut findings = LogFindings::default();

    for path in paths {
        if !path.exists() {
            debug!(path = %path.display(), "log file missing, skipped");
            continue;
        }

        let lines = match tail_lines(path, max_lines) {
            Ok(lines) => lines,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "failed to read log file");
                continue;
            }
        };

        let source = path.display().to_string();
        for line in &lines {
            let Some(class) = classify(line) else {
                continue;
            };
            let entry = LogEntry {
                file: source.clone(),
                line: line.trim().chars().take(MAX_LINE_CHARS).collect(),
            };
            match class {
                LogClass::Error => findings.errors.push(entry),
                LogClass::Warning => findings.warnings.push(entry),
                LogClass::AuthFailure => findings.auth_failures.push(entry),
            }
        }
    }

    keep_last(&mut findings.errors, MAX_ENTRIES);
    keep_last(&mut findings.warnings, MAX_ENTRIES);
    keep_last(&mut findings.auth_failures, MAX_ENTRIES);
    findings
}

fn keep_last<T>(items: &mut Vec<T>, n: usize) {
    let excess = items.len().saturating_sub(n);
    items.drain(..excess);
}

/// Reads the last `max_lines` lines by walking backwards from the end of the
/// file, so the cost depends on the window and not on the file size.
pub fn tail_lines(path: &Path, max_lines: usize) -> io::Result<Vec<String>> {
    if max_lines == 0 {
        return Ok(Vec::new());
    }

    let mut file = File::open(path)?;
    let meta = file.metadata()?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a regular file",
        ));
    }
    let mut pos = meta.len();
    let mut buf: Vec<u8> = Vec::new();
    let mut newlines = 0_usize;

    // One extra newline guarantees the first kept line is complete.
    while pos > 0 && newlines <= max_lines {
        let step = TAIL_CHUNK.min(pos);
        pos -= step;
        file.seek(SeekFrom::Start(pos))?;
        let mut chunk = vec![0_u8; step as usize];
        file.read_exact(&mut chunk)?;
        newlines += chunk.iter().filter(|b| **b == b'\n').count();
        chunk.extend_from_slice(&buf);
        buf = chunk;
    }

    let text = String::from_utf8_lossy(&buf);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(max_lines);
    Ok(lines[start..].iter().map(|l| l.to_string()).collect())
}
