use crate::report::is_report_file_name;
use std::fs;
use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

const DAY: Duration = Duration::from_secs(86_400);

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}

/// Deletes generated reports in `dir` older than `keep_days`. Other files are
/// never touched. A missing directory is not an error.
pub fn sweep(dir: &Path, keep_days: u64) -> SweepStats {
    sweep_at(dir, keep_days, SystemTime::now())
}

pub fn sweep_at(dir: &Path, keep_days: u64, now: SystemTime) -> SweepStats {
    let mut stats = SweepStats::default();
    let cutoff = now
        .checked_sub(Duration::from_secs(DAY.as_secs().saturating_mul(keep_days)))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(dir = %dir.display(), "report dir missing, nothing to sweep");
            return stats;
        }
        Err(err) => {
            warn!(dir = %dir.display(), error = %err, "report dir unreadable");
            stats.failed += 1;
            return stats;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!(dir = %dir.display(), error = %err, "report dir entry unreadable");
                stats.failed += 1;
                continue;
            }
        };

        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !is_report_file_name(name) {
            continue;
        }

        let path = entry.path();
        let modified = match entry.metadata().and_then(|m| {
            if m.is_file() {
                m.modified().map(Some)
            } else {
                Ok(None)
            }
        }) {
            Ok(Some(modified)) => modified,
            Ok(None) => continue,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "report mtime unavailable");
                stats.failed += 1;
                continue;
            }
        };

        if modified >= cutoff {
            stats.kept += 1;
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                info!(path = %path.display(), "old report removed");
                stats.removed += 1;
            }
            Err(err) => {
                warn!(path = %path.display(), error = %err, "old report removal failed");
                stats.failed += 1;
            }
        }
    }

    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(dir: &Path, name: &str, age: Duration, now: SystemTime) {
        let path = dir.join(name);
        let file = File::create(&path).expect("create file");
        file.set_modified(now - age).expect("set mtime");
    }

    #[test]
    fn removes_only_expired_reports() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = SystemTime::now();

        touch(dir.path(), "system_report_20240101_080000.odt", DAY * 31, now);
        touch(dir.path(), "system_report_20240125_080000.odt", DAY * 5, now);
        touch(dir.path(), "notes.odt", DAY * 90, now);
        touch(dir.path(), "system_report_draft.odt", DAY * 90, now);

        let stats = sweep_at(dir.path(), 30, now);
        assert_eq!(
            stats,
            SweepStats {
                removed: 1,
                kept: 1,
                failed: 0
            }
        );
        assert!(!dir.path().join("system_report_20240101_080000.odt").exists());
        assert!(dir.path().join("system_report_20240125_080000.odt").exists());
        assert!(dir.path().join("notes.odt").exists());
        assert!(dir.path().join("system_report_draft.odt").exists());
    }

    #[test]
    fn report_just_inside_window_is_kept() {
        let dir = tempfile::tempdir().expect("temp dir");
        let now = SystemTime::now();
        let age = DAY * 7 - Duration::from_secs(60);
        touch(dir.path(), "system_report_20240101_080000.odt", age, now);

        let stats = sweep_at(dir.path(), 7, now);
        assert_eq!(stats.removed, 0);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn missing_directory_is_a_no_op() {
        let dir = tempfile::tempdir().expect("temp dir");
        let stats = sweep(&dir.path().join("absent"), 30);
        assert_eq!(stats, SweepStats::default());
    }

    #[test]
    fn report_named_directory_is_skipped() {
        let dir = tempfile::tempdir().expect("temp dir");
        fs::create_dir(dir.path().join("system_report_20200101_000000.odt")).expect("mkdir");
        let stats = sweep_at(dir.path(), 1, SystemTime::now() + DAY * 365);
        assert_eq!(stats, SweepStats::default());
    }
}
