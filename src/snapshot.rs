use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// One point-in-time capture of every measured host metric. Built once per run.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub timestamp: DateTime<Local>,
    pub hostname: String,
    pub platform: String,
    pub uptime: Uptime,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    pub network: NetworkInfo,
    pub processes: ProcessInfo,
    pub services: Vec<ServiceState>,
    pub logs: LogFindings,
    pub temperature: Option<BTreeMap<String, TemperatureReading>>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Uptime {
    pub days: u64,
    pub hours: u64,
    pub minutes: u64,
}

impl Uptime {
    pub fn from_secs(secs: u64) -> Self {
        Self {
            days: secs / 86_400,
            hours: (secs % 86_400) / 3600,
            minutes: (secs % 3600) / 60,
        }
    }
}

impl fmt::Display for Uptime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}d {}h {}m", self.days, self.hours, self.minutes)
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CpuInfo {
    pub count: usize,
    pub percent_per_core: Vec<f64>,
    pub percent_avg: f64,
    pub frequency_mhz: f64,
    pub load_average: [f64; 3],
}

impl CpuInfo {
    pub fn new(percent_per_core: Vec<f64>, frequency_mhz: f64, load_average: [f64; 3]) -> Self {
        let percent_avg = mean(&percent_per_core);
        Self {
            count: percent_per_core.len(),
            percent_per_core,
            percent_avg,
            frequency_mhz,
            load_average,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub used_gb: f64,
    pub available_gb: f64,
    pub percent: f64,
    pub swap_total_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct NetworkInfo {
    pub bytes_sent_gb: f64,
    pub bytes_recv_gb: f64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub established_connections: usize,
    pub listening_sockets: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessInfo {
    pub total: usize,
    pub top_cpu: Vec<ProcessUsage>,
    pub top_memory: Vec<ProcessUsage>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessUsage {
    pub pid: u32,
    pub name: String,
    pub percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    Running,
    Stopped,
    /// The init system could not be asked. Never treated as stopped.
    Unknown,
}

impl ServiceStatus {
    pub fn label(self) -> &'static str {
        match self {
            ServiceStatus::Running => "✓ Running",
            ServiceStatus::Stopped => "✗ Stopped",
            ServiceStatus::Unknown => "? Unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceState {
    pub name: String,
    pub status: ServiceStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LogFindings {
    pub errors: Vec<LogEntry>,
    pub warnings: Vec<LogEntry>,
    pub auth_failures: Vec<LogEntry>,
}

impl LogFindings {
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty() && self.auth_failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub file: String,
    pub line: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TemperatureReading {
    pub current: f64,
    pub high: Option<f64>,
    pub critical: Option<f64>,
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Bytes to GiB rounded to two decimals.
pub fn gib(bytes: u64) -> f64 {
    round2(bytes as f64 / GIB)
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Share of `used` in `total` as a percentage clamped to 0..=100.
pub fn percent(used: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((used as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    /// A quiet host: nothing above default thresholds.
    pub fn quiet_snapshot() -> HealthSnapshot {
        HealthSnapshot {
            timestamp: Local
                .with_ymd_and_hms(2024, 3, 1, 8, 0, 0)
                .single()
                .expect("valid timestamp"),
            hostname: "web-01".to_string(),
            platform: "Ubuntu 22.04 (kernel 5.15.0, x86_64)".to_string(),
            uptime: Uptime::from_secs(3 * 86_400 + 2 * 3600 + 5 * 60),
            cpu: CpuInfo::new(vec![10.0, 20.0], 2400.0, [0.25, 0.5, 0.75]),
            memory: MemoryInfo {
                total_gb: 16.0,
                used_gb: 4.0,
                available_gb: 12.0,
                percent: 25.0,
                swap_total_gb: 2.0,
                swap_used_gb: 0.0,
                swap_percent: 0.0,
            },
            disks: vec![DiskInfo {
                device: "/dev/sda1".to_string(),
                mountpoint: "/".to_string(),
                fstype: "ext4".to_string(),
                total_gb: 100.0,
                used_gb: 40.0,
                free_gb: 60.0,
                percent: 40.0,
            }],
            network: NetworkInfo {
                bytes_sent_gb: 1.5,
                bytes_recv_gb: 3.25,
                packets_sent: 1000,
                packets_recv: 2000,
                established_connections: 4,
                listening_sockets: 3,
            },
            processes: ProcessInfo {
                total: 120,
                top_cpu: vec![ProcessUsage {
                    pid: 42,
                    name: "postgres".to_string(),
                    percent: 12.5,
                }],
                top_memory: vec![ProcessUsage {
                    pid: 42,
                    name: "postgres".to_string(),
                    percent: 8.0,
                }],
            },
            services: vec![ServiceState {
                name: "ssh".to_string(),
                status: ServiceStatus::Running,
            }],
            logs: LogFindings::default(),
            temperature: None,
        }
    }

    pub fn log_entries(n: usize, text: &str) -> Vec<LogEntry> {
        (0..n)
            .map(|i| LogEntry {
                file: "/var/log/syslog".to_string(),
                line: format!("{text} #{i}"),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uptime_formats_days_hours_minutes() {
        assert_eq!(Uptime::from_secs(0).to_string(), "0d 0h 0m");
        assert_eq!(Uptime::from_secs(59).to_string(), "0d 0h 0m");
        assert_eq!(Uptime::from_secs(3 * 86_400 + 4 * 3600 + 5 * 60 + 7).to_string(), "3d 4h 5m");
        assert_eq!(Uptime::from_secs(86_399).to_string(), "0d 23h 59m");
    }

    #[test]
    fn cpu_average_is_mean_of_cores() {
        let cpu = CpuInfo::new(vec![10.0, 20.0, 30.0, 40.5], 2400.0, [0.5, 0.4, 0.3]);
        assert_eq!(cpu.count, 4);
        let expected = (10.0 + 20.0 + 30.0 + 40.5) / 4.0;
        assert!((cpu.percent_avg - expected).abs() < 1e-9);

        let empty = CpuInfo::new(Vec::new(), 0.0, [0.0; 3]);
        assert_eq!(empty.percent_avg, 0.0);
    }

    #[test]
    fn percent_is_clamped_and_safe_on_zero_total() {
        assert_eq!(percent(0, 0), 0.0);
        assert_eq!(percent(50, 100), 50.0);
        assert_eq!(percent(150, 100), 100.0);
    }

    #[test]
    fn gib_rounds_to_two_decimals() {
        assert_eq!(gib(0), 0.0);
        assert_eq!(gib(1024 * 1024 * 1024), 1.0);
        assert_eq!(gib(1_610_612_736), 1.5);
        assert_eq!(gib(1_000_000_000), 0.93);
    }
}
