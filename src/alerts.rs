use crate::config::Thresholds;
use crate::snapshot::{HealthSnapshot, ServiceStatus};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Cpu,
    Memory,
    Disk,
    Temperature,
    Service,
    LogErrors,
    AuthFailures,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub message: String,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

type RuleFn = fn(&HealthSnapshot, &Thresholds) -> Vec<String>;

struct Rule {
    kind: AlertKind,
    eval: RuleFn,
}

// alert order follows this table
const RULES: &[Rule] = &[
    Rule {
        kind: AlertKind::Cpu,
        eval: cpu_rule,
    },
    Rule {
        kind: AlertKind::Memory,
        eval: memory_rule,
    },
    Rule {
        kind: AlertKind::Disk,
        eval: disk_rule,
    },
    Rule {
        kind: AlertKind::Temperature,
        eval: temperature_rule,
    },
    Rule {
        kind: AlertKind::Service,
        eval: service_rule,
    },
    Rule {
        kind: AlertKind::LogErrors,
        eval: log_error_rule,
    },
    Rule {
        kind: AlertKind::AuthFailures,
        eval: auth_failure_rule,
    },
];

pub fn evaluate(snapshot: &HealthSnapshot, thresholds: &Thresholds) -> Vec<Alert> {
    RULES
        .iter()
        .flat_map(|rule| {
            (rule.eval)(snapshot, thresholds)
                .into_iter()
                .map(move |message| Alert {
                    kind: rule.kind,
                    message,
                })
        })
        .collect()
}

fn cpu_rule(s: &HealthSnapshot, t: &Thresholds) -> Vec<String> {
    if s.cpu.percent_avg > t.cpu_percent {
        vec![format!("⚠️ High CPU usage: {:.1}%", s.cpu.percent_avg)]
    } else {
        Vec::new()
    }
}

fn memory_rule(s: &HealthSnapshot, t: &Thresholds) -> Vec<String> {
    if s.memory.percent > t.memory_percent {
        vec![format!("⚠️ High memory usage: {:.1}%", s.memory.percent)]
    } else {
        Vec::new()
    }
}

fn disk_rule(s: &HealthSnapshot, t: &Thresholds) -> Vec<String> {
    s.disks
        .iter()
        .filter(|d| d.percent > t.disk_percent)
        .map(|d| format!("⚠️ High disk usage on {}: {:.1}%", d.mountpoint, d.percent))
        .collect()
}

fn temperature_rule(s: &HealthSnapshot, t: &Thresholds) -> Vec<String> {
    let Some(sensors) = &s.temperature else {
        return Vec::new();
    };
    sensors
        .iter()
        .filter(|(_, reading)| reading.current > t.temp_celsius)
        .map(|(sensor, reading)| {
            format!("⚠️ High temperature on {sensor}: {:.1}°C", reading.current)
        })
        .collect()
}

fn service_rule(s: &HealthSnapshot, _t: &Thresholds) -> Vec<String> {
    s.services
        .iter()
        .filter(|svc| svc.status == ServiceStatus::Stopped)
        .map(|svc| format!("⚠️ Service {} is not running", svc.name))
        .collect()
}

fn log_error_rule(s: &HealthSnapshot, t: &Thresholds) -> Vec<String> {
    let count = s.logs.errors.len();
    if count > t.log_errors {
        vec![format!(
            "⚠️ Multiple errors detected in system logs ({count} errors)"
        )]
    } else {
        Vec::new()
    }
}

fn auth_failure_rule(s: &HealthSnapshot, _t: &Thresholds) -> Vec<String> {
    let count = s.logs.auth_failures.len();
    if count > 0 {
        vec![format!(
            "⚠️ Authentication failures detected ({count} failures)"
        )]
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::fixtures::{log_entries, quiet_snapshot};
    use crate::snapshot::{CpuInfo, DiskInfo, ServiceState, TemperatureReading};
    use std::collections::BTreeMap;

    fn disk(mount: &str, percent: f64) -> DiskInfo {
        DiskInfo {
            device: format!("/dev/{}", mount.trim_start_matches('/')),
            mountpoint: mount.to_string(),
            fstype: "ext4".to_string(),
            total_gb: 100.0,
            used_gb: percent,
            free_gb: 100.0 - percent,
            percent,
        }
    }

    fn troubled_snapshot() -> HealthSnapshot {
        let mut s = quiet_snapshot();
        s.cpu = CpuInfo::new(vec![85.0, 85.0], 2400.0, [4.0, 3.0, 2.0]);
        s.memory.percent = 90.0;
        s.disks = vec![disk("/", 95.0)];
        s.services = vec![ServiceState {
            name: "ssh".to_string(),
            status: ServiceStatus::Stopped,
        }];
        s.logs.errors = log_entries(10, "disk failed");
        s.logs.auth_failures = log_entries(1, "invalid user root");
        s
    }

    fn position(alerts: &[Alert], needle: &str) -> usize {
        alerts
            .iter()
            .position(|a| a.message.contains(needle))
            .unwrap_or_else(|| panic!("no alert containing {needle:?} in {alerts:?}"))
    }

    #[test]
    fn quiet_host_has_no_alerts() {
        assert!(evaluate(&quiet_snapshot(), &Thresholds::default()).is_empty());
    }

    #[test]
    fn troubled_host_alerts_in_rule_order() {
        let alerts = evaluate(&troubled_snapshot(), &Thresholds::default());
        assert!(alerts.len() >= 5, "{alerts:?}");

        let cpu = position(&alerts, "CPU");
        let memory = position(&alerts, "memory");
        let disk = position(&alerts, "disk usage on /");
        let ssh = position(&alerts, "ssh");
        let auth = position(&alerts, "Authentication failures");
        assert!(cpu < memory && memory < disk && disk < ssh && ssh < auth);

        assert_eq!(alerts[cpu].message, "⚠️ High CPU usage: 85.0%");
        assert_eq!(alerts[memory].message, "⚠️ High memory usage: 90.0%");
        assert!(alerts
            .iter()
            .any(|a| a.kind == AlertKind::LogErrors && a.message.contains("10 errors")));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let snapshot = troubled_snapshot();
        let thresholds = Thresholds::default();
        assert_eq!(evaluate(&snapshot, &thresholds), evaluate(&snapshot, &thresholds));
    }

    #[test]
    fn thresholds_are_strict() {
        let mut s = quiet_snapshot();
        s.cpu = CpuInfo::new(vec![80.0], 2400.0, [0.0; 3]);
        s.memory.percent = 85.0;
        s.disks = vec![disk("/", 90.0)];
        s.temperature = Some(BTreeMap::from([(
            "coretemp".to_string(),
            TemperatureReading {
                current: 80.0,
                high: None,
                critical: None,
            },
        )]));
        s.logs.errors = log_entries(5, "error");
        assert!(evaluate(&s, &Thresholds::default()).is_empty());
    }

    #[test]
    fn unknown_service_never_alerts() {
        let mut s = quiet_snapshot();
        s.services = vec![
            ServiceState {
                name: "docker".to_string(),
                status: ServiceStatus::Unknown,
            },
            ServiceState {
                name: "nginx".to_string(),
                status: ServiceStatus::Stopped,
            },
        ];
        let alerts = evaluate(&s, &Thresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].message, "⚠️ Service nginx is not running");
    }

    #[test]
    fn one_alert_per_offending_disk_and_sensor() {
        let mut s = quiet_snapshot();
        s.disks = vec![disk("/", 91.0), disk("/home", 50.0), disk("/var", 99.5)];
        s.temperature = Some(BTreeMap::from([
            (
                "acpitz".to_string(),
                TemperatureReading {
                    current: 45.0,
                    high: None,
                    critical: Some(95.0),
                },
            ),
            (
                "coretemp".to_string(),
                TemperatureReading {
                    current: 88.5,
                    high: Some(84.0),
                    critical: Some(100.0),
                },
            ),
        ]));
        let alerts = evaluate(&s, &Thresholds::default());
        let kinds: Vec<AlertKind> = alerts.iter().map(|a| a.kind).collect();
        assert_eq!(
            kinds,
            vec![AlertKind::Disk, AlertKind::Disk, AlertKind::Temperature]
        );
        assert!(alerts[1].message.contains("/var"));
        assert_eq!(alerts[2].message, "⚠️ High temperature on coretemp: 88.5°C");
    }

    #[test]
    fn single_auth_failure_triggers() {
        let mut s = quiet_snapshot();
        s.logs.auth_failures = log_entries(1, "authentication failure");
        let alerts = evaluate(&s, &Thresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::AuthFailures);
        assert!(alerts[0].message.contains("(1 failures)"));
    }
}
