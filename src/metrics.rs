use crate::alerts::Alert;
use crate::snapshot::{HealthSnapshot, ServiceStatus};
use prometheus::core::Collector;
use prometheus::{opts, Encoder, Gauge, GaugeVec, Registry, TextEncoder};
use std::fs;
use std::io;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to build metrics: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("failed to write metrics file {path}: {source}")]
    Write { path: String, source: io::Error },
}

/// Gauges for a single snapshot, gathered into a private registry.
pub struct SnapshotMetrics {
    registry: Registry,
    cpu_usage_percent: Gauge,
    cpu_load_average: GaugeVec,
    memory_usage_percent: Gauge,
    memory_used_bytes: Gauge,
    swap_usage_percent: Gauge,
    disk_usage_percent: GaugeVec,
    temperature_celsius: GaugeVec,
    service_up: GaugeVec,
    log_events: GaugeVec,
    processes_total: Gauge,
    tcp_connections: GaugeVec,
    alerts_active: Gauge,
    last_run_timestamp_seconds: Gauge,
}

impl SnapshotMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let cpu_usage_percent = Gauge::with_opts(opts!(
            "hostwatch_cpu_usage_percent",
            "Average CPU usage across cores in percent (0..100)"
        ))?;
        let cpu_load_average = GaugeVec::new(
            opts!("hostwatch_cpu_load_average", "Load average by window"),
            &["window"],
        )?;
        let memory_usage_percent = Gauge::with_opts(opts!(
            "hostwatch_memory_usage_percent",
            "RAM usage in percent"
        ))?;
        let memory_used_bytes =
            Gauge::with_opts(opts!("hostwatch_memory_used_bytes", "Used RAM in bytes"))?;
        let swap_usage_percent =
            Gauge::with_opts(opts!("hostwatch_swap_usage_percent", "Swap usage in percent"))?;
        let disk_usage_percent = GaugeVec::new(
            opts!("hostwatch_disk_usage_percent", "Disk usage in percent by mount"),
            &["mount", "device"],
        )?;
        let temperature_celsius = GaugeVec::new(
            opts!(
                "hostwatch_temperature_celsius",
                "Temperature by sensor in Celsius"
            ),
            &["sensor"],
        )?;
        let service_up = GaugeVec::new(
            opts!(
                "hostwatch_service_up",
                "Service state: 1 running, 0 stopped, -1 unknown"
            ),
            &["service"],
        )?;
        let log_events = GaugeVec::new(
            opts!(
                "hostwatch_log_events",
                "Matching log lines kept from the scanned tails"
            ),
            &["class"],
        )?;
        let processes_total =
            Gauge::with_opts(opts!("hostwatch_processes_total", "Number of processes"))?;
        let tcp_connections = GaugeVec::new(
            opts!("hostwatch_tcp_connections", "TCP sockets by state"),
            &["state"],
        )?;
        let alerts_active = Gauge::with_opts(opts!(
            "hostwatch_alerts_active",
            "Alerts raised by the last run"
        ))?;
        let last_run_timestamp_seconds = Gauge::with_opts(opts!(
            "hostwatch_last_run_timestamp_seconds",
            "Unix timestamp of the last snapshot"
        ))?;

        register(&registry, &cpu_usage_percent)?;
        register(&registry, &cpu_load_average)?;
        register(&registry, &memory_usage_percent)?;
        register(&registry, &memory_used_bytes)?;
        register(&registry, &swap_usage_percent)?;
        register(&registry, &disk_usage_percent)?;
        register(&registry, &temperature_celsius)?;
        register(&registry, &service_up)?;
        register(&registry, &log_events)?;
        register(&registry, &processes_total)?;
        register(&registry, &tcp_connections)?;
        register(&registry, &alerts_active)?;
        register(&registry, &last_run_timestamp_seconds)?;

        Ok(Self {
            registry,
            cpu_usage_percent,
            cpu_load_average,
            memory_usage_percent,
            memory_used_bytes,
            swap_usage_percent,
            disk_usage_percent,
            temperature_celsius,
            service_up,
            log_events,
            processes_total,
            tcp_connections,
            alerts_active,
            last_run_timestamp_seconds,
        })
    }

    pub fn update(&self, s: &HealthSnapshot, alerts: &[Alert]) {
        self.cpu_usage_percent.set(s.cpu.percent_avg);
        for (window, value) in ["1m", "5m", "15m"].into_iter().zip(s.cpu.load_average) {
            self.cpu_load_average
                .with_label_values(&[window])
                .set(value);
        }

        self.memory_usage_percent.set(s.memory.percent);
        self.memory_used_bytes
            .set(s.memory.used_gb * 1024.0 * 1024.0 * 1024.0);
        self.swap_usage_percent.set(s.memory.swap_percent);

        for d in &s.disks {
            self.disk_usage_percent
                .with_label_values(&[&d.mountpoint, &d.device])
                .set(d.percent);
        }

        if let Some(sensors) = &s.temperature {
            for (sensor, reading) in sensors {
                self.temperature_celsius
                    .with_label_values(&[sensor])
                    .set(reading.current);
            }
        }

        for svc in &s.services {
            let value = match svc.status {
                ServiceStatus::Running => 1.0,
                ServiceStatus::Stopped => 0.0,
                ServiceStatus::Unknown => -1.0,
            };
            self.service_up.with_label_values(&[&svc.name]).set(value);
        }

        for (class, count) in [
            ("error", s.logs.errors.len()),
            ("warning", s.logs.warnings.len()),
            ("auth_failure", s.logs.auth_failures.len()),
        ] {
            self.log_events
                .with_label_values(&[class])
                .set(count as f64);
        }

        self.processes_total.set(s.processes.total as f64);
        self.tcp_connections
            .with_label_values(&["established"])
            .set(s.network.established_connections as f64);
        self.tcp_connections
            .with_label_values(&["listen"])
            .set(s.network.listening_sockets as f64);

        self.alerts_active.set(alerts.len() as f64);
        self.last_run_timestamp_seconds
            .set(s.timestamp.timestamp() as f64);
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

/// Writes the exposition next to `path` and renames it into place, so a
/// scraper never sees a half-written file.
pub fn write_textfile(
    path: &Path,
    snapshot: &HealthSnapshot,
    alerts: &[Alert],
) -> Result<(), MetricsError> {
    let metrics = SnapshotMetrics::new()?;
    metrics.update(snapshot, alerts);
    let body = metrics.encode_metrics()?;

    let write_err = |source| MetricsError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("prom.tmp");
    fs::write(&tmp, body).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertKind;
    use crate::snapshot::fixtures::{log_entries, quiet_snapshot};
    use crate::snapshot::ServiceState;

    #[test]
    fn exposition_carries_snapshot_values() {
        let mut s = quiet_snapshot();
        s.services.push(ServiceState {
            name: "docker".to_string(),
            status: ServiceStatus::Unknown,
        });
        s.logs.errors = log_entries(2, "failed");
        let alerts = vec![Alert {
            kind: AlertKind::Cpu,
            message: "⚠️ High CPU usage: 99.0%".to_string(),
        }];

        let metrics = SnapshotMetrics::new().expect("metrics");
        metrics.update(&s, &alerts);
        let text = String::from_utf8(metrics.encode_metrics().expect("encode")).expect("utf8");

        assert!(text.contains("hostwatch_cpu_usage_percent 15"));
        assert!(text.lines().any(|l| l.starts_with("hostwatch_disk_usage_percent{")
            && l.contains(r#"mount="/""#)
            && l.ends_with(" 40")));
        assert!(text.contains(r#"hostwatch_service_up{service="ssh"} 1"#));
        assert!(text.contains(r#"hostwatch_service_up{service="docker"} -1"#));
        assert!(text.contains(r#"hostwatch_log_events{class="error"} 2"#));
        assert!(text.contains("hostwatch_alerts_active 1"));
        assert!(!text.contains("hostwatch_temperature_celsius{"));
    }

    #[test]
    fn textfile_is_replaced_atomically() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("node").join("hostwatch.prom");
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(&path, "stale").expect("seed");

        write_textfile(&path, &quiet_snapshot(), &[]).expect("write metrics");

        let text = fs::read_to_string(&path).expect("read back");
        assert!(text.contains("hostwatch_alerts_active 0"));
        assert!(!path.with_extension("prom.tmp").exists());
    }
}
