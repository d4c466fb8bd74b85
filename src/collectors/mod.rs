pub mod connections;
pub mod logs;
pub mod services;
pub mod system;

use crate::config::MonitoringConfig;
use crate::snapshot::{
    CpuInfo, DiskInfo, HealthSnapshot, MemoryInfo, NetworkInfo, ProcessInfo, TemperatureReading,
    Uptime,
};
use chrono::Local;
use services::ServiceChecker;
use std::collections::BTreeMap;
use system::Sampler;
use tracing::info;

/// Raw sampler output before logs and services are attached.
#[derive(Debug, Clone)]
pub struct SystemSample {
    pub hostname: String,
    pub platform: String,
    pub uptime: Uptime,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disks: Vec<DiskInfo>,
    pub network: NetworkInfo,
    pub processes: ProcessInfo,
    pub temperature: Option<BTreeMap<String, TemperatureReading>>,
}

pub async fn assemble_snapshot(
    sampler: &mut Sampler,
    checker: &ServiceChecker,
    cfg: &MonitoringConfig,
) -> HealthSnapshot {
    let timestamp = Local::now();
    let sample = sampler.sample().await;
    let services = checker.check(&cfg.check_services).await;
    let logs = logs::scan_logs(&cfg.log_files, cfg.max_log_lines);

    info!(
        host = %sample.hostname,
        cpu_avg = sample.cpu.percent_avg,
        memory_percent = sample.memory.percent,
        disks = sample.disks.len(),
        services = services.len(),
        log_errors = logs.errors.len(),
        "health snapshot assembled"
    );

    HealthSnapshot {
        timestamp,
        hostname: sample.hostname,
        platform: sample.platform,
        uptime: sample.uptime,
        cpu: sample.cpu,
        memory: sample.memory,
        disks: sample.disks,
        network: sample.network,
        processes: sample.processes,
        services,
        logs,
        temperature: sample.temperature,
    }
}
