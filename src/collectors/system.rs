use crate::collectors::connections::count_tcp_connections;
use crate::collectors::SystemSample;
use crate::snapshot::{
    gib, percent, round2, CpuInfo, DiskInfo, MemoryInfo, NetworkInfo, ProcessInfo, ProcessUsage,
    TemperatureReading, Uptime,
};
use std::collections::BTreeMap;
#[cfg(target_os = "linux")]
use std::fs;
use std::time::Duration;
use sysinfo::{
    ComponentExt, CpuExt, CpuRefreshKind, DiskExt, NetworkExt, NetworksExt, PidExt, ProcessExt,
    System, SystemExt,
};
use tracing::debug;

pub const TOP_PROCESSES: usize = 5;
pub const SAMPLE_WINDOW: Duration = Duration::from_secs(1);

/// Reads OS state once per run. CPU and per-process utilisation are measured
/// across a fixed window between two refreshes.
pub struct Sampler {
    system: System,
    window: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSample {
    pub pid: u32,
    pub name: String,
    pub cpu_percent: f64,
    pub memory_percent: f64,
}

impl Sampler {
    pub fn new(window: Duration) -> Self {
        Self {
            system: System::new(),
            window,
        }
    }

    pub async fn sample(&mut self) -> SystemSample {
        self.system.refresh_cpu();
        self.system.refresh_processes();
        tokio::time::sleep(self.window).await;
        self.system.refresh_cpu_specifics(CpuRefreshKind::everything());
        self.system.refresh_memory();
        self.system.refresh_processes();
        self.system.refresh_disks_list();
        self.system.refresh_disks();
        self.system.refresh_networks_list();
        self.system.refresh_networks();
        self.system.refresh_components_list();
        self.system.refresh_components();

        let hostname = self
            .system
            .host_name()
            .unwrap_or_else(|| "unknown".to_string());
        let platform = platform_description(&self.system);
        let uptime = Uptime::from_secs(self.system.uptime());

        let cpu = self.cpu_info();
        let memory = self.memory_info();
        let disks = self.disk_info();
        let network = self.network_info();
        let processes = self.process_info();
        let temperature = collect_temperatures(&self.system);

        debug!(
            cores = cpu.count,
            disks = disks.len(),
            processes = processes.total,
            sensors = temperature.as_ref().map(|t| t.len()).unwrap_or(0),
            "system sample collected"
        );

        SystemSample {
            hostname,
            platform,
            uptime,
            cpu,
            memory,
            disks,
            network,
            processes,
            temperature,
        }
    }

    fn cpu_info(&self) -> CpuInfo {
        let cpus = self.system.cpus();
        let per_core: Vec<f64> = cpus.iter().map(|c| c.cpu_usage() as f64).collect();
        let frequency_mhz = if cpus.is_empty() {
            0.0
        } else {
            cpus.iter().map(|c| c.frequency() as f64).sum::<f64>() / cpus.len() as f64
        };
        let load = self.system.load_average();
        CpuInfo::new(per_core, frequency_mhz, [load.one, load.five, load.fifteen])
    }

    fn memory_info(&self) -> MemoryInfo {
        let total = self.system.total_memory();
        let used = self.system.used_memory();
        let swap_total = self.system.total_swap();
        let swap_used = self.system.used_swap();
        MemoryInfo {
            total_gb: gib(total),
            used_gb: gib(used),
            available_gb: gib(self.system.available_memory()),
            percent: round2(percent(used, total)),
            swap_total_gb: gib(swap_total),
            swap_used_gb: gib(swap_used),
            swap_percent: round2(percent(swap_used, swap_total)),
        }
    }

    fn disk_info(&self) -> Vec<DiskInfo> {
        self.system
            .disks()
            .iter()
            .filter_map(|d| {
                disk_entry(
                    d.name().to_string_lossy().to_string(),
                    d.mount_point().to_string_lossy().to_string(),
                    String::from_utf8_lossy(d.file_system()).to_string(),
                    d.total_space(),
                    d.available_space(),
                )
            })
            .collect()
    }

    fn network_info(&self) -> NetworkInfo {
        let (mut sent, mut recv, mut packets_sent, mut packets_recv) = (0_u64, 0_u64, 0_u64, 0_u64);
        for (_iface, data) in self.system.networks().iter() {
            sent = sent.saturating_add(data.total_transmitted());
            recv = recv.saturating_add(data.total_received());
            packets_sent = packets_sent.saturating_add(data.total_packets_transmitted());
            packets_recv = packets_recv.saturating_add(data.total_packets_received());
        }
        let connections = count_tcp_connections();
        NetworkInfo {
            bytes_sent_gb: gib(sent),
            bytes_recv_gb: gib(recv),
            packets_sent,
            packets_recv,
            established_connections: connections.established,
            listening_sockets: connections.listening,
        }
    }

    fn process_info(&self) -> ProcessInfo {
        let total_memory = self.system.total_memory();
        let mut samples: Vec<ProcessSample> = self
            .system
            .processes()
            .values()
            .map(|p| ProcessSample {
                pid: p.pid().as_u32(),
                name: p.name().to_string(),
                cpu_percent: p.cpu_usage() as f64,
                memory_percent: percent(p.memory(), total_memory),
            })
            .collect();
        samples.sort_by_key(|p| p.pid);
        rank_processes(&samples)
    }
}

/// Drops partitions whose size cannot be read instead of reporting them as zero.
pub(crate) fn disk_entry(
    device: String,
    mountpoint: String,
    fstype: String,
    total: u64,
    available: u64,
) -> Option<DiskInfo> {
    if total == 0 {
        debug!(mount = %mountpoint, "skipping partition without readable size");
        return None;
    }
    let used = total.saturating_sub(available);
    Some(DiskInfo {
        device,
        mountpoint,
        fstype,
        total_gb: gib(total),
        used_gb: gib(used),
        free_gb: gib(available.min(total)),
        percent: round2(percent(used, total)),
    })
}

pub(crate) fn rank_processes(samples: &[ProcessSample]) -> ProcessInfo {
    ProcessInfo {
        total: samples.len(),
        top_cpu: top_by(samples, |p| p.cpu_percent),
        top_memory: top_by(samples, |p| p.memory_percent),
    }
}

fn top_by(samples: &[ProcessSample], key: impl Fn(&ProcessSample) -> f64) -> Vec<ProcessUsage> {
    let mut ranked: Vec<&ProcessSample> = samples.iter().collect();
    ranked.sort_by(|a, b| key(b).total_cmp(&key(a)));
    ranked
        .into_iter()
        .take(TOP_PROCESSES)
        .map(|p| ProcessUsage {
            pid: p.pid,
            name: p.name.clone(),
            percent: key(p),
        })
        .collect()
}

fn platform_description(system: &System) -> String {
    let os = system
        .long_os_version()
        .or_else(|| system.name())
        .unwrap_or_else(|| std::env::consts::OS.to_string());
    match system.kernel_version() {
        Some(kernel) => format!("{os} (kernel {kernel}, {})", std::env::consts::ARCH),
        None => format!("{os} ({})", std::env::consts::ARCH),
    }
}

/// Sensors are optional hardware: `None` means the host exposes none.
fn collect_temperatures(system: &System) -> Option<BTreeMap<String, TemperatureReading>> {
    let mut readings = BTreeMap::new();
    for c in system.components() {
        let Some(reading) = component_reading(
            c.temperature() as f64,
            c.max() as f64,
            c.critical().map(f64::from),
        ) else {
            continue;
        };
        readings.entry(c.label().to_string()).or_insert(reading);
    }

    if readings.is_empty() {
        for (label, reading) in collect_thermal_zones() {
            readings.entry(label).or_insert(reading);
        }
    }

    if readings.is_empty() {
        None
    } else {
        Some(readings)
    }
}

/// Only non-finite readings are dropped; sub-zero values are valid.
fn component_reading(
    current: f64,
    max: f64,
    critical: Option<f64>,
) -> Option<TemperatureReading> {
    current.is_finite().then(|| TemperatureReading {
        current,
        high: positive(max),
        critical: critical.and_then(positive),
    })
}

fn positive(v: f64) -> Option<f64> {
    (v.is_finite() && v > 0.0).then_some(v)
}

#[cfg(target_os = "linux")]
fn collect_thermal_zones() -> Vec<(String, TemperatureReading)> {
    let Ok(entries) = fs::read_dir("/sys/class/thermal") else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|v| v.to_str()) else {
            continue;
        };
        if !name.starts_with("thermal_zone") {
            continue;
        }

        let Some(current) = fs::read_to_string(path.join("temp"))
            .ok()
            .and_then(|raw| parse_millidegrees(&raw))
        else {
            continue;
        };
        let label = fs::read_to_string(path.join("type"))
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| name.to_string());
        let critical = fs::read_to_string(path.join("trip_point_0_temp"))
            .ok()
            .and_then(|raw| parse_millidegrees(&raw));
        out.push((
            label,
            TemperatureReading {
                current,
                high: None,
                critical,
            },
        ));
    }

    out
}

#[cfg(not(target_os = "linux"))]
fn collect_thermal_zones() -> Vec<(String, TemperatureReading)> {
    Vec::new()
}

/// sysfs thermal values are millidegrees; some drivers report plain degrees.
pub(crate) fn parse_millidegrees(raw: &str) -> Option<f64> {
    let v = raw.trim().parse::<f64>().ok()?;
    let celsius = if v > 1000.0 { v / 1000.0 } else { v };
    positive(celsius)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proc(pid: u32, name: &str, cpu: f64, mem: f64) -> ProcessSample {
        ProcessSample {
            pid,
            name: name.to_string(),
            cpu_percent: cpu,
            memory_percent: mem,
        }
    }

    #[test]
    fn ranks_cpu_and_memory_independently() {
        let samples: Vec<ProcessSample> = (1..=8)
            .map(|i| proc(i, &format!("p{i}"), i as f64, (9 - i) as f64))
            .collect();

        let info = rank_processes(&samples);
        assert_eq!(info.total, 8);
        let cpu_pids: Vec<u32> = info.top_cpu.iter().map(|p| p.pid).collect();
        let mem_pids: Vec<u32> = info.top_memory.iter().map(|p| p.pid).collect();
        assert_eq!(cpu_pids, vec![8, 7, 6, 5, 4]);
        assert_eq!(mem_pids, vec![1, 2, 3, 4, 5]);
        assert_eq!(info.top_cpu[0].percent, 8.0);
        assert_eq!(info.top_memory[0].percent, 8.0);
    }

    #[test]
    fn ranking_handles_fewer_than_five_processes() {
        let info = rank_processes(&[proc(1, "init", 0.5, 0.1)]);
        assert_eq!(info.total, 1);
        assert_eq!(info.top_cpu.len(), 1);
        assert_eq!(info.top_memory.len(), 1);
    }

    #[test]
    fn unreadable_partition_is_omitted() {
        assert!(disk_entry(
            "/dev/loop0".into(),
            "/snap/core".into(),
            "squashfs".into(),
            0,
            0
        )
        .is_none());
    }

    #[test]
    fn disk_percent_stays_in_range() {
        let gb = 1024 * 1024 * 1024;
        let disk = disk_entry("/dev/sda1".into(), "/".into(), "ext4".into(), 100 * gb, 25 * gb)
            .expect("readable partition");
        assert_eq!(disk.percent, 75.0);
        assert_eq!(disk.total_gb, 100.0);
        assert_eq!(disk.used_gb, 75.0);
        assert_eq!(disk.free_gb, 25.0);

        let odd = disk_entry("/dev/sdb1".into(), "/data".into(), "xfs".into(), 10 * gb, 20 * gb)
            .expect("readable partition");
        assert!((0.0..=100.0).contains(&odd.percent));
    }

    #[test]
    fn parses_thermal_zone_values() {
        assert_eq!(parse_millidegrees("45000\n"), Some(45.0));
        assert_eq!(parse_millidegrees("52"), Some(52.0));
        assert_eq!(parse_millidegrees("0"), None);
        assert_eq!(parse_millidegrees("garbage"), None);
    }

    #[test]
    fn component_readings_keep_sub_zero_values() {
        let cold = component_reading(-12.5, 0.0, None).expect("sub-zero reading");
        assert_eq!(cold.current, -12.5);
        assert_eq!(cold.high, None);

        let freezing = component_reading(0.0, 40.0, Some(95.0)).expect("zero reading");
        assert_eq!(freezing.high, Some(40.0));
        assert_eq!(freezing.critical, Some(95.0));

        assert!(component_reading(f64::NAN, 50.0, None).is_none());
        assert!(component_reading(f64::INFINITY, 50.0, None).is_none());
    }

    #[tokio::test]
    async fn sample_reads_cpu_usage_and_clock() {
        let mut sampler = Sampler::new(Duration::from_millis(200));
        let sample = sampler.sample().await;
        let cpu = &sample.cpu;

        assert_eq!(cpu.percent_per_core.len(), cpu.count);
        if !cpu.percent_per_core.is_empty() {
            let expected = crate::snapshot::mean(&cpu.percent_per_core);
            assert!(
                (cpu.percent_avg - expected).abs() < 1e-9,
                "average {} vs mean of cores {}",
                cpu.percent_avg,
                expected
            );
        }

        #[cfg(target_os = "linux")]
        {
            let reported_mhz = fs::read_to_string("/proc/cpuinfo")
                .unwrap_or_default()
                .lines()
                .filter(|l| l.starts_with("cpu MHz"))
                .filter_map(|l| l.split(':').nth(1)?.trim().parse::<f64>().ok())
                .any(|mhz| mhz > 0.0);
            if reported_mhz {
                assert!(cpu.frequency_mhz > 0.0, "frequency not sampled");
            }
        }
    }
}
