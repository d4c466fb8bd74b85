use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub email: EmailConfig,
    pub reports: ReportsConfig,
    pub monitoring: MonitoringConfig,
    pub thresholds: Thresholds,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmailConfig {
    #[serde(default = "default_smtp_server", alias = "smtpServer")]
    pub smtp_server: String,
    #[serde(default = "default_smtp_port", alias = "smtpPort")]
    pub smtp_port: u16,
    #[serde(default = "default_from_email", alias = "fromEmail")]
    pub from_email: String,
    #[serde(default = "default_to_emails", alias = "toEmails")]
    pub to_emails: Vec<String>,
    #[serde(default, alias = "useAuthentication")]
    pub use_authentication: bool,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default = "default_password_env", alias = "passwordEnv")]
    pub password_env: String,
    #[serde(default, alias = "caFile")]
    pub ca_file: Option<PathBuf>,
    #[serde(default = "default_email_timeout_secs", alias = "timeoutSecs")]
    pub timeout_secs: u64,
    #[serde(default = "default_compose_program", alias = "composeProgram")]
    pub compose_program: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportsConfig {
    #[serde(default = "default_output_dir", alias = "outputDir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_keep_days", alias = "keepDays")]
    pub keep_days: u64,
    #[serde(default, alias = "metricsFile")]
    pub metrics_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitoringConfig {
    #[serde(default = "default_check_services", alias = "checkServices")]
    pub check_services: Vec<String>,
    #[serde(default = "default_log_files", alias = "logFiles")]
    pub log_files: Vec<PathBuf>,
    #[serde(default = "default_max_log_lines", alias = "maxLogLines")]
    pub max_log_lines: usize,
    #[serde(
        default = "default_service_timeout_secs",
        alias = "serviceTimeoutSecs"
    )]
    pub service_timeout_secs: u64,
}

/// Alert ceilings. A value has to be strictly greater than its threshold to alert.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Thresholds {
    #[serde(default = "default_cpu_percent", alias = "cpuPercent")]
    pub cpu_percent: f64,
    #[serde(default = "default_memory_percent", alias = "memoryPercent")]
    pub memory_percent: f64,
    #[serde(default = "default_disk_percent", alias = "diskPercent")]
    pub disk_percent: f64,
    #[serde(default = "default_temp_celsius", alias = "tempCelsius")]
    pub temp_celsius: f64,
    #[serde(default = "default_log_errors", alias = "logErrors")]
    pub log_errors: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            smtp_server: default_smtp_server(),
            smtp_port: default_smtp_port(),
            from_email: default_from_email(),
            to_emails: default_to_emails(),
            use_authentication: false,
            username: None,
            password_env: default_password_env(),
            ca_file: None,
            timeout_secs: default_email_timeout_secs(),
            compose_program: default_compose_program(),
        }
    }
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            keep_days: default_keep_days(),
            metrics_file: None,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            check_services: default_check_services(),
            log_files: default_log_files(),
            max_log_lines: default_max_log_lines(),
            service_timeout_secs: default_service_timeout_secs(),
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            cpu_percent: default_cpu_percent(),
            memory_percent: default_memory_percent(),
            disk_percent: default_disk_percent(),
            temp_celsius: default_temp_celsius(),
            log_errors: default_log_errors(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
        }
    }
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl MonitoringConfig {
    pub fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse JSON in {path}: {source}")]
    ParseJson {
        path: String,
        source: serde_json::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    ParseYaml {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    /// Loads the file when a path is given and exists, built-in defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load_from_file(path),
            _ => {
                let cfg = Self::default();
                cfg.validate()?;
                Ok(cfg)
            }
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = if is_yaml_path(path_ref) {
            serde_yaml::from_str(&text).map_err(|source| ConfigError::ParseYaml {
                path: path_display,
                source,
            })?
        } else {
            serde_json::from_str(&text).map_err(|source| ConfigError::ParseJson {
                path: path_display,
                source,
            })?
        };

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_email(&self.email)?;

        if self.reports.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "reports.output_dir must not be empty".to_string(),
            ));
        }
        if self.reports.keep_days < 1 {
            return Err(ConfigError::Validation(
                "reports.keep_days must be >= 1".to_string(),
            ));
        }
        if self.monitoring.max_log_lines < 1 {
            return Err(ConfigError::Validation(
                "monitoring.max_log_lines must be >= 1".to_string(),
            ));
        }
        if self.monitoring.service_timeout_secs < 1 {
            return Err(ConfigError::Validation(
                "monitoring.service_timeout_secs must be >= 1".to_string(),
            ));
        }
        if self
            .monitoring
            .check_services
            .iter()
            .any(|s| s.trim().is_empty())
        {
            return Err(ConfigError::Validation(
                "monitoring.check_services[*] must not be empty".to_string(),
            ));
        }

        validate_thresholds(&self.thresholds)?;
        Ok(())
    }

    pub fn example_json() -> &'static str {
        include_str!("../config.example.json")
    }
}

fn is_yaml_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"))
        .unwrap_or(false)
}

fn validate_email(cfg: &EmailConfig) -> Result<(), ConfigError> {
    if cfg.smtp_server.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.smtp_server must not be empty".to_string(),
        ));
    }
    if cfg.smtp_port == 0 {
        return Err(ConfigError::Validation(
            "email.smtp_port must be in range 1..65535".to_string(),
        ));
    }
    if cfg.from_email.trim().is_empty() {
        return Err(ConfigError::Validation(
            "email.from_email must not be empty".to_string(),
        ));
    }
    if cfg.to_emails.is_empty() || cfg.to_emails.iter().any(|e| e.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "email.to_emails must list at least one non-empty address".to_string(),
        ));
    }
    if cfg.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "email.timeout_secs must be >= 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_thresholds(t: &Thresholds) -> Result<(), ConfigError> {
    for (name, value) in [
        ("cpu_percent", t.cpu_percent),
        ("memory_percent", t.memory_percent),
        ("disk_percent", t.disk_percent),
    ] {
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "thresholds.{name} must be in range 0..100"
            )));
        }
    }
    if t.temp_celsius <= 0.0 {
        return Err(ConfigError::Validation(
            "thresholds.temp_celsius must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn documents_dir() -> PathBuf {
    dirs::document_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Documents")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_smtp_server() -> String {
    "localhost".to_string()
}

const fn default_smtp_port() -> u16 {
    25
}

fn default_from_email() -> String {
    "monitor@localhost".to_string()
}

fn default_to_emails() -> Vec<String> {
    vec!["admin@localhost".to_string()]
}

fn default_password_env() -> String {
    "HOSTWATCH_SMTP_PASSWORD".to_string()
}

const fn default_email_timeout_secs() -> u64 {
    10
}

fn default_compose_program() -> String {
    "thunderbird".to_string()
}

fn default_output_dir() -> PathBuf {
    documents_dir().join("system-reports")
}

const fn default_keep_days() -> u64 {
    30
}

fn default_check_services() -> Vec<String> {
    ["ssh", "docker", "nginx", "apache2"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_log_files() -> Vec<PathBuf> {
    ["/var/log/syslog", "/var/log/auth.log", "/var/log/kern.log"]
        .iter()
        .map(PathBuf::from)
        .collect()
}

const fn default_max_log_lines() -> usize {
    crate::collectors::logs::DEFAULT_MAX_LINES
}

const fn default_service_timeout_secs() -> u64 {
    5
}

const fn default_cpu_percent() -> f64 {
    80.0
}

const fn default_memory_percent() -> f64 {
    85.0
}

const fn default_disk_percent() -> f64 {
    90.0
}

const fn default_temp_celsius() -> f64 {
    80.0
}

const fn default_log_errors() -> usize {
    5
}

fn default_log_dir() -> PathBuf {
    documents_dir().join("system-monitor-logs")
}
