use crate::snapshot::{ServiceState, ServiceStatus};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time;
use tracing::{debug, warn};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const ACTIVE: &str = "active";

/// Asks the init system for each configured unit. `argv` is the command that
/// precedes the unit name; `systemctl is-active` by default.
#[derive(Debug, Clone)]
pub struct ServiceChecker {
    argv: Vec<String>,
    timeout: Duration,
}

impl Default for ServiceChecker {
    fn default() -> Self {
        Self::systemd(DEFAULT_TIMEOUT)
    }
}

impl ServiceChecker {
    pub fn systemd(timeout: Duration) -> Self {
        Self::with_command(["systemctl", "is-active"], timeout)
    }

    pub fn with_command<I, S>(argv: I, timeout: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            timeout,
        }
    }

    pub async fn check(&self, names: &[String]) -> Vec<ServiceState> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let status = self.query(name).await;
            debug!(service = %name, ?status, "service checked");
            out.push(ServiceState {
                name: name.clone(),
                status,
            });
        }
        out
    }

    async fn query(&self, name: &str) -> ServiceStatus {
        let Some((program, args)) = self.argv.split_first() else {
            return ServiceStatus::Unknown;
        };

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(name)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        match time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => status_from_stdout(&String::from_utf8_lossy(&output.stdout)),
            Ok(Err(err)) => {
                warn!(service = %name, program = %program, error = %err, "service query failed");
                ServiceStatus::Unknown
            }
            Err(_elapsed) => {
                warn!(
                    service = %name,
                    timeout_secs = self.timeout.as_secs_f64(),
                    "service query timeout"
                );
                ServiceStatus::Unknown
            }
        }
    }
}

pub fn status_from_stdout(stdout: &str) -> ServiceStatus {
    if stdout.trim() == ACTIVE {
        ServiceStatus::Running
    } else {
        ServiceStatus::Stopped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn only_exact_active_token_is_running() {
        assert_eq!(status_from_stdout("active\n"), ServiceStatus::Running);
        assert_eq!(status_from_stdout("inactive\n"), ServiceStatus::Stopped);
        assert_eq!(status_from_stdout("activating\n"), ServiceStatus::Stopped);
        assert_eq!(status_from_stdout(""), ServiceStatus::Stopped);
    }

    #[tokio::test]
    async fn missing_binary_is_unknown_not_stopped() {
        let checker = ServiceChecker::with_command(
            ["hostwatch-no-such-init-system-binary", "is-active"],
            Duration::from_secs(1),
        );
        let states = checker.check(&names(&["ssh", "nginx"])).await;
        assert_eq!(states.len(), 2);
        assert!(states.iter().all(|s| s.status == ServiceStatus::Unknown));
        assert_eq!(states[0].name, "ssh");
        assert_eq!(states[1].name, "nginx");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_is_unknown() {
        let checker =
            ServiceChecker::with_command(["sh", "-c", "sleep 5"], Duration::from_millis(100));
        let states = checker.check(&names(&["docker"])).await;
        assert_eq!(states[0].status, ServiceStatus::Unknown);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn maps_command_output() {
        let running = ServiceChecker::with_command(["sh", "-c", "echo active"], DEFAULT_TIMEOUT);
        assert_eq!(
            running.check(&names(&["ssh"])).await[0].status,
            ServiceStatus::Running
        );

        let stopped =
            ServiceChecker::with_command(["sh", "-c", "echo inactive; exit 3"], DEFAULT_TIMEOUT);
        assert_eq!(
            stopped.check(&names(&["ssh"])).await[0].status,
            ServiceStatus::Stopped
        );
    }

    #[tokio::test]
    async fn empty_service_list_checks_nothing() {
        let states = ServiceChecker::default().check(&[]).await;
        assert!(states.is_empty());
    }
}
