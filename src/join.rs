//! Network join monitor.
//!
//! Waits for the node to attach to the network with a bounded timeout and an
//! observable status instead of spinning until the role changes. The host
//! calls [`JoinMonitor::tick`] from its loop; the role is probed at most once
//! per probe interval.

use crate::error::JoinError;
use log::{info, warn};
use std::process::Command;
use std::time::{Duration, Instant};
use strum::{Display, EnumString};

/// Role of the node in the mesh, as reported by OpenThread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum DeviceRole {
    Disabled,
    Detached,
    Child,
    Router,
    Leader,
}

impl DeviceRole {
    /// Child, router and leader can all carry application traffic.
    pub fn is_attached(&self) -> bool {
        matches!(
            self,
            DeviceRole::Child | DeviceRole::Router | DeviceRole::Leader
        )
    }
}

/// Observable join progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    Joining(Option<DeviceRole>),
    Joined(DeviceRole),
    /// The timeout elapsed; carries the last role seen, if any.
    TimedOut(Option<DeviceRole>),
}

impl JoinStatus {
    pub fn is_finished(&self) -> bool {
        !matches!(self, JoinStatus::Joining(_))
    }
}

/// Source of the current device role.
pub trait RoleProbe {
    fn role(&mut self) -> Result<DeviceRole, JoinError>;
}

/// Reads the role from a running OpenThread daemon via `ot-ctl state`.
pub struct OtCtlProbe {
    program: String,
}

impl OtCtlProbe {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for OtCtlProbe {
    fn default() -> Self {
        Self::new("ot-ctl")
    }
}

impl RoleProbe for OtCtlProbe {
    fn role(&mut self) -> Result<DeviceRole, JoinError> {
        let output = Command::new(&self.program).arg("state").output()?;
        if !output.status.success() {
            return Err(JoinError::ProbeFailed(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        parse_state_output(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse `ot-ctl state` output: the role on the first line, then "Done".
fn parse_state_output(output: &str) -> Result<DeviceRole, JoinError> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or_default();
    line.parse()
        .map_err(|_| JoinError::UnknownRole(line.to_string()))
}

/// Probe for hosts attached by construction (Ethernet, Wi-Fi).
pub struct StaticRole(pub DeviceRole);

impl RoleProbe for StaticRole {
    fn role(&mut self) -> Result<DeviceRole, JoinError> {
        Ok(self.0)
    }
}

pub struct JoinMonitor {
    timeout: Duration,
    probe_interval: Duration,
    started: Option<Instant>,
    next_probe: Option<Instant>,
    last_role: Option<DeviceRole>,
    status: JoinStatus,
}

impl JoinMonitor {
    pub fn new(timeout: Duration, probe_interval: Duration) -> Self {
        Self {
            timeout,
            probe_interval,
            started: None,
            next_probe: None,
            last_role: None,
            status: JoinStatus::Joining(None),
        }
    }

    pub fn status(&self) -> JoinStatus {
        self.status
    }

    /// Advance the monitor. Once finished the status no longer changes.
    pub fn tick<P: RoleProbe>(&mut self, now: Instant, probe: &mut P) -> JoinStatus {
        if self.status.is_finished() {
            return self.status;
        }
        let started = *self.started.get_or_insert(now);

        if self.next_probe.is_none_or(|at| now >= at) {
            self.next_probe = Some(now + self.probe_interval);
            match probe.role() {
                Ok(role) => {
                    if self.last_role != Some(role) {
                        info!("Network role: {}", role);
                    }
                    self.last_role = Some(role);
                    if role.is_attached() {
                        self.status = JoinStatus::Joined(role);
                        return self.status;
                    }
                }
                Err(e) => warn!("Network role probe failed: {}", e),
            }
        }

        self.status = if now.duration_since(started) >= self.timeout {
            JoinStatus::TimedOut(self.last_role)
        } else {
            JoinStatus::Joining(self.last_role)
        };
        self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedProbe {
        roles: Vec<Result<DeviceRole, JoinError>>,
        calls: usize,
    }

    impl ScriptedProbe {
        fn new(roles: Vec<Result<DeviceRole, JoinError>>) -> Self {
            Self { roles, calls: 0 }
        }
    }

    impl RoleProbe for ScriptedProbe {
        fn role(&mut self) -> Result<DeviceRole, JoinError> {
            self.calls += 1;
            if self.roles.len() > 1 {
                self.roles.remove(0)
            } else {
                match &self.roles[0] {
                    Ok(role) => Ok(*role),
                    Err(_) => Err(JoinError::ProbeFailed("scripted".to_string())),
                }
            }
        }
    }

    #[test]
    fn test_parse_state_output() {
        assert_eq!(parse_state_output("child\nDone\n").unwrap(), DeviceRole::Child);
        assert_eq!(parse_state_output("\nLeader\r\n").unwrap(), DeviceRole::Leader);
        assert!(matches!(
            parse_state_output("offline\n"),
            Err(JoinError::UnknownRole(r)) if r == "offline"
        ));
        assert!(parse_state_output("").is_err());
    }

    #[test]
    fn test_joins_when_attached() {
        let mut monitor = JoinMonitor::new(Duration::from_secs(10), Duration::from_secs(1));
        let mut probe = ScriptedProbe::new(vec![
            Ok(DeviceRole::Detached),
            Ok(DeviceRole::Detached),
            Ok(DeviceRole::Router),
        ]);
        let t0 = Instant::now();

        assert_eq!(
            monitor.tick(t0, &mut probe),
            JoinStatus::Joining(Some(DeviceRole::Detached))
        );
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(1), &mut probe),
            JoinStatus::Joining(Some(DeviceRole::Detached))
        );
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(2), &mut probe),
            JoinStatus::Joined(DeviceRole::Router)
        );
        // finished: no more probing
        monitor.tick(t0 + Duration::from_secs(3), &mut probe);
        assert_eq!(probe.calls, 3);
    }

    #[test]
    fn test_probe_is_rate_limited() {
        let mut monitor = JoinMonitor::new(Duration::from_secs(10), Duration::from_secs(1));
        let mut probe = ScriptedProbe::new(vec![Ok(DeviceRole::Detached)]);
        let t0 = Instant::now();
        for ms in 0..1000 {
            monitor.tick(t0 + Duration::from_millis(ms), &mut probe);
        }
        assert_eq!(probe.calls, 1);
    }

    #[test]
    fn test_times_out_observably() {
        let mut monitor = JoinMonitor::new(Duration::from_secs(5), Duration::from_secs(1));
        let mut probe = ScriptedProbe::new(vec![Ok(DeviceRole::Detached)]);
        let t0 = Instant::now();

        monitor.tick(t0, &mut probe);
        assert!(!monitor.status().is_finished());
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(5), &mut probe),
            JoinStatus::TimedOut(Some(DeviceRole::Detached))
        );
        // stays timed out even if the role changes afterwards
        let mut attached = StaticRole(DeviceRole::Child);
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(6), &mut attached),
            JoinStatus::TimedOut(Some(DeviceRole::Detached))
        );
    }

    #[test]
    fn test_probe_errors_count_towards_timeout() {
        let mut monitor = JoinMonitor::new(Duration::from_secs(2), Duration::from_secs(1));
        let mut probe = ScriptedProbe::new(vec![Err(JoinError::ProbeFailed("down".into()))]);
        let t0 = Instant::now();

        assert_eq!(monitor.tick(t0, &mut probe), JoinStatus::Joining(None));
        assert_eq!(
            monitor.tick(t0 + Duration::from_secs(2), &mut probe),
            JoinStatus::TimedOut(None)
        );
    }

    #[test]
    fn test_static_role_joins_immediately() {
        let mut monitor = JoinMonitor::new(Duration::from_secs(1), Duration::from_secs(1));
        assert_eq!(
            monitor.tick(Instant::now(), &mut StaticRole(DeviceRole::Leader)),
            JoinStatus::Joined(DeviceRole::Leader)
        );
    }
}
