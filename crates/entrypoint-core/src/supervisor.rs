//! Daemon supervision and signal forwarding.
//!
//! The entrypoint launches the role's daemon as its only child and stays in
//! the foreground. Its exit always reflects the daemon's fate: the child's
//! exit code is mirrored, a signal-killed child maps to `128 + signo`, and a
//! termination signal delivered to the entrypoint is forwarded to the child
//! before the entrypoint exits. At most one supervised process exists per
//! container.

use chrono::{DateTime, Utc};
use std::process::ExitStatus;
use std::time::Duration;
use tokio::process::Child;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::error::{BootError, BootResult};
use crate::role::CommandSpec;
use crate::signals;

/// Owns the supervised daemon process for the container's lifetime.
pub struct Supervisor {
    child: Child,
    pid: u32,
    program: String,
    started_at: DateTime<Utc>,
    grace: Duration,
}

impl Supervisor {
    /// Launches the daemon with inherited stdio and records its handle.
    pub fn spawn(spec: &CommandSpec, grace: Duration) -> BootResult<Self> {
        let mut command = spec.command();
        command.kill_on_drop(true);

        let child = command.spawn().map_err(|e| BootError::Spawn {
            program: spec.program.display().to_string(),
            source: e,
        })?;
        let pid = child.id().unwrap_or_default();

        info!(pid, command = %spec.render(), "daemon started");
        Ok(Self {
            child,
            pid,
            program: spec.program.display().to_string(),
            started_at: Utc::now(),
            grace,
        })
    }

    /// Blocks until the daemon exits or a termination signal arrives, and
    /// returns the code the entrypoint should exit with.
    pub async fn supervise(mut self) -> BootResult<i32> {
        let mut received: Option<i32> = None;

        let status = tokio::select! {
            status = self.child.wait() => Some(status?),
            signo = signals::wait_for_termination() => {
                received = Some(signo?);
                None
            }
        };

        let code = match status {
            Some(status) => {
                let code = exit_code(status);
                info!(
                    pid = self.pid,
                    program = %self.program,
                    code,
                    uptime_secs = self.uptime_secs(),
                    "daemon exited"
                );
                code
            }
            None => {
                // received is always set when the signal arm wins
                let signo = received.unwrap_or(libc_sigterm());
                self.shutdown(signo).await?
            }
        };

        Ok(code)
    }

    /// Forwards `signo` to the daemon, waits out the grace period, then
    /// escalates to SIGKILL.
    async fn shutdown(&mut self, signo: i32) -> BootResult<i32> {
        info!(pid = self.pid, signo, "forwarding termination signal to daemon");
        self.deliver(signo);

        match timeout(self.grace, self.child.wait()).await {
            Ok(status) => {
                let code = exit_code(status?);
                info!(
                    pid = self.pid,
                    code,
                    uptime_secs = self.uptime_secs(),
                    "daemon exited after signal"
                );
                Ok(code)
            }
            Err(_elapsed) => {
                warn!(
                    pid = self.pid,
                    grace_secs = self.grace.as_secs(),
                    "daemon did not exit within grace period, killing"
                );
                // May race a just-exited child; wait() below reaps either way
                let _ = self.child.start_kill();
                let status = self.child.wait().await?;
                Ok(exit_code(status))
            }
        }
    }

    #[cfg(unix)]
    fn deliver(&self, signo: i32) {
        let rc = unsafe { libc::kill(self.pid as libc::pid_t, signo) };
        if rc != 0 {
            warn!(pid = self.pid, signo, "failed to deliver signal to daemon");
        }
    }

    #[cfg(not(unix))]
    fn deliver(&mut self, _signo: i32) {
        let _ = self.child.start_kill();
    }

    fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

#[cfg(unix)]
fn libc_sigterm() -> i32 {
    libc::SIGTERM
}

#[cfg(not(unix))]
fn libc_sigterm() -> i32 {
    15
}

/// Maps a child exit status to the entrypoint's own exit code.
fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("/bin/sh").arg("-c").arg(script)
    }

    #[tokio::test]
    async fn test_exit_code_is_mirrored() {
        let supervisor = Supervisor::spawn(&sh("exit 3"), Duration::from_secs(5)).expect("spawn");
        let code = supervisor.supervise().await.expect("supervise");
        assert_eq!(code, 3);
    }

    #[tokio::test]
    async fn test_clean_exit_is_zero() {
        let supervisor = Supervisor::spawn(&sh("exit 0"), Duration::from_secs(5)).expect("spawn");
        let code = supervisor.supervise().await.expect("supervise");
        assert_eq!(code, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_killed_child_maps_to_128_plus_signo() {
        let supervisor =
            Supervisor::spawn(&sh("kill -TERM $$"), Duration::from_secs(5)).expect("spawn");
        let code = supervisor.supervise().await.expect("supervise");
        assert_eq!(code, 143);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_forwards_signal_and_waits_for_exit() {
        let mut supervisor =
            Supervisor::spawn(&sh("sleep 30"), Duration::from_secs(5)).expect("spawn");

        let start = Instant::now();
        let code = supervisor.shutdown(libc::SIGTERM).await.expect("shutdown");

        assert_eq!(code, 143, "sleep dies from the forwarded SIGTERM");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_shutdown_escalates_to_kill_after_grace() {
        // The child ignores SIGTERM, so only the SIGKILL escalation ends it
        let mut supervisor = Supervisor::spawn(
            &sh("trap '' TERM; while true; do sleep 1; done"),
            Duration::from_millis(200),
        )
        .expect("spawn");

        let start = Instant::now();
        let code = supervisor.shutdown(libc::SIGTERM).await.expect("shutdown");

        assert_eq!(code, 137, "SIGKILL maps to 128 + 9");
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_spawn_missing_program_errors() {
        let spec = CommandSpec::new("/definitely/not/a/real/daemon");
        let result = Supervisor::spawn(&spec, Duration::from_secs(1));
        assert!(matches!(result, Err(BootError::Spawn { .. })));
    }

    #[cfg(unix)]
    #[test]
    fn test_exit_code_mapping() {
        use std::os::unix::process::ExitStatusExt;

        assert_eq!(exit_code(ExitStatus::from_raw(3 << 8)), 3);
        assert_eq!(exit_code(ExitStatus::from_raw(0)), 0);
        // Raw wait status 15 = killed by SIGTERM
        assert_eq!(exit_code(ExitStatus::from_raw(15)), 143);
    }
}
