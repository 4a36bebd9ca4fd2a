// OS-level signal delivery and liveness checks
// reason: nix for POSIX signals, taskkill/tasklist on Windows
use dvbprobe_core::port::ProcessError;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGTERM: let the analyzer flush and exit
    Graceful,
    /// SIGKILL
    Forceful,
}

/// Outcome of a signal delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// The process had already exited
    NoSuchProcess,
}

/// Send a stop signal to `pid`
pub fn send_stop_signal(pid: u32, signal: StopSignal) -> Result<Delivery, ProcessError> {
    if pid == 0 {
        // kill(0, ..) would target our own process group
        return Err(ProcessError::Signal("refusing to signal pid 0".to_string()));
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let raw = i32::try_from(pid)
            .map_err(|_| ProcessError::Signal(format!("pid {} out of range", pid)))?;
        let sig = match signal {
            StopSignal::Graceful => Signal::SIGTERM,
            StopSignal::Forceful => Signal::SIGKILL,
        };

        info!(pid = %pid, signal = %sig, "Sending signal");
        match kill(Pid::from_raw(raw), sig) {
            Ok(()) => Ok(Delivery::Sent),
            Err(Errno::ESRCH) => Ok(Delivery::NoSuchProcess),
            Err(e) => Err(ProcessError::Signal(format!("{} failed: {}", sig, e))),
        }
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        // No graceful signal on Windows; both map to a forced kill
        let _ = signal;
        info!(pid = %pid, "Killing process on Windows");
        let output = Command::new("taskkill")
            .args(["/F", "/PID", &pid.to_string()])
            .output()
            .map_err(|e| ProcessError::Signal(e.to_string()))?;

        if output.status.success() {
            Ok(Delivery::Sent)
        } else if !is_alive(pid) {
            Ok(Delivery::NoSuchProcess)
        } else {
            Err(ProcessError::Signal(format!(
                "taskkill failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )))
        }
    }
}

/// OS-level liveness of an arbitrary pid
///
/// A process owned by another user still counts as alive.
pub fn is_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        let raw = match i32::try_from(pid) {
            Ok(raw) => raw,
            Err(_) => return false,
        };

        // No signal: existence and permission check only
        match kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(windows)]
    {
        use std::process::Command;

        let output = Command::new("tasklist")
            .args(["/FI", &format!("PID eq {}", pid), "/NH"])
            .output();

        match output {
            Ok(output) => String::from_utf8_lossy(&output.stdout).contains(&pid.to_string()),
            Err(_) => false,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_alive() {
        assert!(is_alive(std::process::id()));
    }

    #[test]
    fn test_pid_zero_is_never_alive() {
        assert!(!is_alive(0));
        assert!(send_stop_signal(0, StopSignal::Graceful).is_err());
    }

    #[tokio::test]
    async fn test_reaped_child_is_not_alive() {
        let mut child = tokio::process::Command::new("true").spawn().unwrap();
        let pid = child.id().unwrap();
        child.wait().await.unwrap();

        assert!(!is_alive(pid));
        assert_eq!(
            send_stop_signal(pid, StopSignal::Graceful).unwrap(),
            Delivery::NoSuchProcess
        );
    }

    #[tokio::test]
    async fn test_terminate_sleeping_child() {
        let mut child = tokio::process::Command::new("sleep")
            .arg("30")
            .spawn()
            .unwrap();
        let pid = child.id().unwrap();

        assert_eq!(
            send_stop_signal(pid, StopSignal::Graceful).unwrap(),
            Delivery::Sent
        );
        let status = child.wait().await.unwrap();
        assert_eq!(status.code(), None);
    }
}
