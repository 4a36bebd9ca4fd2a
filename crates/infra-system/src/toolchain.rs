// Analyzer toolchain availability check
use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{info, warn};

use dvbprobe_core::application::AnalyzerInvocation;
use dvbprobe_core::port::ProcessError;

/// Upper bound for `tsp --version`
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

// "tsp: TSDuck - The MPEG Transport Stream Toolkit - version 3.36-3528"
static VERSION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)version\s+([\d.]+-\d+)").unwrap());

pub struct AnalyzerToolchain {
    invocation: AnalyzerInvocation,
}

impl AnalyzerToolchain {
    pub fn new(invocation: AnalyzerInvocation) -> Self {
        Self { invocation }
    }

    /// Run `<analyzer> --version` and extract the version string
    ///
    /// Falls back to the last output line when the usual banner is absent.
    pub async fn version(&self) -> Result<String, ProcessError> {
        let output = timeout(
            VERSION_CHECK_TIMEOUT,
            Command::new(&self.invocation.program)
                .args(&self.invocation.prefix_args)
                .arg("--version")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| {
            ProcessError::SpawnFailed(format!(
                "version check timed out after {}s",
                VERSION_CHECK_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| ProcessError::SpawnFailed(e.to_string()))?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() && output.stdout.is_empty() {
            return Err(ProcessError::SpawnFailed(format!(
                "version check exited with {}: {}",
                output.status,
                combined.trim()
            )));
        }

        Ok(parse_version(&combined))
    }

    /// True when the analyzer answers the version check
    pub async fn is_available(&self) -> bool {
        match self.version().await {
            Ok(version) => {
                info!(version = %version, program = %self.invocation.program, "Analyzer available");
                true
            }
            Err(e) => {
                warn!(error = %e, program = %self.invocation.program, "Analyzer check failed");
                false
            }
        }
    }
}

fn parse_version(output: &str) -> String {
    if let Some(caps) = VERSION_RE.captures(output) {
        return caps[1].to_string();
    }
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("Unknown")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_banner() {
        assert_eq!(
            parse_version("tsp: TSDuck - The MPEG Transport Stream Toolkit - version 3.36-3528\n"),
            "3.36-3528"
        );
        assert_eq!(parse_version("weird\noutput\n\n"), "output");
        assert_eq!(parse_version(""), "Unknown");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_version_from_script() {
        let toolchain = AnalyzerToolchain::new(AnalyzerInvocation {
            program: "sh".to_string(),
            prefix_args: vec![
                "-c".to_string(),
                "echo 'tsp: TSDuck - version 3.37-3670' >&2".to_string(),
                "tsp".to_string(),
            ],
        });

        assert_eq!(toolchain.version().await.unwrap(), "3.37-3670");
        assert!(toolchain.is_available().await);
    }

    #[tokio::test]
    async fn test_missing_executable() {
        let toolchain =
            AnalyzerToolchain::new(AnalyzerInvocation::direct("/nonexistent/dvbprobe-tsp"));
        assert!(matches!(
            toolchain.version().await,
            Err(ProcessError::SpawnFailed(_))
        ));
        assert!(!toolchain.is_available().await);
    }
}
