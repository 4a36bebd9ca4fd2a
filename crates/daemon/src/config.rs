// Daemon configuration (environment driven)
use std::path::PathBuf;
use std::time::Duration;

use dvbprobe_core::application::constants::{
    DEFAULT_CLEANUP_INTERVAL, DEFAULT_HEALTHCHECK_INTERVAL, DEFAULT_WATCHDOG_INTERVAL,
};
use dvbprobe_core::application::AnalyzerInvocation;
use dvbprobe_core::error::{AppError, Result};
use dvbprobe_core::port::RetentionConfig;

const DEFAULT_DB_PATH: &str = "~/.dvbprobe/probes.db";
const DEFAULT_TSDUCK_PATH: &str = "/usr/bin/tsp";
const DEFAULT_TSDUCK_CONTAINER: &str = "dvb-probe-tsduck";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub db_path: String,
    pub log_format: LogFormat,
    pub log_dir: Option<PathBuf>,
    pub watchdog_interval: Duration,
    pub healthcheck_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention: RetentionConfig,
    pub invocation: AnalyzerInvocation,
    pub default_options: Vec<String>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse from an arbitrary variable source (tests pass a map)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let db_path = lookup("DVBPROBE_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string());
        let db_path = shellexpand::tilde(&db_path).into_owned();

        let log_format = match lookup("DVBPROBE_LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "DVBPROBE_LOG_FORMAT must be 'pretty' or 'json', got '{}'",
                    other
                )))
            }
        };

        let log_dir = lookup("DVBPROBE_LOG_DIR")
            .filter(|d| !d.is_empty())
            .map(|d| PathBuf::from(shellexpand::tilde(&d).into_owned()));

        let watchdog_interval = secs(&lookup, "DVBPROBE_WATCHDOG_INTERVAL_SECS", DEFAULT_WATCHDOG_INTERVAL)?;
        let healthcheck_interval = secs(
            &lookup,
            "DVBPROBE_HEALTHCHECK_INTERVAL_SECS",
            DEFAULT_HEALTHCHECK_INTERVAL,
        )?;
        let cleanup_interval = secs(&lookup, "DVBPROBE_CLEANUP_INTERVAL_SECS", DEFAULT_CLEANUP_INTERVAL)?;

        let defaults = RetentionConfig::default();
        let retention = RetentionConfig {
            analysis_retention_days: number(
                &lookup,
                "DVBPROBE_ANALYSIS_RETENTION_DAYS",
                defaults.analysis_retention_days,
            )?,
            alert_retention_days: number(
                &lookup,
                "DVBPROBE_ALERT_RETENTION_DAYS",
                defaults.alert_retention_days,
            )?,
        };

        let use_docker = match lookup("USE_DOCKER_TSDUCK").as_deref() {
            None | Some("") | Some("false") | Some("0") => false,
            Some("true") | Some("1") => true,
            Some(other) => {
                return Err(AppError::Config(format!(
                    "USE_DOCKER_TSDUCK must be true or false, got '{}'",
                    other
                )))
            }
        };

        let invocation = if use_docker {
            AnalyzerInvocation::container(
                lookup("TSDUCK_CONTAINER").unwrap_or_else(|| DEFAULT_TSDUCK_CONTAINER.to_string()),
            )
        } else {
            AnalyzerInvocation::direct(
                lookup("TSDUCK_PATH").unwrap_or_else(|| DEFAULT_TSDUCK_PATH.to_string()),
            )
        };

        let default_options = lookup("TSDUCK_DEFAULT_OPTIONS")
            .map(|o| o.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            db_path,
            log_format,
            log_dir,
            watchdog_interval,
            healthcheck_interval,
            cleanup_interval,
            retention,
            invocation,
            default_options,
        })
    }
}

fn number<F>(lookup: &F, key: &str, default: i64) -> Result<i64>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<i64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(AppError::Config(format!(
                "{} must be a positive integer, got '{}'",
                key, raw
            ))),
        },
    }
}

fn secs<F>(lookup: &F, key: &str, default: Duration) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let value = number(lookup, key, default.as_secs() as i64)?;
    Ok(Duration::from_secs(value as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<DaemonConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        DaemonConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();

        assert!(config.db_path.ends_with(".dvbprobe/probes.db"));
        assert!(!config.db_path.starts_with('~'));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.watchdog_interval, Duration::from_secs(30));
        assert_eq!(config.healthcheck_interval, Duration::from_secs(60));
        assert_eq!(config.cleanup_interval, Duration::from_secs(3600));
        assert_eq!(config.retention.analysis_retention_days, 30);
        assert_eq!(config.retention.alert_retention_days, 7);
        assert_eq!(config.invocation, AnalyzerInvocation::direct("/usr/bin/tsp"));
        assert!(config.default_options.is_empty());
    }

    #[test]
    fn test_docker_mode() {
        let config = config_from(&[
            ("USE_DOCKER_TSDUCK", "true"),
            ("TSDUCK_CONTAINER", "probe-box"),
            ("TSDUCK_DEFAULT_OPTIONS", "--realtime  --verbose"),
        ])
        .unwrap();

        assert_eq!(
            config.invocation.to_argv(),
            vec!["docker", "exec", "-i", "probe-box", "tsp"]
        );
        assert_eq!(config.default_options, vec!["--realtime", "--verbose"]);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        for value in ["abc", "0", "-5"] {
            let err = config_from(&[("DVBPROBE_WATCHDOG_INTERVAL_SECS", value)]).unwrap_err();
            assert!(matches!(err, AppError::Config(_)), "value {}", value);
        }
    }

    #[test]
    fn test_invalid_log_format_rejected() {
        assert!(matches!(
            config_from(&[("DVBPROBE_LOG_FORMAT", "xml")]),
            Err(AppError::Config(_))
        ));
    }
}
