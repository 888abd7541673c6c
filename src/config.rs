use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

pub const RUNTIME_URL_ENV: &str = "BROKER_SCRUB_RUNTIME_URL";
pub const CAPTCHA_URL_ENV: &str = "BROKER_SCRUB_CAPTCHA_URL";
pub const EMAIL_URL_ENV: &str = "BROKER_SCRUB_EMAIL_URL";
pub const WORKERS_ENV: &str = "BROKER_SCRUB_WORKERS";
pub const ACTION_TIMEOUT_ENV: &str = "BROKER_SCRUB_ACTION_TIMEOUT";
pub const CAPTCHA_TIMEOUT_ENV: &str = "BROKER_SCRUB_CAPTCHA_TIMEOUT";
pub const CAPTCHA_POLL_INTERVAL_ENV: &str = "BROKER_SCRUB_CAPTCHA_POLL_INTERVAL";
pub const EMAIL_TIMEOUT_ENV: &str = "BROKER_SCRUB_EMAIL_TIMEOUT";

pub const DEFAULT_WORKERS: usize = 4;
pub const DEFAULT_ACTION_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CAPTCHA_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_CAPTCHA_POLL_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_EMAIL_TIMEOUT_SECS: u64 = 600;

pub fn project_dirs() -> anyhow::Result<ProjectDirs> {
    ProjectDirs::from("", "broker-scrub", "broker-scrub")
        .ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))
}

pub fn db_path() -> anyhow::Result<PathBuf> {
    let dirs = project_dirs()?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)?;
    Ok(data_dir.join("broker-scrub.db"))
}

/// Where `broker import` looks when no directory is given.
pub fn default_brokers_dir() -> anyhow::Result<PathBuf> {
    let dirs = project_dirs()?;
    Ok(dirs.config_dir().join("brokers"))
}

/// Limits applied while running jobs.
#[derive(Debug, Clone)]
pub struct RunnerSettings {
    /// Number of (broker, profile query) pairs worked on at once.
    pub workers: usize,
    pub action_timeout: Duration,
    pub captcha_timeout: Duration,
    pub captcha_poll_interval: Duration,
    pub email_timeout: Duration,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            action_timeout: Duration::from_secs(DEFAULT_ACTION_TIMEOUT_SECS),
            captcha_timeout: Duration::from_secs(DEFAULT_CAPTCHA_TIMEOUT_SECS),
            captcha_poll_interval: Duration::from_secs(DEFAULT_CAPTCHA_POLL_INTERVAL_SECS),
            email_timeout: Duration::from_secs(DEFAULT_EMAIL_TIMEOUT_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = RunnerSettings::default();
        assert_eq!(settings.workers, DEFAULT_WORKERS);
        assert!(settings.captcha_poll_interval < settings.captcha_timeout);
        assert!(settings.action_timeout > Duration::ZERO);
    }
}
