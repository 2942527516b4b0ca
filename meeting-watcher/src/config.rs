use crate::cdp::COMMAND_TIMEOUT;
use crate::types::{
    MailSettings, MailgunConfig, MonitorConfig, Result, WatchError, DEFAULT_BASE_URL,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

pub const DEFAULT_MAIL_FROM: &str = "[BOT] Innsynsportalen <bot@lynxpub.no>";
pub const DEFAULT_MAILGUN_DOMAIN: &str = "post.bodonu.no";
pub const DEFAULT_MAILGUN_API_BASE: &str = "https://api.mailgun.net/v3";
/// Selector waits run inside a single DevTools command and must finish well before it times out.
pub const MAX_WAIT_TIMEOUT_MS: u64 = COMMAND_TIMEOUT.as_millis() as u64 - 5_000;

/// Everything the watcher needs at startup, read from the environment.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub monitor: MonitorConfig,
    pub mail: MailSettings,
    /// `None` in dry-run mode.
    pub mailgun: Option<MailgunConfig>,
    pub chrome_path: Option<PathBuf>,
    pub dry_run: bool,
}

impl WatcherConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| {
            get(key).ok_or_else(|| WatchError::Config(format!("{} must be set", key)))
        };

        let defaults = MonitorConfig::default();

        let base_url = get("WATCHER_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let parsed = Url::parse(&base_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(WatchError::Config(format!(
                "WATCHER_BASE_URL must be http(s), got: {}",
                parsed.scheme()
            )));
        }

        let monitor = MonitorConfig {
            base_url: base_url.trim_end_matches('/').to_string(),
            categories: defaults.categories,
            tick_interval: parse_or(&get, "WATCHER_TICK_SECS", defaults.tick_interval.as_secs())
                .map(Duration::from_secs)?,
            heartbeat_interval: parse_or(
                &get,
                "WATCHER_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
            )
            .map(Duration::from_secs)?,
            settle_delay: parse_or(
                &get,
                "WATCHER_SETTLE_MS",
                defaults.settle_delay.as_millis() as u64,
            )
            .map(Duration::from_millis)?,
            wait_timeout_ms: parse_or(&get, "WATCHER_WAIT_TIMEOUT_MS", defaults.wait_timeout_ms)?,
        };

        if monitor.tick_interval <= monitor.settle_delay {
            return Err(WatchError::Config(format!(
                "tick interval ({:?}) must exceed the settle delay ({:?})",
                monitor.tick_interval, monitor.settle_delay
            )));
        }
        if monitor.wait_timeout_ms == 0 || monitor.wait_timeout_ms > MAX_WAIT_TIMEOUT_MS {
            return Err(WatchError::Config(format!(
                "WATCHER_WAIT_TIMEOUT_MS must be between 1 and {}, got {}",
                MAX_WAIT_TIMEOUT_MS, monitor.wait_timeout_ms
            )));
        }
        if monitor.heartbeat_interval.is_zero() {
            return Err(WatchError::Config(
                "WATCHER_HEARTBEAT_SECS must be greater than zero".to_string(),
            ));
        }

        let change_recipients: Vec<String> = require("WATCHER_CHANGE_RECIPIENTS")?
            .split(',')
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect();
        if change_recipients.is_empty() {
            return Err(WatchError::Config(
                "WATCHER_CHANGE_RECIPIENTS must list at least one address".to_string(),
            ));
        }

        let mail = MailSettings {
            from: get("WATCHER_MAIL_FROM").unwrap_or_else(|| DEFAULT_MAIL_FROM.to_string()),
            change_recipients,
            heartbeat_recipient: require("WATCHER_HEARTBEAT_RECIPIENT")?,
        };

        let dry_run = parse_or(&get, "WATCHER_DRY_RUN", false)?;

        let mailgun = if dry_run {
            None
        } else {
            Some(MailgunConfig {
                api_key: require("MAILGUN_KEY")?,
                domain: get("MAILGUN_DOMAIN").unwrap_or_else(|| DEFAULT_MAILGUN_DOMAIN.to_string()),
                api_base: get("MAILGUN_API_BASE")
                    .unwrap_or_else(|| DEFAULT_MAILGUN_API_BASE.to_string()),
                timeout_seconds: 30,
            })
        };

        Ok(Self {
            monitor,
            mail,
            mailgun,
            chrome_path: get("CHROME_PATH").map(PathBuf::from),
            dry_run,
        })
    }
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| WatchError::Config(format!("Invalid {} '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}
