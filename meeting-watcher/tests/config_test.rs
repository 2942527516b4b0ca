use meeting_watcher::config::{
    DEFAULT_MAILGUN_API_BASE, DEFAULT_MAILGUN_DOMAIN, DEFAULT_MAIL_FROM, MAX_WAIT_TIMEOUT_MS,
};
use meeting_watcher::types::{WatchError, DEFAULT_BASE_URL};
use meeting_watcher::WatcherConfig;
use std::collections::HashMap;
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

fn load(vars: &[(&str, &str)]) -> meeting_watcher::Result<WatcherConfig> {
    let env: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    WatcherConfig::from_lookup(|key| env.get(key).cloned())
}

const REQUIRED: &[(&str, &str)] = &[
    ("MAILGUN_KEY", "key-123"),
    ("WATCHER_CHANGE_RECIPIENTS", "desk@example.org, editor@example.org"),
    ("WATCHER_HEARTBEAT_RECIPIENT", "ops@example.org"),
];

fn with(extra: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
    let mut vars = REQUIRED.to_vec();
    vars.extend_from_slice(extra);
    vars
}

#[test]
fn test_defaults_with_required_values() {
    let config = assert_ok!(load(REQUIRED));

    assert_eq!(config.monitor.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.monitor.tick_interval, Duration::from_secs(5));
    assert_eq!(config.monitor.heartbeat_interval, Duration::from_secs(86_400));
    assert_eq!(config.monitor.settle_delay, Duration::from_millis(2000));
    assert_eq!(config.monitor.categories, vec!["BYST", "FORM", "UTVPM"]);
    assert_eq!(
        config.mail.change_recipients,
        vec!["desk@example.org".to_string(), "editor@example.org".to_string()]
    );
    assert_eq!(config.mail.heartbeat_recipient, "ops@example.org");
    assert_eq!(config.mail.from, DEFAULT_MAIL_FROM);
    assert!(!config.dry_run);

    let mailgun = config.mailgun.expect("mailgun configured");
    assert_eq!(mailgun.api_key, "key-123");
    assert_eq!(mailgun.domain, DEFAULT_MAILGUN_DOMAIN);
    assert_eq!(mailgun.api_base, DEFAULT_MAILGUN_API_BASE);
}

#[test]
fn test_overrides_are_applied() {
    let config = assert_ok!(load(&with(&[
        ("WATCHER_BASE_URL", "https://example.org/motekalender/"),
        ("WATCHER_TICK_SECS", "20"),
        ("WATCHER_SETTLE_MS", "500"),
        ("WATCHER_HEARTBEAT_SECS", "60"),
        ("MAILGUN_DOMAIN", "mg.example.org"),
        ("CHROME_PATH", "/opt/chrome"),
    ])));

    assert_eq!(config.monitor.base_url, "https://example.org/motekalender");
    assert_eq!(config.monitor.tick_interval, Duration::from_secs(20));
    assert_eq!(config.monitor.settle_delay, Duration::from_millis(500));
    assert_eq!(config.monitor.heartbeat_interval, Duration::from_secs(60));
    assert_eq!(config.mailgun.unwrap().domain, "mg.example.org");
    assert_eq!(config.chrome_path.unwrap().to_str(), Some("/opt/chrome"));
}

#[test]
fn test_missing_required_values_are_fatal() {
    for skip in ["MAILGUN_KEY", "WATCHER_CHANGE_RECIPIENTS", "WATCHER_HEARTBEAT_RECIPIENT"] {
        let vars: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != skip).collect();
        let err = assert_err!(load(&vars));
        assert!(err.to_string().contains(skip), "{} should be reported: {}", skip, err);
    }
}

#[test]
fn test_dry_run_does_not_need_mailgun() {
    let config = assert_ok!(load(&[
        ("WATCHER_DRY_RUN", "true"),
        ("WATCHER_CHANGE_RECIPIENTS", "desk@example.org"),
        ("WATCHER_HEARTBEAT_RECIPIENT", "ops@example.org"),
    ]));
    assert!(config.dry_run);
    assert!(config.mailgun.is_none());
}

#[test]
fn test_invalid_values_are_rejected() {
    assert!(matches!(
        load(&with(&[("WATCHER_TICK_SECS", "soon")])),
        Err(WatchError::Config(_))
    ));
    assert!(matches!(
        load(&with(&[("WATCHER_BASE_URL", "not a url")])),
        Err(WatchError::InvalidUrl(_))
    ));
    assert!(matches!(
        load(&with(&[("WATCHER_BASE_URL", "ftp://example.org")])),
        Err(WatchError::Config(_))
    ));
    assert!(matches!(
        load(&with(&[("WATCHER_CHANGE_RECIPIENTS", " , ")])),
        Err(WatchError::Config(_))
    ));
}

#[test]
fn test_tick_must_outlast_settle_delay() {
    let err = assert_err!(load(&with(&[
        ("WATCHER_TICK_SECS", "2"),
        ("WATCHER_SETTLE_MS", "2000"),
    ])));
    assert!(matches!(err, WatchError::Config(_)));
}

#[test]
fn test_wait_timeout_must_fit_inside_a_browser_command() {
    let config = assert_ok!(load(&with(&[("WATCHER_WAIT_TIMEOUT_MS", "55000")])));
    assert_eq!(config.monitor.wait_timeout_ms, MAX_WAIT_TIMEOUT_MS);

    for raw in ["0", "55001", "18446744073709551615"] {
        let err = assert_err!(load(&with(&[("WATCHER_WAIT_TIMEOUT_MS", raw)])));
        assert!(matches!(err, WatchError::Config(_)));
    }
}
