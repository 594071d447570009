//! Tests for timing fields loading from environment and CLI.

use std::time::Duration;

use ortho_config::OrthoConfig;
use rstest::rstest;

use crate::SyncprobeConfig;

/// Loads the configuration with an isolated home directory.
fn load_with(env_timeout: Option<&str>, cli_args: &[&str]) -> SyncprobeConfig {
    let temp_dir = tempfile::TempDir::new().expect("temp dir should be created");
    let home = temp_dir.path().to_string_lossy().to_string();

    let _guard = env_lock::lock_env([
        ("SYNCPROBE_EXPECT_TIMEOUT_SECONDS", env_timeout),
        ("HOME", Some(home.as_str())),
        ("XDG_CONFIG_HOME", Some(home.as_str())),
    ]);

    let mut args: Vec<std::ffi::OsString> = vec![std::ffi::OsString::from("syncprobe")];
    args.extend(cli_args.iter().map(std::ffi::OsString::from));

    SyncprobeConfig::load_from_iter(args).expect("config should load")
}

#[rstest]
#[case::default(None, &[], 60, "default timeout should be 60 seconds")]
#[case::environment(Some("300"), &[], 300, "expected SYNCPROBE_EXPECT_TIMEOUT_SECONDS to apply")]
#[case::cli(None, &["--expect-timeout-seconds", "15"], 15, "expected CLI flag to apply")]
#[case::cli_overrides_environment(
    Some("300"),
    &["--expect-timeout-seconds", "15"],
    15,
    "CLI should override environment"
)]
fn expect_timeout_seconds_loading(
    #[case] env_timeout: Option<&str>,
    #[case] cli_args: &[&str],
    #[case] expected: u64,
    #[case] description: &str,
) {
    let config = load_with(env_timeout, cli_args);

    assert_eq!(config.expect_timeout_seconds, expected, "{description}");
}

#[rstest]
fn poll_settings_follow_timing_fields() {
    let config = SyncprobeConfig {
        expect_timeout_seconds: 90,
        poll_interval_millis: 250,
        max_observation_failures: 7,
        ..Default::default()
    };

    let settings = config.poll_settings().expect("settings should be valid");

    assert_eq!(settings.timeout, Duration::from_secs(90));
    assert_eq!(settings.interval, Duration::from_millis(250));
    assert_eq!(settings.max_observation_failures, 7);
}
