//! Tests for configuration layer precedence.

use ortho_config::MergeComposer;
use rstest::rstest;
use serde_json::{Value, json};

use super::helpers::{apply_layer, build_config_from_layers};
use crate::SyncprobeConfig;

#[rstest]
#[case::file_overrides_defaults(
    vec![("defaults", json!({"api_url": "https://default"})), ("file", json!({"api_url": "https://file"}))],
    "api_url",
    "https://file",
    "file should override default"
)]
#[case::environment_overrides_file(
    vec![("file", json!({"auth_token": "file-token"})), ("environment", json!({"auth_token": "env-token"}))],
    "auth_token",
    "env-token",
    "environment should override file"
)]
#[case::cli_overrides_environment(
    vec![("environment", json!({"api_url": "https://env"})), ("cli", json!({"api_url": "https://cli"}))],
    "api_url",
    "https://cli",
    "CLI should override environment"
)]
#[case::ssh_repo_url_defaults_file_env_cli(
    vec![
        ("defaults", json!({"ssh_repo_url": "git@default:r.git"})),
        ("file", json!({"ssh_repo_url": "git@file:r.git"})),
        ("environment", json!({"ssh_repo_url": "git@env:r.git"})),
        ("cli", json!({"ssh_repo_url": "git@cli:r.git"}))
    ],
    "ssh_repo_url",
    "git@cli:r.git",
    "CLI should win for ssh_repo_url"
)]
fn test_layer_precedence(
    #[case] layers: Vec<(&str, Value)>,
    #[case] field: &str,
    #[case] expected: &str,
    #[case] message: &str,
) {
    let mut composer = MergeComposer::new();

    for (layer_type, value) in layers {
        apply_layer(&mut composer, layer_type, value);
    }

    let config =
        SyncprobeConfig::merge_from_layers(composer.layers()).expect("merge should succeed");

    let actual = match field {
        "api_url" => config.api_url.as_deref(),
        "auth_token" => config.auth_token.as_deref(),
        "ssh_repo_url" => config.ssh_repo_url.as_deref(),
        _ => panic!("unknown field: {field}"),
    };

    assert_eq!(actual, Some(expected), "{message}");
}

#[rstest]
fn defaults_apply_when_no_sources_provided() {
    let mut composer = MergeComposer::new();
    composer.push_defaults(json!({"api_url": null, "auth_token": null}));

    let config = SyncprobeConfig::merge_from_layers(composer.layers())
        .expect("merge should succeed with empty defaults");

    assert!(config.api_url.is_none(), "api_url should be None");
    assert!(config.auth_token.is_none(), "auth_token should be None");
    assert_eq!(config.expect_timeout_seconds, 60, "timeout defaults to 60s");
    assert_eq!(config.poll_interval_millis, 1_000, "interval defaults to 1s");
    assert_eq!(config.report, "stderr", "report defaults to stderr");
    assert!(!config.keep_resources, "resources are cleaned up by default");
}

#[rstest]
fn partial_overrides_preserve_lower_values() {
    let config = build_config_from_layers(&[
        (
            "defaults",
            json!({"api_url": "https://default", "destination_namespace": "e2e"}),
        ),
        ("cli", json!({"api_url": "https://cli"})),
    ]);

    assert_eq!(config.api_url.as_deref(), Some("https://cli"));
    assert_eq!(
        config.destination_namespace, "e2e",
        "default namespace should be preserved"
    );
}

#[rstest]
fn keep_resources_layer_precedence_defaults_file_cli() {
    let config = build_config_from_layers(&[
        ("defaults", json!({"keep_resources": false})),
        ("file", json!({"keep_resources": true})),
        ("cli", json!({"keep_resources": false})),
    ]);

    assert!(!config.keep_resources, "CLI layer should win for keep_resources");
}
