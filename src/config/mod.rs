//! Harness configuration loaded from CLI, environment, and files.
//!
//! This module provides a unified configuration struct that merges values
//! from command-line arguments, environment variables, and configuration
//! files using ortho-config's layered approach.
//!
//! # Precedence
//!
//! Configuration values are loaded with the following precedence (lowest to
//! highest):
//!
//! 1. **Defaults** – Built-in harness defaults
//! 2. **Configuration file** – `.syncprobe.toml` in current directory, home
//!    directory, or XDG config directory
//! 3. **Environment variables** – `SYNCPROBE_API_URL`, `SYNCPROBE_AUTH_TOKEN`,
//!    or legacy `ARGOCD_AUTH_TOKEN`
//! 4. **Command-line arguments** – `--api-url`/`-a` and `--auth-token`/`-t`
//!
//! # Configuration File
//!
//! ```toml
//! api_url = "https://cd.example.com"
//! auth_token = "eyJhbGciOi..."
//! ssh_repo_url = "git@git.example.com:e2e/testdata.git"
//! ssh_key_path = "/etc/syncprobe/id_ed25519"
//! https_repo_url = "https://git.example.com/e2e/testdata.git"
//! destination_namespace = "e2e"
//! expect_timeout_seconds = 120
//! report = "stderr"
//! ```

use std::env;
use std::time::Duration;

use camino::Utf8Path;
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

use crate::application::{DEFAULT_DESTINATION_SERVER, DEFAULT_PROJECT};
use crate::control_plane::ControlPlaneEndpoint;
use crate::error::HarnessError;
use crate::fixture::{FixtureSettings, RepositoryEndpoints};
use crate::poll::{
    DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_CAP, DEFAULT_MAX_OBSERVATION_FAILURES, MAX_TIMEOUT,
    PollSettings,
};
use crate::repository::RepositoryAuth;

const DEFAULT_EXPECT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 1_000;
const DEFAULT_DESTINATION_NAMESPACE: &str = "default";
const DEFAULT_REPO_USERNAME: &str = "git";

/// Where per-case report events go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportTarget {
    /// JSON lines on standard error.
    Stderr,
    /// Discard events.
    None,
}

/// Harness configuration supporting CLI, environment, and file sources.
///
/// # Environment Variables
///
/// - `SYNCPROBE_API_URL` or `--api-url`: Control plane API base URL
/// - `SYNCPROBE_AUTH_TOKEN`, `ARGOCD_AUTH_TOKEN`, or `--auth-token`: Bearer
///   token for the control plane
/// - `SYNCPROBE_SSH_REPO_URL` / `SYNCPROBE_HTTPS_REPO_URL`: Test repository
///   endpoints used by the `*_repo_url_added` steps
///
/// # Example
///
/// ```no_run
/// use ortho_config::OrthoConfig;
/// use syncprobe::SyncprobeConfig;
///
/// let config = SyncprobeConfig::load().expect("failed to load configuration");
/// let endpoint = config.endpoint().expect("API URL required");
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, OrthoConfig)]
#[serde(default)]
#[ortho_config(
    prefix = "SYNCPROBE",
    discovery(
        dotfile_name = ".syncprobe.toml",
        config_file_name = "syncprobe.toml",
        app_name = "syncprobe"
    )
)]
pub struct SyncprobeConfig {
    /// Base URL of the control plane API.
    ///
    /// Can be provided via:
    /// - CLI: `--api-url <URL>` or `-a <URL>`
    /// - Environment: `SYNCPROBE_API_URL`
    /// - Config file: `api_url = "..."`
    #[ortho_config(cli_short = 'a')]
    pub api_url: Option<String>,

    /// Bearer token for the control plane API.
    ///
    /// Can be provided via:
    /// - CLI: `--auth-token <TOKEN>` or `-t <TOKEN>`
    /// - Environment: `SYNCPROBE_AUTH_TOKEN` or `ARGOCD_AUTH_TOKEN` (legacy)
    /// - Config file: `auth_token = "..."`
    #[ortho_config(cli_short = 't')]
    pub auth_token: Option<String>,

    /// SSH URL of the test repository.
    #[ortho_config()]
    pub ssh_repo_url: Option<String>,

    /// HTTPS URL of the test repository.
    #[ortho_config()]
    pub https_repo_url: Option<String>,

    /// Path to the private key the controller uses for `ssh_repo_url`.
    #[ortho_config()]
    pub ssh_key_path: Option<String>,

    /// Username for `https_repo_url`; only used together with `repo_token`.
    #[ortho_config()]
    pub repo_username: Option<String>,

    /// Access token for `https_repo_url`.
    #[ortho_config()]
    pub repo_token: Option<String>,

    /// Destination cluster API server for created applications.
    #[ortho_config()]
    pub destination_server: String,

    /// Destination namespace for created applications.
    #[ortho_config()]
    pub destination_namespace: String,

    /// Project created applications belong to.
    #[ortho_config()]
    pub project: String,

    /// Time an eventual expectation may take, in seconds.
    #[ortho_config()]
    pub expect_timeout_seconds: u64,

    /// Pause between observations while waiting, in milliseconds.
    #[ortho_config()]
    pub poll_interval_millis: u64,

    /// Consecutive failed observations tolerated before a wait fails.
    #[ortho_config()]
    pub max_observation_failures: u32,

    /// Overall time a test case may take, in seconds. Unbounded when unset.
    #[ortho_config()]
    pub case_budget_seconds: Option<u64>,

    /// Leaves created applications in place after a case.
    ///
    /// Can be provided via:
    /// - CLI: `--keep-resources` / `-k`
    /// - Config file: `keep_resources = true`
    ///
    /// Note: `ortho_config` does not load boolean values from the
    /// environment.
    #[ortho_config(cli_short = 'k')]
    pub keep_resources: bool,

    /// Asks the controller to skip SSH host key verification.
    #[ortho_config()]
    pub insecure_ignore_host_key: bool,

    /// Report sink: `stderr` (JSON lines) or `none`.
    #[ortho_config()]
    pub report: String,
}

impl Default for SyncprobeConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            auth_token: None,
            ssh_repo_url: None,
            https_repo_url: None,
            ssh_key_path: None,
            repo_username: None,
            repo_token: None,
            destination_server: DEFAULT_DESTINATION_SERVER.to_owned(),
            destination_namespace: DEFAULT_DESTINATION_NAMESPACE.to_owned(),
            project: DEFAULT_PROJECT.to_owned(),
            expect_timeout_seconds: DEFAULT_EXPECT_TIMEOUT_SECONDS,
            poll_interval_millis: DEFAULT_POLL_INTERVAL_MILLIS,
            max_observation_failures: DEFAULT_MAX_OBSERVATION_FAILURES,
            case_budget_seconds: None,
            keep_resources: false,
            insecure_ignore_host_key: false,
            report: "stderr".to_owned(),
        }
    }
}

impl SyncprobeConfig {
    /// Returns the API URL or an error if missing.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when no URL is configured.
    pub fn require_api_url(&self) -> Result<&str, HarnessError> {
        self.api_url
            .as_deref()
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| HarnessError::Configuration {
                message: "control plane API URL is required (use --api-url or -a)".to_owned(),
            })
    }

    /// Resolves the auth token from configuration or the legacy
    /// `ARGOCD_AUTH_TOKEN` environment variable.
    ///
    /// Returns `None` when no source provides a token; the control plane may
    /// allow anonymous access.
    #[must_use]
    pub fn resolve_auth_token(&self) -> Option<String> {
        self.auth_token
            .clone()
            .or_else(|| env::var("ARGOCD_AUTH_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    /// Builds the control plane endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when no API URL is configured.
    pub fn endpoint(&self) -> Result<ControlPlaneEndpoint, HarnessError> {
        let api_url = self.require_api_url()?;
        Ok(ControlPlaneEndpoint::new(api_url, self.resolve_auth_token()))
    }

    /// Polling policy derived from the timing fields.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when the values are unusable,
    /// e.g. a zero timeout or interval.
    pub fn poll_settings(&self) -> Result<PollSettings, HarnessError> {
        let settings = PollSettings {
            timeout: Duration::from_secs(self.expect_timeout_seconds),
            interval: Duration::from_millis(self.poll_interval_millis),
            max_observation_failures: self.max_observation_failures,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_cap: DEFAULT_BACKOFF_CAP,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Selected report sink.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] for an unknown value.
    pub fn report_target(&self) -> Result<ReportTarget, HarnessError> {
        match self.report.trim().to_ascii_lowercase().as_str() {
            "stderr" => Ok(ReportTarget::Stderr),
            "none" | "off" => Ok(ReportTarget::None),
            other => Err(HarnessError::Configuration {
                message: format!("unknown report target '{other}' (expected stderr or none)"),
            }),
        }
    }

    /// Validates the configuration for consistency.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when an SSH key is given
    /// without an SSH URL, a repository token without an HTTPS URL, the case
    /// budget is zero or longer than [`MAX_TIMEOUT`], or the timing or report
    /// fields are unusable.
    pub fn validate(&self) -> Result<(), HarnessError> {
        if self.ssh_key_path.is_some() && self.ssh_repo_url.is_none() {
            return Err(HarnessError::Configuration {
                message: "ssh_key_path is set but ssh_repo_url is not".to_owned(),
            });
        }
        if self.repo_token.is_some() && self.https_repo_url.is_none() {
            return Err(HarnessError::Configuration {
                message: "repo_token is set but https_repo_url is not".to_owned(),
            });
        }
        if self
            .case_budget_seconds
            .is_some_and(|seconds| seconds == 0 || Duration::from_secs(seconds) > MAX_TIMEOUT)
        {
            return Err(HarnessError::Configuration {
                message: format!(
                    "case_budget_seconds must be between 1 and {}",
                    MAX_TIMEOUT.as_secs()
                ),
            });
        }
        self.poll_settings()?;
        self.report_target()?;
        Ok(())
    }

    /// Builds the settings shared by every test case.
    ///
    /// Reads the SSH private key when `ssh_key_path` is set.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Configuration`] when the configuration is
    /// inconsistent and [`HarnessError::Io`] when the key cannot be read.
    pub fn fixture_settings(&self) -> Result<FixtureSettings, HarnessError> {
        self.validate()?;

        let ssh_auth = match &self.ssh_key_path {
            Some(path) => RepositoryAuth::ssh_key_from_file(Utf8Path::new(path))?,
            None => RepositoryAuth::Anonymous,
        };
        let https_auth = match &self.repo_token {
            Some(token) => RepositoryAuth::Token {
                username: self
                    .repo_username
                    .clone()
                    .unwrap_or_else(|| DEFAULT_REPO_USERNAME.to_owned()),
                token: token.clone(),
            },
            None => RepositoryAuth::Anonymous,
        };

        Ok(FixtureSettings {
            poll: self.poll_settings()?,
            repositories: RepositoryEndpoints {
                ssh_url: self.ssh_repo_url.clone(),
                ssh_auth,
                https_url: self.https_repo_url.clone(),
                https_auth,
            },
            destination_server: self.destination_server.clone(),
            destination_namespace: self.destination_namespace.clone(),
            project: self.project.clone(),
            case_budget: self.case_budget_seconds.map(Duration::from_secs),
            keep_resources: self.keep_resources,
            insecure_ignore_host_key: self.insecure_ignore_host_key,
        })
    }
}

#[cfg(test)]
mod tests;
