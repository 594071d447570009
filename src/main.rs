//! Syncprobe CLI entrypoint: runs the bundled scenarios against a live
//! control plane.

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;

use ortho_config::OrthoConfig;
use syncprobe::scenarios::sync_from_git_refspecs;
use syncprobe::{
    Harness, HarnessError, HttpControlPlane, NoopReportSink, ReportSink, ReportTarget,
    StderrJsonlReportSink, SyncprobeConfig,
};
use tracing::info;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "syncprobe=info".into()),
        )
        .with_writer(io::stderr)
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            if writeln!(io::stderr().lock(), "{error}").is_err() {
                return ExitCode::FAILURE;
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), HarnessError> {
    let config = load_config()?;
    let settings = config.fixture_settings()?;
    let endpoint = config.endpoint()?;

    let gateway =
        HttpControlPlane::new(&endpoint).map_err(|error| HarnessError::Configuration {
            message: error.to_string(),
        })?;
    let report: Arc<dyn ReportSink> = match config.report_target()? {
        ReportTarget::Stderr => Arc::new(StderrJsonlReportSink),
        ReportTarget::None => Arc::new(NoopReportSink),
    };

    info!(api_url = %endpoint.api_url, "starting scenarios");
    let harness = Harness::new(Arc::new(gateway), settings).with_report_sink(report);
    sync_from_git_refspecs(&harness).await
}

/// Loads configuration from CLI, environment, and files.
///
/// # Errors
///
/// Returns [`HarnessError::Configuration`] when ortho-config fails to parse
/// arguments or load configuration files.
fn load_config() -> Result<SyncprobeConfig, HarnessError> {
    SyncprobeConfig::load().map_err(|error| HarnessError::Configuration {
        message: error.to_string(),
    })
}
