//! Radiolens CLI
//!
//! Classifies one radiograph and prints the result as a single JSON document.
//!
//! Exit status is 0 on success, 1 when the prediction fails, and 2 when the
//! invocation itself is wrong. Every outcome, including usage errors, is a
//! structured document on standard output.

use clap::error::ErrorKind;
use clap::Parser;
use radiolens_classifiers::{ImageSource, PredictionService, RadiolensConfig};
use radiolens_core::{FailureReport, ImageIdentity, PredictionReport};
use std::process::ExitCode;
use tracing::{debug, info};

mod cli;

use cli::{Cli, LogFormat};

const EXIT_FAILURE: u8 = 1;
const EXIT_USAGE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            e.exit()
        }
        Err(e) => {
            emit_failure(&FailureReport::usage(usage_message(&e)));
            return ExitCode::from(EXIT_USAGE);
        }
    };

    if let Err(e) = init_tracing(cli.verbose, cli.log_format) {
        emit_failure(&FailureReport::new(e.to_string(), "internal_error"));
        return ExitCode::from(EXIT_FAILURE);
    }
    radiolens_telemetry::describe_metrics();

    let report = run(&cli).await;
    let success = report.is_success();
    emit(&report);

    if success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_FAILURE)
    }
}

async fn run(cli: &Cli) -> PredictionReport {
    let service = match build_service(cli) {
        Ok(service) => service,
        Err(e) => return PredictionReport::failure(&e),
    };

    let identity = ImageIdentity::from_path(&cli.image);
    info!(image = %cli.image.display(), "Classifying radiograph");

    service
        .predict_report(ImageSource::path(&cli.image), identity)
        .await
}

fn build_service(cli: &Cli) -> radiolens_core::Result<PredictionService> {
    let mut config = RadiolensConfig::load(cli.config.as_deref())?;
    if let Some(model) = &cli.model {
        config = config.with_model_path(model);
    }
    debug!(?config, "Configuration loaded");

    PredictionService::from_config(&config)
}

/// Clap's message on one line, without its `error:` prefix or usage block
fn usage_message(err: &clap::Error) -> String {
    let rendered = err.to_string();
    let message = rendered
        .lines()
        .take_while(|line| !line.starts_with("Usage:"))
        .map(|line| line.trim_start_matches("error:").trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    format!("{message}; usage: radiolens [OPTIONS] <IMAGE>")
}

fn emit(report: &PredictionReport) {
    match report.to_json() {
        Ok(json) => println!("{json}"),
        Err(e) => emit_failure(&FailureReport::from(&e)),
    }
}

fn emit_failure(report: &FailureReport) {
    let json = serde_json::to_string(report).unwrap_or_else(|_| {
        concat!(
            r#"{"success":false,"error":"failed to render failure document","#,
            r#""error_kind":"serialization_error"}"#
        )
        .to_string()
    });
    println!("{json}");
}

/// Initialize tracing subscriber writing to standard error
fn init_tracing(verbose: bool, format: LogFormat) -> anyhow::Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("radiolens=debug,radiolens_classifiers=debug,radiolens_telemetry=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("radiolens=info,radiolens_classifiers=info"))
    };

    let (text, json) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))
}
