use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::process::ExitCode;
use tracing::{error, info, warn};

use surge_engine::cli::{is_informational, Cli};
use surge_engine::config::{LoggingConfig, MetricsConfig, StressConfig};
use surge_engine::report::{ReportGenerator, RunSummary};
use surge_engine::runner::StressRunner;
use surge_engine::target::TargetService;

/// Exit status when a run completes but a scenario exceeded its thresholds
const THRESHOLD_BREACH_EXIT: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let (cli, unknown) = match Cli::parse_lenient(std::env::args()) {
        Ok(parsed) => parsed,
        Err(e) if is_informational(&e) => e.exit(),
        Err(e) => {
            let _ = e.print();
            return ExitCode::FAILURE;
        }
    };

    // Config is read before logging so the log format can come from it
    let config = match StressConfig::load(cli.config_path(), cli.config_required()) {
        Ok(config) => config,
        Err(e) => {
            init_tracing(&LoggingConfig::default());
            error!(path = %cli.config_path(), "Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    init_tracing(&config.logging);
    info!("Starting surge v{}", env!("CARGO_PKG_VERSION"));
    info!(path = %cli.config_path(), "Configuration loaded");

    for argument in &unknown {
        warn!(argument = %argument, "Ignoring unknown argument");
    }

    let fail_on_breach = config.thresholds.fail_on_breach;
    match run(cli, config).await {
        Ok(summary) if summary.passed() => {
            info!(run_id = %summary.run_id, "All scenarios passed their thresholds");
            ExitCode::SUCCESS
        }
        Ok(summary) => {
            warn!(
                run_id = %summary.run_id,
                failed = ?summary.failed_scenarios(),
                "Some scenarios exceeded their thresholds"
            );
            if fail_on_breach {
                ExitCode::from(THRESHOLD_BREACH_EXIT)
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            error!("Stress run aborted: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.level.as_str().into());

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .with_line_number(true)
            .init();
    }
}

async fn run(cli: Cli, mut config: StressConfig) -> Result<RunSummary> {
    config.apply_overrides(cli.users, cli.duration, cli.url);
    config.validate().context("Invalid configuration")?;

    if config.metrics.enabled {
        install_metrics_exporter(&config.metrics)?;
    }

    let mut target = TargetService::new(config.target.clone())?;
    target.build().await.context("Failed to build target service")?;
    target.start().context("Failed to start target service")?;
    target
        .wait_until_ready()
        .await
        .context("Target service never became ready")?;

    let summary = StressRunner::new(config.clone())
        .run()
        .await
        .context("Stress run failed")?;

    for scenario in &summary.scenarios {
        let r = &scenario.result;
        info!(
            scenario = %scenario.name,
            total_requests = r.total_requests,
            error_rate = r.error_rate,
            avg_ms = r.average_response_time,
            p95_ms = r.p95_response_time,
            rps = r.requests_per_second,
            passed = scenario.thresholds.passed,
            "Scenario result"
        );
    }

    let artifacts = ReportGenerator::write_all(&config.output.directory, &summary)
        .context("Failed to write reports")?;
    info!(
        summary = %artifacts.summary.display(),
        markdown = %artifacts.markdown.display(),
        csv = %artifacts.csv.display(),
        "Report artifacts written"
    );

    if let Err(e) = target.stop().await {
        warn!(error = %e, "Failed to stop target service");
    }

    Ok(summary)
}

fn install_metrics_exporter(metrics: &MetricsConfig) -> Result<()> {
    let listen_addr: SocketAddr = metrics
        .listen_addr
        .parse()
        .context("Invalid metrics listen address")?;

    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(listen_addr)
        .install()
        .context("Failed to install Prometheus exporter")?;

    info!(metrics_addr = %listen_addr, "Prometheus metrics server started");
    Ok(())
}
