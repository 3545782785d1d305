//! Threshold verdicts and the report files written after a run.
//!
//! Reports are produced from a finished [`RunSummary`]; nothing here touches
//! the network or the run itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use surge_common::{LoadTestResult, PollingSummary, ScenarioSummary};
use tracing::info;
use uuid::Uuid;

use crate::config::{ScenarioConfig, Thresholds};
use crate::error::{Result, StressError};

pub const SUMMARY_FILE: &str = "summary.json";
pub const MARKDOWN_FILE: &str = "stress-test-report.md";
pub const CSV_FILE: &str = "metrics.csv";

/// Pass/fail of one scenario against the configured limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdReport {
    pub error_rate_passed: bool,
    pub avg_response_time_passed: bool,
    pub p95_response_time_passed: bool,
    pub passed: bool,
}

impl ThresholdReport {
    /// A metric passes when it is at or below its limit
    pub fn evaluate(result: &LoadTestResult, thresholds: &Thresholds) -> Self {
        let error_rate_passed = result.error_rate <= thresholds.error_rate;
        let avg_response_time_passed = result.average_response_time <= thresholds.avg_response_time;
        let p95_response_time_passed = result.p95_response_time <= thresholds.p95_response_time;

        Self {
            error_rate_passed,
            avg_response_time_passed,
            p95_response_time_passed,
            passed: error_rate_passed && avg_response_time_passed && p95_response_time_passed,
        }
    }
}

/// One executed load scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub name: String,
    pub config: ScenarioConfig,
    pub result: LoadTestResult,
    pub thresholds: ThresholdReport,
}

impl ScenarioReport {
    pub fn new(config: ScenarioConfig, result: LoadTestResult, thresholds: &Thresholds) -> Self {
        let verdict = ThresholdReport::evaluate(&result, thresholds);
        Self {
            name: config.name.clone(),
            config,
            result,
            thresholds: verdict,
        }
    }
}

/// Everything a run produced, in the shape written to `summary.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub base_url: String,
    pub thresholds: Thresholds,
    pub scenarios: Vec<ScenarioReport>,
    pub interaction: Option<Vec<ScenarioSummary>>,
    pub polling: Option<PollingSummary>,
}

impl RunSummary {
    pub fn new(base_url: impl Into<String>, thresholds: Thresholds) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            base_url: base_url.into(),
            thresholds,
            scenarios: Vec::new(),
            interaction: None,
            polling: None,
        }
    }

    pub fn push_scenario(&mut self, config: ScenarioConfig, result: LoadTestResult) -> &ScenarioReport {
        let index = self.scenarios.len();
        self.scenarios
            .push(ScenarioReport::new(config, result, &self.thresholds));
        &self.scenarios[index]
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// True when every scenario met every threshold
    pub fn passed(&self) -> bool {
        self.scenarios.iter().all(|s| s.thresholds.passed)
    }

    pub fn failed_scenarios(&self) -> Vec<&str> {
        self.scenarios
            .iter()
            .filter(|s| !s.thresholds.passed)
            .map(|s| s.name.as_str())
            .collect()
    }
}

/// Paths of the files written by [`ReportGenerator::write_all`]
#[derive(Debug, Clone)]
pub struct ReportArtifacts {
    pub summary: PathBuf,
    pub markdown: PathBuf,
    pub csv: PathBuf,
}

/// One row of `metrics.csv`
#[derive(Debug, Serialize)]
struct MetricsRow<'a> {
    scenario: &'a str,
    concurrent_users: usize,
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    average_response_time_ms: f64,
    min_response_time_ms: f64,
    max_response_time_ms: f64,
    p95_response_time_ms: f64,
    p99_response_time_ms: f64,
    requests_per_second: f64,
    error_rate_percent: f64,
    throughput_bytes_per_sec: f64,
    cache_hits: u64,
    cache_misses: u64,
    peak_memory_bytes: u64,
    passed: bool,
}

pub struct ReportGenerator;

impl ReportGenerator {
    /// Write the JSON summary, the Markdown report and the CSV metrics into `dir`
    pub fn write_all(dir: impl AsRef<Path>, summary: &RunSummary) -> Result<ReportArtifacts> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let artifacts = ReportArtifacts {
            summary: dir.join(SUMMARY_FILE),
            markdown: dir.join(MARKDOWN_FILE),
            csv: dir.join(CSV_FILE),
        };

        fs::write(&artifacts.summary, serde_json::to_string_pretty(summary)?)?;
        fs::write(&artifacts.markdown, Self::render_markdown(summary)?)?;
        Self::write_csv(&artifacts.csv, summary)?;

        info!(
            run_id = %summary.run_id,
            directory = %dir.display(),
            "Reports written"
        );
        Ok(artifacts)
    }

    fn write_csv(path: &Path, summary: &RunSummary) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        for scenario in &summary.scenarios {
            let r = &scenario.result;
            writer.serialize(MetricsRow {
                scenario: &scenario.name,
                concurrent_users: r.concurrent_users,
                total_requests: r.total_requests,
                successful_requests: r.successful_requests,
                failed_requests: r.failed_requests,
                average_response_time_ms: r.average_response_time,
                min_response_time_ms: r.min_response_time,
                max_response_time_ms: r.max_response_time,
                p95_response_time_ms: r.p95_response_time,
                p99_response_time_ms: r.p99_response_time,
                requests_per_second: r.requests_per_second,
                error_rate_percent: r.error_rate,
                throughput_bytes_per_sec: r.throughput,
                cache_hits: r.network_stats.cache_hits,
                cache_misses: r.network_stats.cache_misses,
                peak_memory_bytes: r.memory_usage.peak,
                passed: scenario.thresholds.passed,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Human-readable report
    pub fn render_markdown(summary: &RunSummary) -> Result<String> {
        Self::markdown(summary)
            .map_err(|e| StressError::Report(format!("failed to render markdown: {}", e)))
    }

    fn markdown(summary: &RunSummary) -> std::result::Result<String, std::fmt::Error> {
        let mut out = String::new();
        let verdict = if summary.passed() { "PASSED" } else { "FAILED" };

        writeln!(out, "# Stress Test Report")?;
        writeln!(out)?;
        writeln!(out, "- Run: `{}`", summary.run_id)?;
        writeln!(out, "- Target: {}", summary.base_url)?;
        writeln!(out, "- Started: {}", summary.started_at.to_rfc3339())?;
        if let Some(finished) = summary.finished_at {
            writeln!(out, "- Finished: {}", finished.to_rfc3339())?;
        }
        writeln!(out, "- Overall: **{}**", verdict)?;
        writeln!(out)?;

        let t = &summary.thresholds;
        writeln!(out, "## Thresholds")?;
        writeln!(out)?;
        writeln!(out, "| Metric | Limit |")?;
        writeln!(out, "|---|---|")?;
        writeln!(out, "| Error rate | {:.2}% |", t.error_rate)?;
        writeln!(out, "| Avg response time | {:.0} ms |", t.avg_response_time)?;
        writeln!(out, "| P95 response time | {:.0} ms |", t.p95_response_time)?;
        writeln!(out)?;

        writeln!(out, "## Load Scenarios")?;
        writeln!(out)?;
        writeln!(
            out,
            "| Scenario | Users | Requests | Failed | Error rate | Avg (ms) | P95 (ms) | P99 (ms) | RPS | Result |"
        )?;
        writeln!(out, "|---|---|---|---|---|---|---|---|---|---|")?;
        for scenario in &summary.scenarios {
            let r = &scenario.result;
            writeln!(
                out,
                "| {} | {} | {} | {} | {:.2}% | {:.1} | {:.1} | {:.1} | {:.1} | {} |",
                scenario.name,
                r.concurrent_users,
                r.total_requests,
                r.failed_requests,
                r.error_rate,
                r.average_response_time,
                r.p95_response_time,
                r.p99_response_time,
                r.requests_per_second,
                if scenario.thresholds.passed { "pass" } else { "fail" }
            )?;
        }
        writeln!(out)?;

        for scenario in summary.scenarios.iter().filter(|s| !s.thresholds.passed) {
            let v = &scenario.thresholds;
            let mut breaches = Vec::new();
            if !v.error_rate_passed {
                breaches.push("error rate");
            }
            if !v.avg_response_time_passed {
                breaches.push("average response time");
            }
            if !v.p95_response_time_passed {
                breaches.push("p95 response time");
            }
            writeln!(out, "- `{}` exceeded: {}", scenario.name, breaches.join(", "))?;
        }

        if let Some(interaction) = &summary.interaction {
            writeln!(out)?;
            writeln!(out, "## Concurrent Interactions")?;
            writeln!(out)?;
            writeln!(out, "| Scenario | Attempts | Successful | Failed | Success rate | Avg (ms) | Min (ms) | Max (ms) |")?;
            writeln!(out, "|---|---|---|---|---|---|---|---|")?;
            for s in interaction {
                writeln!(
                    out,
                    "| {} | {} | {} | {} | {:.1}% | {:.1} | {:.1} | {:.1} |",
                    s.test_name,
                    s.total_tests,
                    s.successful,
                    s.failed,
                    s.success_rate,
                    s.average_duration,
                    s.min_duration,
                    s.max_duration
                )?;
            }
        }

        if let Some(polling) = &summary.polling {
            writeln!(out)?;
            writeln!(out, "## Multi-Tab Polling")?;
            writeln!(out)?;
            writeln!(out, "- Tabs: {}", polling.total_tabs)?;
            writeln!(out, "- Polls: {} ({} failed)", polling.total_requests, polling.failed_requests)?;
            writeln!(out, "- Polls per tab: {:.2}", polling.average_requests_per_tab)?;
            writeln!(out, "- Avg poll time: {:.1} ms", polling.average_response_time)?;
            writeln!(out, "- Efficiency: {:.3}", polling.efficiency)?;
        }

        Ok(out)
    }
}
