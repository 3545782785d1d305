// Surge Common - Shared result types between the load engine and its reports
// Plain data only: no async, no I/O

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method used by a synthetic request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a single HTTP attempt made by a virtual user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestResult {
    pub user_id: usize,
    /// Sequence number within the user
    pub request_id: u64,
    pub endpoint: String,
    pub method: HttpMethod,
    pub success: bool,
    pub status_code: Option<u16>,
    /// Milliseconds from dispatch to completion (or failure)
    pub response_time: f64,
    /// Bytes read from the response body, 0 when unreadable
    pub response_size: u64,
    /// Milliseconds since the test started
    pub timestamp: f64,
    pub from_cache: bool,
    /// Set when the attempt failed before a response was obtained
    pub error: Option<String>,
}

/// Process memory samples in bytes; all zero when the platform cannot report them
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryUsage {
    pub initial: u64,
    pub peak: u64,
    #[serde(rename = "final")]
    pub end: u64,
}

/// Transfer and cache statistics across every request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub total_bytes: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

/// Aggregate statistics for one load test run.
///
/// Latency fields are milliseconds over successful requests only and are
/// exactly `0.0` when nothing succeeded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadTestResult {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    pub p95_response_time: f64,
    pub p99_response_time: f64,
    pub requests_per_second: f64,
    /// Percentage of failed requests, 0-100
    pub error_rate: f64,
    /// Bytes per second
    pub throughput: f64,
    pub concurrent_users: usize,
    /// Actual elapsed milliseconds
    pub test_duration: f64,
    pub memory_usage: MemoryUsage,
    pub network_stats: NetworkStats,
}

/// Closed set of concurrent interaction scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScenarioKind {
    PollVoting,
    SessionJoin,
    NetworkingActions,
}

impl ScenarioKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScenarioKind::PollVoting => "poll-voting",
            ScenarioKind::SessionJoin => "session-join",
            ScenarioKind::NetworkingActions => "networking-actions",
        }
    }
}

impl fmt::Display for ScenarioKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one sub-action inside a networking bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubActionOutcome {
    pub success: bool,
    /// Milliseconds
    pub duration: f64,
    pub error: Option<String>,
}

/// Scenario-specific data attached to an interaction attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScenarioOutcome {
    PollVote {
        poll_id: String,
        option_index: usize,
        optimistic_update: bool,
    },
    SessionJoin {
        session_id: String,
        participant_id: String,
        optimistic_update: bool,
    },
    NetworkingBundle {
        connection_request: SubActionOutcome,
        profile_view: SubActionOutcome,
        search: SubActionOutcome,
    },
}

/// One simultaneous interaction attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcurrentTestResult {
    pub test_name: ScenarioKind,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Milliseconds, equal to `end_time - start_time`
    pub duration: f64,
    pub success: bool,
    pub error: Option<String>,
    pub metrics: Option<ScenarioOutcome>,
}

/// Per-scenario reduction of interaction attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub test_name: ScenarioKind,
    pub total_tests: u64,
    pub successful: u64,
    pub failed: u64,
    /// Percentage, 0-100
    pub success_rate: f64,
    pub average_duration: f64,
    pub min_duration: f64,
    pub max_duration: f64,
}

/// Polling history owned by a single simulated tab
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TabPollingState {
    pub tab_id: usize,
    pub request_count: u64,
    pub failed_count: u64,
    pub response_times: Vec<f64>,
}

impl TabPollingState {
    pub fn new(tab_id: usize) -> Self {
        Self {
            tab_id,
            ..Default::default()
        }
    }

    pub fn record(&mut self, response_time: f64) {
        self.request_count += 1;
        self.response_times.push(response_time);
    }

    pub fn record_failure(&mut self, response_time: f64) {
        self.failed_count += 1;
        self.record(response_time);
    }
}

/// Aggregate of every tab after polling has stopped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollingSummary {
    pub total_tabs: usize,
    pub total_requests: u64,
    pub failed_requests: u64,
    pub average_requests_per_tab: f64,
    pub average_response_time: f64,
    /// `(1000 / average_response_time) * average_requests_per_tab`, higher is better
    pub efficiency: f64,
    /// Milliseconds the tabs were asked to run
    pub duration: f64,
}
