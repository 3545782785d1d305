use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;

use crate::error::{Result, StressError};

/// Main configuration for a stress run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StressConfig {
    /// Service under test
    pub target: TargetConfig,
    /// Load scenarios run in order
    pub scenarios: Vec<ScenarioConfig>,
    /// Randomised behaviour and failure-injection rates
    pub behavior: BehaviorConfig,
    /// Simultaneous interaction scenarios
    pub interaction: InteractionConfig,
    /// Multi-tab polling simulation
    pub polling: PollingConfig,
    /// Pass/fail limits applied to every load scenario
    pub thresholds: Thresholds,
    /// Report output
    pub output: OutputConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Metrics exporter
    pub metrics: MetricsConfig,
}

/// Service under test and how to bring it up
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// Base URL every endpoint path is joined onto
    pub base_url: String,
    /// Command run once before the test (e.g. `["npm", "run", "build"]`)
    pub build_command: Option<Vec<String>>,
    /// Long-running command that serves the target, killed when the run ends
    pub start_command: Option<Vec<String>>,
    /// Maximum wait for the target to answer 200 OK
    pub startup_timeout_secs: u64,
    /// Interval between readiness checks
    pub readiness_poll_interval_ms: u64,
    /// Per-request timeout for synthetic traffic
    pub request_timeout_secs: u64,
}

/// A named load scenario
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub concurrent_users: usize,
    pub requests_per_user: u64,
    pub duration_ms: u64,
    pub ramp_up_ms: u64,
    pub endpoints: Vec<String>,
    pub payload_size: Option<usize>,
}

/// Input of a single load test run, immutable once the run starts
#[derive(Debug, Clone, PartialEq)]
pub struct LoadTestConfig {
    pub concurrent_users: usize,
    pub requests_per_user: u64,
    /// Total wall-clock budget
    pub duration: Duration,
    /// Window over which user starts are staggered
    pub ramp_up: Duration,
    /// Paths cycled round-robin by each user
    pub endpoints: Vec<String>,
    /// Synthetic POST body size in bytes
    pub payload_size: Option<usize>,
}

/// Probabilities and timing ranges used to randomise synthetic behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Share of load requests sent as GET, the rest are POST
    pub get_probability: f64,
    /// Upper bound of the think-time between a user's requests
    pub think_time_max_ms: u64,
    pub poll_vote_conflict_rate: f64,
    pub session_join_conflict_rate: f64,
    pub connection_request_failure_rate: f64,
    pub profile_view_failure_rate: f64,
    pub search_failure_rate: f64,
    /// Simulated latency range for interaction attempts
    pub interaction_latency_min_ms: u64,
    pub interaction_latency_max_ms: u64,
}

/// Simultaneous interaction scenarios
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionConfig {
    pub enabled: bool,
    /// Attempts launched at once for each scenario
    pub users: usize,
}

/// Multi-tab polling simulation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub enabled: bool,
    pub tabs: usize,
    pub duration_ms: u64,
    /// Path polled on the target
    pub path: String,
    /// Chance a tab stays active after each poll
    pub active_probability: f64,
    pub active_interval_ms: u64,
    pub idle_interval_ms: u64,
    /// Random delay added to each interval
    pub jitter_max_ms: u64,
}

/// Limits a load scenario must stay within to pass
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    /// Maximum error rate in percent
    pub error_rate: f64,
    /// Maximum average response time in milliseconds
    pub avg_response_time: f64,
    /// Maximum p95 response time in milliseconds
    pub p95_response_time: f64,
    /// Exit non-zero when any scenario breaches a threshold
    pub fail_on_breach: bool,
}

/// Report output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    pub level: String,
    /// "text" or "json"
    pub format: String,
}

/// Prometheus exporter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub listen_addr: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            target: TargetConfig::default(),
            scenarios: default_scenarios(),
            behavior: BehaviorConfig::default(),
            interaction: InteractionConfig::default(),
            polling: PollingConfig::default(),
            thresholds: Thresholds::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            build_command: None,
            start_command: None,
            startup_timeout_secs: 30,
            readiness_poll_interval_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self {
            get_probability: 0.8,
            think_time_max_ms: 1000,
            poll_vote_conflict_rate: 0.05,
            session_join_conflict_rate: 0.10,
            connection_request_failure_rate: 0.03,
            profile_view_failure_rate: 0.02,
            search_failure_rate: 0.02,
            interaction_latency_min_ms: 20,
            interaction_latency_max_ms: 250,
        }
    }
}

impl Default for InteractionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            users: 50,
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tabs: 10,
            duration_ms: 120_000,
            path: "/api/polls/active".to_string(),
            active_probability: 0.7,
            active_interval_ms: 30_000,
            idle_interval_ms: 120_000,
            jitter_max_ms: 5_000,
        }
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            error_rate: 5.0,
            avg_response_time: 1000.0,
            p95_response_time: 2000.0,
            fail_on_breach: true,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: "stress-test-results".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "surge=info,surge_engine=info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1:9090".to_string(),
        }
    }
}

impl ScenarioConfig {
    /// Build the immutable run input for this scenario
    pub fn load_config(&self) -> LoadTestConfig {
        LoadTestConfig {
            concurrent_users: self.concurrent_users,
            requests_per_user: self.requests_per_user,
            duration: Duration::from_millis(self.duration_ms),
            ramp_up: Duration::from_millis(self.ramp_up_ms),
            endpoints: self.endpoints.clone(),
            payload_size: self.payload_size,
        }
    }
}

impl LoadTestConfig {
    /// Reject configurations that cannot drive a run
    pub fn validate(&self) -> Result<()> {
        if self.concurrent_users == 0 {
            return Err(StressError::Config(
                "concurrent_users must be greater than 0".to_string(),
            ));
        }
        if self.requests_per_user == 0 {
            return Err(StressError::Config(
                "requests_per_user must be greater than 0".to_string(),
            ));
        }
        if self.endpoints.is_empty() {
            return Err(StressError::Config(
                "endpoint list cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl StressConfig {
    /// Load configuration from file, then `SURGE_`-prefixed environment variables
    ///
    /// Nested keys use a double underscore: `SURGE_TARGET__BASE_URL`.
    pub fn from_file(path: &str) -> Result<Self> {
        Self::load(path, true)
    }

    /// Like `from_file`, but a missing file is skipped when `required` is false.
    ///
    /// Environment overrides still apply on top of the defaults, and a file that
    /// exists but cannot be parsed is always an error.
    pub fn load(path: &str, required: bool) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(required))
            .add_source(
                config::Environment::with_prefix("SURGE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;
        Ok(())
    }

    /// Apply the CLI flag overrides on top of file and environment values
    pub fn apply_overrides(
        &mut self,
        users: Option<usize>,
        duration_secs: Option<u64>,
        base_url: Option<String>,
    ) {
        if let Some(users) = users {
            for scenario in &mut self.scenarios {
                scenario.concurrent_users = users;
            }
            self.interaction.users = users;
        }

        if let Some(secs) = duration_secs {
            for scenario in &mut self.scenarios {
                scenario.duration_ms = secs.saturating_mul(1000);
            }
        }

        if let Some(url) = base_url {
            self.target.base_url = url;
        }

        info!(
            base_url = %self.target.base_url,
            scenarios = self.scenarios.len(),
            "Applied command line overrides"
        );
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.target.base_url.trim().is_empty() {
            return Err(StressError::Config("target base_url cannot be empty".to_string()));
        }

        if self.scenarios.is_empty() {
            return Err(StressError::Config(
                "at least one scenario must be configured".to_string(),
            ));
        }

        for scenario in &self.scenarios {
            scenario
                .load_config()
                .validate()
                .map_err(|e| StressError::Config(format!("scenario '{}': {}", scenario.name, e)))?;
        }

        let probabilities = [
            ("get_probability", self.behavior.get_probability),
            ("poll_vote_conflict_rate", self.behavior.poll_vote_conflict_rate),
            ("session_join_conflict_rate", self.behavior.session_join_conflict_rate),
            (
                "connection_request_failure_rate",
                self.behavior.connection_request_failure_rate,
            ),
            ("profile_view_failure_rate", self.behavior.profile_view_failure_rate),
            ("search_failure_rate", self.behavior.search_failure_rate),
            ("active_probability", self.polling.active_probability),
        ];
        for (name, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(StressError::Config(format!(
                    "{} must be within [0, 1], got {}",
                    name, value
                )));
            }
        }

        if self.behavior.interaction_latency_min_ms > self.behavior.interaction_latency_max_ms {
            return Err(StressError::Config(
                "interaction latency min cannot exceed max".to_string(),
            ));
        }

        if self.interaction.enabled && self.interaction.users == 0 {
            return Err(StressError::Config(
                "interaction users must be greater than 0".to_string(),
            ));
        }

        if self.polling.enabled && self.polling.tabs == 0 {
            return Err(StressError::Config("polling tabs must be greater than 0".to_string()));
        }

        Ok(())
    }

    /// Connection and request timeout for synthetic traffic
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.target.request_timeout_secs)
    }
}

/// Scenarios used when no configuration file provides any
pub fn default_scenarios() -> Vec<ScenarioConfig> {
    vec![
        ScenarioConfig {
            name: "baseline".to_string(),
            concurrent_users: 10,
            requests_per_user: 20,
            duration_ms: 30_000,
            ramp_up_ms: 5_000,
            endpoints: vec!["/".to_string(), "/api/polls".to_string()],
            payload_size: None,
        },
        ScenarioConfig {
            name: "peak".to_string(),
            concurrent_users: 50,
            requests_per_user: 40,
            duration_ms: 60_000,
            ramp_up_ms: 10_000,
            endpoints: vec![
                "/api/polls".to_string(),
                "/api/sessions".to_string(),
                "/api/networking/profiles".to_string(),
            ],
            payload_size: Some(512),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> StressConfig {
        StressConfig::default()
    }

    #[test]
    fn test_default_with_scenarios_is_valid() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_empty_scenarios_rejected() {
        let mut config = StressConfig::default();
        config.scenarios.clear();
        assert!(matches!(config.validate(), Err(StressError::Config(_))));
    }

    #[test]
    fn test_empty_endpoints_rejected() {
        let mut config = valid_config();
        config.scenarios[0].endpoints.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("endpoint list cannot be empty"));
    }

    #[test]
    fn test_probability_out_of_range_rejected() {
        let mut config = valid_config();
        config.behavior.session_join_conflict_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides_apply_to_every_scenario() {
        let mut config = valid_config();
        config.apply_overrides(Some(3), Some(7), Some("http://localhost:4000".to_string()));

        assert!(config.scenarios.iter().all(|s| s.concurrent_users == 3));
        assert!(config.scenarios.iter().all(|s| s.duration_ms == 7000));
        assert_eq!(config.interaction.users, 3);
        assert_eq!(config.target.base_url, "http://localhost:4000");
    }

    #[test]
    fn test_huge_duration_override_saturates() {
        let mut config = valid_config();
        config.apply_overrides(None, Some(u64::MAX), None);
        assert!(config.scenarios.iter().all(|s| s.duration_ms == u64::MAX));
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[target\nbase_url = \"http://127.0.0.1:1\"\n").unwrap();
        let base = dir.path().join("broken");

        assert!(matches!(
            StressConfig::load(base.to_str().unwrap(), false),
            Err(StressError::Config(_))
        ));
    }

    #[test]
    fn test_missing_required_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("absent");
        assert!(StressConfig::load(base.to_str().unwrap(), true).is_err());
    }

    #[test]
    fn test_missing_optional_file_keeps_env_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("absent");
        std::env::set_var("SURGE_OUTPUT__DIRECTORY", "env-results");

        let loaded = StressConfig::load(base.to_str().unwrap(), false);
        std::env::remove_var("SURGE_OUTPUT__DIRECTORY");

        let loaded = loaded.unwrap();
        assert_eq!(loaded.output.directory, "env-results");
        assert_eq!(loaded.scenarios.len(), 2);
    }

    #[test]
    fn test_load_config_conversion() {
        let scenario = &default_scenarios()[1];
        let load = scenario.load_config();
        assert_eq!(load.duration, Duration::from_secs(60));
        assert_eq!(load.ramp_up, Duration::from_secs(10));
        assert_eq!(load.payload_size, Some(512));
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("surge.toml");
        let config = valid_config();
        config.save_to_file(path.to_str().unwrap()).unwrap();

        let loaded = StressConfig::from_file(path.to_str().unwrap()).unwrap();
        assert_eq!(loaded.scenarios.len(), 2);
        assert_eq!(loaded.thresholds.error_rate, 5.0);
    }
}
