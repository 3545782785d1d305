use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::config::StressConfig;
use crate::error::Result;
use crate::executor::RequestExecutor;
use crate::interaction::ConcurrentInteractionTester;
use crate::polling::{PollTarget, PollingEfficiencyTester};
use crate::report::RunSummary;
use crate::scheduler::VirtualUserScheduler;

/// Drives every configured phase of a run against an already ready target
#[derive(Debug, Clone)]
pub struct StressRunner {
    config: StressConfig,
}

impl StressRunner {
    pub fn new(config: StressConfig) -> Self {
        Self { config }
    }

    /// Load scenarios in order, then interaction and polling phases when enabled
    #[instrument(name = "stress_run", skip(self), fields(base_url = %self.config.target.base_url))]
    pub async fn run(&self) -> Result<RunSummary> {
        let config = &self.config;
        let mut summary = RunSummary::new(&config.target.base_url, config.thresholds.clone());
        info!(run_id = %summary.run_id, scenarios = config.scenarios.len(), "Stress run started");

        for scenario in &config.scenarios {
            let load = scenario.load_config();
            let executor = RequestExecutor::new(
                &config.target.base_url,
                config.request_timeout(),
                config.behavior.get_probability,
                load.payload_size,
            )?;
            let scheduler = VirtualUserScheduler::new(
                executor,
                Duration::from_millis(config.behavior.think_time_max_ms),
            );

            info!(scenario = %scenario.name, users = load.concurrent_users, "Running load scenario");
            let result = scheduler.run_load_test(&load).await?;
            let report = summary.push_scenario(scenario.clone(), result);
            if !report.thresholds.passed {
                warn!(scenario = %report.name, "Scenario exceeded its thresholds");
            }
        }

        if config.interaction.enabled {
            let users = config.interaction.users;
            let mut tester = ConcurrentInteractionTester::new(config.behavior.clone());
            tester.test_concurrent_poll_voting(users).await;
            tester.test_concurrent_session_joins(users).await;
            tester.test_concurrent_networking_actions(users).await;
            summary.interaction = Some(tester.generate_summary());
        }

        if config.polling.enabled {
            let target = PollTarget::http(
                &config.target.base_url,
                &config.polling.path,
                config.request_timeout(),
            )?;
            let mut tester = PollingEfficiencyTester::new(config.polling.clone(), target);
            let polling = tester
                .test_multi_tab_polling(
                    config.polling.tabs,
                    Duration::from_millis(config.polling.duration_ms),
                )
                .await;
            tester.cleanup();
            summary.polling = Some(polling?);
        }

        summary.finish();
        info!(
            run_id = %summary.run_id,
            passed = summary.passed(),
            "Stress run finished"
        );
        Ok(summary)
    }
}
