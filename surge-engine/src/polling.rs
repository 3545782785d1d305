use metrics::counter;
use rand::Rng;
use reqwest::Client;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_common::{PollingSummary, TabPollingState};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::clock::{duration_ms, timed};
use crate::config::PollingConfig;
use crate::error::{Result, StressError};

/// What a tab polls
#[derive(Debug, Clone)]
pub enum PollTarget {
    /// Real GET against the target service
    Http { client: Client, url: String },
    /// Sleep for a random latency and fail with the given probability
    Simulated {
        min_latency: Duration,
        max_latency: Duration,
        failure_rate: f64,
    },
}

impl PollTarget {
    pub fn http(base_url: &str, path: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(PollTarget::Http {
            client,
            url: format!("{}{}", base_url.trim_end_matches('/'), path),
        })
    }

    pub fn simulated(min_latency: Duration, max_latency: Duration) -> Self {
        PollTarget::Simulated {
            min_latency,
            max_latency,
            failure_rate: 0.0,
        }
    }

    async fn poll(&self) -> std::result::Result<(), String> {
        match self {
            PollTarget::Http { client, url } => {
                let response = client.get(url).send().await.map_err(|e| e.to_string())?;
                let status = response.status();
                // Drain the body so the timing covers the full transfer
                if let Err(e) = response.bytes().await {
                    debug!(url = %url, error = %e, "Failed to read poll response body");
                }
                if status.is_success() {
                    Ok(())
                } else {
                    Err(format!("poll returned status {}", status.as_u16()))
                }
            }
            PollTarget::Simulated {
                min_latency,
                max_latency,
                failure_rate,
            } => {
                let (latency, fail) = {
                    let mut rng = rand::thread_rng();
                    let min = min_latency.as_millis() as u64;
                    let max = (max_latency.as_millis() as u64).max(min);
                    (
                        Duration::from_millis(rng.gen_range(min..=max)),
                        rng.gen_bool(failure_rate.clamp(0.0, 1.0)),
                    )
                };
                sleep(latency).await;
                if fail {
                    Err("simulated poll failure".to_string())
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// Delay before a tab's next poll and whether the tab was active
pub fn next_poll_interval<R: Rng>(config: &PollingConfig, rng: &mut R) -> (bool, Duration) {
    let active = rng.gen_bool(config.active_probability.clamp(0.0, 1.0));
    let base = if active {
        config.active_interval_ms
    } else {
        config.idle_interval_ms
    };
    let jitter = if config.jitter_max_ms > 0 {
        rng.gen_range(0..=config.jitter_max_ms)
    } else {
        0
    };
    (active, Duration::from_millis(base + jitter))
}

/// Reduce per-tab state into the run summary
pub fn summarize_tabs(tabs: &[TabPollingState], duration: Duration) -> PollingSummary {
    let total_tabs = tabs.len();
    let total_requests: u64 = tabs.iter().map(|t| t.request_count).sum();
    let failed_requests: u64 = tabs.iter().map(|t| t.failed_count).sum();

    let samples: Vec<f64> = tabs
        .iter()
        .flat_map(|t| t.response_times.iter().copied())
        .collect();
    let average_response_time = if samples.is_empty() {
        0.0
    } else {
        samples.iter().sum::<f64>() / samples.len() as f64
    };

    let average_requests_per_tab = if total_tabs > 0 {
        total_requests as f64 / total_tabs as f64
    } else {
        0.0
    };

    let efficiency = if average_response_time > 0.0 {
        (1000.0 / average_response_time) * average_requests_per_tab
    } else {
        0.0
    };

    PollingSummary {
        total_tabs,
        total_requests,
        failed_requests,
        average_requests_per_tab,
        average_response_time,
        efficiency,
        duration: duration_ms(duration),
    }
}

/// Simulates many long-lived tabs, each polling on its own adaptive interval.
///
/// Tabs run as tasks owned by the tester. `cleanup` (also run on drop) cancels
/// them so nothing keeps polling after the tester is gone.
#[derive(Debug)]
pub struct PollingEfficiencyTester {
    config: Arc<PollingConfig>,
    target: Arc<PollTarget>,
    cancel: CancellationToken,
    tabs: JoinSet<TabPollingState>,
    duration: Duration,
    requests_issued: Arc<AtomicU64>,
}

impl PollingEfficiencyTester {
    pub fn new(config: PollingConfig, target: PollTarget) -> Self {
        Self {
            config: Arc::new(config),
            target: Arc::new(target),
            cancel: CancellationToken::new(),
            tabs: JoinSet::new(),
            duration: Duration::ZERO,
            requests_issued: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Polls issued by every tab since the tester was created
    pub fn requests_issued(&self) -> u64 {
        self.requests_issued.load(Ordering::Relaxed)
    }

    /// Tabs started and not yet collected
    pub fn active_tabs(&self) -> usize {
        self.tabs.len()
    }

    /// Spawn `tab_count` polling tabs that stop on their own after `duration`
    pub fn start(&mut self, tab_count: usize, duration: Duration) -> Result<()> {
        if tab_count == 0 {
            return Err(StressError::Config("tab count must be greater than 0".to_string()));
        }
        if !self.tabs.is_empty() {
            return Err(StressError::InvalidState(
                "polling tabs are already running".to_string(),
            ));
        }

        self.cancel = CancellationToken::new();
        self.duration = duration;

        info!(
            tabs = tab_count,
            duration_ms = duration.as_millis() as u64,
            "Starting multi-tab polling"
        );

        for tab_id in 0..tab_count {
            let tab = TabLoop {
                tab_id,
                duration,
                config: Arc::clone(&self.config),
                target: Arc::clone(&self.target),
                cancel: self.cancel.clone(),
                requests_issued: Arc::clone(&self.requests_issued),
            };
            self.tabs.spawn(tab.run());
        }

        Ok(())
    }

    /// Wait for every tab to stop and summarise them
    pub async fn wait(&mut self) -> PollingSummary {
        let mut states = Vec::with_capacity(self.tabs.len());
        while let Some(joined) = self.tabs.join_next().await {
            match joined {
                Ok(state) => states.push(state),
                Err(e) if e.is_cancelled() => debug!("Polling tab cancelled"),
                Err(e) => warn!(error = %e, "Polling tab failed"),
            }
        }
        states.sort_by_key(|s| s.tab_id);

        let summary = summarize_tabs(&states, self.duration);
        info!(
            tabs = summary.total_tabs,
            total_requests = summary.total_requests,
            avg_response_ms = summary.average_response_time,
            efficiency = summary.efficiency,
            "Multi-tab polling finished"
        );
        summary
    }

    /// Run `tab_count` tabs for `duration` and return their summary
    #[instrument(skip(self))]
    pub async fn test_multi_tab_polling(
        &mut self,
        tab_count: usize,
        duration: Duration,
    ) -> Result<PollingSummary> {
        self.start(tab_count, duration)?;
        Ok(self.wait().await)
    }

    /// Cancel every pending poll and drop outstanding tabs
    pub fn cleanup(&mut self) {
        self.cancel.cancel();
        if !self.tabs.is_empty() {
            debug!(tabs = self.tabs.len(), "Aborting outstanding polling tabs");
        }
        self.tabs.abort_all();
        drop(std::mem::take(&mut self.tabs));
    }
}

impl Drop for PollingEfficiencyTester {
    fn drop(&mut self) {
        self.cleanup();
    }
}

/// State moved into one tab task; only this task mutates its `TabPollingState`
struct TabLoop {
    tab_id: usize,
    duration: Duration,
    config: Arc<PollingConfig>,
    target: Arc<PollTarget>,
    cancel: CancellationToken,
    requests_issued: Arc<AtomicU64>,
}

impl TabLoop {
    async fn run(self) -> TabPollingState {
        let deadline = Instant::now() + self.duration;
        let mut state = TabPollingState::new(self.tab_id);

        while !self.cancel.is_cancelled() && Instant::now() < deadline {
            let (outcome, response_time) = tokio::select! {
                _ = self.cancel.cancelled() => break,
                polled = timed(self.target.poll()) => polled,
            };

            self.requests_issued.fetch_add(1, Ordering::Relaxed);
            counter!("surge_polls_total", 1);

            match outcome {
                Ok(()) => state.record(response_time),
                Err(e) => {
                    warn!(tab_id = self.tab_id, error = %e, "Poll failed, tab keeps polling");
                    state.record_failure(response_time);
                }
            }

            let (active, interval) = next_poll_interval(&self.config, &mut rand::thread_rng());
            let wait = interval.min(deadline.saturating_duration_since(Instant::now()));
            debug!(
                tab_id = self.tab_id,
                active,
                next_poll_ms = wait.as_millis() as u64,
                "Scheduled next poll"
            );

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(wait) => {}
            }
        }

        state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn fast_target() -> PollTarget {
        PollTarget::simulated(Duration::from_millis(10), Duration::from_millis(40))
    }

    #[test]
    fn test_interval_ranges() {
        let config = PollingConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let (active, interval) = next_poll_interval(&config, &mut rng);
            let base = if active { 30_000 } else { 120_000 };
            assert!(interval >= Duration::from_millis(base));
            assert!(interval <= Duration::from_millis(base + 5_000));
        }
    }

    #[test]
    fn test_always_active_without_jitter() {
        let config = PollingConfig {
            active_probability: 1.0,
            jitter_max_ms: 0,
            ..Default::default()
        };
        let mut rng = StdRng::seed_from_u64(1);
        assert_eq!(
            next_poll_interval(&config, &mut rng),
            (true, Duration::from_millis(30_000))
        );
    }

    #[test]
    fn test_summary_efficiency() {
        let mut a = TabPollingState::new(0);
        a.record(100.0);
        a.record(100.0);
        let mut b = TabPollingState::new(1);
        b.record_failure(100.0);
        b.record(100.0);

        let summary = summarize_tabs(&[a, b], Duration::from_secs(60));
        assert_eq!(summary.total_tabs, 2);
        assert_eq!(summary.total_requests, 4);
        assert_eq!(summary.failed_requests, 1);
        assert_eq!(summary.average_requests_per_tab, 2.0);
        assert_eq!(summary.average_response_time, 100.0);
        assert_eq!(summary.efficiency, 20.0);
    }

    #[test]
    fn test_summary_of_nothing_is_zero() {
        let summary = summarize_tabs(&[], Duration::from_secs(1));
        assert_eq!(summary.total_requests, 0);
        assert_eq!(summary.efficiency, 0.0);
        assert_eq!(summary.average_response_time, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_multi_tab_polling_resolves_at_duration() {
        let mut tester = PollingEfficiencyTester::new(PollingConfig::default(), fast_target());
        let started = Instant::now();

        let summary = tester
            .test_multi_tab_polling(2, Duration::from_millis(1000))
            .await
            .unwrap();

        assert_eq!(summary.total_tabs, 2);
        // One poll each before the first 30s+ interval is cut to the deadline
        assert_eq!(summary.total_requests, 2);
        assert!(started.elapsed() <= Duration::from_millis(1100));
        assert_eq!(tester.active_tabs(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_do_not_stop_tab() {
        let target = PollTarget::Simulated {
            min_latency: Duration::from_millis(5),
            max_latency: Duration::from_millis(5),
            failure_rate: 1.0,
        };
        let config = PollingConfig {
            active_probability: 1.0,
            active_interval_ms: 100,
            jitter_max_ms: 0,
            ..Default::default()
        };
        let mut tester = PollingEfficiencyTester::new(config, target);
        let summary = tester
            .test_multi_tab_polling(1, Duration::from_millis(1000))
            .await
            .unwrap();

        assert!(summary.total_requests > 1);
        assert_eq!(summary.failed_requests, summary.total_requests);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_stops_all_polling() {
        let config = PollingConfig {
            active_probability: 1.0,
            active_interval_ms: 1_000,
            jitter_max_ms: 0,
            ..Default::default()
        };
        let mut tester = PollingEfficiencyTester::new(config, fast_target());
        tester.start(3, Duration::from_secs(600)).unwrap();

        sleep(Duration::from_secs(10)).await;
        assert!(tester.requests_issued() > 0);

        tester.cleanup();
        assert_eq!(tester.active_tabs(), 0);
        let issued = tester.requests_issued();

        sleep(Duration::from_secs(120)).await;
        assert_eq!(tester.requests_issued(), issued);
    }

    #[tokio::test]
    async fn test_http_poll_reports_status() {
        let (addr, _handle) = crate::origin::spawn("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let base = format!("http://{}", addr);

        let healthy = PollTarget::http(&base, "/health", Duration::from_secs(5)).unwrap();
        assert_eq!(healthy.poll().await, Ok(()));

        let failing = PollTarget::http(&base, "/api/fail", Duration::from_secs(5)).unwrap();
        assert_eq!(
            failing.poll().await,
            Err("poll returned status 500".to_string())
        );
    }

    #[tokio::test]
    async fn test_zero_tabs_rejected() {
        let mut tester = PollingEfficiencyTester::new(PollingConfig::default(), fast_target());
        assert!(matches!(
            tester.test_multi_tab_polling(0, Duration::from_secs(1)).await,
            Err(StressError::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_rejected() {
        let mut tester = PollingEfficiencyTester::new(PollingConfig::default(), fast_target());
        tester.start(1, Duration::from_secs(5)).unwrap();
        assert!(matches!(
            tester.start(1, Duration::from_secs(5)),
            Err(StressError::InvalidState(_))
        ));
        tester.cleanup();
    }
}
