//! Performance and concurrency tests for the surge engine
//!
//! These tests validate behaviour under heavier concurrency:
//! - Many virtual users against a local origin
//! - Simultaneous interaction attempts released by a barrier
//! - Long multi-tab polling runs on a paused clock

use std::time::Duration;

use surge_common::ScenarioKind;
use surge_engine::config::{BehaviorConfig, LoadTestConfig, PollingConfig};
use surge_engine::executor::RequestExecutor;
use surge_engine::interaction::ConcurrentInteractionTester;
use surge_engine::origin;
use surge_engine::polling::{PollTarget, PollingEfficiencyTester};
use surge_engine::scheduler::VirtualUserScheduler;

#[cfg(test)]
mod load_performance_tests {
    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_users_without_think_time() {
        let (addr, _handle) = origin::spawn("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let base_url = format!("http://{}", addr);

        let config = LoadTestConfig {
            concurrent_users: 25,
            requests_per_user: 8,
            duration: Duration::from_secs(30),
            ramp_up: Duration::from_millis(250),
            endpoints: vec!["/".to_string(), "/api/polls".to_string(), "/api/sessions".to_string()],
            payload_size: Some(256),
        };
        let executor = RequestExecutor::new(&base_url, Duration::from_secs(10), 0.8, config.payload_size)
            .unwrap();
        let stats = VirtualUserScheduler::new(executor, Duration::ZERO)
            .run_load_test(&config)
            .await
            .unwrap();

        println!("Load Performance:");
        println!("  Requests: {}", stats.total_requests);
        println!("  Avg latency: {:.2}ms", stats.average_response_time);
        println!("  P95 latency: {:.2}ms", stats.p95_response_time);
        println!("  P99 latency: {:.2}ms", stats.p99_response_time);
        println!("  RPS: {:.2}", stats.requests_per_second);

        assert_eq!(stats.total_requests, 200);
        assert_eq!(stats.failed_requests, 0);
        assert!(stats.requests_per_second > 0.0);
        assert!(stats.throughput > 0.0);
        // GET echoes carry a cache policy, POSTs do not
        assert_eq!(
            stats.network_stats.cache_hits + stats.network_stats.cache_misses,
            stats.total_requests
        );
    }
}

#[cfg(test)]
mod interaction_performance_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fifty_simultaneous_votes() {
        let mut tester = ConcurrentInteractionTester::new(BehaviorConfig::default());
        let results = tester.test_concurrent_poll_voting(50).await;

        assert_eq!(results.len(), 50);
        assert!(results.iter().all(|r| r.test_name == ScenarioKind::PollVoting));
        // Attempts were released together, so they all start at the same instant
        let first_start = results[0].start_time;
        assert!(results.iter().all(|r| r.start_time == first_start));
        assert!(results.iter().all(|r| r.end_time >= r.start_time));
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_scenarios_summarised() {
        let mut tester = ConcurrentInteractionTester::new(BehaviorConfig::default());
        tester.test_concurrent_poll_voting(20).await;
        tester.test_concurrent_session_joins(20).await;
        tester.test_concurrent_networking_actions(20).await;

        let summary = tester.generate_summary();
        assert_eq!(summary.len(), 3);
        for scenario in &summary {
            assert_eq!(scenario.total_tests, 20);
            assert_eq!(scenario.successful + scenario.failed, 20);
            assert!((0.0..=100.0).contains(&scenario.success_rate));
            assert!(scenario.min_duration <= scenario.average_duration);
            assert!(scenario.average_duration <= scenario.max_duration);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_certain_conflicts_fail_every_attempt() {
        let behavior = BehaviorConfig {
            session_join_conflict_rate: 1.0,
            ..Default::default()
        };
        let mut tester = ConcurrentInteractionTester::new(behavior);
        let results = tester.test_concurrent_session_joins(10).await;

        assert!(results.iter().all(|r| !r.success && r.error.is_some()));
        assert_eq!(tester.generate_summary()[0].success_rate, 0.0);
    }
}

#[cfg(test)]
mod polling_performance_tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_ten_tabs_for_two_minutes() {
        let target = PollTarget::simulated(Duration::from_millis(20), Duration::from_millis(200));
        let mut tester = PollingEfficiencyTester::new(PollingConfig::default(), target);

        let summary = tester
            .test_multi_tab_polling(10, Duration::from_secs(120))
            .await
            .unwrap();

        println!("Polling Performance:");
        println!("  Tabs: {}", summary.total_tabs);
        println!("  Polls: {}", summary.total_requests);
        println!("  Efficiency: {:.3}", summary.efficiency);

        assert_eq!(summary.total_tabs, 10);
        // Intervals are at least 30s, so each tab polls between 1 and 4 times
        assert!(summary.total_requests >= 10);
        assert!(summary.total_requests <= 40);
        assert!(summary.average_response_time >= 20.0);
        assert!(summary.average_response_time <= 200.0);
        assert!(summary.efficiency > 0.0);
        assert_eq!(tester.requests_issued(), summary.total_requests);
    }
}
