use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use surge_common::{LoadTestResult, RequestResult};
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument};

use crate::aggregator::aggregate;
use crate::clock::RunClock;
use crate::config::LoadTestConfig;
use crate::error::{Result, StressError};
use crate::executor::{RequestContext, RequestExecutor};
use crate::memory::MemoryTracker;

const MEMORY_SAMPLE_INTERVAL: Duration = Duration::from_millis(250);

/// Start delay of user `user_index`: `ramp_up * user_index / concurrent_users`
pub fn stagger_delay(user_index: usize, concurrent_users: usize, ramp_up: Duration) -> Duration {
    if concurrent_users <= 1 {
        return Duration::ZERO;
    }
    let nanos = ramp_up.as_nanos() * user_index as u128 / concurrent_users as u128;
    Duration::from_nanos(nanos.min(u64::MAX as u128) as u64)
}

/// Spawns staggered virtual users and joins them before any aggregation happens
#[derive(Debug, Clone)]
pub struct VirtualUserScheduler {
    executor: Arc<RequestExecutor>,
    think_time_max: Duration,
}

/// Everything a single virtual user needs, shared read-only between users
#[derive(Debug)]
struct UserPlan {
    config: LoadTestConfig,
    executor: Arc<RequestExecutor>,
    clock: RunClock,
    deadline: Instant,
    think_time_max: Duration,
}

impl VirtualUserScheduler {
    pub fn new(executor: RequestExecutor, think_time_max: Duration) -> Self {
        Self {
            executor: Arc::new(executor),
            think_time_max,
        }
    }

    /// Run one complete load test and reduce it to statistics
    #[instrument(name = "load_test", skip(self, config), fields(users = config.concurrent_users))]
    pub async fn run_load_test(&self, config: &LoadTestConfig) -> Result<LoadTestResult> {
        config.validate()?;

        let memory = MemoryTracker::start(MEMORY_SAMPLE_INTERVAL);
        let clock = RunClock::start();
        let results = self.run_users(config, clock).await?;
        let elapsed_ms = clock.elapsed_ms();
        let memory_usage = memory.finish().await;

        let stats = aggregate(&results, config, elapsed_ms, memory_usage);
        info!(
            total_requests = stats.total_requests,
            failed_requests = stats.failed_requests,
            p95_ms = stats.p95_response_time,
            rps = stats.requests_per_second,
            "Load test finished"
        );
        Ok(stats)
    }

    /// Spawn every virtual user and wait for all of them to exit
    pub async fn run_users(
        &self,
        config: &LoadTestConfig,
        clock: RunClock,
    ) -> Result<Vec<RequestResult>> {
        config.validate()?;

        let plan = Arc::new(UserPlan {
            config: config.clone(),
            executor: Arc::clone(&self.executor),
            clock,
            deadline: clock.deadline(config.duration),
            think_time_max: self.think_time_max,
        });

        info!(
            users = config.concurrent_users,
            requests_per_user = config.requests_per_user,
            duration_ms = config.duration.as_millis() as u64,
            ramp_up_ms = config.ramp_up.as_millis() as u64,
            "Starting virtual users"
        );

        let mut users = JoinSet::new();
        for user_id in 0..config.concurrent_users {
            let delay = stagger_delay(user_id, config.concurrent_users, config.ramp_up);
            let plan = Arc::clone(&plan);
            users.spawn(async move { virtual_user(user_id, delay, plan).await });
        }

        // Each user owns its buffer until it is handed back here
        let mut results = Vec::new();
        while let Some(joined) = users.join_next().await {
            let user_results = joined.map_err(|e| {
                StressError::InvalidState(format!("virtual user task failed: {}", e))
            })?;
            results.extend(user_results);
        }

        Ok(results)
    }
}

async fn virtual_user(user_id: usize, delay: Duration, plan: Arc<UserPlan>) -> Vec<RequestResult> {
    if !delay.is_zero() {
        sleep(delay).await;
    }

    let config = &plan.config;
    let mut results = Vec::with_capacity(config.requests_per_user.min(1024) as usize);
    let mut request_count: u64 = 0;

    while request_count < config.requests_per_user && !plan.clock.is_past(plan.deadline) {
        let endpoint = config.endpoints[request_count as usize % config.endpoints.len()].as_str();
        let ctx = RequestContext {
            user_id,
            request_id: request_count,
            endpoint,
        };
        results.push(plan.executor.execute(ctx, &plan.clock).await);
        request_count += 1;

        if request_count < config.requests_per_user {
            let think = think_time(plan.think_time_max).min(plan.clock.remaining(plan.deadline));
            sleep(think).await;
        }
    }

    debug!(user_id, requests = request_count, "Virtual user finished");
    results
}

/// Random idle time in `[0, max)`
fn think_time(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..max_ms))
}
