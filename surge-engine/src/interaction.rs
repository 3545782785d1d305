//! Simultaneous interaction scenarios.
//!
//! Unlike the staggered load test, every attempt of a scenario is released at
//! the same instant to provoke contention. Conflicts are injected with the
//! probabilities in `BehaviorConfig`.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use surge_common::{
    ConcurrentTestResult, ScenarioKind, ScenarioOutcome, ScenarioSummary, SubActionOutcome,
};
use tokio::sync::Barrier;
use tokio::task::JoinSet;
use tokio::time::{sleep, Instant};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::clock::{duration_ms, timed, RunClock};
use crate::config::BehaviorConfig;

const POLL_CONFLICTS: &[&str] = &["Poll is already closed", "Vote already recorded for this poll"];
const SESSION_CONFLICTS: &[&str] = &["Session is full", "Session has already ended"];
const POLL_OPTIONS: usize = 4;

/// Fires many identical interactions at once and keeps their history
#[derive(Debug)]
pub struct ConcurrentInteractionTester {
    behavior: Arc<BehaviorConfig>,
    history: Vec<ConcurrentTestResult>,
}

impl ConcurrentInteractionTester {
    pub fn new(behavior: BehaviorConfig) -> Self {
        Self {
            behavior: Arc::new(behavior),
            history: Vec::new(),
        }
    }

    /// `users` simultaneous votes on the same poll
    #[instrument(skip(self))]
    pub async fn test_concurrent_poll_voting(&mut self, users: usize) -> Vec<ConcurrentTestResult> {
        let poll_id = format!("poll-{}", Uuid::new_v4());
        self.run_scenario(ScenarioKind::PollVoting, users, move |user, behavior| {
            let poll_id = poll_id.clone();
            async move {
                sleep(random_latency(&behavior)).await;
                if roll(behavior.poll_vote_conflict_rate) {
                    return Err(pick(POLL_CONFLICTS));
                }
                Ok(ScenarioOutcome::PollVote {
                    poll_id,
                    option_index: user % POLL_OPTIONS,
                    optimistic_update: true,
                })
            }
        })
        .await
    }

    /// `users` simultaneous joins of the same session
    #[instrument(skip(self))]
    pub async fn test_concurrent_session_joins(
        &mut self,
        users: usize,
    ) -> Vec<ConcurrentTestResult> {
        let session_id = format!("session-{}", Uuid::new_v4());
        self.run_scenario(ScenarioKind::SessionJoin, users, move |_user, behavior| {
            let session_id = session_id.clone();
            async move {
                sleep(random_latency(&behavior)).await;
                if roll(behavior.session_join_conflict_rate) {
                    return Err(pick(SESSION_CONFLICTS));
                }
                Ok(ScenarioOutcome::SessionJoin {
                    session_id,
                    participant_id: Uuid::new_v4().to_string(),
                    optimistic_update: true,
                })
            }
        })
        .await
    }

    /// `users` simultaneous bundles of connection request, profile view and search
    #[instrument(skip(self))]
    pub async fn test_concurrent_networking_actions(
        &mut self,
        users: usize,
    ) -> Vec<ConcurrentTestResult> {
        self.run_scenario(ScenarioKind::NetworkingActions, users, |_user, behavior| async move {
            let (connection_request, profile_view, search) = tokio::join!(
                sub_action(
                    &behavior,
                    behavior.connection_request_failure_rate,
                    "Connection request rejected"
                ),
                sub_action(
                    &behavior,
                    behavior.profile_view_failure_rate,
                    "Profile unavailable"
                ),
                sub_action(&behavior, behavior.search_failure_rate, "Search timed out"),
            );

            let failure = [
                ("connection request", &connection_request),
                ("profile view", &profile_view),
                ("search", &search),
            ]
            .iter()
            .find(|(_, outcome)| !outcome.success)
            .map(|(name, outcome)| {
                format!("{} failed: {}", name, outcome.error.as_deref().unwrap_or("unknown"))
            });

            let bundle = ScenarioOutcome::NetworkingBundle {
                connection_request,
                profile_view,
                search,
            };
            match failure {
                Some(error) => Err((error, Some(bundle))),
                None => Ok(bundle),
            }
        })
        .await
    }

    /// One summary per scenario present in the history, ordered by scenario
    pub fn generate_summary(&self) -> Vec<ScenarioSummary> {
        let mut groups: BTreeMap<ScenarioKind, Vec<&ConcurrentTestResult>> = BTreeMap::new();
        for result in &self.history {
            groups.entry(result.test_name).or_default().push(result);
        }

        groups
            .into_iter()
            .map(|(kind, results)| summarize(kind, &results))
            .collect()
    }

    /// Release `users` attempts together and record their outcomes in launch order
    async fn run_scenario<F, Fut, E>(
        &mut self,
        kind: ScenarioKind,
        users: usize,
        attempt: F,
    ) -> Vec<ConcurrentTestResult>
    where
        F: Fn(usize, Arc<BehaviorConfig>) -> Fut,
        Fut: Future<Output = Result<ScenarioOutcome, E>> + Send + 'static,
        E: Into<AttemptError> + Send + 'static,
    {
        if users == 0 {
            warn!(scenario = %kind, "No users requested, skipping scenario");
            return Vec::new();
        }

        let clock = RunClock::start();
        let barrier = Arc::new(Barrier::new(users));
        let mut attempts = JoinSet::new();

        for user in 0..users {
            let fut = attempt(user, Arc::clone(&self.behavior));
            let barrier = Arc::clone(&barrier);
            attempts.spawn(async move {
                barrier.wait().await;
                let started = clock.elapsed();
                let (outcome, duration) = timed(fut).await;
                let outcome: Result<ScenarioOutcome, AttemptError> = outcome.map_err(Into::into);
                (user, started, duration, outcome)
            });
        }

        let mut ordered = Vec::with_capacity(users);
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok(entry) => ordered.push(entry),
                Err(e) => warn!(scenario = %kind, error = %e, "Interaction attempt aborted"),
            }
        }
        ordered.sort_by_key(|(user, ..)| *user);

        let results: Vec<ConcurrentTestResult> = ordered
            .into_iter()
            .map(|(_, started, duration, outcome)| {
                let start_time = clock.wall_time_at(started);
                let end_time = clock.wall_time_at(started + Duration::from_secs_f64(duration / 1000.0));
                let (success, error, metrics) = match outcome {
                    Ok(outcome) => (true, None, Some(outcome)),
                    Err(AttemptError { message, outcome }) => (false, Some(message), outcome),
                };
                ConcurrentTestResult {
                    test_name: kind,
                    start_time,
                    end_time,
                    duration,
                    success,
                    error,
                    metrics,
                }
            })
            .collect();

        let successful = results.iter().filter(|r| r.success).count();
        info!(
            scenario = %kind,
            users,
            successful,
            failed = results.len() - successful,
            "Interaction scenario finished"
        );

        self.history.extend(results.iter().cloned());
        results
    }
}

/// Failure of one attempt, optionally carrying the partial outcome
#[derive(Debug)]
pub struct AttemptError {
    message: String,
    outcome: Option<ScenarioOutcome>,
}

impl From<&'static str> for AttemptError {
    fn from(message: &'static str) -> Self {
        Self {
            message: message.to_string(),
            outcome: None,
        }
    }
}

impl From<(String, Option<ScenarioOutcome>)> for AttemptError {
    fn from((message, outcome): (String, Option<ScenarioOutcome>)) -> Self {
        Self { message, outcome }
    }
}

fn summarize(kind: ScenarioKind, results: &[&ConcurrentTestResult]) -> ScenarioSummary {
    let total_tests = results.len() as u64;
    let successful = results.iter().filter(|r| r.success).count() as u64;

    let durations = results.iter().map(|r| r.duration);
    let (min_duration, max_duration) = if results.is_empty() {
        (0.0, 0.0)
    } else {
        (
            durations.clone().fold(f64::INFINITY, f64::min),
            durations.clone().fold(f64::NEG_INFINITY, f64::max),
        )
    };
    let average_duration = if results.is_empty() {
        0.0
    } else {
        durations.sum::<f64>() / total_tests as f64
    };

    ScenarioSummary {
        test_name: kind,
        total_tests,
        successful,
        failed: total_tests - successful,
        success_rate: if total_tests > 0 {
            successful as f64 / total_tests as f64 * 100.0
        } else {
            0.0
        },
        average_duration,
        min_duration,
        max_duration,
    }
}

async fn sub_action(
    behavior: &BehaviorConfig,
    failure_rate: f64,
    failure_message: &str,
) -> SubActionOutcome {
    let started = Instant::now();
    sleep(random_latency(behavior)).await;
    let failed = roll(failure_rate);
    SubActionOutcome {
        success: !failed,
        duration: duration_ms(started.elapsed()),
        error: failed.then(|| failure_message.to_string()),
    }
}

fn random_latency(behavior: &BehaviorConfig) -> Duration {
    let min = behavior.interaction_latency_min_ms;
    let max = behavior.interaction_latency_max_ms.max(min);
    Duration::from_millis(rand::thread_rng().gen_range(min..=max))
}

fn roll(probability: f64) -> bool {
    rand::thread_rng().gen_bool(probability.clamp(0.0, 1.0))
}

fn pick(messages: &'static [&'static str]) -> &'static str {
    messages.choose(&mut rand::thread_rng()).copied().unwrap_or("Conflict")
}
