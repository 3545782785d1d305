//! Reduction of raw per-request results into `LoadTestResult`.
//!
//! Aggregation is a pure function of its inputs and does not depend on the
//! order results arrive in.

use surge_common::{LoadTestResult, MemoryUsage, NetworkStats, RequestResult};

use crate::config::LoadTestConfig;

/// Value at nearest-rank index `floor(n * percentile)` of an ascending sample
pub fn percentile(sorted: &[f64], percentile: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (sorted.len() as f64 * percentile).floor() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// `numerator / denominator`, or 0 when the denominator is not positive
fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}

/// Reduce every result of a run to aggregate statistics
pub fn aggregate(
    results: &[RequestResult],
    config: &LoadTestConfig,
    elapsed_ms: f64,
    memory_usage: MemoryUsage,
) -> LoadTestResult {
    let total_requests = results.len() as u64;

    let mut response_times: Vec<f64> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| r.response_time)
        .collect();
    response_times.sort_by(|a, b| a.total_cmp(b));

    let successful_requests = response_times.len() as u64;
    let failed_requests = total_requests - successful_requests;

    let (average, min, max) = match (response_times.first(), response_times.last()) {
        (Some(&min), Some(&max)) => {
            let sum: f64 = response_times.iter().sum();
            (sum / response_times.len() as f64, min, max)
        }
        _ => (0.0, 0.0, 0.0),
    };

    let mut network_stats = NetworkStats::default();
    for result in results {
        network_stats.total_bytes += result.response_size;
        if result.from_cache {
            network_stats.cache_hits += 1;
        } else {
            network_stats.cache_misses += 1;
        }
    }

    LoadTestResult {
        total_requests,
        successful_requests,
        failed_requests,
        average_response_time: average,
        min_response_time: min,
        max_response_time: max,
        p95_response_time: percentile(&response_times, 0.95),
        p99_response_time: percentile(&response_times, 0.99),
        requests_per_second: ratio(total_requests as f64, elapsed_ms) * 1000.0,
        error_rate: ratio(failed_requests as f64, total_requests as f64) * 100.0,
        throughput: ratio(network_stats.total_bytes as f64, elapsed_ms) * 1000.0,
        concurrent_users: config.concurrent_users,
        test_duration: elapsed_ms,
        memory_usage,
        network_stats,
    }
}
