use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use surge_common::MemoryUsage;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Samples process resident memory in the background for the length of a run.
///
/// Platforms without a memory reader report zeros; sampling never fails a run.
#[derive(Debug)]
pub struct MemoryTracker {
    initial: u64,
    peak: Arc<AtomicU64>,
    cancel: CancellationToken,
    sampler: Option<JoinHandle<()>>,
}

impl MemoryTracker {
    /// Take the initial sample and start periodic sampling
    pub fn start(sample_interval: Duration) -> Self {
        let initial = resident_memory_bytes().unwrap_or(0);
        let peak = Arc::new(AtomicU64::new(initial));
        let cancel = CancellationToken::new();

        let task_peak = Arc::clone(&peak);
        let task_cancel = cancel.clone();
        let sampler = tokio::spawn(async move {
            let mut ticker = interval(sample_interval);
            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Some(rss) = resident_memory_bytes() {
                            task_peak.fetch_max(rss, Ordering::Relaxed);
                        }
                    }
                }
            }
        });

        Self {
            initial,
            peak,
            cancel,
            sampler: Some(sampler),
        }
    }

    /// Stop sampling and return initial, peak and final usage
    pub async fn finish(mut self) -> MemoryUsage {
        self.cancel.cancel();
        if let Some(sampler) = self.sampler.take() {
            if let Err(e) = sampler.await {
                debug!(error = %e, "Memory sampler ended abnormally");
            }
        }

        let end = resident_memory_bytes().unwrap_or(0);
        let peak = self.peak.load(Ordering::Relaxed).max(end);

        MemoryUsage {
            initial: self.initial,
            peak,
            end,
        }
    }
}

impl Drop for MemoryTracker {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Resident set size of this process from /proc on Linux
fn resident_memory_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        parse_vm_rss(&status)
    }

    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_vm_rss(status: &str) -> Option<u64> {
    let line = status.lines().find(|line| line.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vm_rss() {
        let status = "Name:\tsurge\nVmPeak:\t  20000 kB\nVmRSS:\t   1234 kB\nThreads:\t4\n";
        assert_eq!(parse_vm_rss(status), Some(1234 * 1024));
    }

    #[test]
    fn test_parse_vm_rss_missing() {
        assert_eq!(parse_vm_rss("Name:\tsurge\n"), None);
        assert_eq!(parse_vm_rss("VmRSS:\tgarbage kB\n"), None);
    }

    #[tokio::test]
    async fn test_tracker_peak_bounds() {
        let tracker = MemoryTracker::start(Duration::from_millis(5));
        tokio::time::sleep(Duration::from_millis(20)).await;
        let usage = tracker.finish().await;

        assert!(usage.peak >= usage.initial);
        assert!(usage.peak >= usage.end);
    }
}
