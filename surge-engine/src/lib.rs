//! Surge load generation engine
//!
//! This library drives staggered virtual users against an HTTP target, simulates
//! racing user interactions and multi-tab polling, and reduces the raw timing
//! stream into percentile-based performance statistics.

pub mod aggregator;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod executor;
pub mod interaction;
pub mod memory;
pub mod origin;
pub mod polling;
pub mod report;
pub mod runner;
pub mod scheduler;
pub mod target;

// Re-export commonly used types
pub use config::{LoadTestConfig, StressConfig, Thresholds};
pub use error::{Result, StressError};
pub use executor::RequestExecutor;
pub use interaction::ConcurrentInteractionTester;
pub use polling::{PollTarget, PollingEfficiencyTester};
pub use report::{ReportGenerator, RunSummary, ThresholdReport};
pub use runner::StressRunner;
pub use scheduler::VirtualUserScheduler;
pub use target::TargetService;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_imports() {
        // Simple test to ensure all modules can be imported
        let _ = std::any::type_name::<StressConfig>();
        let _ = std::any::type_name::<LoadTestConfig>();
        let _ = std::any::type_name::<VirtualUserScheduler>();
        let _ = std::any::type_name::<PollingEfficiencyTester>();
        let _ = std::any::type_name::<ReportGenerator>();
    }
}
