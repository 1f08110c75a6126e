use std::time::Duration;

/// Intervals and ceilings used while waiting on the vendor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentTiming {
    /// Poll interval when a status response carries no `retry-after`
    pub default_retry_after: Duration,
    pub startup_poll_interval: Duration,
    /// Wall-clock limit for the edge runtime to report it started
    pub startup_timeout: Duration,
}

impl Default for DeploymentTiming {
    fn default() -> Self {
        Self {
            default_retry_after: Duration::from_secs(5),
            startup_poll_interval: Duration::from_secs(3),
            startup_timeout: Duration::from_secs(300),
        }
    }
}
