//! Deployment attempt bookkeeping

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::deploy::strategy::BuildStrategy;

/// Busy retries allowed after the first execution
pub const MAX_BUSY_RETRIES: u32 = 3;

/// One `deploy()` call, dropped on success or terminal failure
#[derive(Debug, Clone)]
pub struct DeploymentAttempt {
    id: Uuid,
    strategy: BuildStrategy,
    started_at: DateTime<Utc>,
    started: Instant,
    retries: u32,
}

impl DeploymentAttempt {
    pub fn new(strategy: BuildStrategy) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy,
            started_at: Utc::now(),
            started: Instant::now(),
            retries: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn strategy(&self) -> BuildStrategy {
        self.strategy
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Executions so far, the first run plus retries
    pub fn executions(&self) -> u32 {
        self.retries + 1
    }

    /// Check if another retry is allowed
    pub fn can_retry(&self, max_retries: u32) -> bool {
        self.retries < max_retries
    }

    pub fn record_retry(&mut self) {
        self.retries += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_budget() {
        let mut attempt = DeploymentAttempt::new(BuildStrategy::Maven);
        for _ in 0..MAX_BUSY_RETRIES {
            assert!(attempt.can_retry(MAX_BUSY_RETRIES));
            attempt.record_retry();
        }
        assert!(!attempt.can_retry(MAX_BUSY_RETRIES));
        assert_eq!(attempt.executions(), 4);
    }
}
