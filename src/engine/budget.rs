//! Consecutive-failure budget.

use tracing::warn;

#[derive(Debug, Clone)]
pub struct ErrorBudget {
    max_consecutive: u32,
    consecutive: u32,
    last_error: Option<String>,
}

impl ErrorBudget {
    pub fn new(max_consecutive: u32) -> Self {
        Self {
            max_consecutive: max_consecutive.max(1),
            consecutive: 0,
            last_error: None,
        }
    }

    /// Count one failure. Returns true once the budget is exhausted.
    pub fn record_failure(&mut self, error: &str) -> bool {
        self.consecutive = self.consecutive.saturating_add(1);
        self.last_error = Some(error.to_string());
        warn!(
            consecutive = self.consecutive,
            max = self.max_consecutive,
            error,
            "Counted failure"
        );
        self.is_exhausted()
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
        self.last_error = None;
    }

    pub fn is_exhausted(&self) -> bool {
        self.consecutive >= self.max_consecutive
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }
}
