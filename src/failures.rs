use tracing::warn;

/// Decision returned by the failure policy after a write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureDecision {
    /// Keep writing.
    Continue,
    /// Consecutive failure limit reached; stop the loop.
    Abort { failures: u32 },
}

/// Consecutive write-failure accounting.
///
/// Any write that did not fail outright (full or short) resets the streak.
/// A limit of 0 never aborts.
pub struct FailurePolicy {
    max_failures: u32,
    consecutive: u32,
}

impl FailurePolicy {
    pub fn new(max_failures: u32) -> Self {
        Self {
            max_failures,
            consecutive: 0,
        }
    }

    /// Record a failed write and decide whether the loop may continue.
    pub fn record_failure(&mut self) -> FailureDecision {
        if self.max_failures == 0 {
            return FailureDecision::Continue;
        }

        self.consecutive += 1;

        if self.consecutive >= self.max_failures {
            warn!(
                failures = self.consecutive,
                max_failures = self.max_failures,
                "consecutive write failure limit reached"
            );
            FailureDecision::Abort {
                failures: self.consecutive,
            }
        } else {
            warn!(
                failures = self.consecutive,
                max_failures = self.max_failures,
                "write failed, continuing"
            );
            FailureDecision::Continue
        }
    }

    /// Record a write that did not fail.
    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    /// Current streak (0 = last write did not fail).
    #[cfg(test)]
    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
