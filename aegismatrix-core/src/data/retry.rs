//! Retry/backoff as an explicit state machine.
//!
//! The provider loop feeds each attempt's outcome into [`RetryState::record`]
//! and acts on the returned [`RetryDecision`]. The decision depends only on
//! the policy, the attempt number and the outcome, so it can be tested
//! without a network or a clock.

use std::time::Duration;

/// Classified result of one provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Well-formed response with at least one usable row.
    Rows,
    /// Well-formed response with zero usable rows.
    Empty,
    /// HTTP 429.
    RateLimited,
    /// Connection refused, timeout, DNS and the like.
    Transport,
    /// Any other non-success HTTP status.
    HttpStatus,
    /// Body could not be parsed or lacks expected keys.
    Malformed,
}

/// What the provider loop should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempt succeeded; return its rows.
    Done,
    /// Sleep for the given duration (possibly zero), then try again.
    RetryAfter(Duration),
    /// Stop at this tier and let the caller fall back.
    GiveUp,
}

/// Budget and delays for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Rate-limit sleep is `attempt × rate_limit_base_delay`.
    pub rate_limit_base_delay: Duration,
    /// Fixed sleep after a transport failure.
    pub transport_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            rate_limit_base_delay: Duration::from_secs(2),
            transport_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Pure decision for the outcome of attempt number `attempt` (1-based).
    pub fn decide(&self, attempt: u32, outcome: AttemptOutcome) -> RetryDecision {
        match outcome {
            AttemptOutcome::Rows => RetryDecision::Done,
            AttemptOutcome::Empty | AttemptOutcome::Malformed => RetryDecision::GiveUp,
            _ if attempt >= self.max_attempts => RetryDecision::GiveUp,
            AttemptOutcome::RateLimited => {
                RetryDecision::RetryAfter(self.rate_limit_base_delay * attempt)
            }
            AttemptOutcome::Transport => RetryDecision::RetryAfter(self.transport_delay),
            AttemptOutcome::HttpStatus => RetryDecision::RetryAfter(Duration::ZERO),
        }
    }
}

/// Attempt counter plus the last outcome seen.
#[derive(Debug, Clone)]
pub struct RetryState {
    policy: RetryPolicy,
    attempt: u32,
    last_outcome: Option<AttemptOutcome>,
}

impl RetryState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 1,
            last_outcome: None,
        }
    }

    /// Number of the attempt about to be made (or just made), 1-based.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.policy.max_attempts
    }

    pub fn last_outcome(&self) -> Option<AttemptOutcome> {
        self.last_outcome
    }

    /// Record the outcome of the current attempt and advance if retrying.
    pub fn record(&mut self, outcome: AttemptOutcome) -> RetryDecision {
        self.last_outcome = Some(outcome);
        let decision = self.policy.decide(self.attempt, outcome);
        if let RetryDecision::RetryAfter(_) = decision {
            self.attempt += 1;
        }
        decision
    }
}
