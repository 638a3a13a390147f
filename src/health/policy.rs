// ABOUTME: Bounded polling policy: attempt budget, fixed interval, optional deadline.
// ABOUTME: Injected from settings so tests can drive it on tokio's paused clock.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    max_attempts: u32,
    interval: Duration,
    deadline: Option<Duration>,
}

/// How a poll ended without success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Exhausted {
    pub attempts: u32,
    pub elapsed: Duration,
}

impl BackoffPolicy {
    /// At least one attempt is always made.
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    /// Wall-clock bound on one poll: `max_attempts * interval`, or the deadline
    /// when that is sooner.
    pub fn budget(&self) -> Duration {
        let full = self.interval.saturating_mul(self.max_attempts);
        self.deadline.map_or(full, |deadline| deadline.min(full))
    }

    /// Call `attempt` until it yields `Some`, at most `max_attempts` times.
    ///
    /// Sleeps `interval` between attempts, never after the last one. The whole
    /// poll, slow attempts included, ends within `budget()`: an attempt still
    /// running when the budget is spent is abandoned, and no sleep starts that
    /// would cross it. A zero budget (zero interval, no deadline) bounds nothing.
    pub async fn poll<T, F, Fut>(&self, mut attempt: F) -> Result<T, Exhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Option<T>>,
    {
        let start = Instant::now();
        let budget = Some(self.budget()).filter(|b| !b.is_zero());
        let exhausted = |attempts| Exhausted {
            attempts,
            elapsed: start.elapsed(),
        };

        for n in 1..=self.max_attempts {
            let outcome = match budget {
                Some(budget) => {
                    let remaining = budget.saturating_sub(start.elapsed());
                    match tokio::time::timeout(remaining, attempt(n)).await {
                        Ok(outcome) => outcome,
                        Err(_) => return Err(exhausted(n)),
                    }
                }
                None => attempt(n).await,
            };
            if let Some(value) = outcome {
                return Ok(value);
            }
            if n == self.max_attempts {
                break;
            }
            if let Some(budget) = budget
                && start.elapsed() + self.interval > budget
            {
                return Err(exhausted(n));
            }
            tokio::time::sleep(self.interval).await;
        }
        Err(exhausted(self.max_attempts))
    }
}
