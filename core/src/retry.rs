//! Per-command attempt counter for poll-until-true commands.
//!
//! Commands such as `script.sleep` or `css.wait` run, find their condition
//! unsatisfied, and ask to be run again later. [`RetryCounter::retry`] tells
//! them whether they still may.

/// Attempt counter embedded in a command record.
///
/// The counter is lazy: it holds no budget until the first call to
/// [`retry`](Self::retry), which installs the budget.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryCounter {
    remaining: Option<u32>,
    requeue: bool,
}

impl RetryCounter {
    /// Create an unarmed counter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            remaining: None,
            requeue: false,
        }
    }

    /// Record one more attempt.
    ///
    /// The first call installs `max_attempts` as the remaining budget. Each
    /// later call decrements it. Returns `false` once the budget would drop
    /// below one, meaning the caller should give up; otherwise returns `true`
    /// and marks the owner as needing to run again.
    ///
    /// ```
    /// use jxn_core::retry::RetryCounter;
    ///
    /// let mut counter = RetryCounter::new();
    /// let granted = std::iter::repeat_with(|| counter.retry(3))
    ///     .take_while(|granted| *granted)
    ///     .count();
    /// assert_eq!(granted, 3);
    /// ```
    pub fn retry(&mut self, max_attempts: u32) -> bool {
        let remaining = match self.remaining {
            Some(remaining) => {
                let next = remaining.saturating_sub(1);
                if next < 1 {
                    self.remaining = Some(0);
                    self.requeue = false;
                    return false;
                }
                next
            },
            None => {
                if max_attempts < 1 {
                    self.remaining = Some(0);
                    return false;
                }
                max_attempts
            },
        };
        self.remaining = Some(remaining);
        self.requeue = true;
        true
    }

    /// Remaining budget, `None` until the first [`retry`](Self::retry).
    #[must_use]
    pub const fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    /// Whether the last call asked for the owner to run again.
    #[must_use]
    pub const fn needs_requeue(&self) -> bool {
        self.requeue
    }

    /// Read and clear the requeue mark.
    pub const fn take_requeue(&mut self) -> bool {
        let requeue = self.requeue;
        self.requeue = false;
        requeue
    }
}
