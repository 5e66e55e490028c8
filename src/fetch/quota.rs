use crate::fetch::provider::AccountStatus;

/// Per-run credit bookkeeping. Owned by the orchestrated run rather than
/// living in module state, so independent sessions never contaminate each
/// other.
#[derive(Debug, Default)]
pub struct QuotaTracker {
    remaining: Option<u32>,
    calls_this_session: u32,
}

impl QuotaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_remaining(remaining: u32) -> Self {
        Self {
            remaining: Some(remaining),
            calls_this_session: 0,
        }
    }

    /// Calls needed to cover `num_dates` at `pages_per_date` pages each.
    pub fn estimate_calls(num_dates: usize, pages_per_date: u32) -> u32 {
        num_dates as u32 * pages_per_date.max(1)
    }

    /// Last-known remaining credit, `None` until the first account check or
    /// explicit seed.
    pub fn remaining(&self) -> Option<u32> {
        self.remaining
    }

    pub fn set_remaining(&mut self, remaining: u32) {
        self.remaining = Some(remaining);
    }

    pub fn calls_this_session(&self) -> u32 {
        self.calls_this_session
    }

    /// Reset the session counter at the start of an orchestrated run.
    pub fn begin_session(&mut self) {
        self.calls_this_session = 0;
    }

    /// Record `n` metered calls, decrementing the known remaining balance.
    pub fn record_usage(&mut self, n: u32) {
        self.calls_this_session += n;
        if let Some(remaining) = self.remaining {
            self.remaining = Some(remaining.saturating_sub(n));
        }
    }

    /// Whether `n` more calls fit the known budget. An unknown balance never
    /// blocks: the provider's own refusal is the backstop.
    pub fn can_afford(&self, n: u32) -> bool {
        match self.remaining {
            Some(remaining) => remaining >= n,
            None => true,
        }
    }

    /// How many whole dates fit the known budget at the given page depth.
    pub fn affordable_dates(&self, pages_per_date: u32) -> Option<usize> {
        self.remaining
            .map(|remaining| (remaining / pages_per_date.max(1)) as usize)
    }

    pub fn apply_status(&mut self, status: &AccountStatus) {
        log::info!(
            "Account status: {} of {} credits used, {} remaining",
            status.used,
            status.plan_limit,
            status.remaining
        );
        self.remaining = Some(status.remaining);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_is_dates_times_pages() {
        assert_eq!(QuotaTracker::estimate_calls(10, 1), 10);
        assert_eq!(QuotaTracker::estimate_calls(10, 3), 30);
        assert_eq!(QuotaTracker::estimate_calls(0, 5), 0);
        // A zero page depth still costs one call per date.
        assert_eq!(QuotaTracker::estimate_calls(4, 0), 4);
    }

    #[test]
    fn usage_decrements_known_remaining() {
        let mut tracker = QuotaTracker::with_remaining(10);
        tracker.record_usage(3);
        assert_eq!(tracker.remaining(), Some(7));
        assert_eq!(tracker.calls_this_session(), 3);

        tracker.record_usage(20);
        assert_eq!(tracker.remaining(), Some(0));
    }

    #[test]
    fn session_counter_resets_per_run() {
        let mut tracker = QuotaTracker::with_remaining(10);
        tracker.record_usage(4);
        tracker.begin_session();
        assert_eq!(tracker.calls_this_session(), 0);
        // The balance survives across sessions.
        assert_eq!(tracker.remaining(), Some(6));
    }

    #[test]
    fn unknown_balance_never_blocks() {
        let tracker = QuotaTracker::new();
        assert!(tracker.can_afford(1_000));
        assert!(tracker.affordable_dates(1).is_none());

        let known = QuotaTracker::with_remaining(6);
        assert!(known.can_afford(6));
        assert!(!known.can_afford(7));
        assert_eq!(known.affordable_dates(1), Some(6));
        assert_eq!(known.affordable_dates(5), Some(1));
    }
}
