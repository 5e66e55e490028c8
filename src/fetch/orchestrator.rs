use std::time::Duration;

use chrono::NaiveDate;
use futures::future::join_all;
use tokio::time::sleep;

use crate::config::Config;
use crate::error::AppError;
use crate::fetch::normalize::normalize_page;
use crate::fetch::provider::PriceSource;
use crate::fetch::quota::QuotaTracker;
use crate::fetch::{ensure_concurrency_limit, PAGE_CAP};
use crate::records::{DateSnapshot, HotelQuote};

/// Lifecycle of one orchestrated collection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    QuotaHalted,
    CredentialFailed,
}

#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Follow pagination up to the provider-declared page count and the hard
    /// page cap; otherwise fetch only page 0.
    pub full_fetch: bool,
    /// Stop issuing calls for later dates once a fatal signal arrives.
    pub stop_on_limit: bool,
    /// 1 = strictly sequential; N = fixed-size concurrent batches.
    pub concurrency: usize,
    /// Politeness delay between sequential calls / between batches.
    pub inter_call_delay: Duration,
}

impl Default for CollectOptions {
    fn default() -> Self {
        Self {
            full_fetch: false,
            stop_on_limit: true,
            concurrency: 1,
            inter_call_delay: Duration::from_millis(250),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DateError {
    pub date: NaiveDate,
    pub reason: String,
}

#[derive(Debug)]
pub struct CollectOutcome {
    /// Snapshots with at least one accepted quote, in completion order.
    pub accepted: Vec<DateSnapshot>,
    pub errors: Vec<DateError>,
    /// Dates that answered with zero quotes; reported for debugging, never
    /// persisted.
    pub empty_dates: Vec<NaiveDate>,
    pub quota_halted: bool,
    pub state: RunState,
    pub dates_completed: usize,
    pub dates_skipped: usize,
    pub calls_used: u32,
}

impl CollectOutcome {
    fn new() -> Self {
        Self {
            accepted: Vec::new(),
            errors: Vec::new(),
            empty_dates: Vec::new(),
            quota_halted: false,
            state: RunState::Idle,
            dates_completed: 0,
            dates_skipped: 0,
            calls_used: 0,
        }
    }

    pub fn dates_requested(&self) -> usize {
        self.dates_completed + self.dates_skipped + self.errors.len()
    }
}

/// Drives the price source across a date list under a credit budget.
pub struct Collector<S: PriceSource> {
    source: S,
    config: Config,
    options: CollectOptions,
}

/// Result of fetching all pages for one date.
struct DateFetch {
    calls: u32,
    result: Result<(Vec<HotelQuote>, bool), AppError>,
}

impl<S: PriceSource> Collector<S> {
    pub fn new(source: S, config: Config, options: CollectOptions) -> Self {
        Self {
            source,
            config,
            options,
        }
    }

    /// Collect snapshots for `dates`, spending against `quota`. Per-date
    /// failures are accumulated, never thrown past this boundary; the run
    /// outcome always reflects partial success.
    pub async fn collect(&self, dates: &[NaiveDate], quota: &mut QuotaTracker) -> CollectOutcome {
        let mut outcome = CollectOutcome::new();
        quota.begin_session();

        let pages_per_date = if self.options.full_fetch { PAGE_CAP } else { 1 };
        let estimated = QuotaTracker::estimate_calls(dates.len(), pages_per_date);

        // Truncate the plan to the affordable prefix rather than refusing
        // the whole run.
        let mut planned = dates;
        let mut truncated = false;
        if !quota.can_afford(estimated) {
            let affordable = quota.affordable_dates(pages_per_date).unwrap_or(0);
            let keep = affordable.min(dates.len());
            log::warn!(
                "Budget covers {} of {} requested dates; truncating the plan",
                keep,
                dates.len()
            );
            planned = &dates[..keep];
            outcome.dates_skipped += dates.len() - keep;
            truncated = true;
        }

        outcome.state = RunState::Running;
        log::info!(
            "Collecting {} dates ({} mode, concurrency {})",
            planned.len(),
            if self.options.full_fetch { "full" } else { "page-0" },
            ensure_concurrency_limit(self.options.concurrency)
        );

        if ensure_concurrency_limit(self.options.concurrency) <= 1 {
            self.collect_sequential(planned, quota, &mut outcome).await;
        } else {
            self.collect_batched(planned, quota, &mut outcome).await;
        }

        outcome.quota_halted |= truncated;
        outcome.state = match outcome.state {
            RunState::CredentialFailed => RunState::CredentialFailed,
            _ if outcome.quota_halted => RunState::QuotaHalted,
            _ => RunState::Completed,
        };

        log::info!(
            "Run finished: {} collected, {} errored, {} skipped, {} calls used",
            outcome.dates_completed,
            outcome.errors.len(),
            outcome.dates_skipped,
            outcome.calls_used
        );
        outcome
    }

    async fn collect_sequential(
        &self,
        dates: &[NaiveDate],
        quota: &mut QuotaTracker,
        outcome: &mut CollectOutcome,
    ) {
        for (index, &date) in dates.iter().enumerate() {
            if self.halted(outcome) {
                outcome.dates_skipped += dates.len() - index;
                return;
            }

            if index > 0 && !self.options.inter_call_delay.is_zero() {
                sleep(self.options.inter_call_delay).await;
            }

            let fetch = self.fetch_date(date).await;
            quota.record_usage(fetch.calls);
            apply_date_result(date, fetch, outcome);
        }
    }

    async fn collect_batched(
        &self,
        dates: &[NaiveDate],
        quota: &mut QuotaTracker,
        outcome: &mut CollectOutcome,
    ) {
        let batch_size = ensure_concurrency_limit(self.options.concurrency);
        let mut remaining = dates;

        while !remaining.is_empty() {
            if self.halted(outcome) {
                outcome.dates_skipped += remaining.len();
                return;
            }

            let (batch, rest) = remaining.split_at(batch_size.min(remaining.len()));
            remaining = rest;

            // The whole batch is awaited before anything else is issued, so
            // a fatal signal lets in-flight members finish.
            let fetches = join_all(batch.iter().map(|&date| self.fetch_date(date))).await;
            for (&date, fetch) in batch.iter().zip(fetches) {
                quota.record_usage(fetch.calls);
                apply_date_result(date, fetch, outcome);
            }

            if !remaining.is_empty() && !self.options.inter_call_delay.is_zero() {
                sleep(self.options.inter_call_delay).await;
            }
        }
    }

    fn halted(&self, outcome: &CollectOutcome) -> bool {
        if outcome.state == RunState::CredentialFailed {
            return true;
        }
        outcome.quota_halted && self.options.stop_on_limit
    }

    /// Fetch every page for one date, merging normalized quotes into one
    /// accumulating list. Pages are fetched in page order.
    async fn fetch_date(&self, date: NaiveDate) -> DateFetch {
        let page_goal = if self.options.full_fetch { PAGE_CAP } else { 1 };
        let mut merged: Vec<HotelQuote> = Vec::new();
        let mut declared_pages: Option<u32> = None;
        let mut calls = 0u32;
        let mut pages_fetched = 0u32;

        for page in 0..page_goal {
            if page > 0 && !self.options.inter_call_delay.is_zero() {
                sleep(self.options.inter_call_delay).await;
            }

            calls += 1;
            let result = match self.source.fetch_page(date, page).await {
                Ok(result) => result,
                Err(err) => return DateFetch {
                    calls,
                    result: Err(err),
                },
            };

            if declared_pages.is_none() {
                declared_pages = result.total_pages;
            }

            let quotes = normalize_page(&result.records, &self.config);
            log::debug!(
                "{} page {}: {} records, {} quotes accepted",
                date,
                page,
                result.records.len(),
                quotes.len()
            );
            let was_empty = result.records.is_empty();
            merge_quotes(&mut merged, quotes);
            pages_fetched += 1;

            let declared = declared_pages.unwrap_or(1).max(1);
            if pages_fetched >= declared || was_empty {
                break;
            }
        }

        // Partial when the provider declared more pages than were fetched.
        let declared = declared_pages.unwrap_or(pages_fetched).max(1);
        let partial = pages_fetched < declared;

        DateFetch {
            calls,
            result: Ok((merged, partial)),
        }
    }
}

/// Fold one page's quotes into the date's accumulating list. One entry per
/// hotel: a strictly lower price replaces, a tie keeps the earlier vendor.
fn merge_quotes(merged: &mut Vec<HotelQuote>, incoming: Vec<HotelQuote>) {
    for quote in incoming {
        let key = quote.name.trim().to_lowercase();
        match merged
            .iter_mut()
            .find(|existing| existing.name.trim().to_lowercase() == key)
        {
            Some(existing) => {
                if quote.price < existing.price {
                    *existing = quote;
                }
            }
            None => merged.push(quote),
        }
    }
}

fn apply_date_result(date: NaiveDate, fetch: DateFetch, outcome: &mut CollectOutcome) {
    outcome.calls_used += fetch.calls;
    match fetch.result {
        Ok((quotes, partial)) => {
            outcome.dates_completed += 1;
            if quotes.is_empty() {
                log::debug!("{}: market came back empty, nothing to persist", date);
                outcome.empty_dates.push(date);
            } else {
                outcome
                    .accepted
                    .push(DateSnapshot::new(date, quotes, partial));
            }
        }
        Err(AppError::QuotaExhausted) => {
            log::warn!("{}: provider refused the call, quota exhausted", date);
            outcome.quota_halted = true;
            outcome.errors.push(DateError {
                date,
                reason: "quota-reached".to_string(),
            });
        }
        Err(AppError::InvalidCredential) => {
            log::error!("{}: provider rejected the credential", date);
            outcome.state = RunState::CredentialFailed;
            outcome.errors.push(DateError {
                date,
                reason: "invalid-credential".to_string(),
            });
        }
        Err(err) => {
            log::warn!("{}: {}", date, err);
            outcome.errors.push(DateError {
                date,
                reason: err.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::fetch::provider::{AccountStatus, PageResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::HashMap;

    #[derive(Clone)]
    enum Script {
        Page {
            records: Vec<Value>,
            total_pages: Option<u32>,
        },
        Quota,
        Credential,
        Transient(&'static str),
    }

    struct ScriptedSource {
        scripts: HashMap<(NaiveDate, u32), Script>,
        fallback: Script,
    }

    impl ScriptedSource {
        fn new() -> Self {
            Self {
                scripts: HashMap::new(),
                fallback: Script::Page {
                    records: vec![record("Fallback Hotel", 100.0)],
                    total_pages: None,
                },
            }
        }

        fn script(mut self, date: NaiveDate, page: u32, script: Script) -> Self {
            self.scripts.insert((date, page), script);
            self
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch_page(&self, date: NaiveDate, page: u32) -> crate::error::Result<PageResult> {
            let script = self.scripts.get(&(date, page)).unwrap_or(&self.fallback);
            match script {
                Script::Page {
                    records,
                    total_pages,
                } => Ok(PageResult {
                    records: records.clone(),
                    page,
                    total_pages: *total_pages,
                    total_results: None,
                }),
                Script::Quota => Err(AppError::QuotaExhausted),
                Script::Credential => Err(AppError::InvalidCredential),
                Script::Transient(message) => Err(AppError::message(*message)),
            }
        }

        async fn account_status(&self) -> crate::error::Result<AccountStatus> {
            Ok(AccountStatus {
                plan_limit: 100,
                used: 0,
                remaining: 100,
            })
        }
    }

    fn record(name: &str, price: f64) -> Value {
        json!({"name": name, "price": price})
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 6, day).unwrap()
    }

    fn dates(n: u32) -> Vec<NaiveDate> {
        (1..=n).map(date).collect()
    }

    fn options() -> CollectOptions {
        CollectOptions {
            inter_call_delay: Duration::ZERO,
            ..CollectOptions::default()
        }
    }

    fn collector(source: ScriptedSource, options: CollectOptions) -> Collector<ScriptedSource> {
        Collector::new(source, Config::builtin(), options)
    }

    #[tokio::test]
    async fn collects_every_requested_date() {
        let source = ScriptedSource::new()
            .script(
                date(1),
                0,
                Script::Page {
                    records: vec![record("B Hotel", 120.0), record("A Hotel", 80.0)],
                    total_pages: None,
                },
            );

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&dates(2), &mut quota).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.dates_completed, 2);
        assert_eq!(outcome.calls_used, 2);
        assert!(!outcome.quota_halted);
        // Quotes come out price-ascending.
        assert_eq!(outcome.accepted[0].quotes[0].name, "A Hotel");
        assert_eq!(quota.calls_this_session(), 2);
    }

    #[tokio::test]
    async fn quota_exhaustion_halts_later_dates() {
        let source = ScriptedSource::new().script(date(3), 0, Script::Quota);

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&dates(5), &mut quota).await;

        assert_eq!(outcome.state, RunState::QuotaHalted);
        assert!(outcome.quota_halted);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.dates_skipped, 2);
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].date, date(3));
        assert_eq!(outcome.errors[0].reason, "quota-reached");
    }

    #[tokio::test]
    async fn stop_on_limit_false_keeps_collecting() {
        let source = ScriptedSource::new().script(date(1), 0, Script::Quota);
        let mut opts = options();
        opts.stop_on_limit = false;

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, opts).collect(&dates(3), &mut quota).await;

        assert_eq!(outcome.state, RunState::QuotaHalted);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.dates_skipped, 0);
    }

    #[tokio::test]
    async fn transient_failures_stay_local_to_their_date() {
        let source = ScriptedSource::new().script(date(2), 0, Script::Transient("socket reset"));

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&dates(3), &mut quota).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert!(!outcome.quota_halted);
        assert_eq!(outcome.accepted.len(), 2);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].reason.contains("socket reset"));
    }

    #[tokio::test]
    async fn credential_failure_stops_the_run_distinctly() {
        let source = ScriptedSource::new().script(date(2), 0, Script::Credential);

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&dates(4), &mut quota).await;

        assert_eq!(outcome.state, RunState::CredentialFailed);
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.dates_skipped, 2);
        assert_eq!(outcome.errors[0].reason, "invalid-credential");
    }

    #[tokio::test]
    async fn known_budget_truncates_the_plan_up_front() {
        let source = ScriptedSource::new();

        let mut quota = QuotaTracker::with_remaining(6);
        let outcome = collector(source, options()).collect(&dates(10), &mut quota).await;

        assert_eq!(outcome.dates_completed, 6);
        assert_eq!(outcome.dates_skipped, 4);
        assert!(outcome.quota_halted);
        assert_eq!(outcome.state, RunState::QuotaHalted);
        assert_eq!(outcome.calls_used, 6);
        assert_eq!(quota.remaining(), Some(0));
    }

    #[tokio::test]
    async fn full_fetch_follows_declared_pages_and_merges_vendors() {
        let source = ScriptedSource::new()
            .script(
                date(1),
                0,
                Script::Page {
                    records: vec![record("Alpha", 100.0), record("Beta", 90.0)],
                    total_pages: Some(3),
                },
            )
            .script(
                date(1),
                1,
                Script::Page {
                    records: vec![record("Gamma", 110.0)],
                    total_pages: Some(3),
                },
            )
            .script(
                date(1),
                2,
                Script::Page {
                    // A cheaper duplicate replaces the page-0 entry.
                    records: vec![record("Alpha", 95.0)],
                    total_pages: Some(3),
                },
            );

        let mut opts = options();
        opts.full_fetch = true;

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, opts).collect(&[date(1)], &mut quota).await;

        assert_eq!(outcome.calls_used, 3);
        let snapshot = &outcome.accepted[0];
        assert!(!snapshot.partial);
        assert_eq!(snapshot.quotes.len(), 3);
        let alpha = snapshot.quotes.iter().find(|q| q.name == "Alpha").unwrap();
        assert_eq!(alpha.price, 95.0);
    }

    #[tokio::test]
    async fn page_cap_marks_the_snapshot_partial() {
        let mut source = ScriptedSource::new();
        for page in 0..PAGE_CAP {
            source = source.script(
                date(1),
                page,
                Script::Page {
                    records: vec![record(&format!("Hotel {}", page), 100.0 + page as f64)],
                    total_pages: Some(8),
                },
            );
        }

        let mut opts = options();
        opts.full_fetch = true;

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, opts).collect(&[date(1)], &mut quota).await;

        assert_eq!(outcome.calls_used, PAGE_CAP);
        assert!(outcome.accepted[0].partial);
    }

    #[tokio::test]
    async fn page_zero_only_mode_marks_partial_when_more_pages_exist() {
        let source = ScriptedSource::new().script(
            date(1),
            0,
            Script::Page {
                records: vec![record("Alpha", 100.0)],
                total_pages: Some(4),
            },
        );

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&[date(1)], &mut quota).await;

        assert_eq!(outcome.calls_used, 1);
        assert!(outcome.accepted[0].partial);
    }

    #[tokio::test]
    async fn empty_markets_are_reported_but_not_emitted() {
        let source = ScriptedSource::new().script(
            date(1),
            0,
            Script::Page {
                records: vec![],
                total_pages: None,
            },
        );

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, options()).collect(&dates(2), &mut quota).await;

        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.empty_dates, vec![date(1)]);
        assert_eq!(outcome.dates_completed, 2);
    }

    #[tokio::test]
    async fn batched_mode_finishes_the_batch_before_halting() {
        let source = ScriptedSource::new().script(date(1), 0, Script::Quota);
        let mut opts = options();
        opts.concurrency = 2;

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, opts).collect(&dates(4), &mut quota).await;

        // Date 2 was in flight alongside the fatal date 1 and still lands.
        assert_eq!(outcome.accepted.len(), 1);
        assert_eq!(outcome.accepted[0].date, date(2));
        assert_eq!(outcome.dates_skipped, 2);
        assert!(outcome.quota_halted);
    }

    #[tokio::test]
    async fn batched_mode_collects_everything_when_healthy() {
        let source = ScriptedSource::new();
        let mut opts = options();
        opts.concurrency = 3;

        let mut quota = QuotaTracker::new();
        let outcome = collector(source, opts).collect(&dates(7), &mut quota).await;

        assert_eq!(outcome.state, RunState::Completed);
        assert_eq!(outcome.accepted.len(), 7);
        assert_eq!(outcome.calls_used, 7);
    }
}
