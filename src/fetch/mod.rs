use crate::error::Result;

pub mod normalize;
pub mod orchestrator;
pub mod provider;
pub mod quota;

pub use orchestrator::{CollectOptions, CollectOutcome, Collector, DateError, RunState};
pub use provider::{AccountStatus, HttpPriceSource, PageResult, PriceSource};
pub use quota::QuotaTracker;

/// Hard ceiling on pages fetched per date, even when the provider declares
/// more. Each page costs one metered credit.
pub const PAGE_CAP: u32 = 5;

pub type FetchResult<T> = Result<T>;

#[inline]
pub fn ensure_concurrency_limit(limit: usize) -> usize {
    limit.max(1)
}
