//! Derived views over the snapshot cache. Everything here is a pure read;
//! nothing mutates cache state.

use chrono::NaiveDate;

use crate::config::OwnProperty;
use crate::records::SnapshotCache;

/// Day-over-day move that trips a price alert, in percent.
pub const RATE_ALERT_THRESHOLD_PCT: f64 = 15.0;

/// A date counts as high-demand when its average exceeds this multiple of
/// the global mean of per-date averages.
pub const HIGH_DEMAND_RATIO: f64 = 1.2;

/// Cap on the high-demand list.
pub const HIGH_DEMAND_MAX_RESULTS: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct DateStats {
    pub count: usize,
    pub lowest: f64,
    pub highest: f64,
    pub average: f64,
    /// Middle element of the price-ascending list; lower-middle on even
    /// counts. The two middle values are deliberately never averaged, so a
    /// median always names a price that was actually quoted.
    pub median: f64,
    pub spread: f64,
    pub cheapest: String,
    pub priciest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateChange {
    pub name: String,
    pub old_price: f64,
    pub new_price: f64,
    /// Unrounded. Sorting and the alert threshold compare this value;
    /// display rounds to one decimal place.
    pub percent_change: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceAlert {
    pub date_from: NaiveDate,
    pub date_to: NaiveDate,
    pub change: RateChange,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HighDemandDate {
    pub date: NaiveDate,
    pub average: f64,
}

/// Per-date market statistics, or `None` when the date has no data.
pub fn date_stats(cache: &SnapshotCache, date: NaiveDate) -> Option<DateStats> {
    let snapshot = cache.get(date)?;
    let priced: Vec<_> = snapshot
        .quotes
        .iter()
        .filter(|quote| quote.price > 0.0)
        .collect();
    if priced.is_empty() {
        return None;
    }

    let count = priced.len();
    let lowest = priced[0].price;
    let highest = priced[count - 1].price;
    let average = priced.iter().map(|quote| quote.price).sum::<f64>() / count as f64;
    let median = priced[(count - 1) / 2].price;

    Some(DateStats {
        count,
        lowest,
        highest,
        average,
        median,
        spread: highest - lowest,
        cheapest: priced[0].name.clone(),
        priciest: priced[count - 1].name.clone(),
    })
}

/// 1-based rank of the property in the price-ascending quote list for the
/// date, or `None` when the property has no quote that day.
pub fn market_position(
    cache: &SnapshotCache,
    date: NaiveDate,
    property: &OwnProperty,
) -> Option<usize> {
    let snapshot = cache.get(date)?;
    snapshot
        .quotes
        .iter()
        .position(|quote| property.matches(&quote.name))
        .map(|index| index + 1)
}

/// Pair quotes across two dates by hotel name and report every changed
/// price, sorted by absolute percent change descending. Unchanged prices
/// are excluded.
pub fn rate_changes(
    cache: &SnapshotCache,
    date_a: NaiveDate,
    date_b: NaiveDate,
) -> Vec<RateChange> {
    let (Some(before), Some(after)) = (cache.get(date_a), cache.get(date_b)) else {
        return Vec::new();
    };

    let mut changes = Vec::new();
    for old_quote in &before.quotes {
        let key = old_quote.name.trim().to_lowercase();
        let Some(new_quote) = after
            .quotes
            .iter()
            .find(|quote| quote.name.trim().to_lowercase() == key)
        else {
            continue;
        };
        if new_quote.price == old_quote.price {
            continue;
        }

        changes.push(RateChange {
            name: old_quote.name.clone(),
            old_price: old_quote.price,
            new_price: new_quote.price,
            percent_change: (new_quote.price - old_quote.price) / old_quote.price * 100.0,
        });
    }

    changes.sort_by(|a, b| {
        b.percent_change
            .abs()
            .total_cmp(&a.percent_change.abs())
    });
    changes
}

/// Scan consecutive date pairs within the most recent `window` cached dates
/// and flag any hotel whose price moved at least the alert threshold.
pub fn price_alerts(cache: &SnapshotCache, window: usize) -> Vec<PriceAlert> {
    let dates = cache.list_dates();
    let recent = if dates.len() > window {
        &dates[dates.len() - window..]
    } else {
        &dates[..]
    };

    let mut alerts = Vec::new();
    for pair in recent.windows(2) {
        for change in rate_changes(cache, pair[0], pair[1]) {
            if change.percent_change.abs() >= RATE_ALERT_THRESHOLD_PCT {
                alerts.push(PriceAlert {
                    date_from: pair[0],
                    date_to: pair[1],
                    change,
                });
            }
        }
    }
    alerts
}

/// Dates whose average price exceeds the high-demand multiple of the global
/// mean of per-date averages, sorted by average descending and capped.
pub fn high_demand_dates(cache: &SnapshotCache) -> Vec<HighDemandDate> {
    let averages: Vec<(NaiveDate, f64)> = cache
        .list_dates()
        .into_iter()
        .filter_map(|date| date_stats(cache, date).map(|stats| (date, stats.average)))
        .collect();
    if averages.is_empty() {
        return Vec::new();
    }

    let global_mean =
        averages.iter().map(|(_, average)| average).sum::<f64>() / averages.len() as f64;
    let threshold = global_mean * HIGH_DEMAND_RATIO;

    let mut flagged: Vec<HighDemandDate> = averages
        .into_iter()
        .filter(|(_, average)| *average > threshold)
        .map(|(date, average)| HighDemandDate { date, average })
        .collect();

    flagged.sort_by(|a, b| b.average.total_cmp(&a.average));
    flagged.truncate(HIGH_DEMAND_MAX_RESULTS);
    flagged
}
