pub mod cache;

pub use cache::SnapshotCache;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};

/// Where a hotel sits relative to the operator's own portfolio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Own,
    DirectCompetitor,
    TrackedCompetitor,
    Market,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// One observed nightly price for one property on one stay-date.
pub struct HotelQuote {
    pub name: String,
    pub stable_id: Option<String>,
    /// Lowest price found across the record's vendors. Always positive;
    /// records without a resolvable positive price never become quotes.
    pub price: f64,
    pub vendor: Option<String>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub category: Category,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/// The full market observed for one calendar stay-date.
pub struct DateSnapshot {
    pub date: NaiveDate,
    pub fetched_at: DateTime<Local>,
    /// Sorted ascending by price at construction time.
    pub quotes: Vec<HotelQuote>,
    /// True when fewer than the provider's full catalog was retrieved,
    /// e.g. only page 0 of N.
    pub partial: bool,
}

impl DateSnapshot {
    pub fn new(date: NaiveDate, mut quotes: Vec<HotelQuote>, partial: bool) -> Self {
        quotes.sort_by(|a, b| a.price.total_cmp(&b.price));
        Self {
            date,
            fetched_at: Local::now(),
            quotes,
            partial,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn lowest(&self) -> Option<&HotelQuote> {
        self.quotes.first()
    }

    pub fn highest(&self) -> Option<&HotelQuote> {
        self.quotes.last()
    }
}

#[cfg(test)]
pub(crate) fn quote(name: &str, price: f64) -> HotelQuote {
    HotelQuote {
        name: name.to_string(),
        stable_id: None,
        price,
        vendor: None,
        rating: None,
        review_count: None,
        category: Category::Market,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_sorts_quotes_ascending_by_price() {
        let snapshot = DateSnapshot::new(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            vec![quote("B", 120.0), quote("A", 80.0), quote("C", 95.5)],
            false,
        );

        let prices: Vec<f64> = snapshot.quotes.iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![80.0, 95.5, 120.0]);
        for pair in snapshot.quotes.windows(2) {
            assert!(pair[0].price <= pair[1].price);
        }
    }

    #[test]
    fn lowest_and_highest_track_the_sorted_ends() {
        let snapshot = DateSnapshot::new(
            NaiveDate::from_ymd_opt(2026, 5, 1).unwrap(),
            vec![quote("Mid", 100.0), quote("Cheap", 60.0), quote("Dear", 140.0)],
            true,
        );

        assert_eq!(snapshot.lowest().unwrap().name, "Cheap");
        assert_eq!(snapshot.highest().unwrap().name, "Dear");
        assert!(snapshot.partial);
    }
}
