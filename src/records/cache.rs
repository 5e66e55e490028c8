use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};

use crate::error::Result;
use crate::records::DateSnapshot;
use crate::storage::{self, StoreDocument};

/// Date-keyed store of the latest accepted snapshot per date.
///
/// Merging is last-write-wins per date: a retry replaces the prior snapshot
/// wholesale, never quote-by-quote, so stale vendor prices cannot linger.
/// Empty snapshots are rejected outright; "collected, market empty" never
/// overwrites real data.
pub struct SnapshotCache {
    snapshots: HashMap<NaiveDate, DateSnapshot>,
    last_collected_at: Option<DateTime<Local>>,
    path: Option<PathBuf>,
}

impl SnapshotCache {
    pub fn in_memory() -> Self {
        Self {
            snapshots: HashMap::new(),
            last_collected_at: None,
            path: None,
        }
    }

    /// Load the cache from the persisted store, starting empty when the file
    /// is absent or carries an incompatible schema version.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let document = storage::load_store(&path)?;
        Ok(Self {
            snapshots: document.snapshots,
            last_collected_at: document.last_collected_at,
            path: Some(path),
        })
    }

    /// Accept a snapshot into the cache. A snapshot with zero quotes is a
    /// no-op; anything prior for that date stays untouched. Returns whether
    /// the snapshot was taken.
    pub fn merge(&mut self, snapshot: DateSnapshot) -> bool {
        if snapshot.is_empty() {
            log::debug!("Skipping empty snapshot for {}", snapshot.date);
            return false;
        }
        self.snapshots.insert(snapshot.date, snapshot);
        true
    }

    /// Fold a batch of accepted snapshots in. The collection time only
    /// advances when at least one snapshot actually lands.
    pub fn merge_all(&mut self, snapshots: Vec<DateSnapshot>) {
        let mut merged_any = false;
        for snapshot in snapshots {
            merged_any |= self.merge(snapshot);
        }
        if merged_any {
            self.last_collected_at = Some(Local::now());
        }
    }

    pub fn get(&self, date: NaiveDate) -> Option<&DateSnapshot> {
        self.snapshots.get(&date)
    }

    /// Dates with data, ascending. Analytics iterates over this order.
    pub fn list_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.snapshots.keys().copied().collect();
        dates.sort();
        dates
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn last_collected_at(&self) -> Option<DateTime<Local>> {
        self.last_collected_at
    }

    /// Drop every snapshot and the persisted file. Explicit user action only.
    pub fn reset(&mut self) -> Result<()> {
        self.snapshots.clear();
        self.last_collected_at = None;
        if let Some(path) = &self.path {
            storage::clear_store(path)?;
        }
        Ok(())
    }

    /// Write the current contents through to the persistence surface.
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let document = StoreDocument {
            schema_version: storage::SCHEMA_VERSION,
            snapshots: self.snapshots.clone(),
            last_collected_at: self.last_collected_at,
        };
        storage::save_store(path, &document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::quote;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, day).unwrap()
    }

    #[test]
    fn merge_rejects_empty_snapshots() {
        let mut cache = SnapshotCache::in_memory();
        cache.merge(DateSnapshot::new(
            date(1),
            vec![quote("Riviera Motel", 80.0)],
            false,
        ));

        cache.merge(DateSnapshot::new(date(1), vec![], false));

        let kept = cache.get(date(1)).unwrap();
        assert_eq!(kept.quotes.len(), 1);
        assert_eq!(kept.quotes[0].name, "Riviera Motel");
    }

    #[test]
    fn merge_is_idempotent_for_identical_data() {
        let mut cache = SnapshotCache::in_memory();
        let snapshot = DateSnapshot::new(
            date(1),
            vec![quote("Riviera Motel", 80.0), quote("Other Inn", 100.0)],
            false,
        );

        cache.merge(snapshot.clone());
        cache.merge(snapshot);

        assert_eq!(cache.len(), 1);
        let kept = cache.get(date(1)).unwrap();
        let prices: Vec<f64> = kept.quotes.iter().map(|q| q.price).collect();
        assert_eq!(prices, vec![80.0, 100.0]);
    }

    #[test]
    fn retry_replaces_the_prior_snapshot_wholesale() {
        let mut cache = SnapshotCache::in_memory();
        cache.merge(DateSnapshot::new(
            date(1),
            vec![quote("Riviera Motel", 80.0), quote("Other Inn", 100.0)],
            false,
        ));

        // A later partial refetch wins outright; quotes never accumulate.
        cache.merge(DateSnapshot::new(date(1), vec![quote("Other Inn", 95.0)], true));

        let kept = cache.get(date(1)).unwrap();
        assert_eq!(kept.quotes.len(), 1);
        assert_eq!(kept.quotes[0].name, "Other Inn");
        assert!(kept.partial);
    }

    #[test]
    fn list_dates_is_sorted() {
        let mut cache = SnapshotCache::in_memory();
        for day in [3, 1, 2] {
            cache.merge(DateSnapshot::new(date(day), vec![quote("A", 50.0)], false));
        }
        assert_eq!(cache.list_dates(), vec![date(1), date(2), date(3)]);
    }

    #[test]
    fn collection_time_stays_unset_when_nothing_lands() {
        let mut cache = SnapshotCache::in_memory();

        cache.merge_all(vec![]);
        cache.merge_all(vec![DateSnapshot::new(date(1), vec![], false)]);
        assert!(cache.last_collected_at().is_none());

        cache.merge_all(vec![DateSnapshot::new(
            date(1),
            vec![quote("Riviera Motel", 80.0)],
            false,
        )]);
        assert!(cache.last_collected_at().is_some());
    }

    #[test]
    fn persists_and_reloads_through_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");

        let mut cache = SnapshotCache::open(&path).unwrap();
        cache.merge_all(vec![DateSnapshot::new(
            date(1),
            vec![quote("Riviera Motel", 80.0)],
            false,
        )]);
        cache.save().unwrap();

        let reopened = SnapshotCache::open(&path).unwrap();
        assert_eq!(reopened.len(), 1);
        assert!(reopened.last_collected_at().is_some());
    }

    #[test]
    fn reset_drops_everything_including_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("snapshots.json");

        let mut cache = SnapshotCache::open(&path).unwrap();
        cache.merge(DateSnapshot::new(date(1), vec![quote("A", 50.0)], false));
        cache.save().unwrap();

        cache.reset().unwrap();

        assert!(cache.is_empty());
        assert!(!path.exists());
    }
}
