use chrono::{Local, NaiveDateTime};
use satlight_common::WindowPair;
use tokio::sync::RwLock;
use tracing::{error, info};

use super::store::StateStore;
use super::types::{Satellite, SatelliteSnapshot, SatelliteStatus, TableSnapshot};
use super::window::parse_windows;
use crate::error::StateError;

/// Current wall-clock time in the controller's local zone.
pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// The authoritative per-satellite state.
///
/// Owned by `main` and handed to both the HTTP layer and the render loop
/// behind an `Arc`. Every successful mutation is written to the store
/// before it returns, while still holding the write lock, so the file
/// always reflects mutations in the order they were applied.
pub struct SatelliteTable {
    store: StateStore,
    count: usize,
    satellites: RwLock<Vec<Satellite>>,
}

impl SatelliteTable {
    /// Load the table from `store`, falling back to `count` fresh satellites.
    pub async fn load(store: StateStore, count: usize) -> Self {
        let satellites = store.load(count).await;
        Self {
            store,
            count,
            satellites: RwLock::new(satellites),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn check_index(&self, index: usize) -> Result<(), StateError> {
        if index < self.count {
            Ok(())
        } else {
            Err(StateError::OutOfRange {
                index,
                count: self.count,
            })
        }
    }

    /// Persist the table. A write failure is logged and swallowed: the
    /// in-memory mutation stands and the next successful save catches up.
    async fn persist(&self, satellites: &[Satellite]) {
        if let Err(e) = self.store.save(satellites).await {
            error!("Failed to save satellite state to {:?}: {:#}", self.store.path(), e);
        }
    }

    /// Set the solved flag. Setting the current value again still persists.
    pub async fn set_solved(&self, index: usize, solved: bool) -> Result<(), StateError> {
        self.check_index(index)?;

        let mut satellites = self.satellites.write().await;
        satellites[index].solved = solved;
        info!(
            "Satellite {} marked as {}",
            index,
            if solved { "solved" } else { "unsolved" }
        );
        self.persist(&satellites).await;
        Ok(())
    }

    /// Append transmission windows to one satellite.
    ///
    /// Every pair is validated before anything is applied; one bad pair
    /// rejects the whole batch. Returns the satellite's new window count.
    pub async fn add_windows(&self, index: usize, pairs: &[WindowPair]) -> Result<usize, StateError> {
        self.check_index(index)?;
        let windows = parse_windows(pairs)?;

        let mut satellites = self.satellites.write().await;
        let added = windows.len();
        satellites[index].windows.extend(windows);
        let total = satellites[index].windows.len();
        info!(
            "Added {} transmission windows to satellite {} ({} total)",
            added, index, total
        );
        self.persist(&satellites).await;
        Ok(total)
    }

    pub async fn clear_windows(&self, index: usize) -> Result<(), StateError> {
        self.check_index(index)?;

        let mut satellites = self.satellites.write().await;
        satellites[index].windows.clear();
        info!("Cleared transmission windows for satellite {}", index);
        self.persist(&satellites).await;
        Ok(())
    }

    pub async fn clear_all_windows(&self) {
        let mut satellites = self.satellites.write().await;
        for satellite in satellites.iter_mut() {
            satellite.windows.clear();
        }
        info!("Cleared transmission windows for all {} satellites", self.count);
        self.persist(&satellites).await;
    }

    pub async fn is_transmitting(&self, index: usize, now: NaiveDateTime) -> Result<bool, StateError> {
        self.check_index(index)?;
        let satellites = self.satellites.read().await;
        Ok(satellites[index].is_transmitting(now))
    }

    /// Snapshot with transmitting flags evaluated against the wall clock.
    pub async fn snapshot(&self) -> TableSnapshot {
        self.snapshot_at(local_now()).await
    }

    pub async fn snapshot_at(&self, now: NaiveDateTime) -> TableSnapshot {
        let satellites = self.satellites.read().await;
        TableSnapshot {
            taken_at: now,
            satellites: satellites
                .iter()
                .enumerate()
                .map(|(index, sat)| SatelliteSnapshot {
                    index,
                    solved: sat.solved,
                    transmitting: sat.is_transmitting(now),
                    windows: sat.windows.clone(),
                })
                .collect(),
        }
    }

    /// Just the (solved, transmitting) pairs, without cloning window lists.
    pub async fn statuses_at(&self, now: NaiveDateTime) -> Vec<SatelliteStatus> {
        let satellites = self.satellites.read().await;
        satellites.iter().map(|sat| sat.status_at(now)).collect()
    }

    pub async fn transmitting_at(&self, now: NaiveDateTime) -> Vec<usize> {
        let satellites = self.satellites.read().await;
        satellites
            .iter()
            .enumerate()
            .filter(|(_, sat)| sat.is_transmitting(now))
            .map(|(index, _)| index)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::window::parse_timestamp;
    use tempfile::TempDir;

    fn pair(start: &str, end: &str) -> WindowPair {
        (start.to_string(), end.to_string())
    }

    async fn table(temp_dir: &TempDir, count: usize) -> SatelliteTable {
        SatelliteTable::load(StateStore::new(temp_dir.path().join("state.json")), count).await
    }

    #[tokio::test]
    async fn test_fresh_table_is_unsolved_and_idle() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 3).await;

        let snapshot = table.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        for sat in &snapshot.satellites {
            assert!(!sat.solved);
            assert!(!sat.transmitting);
            assert!(sat.windows.is_empty());
        }
    }

    #[tokio::test]
    async fn test_set_solved_round_trips_through_snapshot() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 3).await;

        for index in 0..3 {
            for value in [true, false, true] {
                table.set_solved(index, value).await.unwrap();
                assert_eq!(table.snapshot().await[index].solved, value);
            }
        }
    }

    #[tokio::test]
    async fn test_set_solved_is_idempotent_and_persists() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 2).await;

        table.set_solved(1, true).await.unwrap();
        std::fs::remove_file(temp_dir.path().join("state.json")).unwrap();
        table.set_solved(1, true).await.unwrap();

        assert!(temp_dir.path().join("state.json").exists());
        assert!(table.snapshot().await[1].solved);
    }

    #[tokio::test]
    async fn test_out_of_range_leaves_table_unchanged() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 3).await;
        let before = table.snapshot_at(parse_timestamp("2030/01/01 00:30:00").unwrap()).await;

        let expected = StateError::OutOfRange { index: 3, count: 3 };
        assert_eq!(table.set_solved(3, true).await, Err(expected.clone()));
        assert_eq!(
            table
                .add_windows(3, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
                .await,
            Err(expected.clone())
        );
        assert_eq!(table.clear_windows(3).await, Err(expected.clone()));
        assert_eq!(
            table.is_transmitting(7, before.taken_at).await,
            Err(StateError::OutOfRange { index: 7, count: 3 })
        );

        let after = table.snapshot_at(before.taken_at).await;
        assert_eq!(before, after);
        assert!(!temp_dir.path().join("state.json").exists());
    }

    #[tokio::test]
    async fn test_is_transmitting_follows_windows() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 2).await;
        table
            .add_windows(
                0,
                &[
                    pair("2030/01/01 00:00:00", "2030/01/01 01:00:00"),
                    pair("2030/01/01 00:30:00", "2030/01/01 02:00:00"),
                ],
            )
            .await
            .unwrap();

        let at = |s: &str| parse_timestamp(s).unwrap();
        assert!(!table.is_transmitting(0, at("2029/12/31 23:59:59")).await.unwrap());
        assert!(table.is_transmitting(0, at("2030/01/01 00:10:00")).await.unwrap());
        assert!(table.is_transmitting(0, at("2030/01/01 01:30:00")).await.unwrap());
        assert!(!table.is_transmitting(0, at("2030/01/01 02:00:00")).await.unwrap());
        assert!(!table.is_transmitting(1, at("2030/01/01 00:10:00")).await.unwrap());
        assert_eq!(table.transmitting_at(at("2030/01/01 00:10:00")).await, vec![0]);
    }

    #[tokio::test]
    async fn test_add_windows_rejects_empty_window_without_mutation() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 1).await;
        table
            .add_windows(0, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
            .await
            .unwrap();

        let result = table
            .add_windows(
                0,
                &[
                    pair("2030/02/01 00:00:00", "2030/02/01 01:00:00"),
                    pair("2030/03/01 00:00:00", "2030/03/01 00:00:00"),
                ],
            )
            .await;

        assert!(matches!(result, Err(StateError::InvalidWindow(_))));
        let snapshot = table.snapshot().await;
        assert_eq!(snapshot[0].windows.len(), 1);
    }

    #[tokio::test]
    async fn test_add_windows_rejects_malformed_timestamp() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 1).await;

        let result = table
            .add_windows(0, &[pair("tomorrow", "2030/01/01 01:00:00")])
            .await;
        assert!(matches!(result, Err(StateError::InvalidWindow(_))));
        assert!(table.snapshot().await[0].windows.is_empty());
    }

    #[tokio::test]
    async fn test_clear_windows_twice_is_stable() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 2).await;
        table
            .add_windows(0, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
            .await
            .unwrap();
        table
            .add_windows(1, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
            .await
            .unwrap();

        table.clear_windows(0).await.unwrap();
        let first = table.snapshot().await;
        table.clear_windows(0).await.unwrap();
        let second = table.snapshot().await;

        assert!(first[0].windows.is_empty());
        assert_eq!(first[0], second[0]);
        assert_eq!(second[1].windows.len(), 1);

        table.clear_all_windows().await;
        assert!(table.snapshot().await.satellites.iter().all(|s| s.windows.is_empty()));
    }

    #[tokio::test]
    async fn test_reload_reproduces_table() {
        let temp_dir = TempDir::new().unwrap();
        let original = table(&temp_dir, 3).await;
        original.set_solved(0, true).await.unwrap();
        original
            .add_windows(2, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
            .await
            .unwrap();
        original
            .add_windows(2, &[pair("2031/06/01 12:00:00", "2031/06/01 12:05:00")])
            .await
            .unwrap();

        let reloaded = table(&temp_dir, 3).await;
        let now = parse_timestamp("2030/01/01 00:30:00").unwrap();
        assert_eq!(original.snapshot_at(now).await, reloaded.snapshot_at(now).await);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_mutation() {
        let temp_dir = TempDir::new().unwrap();
        // a regular file where the state directory should be
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, "").unwrap();
        let table =
            SatelliteTable::load(StateStore::new(blocker.join("state.json")), 2).await;

        assert_eq!(table.set_solved(1, true).await, Ok(()));
        assert!(table.snapshot().await[1].solved);
    }

    #[tokio::test]
    async fn test_scenario_three_satellites() {
        let temp_dir = TempDir::new().unwrap();
        let table = table(&temp_dir, 3).await;
        table.set_solved(1, true).await.unwrap();
        table
            .add_windows(2, &[pair("2030/01/01 00:00:00", "2030/01/01 01:00:00")])
            .await
            .unwrap();

        let snapshot = table
            .snapshot_at(parse_timestamp("2030/01/01 00:30:00").unwrap())
            .await;
        assert_eq!((snapshot[0].solved, snapshot[0].transmitting), (false, false));
        assert_eq!((snapshot[1].solved, snapshot[1].transmitting), (true, false));
        assert_eq!((snapshot[2].solved, snapshot[2].transmitting), (false, true));
        assert_eq!(snapshot.transmitting_indices(), vec![2]);
    }
}
