use chrono::NaiveDateTime;
use satlight_common::{PersistedSatellite, SatelliteView};
use std::ops::Index;

use super::window::{TimeWindow, format_timestamp, parse_windows};
use crate::error::StateError;

/// One satellite as held by the state table.
///
/// `transmitting` is deliberately absent: it is derived from `windows`
/// against the clock every time somebody asks.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Satellite {
    pub solved: bool,
    pub windows: Vec<TimeWindow>,
}

impl Satellite {
    /// True if `now` falls inside any stored window. Overlaps are a union.
    pub fn is_transmitting(&self, now: NaiveDateTime) -> bool {
        self.windows.iter().any(|w| w.contains(now))
    }

    pub fn status_at(&self, now: NaiveDateTime) -> SatelliteStatus {
        SatelliteStatus {
            solved: self.solved,
            transmitting: self.is_transmitting(now),
        }
    }

    pub fn to_persisted(&self) -> PersistedSatellite {
        PersistedSatellite {
            solved: self.solved,
            transmission_times: self.windows.iter().map(TimeWindow::to_pair).collect(),
        }
    }

    pub fn from_persisted(persisted: &PersistedSatellite) -> Result<Self, StateError> {
        Ok(Self {
            solved: persisted.solved,
            windows: parse_windows(&persisted.transmission_times)?,
        })
    }
}

/// The two booleans the pattern resolver cares about.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SatelliteStatus {
    pub solved: bool,
    pub transmitting: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatelliteSnapshot {
    pub index: usize,
    pub solved: bool,
    pub transmitting: bool,
    pub windows: Vec<TimeWindow>,
}

impl SatelliteSnapshot {
    pub fn to_view(&self) -> SatelliteView {
        SatelliteView {
            index: self.index,
            solved: self.solved,
            transmitting: self.transmitting,
            transmission_times: self.windows.iter().map(TimeWindow::to_pair).collect(),
        }
    }
}

/// Immutable read of the whole table, with transmitting flags evaluated at `taken_at`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSnapshot {
    pub taken_at: NaiveDateTime,
    pub satellites: Vec<SatelliteSnapshot>,
}

impl TableSnapshot {
    pub fn len(&self) -> usize {
        self.satellites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.satellites.is_empty()
    }

    pub fn transmitting_indices(&self) -> Vec<usize> {
        self.satellites
            .iter()
            .filter(|s| s.transmitting)
            .map(|s| s.index)
            .collect()
    }

    pub fn to_views(&self) -> Vec<SatelliteView> {
        self.satellites.iter().map(SatelliteSnapshot::to_view).collect()
    }
}

impl Index<usize> for TableSnapshot {
    type Output = SatelliteSnapshot;

    fn index(&self, index: usize) -> &Self::Output {
        &self.satellites[index]
    }
}

impl std::fmt::Display for TableSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let solved = self.satellites.iter().filter(|s| s.solved).count();
        let transmitting = self.satellites.iter().filter(|s| s.transmitting).count();
        write!(
            f,
            "{} satellites, {} solved, {} transmitting at {}",
            self.satellites.len(),
            solved,
            transmitting,
            format_timestamp(&self.taken_at)
        )
    }
}
