///! Transmission windows
use chrono::NaiveDateTime;
use satlight_common::WindowPair;

use crate::error::StateError;

/// Timestamp format used by the scoring platform and the state file.
pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Parse a `YYYY/MM/DD HH:MM:SS` timestamp in controller-local time.
pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, StateError> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        StateError::InvalidWindow(format!(
            "'{}' is not a valid timestamp (expected YYYY/MM/DD HH:MM:SS): {}",
            value, e
        ))
    })
}

pub fn format_timestamp(value: &NaiveDateTime) -> String {
    value.format(TIMESTAMP_FORMAT).to_string()
}

/// Half-open interval `[start, end)` during which a satellite transmits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

impl TimeWindow {
    /// Build a window, rejecting empty and inverted ranges.
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, StateError> {
        if start >= end {
            return Err(StateError::InvalidWindow(format!(
                "start {} must be before end {}",
                format_timestamp(&start),
                format_timestamp(&end)
            )));
        }
        Ok(Self { start, end })
    }

    pub fn parse(start: &str, end: &str) -> Result<Self, StateError> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn from_pair(pair: &WindowPair) -> Result<Self, StateError> {
        Self::parse(&pair.0, &pair.1)
    }

    pub fn to_pair(&self) -> WindowPair {
        (format_timestamp(&self.start), format_timestamp(&self.end))
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    /// `now == end` is already outside the window.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        self.start <= now && now < self.end
    }
}

/// Parse a batch of wire pairs, failing on the first bad one.
pub fn parse_windows(pairs: &[WindowPair]) -> Result<Vec<TimeWindow>, StateError> {
    pairs.iter().map(TimeWindow::from_pair).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(value: &str) -> NaiveDateTime {
        parse_timestamp(value).unwrap()
    }

    #[test]
    fn test_window_is_half_open() {
        let window = TimeWindow::parse("2030/01/01 00:00:00", "2030/01/01 01:00:00").unwrap();

        assert!(!window.contains(ts("2029/12/31 23:59:59")));
        assert!(window.contains(ts("2030/01/01 00:00:00")));
        assert!(window.contains(ts("2030/01/01 00:59:59")));
        assert!(!window.contains(ts("2030/01/01 01:00:00")));
    }

    #[test]
    fn test_empty_and_inverted_windows_rejected() {
        let empty = TimeWindow::parse("2030/01/01 00:00:00", "2030/01/01 00:00:00");
        assert!(matches!(empty, Err(StateError::InvalidWindow(_))));

        let inverted = TimeWindow::parse("2030/01/01 02:00:00", "2030/01/01 01:00:00");
        assert!(matches!(inverted, Err(StateError::InvalidWindow(_))));
    }

    #[test]
    fn test_malformed_timestamp_rejected() {
        assert!(parse_timestamp("2030-01-01 00:00:00").is_err());
        assert!(parse_timestamp("2030/13/01 00:00:00").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn test_pair_formatting_matches_input() {
        let pair = ("2030/01/01 00:00:00".to_string(), "2030/01/01 01:00:00".to_string());
        let window = TimeWindow::from_pair(&pair).unwrap();
        assert_eq!(window.to_pair(), pair);
    }

    #[test]
    fn test_parse_windows_is_all_or_nothing() {
        let pairs = vec![
            ("2030/01/01 00:00:00".to_string(), "2030/01/01 01:00:00".to_string()),
            ("2030/01/01 03:00:00".to_string(), "2030/01/01 02:00:00".to_string()),
        ];
        assert!(parse_windows(&pairs).is_err());
    }
}
