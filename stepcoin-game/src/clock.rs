//! Calendar-date source used for day rollover.
//!
//! Days are compared as `%Y-%m-%d` strings. The system clock reads the
//! device-local date, so rollover happens at local midnight.
use chrono::{Days, Local, NaiveDate};
use std::sync::{Arc, Mutex, PoisonError};

use crate::constants::DATE_FORMAT;

/// Provider of the current calendar date.
pub trait Clock: Send + Sync {
    /// Today's date as an ISO date-only string.
    fn today(&self) -> String;
}

/// Format a date the way reward state stores it.
#[must_use]
pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Device-local wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> String {
        format_date(Local::now().date_naive())
    }
}

/// Settable clock shared between a controller and whoever drives time.
#[derive(Debug, Clone)]
pub struct FixedClock {
    date: Arc<Mutex<NaiveDate>>,
}

impl FixedClock {
    #[must_use]
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Arc::new(Mutex::new(date)),
        }
    }

    /// Parse a `%Y-%m-%d` date.
    ///
    /// # Errors
    ///
    /// Returns the chrono parse error when `date` is not an ISO date.
    pub fn parse(date: &str) -> Result<Self, chrono::ParseError> {
        NaiveDate::parse_from_str(date, DATE_FORMAT).map(Self::new)
    }

    #[must_use]
    pub fn date(&self) -> NaiveDate {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, date: NaiveDate) {
        *self.date.lock().unwrap_or_else(PoisonError::into_inner) = date;
    }

    /// Move the clock forward by whole days.
    pub fn advance_days(&self, days: u64) {
        let mut guard = self.date.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(next) = guard.checked_add_days(Days::new(days)) {
            *guard = next;
        }
    }
}

impl Clock for FixedClock {
    fn today(&self) -> String {
        format_date(self.date())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_is_shared_and_advances() {
        let clock = FixedClock::parse("2024-01-31").unwrap();
        let handle = clock.clone();
        assert_eq!(clock.today(), "2024-01-31");

        handle.advance_days(1);
        assert_eq!(clock.today(), "2024-02-01");

        handle.set(NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
        assert_eq!(clock.today(), "2024-12-31");
    }

    #[test]
    fn parse_rejects_non_iso_dates() {
        assert!(FixedClock::parse("01/02/2024").is_err());
    }

    #[test]
    fn system_clock_produces_iso_date() {
        let today = SystemClock.today();
        assert!(NaiveDate::parse_from_str(&today, DATE_FORMAT).is_ok());
    }
}
