use chrono::NaiveDate;
use thiserror::Error;

use crate::system::CalendarSystem;

/// Failures raised by a [`crate::oracle::NepaliOracle`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    #[error("year {year} is outside the supported range {first}..={last}")]
    YearOutOfRange { year: i32, first: i32, last: i32 },

    #[error("gregorian date {date} is outside the supported range")]
    DateOutOfRange { date: NaiveDate },

    #[error("month index {month} is not in 0..=11")]
    InvalidMonth { month: u32 },

    #[error("day {day} does not exist in {year}-{month:02} ({days} days)")]
    InvalidDay {
        year: i32,
        month: u32,
        day: u32,
        days: u32,
    },

    #[error("malformed month-length table: {0}")]
    MalformedTable(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CalendarError {
    /// The oracle could not interpret or produce a date. Recovered by
    /// the Gregorian fallback on the format, month-range and sequence
    /// paths.
    #[error("{system} calendar conversion failed: {source}")]
    ConversionFailure {
        system: CalendarSystem,
        #[source]
        source: OracleError,
    },

    #[error("unrecognized range token: {0:?}")]
    InvalidRangeToken(String),

    /// `month` is zero-based, matching [`crate::system::CalendarDate`].
    #[error(
        "day {requested} is out of range for {system} {year}-{month}; clamped to {clamped}"
    )]
    OutOfRangeDay {
        system: CalendarSystem,
        year: i32,
        month: u32,
        requested: u32,
        clamped: u32,
    },

    #[error("invalid date: {0}")]
    InvalidDate(String),

    #[error("unknown calendar system: {0:?}")]
    UnknownSystem(String),

    #[error("calendar system {0} is not registered")]
    UnregisteredSystem(CalendarSystem),
}

impl CalendarError {
    pub fn conversion(system: CalendarSystem, source: OracleError) -> Self {
        Self::ConversionFailure { system, source }
    }

    pub fn is_conversion_failure(&self) -> bool {
        matches!(self, Self::ConversionFailure { .. })
    }
}
