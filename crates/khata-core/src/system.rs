use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CalendarError;

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum CalendarSystem {
    #[default]
    #[value(alias = "ad")]
    Gregorian,
    /// Bikram Sambat.
    #[value(alias = "bs")]
    Nepali,
}

impl CalendarSystem {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gregorian => "gregorian",
            Self::Nepali => "nepali",
        }
    }
}

impl fmt::Display for CalendarSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CalendarSystem {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gregorian" | "ad" => Ok(Self::Gregorian),
            "nepali" | "bs" | "bikram-sambat" => Ok(Self::Nepali),
            _ => Err(CalendarError::UnknownSystem(s.to_string())),
        }
    }
}

/// A day under a specific calendar system.
///
/// `month` is zero-based (0..=11) in every system; `day` is one-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CalendarDate {
    pub system: CalendarSystem,
    pub year: i32,
    pub month: u32,
    pub day: u32,
}

impl CalendarDate {
    pub fn new(system: CalendarSystem, year: i32, month: u32, day: u32) -> Self {
        Self {
            system,
            year,
            month,
            day,
        }
    }

    pub fn first_of_month(self) -> Self {
        Self { day: 1, ..self }
    }

    /// One-based month number for display.
    pub fn month_number(&self) -> u32 {
        self.month + 1
    }

    /// Calendar-month arithmetic with year carry/borrow. The day is kept
    /// as-is and may no longer exist in the target month.
    pub fn shift_months(self, delta: i32) -> Self {
        let total = i64::from(self.year) * 12 + i64::from(self.month) + i64::from(delta);
        let year = i32::try_from(total.div_euclid(12))
            .unwrap_or(if total < 0 { i32::MIN } else { i32::MAX });
        let month = u32::try_from(total.rem_euclid(12)).unwrap_or(0);
        Self {
            year,
            month,
            ..self
        }
    }
}

/// Outcome of an operation that can degrade instead of failing.
///
/// `Degraded` carries a usable value together with the reason it is not
/// the faithful answer: a Gregorian fallback after a conversion failure,
/// or a clamped day.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved<T> {
    Exact(T),
    Degraded { value: T, cause: CalendarError },
}

impl<T> Resolved<T> {
    pub fn degraded(value: T, cause: CalendarError) -> Self {
        Self::Degraded { value, cause }
    }

    pub fn value(&self) -> &T {
        match self {
            Self::Exact(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Self::Exact(value) | Self::Degraded { value, .. } => value,
        }
    }

    pub fn into_parts(self) -> (T, Option<CalendarError>) {
        match self {
            Self::Exact(value) => (value, None),
            Self::Degraded { value, cause } => (value, Some(cause)),
        }
    }

    pub fn cause(&self) -> Option<&CalendarError> {
        match self {
            Self::Exact(_) => None,
            Self::Degraded { cause, .. } => Some(cause),
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Self::Exact(_))
    }

    /// True when the value is a Gregorian stand-in for a failed conversion.
    pub fn is_fallback(&self) -> bool {
        self.cause()
            .is_some_and(CalendarError::is_conversion_failure)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resolved<U> {
        match self {
            Self::Exact(value) => Resolved::Exact(f(value)),
            Self::Degraded { value, cause } => Resolved::Degraded {
                value: f(value),
                cause,
            },
        }
    }

    /// Keeps the first cause when both sides are degraded.
    pub fn with_cause(self, cause: Option<CalendarError>) -> Self {
        match (self, cause) {
            (Self::Exact(value), Some(cause)) => Self::Degraded { value, cause },
            (resolved, _) => resolved,
        }
    }
}

impl<T: fmt::Display> fmt::Display for Resolved<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.value().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shift_months_borrows_a_year_below_baisakh() {
        let baisakh = CalendarDate::new(CalendarSystem::Nepali, 2081, 0, 1);
        let chaitra = baisakh.shift_months(-1);
        assert_eq!((chaitra.year, chaitra.month), (2080, 11));
    }

    #[test]
    fn shift_months_carries_across_several_years() {
        let date = CalendarDate::new(CalendarSystem::Gregorian, 2024, 10, 15);
        let later = date.shift_months(14);
        assert_eq!((later.year, later.month, later.day), (2026, 0, 15));
        let earlier = date.shift_months(-35);
        assert_eq!((earlier.year, earlier.month), (2021, 11));
    }

    #[test]
    fn parses_system_aliases() {
        assert_eq!(
            "BS".parse::<CalendarSystem>().expect("parse bs"),
            CalendarSystem::Nepali
        );
        assert_eq!(
            " gregorian ".parse::<CalendarSystem>().expect("parse gregorian"),
            CalendarSystem::Gregorian
        );
        assert_eq!(
            "julian".parse::<CalendarSystem>(),
            Err(CalendarError::UnknownSystem("julian".to_string()))
        );
    }

    #[test]
    fn with_cause_keeps_first_degradation() {
        let first = CalendarError::InvalidRangeToken("a".to_string());
        let second = CalendarError::InvalidRangeToken("b".to_string());
        let resolved = Resolved::degraded(1, first.clone()).with_cause(Some(second));
        assert_eq!(resolved.cause(), Some(&first));
        assert!(!resolved.is_fallback());
    }
}
