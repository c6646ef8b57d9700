use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Days, NaiveDate, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::engine::{PeriodEngine, end_of_day, start_of_day};
use crate::error::CalendarError;
use crate::system::{CalendarDate, CalendarSystem, Resolved};

/// Longest trailing window a token may ask for: 100 years.
pub const MAX_TRAILING_MONTHS: u32 = 1200;

/// Inclusive `[start, end]`: start at 00:00:00.000 of the first day, end
/// at 23:59:59.999 of the last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PeriodRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl PeriodRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, CalendarError> {
        if start > end {
            return Err(CalendarError::InvalidDate(format!(
                "range start {start} is after end {end}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn from_days(first: NaiveDate, last: NaiveDate) -> Result<Self, CalendarError> {
        Self::new(start_of_day(first)?, end_of_day(last)?)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant <= self.end
    }

    /// Number of whole days covered.
    pub fn days(&self) -> i64 {
        (self.end.date_naive() - self.start.date_naive()).num_days() + 1
    }
}

/// Named range relative to "now".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RangeToken {
    #[default]
    ThisMonth,
    LastMonth,
    ThisYear,
    /// The current month and the `n - 1` before it.
    TrailingMonths(u32),
}

impl FromStr for RangeToken {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim().to_ascii_lowercase();
        match token.as_str() {
            "this-month" => return Ok(Self::ThisMonth),
            "last-month" => return Ok(Self::LastMonth),
            "this-year" => return Ok(Self::ThisYear),
            _ => {}
        }

        let invalid = || CalendarError::InvalidRangeToken(s.to_string());
        let trailing_re = Regex::new(r"^(?P<num>\d{1,4})(?P<unit>[my])$")
            .map_err(|_| invalid())?;
        let caps = trailing_re.captures(&token).ok_or_else(invalid)?;
        let num: u32 = caps["num"].parse().map_err(|_| invalid())?;
        let months = match &caps["unit"] {
            "y" => num.saturating_mul(12),
            _ => num,
        };
        if months == 0 || months > MAX_TRAILING_MONTHS {
            return Err(invalid());
        }
        Ok(Self::TrailingMonths(months))
    }
}

impl fmt::Display for RangeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThisMonth => f.write_str("this-month"),
            Self::LastMonth => f.write_str("last-month"),
            Self::ThisYear => f.write_str("this-year"),
            Self::TrailingMonths(n) if n % 12 == 0 => write!(f, "{}y", n / 12),
            Self::TrailingMonths(n) => write!(f, "{n}m"),
        }
    }
}

impl PeriodEngine {
    /// The calendar month containing `instant`.
    #[tracing::instrument(skip(self))]
    pub fn month_range(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
    ) -> Result<Resolved<PeriodRange>, CalendarError> {
        self.resolve_with(instant, system, |engine, date| {
            let (first, last) = engine.month_days(date)?;
            PeriodRange::from_days(first, last)
        })
    }

    /// Parses `token` and resolves it against `now`. Unknown tokens are
    /// an error; choosing a default is the caller's decision.
    #[tracing::instrument(skip(self))]
    pub fn named_range(
        &self,
        token: &str,
        system: CalendarSystem,
        now: DateTime<Utc>,
    ) -> Result<Resolved<PeriodRange>, CalendarError> {
        let parsed: RangeToken = token.parse()?;
        debug!(%parsed, "parsed range token");
        self.token_range(parsed, system, now)
    }

    pub fn token_range(
        &self,
        token: RangeToken,
        system: CalendarSystem,
        now: DateTime<Utc>,
    ) -> Result<Resolved<PeriodRange>, CalendarError> {
        self.resolve_with(now, system, |engine, date| {
            let (first_month, last_month) = match token {
                RangeToken::ThisMonth => (date, date),
                RangeToken::LastMonth => {
                    let prev = date.shift_months(-1);
                    (prev, prev)
                }
                RangeToken::ThisYear => (
                    CalendarDate { month: 0, ..date },
                    CalendarDate { month: 11, ..date },
                ),
                RangeToken::TrailingMonths(n) => {
                    let back = i32::try_from(n.saturating_sub(1)).unwrap_or(i32::MAX);
                    (date.shift_months(-back), date)
                }
            };
            let (first, _) = engine.month_days(first_month)?;
            let (_, last) = engine.month_days(last_month)?;
            PeriodRange::from_days(first, last)
        })
    }

    /// The month containing `instant`, widened to whole weeks for a
    /// calendar grid. Weekdays are Gregorian in every system.
    #[tracing::instrument(skip(self))]
    pub fn calendar_page_range(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
    ) -> Result<Resolved<PeriodRange>, CalendarError> {
        let week_start = self.week_start();
        self.resolve_with(instant, system, |engine, date| {
            let (first, last) = engine.month_days(date)?;
            let leading = week_start.column(first.weekday());
            let trailing = 6 - week_start.column(last.weekday());
            let grid_first = first
                .checked_sub_days(Days::new(u64::from(leading)))
                .ok_or_else(|| {
                    CalendarError::InvalidDate(format!("cannot pad before {first}"))
                })?;
            let grid_last = last
                .checked_add_days(Days::new(u64::from(trailing)))
                .ok_or_else(|| {
                    CalendarError::InvalidDate(format!("cannot pad after {last}"))
                })?;
            debug!(%grid_first, %grid_last, leading, trailing, "padded calendar page");
            PeriodRange::from_days(grid_first, grid_last)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::engine::WeekStart;
    use crate::error::OracleError;
    use crate::oracle::{BsTable, NepaliDate, NepaliOracle};

    struct BrokenOracle;

    impl NepaliOracle for BrokenOracle {
        fn from_gregorian(&self, date: NaiveDate) -> Result<NepaliDate, OracleError> {
            Err(OracleError::DateOutOfRange { date })
        }

        fn to_gregorian(&self, date: NepaliDate) -> Result<NaiveDate, OracleError> {
            Err(OracleError::YearOutOfRange {
                year: date.year(),
                first: 0,
                last: 0,
            })
        }

        fn days_in_month(&self, year: i32, _month: u32) -> Result<u32, OracleError> {
            Err(OracleError::YearOutOfRange {
                year,
                first: 0,
                last: 0,
            })
        }
    }

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0)
            .single()
            .expect("valid instant")
    }

    fn end_at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        at(y, m, d) + Duration::days(1) - Duration::milliseconds(1)
    }

    #[test]
    fn gregorian_january_2024() {
        let engine = PeriodEngine::default();
        let range = engine
            .month_range(at(2024, 1, 15), CalendarSystem::Gregorian)
            .expect("month range");
        assert_eq!(
            range,
            Resolved::Exact(PeriodRange {
                start: at(2024, 1, 1),
                end: end_at(2024, 1, 31),
            })
        );
        assert_eq!(
            range.value().end.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            "2024-01-31T23:59:59.999Z"
        );
    }

    #[test]
    fn nepali_poush_2081_uses_oracle_length() {
        let engine = PeriodEngine::default();
        let range = engine
            .month_range(at(2025, 1, 1), CalendarSystem::Nepali)
            .expect("month range")
            .into_value();
        assert_eq!(range.start, at(2024, 12, 16));
        assert_eq!(range.end, end_at(2025, 1, 13));
        assert_eq!(range.days(), 29);
    }

    #[test]
    fn leap_february() {
        let engine = PeriodEngine::default();
        let range = engine
            .month_range(at(2024, 2, 29), CalendarSystem::Gregorian)
            .expect("month range")
            .into_value();
        assert_eq!(range.end, end_at(2024, 2, 29));
        assert!(range.contains(at(2024, 2, 29) + Duration::hours(23)));
        assert!(!range.contains(at(2024, 3, 1)));
    }

    #[test]
    fn trailing_three_months() {
        let engine = PeriodEngine::default();
        let now = at(2024, 3, 15);
        let range = engine
            .named_range("3m", CalendarSystem::Gregorian, now)
            .expect("3m")
            .into_value();
        assert_eq!(range.start, at(2024, 1, 1));
        assert_eq!(range.end, end_at(2024, 3, 31));
    }

    #[test]
    fn trailing_year_borrows_across_years() {
        let engine = PeriodEngine::default();
        let range = engine
            .named_range("1y", CalendarSystem::Gregorian, at(2024, 3, 15))
            .expect("1y")
            .into_value();
        assert_eq!(range.start, at(2023, 4, 1));
        assert_eq!(range.end, end_at(2024, 3, 31));
    }

    #[test]
    fn nepali_trailing_six_months_subtracts_calendar_months() {
        let engine = PeriodEngine::default();
        // 5 Poush 2081.
        let now = at(2024, 12, 20);
        let range = engine
            .named_range("6m", CalendarSystem::Nepali, now)
            .expect("6m")
            .into_value();
        // 1 Shrawan 2081 through 29 Poush 2081.
        assert_eq!(range.start, at(2024, 7, 16));
        assert_eq!(range.end, end_at(2025, 1, 13));
    }

    #[test]
    fn this_year_and_last_month() {
        let engine = PeriodEngine::default();
        let now = at(2024, 12, 20);
        let year = engine
            .named_range("this-year", CalendarSystem::Nepali, now)
            .expect("this-year")
            .into_value();
        assert_eq!(year.start, at(2024, 4, 13));
        assert_eq!(year.end, end_at(2025, 4, 13));
        assert_eq!(year.days(), 366);

        let last = engine
            .named_range("last-month", CalendarSystem::Gregorian, at(2024, 1, 10))
            .expect("last-month")
            .into_value();
        assert_eq!(last.start, at(2023, 12, 1));
        assert_eq!(last.end, end_at(2023, 12, 31));
    }

    #[test]
    fn unknown_token_is_an_error() {
        let engine = PeriodEngine::default();
        for token in ["", "forever", "0m", "3w", "1201m", "m"] {
            assert!(
                matches!(
                    engine.named_range(token, CalendarSystem::Gregorian, at(2024, 1, 1)),
                    Err(CalendarError::InvalidRangeToken(_))
                ),
                "{token:?}"
            );
        }
    }

    #[test]
    fn token_display_round_trips() {
        for raw in ["this-month", "last-month", "this-year", "3m", "6m", "1y", "2y", "18m"] {
            let token: RangeToken = raw.parse().expect("parse token");
            assert_eq!(token.to_string(), raw);
        }
        assert_eq!(
            "12m".parse::<RangeToken>().expect("12m"),
            RangeToken::TrailingMonths(12)
        );
    }

    #[test]
    fn calendar_page_pads_to_whole_weeks() {
        let engine = PeriodEngine::default();
        // March 2024 starts on a Friday and ends on a Sunday.
        let page = engine
            .calendar_page_range(at(2024, 3, 10), CalendarSystem::Gregorian)
            .expect("page")
            .into_value();
        assert_eq!(page.start, at(2024, 2, 25));
        assert_eq!(page.end, end_at(2024, 4, 6));
        assert_eq!(page.days() % 7, 0);

        let monday_engine = PeriodEngine::new(Arc::new(BsTable::bundled()))
            .with_week_start(WeekStart::Monday);
        let page = monday_engine
            .calendar_page_range(at(2024, 3, 10), CalendarSystem::Gregorian)
            .expect("page")
            .into_value();
        assert_eq!(page.start, at(2024, 2, 26));
        assert_eq!(page.end, end_at(2024, 3, 31));
    }

    #[test]
    fn nepali_calendar_page_uses_gregorian_weekdays() {
        let engine = PeriodEngine::default();
        // Poush 2081: Monday 2024-12-16 through Monday 2025-01-13.
        let page = engine
            .calendar_page_range(at(2024, 12, 25), CalendarSystem::Nepali)
            .expect("page")
            .into_value();
        assert_eq!(page.start, at(2024, 12, 15));
        assert_eq!(page.end, end_at(2025, 1, 18));
        assert_eq!(page.days(), 35);
    }

    #[test]
    fn trailing_window_before_the_table_is_redone_in_gregorian() {
        let engine = PeriodEngine::default();
        // 2 Jestha 2070; five months back is BS 2069, outside the bundled table.
        let range = engine
            .named_range("6m", CalendarSystem::Nepali, at(2013, 5, 16))
            .expect("6m");
        assert!(range.is_fallback());
        assert!(matches!(
            range.cause(),
            Some(CalendarError::ConversionFailure {
                system: CalendarSystem::Nepali,
                source: OracleError::YearOutOfRange { year: 2069, .. },
            })
        ));
        assert_eq!(
            *range.value(),
            PeriodRange {
                start: at(2012, 12, 1),
                end: end_at(2013, 5, 31),
            }
        );

        let this_month = engine
            .token_range(RangeToken::ThisMonth, CalendarSystem::Nepali, at(2013, 5, 16))
            .expect("this-month");
        assert!(this_month.is_exact());
    }

    #[test]
    fn calendar_page_degrades_to_gregorian_weeks() {
        let engine = PeriodEngine::new(Arc::new(BrokenOracle));
        // December 2024 runs Sunday the 1st to Tuesday the 31st.
        let page = engine
            .calendar_page_range(at(2024, 12, 20), CalendarSystem::Nepali)
            .expect("page");
        assert!(page.is_fallback());
        assert_eq!(page.value().start, at(2024, 12, 1));
        assert_eq!(page.value().end, end_at(2025, 1, 4));
        assert_eq!(page.value().days(), 35);

        let monday_engine =
            PeriodEngine::new(Arc::new(BrokenOracle)).with_week_start(WeekStart::Monday);
        let page = monday_engine
            .calendar_page_range(at(2024, 12, 20), CalendarSystem::Nepali)
            .expect("page");
        assert!(page.is_fallback());
        assert_eq!(page.value().start, at(2024, 11, 25));
        assert_eq!(page.value().end, end_at(2025, 1, 5));
    }

    #[test]
    fn rejects_inverted_range() {
        assert!(PeriodRange::new(at(2024, 2, 1), at(2024, 1, 1)).is_err());
    }
}
