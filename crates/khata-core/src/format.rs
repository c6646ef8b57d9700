use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::calendar::Calendar;
use crate::engine::PeriodEngine;
use crate::period::PeriodRange;
use crate::system::{CalendarDate, CalendarSystem, Resolved};

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// `2024-01-05`
    Short,
    /// `Jan 5`
    #[default]
    Medium,
    /// `January 5, 2024`
    Long,
}

fn render(calendar: &dyn Calendar, date: CalendarDate, verbosity: Verbosity) -> String {
    match verbosity {
        Verbosity::Short => format!(
            "{:04}-{:02}-{:02}",
            date.year,
            date.month_number(),
            date.day
        ),
        Verbosity::Medium => format!("{} {}", calendar.month_abbrev(date.month), date.day),
        Verbosity::Long => format!(
            "{} {}, {}",
            calendar.month_name(date.month),
            date.day,
            date.year
        ),
    }
}

impl PeriodEngine {
    /// Renders `instant` in `system`. A failed Nepali conversion yields
    /// the Gregorian rendering, marked degraded.
    pub fn format_date(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
        verbosity: Verbosity,
    ) -> Resolved<String> {
        self.to_calendar_date(instant, system).map(|date| {
            render(self.calendar_or_gregorian(date.system), date, verbosity)
        })
    }

    /// "Month, Year" of the period containing `instant`.
    pub fn format_period_label(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
    ) -> Resolved<String> {
        self.to_calendar_date(instant, system).map(|date| {
            let calendar = self.calendar_or_gregorian(date.system);
            format!("{}, {}", calendar.month_name(date.month), date.year)
        })
    }

    /// Long-form "first - last" label for report headers.
    pub fn format_range(&self, range: &PeriodRange, system: CalendarSystem) -> Resolved<String> {
        let (start, start_cause) = self
            .format_date(range.start, system, Verbosity::Long)
            .into_parts();
        let (end, end_cause) = self
            .format_date(range.end, system, Verbosity::Long)
            .into_parts();
        Resolved::Exact(format!("{start} - {end}"))
            .with_cause(start_cause)
            .with_cause(end_cause)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{NaiveDate, TimeZone};

    use super::*;
    use crate::error::OracleError;
    use crate::oracle::{NepaliDate, NepaliOracle};

    fn at(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 9, 30, 0)
            .single()
            .expect("valid instant")
    }

    struct UnreachableOracle;

    impl NepaliOracle for UnreachableOracle {
        fn from_gregorian(&self, date: NaiveDate) -> Result<NepaliDate, OracleError> {
            Err(OracleError::DateOutOfRange { date })
        }

        fn to_gregorian(&self, _date: NepaliDate) -> Result<NaiveDate, OracleError> {
            Err(OracleError::MalformedTable("offline".to_string()))
        }

        fn days_in_month(&self, _year: i32, _month: u32) -> Result<u32, OracleError> {
            Err(OracleError::MalformedTable("offline".to_string()))
        }
    }

    #[test]
    fn gregorian_verbosities() {
        let engine = PeriodEngine::default();
        let instant = at(2024, 1, 5);
        let system = CalendarSystem::Gregorian;
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Short),
            Resolved::Exact("2024-01-05".to_string())
        );
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Medium).to_string(),
            "Jan 5"
        );
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Long).to_string(),
            "January 5, 2024"
        );
        assert_eq!(
            engine.format_period_label(instant, system).to_string(),
            "January, 2024"
        );
    }

    #[test]
    fn nepali_verbosities() {
        let engine = PeriodEngine::default();
        // 5 Poush 2081.
        let instant = at(2024, 12, 20);
        let system = CalendarSystem::Nepali;
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Short).to_string(),
            "2081-09-05"
        );
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Medium).to_string(),
            "Poush 5"
        );
        assert_eq!(
            engine.format_date(instant, system, Verbosity::Long),
            Resolved::Exact("Poush 5, 2081".to_string())
        );
        assert_eq!(
            engine.format_period_label(instant, system).to_string(),
            "Poush, 2081"
        );
    }

    #[test]
    fn oracle_failure_formats_gregorian_and_flags_it() {
        let engine = PeriodEngine::new(Arc::new(UnreachableOracle));
        let formatted = engine.format_date(at(2024, 12, 20), CalendarSystem::Nepali, Verbosity::Long);
        assert_eq!(formatted.value(), "December 20, 2024");
        assert!(formatted.is_fallback());

        let label = engine.format_period_label(at(2024, 12, 20), CalendarSystem::Nepali);
        assert_eq!(label.value(), "December, 2024");
        assert!(label.is_fallback());
    }

    #[test]
    fn formats_range_labels() {
        let engine = PeriodEngine::default();
        let range = engine
            .month_range(at(2024, 12, 20), CalendarSystem::Nepali)
            .expect("range")
            .into_value();
        assert_eq!(
            engine.format_range(&range, CalendarSystem::Nepali),
            Resolved::Exact("Poush 1, 2081 - Poush 29, 2081".to_string())
        );
    }
}
