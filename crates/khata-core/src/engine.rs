use std::sync::Arc;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::calendar::{Calendar, Calendars, GregorianCalendar};
use crate::error::CalendarError;
use crate::oracle::{BsTable, NepaliOracle};
use crate::system::{CalendarDate, CalendarSystem, Resolved};

static GREGORIAN: GregorianCalendar = GregorianCalendar;

/// First column of a calendar grid.
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
pub enum WeekStart {
    #[default]
    Sunday,
    Monday,
}

impl WeekStart {
    /// Column index (0..=6) of `weekday` in a grid starting on `self`.
    pub fn column(self, weekday: chrono::Weekday) -> u32 {
        match self {
            Self::Sunday => weekday.num_days_from_sunday(),
            Self::Monday => weekday.num_days_from_monday(),
        }
    }
}

/// Calendar-period computations over every registered calendar system.
///
/// Every operation is a pure function of its arguments; `now` is always
/// passed in by the caller. Day boundaries are UTC midnights.
pub struct PeriodEngine {
    calendars: Calendars,
    week_start: WeekStart,
}

impl Default for PeriodEngine {
    fn default() -> Self {
        Self::new(Arc::new(BsTable::bundled()))
    }
}

impl PeriodEngine {
    pub fn new(oracle: Arc<dyn NepaliOracle>) -> Self {
        Self::with_calendars(Calendars::new(oracle))
    }

    pub fn with_calendars(calendars: Calendars) -> Self {
        Self {
            calendars,
            week_start: WeekStart::default(),
        }
    }

    pub fn with_week_start(mut self, week_start: WeekStart) -> Self {
        self.week_start = week_start;
        self
    }

    pub fn week_start(&self) -> WeekStart {
        self.week_start
    }

    pub fn calendar(&self, system: CalendarSystem) -> Result<&dyn Calendar, CalendarError> {
        self.calendars.get(system)
    }

    /// Like [`Self::calendar`], but a missing entry resolves to Gregorian.
    pub(crate) fn calendar_or_gregorian(&self, system: CalendarSystem) -> &dyn Calendar {
        self.calendars.get(system).unwrap_or(&GREGORIAN)
    }

    /// The day containing `instant`, in `system`.
    ///
    /// When `system` cannot interpret the day, the Gregorian date is
    /// returned as [`Resolved::Degraded`] and a warning is logged; the
    /// returned date is tagged Gregorian so later arithmetic stays
    /// consistent.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn to_calendar_date(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
    ) -> Resolved<CalendarDate> {
        let day = instant.date_naive();
        match self.calendar(system).and_then(|cal| cal.date_of(day)) {
            Ok(date) => Resolved::Exact(date),
            Err(cause) => {
                warn!(
                    %instant,
                    %system,
                    error = %cause,
                    "calendar conversion failed; falling back to gregorian"
                );
                Resolved::degraded(gregorian_date(day), cause)
            }
        }
    }

    pub fn days_in_month(
        &self,
        system: CalendarSystem,
        year: i32,
        month: u32,
    ) -> Result<u32, CalendarError> {
        if month > 11 {
            return Err(CalendarError::InvalidDate(format!(
                "month index {month} is not in 0..=11"
            )));
        }
        self.calendar(system)?.days_in_month(year, month)
    }

    /// Midnight UTC of `date`.
    ///
    /// Day 0 names the last day of the previous month, so `{y, m + 1, 0}`
    /// is the final day of month `m`; month index 12 is accepted only in
    /// that form. Any other day outside `1..=days_in_month` is clamped
    /// into the month and reported as [`CalendarError::OutOfRangeDay`].
    /// Conversion failures are returned as errors: reading a Bikram Sambat
    /// year as Gregorian would be off by decades.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn from_calendar_date(
        &self,
        date: CalendarDate,
    ) -> Result<Resolved<DateTime<Utc>>, CalendarError> {
        if date.day == 0 && date.month <= 12 {
            let prev = date.shift_months(-1);
            let days = self.days_in_month(prev.system, prev.year, prev.month)?;
            let last = CalendarDate { day: days, ..prev };
            trace!(?date, ?last, "day 0 resolved to end of previous month");
            let day = self.calendar(date.system)?.gregorian_of(last)?;
            return Ok(Resolved::Exact(start_of_day(day)?));
        }

        let days = self.days_in_month(date.system, date.year, date.month)?;
        let calendar = self.calendar(date.system)?;

        let mut cause = None;
        let mut target = date;
        if date.day > days {
            target.day = days;
            warn!(
                system = %date.system,
                year = date.year,
                month = date.month,
                requested = date.day,
                clamped = target.day,
                "day out of range for month; clamping"
            );
            cause = Some(CalendarError::OutOfRangeDay {
                system: date.system,
                year: date.year,
                month: date.month,
                requested: date.day,
                clamped: target.day,
            });
        }

        let day = calendar.gregorian_of(target)?;
        Ok(Resolved::Exact(start_of_day(day)?).with_cause(cause))
    }

    /// First and last Gregorian day of the month `date` falls in.
    pub(crate) fn month_days(
        &self,
        date: CalendarDate,
    ) -> Result<(NaiveDate, NaiveDate), CalendarError> {
        let calendar = self.calendar_or_gregorian(date.system);
        let days = calendar.days_in_month(date.year, date.month)?;
        let first = calendar.gregorian_of(CalendarDate { day: 1, ..date })?;
        let last = calendar.gregorian_of(CalendarDate { day: days, ..date })?;
        trace!(?date, %first, %last, "resolved month days");
        Ok((first, last))
    }

    /// Runs `compute` on the date containing `instant`. If the requested
    /// system fails anywhere along the way, the whole computation is
    /// redone in Gregorian and returned degraded.
    pub(crate) fn resolve_with<T>(
        &self,
        instant: DateTime<Utc>,
        system: CalendarSystem,
        compute: impl Fn(&Self, CalendarDate) -> Result<T, CalendarError>,
    ) -> Result<Resolved<T>, CalendarError> {
        let (date, cause) = self.to_calendar_date(instant, system).into_parts();
        match compute(self, date) {
            Ok(value) => Ok(Resolved::Exact(value).with_cause(cause)),
            Err(err) if err.is_conversion_failure() => {
                warn!(
                    %instant,
                    %system,
                    error = %err,
                    "period computation failed; falling back to gregorian"
                );
                let value = compute(self, gregorian_date(instant.date_naive()))?;
                Ok(Resolved::degraded(value, err))
            }
            Err(err) => Err(err),
        }
    }
}

pub(crate) fn gregorian_date(day: NaiveDate) -> CalendarDate {
    CalendarDate::new(
        CalendarSystem::Gregorian,
        day.year(),
        day.month0(),
        day.day(),
    )
}

pub(crate) fn start_of_day(day: NaiveDate) -> Result<DateTime<Utc>, CalendarError> {
    day.and_hms_milli_opt(0, 0, 0, 0)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CalendarError::InvalidDate(format!("no midnight on {day}")))
}

pub(crate) fn end_of_day(day: NaiveDate) -> Result<DateTime<Utc>, CalendarError> {
    day.and_hms_milli_opt(23, 59, 59, 999)
        .map(|naive| naive.and_utc())
        .ok_or_else(|| CalendarError::InvalidDate(format!("no end of day on {day}")))
}
