use std::iter::FusedIterator;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::engine::{PeriodEngine, gregorian_date, start_of_day};
use crate::error::CalendarError;
use crate::system::{CalendarDate, CalendarSystem, Resolved};

pub const DEFAULT_PERIOD_COUNT: usize = 12;

/// Month starts going backward from `now`, most recent first.
///
/// Pure in `(system, now, n)`: cloning restarts the walk and yields the
/// same items. A slot the calendar cannot produce is replaced with the
/// Gregorian month start the same number of months back and marked
/// degraded; the walk continues.
#[derive(Clone)]
pub struct PeriodSequence<'a> {
    engine: &'a PeriodEngine,
    cursor: CalendarDate,
    gregorian: CalendarDate,
    origin_cause: Option<CalendarError>,
    remaining: usize,
}

impl<'a> PeriodSequence<'a> {
    fn new(
        engine: &'a PeriodEngine,
        system: CalendarSystem,
        now: DateTime<Utc>,
        count: usize,
    ) -> Self {
        let (cursor, origin_cause) = engine.to_calendar_date(now, system).into_parts();
        Self {
            engine,
            cursor: cursor.first_of_month(),
            gregorian: gregorian_date(now.date_naive()).first_of_month(),
            origin_cause,
            remaining: count,
        }
    }

    fn month_start(&self, date: CalendarDate) -> Result<DateTime<Utc>, CalendarError> {
        let (first, _) = self.engine.month_days(date)?;
        start_of_day(first)
    }

    fn slot(&self) -> Option<Resolved<DateTime<Utc>>> {
        match self.month_start(self.cursor) {
            Ok(start) => Some(Resolved::Exact(start).with_cause(self.origin_cause.clone())),
            Err(cause) => {
                warn!(
                    date = ?self.cursor,
                    error = %cause,
                    "period slot conversion failed; using gregorian month"
                );
                match self.month_start(self.gregorian) {
                    Ok(start) => Some(Resolved::degraded(start, cause)),
                    Err(err) => {
                        error!(
                            date = ?self.gregorian,
                            error = %err,
                            "gregorian month start unrepresentable; ending sequence"
                        );
                        None
                    }
                }
            }
        }
    }
}

impl Iterator for PeriodSequence<'_> {
    type Item = Resolved<DateTime<Utc>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let Some(item) = self.slot() else {
            self.remaining = 0;
            return None;
        };
        self.cursor = self.cursor.shift_months(-1);
        self.gregorian = self.gregorian.shift_months(-1);
        self.remaining -= 1;
        Some(item)
    }

    // The walk can stop short at the edge of chrono's date range.
    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining))
    }
}

impl FusedIterator for PeriodSequence<'_> {}

/// One entry of a month picker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodOption {
    pub start: DateTime<Utc>,
    pub label: String,
    pub fallback: bool,
}

impl PeriodEngine {
    #[tracing::instrument(skip(self))]
    pub fn last_n_periods(
        &self,
        system: CalendarSystem,
        now: DateTime<Utc>,
        count: usize,
    ) -> PeriodSequence<'_> {
        PeriodSequence::new(self, system, now, count)
    }

    /// Labelled picker entries for the last `count` months. Slots that
    /// fell back to a Gregorian month carry a Gregorian label.
    pub fn period_options(
        &self,
        system: CalendarSystem,
        now: DateTime<Utc>,
        count: usize,
    ) -> Vec<PeriodOption> {
        self.last_n_periods(system, now, count)
            .map(|slot| {
                let fallback = !slot.is_exact();
                let label_system = if slot.is_fallback() {
                    CalendarSystem::Gregorian
                } else {
                    system
                };
                let start = slot.into_value();
                let label = self.format_period_label(start, label_system);
                PeriodOption {
                    start,
                    fallback: fallback || !label.is_exact(),
                    label: label.into_value(),
                }
            })
            .collect()
    }
}
