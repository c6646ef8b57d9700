use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};

use crate::error::CalendarError;
use crate::oracle::{NepaliDate, NepaliOracle};
use crate::system::{CalendarDate, CalendarSystem};

/// Per-system date arithmetic, looked up through [`Calendars`].
///
/// Implementations work on whole days; instants and times of day are the
/// engine's concern.
pub trait Calendar: Send + Sync {
    fn system(&self) -> CalendarSystem;

    fn date_of(&self, day: NaiveDate) -> Result<CalendarDate, CalendarError>;

    /// `date` must already name an existing day in this calendar.
    fn gregorian_of(&self, date: CalendarDate) -> Result<NaiveDate, CalendarError>;

    fn days_in_month(&self, year: i32, month: u32) -> Result<u32, CalendarError>;

    fn month_name(&self, month: u32) -> &'static str;

    fn month_abbrev(&self, month: u32) -> &'static str;
}

const GREGORIAN_MONTHS: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

const GREGORIAN_ABBREVS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

const NEPALI_MONTHS: [&str; 12] = [
    "Baisakh", "Jestha", "Asar", "Shrawan", "Bhadra", "Ashwin", "Kartik", "Mangsir", "Poush",
    "Magh", "Falgun", "Chaitra",
];

fn month_label(table: &[&'static str; 12], month: u32) -> &'static str {
    table.get(month as usize).copied().unwrap_or("?")
}

pub fn is_gregorian_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GregorianCalendar;

impl Calendar for GregorianCalendar {
    fn system(&self) -> CalendarSystem {
        CalendarSystem::Gregorian
    }

    fn date_of(&self, day: NaiveDate) -> Result<CalendarDate, CalendarError> {
        Ok(CalendarDate::new(
            CalendarSystem::Gregorian,
            day.year(),
            day.month0(),
            day.day(),
        ))
    }

    fn gregorian_of(&self, date: CalendarDate) -> Result<NaiveDate, CalendarError> {
        NaiveDate::from_ymd_opt(date.year, date.month + 1, date.day).ok_or_else(|| {
            CalendarError::InvalidDate(format!(
                "{:04}-{:02}-{:02} is not a gregorian date",
                date.year,
                date.month + 1,
                date.day
            ))
        })
    }

    fn days_in_month(&self, year: i32, month: u32) -> Result<u32, CalendarError> {
        let days = match month {
            0 | 2 | 4 | 6 | 7 | 9 | 11 => 31,
            3 | 5 | 8 | 10 => 30,
            1 if is_gregorian_leap_year(year) => 29,
            1 => 28,
            other => {
                return Err(CalendarError::InvalidDate(format!(
                    "month index {other} is not in 0..=11"
                )));
            }
        };
        Ok(days)
    }

    fn month_name(&self, month: u32) -> &'static str {
        month_label(&GREGORIAN_MONTHS, month)
    }

    fn month_abbrev(&self, month: u32) -> &'static str {
        month_label(&GREGORIAN_ABBREVS, month)
    }
}

/// Bikram Sambat arithmetic, entirely delegated to the injected oracle.
pub struct NepaliCalendar {
    oracle: Arc<dyn NepaliOracle>,
}

impl NepaliCalendar {
    pub fn new(oracle: Arc<dyn NepaliOracle>) -> Self {
        Self { oracle }
    }
}

impl Calendar for NepaliCalendar {
    fn system(&self) -> CalendarSystem {
        CalendarSystem::Nepali
    }

    fn date_of(&self, day: NaiveDate) -> Result<CalendarDate, CalendarError> {
        let bs = self
            .oracle
            .from_gregorian(day)
            .map_err(|err| CalendarError::conversion(CalendarSystem::Nepali, err))?;
        Ok(CalendarDate::new(
            CalendarSystem::Nepali,
            bs.year(),
            bs.month(),
            bs.day(),
        ))
    }

    fn gregorian_of(&self, date: CalendarDate) -> Result<NaiveDate, CalendarError> {
        self.oracle
            .to_gregorian(NepaliDate::new(date.year, date.month, date.day))
            .map_err(|err| CalendarError::conversion(CalendarSystem::Nepali, err))
    }

    fn days_in_month(&self, year: i32, month: u32) -> Result<u32, CalendarError> {
        self.oracle
            .days_in_month(year, month)
            .map_err(|err| CalendarError::conversion(CalendarSystem::Nepali, err))
    }

    // Nepali months have no customary short forms.
    fn month_name(&self, month: u32) -> &'static str {
        month_label(&NEPALI_MONTHS, month)
    }

    fn month_abbrev(&self, month: u32) -> &'static str {
        month_label(&NEPALI_MONTHS, month)
    }
}

/// Dispatch table from [`CalendarSystem`] to its implementation.
pub struct Calendars {
    entries: BTreeMap<CalendarSystem, Box<dyn Calendar>>,
}

impl Calendars {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Every supported system is registered here.
    pub fn new(oracle: Arc<dyn NepaliOracle>) -> Self {
        let mut calendars = Self::empty();
        calendars.register(Box::new(GregorianCalendar));
        calendars.register(Box::new(NepaliCalendar::new(oracle)));
        calendars
    }

    pub fn register(&mut self, calendar: Box<dyn Calendar>) {
        self.entries.insert(calendar.system(), calendar);
    }

    pub fn get(&self, system: CalendarSystem) -> Result<&dyn Calendar, CalendarError> {
        self.entries
            .get(&system)
            .map(|calendar| calendar.as_ref())
            .ok_or(CalendarError::UnregisteredSystem(system))
    }
}
