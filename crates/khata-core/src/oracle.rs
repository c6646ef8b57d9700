//! Nepali (Bikram Sambat) conversion primitive.
//!
//! The engine treats the oracle as authoritative and only composes it.
//! [`BsTable`] is the default implementation: a per-year month-length
//! table anchored at 1 Baisakh of its first year.

use std::fs;
use std::path::Path;

use anyhow::Context;
use chrono::{Days, NaiveDate};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::OracleError;

/// A Bikram Sambat date. `month` is zero-based (Baisakh = 0).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NepaliDate {
    year: i32,
    month: u32,
    day: u32,
}

impl NepaliDate {
    pub fn new(year: i32, month: u32, day: u32) -> Self {
        Self { year, month, day }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    pub fn day(&self) -> u32 {
        self.day
    }
}

pub trait NepaliOracle: Send + Sync {
    fn from_gregorian(&self, date: NaiveDate) -> Result<NepaliDate, OracleError>;

    fn to_gregorian(&self, date: NepaliDate) -> Result<NaiveDate, OracleError>;

    fn days_in_month(&self, year: i32, month: u32) -> Result<u32, OracleError>;
}

const BUNDLED_FIRST_YEAR: i32 = 2070;

// 1 Baisakh 2070.
const BUNDLED_EPOCH: (i32, u32, u32) = (2013, 4, 14);

const BUNDLED_MONTHS: [[u32; 12]; 21] = [
    [31, 31, 31, 32, 31, 31, 29, 30, 30, 29, 30, 30],
    [31, 31, 32, 31, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 29, 30, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 30, 29, 29, 30, 31],
    [31, 31, 31, 32, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 31, 32, 31, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 30, 29, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 30, 29, 30, 29, 31],
    [31, 31, 31, 32, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 31, 32, 31, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 30, 29, 29, 30, 30],
    [31, 32, 31, 32, 31, 30, 30, 30, 29, 30, 29, 31],
    [31, 31, 32, 31, 31, 31, 30, 29, 30, 29, 30, 30],
    [31, 31, 32, 31, 31, 30, 30, 30, 29, 30, 30, 30],
    [31, 31, 32, 31, 31, 30, 30, 30, 29, 30, 30, 30],
    [31, 32, 31, 32, 30, 31, 30, 30, 29, 30, 30, 30],
    [30, 32, 31, 32, 31, 30, 30, 30, 29, 30, 30, 30],
    [31, 31, 32, 31, 31, 31, 30, 30, 29, 30, 30, 30],
    [30, 31, 32, 32, 30, 31, 30, 30, 29, 30, 30, 30],
    [30, 32, 31, 32, 31, 30, 30, 30, 29, 30, 30, 30],
    [30, 32, 31, 32, 31, 30, 30, 30, 29, 30, 30, 30],
];

const MIN_MONTH_LEN: u32 = 29;
const MAX_MONTH_LEN: u32 = 32;

/// On-disk shape of a replacement table.
///
/// ```toml
/// first_year = 2070
/// epoch = "2013-04-14"
/// months = [[31, 31, 31, 32, 31, 31, 29, 30, 30, 29, 30, 30]]
/// ```
#[derive(Debug, Deserialize)]
struct TableFile {
    first_year: i32,
    epoch: NaiveDate,
    months: Vec<[u32; 12]>,
}

#[derive(Debug, Clone)]
pub struct BsTable {
    first_year: i32,
    last_year: i32,
    epoch: NaiveDate,
    months: Vec<[u32; 12]>,
    // Days from `epoch` to 1 Baisakh of each year, plus one trailing
    // entry for the end of the table.
    year_starts: Vec<i64>,
}

impl Default for BsTable {
    fn default() -> Self {
        Self::bundled()
    }
}

impl BsTable {
    /// The table shipped with the crate, BS 2070 through 2090.
    pub fn bundled() -> Self {
        let (y, m, d) = BUNDLED_EPOCH;
        let epoch = NaiveDate::from_ymd_opt(y, m, d).unwrap_or(NaiveDate::MIN);
        let last_year = BUNDLED_FIRST_YEAR + BUNDLED_MONTHS.len() as i32 - 1;
        Self::from_parts(BUNDLED_FIRST_YEAR, last_year, epoch, BUNDLED_MONTHS.to_vec())
    }

    pub fn new(
        first_year: i32,
        epoch: NaiveDate,
        months: Vec<[u32; 12]>,
    ) -> Result<Self, OracleError> {
        if months.is_empty() {
            return Err(OracleError::MalformedTable(
                "table has no years".to_string(),
            ));
        }
        for (idx, row) in months.iter().enumerate() {
            if let Some(len) = row
                .iter()
                .find(|len| !(MIN_MONTH_LEN..=MAX_MONTH_LEN).contains(*len))
            {
                return Err(OracleError::MalformedTable(format!(
                    "year {} has a {len}-day month",
                    i64::from(first_year) + idx as i64
                )));
            }
        }
        let last_year = i32::try_from(months.len() - 1)
            .ok()
            .and_then(|span| first_year.checked_add(span))
            .ok_or_else(|| {
                OracleError::MalformedTable(format!(
                    "{} years starting at {first_year} overflow the year range",
                    months.len()
                ))
            })?;
        Ok(Self::from_parts(first_year, last_year, epoch, months))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, OracleError> {
        let file: TableFile = toml::from_str(raw)
            .map_err(|err| OracleError::MalformedTable(err.to_string()))?;
        Self::new(file.first_year, file.epoch, file.months)
    }

    #[tracing::instrument]
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let table = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        info!(
            file = %path.display(),
            first_year = table.first_year(),
            last_year = table.last_year(),
            "loaded nepali month table"
        );
        Ok(table)
    }

    fn from_parts(
        first_year: i32,
        last_year: i32,
        epoch: NaiveDate,
        months: Vec<[u32; 12]>,
    ) -> Self {
        let mut year_starts = Vec::with_capacity(months.len() + 1);
        let mut acc = 0_i64;
        year_starts.push(acc);
        for row in &months {
            acc += row.iter().map(|len| i64::from(*len)).sum::<i64>();
            year_starts.push(acc);
        }
        Self {
            first_year,
            last_year,
            epoch,
            months,
            year_starts,
        }
    }

    pub fn first_year(&self) -> i32 {
        self.first_year
    }

    pub fn last_year(&self) -> i32 {
        self.last_year
    }

    fn row(&self, year: i32) -> Result<(usize, &[u32; 12]), OracleError> {
        let out_of_range = || OracleError::YearOutOfRange {
            year,
            first: self.first_year,
            last: self.last_year(),
        };
        let idx = usize::try_from(i64::from(year) - i64::from(self.first_year))
            .map_err(|_| out_of_range())?;
        self.months
            .get(idx)
            .map(|row| (idx, row))
            .ok_or_else(out_of_range)
    }
}

impl NepaliOracle for BsTable {
    fn from_gregorian(&self, date: NaiveDate) -> Result<NepaliDate, OracleError> {
        let offset = date.signed_duration_since(self.epoch).num_days();
        let total = self.year_starts.last().copied().unwrap_or(0);
        if offset < 0 || offset >= total {
            return Err(OracleError::DateOutOfRange { date });
        }

        let idx = self.year_starts.partition_point(|start| *start <= offset) - 1;
        let mut remaining = offset - self.year_starts[idx];
        for (month, len) in self.months[idx].iter().enumerate() {
            let len = i64::from(*len);
            if remaining < len {
                // `new` checked that every row index fits after `first_year`.
                let converted = NepaliDate::new(
                    self.first_year + idx as i32,
                    month as u32,
                    remaining as u32 + 1,
                );
                debug!(%date, ?converted, "gregorian to nepali");
                return Ok(converted);
            }
            remaining -= len;
        }

        Err(OracleError::DateOutOfRange { date })
    }

    fn to_gregorian(&self, date: NepaliDate) -> Result<NaiveDate, OracleError> {
        let (idx, row) = self.row(date.year())?;
        let days = *row
            .get(date.month() as usize)
            .ok_or(OracleError::InvalidMonth {
                month: date.month(),
            })?;
        if date.day() == 0 || date.day() > days {
            return Err(OracleError::InvalidDay {
                year: date.year(),
                month: date.month(),
                day: date.day(),
                days,
            });
        }

        let before: u32 = row[..date.month() as usize].iter().sum();
        let offset = self.year_starts[idx] + i64::from(before) + i64::from(date.day() - 1);
        let offset = u64::try_from(offset).map_err(|_| {
            OracleError::MalformedTable("negative day offset".to_string())
        })?;
        self.epoch
            .checked_add_days(Days::new(offset))
            .ok_or(OracleError::YearOutOfRange {
                year: date.year(),
                first: self.first_year,
                last: self.last_year(),
            })
    }

    fn days_in_month(&self, year: i32, month: u32) -> Result<u32, OracleError> {
        let (_, row) = self.row(year)?;
        row.get(month as usize)
            .copied()
            .ok_or(OracleError::InvalidMonth { month })
    }
}
