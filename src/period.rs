//! Reporting periods: calendar months and billing cycles.
//!
//! A billing cycle labelled `(year, month)` with start day `d > 1` runs from day
//! `d` of the previous month up to and including day `d - 1` of `month`. A start
//! day of 1 is an ordinary calendar month.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use time::{Date, Month};

use crate::{Error, settings::get_settings, timezone::local_today};

/// The start day that makes a billing cycle equal to a calendar month.
pub const CALENDAR_MONTH_START_DAY: u8 = 1;

/// The latest allowed billing cycle start day, so that every month has it.
pub const MAX_BILLING_CYCLE_START_DAY: u8 = 28;

/// An inclusive range of dates used to filter transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Period {
    /// The first day of the period.
    pub start: Date,
    /// The last day of the period.
    pub end: Date,
}

impl Period {
    /// The period labelled `(year, month)` for a cycle starting on `start_day`.
    ///
    /// # Errors
    /// Returns [Error::InvalidPeriod] if `month` is not 1-12, `start_day` is
    /// not 1-28, or the year is out of range.
    pub fn for_month(year: i32, month: u8, start_day: u8) -> Result<Self, Error> {
        let month = Month::try_from(month)
            .map_err(|_| Error::InvalidPeriod(format!("month {month} is not between 1 and 12")))?;
        validate_start_day(start_day)?;

        if start_day == CALENDAR_MONTH_START_DAY {
            let start = calendar_date(year, month, 1)?;
            let (next_year, next_month) = next_month(year, month)?;
            let end = calendar_date(next_year, next_month, 1)?
                .previous_day()
                .ok_or_else(|| year_out_of_range(year))?;

            return Ok(Self { start, end });
        }

        let (previous_year, previous_month) = previous_month(year, month)?;

        Ok(Self {
            start: calendar_date(previous_year, previous_month, start_day)?,
            end: calendar_date(year, month, start_day - 1)?,
        })
    }

    /// The period that contains `date` for a cycle starting on `start_day`.
    ///
    /// # Errors
    /// Returns [Error::InvalidPeriod] if `start_day` is not 1-28.
    pub fn containing(date: Date, start_day: u8) -> Result<Self, Error> {
        validate_start_day(start_day)?;

        let (year, month) = if start_day > CALENDAR_MONTH_START_DAY && date.day() >= start_day {
            next_month(date.year(), date.month())?
        } else {
            (date.year(), date.month())
        };

        Self::for_month(year, month as u8, start_day)
    }

    /// Whether `date` falls within the period.
    pub fn contains(&self, date: Date) -> bool {
        self.start <= date && date <= self.end
    }
}

/// Query parameters that select a reporting period.
///
/// When neither `year` nor `month` is given, the period containing today is used.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PeriodQuery {
    /// The year of the period's label.
    pub year: Option<i32>,
    /// The month (1-12) of the period's label.
    pub month: Option<u8>,
    /// Overrides the billing cycle start day from the settings.
    pub billing_cycle_start_day: Option<u8>,
}

impl PeriodQuery {
    /// Resolve the query to a concrete period.
    ///
    /// # Errors
    /// Returns [Error::InvalidPeriod] if only one of year or month is given,
    /// or if the values do not form a valid period.
    pub fn resolve(&self, today: Date, default_start_day: u8) -> Result<Period, Error> {
        let start_day = self.billing_cycle_start_day.unwrap_or(default_start_day);

        match (self.year, self.month) {
            (Some(year), Some(month)) => Period::for_month(year, month, start_day),
            (None, None) => Period::containing(today, start_day),
            _ => Err(Error::InvalidPeriod(
                "year and month must be given together".to_owned(),
            )),
        }
    }
}

/// Resolve `query` against today's date in `local_timezone` and the billing
/// cycle start day from the stored settings.
///
/// # Errors
/// Returns an error if the query is invalid, the timezone is unknown or the
/// settings cannot be read.
pub fn resolve_period(
    query: &PeriodQuery,
    local_timezone: &str,
    connection: &Connection,
) -> Result<Period, Error> {
    let start_day = get_settings(connection)?.billing_cycle_start_day;
    let today = local_today(local_timezone)?;

    query.resolve(today, start_day)
}

fn validate_start_day(start_day: u8) -> Result<(), Error> {
    if (CALENDAR_MONTH_START_DAY..=MAX_BILLING_CYCLE_START_DAY).contains(&start_day) {
        Ok(())
    } else {
        Err(Error::InvalidPeriod(format!(
            "billing cycle start day {start_day} is not between \
            {CALENDAR_MONTH_START_DAY} and {MAX_BILLING_CYCLE_START_DAY}"
        )))
    }
}

fn calendar_date(year: i32, month: Month, day: u8) -> Result<Date, Error> {
    Date::from_calendar_date(year, month, day)
        .map_err(|error| Error::InvalidPeriod(error.to_string()))
}

fn next_month(year: i32, month: Month) -> Result<(i32, Month), Error> {
    match month {
        Month::December => year
            .checked_add(1)
            .map(|year| (year, Month::January))
            .ok_or_else(|| year_out_of_range(year)),
        month => Ok((year, month.next())),
    }
}

fn previous_month(year: i32, month: Month) -> Result<(i32, Month), Error> {
    match month {
        Month::January => year
            .checked_sub(1)
            .map(|year| (year, Month::December))
            .ok_or_else(|| year_out_of_range(year)),
        month => Ok((year, month.previous())),
    }
}

fn year_out_of_range(year: i32) -> Error {
    Error::InvalidPeriod(format!("year {year} is out of range"))
}
