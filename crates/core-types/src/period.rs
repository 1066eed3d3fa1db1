//! Monthly snapshot periods. A period is identified by the first day of its month.

use crate::error::CoreError;
use chrono::{Datelike, Days, Months, NaiveDate};

/// Normalises any date to the first day of its month.
pub fn period_start(date: NaiveDate) -> NaiveDate {
    date - Days::new(u64::from(date.day0()))
}

/// First day of the month before the period containing `date`.
pub fn previous_period_start(date: NaiveDate) -> Result<NaiveDate, CoreError> {
    period_start(date)
        .checked_sub_months(Months::new(1))
        .ok_or_else(|| CoreError::InvalidInput("period".to_string(), format!("{date} has no previous month")))
}

/// First day of the month after the period containing `date`.
pub fn next_period_start(date: NaiveDate) -> Result<NaiveDate, CoreError> {
    period_start(date)
        .checked_add_months(Months::new(1))
        .ok_or_else(|| CoreError::InvalidInput("period".to_string(), format!("{date} has no next month")))
}
