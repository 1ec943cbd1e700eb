use crate::error::{DisclosureError, Result};
use crate::schema::Quarter;
use chrono::{Days, NaiveDate};

pub fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let next_month = if month == 12 { 1 } else { month + 1 };
    let next_year = if month == 12 { year + 1 } else { year };

    NaiveDate::from_ymd_opt(next_year, next_month, 1)?.checked_sub_days(Days::new(1))
}

pub fn validate_fiscal_year_end_month(month: u32) -> Result<()> {
    if !(1..=12).contains(&month) {
        return Err(DisclosureError::InvalidFiscalYearEndMonth(month));
    }
    Ok(())
}

pub fn fiscal_year_end_date(fiscal_year: i32, fiscal_year_end_month: u32) -> Option<NaiveDate> {
    last_day_of_month(fiscal_year, fiscal_year_end_month)
}

/// Last day of the given quarter of a fiscal year.
///
/// The fourth quarter closes in `fiscal_year_end_month` of `fiscal_year`; each
/// earlier quarter closes three months before the next one.
///
/// # Examples
/// - FY ends Dec: 2023 Q1 closes 2023-03-31
/// - FY ends Mar: 2023 Q1 closes 2022-06-30
pub fn quarter_end_date(
    fiscal_year: i32,
    quarter: Quarter,
    fiscal_year_end_month: u32,
) -> Option<NaiveDate> {
    let months_back = 3 * (4 - quarter.number()) as i32;
    let absolute = fiscal_year * 12 + (fiscal_year_end_month as i32 - 1) - months_back;
    let year = absolute.div_euclid(12);
    let month = absolute.rem_euclid(12) as u32 + 1;
    last_day_of_month(year, month)
}
