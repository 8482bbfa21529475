//! Shift schedule and the hour/wage totals derived from it.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::info;

use crate::calendar::{normalize_date, YearMonth};
use crate::error::{AppError, Result};
use crate::store::{Removed, Store};
use crate::tables::{Shift, User};

pub type ShiftId = u64;

const MINUTES_PER_DAY: u32 = 24 * 60;

#[derive(Debug, Clone)]
pub struct NewShift {
    pub date: String,
    pub user: String,
    pub start_time: String,
    pub end_time: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyTotals {
    pub user: String,
    pub year_month: String,
    pub shift_count: usize,
    pub total_minutes: u64,
    pub total_hours: f64,
    pub estimated_pay: u64,
}

/// Minutes after midnight for `HH:MM` (or `HHMM`) on a 24-hour clock.
pub fn parse_clock(value: &str) -> Option<u32> {
    let value = value.trim();
    let (hours, minutes) = match value.split_once(':') {
        Some(split) => split,
        None if value.len() == 4 && value.is_ascii() => value.split_at(2),
        None => return None,
    };
    let two_digits = |part: &str| part.len() == 2 && part.bytes().all(|b| b.is_ascii_digit());
    if !two_digits(hours) || !two_digits(minutes) {
        return None;
    }
    let hours = hours.parse::<u32>().ok()?;
    let minutes = minutes.parse::<u32>().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    Some(hours * 60 + minutes)
}

pub fn format_clock(minutes: u32) -> String {
    let minutes = minutes % MINUTES_PER_DAY;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

pub(crate) fn require_clock(label: &str, value: &str) -> Result<u32> {
    parse_clock(value)
        .ok_or_else(|| AppError::invalid(format!("{label} must be HH:MM, got `{value}`")))
}

/// Length of a shift in minutes. An end before the start runs past midnight.
pub fn shift_minutes(start: u32, end: u32) -> u32 {
    if end >= start {
        end - start
    } else {
        end + MINUTES_PER_DAY - start
    }
}

/// Decimal hours between two `HH:MM` times.
pub fn hours_worked(start: &str, end: &str) -> Result<f64> {
    let start = require_clock("start time", start)?;
    let end = require_clock("end time", end)?;
    Ok(f64::from(shift_minutes(start, end)) / 60.0)
}

fn stored_minutes(shift: &Shift) -> u32 {
    match (parse_clock(&shift.start_time), parse_clock(&shift.end_time)) {
        (Some(start), Some(end)) => shift_minutes(start, end),
        _ => 0,
    }
}

/// Adds a shift and returns its id. The id is picked inside the same locked
/// transaction as the append.
pub fn add_shift(store: &Store, shift: NewShift) -> Result<ShiftId> {
    let date = normalize_date(shift.date.as_str())?;
    let user = shift.user.trim().to_string();
    if user.is_empty() {
        return Err(AppError::invalid("shift needs a staff member"));
    }
    let start_time = format_clock(require_clock("start time", shift.start_time.as_str())?);
    let end_time = format_clock(require_clock("end time", shift.end_time.as_str())?);
    let color = shift.color.trim().to_string();

    let id = store.insert_next::<Shift, _>(|id| Shift {
        id,
        date,
        user,
        start_time,
        end_time,
        color,
    })?;
    info!(id, "added shift");
    Ok(id)
}

pub fn remove_shift(store: &Store, id: ShiftId) -> Result<Removed> {
    let removed = store.remove_id::<Shift>(id)?;
    if removed == Removed::Deleted {
        info!(id, "removed shift");
    }
    Ok(removed)
}

fn sort_shifts(shifts: &mut [Shift]) {
    shifts.sort_by(|a, b| {
        (a.date.as_str(), a.start_time.as_str(), a.id).cmp(&(
            b.date.as_str(),
            b.start_time.as_str(),
            b.id,
        ))
    });
}

pub fn shifts_for_month(store: &Store, month: YearMonth) -> Result<Vec<Shift>> {
    let mut shifts: Vec<Shift> = store
        .read::<Shift>()?
        .into_iter()
        .filter(|shift| month.contains(shift.date.as_str()))
        .collect();
    sort_shifts(&mut shifts);
    Ok(shifts)
}

pub fn shifts_for_day(store: &Store, date: &str) -> Result<Vec<Shift>> {
    let date = normalize_date(date)?;
    let mut shifts: Vec<Shift> = store
        .read::<Shift>()?
        .into_iter()
        .filter(|shift| shift.date == date)
        .collect();
    sort_shifts(&mut shifts);
    Ok(shifts)
}

/// Floored pay for `minutes` at `wage` per hour, saturating at `u64::MAX`.
fn pay_for(minutes: u64, wage: u64) -> u64 {
    let pay = u128::from(minutes) * u128::from(wage) / 60;
    u64::try_from(pay).unwrap_or(u64::MAX)
}

fn totals_from(shifts: &[Shift], users: &[User], user: &str, month: YearMonth) -> MonthlyTotals {
    let (shift_count, total_minutes) = shifts
        .iter()
        .filter(|shift| shift.user == user && month.contains(shift.date.as_str()))
        .fold((0_usize, 0_u64), |(count, minutes), shift| {
            (count + 1, minutes + u64::from(stored_minutes(shift)))
        });
    let wage = users
        .iter()
        .find(|candidate| candidate.username == user || candidate.name == user)
        .map(|found| found.hourly_wage)
        .unwrap_or(0);
    MonthlyTotals {
        user: user.to_string(),
        year_month: month.to_string(),
        shift_count,
        total_minutes,
        total_hours: total_minutes as f64 / 60.0,
        estimated_pay: pay_for(total_minutes, wage),
    }
}

/// Shift count, hours and floored pay for one staff member in a month.
/// `user` is matched against the shift's `user` column; the wage comes from
/// the account whose username or display name equals it.
pub fn monthly_totals(store: &Store, user: &str, month: YearMonth) -> Result<MonthlyTotals> {
    let shifts = store.read::<Shift>()?;
    let users = store.read::<User>()?;
    Ok(totals_from(shifts.as_slice(), users.as_slice(), user, month))
}

/// Totals for everyone with at least one shift in the month, by name.
pub fn payroll(store: &Store, month: YearMonth) -> Result<Vec<MonthlyTotals>> {
    let shifts = store.read::<Shift>()?;
    let users = store.read::<User>()?;
    let workers: BTreeSet<&str> = shifts
        .iter()
        .filter(|shift| month.contains(shift.date.as_str()))
        .map(|shift| shift.user.as_str())
        .collect();
    Ok(workers
        .into_iter()
        .map(|user| totals_from(shifts.as_slice(), users.as_slice(), user, month))
        .collect())
}
