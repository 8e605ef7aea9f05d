//! Pure next/previous-fire calculation over a parsed cron expression.
//!
//! Both directions advance field-by-field (month, then day, then hour, then
//! minute) rather than scanning minute-by-minute, bounded by a configurable
//! look-back/look-ahead window to guarantee termination.

use super::expression::CronExpression;
use crate::time::Instant;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalculatorBoundExceeded;

impl fmt::Display for CalculatorBoundExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cron calculation exceeded its look-ahead/look-back bound")
    }
}

impl std::error::Error for CalculatorBoundExceeded {}

/// Default look-ahead/look-back bound: a worst-case window of about 4 years.
pub const DEFAULT_LOOKAHEAD_DAYS: i64 = 4 * 366;

/// A safety valve independent of the date bound: a correct field-carry
/// search converges in well under a thousand iterations even for expressions
/// combining a sparse day-of-month with a sparse weekday (the classic
/// pathological case), so any larger count indicates the advance logic
/// isn't making progress.
const MAX_ITERATIONS: u32 = 10_000;

fn last_day_of_month(year: i32, month: u32) -> u32 {
    use chrono::Datelike;
    let (next_year, next_month) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
    let first_of_next =
        chrono::NaiveDate::from_ymd_opt(next_year, next_month, 1).expect("valid calendar month");
    let last = first_of_next.pred_opt().expect("month has at least one day");
    last.day()
}

/// Smallest instant `t > from` whose fields all satisfy `expr`.
pub fn next_fire(
    expr: &CronExpression,
    from: Instant,
    lookahead_days: i64,
) -> Result<Option<Instant>, CalculatorBoundExceeded> {
    let mut candidate = from.start_of_minute().add_minutes(1);
    let bound = from.add_days(lookahead_days);

    for _ in 0..MAX_ITERATIONS {
        if candidate > bound {
            return Ok(None);
        }

        let (month, month_wrapped) = expr
            .month
            .next_at_or_after(candidate.month())
            .expect("month field set is never empty");
        if month_wrapped || month != candidate.month() {
            let year = candidate.year() + if month_wrapped { 1 } else { 0 };
            candidate = Instant::with_fields(year, month, 1, 0, 0)
                .expect("first of month is always a valid calendar date");
            continue;
        }

        if !expr.day_matches(candidate.day_of_month(), candidate.weekday()) {
            candidate = candidate.start_of_day().add_days(1);
            continue;
        }

        let (hour, hour_wrapped) = expr
            .hour
            .next_at_or_after(candidate.hour())
            .expect("hour field set is never empty");
        if hour_wrapped {
            candidate = candidate.start_of_day().add_days(1);
            continue;
        }
        if hour != candidate.hour() {
            candidate = Instant::with_fields(
                candidate.year(),
                candidate.month(),
                candidate.day_of_month(),
                hour,
                0,
            )
            .expect("same calendar day, valid hour");
            continue;
        }

        let (minute, minute_wrapped) = expr
            .minute
            .next_at_or_after(candidate.minute())
            .expect("minute field set is never empty");
        if minute_wrapped {
            candidate = candidate.start_of_hour().add_minutes(60);
            continue;
        }
        if minute != candidate.minute() {
            candidate = Instant::with_fields(
                candidate.year(),
                candidate.month(),
                candidate.day_of_month(),
                candidate.hour(),
                minute,
            )
            .expect("same calendar hour, valid minute");
            continue;
        }

        return Ok(Some(candidate));
    }

    Err(CalculatorBoundExceeded)
}

/// Largest instant `t <= upto` whose fields all satisfy `expr`.
pub fn most_recent_fire(
    expr: &CronExpression,
    upto: Instant,
    lookback_days: i64,
) -> Result<Option<Instant>, CalculatorBoundExceeded> {
    let mut candidate = upto.start_of_minute();
    let bound = upto.add_days(-lookback_days);

    for _ in 0..MAX_ITERATIONS {
        if candidate < bound {
            return Ok(None);
        }

        let (month, month_wrapped) = expr
            .month
            .prev_at_or_before(candidate.month())
            .expect("month field set is never empty");
        if month_wrapped || month != candidate.month() {
            let year = candidate.year() - if month_wrapped { 1 } else { 0 };
            let day = last_day_of_month(year, month);
            candidate = Instant::with_fields(year, month, day, 23, 59)
                .expect("last day of a real calendar month is always valid");
            continue;
        }

        if !expr.day_matches(candidate.day_of_month(), candidate.weekday()) {
            candidate = candidate.start_of_day().add_minutes(-1);
            continue;
        }

        let (hour, hour_wrapped) = expr
            .hour
            .prev_at_or_before(candidate.hour())
            .expect("hour field set is never empty");
        if hour_wrapped {
            candidate = candidate.start_of_day().add_minutes(-1);
            continue;
        }
        if hour != candidate.hour() {
            candidate = Instant::with_fields(
                candidate.year(),
                candidate.month(),
                candidate.day_of_month(),
                hour,
                59,
            )
            .expect("same calendar day, valid hour");
            continue;
        }

        let (minute, minute_wrapped) = expr
            .minute
            .prev_at_or_before(candidate.minute())
            .expect("minute field set is never empty");
        if minute_wrapped {
            candidate = candidate.start_of_hour().add_minutes(-1);
            continue;
        }
        if minute != candidate.minute() {
            candidate = Instant::with_fields(
                candidate.year(),
                candidate.month(),
                candidate.day_of_month(),
                candidate.hour(),
                minute,
            )
            .expect("same calendar hour, valid minute");
            continue;
        }

        return Ok(Some(candidate));
    }

    Err(CalculatorBoundExceeded)
}
