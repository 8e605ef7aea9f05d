//! Cron expression parsing and next/previous-fire calculation.

mod calculator;
mod expression;

pub use calculator::{
    most_recent_fire, next_fire, CalculatorBoundExceeded, DEFAULT_LOOKAHEAD_DAYS,
};
pub use expression::{CronExpression, CronParseError, FieldKind};
