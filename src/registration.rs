//! Validates the task registrations passed to `Scheduler::initialize`.
//!
//! Validation is all-or-nothing: the first invalid entry aborts the whole
//! batch rather than silently dropping it, so a typo in one task can't leave
//! the rest half-registered.

use crate::cron::CronExpression;
use crate::errors::RegistrationError;
use crate::time::Millis;
use futures::future::BoxFuture;
use std::sync::Arc;

/// The work a task performs when it fires. Boxed and `Send + Sync` so a
/// single callback can be shared across concurrent poll-tick dispatches.
pub type TaskCallback = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// One registration entry after shape/type/uniqueness validation.
#[derive(Clone)]
pub struct ParsedRegistration {
    pub name: String,
    pub cron: CronExpression,
    pub callback: TaskCallback,
    pub retry_delay: Millis,
}

impl std::fmt::Debug for ParsedRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParsedRegistration")
            .field("name", &self.name)
            .field("cron", &self.cron.source())
            .field("retry_delay", &self.retry_delay)
            .finish()
    }
}

/// A non-fatal observation raised during validation that doesn't block
/// registration but is worth a `tracing::warn!`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationWarning {
    NameHasWhitespace { name: String },
    RetryDelayExceedsADay { name: String },
}

/// Input shape accepted from a caller building a batch of registrations.
pub struct RawRegistration {
    pub name: Option<String>,
    pub cron: Option<String>,
    pub callback: Option<TaskCallback>,
    pub retry_delay_ms: Option<i64>,
}

/// Validates a batch of raw registrations, returning the parsed form and any
/// non-fatal warnings, or the first `RegistrationError` encountered.
///
/// Names must be unique and non-blank; the cron expression must parse; the
/// callback slot must be present; the retry delay, if given, must be a
/// non-negative number of milliseconds (absent defaults to zero).
pub fn validate(
    raw: Vec<RawRegistration>,
) -> Result<(Vec<ParsedRegistration>, Vec<RegistrationWarning>), RegistrationError> {
    if raw.is_empty() {
        return Ok((Vec::new(), Vec::new()));
    }

    let mut parsed = Vec::with_capacity(raw.len());
    let mut warnings = Vec::new();
    let mut seen_names = std::collections::HashSet::with_capacity(raw.len());

    for (index, entry) in raw.into_iter().enumerate() {
        let name = match entry.name {
            Some(n) if !n.trim().is_empty() => n,
            _ => return Err(RegistrationError::InvalidName { index }),
        };

        if name.trim() != name {
            warnings.push(RegistrationWarning::NameHasWhitespace { name: name.clone() });
        }

        if !seen_names.insert(name.clone()) {
            return Err(RegistrationError::DuplicateTaskName { name });
        }

        let cron_source = match entry.cron {
            Some(ref c) if !c.trim().is_empty() => c.clone(),
            _ => {
                return Err(RegistrationError::InvalidCronType {
                    index,
                    name: name.clone(),
                })
            }
        };

        let cron = CronExpression::parse(&cron_source).map_err(|source| {
            RegistrationError::CronExpressionInvalid {
                name: name.clone(),
                value: cron_source.clone(),
                source,
            }
        })?;

        let callback = match entry.callback {
            Some(cb) => cb,
            None => {
                return Err(RegistrationError::CallbackType {
                    index,
                    name: name.clone(),
                })
            }
        };

        let retry_delay = match entry.retry_delay_ms {
            None => Millis::ZERO,
            Some(ms) => match Millis::from_signed(ms) {
                Some(m) => m,
                None => return Err(RegistrationError::NegativeRetryDelay { name: name.clone() }),
            },
        };

        if retry_delay.exceeds_a_day() {
            warnings.push(RegistrationWarning::RetryDelayExceedsADay { name: name.clone() });
        }

        parsed.push(ParsedRegistration {
            name,
            cron,
            callback,
            retry_delay,
        });
    }

    Ok((parsed, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_callback() -> TaskCallback {
        Arc::new(|| Box::pin(async { Ok(()) }))
    }

    fn raw(name: &str, cron: &str) -> RawRegistration {
        RawRegistration {
            name: Some(name.to_string()),
            cron: Some(cron.to_string()),
            callback: Some(noop_callback()),
            retry_delay_ms: None,
        }
    }

    #[test]
    fn accepts_well_formed_batch() {
        let (parsed, warnings) = validate(vec![raw("a", "* * * * *"), raw("b", "0 0 * * *")]).unwrap();
        assert_eq!(parsed.len(), 2);
        assert!(warnings.is_empty());
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = validate(vec![raw("a", "* * * * *"), raw("a", "0 0 * * *")]).unwrap_err();
        assert!(matches!(err, RegistrationError::DuplicateTaskName { name } if name == "a"));
    }

    #[test]
    fn rejects_blank_name() {
        let mut entry = raw("x", "* * * * *");
        entry.name = Some("   ".to_string());
        let err = validate(vec![entry]).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidName { index: 0 }));
    }

    #[test]
    fn rejects_missing_cron() {
        let mut entry = raw("a", "* * * * *");
        entry.cron = None;
        let err = validate(vec![entry]).unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidCronType { .. }));
    }

    #[test]
    fn rejects_invalid_cron_syntax() {
        let err = validate(vec![raw("a", "not a cron")]).unwrap_err();
        assert!(matches!(err, RegistrationError::CronExpressionInvalid { .. }));
    }

    #[test]
    fn rejects_missing_callback() {
        let mut entry = raw("a", "* * * * *");
        entry.callback = None;
        let err = validate(vec![entry]).unwrap_err();
        assert!(matches!(err, RegistrationError::CallbackType { .. }));
    }

    #[test]
    fn rejects_negative_retry_delay() {
        let mut entry = raw("a", "* * * * *");
        entry.retry_delay_ms = Some(-1);
        let err = validate(vec![entry]).unwrap_err();
        assert!(matches!(err, RegistrationError::NegativeRetryDelay { .. }));
    }

    #[test]
    fn warns_on_whitespace_padded_name() {
        let mut entry = raw("a", "* * * * *");
        entry.name = Some(" a ".to_string());
        let (_, warnings) = validate(vec![entry]).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, RegistrationWarning::NameHasWhitespace { .. })));
    }

    #[test]
    fn warns_on_long_retry_delay() {
        let mut entry = raw("a", "* * * * *");
        entry.retry_delay_ms = Some(2 * 24 * 60 * 60 * 1000);
        let (_, warnings) = validate(vec![entry]).unwrap();
        assert!(warnings
            .iter()
            .any(|w| matches!(w, RegistrationWarning::RetryDelayExceedsADay { .. })));
    }

    #[test]
    fn all_or_nothing_first_error_wins() {
        let batch = vec![raw("a", "* * * * *"), raw("bad", "garbage"), raw("c", "* * * * *")];
        let err = validate(batch).unwrap_err();
        assert!(matches!(err, RegistrationError::CronExpressionInvalid { ref name, .. } if name == "bad"));
    }
}
