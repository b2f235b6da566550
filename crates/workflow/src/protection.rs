use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use thiserror::Error;

use crate::{forms::FormView, selection::FormSubmission};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtectionError {
    #[error("There was a problem with your form submission. Please refresh the page and try again.")]
    TrapFilled,
    #[error("There was a problem with your form submission. Please refresh the page and try again.")]
    MissingTimestamp,
    #[error("There was a problem with your form submission. Please wait {limit_seconds} seconds and try again.")]
    TooFast { limit_seconds: i64 },
}

/// Anti-spam measures attached to public forms. Optional; flows work without one.
pub trait FormProtection: Send + Sync {
    fn protect(&self, form: &mut FormView);
    fn verify(&self, submission: &FormSubmission) -> Result<(), ProtectionError>;
}

pub const HONEYPOT_TRAP_FIELD: &str = "url";
pub const HONEYPOT_TIME_FIELD: &str = "honeypot_time";

/// A hidden field bots tend to fill in, plus a minimum time between render and submit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Honeypot {
    time_limit: TimeDelta,
}

impl Honeypot {
    pub fn new(time_limit_seconds: u32) -> Self {
        Self {
            time_limit: TimeDelta::seconds(i64::from(time_limit_seconds)),
        }
    }

    fn verify_at(&self, submission: &FormSubmission, now: DateTime<Utc>) -> Result<(), ProtectionError> {
        if !submission.is_blank(HONEYPOT_TRAP_FIELD) {
            return Err(ProtectionError::TrapFilled);
        }
        if self.time_limit.is_zero() {
            return Ok(());
        }

        let rendered_at = submission
            .text(HONEYPOT_TIME_FIELD)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or(ProtectionError::MissingTimestamp)?;
        if now.signed_duration_since(rendered_at) < self.time_limit {
            return Err(ProtectionError::TooFast {
                limit_seconds: self.time_limit.num_seconds(),
            });
        }
        Ok(())
    }
}

impl FormProtection for Honeypot {
    fn protect(&self, form: &mut FormView) {
        form.protection
            .insert(HONEYPOT_TRAP_FIELD.to_string(), Value::String(String::new()));
        form.protection.insert(
            HONEYPOT_TIME_FIELD.to_string(),
            Value::String(Utc::now().timestamp().to_string()),
        );
    }

    fn verify(&self, submission: &FormSubmission) -> Result<(), ProtectionError> {
        self.verify_at(submission, Utc::now())
    }
}
