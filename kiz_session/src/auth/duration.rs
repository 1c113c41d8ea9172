//! Short duration grammar used for token lifetimes (`15m`, `12h`, `7d`).

use chrono::{DateTime, Duration, Utc};
use std::{fmt, str::FromStr};
use thiserror::Error;

/// Errors from parsing a duration spec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("Duration is empty")]
    Empty,

    #[error("Duration '{0}' has no amount")]
    MissingAmount(String),

    #[error("Duration '{0}' has an unknown unit (expected m, h or d)")]
    UnknownUnit(String),

    #[error("Duration '{0}' must be greater than zero")]
    Zero(String),

    #[error("Duration '{0}' is too large")]
    Overflow(String),
}

/// Unit of a [`TokenDuration`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Minutes,
    Hours,
    Days,
}

impl DurationUnit {
    fn suffix(self) -> char {
        match self {
            DurationUnit::Minutes => 'm',
            DurationUnit::Hours => 'h',
            DurationUnit::Days => 'd',
        }
    }

    fn seconds(self) -> i64 {
        match self {
            DurationUnit::Minutes => 60,
            DurationUnit::Hours => 60 * 60,
            DurationUnit::Days => 24 * 60 * 60,
        }
    }
}

/// `<integer><unit>` lifetime of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDuration {
    amount: u32,
    unit: DurationUnit,
}

impl TokenDuration {
    pub const fn minutes(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Minutes,
        }
    }

    pub const fn hours(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Hours,
        }
    }

    pub const fn days(amount: u32) -> Self {
        Self {
            amount,
            unit: DurationUnit::Days,
        }
    }

    /// Length in whole seconds. Also the cookie `Max-Age`.
    pub fn as_secs(&self) -> i64 {
        i64::from(self.amount) * self.unit.seconds()
    }

    pub fn as_duration(&self) -> Duration {
        Duration::seconds(self.as_secs())
    }

    /// Absolute point in time this duration ends at, starting from `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.as_duration()
    }
}

impl FromStr for TokenDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(last) = s.chars().last() else {
            return Err(DurationParseError::Empty);
        };

        let unit = match last {
            'm' => DurationUnit::Minutes,
            'h' => DurationUnit::Hours,
            'd' => DurationUnit::Days,
            _ => return Err(DurationParseError::UnknownUnit(s.to_string())),
        };

        let digits = &s[..s.len() - last.len_utf8()];
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(DurationParseError::MissingAmount(s.to_string()));
        }

        let amount: u32 = digits
            .parse()
            .map_err(|_| DurationParseError::Overflow(s.to_string()))?;
        if amount == 0 {
            return Err(DurationParseError::Zero(s.to_string()));
        }

        // chrono panics on durations past ~292 billion years; stay well below.
        if i64::from(amount) * unit.seconds() > 100 * 365 * DurationUnit::Days.seconds() {
            return Err(DurationParseError::Overflow(s.to_string()));
        }

        Ok(Self { amount, unit })
    }
}

impl fmt::Display for TokenDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

/// Parse `spec` and return the absolute expiry measured from `now`
pub fn expiry_timestamp(
    spec: &str,
    now: DateTime<Utc>,
) -> Result<DateTime<Utc>, DurationParseError> {
    Ok(spec.parse::<TokenDuration>()?.expires_at(now))
}
