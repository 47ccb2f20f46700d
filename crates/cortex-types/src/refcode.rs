use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CTX-(\d{4})-(\d{2})(\d{2})-(\d{3,4})$").unwrap());

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReferenceCodeError {
    #[error("sequence must be between 1 and 9999, got {0}")]
    SequenceOutOfRange(i32),
    #[error("'{0}' does not match the reference code format")]
    Malformed(String),
}

/// `CTX-YYYY-MMDD-NNN`, unique per UTC day. Ordered by `(date, sequence)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReferenceCode {
    date: NaiveDate,
    sequence: u32,
}

impl ReferenceCode {
    pub fn new(date: NaiveDate, sequence: i32) -> Result<Self, ReferenceCodeError> {
        if sequence <= 0 || sequence > 9999 {
            return Err(ReferenceCodeError::SequenceOutOfRange(sequence));
        }
        Ok(Self {
            date,
            sequence: sequence as u32,
        })
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }
}

impl fmt::Display for ReferenceCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CTX-{}-{}-{:03}",
            self.date.format("%Y"),
            self.date.format("%m%d"),
            self.sequence
        )
    }
}

impl FromStr for ReferenceCode {
    type Err = ReferenceCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = PATTERN
            .captures(s)
            .ok_or_else(|| ReferenceCodeError::Malformed(s.to_string()))?;
        let year: i32 = caps[1].parse().unwrap();
        let month: u32 = caps[2].parse().unwrap();
        let day: u32 = caps[3].parse().unwrap();
        let sequence: u32 = caps[4].parse().unwrap();
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| ReferenceCodeError::Malformed(s.to_string()))?;
        if sequence == 0 || sequence > 9999 {
            return Err(ReferenceCodeError::SequenceOutOfRange(sequence as i32));
        }
        Ok(Self { date, sequence })
    }
}

impl TryFrom<String> for ReferenceCode {
    type Error = ReferenceCodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReferenceCode> for String {
    fn from(value: ReferenceCode) -> Self {
        value.to_string()
    }
}

/// The persisted tuple consumed by the reference-code generator (§3.9, §6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceState {
    pub date: NaiveDate,
    pub sequence: i32,
}

impl Default for SequenceState {
    fn default() -> Self {
        Self {
            date: NaiveDate::from_ymd_opt(1970, 1, 1).unwrap(),
            sequence: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_string() {
        let code = ReferenceCode::new(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(), 42).unwrap();
        let s = code.to_string();
        assert_eq!(s, "CTX-2026-0305-042");
        let parsed: ReferenceCode = s.parse().unwrap();
        assert_eq!(parsed, code);
    }

    #[test]
    fn widens_to_four_digits_past_999() {
        let code = ReferenceCode::new(NaiveDate::from_ymd_opt(2026, 3, 5).unwrap(), 1000).unwrap();
        assert_eq!(code.to_string(), "CTX-2026-0305-1000");
    }

    #[test]
    fn rejects_out_of_range_sequence() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        assert!(ReferenceCode::new(date, 0).is_err());
        assert!(ReferenceCode::new(date, 10000).is_err());
    }

    #[test]
    fn ordering_is_by_date_then_sequence() {
        let d1 = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let d2 = NaiveDate::from_ymd_opt(2026, 3, 6).unwrap();
        let a = ReferenceCode::new(d1, 5).unwrap();
        let b = ReferenceCode::new(d1, 6).unwrap();
        let c = ReferenceCode::new(d2, 1).unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn accepts_either_three_or_four_digit_sequences() {
        assert!("CTX-2026-0305-001".parse::<ReferenceCode>().is_ok());
        assert!("CTX-2026-0305-9999".parse::<ReferenceCode>().is_ok());
        assert!("CTX-2026-0305-1".parse::<ReferenceCode>().is_err());
    }
}
