use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Characters dropped from caller input before the digits are inspected.
const SEPARATORS: [char; 5] = [' ', '-', '.', '(', ')'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhoneError {
    #[error("phone number is empty")]
    Empty,
    #[error("phone number contains an invalid character '{0}'")]
    InvalidCharacter(char),
    #[error("'{0}' is not a recognised phone number format")]
    UnrecognizedFormat(String),
}

/// A phone number in canonical `+<country code><subscriber digits>` form.
///
/// Values are produced by [`NumberingPlan::normalize`]; deserialization only
/// accepts strings that already have the E.164 shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits without the leading `+`, the form WhatsApp uses for `wa_id`.
    pub fn digits(&self) -> &str {
        &self.0[1..]
    }
}

impl fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<PhoneNumber> for String {
    fn from(phone: PhoneNumber) -> Self {
        phone.0
    }
}

impl TryFrom<String> for PhoneNumber {
    type Error = PhoneError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let digits = value
            .strip_prefix('+')
            .ok_or_else(|| PhoneError::UnrecognizedFormat(value.clone()))?;
        if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(PhoneError::UnrecognizedFormat(value));
        }
        Ok(PhoneNumber(value))
    }
}

/// Numbering plan of the single country the service accepts numbers for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberingPlan {
    country_code: String,
    trunk_prefix: char,
    subscriber_digits: usize,
}

impl Default for NumberingPlan {
    fn default() -> Self {
        Self::kenya()
    }
}

impl NumberingPlan {
    /// Returns `None` unless the country code is 1 to 3 digits and the trunk
    /// prefix is a digit.
    pub fn new(country_code: &str, trunk_prefix: char, subscriber_digits: usize) -> Option<Self> {
        let valid_code = (1..=3).contains(&country_code.len())
            && country_code.chars().all(|c| c.is_ascii_digit());
        if !valid_code || !trunk_prefix.is_ascii_digit() || subscriber_digits == 0 {
            return None;
        }
        Some(Self {
            country_code: country_code.to_string(),
            trunk_prefix,
            subscriber_digits,
        })
    }

    /// Kenya: `+254`, trunk prefix `0`, 9 subscriber digits.
    pub fn kenya() -> Self {
        Self {
            country_code: "254".to_string(),
            trunk_prefix: '0',
            subscriber_digits: 9,
        }
    }

    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Converts local, country-code or international input into canonical form.
    ///
    /// Formatting separators (spaces, hyphens, dots, parentheses) are ignored;
    /// any other non-digit character rejects the input.
    pub fn normalize(&self, raw: &str) -> Result<PhoneNumber, PhoneError> {
        let trimmed = raw.trim();
        let (international, rest) = match trimmed.strip_prefix('+') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };

        let mut digits = String::with_capacity(rest.len());
        for c in rest.chars() {
            if c.is_ascii_digit() {
                digits.push(c);
            } else if !SEPARATORS.contains(&c) {
                return Err(PhoneError::InvalidCharacter(c));
            }
        }
        if digits.is_empty() {
            return Err(PhoneError::Empty);
        }

        let international_len = self.country_code.len() + self.subscriber_digits;
        let with_country_code =
            digits.starts_with(&self.country_code) && digits.len() == international_len;

        if international {
            if with_country_code {
                return Ok(PhoneNumber(format!("+{digits}")));
            }
        } else if with_country_code {
            return Ok(PhoneNumber(format!("+{digits}")));
        } else if digits.starts_with(self.trunk_prefix)
            && digits.len() == 1 + self.subscriber_digits
        {
            return Ok(PhoneNumber(format!("+{}{}", self.country_code, &digits[1..])));
        }

        Err(PhoneError::UnrecognizedFormat(raw.trim().to_string()))
    }

    pub fn is_canonical(&self, candidate: &str) -> bool {
        candidate.starts_with('+')
            && self
                .normalize(candidate)
                .map(|phone| phone.as_str() == candidate)
                .unwrap_or(false)
    }
}
