//! IMEI and TAC value types.
//!
//! The canonical form of an IMEI is the first fourteen characters of the
//! submitted string. This is a fixed-width truncation: check digits and
//! software version digits are discarded without Luhn validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of characters kept when normalising an IMEI.
pub const NORMALIZED_IMEI_LEN: usize = 14;
/// Number of leading characters forming the type allocation code.
pub const TAC_LEN: usize = 8;
/// Shortest accepted raw IMEI.
pub const MIN_IMEI_LEN: usize = 14;
/// Longest accepted raw IMEI.
pub const MAX_IMEI_LEN: usize = 16;

/// Validation errors raised when constructing IMEI value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImeiValidationError {
    /// Raw IMEI length falls outside `[14, 16]`.
    #[error("IMEI must be between {MIN_IMEI_LEN} and {MAX_IMEI_LEN} characters, got {length}")]
    Length { length: usize },
    /// Raw IMEI contains characters other than ASCII digits.
    #[error("IMEI must contain digits only")]
    NonDigit,
    /// TAC is not exactly eight digits.
    #[error("TAC must be exactly {TAC_LEN} digits")]
    InvalidTac,
}

/// Canonical 14-digit IMEI.
///
/// # Examples
/// ```
/// use imei_registry::domain::NormalizedImei;
///
/// let imei = NormalizedImei::parse("3567890123456789").expect("valid IMEI");
/// assert_eq!(imei.as_str(), "35678901234567");
/// assert_eq!(imei.tac().as_str(), "35678901");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NormalizedImei(String);

impl NormalizedImei {
    /// Validate a raw IMEI and normalise it.
    pub fn parse(raw: &str) -> Result<Self, ImeiValidationError> {
        let length = raw.chars().count();
        if !(MIN_IMEI_LEN..=MAX_IMEI_LEN).contains(&length) {
            return Err(ImeiValidationError::Length { length });
        }
        if !raw.chars().all(|c| c.is_ascii_digit()) {
            return Err(ImeiValidationError::NonDigit);
        }
        Ok(Self(normalize(raw)))
    }

    /// Borrow the canonical digits.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Type allocation code of this IMEI.
    pub fn tac(&self) -> Tac {
        Tac(self.0.chars().take(TAC_LEN).collect())
    }
}

impl fmt::Display for NormalizedImei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<NormalizedImei> for String {
    fn from(value: NormalizedImei) -> Self {
        value.0
    }
}

impl TryFrom<String> for NormalizedImei {
    type Error = ImeiValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Eight-digit type allocation code identifying a device model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tac(String);

impl Tac {
    /// Validate an eight-digit TAC.
    pub fn new(value: impl Into<String>) -> Result<Self, ImeiValidationError> {
        let value = value.into();
        if value.len() != TAC_LEN || !value.chars().all(|c| c.is_ascii_digit()) {
            return Err(ImeiValidationError::InvalidTac);
        }
        Ok(Self(value))
    }

    /// Borrow the TAC digits.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Tac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<Tac> for String {
    fn from(value: Tac) -> Self {
        value.0
    }
}

impl TryFrom<String> for Tac {
    type Error = ImeiValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

/// Truncate a raw IMEI to its canonical width.
///
/// Inputs shorter than fourteen characters are returned unchanged; callers
/// validate length before relying on the result.
pub fn normalize(raw: &str) -> String {
    raw.chars().take(NORMALIZED_IMEI_LEN).collect()
}

/// One submitted IMEI as stored against its device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImeiRecord {
    /// IMEI exactly as submitted.
    pub raw: String,
    /// Canonical form of `raw`.
    pub normalized: NormalizedImei,
    /// Set when the IMEI is already held by another request's ledger entry.
    pub duplicate: bool,
}

impl ImeiRecord {
    /// Build a record for a freshly ingested IMEI.
    pub fn new(raw: impl Into<String>, normalized: NormalizedImei) -> Self {
        Self {
            raw: raw.into(),
            normalized,
            duplicate: false,
        }
    }
}
