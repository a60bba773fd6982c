//! Voucher code type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`VoucherCode`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum VoucherCodeError {
    /// The code is shorter than 6 or longer than 8 characters.
    #[error("voucher code must be {min}-{max} characters (got {len})")]
    InvalidLength {
        /// Minimum allowed length.
        min: usize,
        /// Maximum allowed length.
        max: usize,
        /// Length of the rejected input.
        len: usize,
    },
    /// The code contains something other than `A-Z` or `0-9`.
    #[error("voucher code may only contain uppercase letters and digits")]
    InvalidCharacter,
}

/// A voucher code matching `^[A-Z0-9]{6,8}$`.
///
/// Parsing is strict: callers that accept user input should trim and
/// uppercase it first (see [`VoucherCode::normalize`]).
///
/// ```
/// use reality_cheque_core::VoucherCode;
///
/// assert!(VoucherCode::parse("SAVE20").is_ok());
/// assert!(VoucherCode::parse("save20").is_err());
/// assert!(VoucherCode::normalize(" save20 ").is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherCode(String);

impl VoucherCode {
    /// Minimum code length.
    pub const MIN_LENGTH: usize = 6;
    /// Maximum code length.
    pub const MAX_LENGTH: usize = 8;
    /// Characters a code may contain.
    pub const ALPHABET: &'static [u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

    /// Parse a code exactly as given.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not 6-8 characters of `A-Z0-9`.
    pub fn parse(s: &str) -> Result<Self, VoucherCodeError> {
        let len = s.chars().count();
        if !(Self::MIN_LENGTH..=Self::MAX_LENGTH).contains(&len) {
            return Err(VoucherCodeError::InvalidLength {
                min: Self::MIN_LENGTH,
                max: Self::MAX_LENGTH,
                len,
            });
        }

        if !s
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        {
            return Err(VoucherCodeError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Trim and uppercase user input, then parse it.
    ///
    /// # Errors
    ///
    /// Returns an error if the normalized input is not a valid code.
    pub fn normalize(s: &str) -> Result<Self, VoucherCodeError> {
        Self::parse(&s.trim().to_uppercase())
    }

    /// Returns the code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VoucherCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for VoucherCode {
    type Err = VoucherCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for VoucherCode {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for VoucherCode {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for VoucherCode {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // The column carries a CHECK constraint with the same pattern
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for VoucherCode {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_codes() {
        assert!(VoucherCode::parse("SAVE20").is_ok());
        assert!(VoucherCode::parse("ABC1234").is_ok());
        assert!(VoucherCode::parse("12345678").is_ok());
    }

    #[test]
    fn test_parse_rejects_bad_length() {
        assert!(matches!(
            VoucherCode::parse("ABC12"),
            Err(VoucherCodeError::InvalidLength { len: 5, .. })
        ));
        assert!(matches!(
            VoucherCode::parse("ABCDEFGH9"),
            Err(VoucherCodeError::InvalidLength { len: 9, .. })
        ));
        assert!(matches!(
            VoucherCode::parse(""),
            Err(VoucherCodeError::InvalidLength { len: 0, .. })
        ));
    }

    #[test]
    fn test_parse_rejects_bad_characters() {
        assert_eq!(
            VoucherCode::parse("save20"),
            Err(VoucherCodeError::InvalidCharacter)
        );
        assert_eq!(
            VoucherCode::parse("SAVE-20"),
            Err(VoucherCodeError::InvalidCharacter)
        );
        assert_eq!(
            VoucherCode::parse("ÄBCDEF"),
            Err(VoucherCodeError::InvalidCharacter)
        );
    }

    #[test]
    fn test_normalize_trims_and_uppercases() {
        let code = VoucherCode::normalize("  save20\n").unwrap();
        assert_eq!(code.as_str(), "SAVE20");
    }

    #[test]
    fn test_alphabet_is_uppercase_alphanumeric() {
        assert_eq!(VoucherCode::ALPHABET.len(), 36);
        assert!(
            VoucherCode::ALPHABET
                .iter()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit())
        );
    }

    #[test]
    fn test_serde_transparent() {
        let code = VoucherCode::parse("WELCOME1").unwrap();
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"WELCOME1\"");
    }
}
