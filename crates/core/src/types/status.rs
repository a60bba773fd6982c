//! Role and kind enums shared between the API and the CLI.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.chat_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    /// Wire/database name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a voucher's `value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "app.voucher_type", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum VoucherType {
    /// `value` is a percentage (0, 100] of the order value.
    Percentage,
    /// `value` is a flat dollar amount of credits.
    Credits,
}

impl VoucherType {
    /// Wire/database name of the voucher type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Percentage => "percentage",
            Self::Credits => "credits",
        }
    }
}

impl fmt::Display for VoucherType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for VoucherType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "percentage" => Ok(Self::Percentage),
            "credits" => Ok(Self::Credits),
            other => Err(format!("unknown voucher type: {other}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_role_serde() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
        let role: ChatRole = serde_json::from_str("\"assistant\"").unwrap();
        assert_eq!(role, ChatRole::Assistant);
    }

    #[test]
    fn test_voucher_type_from_str() {
        assert_eq!(
            "percentage".parse::<VoucherType>().unwrap(),
            VoucherType::Percentage
        );
        assert_eq!(" Credits ".parse::<VoucherType>().unwrap(), VoucherType::Credits);
        assert!("fixed".parse::<VoucherType>().is_err());
    }

    #[test]
    fn test_voucher_type_display() {
        assert_eq!(VoucherType::Credits.to_string(), "credits");
    }
}
