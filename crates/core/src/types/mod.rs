//! Core types for Reality Cheque.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod status;
pub mod tier;
pub mod voucher_code;

pub use email::{Email, EmailError};
pub use id::*;
pub use status::*;
pub use tier::{Tier, TierError};
pub use voucher_code::{VoucherCode, VoucherCodeError};
