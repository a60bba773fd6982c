//! Reality Cheque Core - Shared types library.
//!
//! This crate provides common types used across all Reality Cheque components:
//! - `api` - JSON API server (auth, catalog, generation, vouchers)
//! - `cli` - Command-line tools for migrations, seeding and management
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, emails, tiers, voucher codes
//!   and roles

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
