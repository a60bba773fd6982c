//! Business logic services.
//!
//! Services are stateless structs borrowing the pool (and clients) from
//! `AppState`; routes build one per request.
//!
//! # Services
//!
//! - `admin` - Dashboard aggregates and user management
//! - `auth` - Registration, password login, JWT issue/verify
//! - `catalog` - Categories, features, models and the built-in seed
//! - `credits` - Balance checks, atomic debit, grants
//! - `generation` - Prompt assembly, LLM calls, conversation memory
//! - `user` - Profile, account deletion, plan changes
//! - `voucher` - Discount code creation, validation, redemption

pub mod admin;
pub mod auth;
pub mod catalog;
pub mod credits;
pub mod generation;
pub mod user;
pub mod voucher;

pub use admin::AdminService;
pub use auth::{AuthError, AuthService};
pub use catalog::{CatalogError, CatalogService};
pub use credits::{CreditService, check_user_credits};
pub use generation::{GenerationError, GenerationService, MemoryStore};
pub use user::{UserError, UserService};
pub use voucher::{VoucherError, VoucherOutcome, VoucherService};
