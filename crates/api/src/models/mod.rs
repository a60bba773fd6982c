//! Domain models.
//!
//! Validated domain types built from database rows. Repositories convert rows
//! into these; services and routes only ever see these.

pub mod admin;
pub mod catalog;
pub mod chat;
pub mod session;
pub mod user;
pub mod voucher;

pub use admin::Admin;
pub use catalog::{AiModel, Category, CostRates, Feature, ModelKind};
pub use chat::{Chat, ChatStats, ChatSummary, Message};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{CREDIT_THRESHOLD, Gig, User, UserProfile};
pub use voucher::{Voucher, VoucherCheck};
