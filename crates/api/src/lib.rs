//! Reality Cheque API library.
//!
//! JSON API for the Reality Cheque SaaS: accounts and tiers, the AI bot
//! catalog, LLM-backed generation with per-chat memory, credits and
//! vouchers. Exposed as a library so the CLI and tests can reuse it.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
