//! A financial research assistant built on `finscout-core`.
//!
//! The crate wires the agent loop up with market data tools, the
//! `financial_search` meta-router and an OpenAI-compatible model backend.
//! It also ships the `finscout` CLI.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

pub mod data;
mod session;
mod settings;
pub mod tools;

pub use session::{CREDENTIAL_NAMES, OPENAI_API_KEY, Session, SessionBuilder};
pub use settings::{Settings, SettingsError};

/// Re-exports of [`finscout_core`] crate.
pub mod core {
    pub use finscout_core::*;
}
