//! Achievement ledger - student achievement lifecycle service
//!
//! One logical achievement is split across two stores:
//!
//! - **Content** (MongoDB): title, description, type-specific details,
//!   attachments, tags and points, with a soft-delete flag
//! - **Reference** (SQLite): workflow status, submission and verification
//!   timestamps, verifier identity and rejection note
//!
//! The lifecycle service keeps them coherent without a cross-store
//! transaction and enforces the draft → submitted → verified | rejected
//! state machine. The report service aggregates across both.

pub mod config;
pub mod db;
pub mod directory;
pub mod error;
pub mod routes;
pub mod server;
pub mod services;
pub mod store;
pub mod types;

pub use config::Args;
pub use error::{AchievementError, Result, StoreError};
pub use server::{run, AppState};
pub use services::Services;
pub use types::{AchievementStatus, Caller, Role};
