//! HTTP server for achievement-ledger

pub mod http;

pub use http::{dispatch, run, AppState};
