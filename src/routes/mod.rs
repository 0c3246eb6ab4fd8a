//! HTTP routes for achievement-ledger

pub mod achievements;
pub mod identity;
pub mod reports;
pub mod response;

use bytes::Bytes;
use http_body_util::Full;
use hyper::Response;

pub use identity::{caller_from_headers, Scope};
pub use response::{error_response, json_response};

/// Handlers return the rejection response on the error side so `?` can
/// short-circuit identity and parsing failures
pub type HandlerResult = Result<Response<Full<Bytes>>, Response<Full<Bytes>>>;
