//! HTTP handlers, one module per resource

mod account;
mod commission;
mod health;
mod transaction;

pub use account::*;
pub use commission::*;
pub use health::*;
pub use transaction::*;

use super::types::ApiError;

/// Parse a ULID path segment
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid {} id: {}", what, raw)))
}
