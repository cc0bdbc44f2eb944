//! HTTP API handlers for rota-sched

pub mod assignments;
pub mod attendance;
pub mod conflicts;
pub mod health;
pub mod kiosk;

pub use assignments::assignment_routes;
pub use attendance::attendance_routes;
pub use conflicts::conflict_routes;
pub use health::health_routes;
pub use kiosk::kiosk_routes;

use axum::http::HeaderMap;
use rota_common::events::MutationToken;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// Header carrying the caller's pending mutation token
pub const MUTATION_TOKEN_HEADER: &str = "x-mutation-token";

/// Origin token the client attached to this write, if any
pub fn mutation_origin(headers: &HeaderMap) -> ApiResult<Option<MutationToken>> {
    let Some(value) = headers.get(MUTATION_TOKEN_HEADER) else {
        return Ok(None);
    };
    let raw = value
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{} is not valid text", MUTATION_TOKEN_HEADER)))?;
    let id = Uuid::parse_str(raw.trim())
        .map_err(|e| ApiError::BadRequest(format!("{}: {}", MUTATION_TOKEN_HEADER, e)))?;
    Ok(Some(MutationToken(id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_mutation_origin() {
        let mut headers = HeaderMap::new();
        assert_eq!(mutation_origin(&headers).unwrap(), None);

        let id = Uuid::new_v4();
        headers.insert(MUTATION_TOKEN_HEADER, HeaderValue::from_str(&id.to_string()).unwrap());
        assert_eq!(mutation_origin(&headers).unwrap(), Some(MutationToken(id)));

        headers.insert(MUTATION_TOKEN_HEADER, HeaderValue::from_static("nope"));
        assert!(mutation_origin(&headers).is_err());
    }
}
