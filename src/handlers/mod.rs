pub mod buzzer;
pub mod diagnostics;
pub mod displays;
pub mod health;
pub mod snapshot;
pub mod timer;

pub use buzzer::*;
pub use diagnostics::*;
pub use displays::*;
pub use health::*;
pub use snapshot::*;
pub use timer::*;

use axum::http::StatusCode;
use axum::Json;

use crate::models::ErrorResponse;
use crate::store::StoreError;

pub(crate) fn error_response(status: StatusCode, error: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        status,
        Json(ErrorResponse {
            code: status.as_u16(),
            status: status.to_string(),
            error: error.to_string(),
        }),
    )
}

pub(crate) fn store_error(e: StoreError) -> (StatusCode, Json<ErrorResponse>) {
    error_response(StatusCode::SERVICE_UNAVAILABLE, &format!("Shared store unavailable: {}", e))
}
