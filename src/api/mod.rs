//! REST API module.
//!
//! Public registration, team and payment routes plus the admin surface. Handlers
//! delegate to the repository and wrap results in the `{success, data}` envelope.

mod archives;
mod attendance;
mod exports;
mod members;
mod payments;
mod registration;
mod settings;
mod stats;
mod teams;

pub use archives::*;
pub use attendance::*;
pub use exports::*;
pub use members::*;
pub use payments::*;
pub use registration::*;
pub use settings::*;
pub use stats::*;
pub use teams::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Success response envelope.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    #[serde(skip)]
    status: StatusCode,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Self {
        Self {
            success: true,
            data,
            status: StatusCode::OK,
        }
    }

    /// Same envelope, answered with `201 Created`.
    pub fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            ..Self::new(data)
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Response type that can be either success or error.
pub type ApiResult<T> = Result<ApiResponse<T>, crate::errors::AppError>;

/// Create a successful API response.
pub fn success<T: Serialize>(data: T) -> ApiResult<T> {
    Ok(ApiResponse::new(data))
}

/// Local wall-clock time; prices and the late cutoff follow the venue's clock.
pub(crate) fn local_now() -> chrono::NaiveDateTime {
    chrono::Local::now().naive_local()
}
