use std::convert::Infallible;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    BoxError, Json,
};
use poap_mint_pool::{
    directory::DirectoryError,
    eligibility::{AttendanceError, IneligibleReason},
    error::MintPoolError,
    gateway::GatewayError,
    wallet::WalletAddress,
};
use serde_derive::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::{error, warn};

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Mint Pool Error: {0}")]
    MintPoolError(#[from] MintPoolError),

    #[error("Invalid wallet address {0}")]
    InvalidWallet(String),

    #[error("Wallet {0} is not eligible: {}", .1.code())]
    NotEligible(WalletAddress, IneligibleReason),

    #[error("Directory Error: {0}")]
    DirectoryError(#[from] DirectoryError),

    #[error("Attendance Error: {0}")]
    AttendanceError(#[from] AttendanceError),

    #[error("Gateway Error: {0}")]
    GatewayError(#[from] GatewayError),

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Internal Error")]
    InternalError,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Error {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message, code) = match self {
            ApiError::MintPoolError(e) => {
                error!("Mint pool error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal Server Error".to_string(),
                    None,
                )
            }
            ApiError::InvalidWallet(w) => {
                warn!("Invalid wallet address {w}");
                (
                    StatusCode::BAD_REQUEST,
                    "Invalid wallet address".to_string(),
                    None,
                )
            }
            ApiError::NotEligible(w, reason) => {
                warn!("Wallet {w} not eligible: {}", reason.code());
                let status = match reason {
                    IneligibleReason::EventNotFound => StatusCode::NOT_FOUND,
                    IneligibleReason::MissingEventCode => StatusCode::BAD_REQUEST,
                    IneligibleReason::FetchEventError => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::FORBIDDEN,
                };
                (
                    status,
                    reason.message().to_string(),
                    Some(reason.code().to_string()),
                )
            }
            ApiError::DirectoryError(e) => {
                warn!("Directory error: {e}");
                let status = match &e {
                    DirectoryError::EventNotFound(_) => StatusCode::NOT_FOUND,
                    DirectoryError::EventAlreadyExists(_) => StatusCode::CONFLICT,
                    DirectoryError::EventClosed(_) => StatusCode::BAD_REQUEST,
                    DirectoryError::FetchEventError(_) => StatusCode::BAD_GATEWAY,
                };
                (status, e.to_string(), Some(e.code().to_string()))
            }
            ApiError::AttendanceError(e) => {
                warn!("Attendance error: {e}");
                let status = match &e {
                    AttendanceError::Directory(DirectoryError::EventNotFound(_)) => {
                        StatusCode::NOT_FOUND
                    }
                    AttendanceError::Directory(DirectoryError::FetchEventError(_))
                    | AttendanceError::Verifier(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    _ => StatusCode::BAD_REQUEST,
                };
                (status, e.to_string(), Some(e.code().to_string()))
            }
            ApiError::GatewayError(e) => {
                error!("POAP gateway error: {e}");
                let status = match &e {
                    GatewayError::Api { .. } => StatusCode::BAD_REQUEST,
                    GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
                    GatewayError::InvalidApiKey => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.to_string(), None)
            }
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Unauthorized".to_string(),
                None,
            ),
            ApiError::InternalError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
                None,
            ),
        };
        (
            status,
            Json(Error {
                error: error_message,
                code,
            }),
        )
            .into_response()
    }
}

pub async fn handle_error(error: BoxError) -> Result<impl IntoResponse, Infallible> {
    if error.is::<tower::timeout::error::Elapsed>() {
        return Ok((
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "code" : 408,
                "error" : "Request Timeout",
            })),
        ));
    };
    if error.is::<tower::load_shed::error::Overloaded>() {
        return Ok((
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "code" : 503,
                "error" : "Service Unavailable",
            })),
        ));
    }

    Ok((
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "code" : 500,
            "error" : "Internal Server Error",
        })),
    ))
}
