// src/errors.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::booking::BookingStatus;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("MongoDB error: {0}")]
    MongoDB(#[from] mongodb::error::Error),

    #[error("Invalid ObjectId: {0}")]
    InvalidObjectId(String),

    #[error("Booking not found")]
    BookingNotFound,

    #[error("Hotel not found")]
    HotelNotFound,

    #[error("Authentication error")]
    AuthError,

    #[error("Unauthorized access")]
    Unauthorized,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("Booking was modified concurrently")]
    Conflict,

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl IntoResponse for AppError {

    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            AppError::MongoDB(e) => {
                tracing::error!(error = %e, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::InvalidObjectId(_) => {
                (StatusCode::BAD_REQUEST, "Invalid ID format".to_string())
            }
            AppError::BookingNotFound => (StatusCode::NOT_FOUND, "Booking not found".to_string()),
            AppError::HotelNotFound => (StatusCode::NOT_FOUND, "Hotel not found".to_string()),
            AppError::AuthError => (StatusCode::UNAUTHORIZED, "Authentication failed".to_string()),
            AppError::Unauthorized => (StatusCode::FORBIDDEN, "Unauthorized access".to_string()),
            AppError::ValidationError(_) => {
                (StatusCode::BAD_REQUEST, "Validation failed".to_string())
            }
            AppError::InvalidTransition { .. } => {
                (StatusCode::CONFLICT, "Invalid status transition".to_string())
            }
            AppError::Conflict => (StatusCode::CONFLICT, "Concurrent modification".to_string()),
            AppError::ConfigurationError(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Configuration error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "message": self.to_string(),
            "success": false,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        }));

        (status, body).into_response()
    }
}

impl From<mongodb::bson::oid::Error> for AppError {
    fn from(err: mongodb::bson::oid::Error) -> Self {
        AppError::InvalidObjectId(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::ValidationError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(_: jsonwebtoken::errors::Error) -> Self {
        AppError::AuthError
    }
}

// Helper conversion functions
impl AppError {
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        AppError::ValidationError(msg.into())
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        AppError::ConfigurationError(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
