//! Error type shared by every handler.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use super::validation::ValidationErrors;
use crate::billing::BillingError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Unauthenticated.")]
    Unauthenticated,
    #[error("Your email address is not verified.")]
    Unverified,
    #[error("Administrators cannot access member pages.")]
    AdminForbidden,
    #[error("This action is unauthorized.")]
    Forbidden,
    #[error("A premium subscription is required.")]
    PremiumRequired,
    #[error("The payment could not be completed. Please try another card.")]
    PaymentIncomplete,
    #[error("You are already subscribed to the premium plan.")]
    AlreadySubscribed,
    #[error("Not found.")]
    NotFound,
    #[error("{0}")]
    BadRequest(&'static str),
    #[error("{0}")]
    Conflict(&'static str),
    #[error("The given data was invalid.")]
    Validation(ValidationErrors),
    #[error("billing provider error: {0}")]
    Billing(#[from] BillingError),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub errors: Option<ValidationErrors>,
}

impl ApiError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::Unverified | Self::AdminForbidden | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::PremiumRequired | Self::PaymentIncomplete => StatusCode::PAYMENT_REQUIRED,
            Self::AlreadySubscribed | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Billing(_) => StatusCode::BAD_GATEWAY,
            Self::Database(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            Self::Validation(errors) => ErrorBody {
                message: "The given data was invalid.".to_string(),
                errors: Some(errors),
            },
            Self::Billing(err) => {
                error!("Billing provider call failed: {err}");
                ErrorBody {
                    message: "The billing provider could not process the request.".to_string(),
                    errors: None,
                }
            }
            Self::Database(err) => {
                error!("Database error: {err}");
                ErrorBody {
                    message: "Server Error".to_string(),
                    errors: None,
                }
            }
            Self::Internal(err) => {
                error!("Internal error: {err}");
                ErrorBody {
                    message: "Server Error".to_string(),
                    errors: None,
                }
            }
            other => ErrorBody {
                message: other.to_string(),
                errors: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(format!("{err:#}"))
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
