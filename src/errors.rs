use http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

/// Error body handed to the surrounding application for rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Conflict", "Unprocessable Entity")
    pub error: String,
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error description
    pub message: String,
    /// Offending quantities and limits, when the rejection carries any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// RFC 3339 timestamp when the error was produced
    pub timestamp: String,
}

/// Rejections of a proposed transition.
///
/// None of these leave an entity modified: a failed call is fully recoverable
/// by resubmitting corrected input.
#[derive(Debug, Clone, PartialEq, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Returned quantity {requested} exceeds issued quantity {limit}")]
    OverReturn { requested: Decimal, limit: Decimal },

    #[error("A damage reason is required when {quantity_damaged} units are damaged")]
    MissingDamageReason { quantity_damaged: Decimal },

    #[error("At least one evidence photo is required when {quantity_damaged} units are damaged")]
    MissingEvidence { quantity_damaged: Decimal },

    #[error("Issue {issue_id} has already been reconciled")]
    AlreadyReconciled { issue_id: Uuid },

    #[error(
        "Requested {requested_pallets} pallets and {requested_loose} loose boxes, \
         but only {available_pallets} pallets and {available_loose} loose boxes are unassigned"
    )]
    OverAllocation {
        requested_pallets: u32,
        available_pallets: u32,
        requested_loose: u32,
        available_loose: u32,
    },

    #[error("Allocation must assign at least one box")]
    EmptyAllocation,

    #[error(
        "Rack cannot hold {requested} more boxes: {remaining} of {capacity_total} remaining"
    )]
    CapacityExceeded {
        requested: u32,
        remaining: u32,
        capacity_total: u32,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::OverReturn { .. } => "over_return",
            Self::MissingDamageReason { .. } => "missing_damage_reason",
            Self::MissingEvidence { .. } => "missing_evidence",
            Self::AlreadyReconciled { .. } => "already_reconciled",
            Self::OverAllocation { .. } => "over_allocation",
            Self::EmptyAllocation => "empty_allocation",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::NotFound(_) => "not_found",
            Self::ValidationError(_) => "validation_error",
            Self::InvalidInput(_) => "invalid_input",
            Self::Conflict(_) => "conflict",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::OverReturn { .. }
            | Self::OverAllocation { .. }
            | Self::CapacityExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingDamageReason { .. }
            | Self::MissingEvidence { .. }
            | Self::EmptyAllocation
            | Self::ValidationError(_)
            | Self::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Self::AlreadyReconciled { .. } | Self::Conflict(_) => StatusCode::CONFLICT,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True for rejected business transitions, false for infrastructure faults.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, Self::InternalError(_))
    }

    /// Returns the error message suitable for display.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::InternalError(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }

    /// Structured quantities and limits for the rejection, if any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::OverReturn { requested, limit } => Some(json!({
                "requested": requested,
                "limit": limit,
            })),
            Self::MissingDamageReason { quantity_damaged }
            | Self::MissingEvidence { quantity_damaged } => Some(json!({
                "quantity_damaged": quantity_damaged,
            })),
            Self::AlreadyReconciled { issue_id } => Some(json!({ "issue_id": issue_id })),
            Self::OverAllocation {
                requested_pallets,
                available_pallets,
                requested_loose,
                available_loose,
            } => Some(json!({
                "requested_pallets": requested_pallets,
                "available_pallets": available_pallets,
                "requested_loose": requested_loose,
                "available_loose": available_loose,
            })),
            Self::CapacityExceeded {
                requested,
                remaining,
                capacity_total,
            } => Some(json!({
                "requested": requested,
                "remaining": remaining,
                "capacity_total": capacity_total,
            })),
            _ => None,
        }
    }
}

impl From<&ServiceError> for ErrorResponse {
    fn from(error: &ServiceError) -> Self {
        let status = error.status_code();
        ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            code: error.code().to_string(),
            message: error.response_message(),
            details: error.details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
