use axum::extract::rejection::JsonRejection;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::api::response::{failure, ApiObject};
use crate::tasks::errors::{ApiErrorKind, ErrorEnvelope, TaskError};

pub fn map_task_error(error: TaskError) -> ApiObject<Value> {
    let envelope = error.to_envelope();
    match envelope.kind.family() {
        ApiErrorKind::ValidationError => {
            debug!(error = %error, "rejected task request");
        }
        ApiErrorKind::ExternalApiError | ApiErrorKind::ParseError => {
            warn!(kind = ?envelope.kind, error = %error, "task provider error");
        }
        _ => {
            error!(kind = ?envelope.kind, error = %error, "task request failed");
        }
    }
    failure(envelope)
}

pub fn validation_error(message: impl Into<String>) -> ApiObject<Value> {
    failure(ErrorEnvelope::new(
        ApiErrorKind::ValidationError,
        message,
        None,
    ))
}

pub fn json_rejection(rejection: JsonRejection) -> ApiObject<Value> {
    validation_error(format!("Invalid JSON request body: {}", rejection.body_text()))
}

pub fn internal_error(message: impl Into<String>) -> ApiObject<Value> {
    let detail = message.into();
    error!(detail = %detail, "internal api error");
    failure(ErrorEnvelope::new(
        ApiErrorKind::InternalError,
        "Internal server error",
        None,
    ))
}
