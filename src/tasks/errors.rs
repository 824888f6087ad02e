use serde::Serialize;
use serde_json::{json, Map, Value};
use thiserror::Error;

/// Upstream signals the task queue is saturated.
pub const UPSTREAM_CODE_QUEUE_FULL: i64 = 421;
/// Upstream signals the account balance cannot cover the task.
pub const UPSTREAM_CODE_INSUFFICIENT_BALANCE: i64 = 433;

const RAW_BODY_LIMIT: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ApiErrorKind {
    ValidationError,
    ConfigurationError,
    ExternalApiError,
    RateLimited,
    PaymentRequired,
    ParseError,
    InternalError,
}

impl ApiErrorKind {
    pub fn http_status(self) -> u16 {
        match self {
            Self::ValidationError => 400,
            Self::ConfigurationError => 500,
            Self::ExternalApiError => 502,
            Self::RateLimited => 429,
            Self::PaymentRequired => 402,
            Self::ParseError => 502,
            Self::InternalError => 500,
        }
    }

    /// Top-level kind; the upstream sub-cases fold into `ExternalApiError`.
    pub fn family(self) -> Self {
        match self {
            Self::RateLimited | Self::PaymentRequired => Self::ExternalApiError,
            other => other,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::ExternalApiError | Self::RateLimited | Self::ParseError
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    pub kind: ApiErrorKind,
    pub message: String,
    pub http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorEnvelope {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            kind,
            message: message.into(),
            http_status: kind.http_status(),
            details,
        }
    }
}

/// Where an upstream call failed and how long it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallContext {
    pub endpoint: String,
    pub duration_ms: u64,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("upstream request to {} failed: {message}", .context.endpoint)]
    Upstream {
        context: CallContext,
        http_status: Option<u16>,
        code: Option<i64>,
        message: String,
    },
    #[error("upstream request to {} timed out", .context.endpoint)]
    Timeout { context: CallContext },
    #[error("upstream response from {} is not valid JSON: {message}", .context.endpoint)]
    Parse {
        context: CallContext,
        message: String,
        raw_body: String,
    },
    #[error("task {task_id} completed but no valid result")]
    NoValidResult { task_id: String, outputs: usize },
    #[error("{0}")]
    Internal(String),
}

impl TaskError {
    pub fn kind(&self) -> ApiErrorKind {
        match self {
            Self::Validation(_) => ApiErrorKind::ValidationError,
            Self::Configuration(_) => ApiErrorKind::ConfigurationError,
            Self::Upstream { code, message, .. } => classify_upstream_code(*code, message),
            Self::Timeout { .. } => ApiErrorKind::ExternalApiError,
            Self::Parse { .. } => ApiErrorKind::ParseError,
            Self::NoValidResult { .. } | Self::Internal(_) => ApiErrorKind::InternalError,
        }
    }

    pub fn to_envelope(&self) -> ErrorEnvelope {
        let kind = self.kind();
        let message = match kind {
            ApiErrorKind::RateLimited => {
                String::from("Upstream task queue is full; retry after a short delay")
            }
            ApiErrorKind::PaymentRequired => {
                String::from("Upstream account balance is insufficient; contact support")
            }
            _ => self.to_string(),
        };
        ErrorEnvelope::new(kind, message, self.details())
    }

    fn details(&self) -> Option<Value> {
        match self {
            Self::Validation(_) | Self::Configuration(_) | Self::Internal(_) => None,
            Self::Upstream {
                context,
                http_status,
                code,
                message,
            } => {
                let mut out = context_details(context);
                if let Some(status) = http_status {
                    out.insert(String::from("upstreamHttpStatus"), json!(status));
                }
                if let Some(code) = code {
                    out.insert(String::from("upstreamCode"), json!(code));
                }
                out.insert(String::from("upstreamMessage"), json!(message));
                Some(Value::Object(out))
            }
            Self::Timeout { context } => Some(Value::Object(context_details(context))),
            Self::Parse {
                context, raw_body, ..
            } => {
                let mut out = context_details(context);
                out.insert(
                    String::from("rawBody"),
                    json!(truncate_body(raw_body.as_str())),
                );
                Some(Value::Object(out))
            }
            Self::NoValidResult { task_id, outputs } => Some(json!({
                "taskId": task_id,
                "outputCount": outputs,
            })),
        }
    }
}

/// Maps an embedded upstream error code (and its message, for providers that
/// reuse generic codes) onto the error taxonomy.
pub fn classify_upstream_code(code: Option<i64>, message: &str) -> ApiErrorKind {
    match code {
        Some(UPSTREAM_CODE_QUEUE_FULL) => return ApiErrorKind::RateLimited,
        Some(UPSTREAM_CODE_INSUFFICIENT_BALANCE) => return ApiErrorKind::PaymentRequired,
        _ => {}
    }
    let upper = message.to_ascii_uppercase();
    if upper.contains("TASK_QUEUE_MAXED") {
        return ApiErrorKind::RateLimited;
    }
    if upper.contains("BALANCE") && upper.contains("INSUFFICIENT") {
        return ApiErrorKind::PaymentRequired;
    }
    ApiErrorKind::ExternalApiError
}

fn context_details(context: &CallContext) -> Map<String, Value> {
    let mut out = Map::new();
    out.insert(String::from("endpoint"), json!(context.endpoint));
    out.insert(String::from("durationMs"), json!(context.duration_ms));
    out
}

fn truncate_body(raw: &str) -> String {
    if raw.len() <= RAW_BODY_LIMIT {
        return raw.to_string();
    }
    let mut end = RAW_BODY_LIMIT;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &raw[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ctx(endpoint: &str) -> CallContext {
        CallContext {
            endpoint: endpoint.to_string(),
            duration_ms: 12,
        }
    }

    fn upstream(code: Option<i64>, message: &str) -> TaskError {
        TaskError::Upstream {
            context: ctx("/task/openapi/ai-app/run"),
            http_status: Some(200),
            code,
            message: message.to_string(),
        }
    }

    #[test]
    fn kinds_map_to_fixed_http_statuses() {
        assert_eq!(ApiErrorKind::ValidationError.http_status(), 400);
        assert_eq!(ApiErrorKind::ConfigurationError.http_status(), 500);
        assert_eq!(ApiErrorKind::ExternalApiError.http_status(), 502);
        assert_eq!(ApiErrorKind::ParseError.http_status(), 502);
        assert_eq!(ApiErrorKind::InternalError.http_status(), 500);
        assert_eq!(ApiErrorKind::RateLimited.http_status(), 429);
        assert_eq!(ApiErrorKind::PaymentRequired.http_status(), 402);
    }

    #[test]
    fn queue_full_code_becomes_rate_limited() {
        let envelope = upstream(Some(421), "TASK_QUEUE_MAXED").to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::RateLimited);
        assert_eq!(envelope.http_status, 429);
        assert_eq!(envelope.kind.family(), ApiErrorKind::ExternalApiError);
        assert!(envelope.kind.is_retryable());
    }

    #[test]
    fn insufficient_balance_code_becomes_payment_required() {
        let envelope = upstream(
            Some(433),
            "Your API balance is insufficient, please recharge",
        )
        .to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::PaymentRequired);
        assert_eq!(envelope.http_status, 402);
        assert_eq!(envelope.kind.family(), ApiErrorKind::ExternalApiError);
        assert!(!envelope.kind.is_retryable());
    }

    #[test]
    fn message_fallback_recognizes_special_conditions_under_generic_codes() {
        assert_eq!(
            classify_upstream_code(Some(1), "task_queue_maxed"),
            ApiErrorKind::RateLimited
        );
        assert_eq!(
            classify_upstream_code(None, "API balance is insufficient"),
            ApiErrorKind::PaymentRequired
        );
        assert_eq!(
            classify_upstream_code(Some(804), "APIKEY_TASK_IS_RUNNING"),
            ApiErrorKind::ExternalApiError
        );
    }

    #[test]
    fn upstream_envelope_details_carry_call_context() {
        let envelope = upstream(Some(1001), "bad webapp").to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::ExternalApiError);
        assert_eq!(
            envelope.details,
            Some(json!({
                "endpoint": "/task/openapi/ai-app/run",
                "durationMs": 12,
                "upstreamHttpStatus": 200,
                "upstreamCode": 1001,
                "upstreamMessage": "bad webapp",
            }))
        );
    }

    #[test]
    fn parse_errors_preserve_raw_body() {
        let envelope = TaskError::Parse {
            context: ctx("/task/openapi/status"),
            message: String::from("expected value at line 1 column 1"),
            raw_body: String::from("<html>bad gateway</html>"),
        }
        .to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::ParseError);
        assert_eq!(envelope.http_status, 502);
        assert_eq!(
            envelope.details.as_ref().and_then(|d| d.get("rawBody")),
            Some(&json!("<html>bad gateway</html>"))
        );
    }

    #[test]
    fn oversized_raw_bodies_are_truncated_on_char_boundary() {
        let raw = "é".repeat(RAW_BODY_LIMIT);
        let truncated = truncate_body(raw.as_str());
        assert!(truncated.len() <= RAW_BODY_LIMIT + '…'.len_utf8());
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn timeouts_are_external_api_errors() {
        let envelope = TaskError::Timeout {
            context: ctx("/task/openapi/outputs"),
        }
        .to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::ExternalApiError);
        assert_eq!(envelope.http_status, 502);
    }

    #[test]
    fn no_valid_result_is_internal_error() {
        let envelope = TaskError::NoValidResult {
            task_id: String::from("T9"),
            outputs: 2,
        }
        .to_envelope();
        assert_eq!(envelope.kind, ApiErrorKind::InternalError);
        assert_eq!(envelope.message, "task T9 completed but no valid result");
        assert!(!envelope.kind.is_retryable());
    }

    #[test]
    fn serializes_kind_and_status_in_camel_case() {
        let value = serde_json::to_value(ErrorEnvelope::new(
            ApiErrorKind::ValidationError,
            "Field 'imageUrl' is required",
            None,
        ))
        .expect("serialize");
        assert_eq!(
            value,
            json!({
                "kind": "ValidationError",
                "message": "Field 'imageUrl' is required",
                "httpStatus": 400,
            })
        );
    }
}
