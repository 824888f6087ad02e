use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::tasks::errors::ErrorEnvelope;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

pub type ApiObject<T> = (StatusCode, Json<T>);

pub fn success<T>(payload: T) -> ApiObject<Value>
where
    T: Serialize,
{
    (
        StatusCode::OK,
        into_json(ApiEnvelope {
            success: true,
            data: Some(payload),
            error: None,
        }),
    )
}

pub fn failure(envelope: ErrorEnvelope) -> ApiObject<Value> {
    let status = StatusCode::from_u16(envelope.http_status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        into_json(ApiEnvelope::<Value> {
            success: false,
            data: None,
            error: Some(envelope),
        }),
    )
}

pub fn into_json(payload: impl Serialize) -> Json<Value> {
    Json(serde_json::to_value(payload).expect("api payload should serialize"))
}
