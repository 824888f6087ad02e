use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::server::AppState;
use crate::tasks::orchestrator::{JobSpec, StatusQuery};
use crate::tasks::variants::{self, InputSource, OutputKind, ToolVariant};

use super::handler_utils::{internal_error, json_rejection, map_task_error, validation_error};
use super::response::{success, ApiObject};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitTaskInput {
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusInput {
    #[serde(default)]
    pub task_id: Option<String>,
    #[serde(default)]
    pub tool_variant: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct VariantSummary {
    tool_variant: ToolVariant,
    required_fields: Vec<InputSource>,
    optional_fields: Vec<InputSource>,
    output: OutputKind,
}

pub async fn submit_task_handler(
    State(state): State<AppState>,
    Path(tool_variant): Path<String>,
    payload: Result<Json<SubmitTaskInput>, JsonRejection>,
) -> ApiObject<Value> {
    let tool_variant = match tool_variant.parse::<ToolVariant>() {
        Ok(variant) => variant,
        Err(error) => return validation_error(format!("Unknown tool variant '{}'", error.0)),
    };
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return json_rejection(rejection),
    };

    let orchestrator = state.orchestrator.clone();
    let job = JobSpec {
        tool_variant,
        image_url: payload.image_url,
        prompt: payload.prompt,
    };
    let result = tokio::task::spawn_blocking(move || orchestrator.submit(&job)).await;

    match result {
        Ok(Ok(handle)) => success(handle),
        Ok(Err(error)) => map_task_error(error),
        Err(join_error) => internal_error(format!("task submission failed: {join_error}")),
    }
}

pub async fn task_status_handler(
    State(state): State<AppState>,
    payload: Result<Json<TaskStatusInput>, JsonRejection>,
) -> ApiObject<Value> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return json_rejection(rejection),
    };
    let tool_variant = match payload
        .tool_variant
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse::<ToolVariant>)
        .transpose()
    {
        Ok(variant) => variant,
        Err(error) => return validation_error(format!("Unknown tool variant '{}'", error.0)),
    };

    let orchestrator = state.orchestrator.clone();
    let query = StatusQuery {
        task_id: payload.task_id.unwrap_or_default(),
        tool_variant,
    };
    let result = tokio::task::spawn_blocking(move || orchestrator.check_status(&query)).await;

    match result {
        Ok(Ok(report)) => success(report),
        Ok(Err(error)) => map_task_error(error),
        Err(join_error) => internal_error(format!("task status check failed: {join_error}")),
    }
}

pub async fn list_variants_handler() -> ApiObject<Value> {
    let summaries = variants::all()
        .iter()
        .map(|spec| VariantSummary {
            tool_variant: spec.variant,
            required_fields: spec.required_sources().collect(),
            optional_fields: spec.optional_sources().collect(),
            output: spec.output,
        })
        .collect::<Vec<_>>();
    success(summaries)
}
