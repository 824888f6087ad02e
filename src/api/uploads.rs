use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use serde::Serialize;
use serde_json::Value;

use crate::api::server::AppState;
use crate::tasks::provider::{UploadFile, UploadedFile};

use super::handler_utils::{internal_error, map_task_error, validation_error};
use super::response::{into_json, ApiObject};

const FILE_FIELD: &str = "file";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    success: bool,
    #[serde(flatten)]
    file: UploadedFile,
}

pub async fn upload_handler(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiObject<Value> {
    let mut multipart = match multipart {
        Ok(multipart) => multipart,
        Err(rejection) => {
            return validation_error(format!(
                "Expected a multipart/form-data body: {}",
                rejection.body_text()
            ))
        }
    };

    let file = match read_file_field(&mut multipart).await {
        Ok(Some(file)) => file,
        Ok(None) => return validation_error(format!("Multipart field '{FILE_FIELD}' is required")),
        Err(message) => return validation_error(message),
    };

    let orchestrator = state.orchestrator.clone();
    let result = tokio::task::spawn_blocking(move || orchestrator.upload(&file)).await;

    match result {
        Ok(Ok(uploaded)) => (
            axum::http::StatusCode::OK,
            into_json(UploadResponse {
                success: true,
                file: uploaded,
            }),
        ),
        Ok(Err(error)) => map_task_error(error),
        Err(join_error) => internal_error(format!("file upload failed: {join_error}")),
    }
}

async fn read_file_field(multipart: &mut Multipart) -> Result<Option<UploadFile>, String> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Invalid multipart body: {}", e.body_text()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| content_type_for_name(file_name.as_str()).to_string());
        let bytes = field
            .bytes()
            .await
            .map_err(|e| format!("Failed to read uploaded file: {}", e.body_text()))?;
        return Ok(Some(UploadFile {
            bytes: bytes.to_vec(),
            file_name,
            content_type,
        }));
    }
    Ok(None)
}

fn content_type_for_name(file_name: &str) -> &'static str {
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        _ => "application/octet-stream",
    }
}
