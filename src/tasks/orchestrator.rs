use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ProviderSettings;
use crate::tasks::errors::TaskError;
use crate::tasks::provider::{
    NodeInfo, SharedTaskProvider, SubmitJobRequest, TaskOutput, UploadFile, UploadedFile,
};
use crate::tasks::status::{normalize, TaskStatus};
use crate::tasks::variants::{InputSource, OutputKind, ToolVariant, VariantSpec};

pub const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSpec {
    pub tool_variant: ToolVariant,
    pub image_url: Option<String>,
    pub prompt: Option<String>,
}

impl JobSpec {
    fn input(&self, source: InputSource) -> Option<&str> {
        let value = match source {
            InputSource::ImageUrl => self.image_url.as_deref(),
            InputSource::Prompt => self.prompt.as_deref(),
        };
        value.map(str::trim).filter(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskHandle {
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub task_status: String,
    pub tool_variant: ToolVariant,
    pub submitted_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub task_id: String,
    /// Selects the accepted output types; images when absent.
    pub tool_variant: Option<ToolVariant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultArtifact {
    pub task_id: String,
    pub result_url: String,
    pub file_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub task_id: String,
    pub status: TaskStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

impl StatusReport {
    pub fn artifact(&self) -> Option<ResultArtifact> {
        Some(ResultArtifact {
            task_id: self.task_id.clone(),
            result_url: self.result_url.clone()?,
            file_type: self.file_type.clone()?,
        })
    }
}

/// Stateless coordinator over a task provider. Every call is one independent
/// round trip; polling cadence and retries belong to the caller.
#[derive(Clone)]
pub struct TaskOrchestrator {
    provider: SharedTaskProvider,
    settings: Arc<ProviderSettings>,
}

impl TaskOrchestrator {
    pub fn new(provider: SharedTaskProvider, settings: ProviderSettings) -> Self {
        Self {
            provider,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &ProviderSettings {
        self.settings.as_ref()
    }

    pub fn upload(&self, file: &UploadFile) -> Result<UploadedFile, TaskError> {
        validate_upload(file)?;
        let api_key = self.settings.api_key()?;
        let uploaded = self.provider.upload(api_key, file)?;
        info!(
            file_id = %uploaded.file_id,
            bytes = file.bytes.len(),
            "uploaded file to task provider"
        );
        Ok(uploaded)
    }

    pub fn submit(&self, job: &JobSpec) -> Result<TaskHandle, TaskError> {
        let spec = job.tool_variant.spec();
        let node_info_list = build_node_info_list(spec, job)?;
        let api_key = self.settings.api_key()?;
        let webapp_id = self.settings.webapp_id_for(job.tool_variant)?;

        let submitted = self.provider.submit(
            spec.submit_path,
            &SubmitJobRequest {
                webapp_id: webapp_id.to_string(),
                api_key: api_key.to_string(),
                node_info_list,
            },
        )?;
        if submitted.task_id.trim().is_empty() {
            return Err(TaskError::Internal(String::from(
                "task provider accepted the job but returned no task id",
            )));
        }

        info!(
            task_id = %submitted.task_id,
            tool_variant = %job.tool_variant,
            "submitted task"
        );
        Ok(TaskHandle {
            task_id: submitted.task_id,
            client_id: submitted.client_id.filter(|v| !v.trim().is_empty()),
            task_status: submitted
                .task_status
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| String::from("PENDING")),
            tool_variant: job.tool_variant,
            submitted_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub fn check_status(&self, query: &StatusQuery) -> Result<StatusReport, TaskError> {
        let task_id = query.task_id.trim();
        if task_id.is_empty() {
            return Err(TaskError::Validation(String::from(
                "Field 'taskId' is required",
            )));
        }
        let api_key = self.settings.api_key()?;

        let raw = self.provider.query_status(api_key, task_id)?;
        let normalized = normalize(&raw);
        debug!(
            task_id,
            status = %normalized.status,
            progress = normalized.progress,
            "normalized task status"
        );

        if normalized.status != TaskStatus::Completed {
            return Ok(StatusReport {
                task_id: task_id.to_string(),
                status: normalized.status,
                progress: normalized.progress,
                result_url: None,
                file_type: None,
            });
        }

        let output_kind = query
            .tool_variant
            .map(|variant| variant.spec().output)
            .unwrap_or(OutputKind::Image);
        let outputs = self.provider.fetch_outputs(api_key, task_id)?;
        let artifact = select_result(task_id, &outputs, output_kind)?;
        info!(
            task_id,
            result_url = %artifact.result_url,
            "task completed"
        );
        Ok(StatusReport {
            task_id: artifact.task_id,
            status: TaskStatus::Completed,
            progress: normalized.progress,
            result_url: Some(artifact.result_url),
            file_type: Some(artifact.file_type),
        })
    }
}

/// Builds the provider parameter list in registry order. Required bindings
/// must have a non-blank input; optional ones are skipped when blank.
pub fn build_node_info_list(spec: &VariantSpec, job: &JobSpec) -> Result<Vec<NodeInfo>, TaskError> {
    let mut out = Vec::with_capacity(spec.bindings.len());
    for binding in spec.bindings {
        match job.input(binding.source) {
            Some(value) => out.push(NodeInfo {
                node_id: binding.node_id.to_string(),
                field_name: binding.field_name.to_string(),
                field_value: value.to_string(),
                description: binding.description.map(str::to_string),
            }),
            None if binding.required => {
                return Err(TaskError::Validation(format!(
                    "Field '{}' is required for tool '{}'",
                    binding.source.field_name(),
                    spec.variant
                )));
            }
            None => {}
        }
    }
    Ok(out)
}

/// First output whose file type matches `kind`; outputs without a file type
/// are accepted as-is.
pub fn select_result(
    task_id: &str,
    outputs: &[TaskOutput],
    kind: OutputKind,
) -> Result<ResultArtifact, TaskError> {
    outputs
        .iter()
        .filter(|output| !output.file_url.trim().is_empty())
        .find(|output| accepts_file_type(output.file_type.as_deref(), kind))
        .map(|output| ResultArtifact {
            task_id: task_id.to_string(),
            result_url: output.file_url.clone(),
            file_type: output
                .file_type
                .clone()
                .or_else(|| extension_of(output.file_url.as_str()))
                .unwrap_or_else(|| String::from("unknown")),
        })
        .ok_or_else(|| TaskError::NoValidResult {
            task_id: task_id.to_string(),
            outputs: outputs.len(),
        })
}

fn accepts_file_type(file_type: Option<&str>, kind: OutputKind) -> bool {
    let Some(file_type) = file_type else {
        return true;
    };
    let lowered = file_type.to_ascii_lowercase();
    kind.accepted_file_types()
        .iter()
        .any(|accepted| lowered.contains(accepted))
}

fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next()?;
    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    (!ext.is_empty()).then(|| ext.to_ascii_lowercase())
}

fn validate_upload(file: &UploadFile) -> Result<(), TaskError> {
    if file.bytes.is_empty() {
        return Err(TaskError::Validation(String::from(
            "Uploaded file is empty",
        )));
    }
    if file.bytes.len() > MAX_UPLOAD_BYTES {
        return Err(TaskError::Validation(format!(
            "Uploaded file exceeds {} MiB",
            MAX_UPLOAD_BYTES / (1024 * 1024)
        )));
    }
    if file.file_name.trim().is_empty() {
        return Err(TaskError::Validation(String::from(
            "Uploaded file must have a file name",
        )));
    }
    if !file
        .content_type
        .trim()
        .to_ascii_lowercase()
        .starts_with("image/")
    {
        return Err(TaskError::Validation(format!(
            "Unsupported upload content type '{}'; expected an image",
            file.content_type
        )));
    }
    Ok(())
}
