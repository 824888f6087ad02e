use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::blocking::{multipart, Client, RequestBuilder};
use reqwest::header::{CONTENT_TYPE, HOST};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::tasks::errors::{CallContext, TaskError};
use crate::tasks::status::RawStatus;

pub const UPLOAD_PATH: &str = "/task/openapi/upload";
pub const STATUS_PATH: &str = "/task/openapi/status";
pub const OUTPUTS_PATH: &str = "/task/openapi/outputs";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub bytes: Vec<u8>,
    pub file_name: String,
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
    pub node_id: String,
    pub field_name: String,
    pub field_value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Submission body, serialized exactly as the provider expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitJobRequest {
    pub webapp_id: String,
    pub api_key: String,
    pub node_info_list: Vec<NodeInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedJob {
    pub task_id: String,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub task_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOutput {
    pub file_url: String,
    #[serde(default)]
    pub file_type: Option<String>,
}

pub trait TaskProvider: Send + Sync + 'static {
    fn upload(&self, api_key: &str, file: &UploadFile) -> Result<UploadedFile, TaskError>;
    fn submit(
        &self,
        submit_path: &str,
        request: &SubmitJobRequest,
    ) -> Result<SubmittedJob, TaskError>;
    fn query_status(&self, api_key: &str, task_id: &str) -> Result<RawStatus, TaskError>;
    fn fetch_outputs(&self, api_key: &str, task_id: &str) -> Result<Vec<TaskOutput>, TaskError>;
}

pub type SharedTaskProvider = Arc<dyn TaskProvider>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TaskLookupBody<'a> {
    api_key: &'a str,
    task_id: &'a str,
}

#[derive(Debug, Deserialize)]
struct UpstreamEnvelope {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadData {
    file_name: String,
    #[serde(default)]
    file_type: Option<String>,
}

/// Blocking client for the RunningHub task API. Must be driven from a blocking
/// context (`spawn_blocking`), never directly on an async worker.
#[derive(Debug, Clone)]
pub struct RunningHubClient {
    base_url: String,
    host_header: String,
    timeout: Duration,
}

impl RunningHubClient {
    pub fn new(base_url: &Url, timeout: Duration) -> Result<Self, TaskError> {
        let host_header = host_header_for(base_url).ok_or_else(|| {
            TaskError::Configuration(format!("provider base URL '{base_url}' has no host"))
        })?;
        Ok(Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            host_header,
            timeout,
        })
    }

    pub fn host_header(&self) -> &str {
        self.host_header.as_str()
    }

    fn http_client(&self) -> Result<Client, TaskError> {
        Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| TaskError::Internal(format!("http client init failed: {e}")))
    }

    fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, TaskError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let client = self.http_client()?;
        let request = client
            .post(format!("{}{path}", self.base_url))
            .header(HOST, self.host_header.as_str())
            .header(CONTENT_TYPE, "application/json")
            .json(body);
        self.execute(path, request)
    }

    fn execute<T>(&self, path: &str, request: RequestBuilder) -> Result<T, TaskError>
    where
        T: DeserializeOwned,
    {
        let started = Instant::now();
        let result = send_and_read(request)
            .map_err(|error| transport_error(path, elapsed_ms(started), error))
            .and_then(|(status, body)| {
                decode_envelope(path, status, body.as_str(), elapsed_ms(started))
            });
        match &result {
            Ok(_) => debug!(
                endpoint = path,
                duration_ms = elapsed_ms(started),
                "upstream call succeeded"
            ),
            Err(error) => warn!(
                endpoint = path,
                duration_ms = elapsed_ms(started),
                error = %error,
                "upstream call failed"
            ),
        }
        result
    }
}

impl TaskProvider for RunningHubClient {
    fn upload(&self, api_key: &str, file: &UploadFile) -> Result<UploadedFile, TaskError> {
        let part = multipart::Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.content_type.as_str())
            .map_err(|e| {
                TaskError::Validation(format!(
                    "invalid content type '{}': {e}",
                    file.content_type
                ))
            })?;
        let form = multipart::Form::new()
            .text("apiKey", api_key.to_string())
            .text("fileType", String::from("image"))
            .part("file", part);

        let client = self.http_client()?;
        let request = client
            .post(format!("{}{UPLOAD_PATH}", self.base_url))
            .header(HOST, self.host_header.as_str())
            .multipart(form);
        let data: UploadData = self.execute(UPLOAD_PATH, request)?;
        Ok(UploadedFile {
            file_id: data.file_name,
            file_type: data.file_type,
        })
    }

    fn submit(
        &self,
        submit_path: &str,
        request: &SubmitJobRequest,
    ) -> Result<SubmittedJob, TaskError> {
        self.post_json(submit_path, request)
    }

    fn query_status(&self, api_key: &str, task_id: &str) -> Result<RawStatus, TaskError> {
        self.post_json(STATUS_PATH, &TaskLookupBody { api_key, task_id })
    }

    fn fetch_outputs(&self, api_key: &str, task_id: &str) -> Result<Vec<TaskOutput>, TaskError> {
        let outputs: Option<Vec<TaskOutput>> =
            self.post_json(OUTPUTS_PATH, &TaskLookupBody { api_key, task_id })?;
        Ok(outputs.unwrap_or_default())
    }
}

/// `Host` value for the provider: hostname plus port when it is not the
/// scheme default.
pub fn host_header_for(base_url: &Url) -> Option<String> {
    let host = base_url.host_str()?;
    Some(match base_url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn send_and_read(request: RequestBuilder) -> Result<(u16, String), reqwest::Error> {
    let response = request.send()?;
    let status = response.status().as_u16();
    let body = response.text()?;
    Ok((status, body))
}

fn transport_error(path: &str, duration_ms: u64, error: reqwest::Error) -> TaskError {
    let context = CallContext {
        endpoint: path.to_string(),
        duration_ms,
    };
    if error.is_timeout() {
        return TaskError::Timeout { context };
    }
    TaskError::Upstream {
        context,
        http_status: error.status().map(|s| s.as_u16()),
        code: None,
        message: format!("HTTP request failed: {error}"),
    }
}

/// Checks HTTP status, JSON validity and the embedded `code` before decoding
/// `data` into the expected shape.
pub(crate) fn decode_envelope<T>(
    path: &str,
    http_status: u16,
    body: &str,
    duration_ms: u64,
) -> Result<T, TaskError>
where
    T: DeserializeOwned,
{
    let context = CallContext {
        endpoint: path.to_string(),
        duration_ms,
    };
    let parsed = serde_json::from_str::<UpstreamEnvelope>(body);

    if !(200..300).contains(&http_status) {
        let (code, message) = match &parsed {
            Ok(envelope) => (
                envelope.code,
                envelope
                    .msg
                    .clone()
                    .unwrap_or_else(|| format!("HTTP {http_status}")),
            ),
            Err(_) => (None, format!("HTTP {http_status}: {}", snippet(body))),
        };
        return Err(TaskError::Upstream {
            context,
            http_status: Some(http_status),
            code,
            message,
        });
    }

    let envelope = parsed.map_err(|error| TaskError::Parse {
        context: context.clone(),
        message: error.to_string(),
        raw_body: body.to_string(),
    })?;

    match envelope.code {
        Some(0) => {}
        code => {
            return Err(TaskError::Upstream {
                context,
                http_status: Some(http_status),
                code,
                message: envelope
                    .msg
                    .unwrap_or_else(|| String::from("upstream response missing success code")),
            });
        }
    }

    serde_json::from_value(envelope.data.unwrap_or(Value::Null)).map_err(|error| {
        TaskError::Parse {
            context,
            message: format!("unexpected data shape: {error}"),
            raw_body: body.to_string(),
        }
    })
}

fn snippet(body: &str) -> &str {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(200) {
        Some((idx, _)) => &trimmed[..idx],
        None => trimmed,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
