#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use serde_json::Value;
use tower::ServiceExt;

use taskrelay_backend_core::api::server::build_router_with_orchestrator;
use taskrelay_backend_core::config::ProviderSettings;
use taskrelay_backend_core::tasks::errors::TaskError;
use taskrelay_backend_core::tasks::orchestrator::TaskOrchestrator;
use taskrelay_backend_core::tasks::provider::{
    SubmitJobRequest, SubmittedJob, TaskOutput, TaskProvider, UploadFile, UploadedFile,
};
use taskrelay_backend_core::tasks::status::RawStatus;

#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    Upload {
        api_key: String,
        file_name: String,
        bytes: usize,
    },
    Submit {
        path: String,
        request: SubmitJobRequest,
    },
    Status(String),
    Outputs(String),
}

/// Scripted provider: pops queued results per operation and records every call.
#[derive(Default)]
pub struct ScriptedProvider {
    calls: Mutex<Vec<ProviderCall>>,
    uploads: Mutex<VecDeque<Result<UploadedFile, TaskError>>>,
    submissions: Mutex<VecDeque<Result<SubmittedJob, TaskError>>>,
    statuses: Mutex<VecDeque<Result<RawStatus, TaskError>>>,
    outputs: Mutex<VecDeque<Result<Vec<TaskOutput>, TaskError>>>,
}

impl ScriptedProvider {
    pub fn calls(&self) -> Vec<ProviderCall> {
        self.calls.lock().expect("calls mutex poisoned").clone()
    }

    pub fn queue_upload(&self, result: Result<UploadedFile, TaskError>) {
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .push_back(result);
    }

    pub fn queue_submission(&self, result: Result<SubmittedJob, TaskError>) {
        self.submissions
            .lock()
            .expect("submissions mutex poisoned")
            .push_back(result);
    }

    pub fn queue_status(&self, result: Result<RawStatus, TaskError>) {
        self.statuses
            .lock()
            .expect("statuses mutex poisoned")
            .push_back(result);
    }

    pub fn queue_outputs(&self, result: Result<Vec<TaskOutput>, TaskError>) {
        self.outputs
            .lock()
            .expect("outputs mutex poisoned")
            .push_back(result);
    }

    fn record(&self, call: ProviderCall) {
        self.calls.lock().expect("calls mutex poisoned").push(call);
    }
}

impl TaskProvider for ScriptedProvider {
    fn upload(&self, api_key: &str, file: &UploadFile) -> Result<UploadedFile, TaskError> {
        self.record(ProviderCall::Upload {
            api_key: api_key.to_string(),
            file_name: file.file_name.clone(),
            bytes: file.bytes.len(),
        });
        self.uploads
            .lock()
            .expect("uploads mutex poisoned")
            .pop_front()
            .expect("unexpected upload call")
    }

    fn submit(
        &self,
        submit_path: &str,
        request: &SubmitJobRequest,
    ) -> Result<SubmittedJob, TaskError> {
        self.record(ProviderCall::Submit {
            path: submit_path.to_string(),
            request: request.clone(),
        });
        self.submissions
            .lock()
            .expect("submissions mutex poisoned")
            .pop_front()
            .expect("unexpected submit call")
    }

    fn query_status(&self, _api_key: &str, task_id: &str) -> Result<RawStatus, TaskError> {
        self.record(ProviderCall::Status(task_id.to_string()));
        self.statuses
            .lock()
            .expect("statuses mutex poisoned")
            .pop_front()
            .expect("unexpected status call")
    }

    fn fetch_outputs(&self, _api_key: &str, task_id: &str) -> Result<Vec<TaskOutput>, TaskError> {
        self.record(ProviderCall::Outputs(task_id.to_string()));
        self.outputs
            .lock()
            .expect("outputs mutex poisoned")
            .pop_front()
            .expect("unexpected outputs call")
    }
}

pub fn configured_settings() -> ProviderSettings {
    ProviderSettings::new(Some(String::from("key-1")), Some(String::from("app-1")))
}

pub fn test_app(provider: Arc<ScriptedProvider>, settings: ProviderSettings) -> axum::Router {
    build_router_with_orchestrator(TaskOrchestrator::new(provider, settings))
}

pub async fn send_json(
    app: axum::Router,
    method: Method,
    uri: &str,
    body: Body,
    expected_status: StatusCode,
) -> Value {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .expect("request should build");
    send_request(app, request, expected_status).await
}

pub async fn send_request(
    app: axum::Router,
    request: Request<Body>,
    expected_status: StatusCode,
) -> Value {
    let response = app
        .oneshot(request)
        .await
        .expect("router should return response");
    assert_eq!(response.status(), expected_status);
    let body = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    serde_json::from_slice(body.as_ref()).expect("response should be valid JSON")
}

pub fn multipart_body(
    boundary: &str,
    field: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    out.extend_from_slice(
        format!(
            "Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n"
        )
        .as_bytes(),
    );
    out.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    out.extend_from_slice(bytes);
    out.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    out
}
