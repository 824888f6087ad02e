pub mod errors;
pub mod orchestrator;
pub mod provider;
pub mod status;
pub mod variants;

use std::sync::Arc;

use crate::config::ProviderSettings;
use crate::tasks::errors::TaskError;
use crate::tasks::orchestrator::TaskOrchestrator;
use crate::tasks::provider::RunningHubClient;

/// Orchestrator wired to the real provider client for the given settings.
pub fn default_task_orchestrator(settings: ProviderSettings) -> Result<TaskOrchestrator, TaskError> {
    let client = RunningHubClient::new(&settings.base_url, settings.timeout)?;
    Ok(TaskOrchestrator::new(Arc::new(client), settings))
}
