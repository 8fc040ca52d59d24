//! Background tasks and waiting for them.
//!
//! Actions such as power-on, clone or restore often answer with a reference
//! to a task row. [`task_key`] pulls it out of an action response and
//! [`TaskManager::wait`] polls the row until it settles.

use std::ops::Deref;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;
use verge_api::constants::{POLL_INTERVAL, POLL_INTERVAL_FAST, TASK_WAIT_TIMEOUT};
use verge_api::{Backoff, Client, Endpoint, Error, ListParams, ResourceManager, Result, poll_until};

use crate::util::{as_u64, name_clause, object};

const TASKS: Endpoint = Endpoint::new("tasks")
    .fields(&[
        "$key",
        "name",
        "description",
        "enabled",
        "status",
        "action",
        "action_display",
        "table",
        "owner",
        "owner#$display as owner_display",
        "creator",
        "creator#$display as creator_display",
        "last_run",
        "delete_after_run",
        "id",
    ])
    .inline_actions();

verge_api::api_enum! {
    pub enum TaskStatus {
        Idle => ("idle", "Idle"),
        Running => ("running", "Running"),
        Error => ("error", "Error"),
    }
}

/// A scheduled or running task.
#[derive(Debug, Clone, Deserialize)]
pub struct Task {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub action_display: Option<String>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub owner: Option<Value>,
    #[serde(default)]
    pub owner_display: Option<String>,
    #[serde(default)]
    pub creator: Option<Value>,
    #[serde(default)]
    pub creator_display: Option<String>,
    #[serde(default)]
    pub last_run: Option<i64>,
    #[serde(default)]
    pub delete_after_run: Option<bool>,
    /// 40-character hex identifier.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(Task, u64);

impl Task {
    pub fn status(&self) -> Option<TaskStatus> {
        self.status.as_deref().and_then(TaskStatus::from_api_value)
    }

    /// Idle means finished.
    pub fn is_complete(&self) -> bool {
        self.status() == Some(TaskStatus::Idle)
    }

    pub fn is_running(&self) -> bool {
        self.status() == Some(TaskStatus::Running)
    }

    pub fn has_error(&self) -> bool {
        self.status() == Some(TaskStatus::Error)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    /// Percent complete, when reported.
    pub fn progress(&self) -> u64 {
        self.extra.get("progress").and_then(as_u64).unwrap_or(0)
    }

    pub fn owner_key(&self) -> Option<u64> {
        self.owner.as_ref().and_then(as_u64)
    }

    pub fn creator_key(&self) -> Option<u64> {
        self.creator.as_ref().and_then(as_u64)
    }

    fn error_message(&self) -> String {
        match self.extra.get("error") {
            Some(Value::String(message)) if !message.is_empty() => message.clone(),
            _ => "Task failed".to_owned(),
        }
    }
}

/// Task reference carried by an action response, if any.
pub fn task_key(response: Option<&Value>) -> Option<u64> {
    response?.get("task").and_then(as_u64)
}

/// Options of [`TaskManager::wait`].
#[derive(Debug, Clone, Copy)]
pub struct WaitOptions {
    timeout: Option<Duration>,
    backoff: Backoff,
    raise_on_error: bool,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout: Some(TASK_WAIT_TIMEOUT),
            backoff: Backoff::new(POLL_INTERVAL_FAST).max(POLL_INTERVAL),
            raise_on_error: true,
        }
    }
}

impl WaitOptions {
    /// Give up after `timeout`. Zero waits forever.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Return a failed task instead of raising [`Error::Task`].
    pub fn raise_on_error(mut self, raise: bool) -> Self {
        self.raise_on_error = raise;
        self
    }
}

/// Manager for `tasks`.
#[derive(Clone)]
pub struct TaskManager {
    inner: ResourceManager<Task>,
}

impl Deref for TaskManager {
    type Target = ResourceManager<Task>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TaskManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TASKS),
        }
    }

    pub async fn list_running(&self) -> Result<Vec<Task>> {
        self.list_by_status(TaskStatus::Running).await
    }

    pub async fn list_idle(&self) -> Result<Vec<Task>> {
        self.list_by_status(TaskStatus::Idle).await
    }

    pub async fn list_by_status(&self, status: TaskStatus) -> Result<Vec<Task>> {
        self.inner
            .list(&ListParams::new().term("status", status.api_value()))
            .await
    }

    pub async fn list_enabled(&self) -> Result<Vec<Task>> {
        self.inner.list(&ListParams::new().term("enabled", true)).await
    }

    pub async fn list_disabled(&self) -> Result<Vec<Task>> {
        self.inner.list(&ListParams::new().term("enabled", false)).await
    }

    /// Tasks by name; `*` and `?` switch to a substring match.
    pub async fn list_by_name(&self, name: &str) -> Result<Vec<Task>> {
        self.inner
            .list(&ListParams::new().filter(name_clause(name)))
            .await
    }

    /// Poll a task until it is idle or failed.
    ///
    /// A failed task is an [`Error::Task`] unless `raise_on_error` is off, in
    /// which case it is returned. Running past the timeout is an
    /// [`Error::TaskTimeout`].
    pub async fn wait(&self, key: u64, options: WaitOptions) -> Result<Task> {
        let limit = options.timeout.unwrap_or(Duration::MAX);
        let raise = options.raise_on_error;
        debug!(task = key, timeout = ?options.timeout, "waiting for task");

        poll_until(limit, options.backoff, || self.settled(key, raise))
            .await?
            .ok_or_else(|| Error::TaskTimeout {
                task_id: key.to_string(),
                timeout: limit,
            })
    }

    async fn settled(&self, key: u64, raise_on_error: bool) -> Result<Option<Task>> {
        let task = self.inner.get_by_key(&key).await?;
        if task.is_complete() {
            return Ok(Some(task));
        }
        if task.has_error() {
            if raise_on_error {
                return Err(Error::Task {
                    task_id: key.to_string(),
                    message: task.error_message(),
                });
            }
            return Ok(Some(task));
        }
        Ok(None)
    }

    pub async fn enable(&self, key: u64) -> Result<Task> {
        self.inner.update(&key, object(json!({ "enabled": true }))).await
    }

    pub async fn disable(&self, key: u64) -> Result<Task> {
        self.inner.update(&key, object(json!({ "enabled": false }))).await
    }

    /// Run a task now, regardless of its schedule.
    pub async fn execute(&self, key: u64, params: Map<String, Value>) -> Result<Task> {
        let body = object(json!({ "params": params }));
        self.inner.action(&key, "execute", body).await?;
        self.inner.get_by_key(&key).await
    }

    /// Ask a running task to stop.
    pub async fn cancel(&self, key: u64) -> Result<Task> {
        self.inner.action(&key, "cancel", Map::new()).await?;
        self.inner.get_by_key(&key).await
    }
}
