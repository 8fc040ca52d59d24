//! Triggers: the links between tasks and schedules.

use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, ListParams, ResourceManager, Result};

use crate::util::{as_u64, object};

const TASK_SCHEDULE_TRIGGERS: Endpoint = Endpoint::new("task_schedule_triggers")
    .fields(&[
        "$key",
        "task",
        "display(task) as task_display",
        "schedule",
        "display(schedule) as schedule_display",
        "trigger",
        "flatten(schedule[$key as sch_$key,enabled as sch_enabled,\
         start_time_of_day as sch_start_time_of_day,repeat_iteration as sch_repeat_iteration,\
         end_date as sch_end_date,display(day_of_month) as sch_day_of_month,\
         display(repeat_every) as sch_repeat_every])",
    ])
    .inline_actions();

#[derive(Debug, Clone, Deserialize)]
pub struct TaskScheduleTrigger {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub task: Option<Value>,
    #[serde(default)]
    pub task_display: Option<String>,
    #[serde(default)]
    pub schedule: Option<Value>,
    #[serde(default)]
    pub schedule_display: Option<String>,
    #[serde(default)]
    pub sch_enabled: Option<bool>,
    #[serde(default)]
    pub sch_repeat_every: Option<String>,
    #[serde(default)]
    pub sch_start_time_of_day: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TaskScheduleTrigger, u64);

impl TaskScheduleTrigger {
    pub fn task_key(&self) -> Option<u64> {
        self.task.as_ref().and_then(as_u64)
    }

    pub fn schedule_key(&self) -> Option<u64> {
        self.schedule.as_ref().and_then(as_u64)
    }

    pub fn is_schedule_enabled(&self) -> bool {
        self.sch_enabled.unwrap_or(false)
    }
}

/// Manager for `task_schedule_triggers`, optionally limited to a task, a
/// schedule, or both.
#[derive(Clone)]
pub struct TaskScheduleTriggerManager {
    inner: ResourceManager<TaskScheduleTrigger>,
}

impl Deref for TaskScheduleTriggerManager {
    type Target = ResourceManager<TaskScheduleTrigger>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TaskScheduleTriggerManager {
    pub fn new(client: &Client, task: Option<u64>, schedule: Option<u64>) -> Self {
        let clauses: Vec<String> = [("task", task), ("schedule", schedule)]
            .into_iter()
            .filter_map(|(field, key)| key.map(|key| format!("{field} eq {key}")))
            .collect();
        let inner = if clauses.is_empty() {
            ResourceManager::new(client, TASK_SCHEDULE_TRIGGERS)
        } else {
            ResourceManager::scoped(client, TASK_SCHEDULE_TRIGGERS, clauses.join(" and "))
        };
        Self { inner }
    }

    pub async fn list_for_task(&self, task: u64) -> Result<Vec<TaskScheduleTrigger>> {
        self.inner.list(&ListParams::new().term("task", task)).await
    }

    pub async fn list_for_schedule(&self, schedule: u64) -> Result<Vec<TaskScheduleTrigger>> {
        self.inner
            .list(&ListParams::new().term("schedule", schedule))
            .await
    }

    /// Link `task` to `schedule`.
    pub async fn create(&self, task: u64, schedule: u64) -> Result<TaskScheduleTrigger> {
        let body = object(json!({ "task": task, "schedule": schedule }));
        let fallback = ListParams::new().term("task", task).term("schedule", schedule);
        self.inner.create_with_fallback(body, Some(fallback)).await
    }

    /// Fire the linked task now.
    pub async fn trigger(&self, key: u64) -> Result<Option<Value>> {
        self.inner.action(&key, "trigger", Map::new()).await
    }
}
