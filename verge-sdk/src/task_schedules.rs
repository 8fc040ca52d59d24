//! Schedules that fire tasks through triggers.

use std::ops::Deref;

use serde::Deserialize;
use serde_json::{Map, Value, json};
use verge_api::{Client, Endpoint, ListParams, ResourceManager, Result};

use crate::task_schedule_triggers::TaskScheduleTriggerManager;
use crate::util::{as_u64, object, put_opt};

const TASK_SCHEDULES: Endpoint = Endpoint::new("task_schedules")
    .fields(&[
        "$key",
        "name",
        "description",
        "enabled",
        "task",
        "task#$display as task_display",
        "repeat_every",
        "repeat_iteration",
        "start_date",
        "start_date_epoch",
        "end_date",
        "start_time_of_day",
        "end_time_of_day",
        "all_day",
        "day_of_month",
        "monday",
        "tuesday",
        "wednesday",
        "thursday",
        "friday",
        "saturday",
        "sunday",
        "system_created",
        "creator",
        "creator#$display as creator_display",
    ])
    .inline_actions();

/// Upper bound the server accepts for [`TaskScheduleManager::get_schedule`].
const MAX_SCHEDULE_RESULTS: u32 = 1440;

verge_api::api_enum! {
    pub enum RepeatEvery {
        Minute => ("minute", "Minute(s)"),
        Hour => ("hour", "Hour(s)"),
        Day => ("day", "Day(s)"),
        Week => ("week", "Week(s)"),
        Month => ("month", "Month(s)"),
        Year => ("year", "Year(s)"),
        Never => ("never", "Does Not Repeat"),
    }
}

verge_api::api_enum! {
    /// Day a monthly schedule fires on.
    pub enum DayOfMonth {
        First => ("first", "First"),
        Last => ("last", "Last"),
        Fifteenth => ("15th", "15th"),
        StartDate => ("start_date", "Start Date"),
    }
}

const WEEKDAYS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

#[derive(Debug, Clone, Deserialize)]
pub struct TaskSchedule {
    #[serde(rename = "$key")]
    pub key: u64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub task: Option<Value>,
    #[serde(default)]
    pub task_display: Option<String>,
    #[serde(default)]
    pub repeat_every: Option<String>,
    #[serde(default)]
    pub repeat_iteration: Option<u32>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    /// Seconds from midnight.
    #[serde(default)]
    pub start_time_of_day: Option<u32>,
    #[serde(default)]
    pub end_time_of_day: Option<u32>,
    #[serde(default)]
    pub day_of_month: Option<String>,
    #[serde(default)]
    pub system_created: Option<bool>,
    /// Weekday flags and anything else the server sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

verge_api::impl_record!(TaskSchedule, u64);

impl TaskSchedule {
    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(false)
    }

    pub fn repeat_every(&self) -> Option<RepeatEvery> {
        self.repeat_every.as_deref().and_then(RepeatEvery::from_api_value)
    }

    pub fn day_of_month(&self) -> Option<DayOfMonth> {
        self.day_of_month.as_deref().and_then(DayOfMonth::from_api_value)
    }

    pub fn task_key(&self) -> Option<u64> {
        self.task.as_ref().and_then(as_u64)
    }

    pub fn is_system_created(&self) -> bool {
        self.system_created.unwrap_or(false)
    }

    /// `weekday` is a lower-case English day name.
    pub fn runs_on(&self, weekday: &str) -> bool {
        self.extra.get(weekday).and_then(Value::as_bool).unwrap_or(false)
    }

    /// Days the schedule fires on, Monday first.
    pub fn active_days(&self) -> Vec<&'static str> {
        WEEKDAYS.into_iter().filter(|day| self.runs_on(day)).collect()
    }
}

/// Arguments of [`TaskScheduleManager::create`].
#[derive(Debug, Clone)]
pub struct NewTaskSchedule {
    name: String,
    description: Option<String>,
    enabled: bool,
    repeat_every: RepeatEvery,
    repeat_iteration: u32,
    start_date: Option<String>,
    end_date: Option<String>,
    start_time_of_day: u32,
    end_time_of_day: u32,
    day_of_month: DayOfMonth,
    weekdays: [bool; 7],
    task: Option<u64>,
}

impl NewTaskSchedule {
    /// Hourly, all day, every day.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            enabled: true,
            repeat_every: RepeatEvery::Hour,
            repeat_iteration: 1,
            start_date: None,
            end_date: None,
            start_time_of_day: 0,
            end_time_of_day: 86_400,
            day_of_month: DayOfMonth::StartDate,
            weekdays: [true; 7],
            task: None,
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Fire every `iteration` units of `every`.
    pub fn repeat(mut self, every: RepeatEvery, iteration: u32) -> Self {
        self.repeat_every = every;
        self.repeat_iteration = iteration;
        self
    }

    /// `YYYY-MM-DD`.
    pub fn start_date(mut self, date: impl Into<String>) -> Self {
        self.start_date = Some(date.into());
        self
    }

    /// `YYYY-MM-DD HH:MM:SS`.
    pub fn end_date(mut self, date: impl Into<String>) -> Self {
        self.end_date = Some(date.into());
        self
    }

    /// Active window in seconds from midnight.
    pub fn time_of_day(mut self, start: u32, end: u32) -> Self {
        self.start_time_of_day = start;
        self.end_time_of_day = end;
        self
    }

    pub fn day_of_month(mut self, day: DayOfMonth) -> Self {
        self.day_of_month = day;
        self
    }

    /// Weekday flags, Monday first.
    pub fn weekdays(mut self, days: [bool; 7]) -> Self {
        self.weekdays = days;
        self
    }

    pub fn task(mut self, task: u64) -> Self {
        self.task = Some(task);
        self
    }

    fn into_body(self) -> Map<String, Value> {
        let mut body = object(json!({
            "name": self.name,
            "enabled": self.enabled,
            "repeat_every": self.repeat_every,
            "repeat_iteration": self.repeat_iteration,
            "start_time_of_day": self.start_time_of_day,
            "end_time_of_day": self.end_time_of_day,
            "day_of_month": self.day_of_month,
        }));
        for (day, on) in WEEKDAYS.into_iter().zip(self.weekdays) {
            body.insert(day.to_owned(), on.into());
        }
        put_opt(&mut body, "description", self.description);
        put_opt(&mut body, "start_date", self.start_date);
        put_opt(&mut body, "end_date", self.end_date);
        put_opt(&mut body, "task", self.task);
        body
    }
}

/// Manager for `task_schedules`.
#[derive(Clone)]
pub struct TaskScheduleManager {
    inner: ResourceManager<TaskSchedule>,
}

impl Deref for TaskScheduleManager {
    type Target = ResourceManager<TaskSchedule>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl TaskScheduleManager {
    pub fn new(client: &Client) -> Self {
        Self {
            inner: ResourceManager::new(client, TASK_SCHEDULES),
        }
    }

    pub async fn create(&self, schedule: NewTaskSchedule) -> Result<TaskSchedule> {
        self.inner.create(schedule.into_body()).await
    }

    pub async fn enable(&self, key: u64) -> Result<TaskSchedule> {
        self.inner.update(&key, object(json!({ "enabled": true }))).await
    }

    pub async fn disable(&self, key: u64) -> Result<TaskSchedule> {
        self.inner.update(&key, object(json!({ "enabled": false }))).await
    }

    pub async fn list_enabled(&self) -> Result<Vec<TaskSchedule>> {
        self.inner.list(&ListParams::new().term("enabled", true)).await
    }

    pub async fn list_disabled(&self) -> Result<Vec<TaskSchedule>> {
        self.inner.list(&ListParams::new().term("enabled", false)).await
    }

    /// Upcoming fire times. `max_results` is clamped to `1..=1440`.
    pub async fn get_schedule(
        &self,
        key: u64,
        max_results: u32,
        start_time: Option<i64>,
        end_time: Option<i64>,
    ) -> Result<Vec<Value>> {
        let mut params = object(json!({ "max": max_results.clamp(1, MAX_SCHEDULE_RESULTS) }));
        put_opt(&mut params, "start_time", start_time);
        put_opt(&mut params, "end_time", end_time);
        let response = self.inner.action(&key, "get_schedule", params).await?;
        Ok(schedule_times(response))
    }

    /// Triggers linking tasks to one schedule.
    pub fn triggers(&self, schedule: u64) -> TaskScheduleTriggerManager {
        TaskScheduleTriggerManager::new(self.client(), None, Some(schedule))
    }
}

fn schedule_times(response: Option<Value>) -> Vec<Value> {
    match response {
        Some(Value::Array(times)) => times,
        Some(Value::Object(mut map)) => {
            match map.remove("times").or_else(|| map.remove("schedule")) {
                Some(Value::Array(times)) => times,
                _ => vec![Value::Object(map)],
            }
        }
        _ => Vec::new(),
    }
}
