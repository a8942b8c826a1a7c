use crate::metrics::{BubbleRate, Reading, StepperStatus, SystemStats};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Where projected readings end up. The core never touches a document
/// directly; a surface implements this.
pub trait PresentationSink: Send + Sync + 'static {
    fn display_field(&self, id: &str, value: &str);

    fn display_class(&self, _id: &str, _class: &str) {}
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FieldSnapshot {
    pub fields: BTreeMap<String, String>,
    pub classes: BTreeMap<String, String>,
}

/// In-memory sink shared by the terminal and web surfaces.
#[derive(Default)]
pub struct FieldStore {
    inner: RwLock<FieldSnapshot>,
}

impl FieldStore {
    pub fn field(&self, id: &str) -> Option<String> {
        self.read().fields.get(id).cloned()
    }

    pub fn class(&self, id: &str) -> Option<String> {
        self.read().classes.get(id).cloned()
    }

    pub fn snapshot(&self) -> FieldSnapshot {
        self.read().clone()
    }

    fn read(&self) -> RwLockReadGuard<'_, FieldSnapshot> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, FieldSnapshot> {
        match self.inner.write() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl PresentationSink for FieldStore {
    fn display_field(&self, id: &str, value: &str) {
        self.write().fields.insert(id.to_string(), value.to_string());
    }

    fn display_class(&self, id: &str, class: &str) {
        self.write().classes.insert(id.to_string(), class.to_string());
    }
}

/// Element ids the projections write to.
#[derive(Clone, Debug)]
pub struct FieldIds {
    pub bubble_rate_value: String,
    pub bubble_rate_delta: String,
    pub cpu_temp: String,
    pub cpu_usage: String,
    pub memory_usage: String,
    pub uptime: String,
    pub camera_service: String,
    pub stepper_service: String,
    pub valve_status: String,
    pub valve_position: String,
    pub valve_position_fill: String,
    pub valve_message: String,
}

impl Default for FieldIds {
    fn default() -> Self {
        Self {
            bubble_rate_value: "bubble-rate-value".into(),
            bubble_rate_delta: "bubble-rate-delta".into(),
            cpu_temp: "cpu-temp".into(),
            cpu_usage: "cpu-usage".into(),
            memory_usage: "memory-usage".into(),
            uptime: "uptime".into(),
            camera_service: "camera-service".into(),
            stepper_service: "stepper-service".into(),
            valve_status: "valve-status-text".into(),
            valve_position: "valve-position".into(),
            valve_position_fill: "valve-position-fill".into(),
            valve_message: "valve-message".into(),
        }
    }
}

/// Writes one reading into the sink. Absent optional fields leave their
/// element untouched.
pub fn project(
    reading: &Reading,
    ids: &FieldIds,
    full_travel_steps: i64,
    sink: &dyn PresentationSink,
) {
    match reading {
        Reading::BubbleRate(rate) => project_bubble_rate(rate, ids, sink),
        Reading::SystemStats(stats) => project_system_stats(stats, ids, sink),
        Reading::StepperStatus(status) => {
            project_stepper_status(status, ids, full_travel_steps, sink)
        }
    }
}

fn project_bubble_rate(rate: &BubbleRate, ids: &FieldIds, sink: &dyn PresentationSink) {
    sink.display_field(&ids.bubble_rate_value, &rate.bpm.unwrap_or(0.0).to_string());

    let delta = rate.delta.unwrap_or(0.0);
    let (arrow, sign) = if delta >= 0.0 { ("▲", "+") } else { ("▼", "") };
    sink.display_field(
        &ids.bubble_rate_delta,
        &format!("{arrow} {sign}{delta:.1} vs 5min avg"),
    );
    let trend = if delta > 0.0 {
        "up"
    } else if delta < 0.0 {
        "down"
    } else {
        "neutral"
    };
    sink.display_class(&ids.bubble_rate_delta, &format!("metric-delta {trend}"));
}

fn project_system_stats(stats: &SystemStats, ids: &FieldIds, sink: &dyn PresentationSink) {
    if let Some(cpu) = &stats.cpu {
        if let Some(temp) = cpu.temp_c {
            sink.display_field(&ids.cpu_temp, &format!("{temp:.1}"));
        }
        if let Some(usage) = cpu.usage_percent {
            sink.display_field(&ids.cpu_usage, &format!("{usage:.1}"));
        }
    }
    if let Some(mem) = &stats.memory {
        let used = mem.used.unwrap_or(0.0);
        let total = mem.total.map(|t| t.to_string()).unwrap_or_else(|| "?".into());
        sink.display_field(&ids.memory_usage, &format!("{used:.1} / {total}"));
    }
    if let Some(uptime) = stats.uptime_seconds.filter(|s| *s > 0.0) {
        sink.display_field(&ids.uptime, &format_uptime(uptime as u64));
    }
    if let Some(services) = &stats.services {
        if let Some(camera) = services.camera.as_deref().filter(|s| !s.is_empty()) {
            sink.display_field(&ids.camera_service, &capitalize(camera));
        }
        if let Some(stepper) = services.stepper.as_deref().filter(|s| !s.is_empty()) {
            sink.display_field(&ids.stepper_service, &capitalize(stepper));
        }
    }
}

fn project_stepper_status(
    status: &StepperStatus,
    ids: &FieldIds,
    full_travel_steps: i64,
    sink: &dyn PresentationSink,
) {
    let enabled = if status.enabled.unwrap_or(false) {
        "Enabled"
    } else {
        "Disabled"
    };
    let moving = if status.moving.unwrap_or(false) {
        ", Moving"
    } else {
        ""
    };
    sink.display_field(&ids.valve_status, &format!("{enabled}{moving}"));

    if let Some(steps) = status.position_steps {
        let percent = position_percent(steps, full_travel_steps);
        sink.display_field(&ids.valve_position, &percent.to_string());
        sink.display_field(&ids.valve_position_fill, &format!("{percent}%"));
    }
}

pub fn position_percent(steps: i64, full_travel_steps: i64) -> i64 {
    let travel = full_travel_steps.max(1) as f64;
    (steps as f64 / travel * 100.0).round() as i64
}

pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

pub fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{CpuStats, ServiceStates};

    #[test]
    fn bubble_rate_delta_text_and_class() {
        let store = FieldStore::default();
        let ids = FieldIds::default();
        let rate = BubbleRate {
            bpm: Some(72.3),
            delta: Some(-0.8),
        };
        project(&Reading::BubbleRate(rate), &ids, 200, &store);
        assert_eq!(store.field("bubble-rate-value").as_deref(), Some("72.3"));
        assert_eq!(
            store.field("bubble-rate-delta").as_deref(),
            Some("▼ -0.8 vs 5min avg")
        );
        assert_eq!(
            store.class("bubble-rate-delta").as_deref(),
            Some("metric-delta down")
        );
    }

    #[test]
    fn empty_bubble_rate_renders_zero() {
        let store = FieldStore::default();
        project(
            &Reading::BubbleRate(BubbleRate::default()),
            &FieldIds::default(),
            200,
            &store,
        );
        assert_eq!(store.field("bubble-rate-value").as_deref(), Some("0"));
        assert_eq!(
            store.field("bubble-rate-delta").as_deref(),
            Some("▲ +0.0 vs 5min avg")
        );
        assert_eq!(
            store.class("bubble-rate-delta").as_deref(),
            Some("metric-delta neutral")
        );
    }

    #[test]
    fn partial_stats_only_touch_present_fields() {
        let store = FieldStore::default();
        store.display_field("uptime", "previous");
        let stats = SystemStats {
            cpu: Some(CpuStats {
                temp_c: Some(47.26),
                usage_percent: None,
            }),
            services: Some(ServiceStates {
                camera: Some("active".into()),
                ..ServiceStates::default()
            }),
            ..SystemStats::default()
        };
        project(&Reading::SystemStats(stats), &FieldIds::default(), 200, &store);
        assert_eq!(store.field("cpu-temp").as_deref(), Some("47.3"));
        assert!(store.field("cpu-usage").is_none());
        assert_eq!(store.field("uptime").as_deref(), Some("previous"));
        assert_eq!(store.field("camera-service").as_deref(), Some("Active"));
        assert!(store.field("stepper-service").is_none());
    }

    #[test]
    fn stepper_position_as_percent() {
        let store = FieldStore::default();
        let status = StepperStatus {
            enabled: Some(true),
            moving: Some(true),
            position_steps: Some(150),
            ..StepperStatus::default()
        };
        project(&Reading::StepperStatus(status), &FieldIds::default(), 200, &store);
        assert_eq!(store.field("valve-status-text").as_deref(), Some("Enabled, Moving"));
        assert_eq!(store.field("valve-position").as_deref(), Some("75"));
        assert_eq!(store.field("valve-position-fill").as_deref(), Some("75%"));
    }

    #[test]
    fn uptime_formats() {
        assert_eq!(format_uptime(478_932), "5d 13h");
        assert_eq!(format_uptime(3 * 3600 + 12 * 60), "3h 12m");
        assert_eq!(format_uptime(420), "7m");
    }
}
