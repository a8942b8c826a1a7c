use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// One timestamped scalar observation kept in the rolling history.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Epoch milliseconds.
    pub time: i64,
    pub value: f64,
}

impl Sample {
    pub fn new(time: i64, value: f64) -> Self {
        Self { time, value }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    BubbleRate,
    SystemStats,
    StepperStatus,
}

impl MetricKind {
    pub const ALL: [MetricKind; 3] = [
        MetricKind::BubbleRate,
        MetricKind::SystemStats,
        MetricKind::StepperStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::BubbleRate => "bubble_rate",
            MetricKind::SystemStats => "system_stats",
            MetricKind::StepperStatus => "stepper_status",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BubbleRate {
    pub bpm: Option<f64>,
    pub delta: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CpuStats {
    pub temp_c: Option<f64>,
    pub usage_percent: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryStats {
    /// GiB in use.
    pub used: Option<f64>,
    /// GiB installed.
    pub total: Option<f64>,
    pub percent: Option<f64>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceStates {
    pub camera: Option<String>,
    pub stepper: Option<String>,
    pub nginx: Option<String>,
    pub api: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemStats {
    pub cpu: Option<CpuStats>,
    pub memory: Option<MemoryStats>,
    pub uptime_seconds: Option<f64>,
    pub services: Option<ServiceStates>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepperStatus {
    pub enabled: Option<bool>,
    pub moving: Option<bool>,
    pub position_steps: Option<i64>,
    pub worker_alive: Option<bool>,
    pub last_error: Option<String>,
}

/// Transient snapshot returned by a metric source; projected into display
/// strings and then dropped.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Reading {
    BubbleRate(BubbleRate),
    SystemStats(SystemStats),
    StepperStatus(StepperStatus),
}

impl Reading {
    pub fn kind(&self) -> MetricKind {
        match self {
            Reading::BubbleRate(_) => MetricKind::BubbleRate,
            Reading::SystemStats(_) => MetricKind::SystemStats,
            Reading::StepperStatus(_) => MetricKind::StepperStatus,
        }
    }
}

pub fn now_timestamp_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Rounds to one decimal place, half away from zero.
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_fields_default_to_none() {
        let stats: SystemStats =
            serde_json::from_str(r#"{"cpu":{"temp_c":47.5},"extra":1}"#).unwrap();
        assert_eq!(stats.cpu.as_ref().and_then(|c| c.temp_c), Some(47.5));
        assert!(stats.cpu.unwrap().usage_percent.is_none());
        assert!(stats.memory.is_none());
        assert!(stats.services.is_none());
    }

    #[test]
    fn round1_keeps_one_decimal() {
        assert_eq!(round1(72.34), 72.3);
        assert_eq!(round1(-0.06), -0.1);
    }
}
