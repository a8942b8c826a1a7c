use crate::chart::TimeRange;
use crate::metrics::MetricKind;
use crate::source::MockConfig;
use clap::{Parser, ValueEnum};
use std::net::IpAddr;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum SourceMode {
    Mock,
    Live,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum UiMode {
    Console,
    Web,
    Both,
}

#[derive(Clone, Debug, Parser)]
#[command(
    name = "plastination_dashboard",
    about = "Control dashboard for the plastination camera, valve and sensors"
)]
pub struct Config {
    /// Where readings and commands go (mock/live)
    #[arg(long, value_enum, default_value_t = SourceMode::Mock)]
    pub source: SourceMode,

    /// Device backend base URL used in live mode
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    pub base_url: String,

    /// Data polling interval in milliseconds
    #[arg(long, default_value_t = 5000)]
    pub data_interval_ms: u64,

    /// Chart redraw interval in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub chart_interval_ms: u64,

    /// Metric kinds to poll (repeatable)
    #[arg(long = "track", value_enum, num_args = 1.., default_values_t = MetricKind::ALL.to_vec())]
    pub tracked: Vec<MetricKind>,

    /// History depth (number of bubble-rate samples kept in memory)
    #[arg(long, default_value_t = 1000)]
    pub history: usize,

    /// Initial chart time range
    #[arg(long, value_enum, default_value_t = TimeRange::FifteenMinutes)]
    pub range: TimeRange,

    /// Output mode (console/web/both)
    #[arg(long, value_enum, default_value_t = UiMode::Web)]
    pub ui: UiMode,

    /// Bind address for HTTP server
    #[arg(long, default_value = "127.0.0.1")]
    pub bind: IpAddr,

    /// HTTP server port
    #[arg(long, default_value_t = 8080)]
    pub port: u16,

    /// Preference database (theme); in-memory when omitted
    #[arg(long)]
    pub prefs: Option<PathBuf>,

    /// Lower clamp for the synthetic bubble rate
    #[arg(long, default_value_t = 60.0)]
    pub bpm_min: f64,

    /// Upper clamp for the synthetic bubble rate
    #[arg(long, default_value_t = 85.0)]
    pub bpm_max: f64,

    /// Largest per-tick change of the synthetic bubble rate
    #[arg(long, default_value_t = 1.5)]
    pub bpm_step: f64,

    /// Steps sent by the valve +/- buttons
    #[arg(long, default_value_t = 10)]
    pub step_size: i32,

    /// Steps that correspond to a fully open valve
    #[arg(long, default_value_t = 200)]
    pub full_travel_steps: i64,

    /// How long a command button stays disabled after a press
    #[arg(long, default_value_t = 500)]
    pub cooldown_ms: u64,

    /// Seed for the synthetic generator (random when omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Start in the light theme when no preference is saved
    #[arg(long, default_value_t = false)]
    pub prefer_light: bool,
}

impl Config {
    pub fn data_interval(&self) -> Duration {
        Duration::from_millis(self.data_interval_ms)
    }

    pub fn chart_interval(&self) -> Duration {
        Duration::from_millis(self.chart_interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn web_addr(&self) -> SocketAddr {
        SocketAddr::from((self.bind, self.port))
    }

    pub fn web_enabled(&self) -> bool {
        matches!(self.ui, UiMode::Web | UiMode::Both)
    }

    pub fn console_enabled(&self) -> bool {
        matches!(self.ui, UiMode::Console | UiMode::Both)
    }

    pub fn mock(&self) -> MockConfig {
        MockConfig {
            bpm_min: self.bpm_min,
            bpm_max: self.bpm_max,
            bpm_step: self.bpm_step,
            full_travel_steps: self.full_travel_steps,
            ..MockConfig::default()
        }
    }
}
