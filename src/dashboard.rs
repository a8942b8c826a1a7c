use crate::chart::{Bounds, ChartView, TimeRange, Viewport};
use crate::command::{Command, CommandDispatcher, DispatchMode, PressOutcome};
use crate::config::{Config, SourceMode};
use crate::controls::{help_text, FullscreenState, RecordingControl, Shortcut, UiEvent};
use crate::display::{FieldIds, FieldSnapshot, FieldStore, PresentationSink};
use crate::error::BuildError;
use crate::metrics::now_timestamp_ms;
use crate::poller::{PollingConfig, PollingLoop};
use crate::source::{Endpoints, LiveSource, MetricSource, MockSource};
use crate::storage::HistoryBuffer;
use crate::theme::{PreferenceStore, SqlitePreferences, Theme, ThemeManager};
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Injectable collaborators; `from_config` builds the real ones.
pub struct DashboardParts {
    pub history: Arc<HistoryBuffer>,
    pub source: Arc<dyn MetricSource>,
    pub fallback: Arc<dyn MetricSource>,
    pub dispatch: DispatchMode,
    pub prefs: Arc<dyn PreferenceStore>,
}

#[derive(Debug, PartialEq)]
pub enum EventOutcome {
    Unhandled,
    Handled,
    Command(PressOutcome),
}

#[derive(Clone, Debug, Serialize)]
pub struct ChartSummary {
    pub bounds: Bounds,
    pub samples: usize,
    pub last_value: f64,
}

#[derive(Clone, Debug, Serialize)]
pub struct DashboardView {
    pub source: &'static str,
    pub theme: Theme,
    pub range: TimeRange,
    pub recording: bool,
    pub fullscreen: bool,
    pub disabled_controls: Vec<String>,
    pub chart: Option<ChartSummary>,
    #[serde(flatten)]
    pub display: FieldSnapshot,
}

pub struct Dashboard {
    pub fields: Arc<FieldStore>,
    pub history: Arc<HistoryBuffer>,
    pub chart: Arc<ChartView>,
    pub polling: PollingLoop,
    pub commands: CommandDispatcher,
    pub theme: ThemeManager,
    pub recording: RecordingControl,
    pub fullscreen: FullscreenState,
    source_name: &'static str,
    step_size: i32,
}

impl Dashboard {
    pub fn from_config(config: &Config) -> Result<Self, BuildError> {
        let history = Arc::new(HistoryBuffer::new(config.history));
        let mock = Arc::new(match config.seed {
            Some(seed) => MockSource::with_seed(config.mock(), history.clone(), seed),
            None => MockSource::new(config.mock(), history.clone()),
        });
        let prefs: Arc<dyn PreferenceStore> = match &config.prefs {
            Some(path) => Arc::new(SqlitePreferences::open(path)?),
            None => Arc::new(SqlitePreferences::in_memory()?),
        };

        let parts = match config.source {
            SourceMode::Mock => {
                mock.seed_history(now_timestamp_ms());
                DashboardParts {
                    history,
                    source: mock.clone(),
                    fallback: mock,
                    dispatch: DispatchMode::Mock,
                    prefs,
                }
            }
            SourceMode::Live => {
                let client = LiveSource::default_client()?;
                let live = LiveSource::new(
                    client.clone(),
                    config.base_url.clone(),
                    Endpoints::default(),
                    history.clone(),
                );
                DashboardParts {
                    history,
                    source: Arc::new(live),
                    fallback: mock,
                    dispatch: DispatchMode::Live {
                        client,
                        base_url: format!("{}/api/stepper", config.base_url.trim_end_matches('/')),
                    },
                    prefs,
                }
            }
        };
        Ok(Self::assemble(config, parts))
    }

    pub fn assemble(config: &Config, parts: DashboardParts) -> Self {
        let fields = Arc::new(FieldStore::default());
        let sink: Arc<dyn PresentationSink> = fields.clone();
        let ids = FieldIds::default();

        let theme = ThemeManager::init(parts.prefs, sink.clone(), !config.prefer_light);
        let chart = Arc::new(ChartView::new(
            parts.history.clone(),
            sink.clone(),
            config.range,
            Viewport::default(),
            theme.current(),
        ));
        let source_name = parts.source.name();
        let polling = PollingLoop::new(
            PollingConfig {
                data_interval: config.data_interval(),
                chart_interval: config.chart_interval(),
                tracked: config.tracked.clone(),
                fields: ids.clone(),
                full_travel_steps: config.full_travel_steps,
            },
            parts.source,
            parts.fallback,
            sink.clone(),
            chart.clone(),
        );
        let commands = CommandDispatcher::new(
            parts.dispatch,
            sink.clone(),
            ids.valve_message.clone(),
            config.cooldown(),
        );
        info!("Dashboard assembled: source={}, theme={}", source_name, theme.current());

        Self {
            recording: RecordingControl::new(sink.clone()),
            fullscreen: FullscreenState::new(sink),
            fields,
            history: parts.history,
            chart,
            polling,
            commands,
            theme,
            source_name,
            step_size: config.step_size,
        }
    }

    /// Maps a valve control id to the command it sends.
    pub fn command_for(&self, control: &str) -> Option<Command> {
        let command = match control {
            "valve-enable" => Command::Enable,
            "valve-disable" => Command::Disable,
            "valve-open" => Command::Open,
            "valve-close" => Command::Close,
            "valve-abort" => Command::Abort,
            "valve-plus" => Command::Step(self.step_size),
            "valve-minus" => Command::Step(-self.step_size),
            _ => return None,
        };
        Some(command)
    }

    pub async fn handle_event(&self, event: UiEvent) -> EventOutcome {
        match event {
            UiEvent::KeyDown {
                key,
                ctrl,
                in_text_input,
            } => match Shortcut::from_key(key, ctrl, in_text_input) {
                Some(shortcut) => {
                    self.run_shortcut(shortcut);
                    EventOutcome::Handled
                }
                None => EventOutcome::Unhandled,
            },
            UiEvent::Click(control) => self.click(&control).await,
            UiEvent::RangeSelected(range) => {
                self.chart.select_range(range);
                EventOutcome::Handled
            }
            UiEvent::Resize(viewport) => {
                self.chart.resize(viewport);
                EventOutcome::Handled
            }
            UiEvent::FullscreenChanged(active) => {
                self.fullscreen.changed(active);
                EventOutcome::Handled
            }
        }
    }

    async fn click(&self, control: &str) -> EventOutcome {
        if let Some(command) = self.command_for(control) {
            return EventOutcome::Command(self.commands.press(control, command).await);
        }
        match control {
            "theme-toggle" => self.run_shortcut(Shortcut::ToggleTheme),
            "recording-control" => self.run_shortcut(Shortcut::ToggleRecording),
            "camera-fullscreen-btn" => self.run_shortcut(Shortcut::ToggleFullscreen),
            _ => return EventOutcome::Unhandled,
        }
        EventOutcome::Handled
    }

    fn run_shortcut(&self, shortcut: Shortcut) {
        match shortcut {
            Shortcut::ToggleTheme => {
                let theme = self.theme.toggle();
                self.chart.set_theme(theme);
            }
            Shortcut::ToggleFullscreen => {
                self.fullscreen.toggle();
            }
            Shortcut::ToggleRecording => {
                self.recording.toggle();
            }
            Shortcut::ShowHelp => self.fields.display_field("help", &help_text()),
        }
    }

    pub fn view(&self) -> DashboardView {
        DashboardView {
            source: self.source_name,
            theme: self.theme.current(),
            range: self.chart.active_range(),
            recording: self.recording.is_recording(),
            fullscreen: self.fullscreen.is_active(),
            disabled_controls: self.commands.disabled_controls(),
            chart: self.chart.latest_frame().map(|frame| ChartSummary {
                bounds: frame.bounds,
                samples: frame.samples,
                last_value: frame.last_value,
            }),
            display: self.fields.snapshot(),
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.source_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn mock_dashboard() -> Dashboard {
        let config = Config::parse_from(["plastination_dashboard", "--seed", "3"]);
        Dashboard::from_config(&config).unwrap()
    }

    #[tokio::test]
    async fn shortcut_keys_route_to_controls() {
        let dash = mock_dashboard();
        let original = dash.theme.current();

        let key = |key, ctrl| UiEvent::KeyDown {
            key,
            ctrl,
            in_text_input: false,
        };
        assert_eq!(dash.handle_event(key('t', false)).await, EventOutcome::Handled);
        assert_eq!(dash.theme.current(), original.toggled());

        dash.handle_event(key('r', true)).await;
        assert!(dash.recording.is_recording());

        dash.handle_event(key('f', false)).await;
        assert!(dash.fullscreen.is_active());

        dash.handle_event(key('?', false)).await;
        assert!(dash.fields.field("help").is_some());

        assert_eq!(dash.handle_event(key('x', false)).await, EventOutcome::Unhandled);
    }

    #[tokio::test]
    async fn typing_in_an_input_is_not_a_shortcut() {
        let dash = mock_dashboard();
        let theme = dash.theme.current();
        let outcome = dash
            .handle_event(UiEvent::KeyDown {
                key: 't',
                ctrl: false,
                in_text_input: true,
            })
            .await;
        assert_eq!(outcome, EventOutcome::Unhandled);
        assert_eq!(dash.theme.current(), theme);
    }

    #[tokio::test]
    async fn valve_buttons_map_to_signed_steps() {
        let dash = mock_dashboard();
        assert_eq!(dash.command_for("valve-minus"), Some(Command::Step(-10)));
        assert_eq!(dash.command_for("valve-plus"), Some(Command::Step(10)));
        assert_eq!(dash.command_for("theme-toggle"), None);

        let outcome = dash.handle_event(UiEvent::Click("valve-minus".into())).await;
        let EventOutcome::Command(PressOutcome::Sent(Ok(ack))) = outcome else {
            panic!("expected a dispatched command");
        };
        assert_eq!(ack.message, "[MOCK] Command sent: /step?steps=-10");
    }

    #[tokio::test]
    async fn mock_history_is_seeded_and_charted() {
        let dash = mock_dashboard();
        assert_eq!(dash.history.len(), 101);
        dash.polling.chart_tick();
        let view = dash.view();
        let chart = view.chart.expect("seeded history renders");
        assert!(chart.samples >= 2);
        assert_eq!(view.source, "mock");
    }

    #[tokio::test]
    async fn range_event_updates_view() {
        let dash = mock_dashboard();
        dash.handle_event(UiEvent::RangeSelected(TimeRange::OneDay)).await;
        assert_eq!(dash.view().range, TimeRange::OneDay);
    }
}
