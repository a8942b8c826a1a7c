use crate::chart::TimeRange;
use crate::controls::UiEvent;
use crate::dashboard::{Dashboard, DashboardView};
use crate::metrics::{now_timestamp_ms, Sample};
use crossterm::cursor::MoveTo;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::style::{Color, Stylize};
use crossterm::terminal::{self, Clear, ClearType};
use crossterm::ExecutableCommand;
use std::io::{stdout, Write};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::error;

const SPARK_WIDTH: usize = 60;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

#[derive(Debug, PartialEq)]
enum ConsoleInput {
    Event(UiEvent),
    Quit,
}

pub async fn run_console(dashboard: Arc<Dashboard>, interval: Duration, cancel: CancellationToken) {
    let raw = match terminal::enable_raw_mode() {
        Ok(()) => true,
        Err(e) => {
            error!("Console input unavailable: {}", e);
            false
        }
    };

    let (tx, mut rx) = mpsc::channel(32);
    let reader = if raw {
        let reader_cancel = cancel.clone();
        Some(tokio::task::spawn_blocking(move || {
            read_keys(tx, reader_cancel)
        }))
    } else {
        None
    };

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            Some(input) = rx.recv() => {
                match input {
                    ConsoleInput::Quit => cancel.cancel(),
                    ConsoleInput::Event(event) => {
                        dashboard.handle_event(event).await;
                        if let Err(e) = render_once(&dashboard) {
                            error!("Console render error: {}", e);
                        }
                    }
                }
            }
            _ = ticker.tick() => {
                if let Err(e) = render_once(&dashboard) {
                    error!("Console render error: {}", e);
                }
            }
        }
    }

    if let Some(reader) = reader {
        if let Ok(Err(e)) = reader.await {
            error!("Console input error: {}", e);
        }
    }
    if raw {
        let _ = terminal::disable_raw_mode();
    }
}

fn read_keys(tx: mpsc::Sender<ConsoleInput>, cancel: CancellationToken) -> std::io::Result<()> {
    while !cancel.is_cancelled() {
        if !event::poll(Duration::from_millis(100))? {
            continue;
        }
        if let Event::Key(key) = event::read()? {
            if let Some(input) = map_key(key) {
                if tx.blocking_send(input).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}

fn map_key(key: KeyEvent) -> Option<ConsoleInput> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    let KeyCode::Char(c) = key.code else {
        return None;
    };
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    let input = match (c, ctrl) {
        ('q', false) | ('c', true) => ConsoleInput::Quit,
        ('1'..='4', false) => {
            let index = c as usize - '1' as usize;
            ConsoleInput::Event(UiEvent::RangeSelected(TimeRange::ALL[index]))
        }
        _ => ConsoleInput::Event(UiEvent::KeyDown {
            key: c,
            ctrl,
            in_text_input: false,
        }),
    };
    Some(input)
}

fn render_once(dashboard: &Dashboard) -> std::io::Result<()> {
    let view = dashboard.view();
    let visible = dashboard
        .history
        .filter(view.range.cutoff(now_timestamp_ms()));
    let lines = render_lines(&view, &sparkline(&visible, SPARK_WIDTH));

    let mut out = stdout();
    out.execute(MoveTo(0, 0))?;
    out.execute(Clear(ClearType::All))?;
    for line in lines {
        // Raw mode needs explicit carriage returns.
        write!(out, "{line}\r\n")?;
    }
    out.flush()?;
    Ok(())
}

fn render_lines(view: &DashboardView, spark: &str) -> Vec<String> {
    let field = |id: &str| {
        view.display
            .fields
            .get(id)
            .cloned()
            .unwrap_or_else(|| "--".to_string())
    };

    let mut lines = vec![
        format!(
            "Plastination dashboard ({} data, {} theme)",
            view.source, view.theme
        ),
        "t theme | f fullscreen | Ctrl+r record | 1-4 range | ? help | q quit".to_string(),
        String::new(),
    ];

    let delta = field("bubble-rate-delta");
    let delta = match view.display.classes.get("bubble-rate-delta").map(String::as_str) {
        Some("metric-delta up") => delta.with(Color::Green).to_string(),
        Some("metric-delta down") => delta.with(Color::Red).to_string(),
        _ => delta,
    };
    lines.push(format!(
        "Bubble rate: {} bpm   {}",
        field("bubble-rate-value"),
        delta
    ));
    lines.push(format!(
        "CPU: {} °C, {}%   Memory: {} GB   Uptime: {}",
        field("cpu-temp"),
        field("cpu-usage"),
        field("memory-usage"),
        field("uptime")
    ));
    lines.push(format!(
        "Services: camera {}, stepper {}",
        field("camera-service"),
        field("stepper-service")
    ));
    lines.push(format!(
        "Valve: {}   position {}%",
        field("valve-status-text"),
        field("valve-position")
    ));
    lines.push(format!(
        "Recording: {}   Fullscreen: {}",
        if view.recording { "on" } else { "off" },
        if view.fullscreen { "on" } else { "off" }
    ));
    if let Some(msg) = view.display.fields.get("valve-message") {
        lines.push(format!("Last command: {msg}"));
    }

    lines.push(String::new());
    match &view.chart {
        Some(chart) => {
            lines.push(format!(
                "Bubble rate, last {} ({} samples, axis {:.0}..{:.0})",
                view.range, chart.samples, chart.bounds.min, chart.bounds.max
            ));
            lines.push(spark.with(Color::Blue).to_string());
        }
        None => lines.push(format!("Bubble rate, last {}: waiting for data...", view.range)),
    }

    if let Some(help) = view.display.fields.get("help") {
        lines.push(String::new());
        lines.extend(help.lines().map(str::to_string));
    }
    lines
}

/// Last `width` samples as block characters scaled between their min and max.
fn sparkline(samples: &[Sample], width: usize) -> String {
    let tail = &samples[samples.len().saturating_sub(width)..];
    let (min, max) = tail.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), s| {
        (lo.min(s.value), hi.max(s.value))
    });
    let span = max - min;
    tail.iter()
        .map(|s| {
            let level = if span > 0.0 {
                ((s.value - min) / span * (SPARK_LEVELS.len() - 1) as f64).round() as usize
            } else {
                0
            };
            SPARK_LEVELS[level.min(SPARK_LEVELS.len() - 1)]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::Bounds;
    use crate::dashboard::ChartSummary;
    use crate::display::FieldSnapshot;
    use crate::theme::Theme;

    fn view() -> DashboardView {
        let mut display = FieldSnapshot::default();
        display
            .fields
            .insert("bubble-rate-value".into(), "72.3".into());
        DashboardView {
            source: "mock",
            theme: Theme::Dark,
            range: TimeRange::OneHour,
            recording: true,
            fullscreen: false,
            disabled_controls: vec![],
            chart: None,
            display,
        }
    }

    #[test]
    fn keys_map_to_events() {
        let press = |code, modifiers| KeyEvent::new(code, modifiers);
        assert_eq!(
            map_key(press(KeyCode::Char('q'), KeyModifiers::NONE)),
            Some(ConsoleInput::Quit)
        );
        assert_eq!(
            map_key(press(KeyCode::Char('c'), KeyModifiers::CONTROL)),
            Some(ConsoleInput::Quit)
        );
        assert_eq!(
            map_key(press(KeyCode::Char('3'), KeyModifiers::NONE)),
            Some(ConsoleInput::Event(UiEvent::RangeSelected(TimeRange::SixHours)))
        );
        assert_eq!(
            map_key(press(KeyCode::Char('r'), KeyModifiers::CONTROL)),
            Some(ConsoleInput::Event(UiEvent::KeyDown {
                key: 'r',
                ctrl: true,
                in_text_input: false
            }))
        );
        assert_eq!(map_key(press(KeyCode::Enter, KeyModifiers::NONE)), None);
    }

    #[test]
    fn missing_fields_render_as_dashes() {
        let lines = render_lines(&view(), "");
        assert!(lines.iter().any(|l| l.starts_with("Bubble rate: 72.3 bpm")));
        assert!(lines.iter().any(|l| l.contains("Valve: --")));
        assert!(lines.iter().any(|l| l.contains("Recording: on")));
        assert!(lines.iter().any(|l| l.contains("waiting for data")));
    }

    #[test]
    fn chart_line_shows_axis_bounds() {
        let mut v = view();
        v.chart = Some(ChartSummary {
            bounds: Bounds { min: 63.0, max: 77.0 },
            samples: 3,
            last_value: 68.0,
        });
        let lines = render_lines(&v, "▁█");
        assert!(lines.iter().any(|l| l.contains("3 samples, axis 63..77")));
    }

    #[test]
    fn sparkline_scales_and_truncates() {
        let samples: Vec<Sample> = (0..10).map(|i| Sample::new(i, i as f64)).collect();
        let spark = sparkline(&samples, 4);
        assert_eq!(spark.chars().count(), 4);
        assert_eq!(spark.chars().next(), Some('▁'));
        assert_eq!(spark.chars().last(), Some('█'));
        assert_eq!(sparkline(&[], 4), "");
    }
}
