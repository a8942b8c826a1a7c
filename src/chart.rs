use crate::display::PresentationSink;
use crate::metrics::{now_timestamp_ms, Sample};
use crate::storage::HistoryBuffer;
use crate::theme::Theme;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

/// Inset of the plot area from every canvas edge, in CSS pixels.
pub const PADDING: f64 = 40.0;
/// Horizontal grid lines and y-axis labels.
pub const GRID_LINES: usize = 6;
/// Value padding added below the minimum and above the maximum.
pub const VALUE_PADDING: f64 = 5.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
pub enum TimeRange {
    #[default]
    #[value(name = "15m")]
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[value(name = "1h")]
    #[serde(rename = "1h")]
    OneHour,
    #[value(name = "6h")]
    #[serde(rename = "6h")]
    SixHours,
    #[value(name = "24h")]
    #[serde(rename = "24h")]
    OneDay,
}

impl TimeRange {
    pub const ALL: [TimeRange; 4] = [
        TimeRange::FifteenMinutes,
        TimeRange::OneHour,
        TimeRange::SixHours,
        TimeRange::OneDay,
    ];

    pub fn duration_ms(self) -> i64 {
        const MINUTE: i64 = 60 * 1000;
        match self {
            TimeRange::FifteenMinutes => 15 * MINUTE,
            TimeRange::OneHour => 60 * MINUTE,
            TimeRange::SixHours => 6 * 60 * MINUTE,
            TimeRange::OneDay => 24 * 60 * MINUTE,
        }
    }

    pub fn cutoff(self, now: i64) -> i64 {
        now.saturating_sub(self.duration_ms())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::FifteenMinutes => "15m",
            TimeRange::OneHour => "1h",
            TimeRange::SixHours => "6h",
            TimeRange::OneDay => "24h",
        }
    }

    /// Presentation field that carries this range's chip.
    pub fn chip_id(self) -> String {
        format!("chart-chip-{}", self.as_str())
    }
}

impl fmt::Display for TimeRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeRange::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown time range {s:?}"))
    }
}

/// Canvas size in CSS pixels plus the device pixel ratio of the display.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub device_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, device_pixel_ratio: f64) -> Self {
        let dpr = if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
            device_pixel_ratio
        } else {
            1.0
        };
        Self {
            width: width.max(0.0),
            height: height.max(0.0),
            device_pixel_ratio: dpr,
        }
    }

    /// Backing store resolution in device pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        (
            (self.width * self.device_pixel_ratio).round() as u32,
            (self.height * self.device_pixel_ratio).round() as u32,
        )
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(800.0, 300.0, 1.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f64) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f64) -> Self {
        Self { a, ..self }
    }

    pub fn css(&self) -> String {
        if self.a >= 1.0 {
            format!("#{:02X}{:02X}{:02X}", self.r, self.g, self.b)
        } else {
            format!("rgba({}, {}, {}, {})", self.r, self.g, self.b, self.a)
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartStyle {
    pub accent: Rgba,
    pub fill_top_alpha: f64,
    pub fill_bottom_alpha: f64,
    pub line_width: f64,
    pub grid: Rgba,
    pub label: Rgba,
    pub font: String,
}

impl ChartStyle {
    pub fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                accent: Rgba::new(10, 132, 255, 1.0),
                fill_top_alpha: 0.3,
                fill_bottom_alpha: 0.05,
                line_width: 2.0,
                grid: Rgba::new(255, 255, 255, 0.05),
                label: Rgba::new(255, 255, 255, 0.5),
                font: "12px SF Mono, monospace".to_string(),
            },
            Theme::Light => Self {
                accent: Rgba::new(0, 122, 255, 1.0),
                grid: Rgba::new(0, 0, 0, 0.08),
                label: Rgba::new(0, 0, 0, 0.5),
                ..Self::for_theme(Theme::Dark)
            },
        }
    }
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self::for_theme(Theme::Dark)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Vertical linear gradient between two y coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Gradient {
    pub y0: f64,
    pub y1: f64,
    pub top: Rgba,
    pub bottom: Rgba,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TextAlign {
    Right,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum DrawCommand {
    Clear {
        viewport: Viewport,
    },
    Line {
        from: Point,
        to: Point,
        color: Rgba,
        width: f64,
    },
    FillArea {
        points: Vec<Point>,
        gradient: Gradient,
    },
    Polyline {
        points: Vec<Point>,
        color: Rgba,
        width: f64,
    },
    Text {
        text: String,
        at: Point,
        align: TextAlign,
        color: Rgba,
        font: String,
    },
}

/// Padded value range of a rendered frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub fn of(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let (min, max) = values
            .into_iter()
            .fold(None, |acc: Option<(f64, f64)>, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })?;
        Some(Self {
            min: min - VALUE_PADDING,
            max: max + VALUE_PADDING,
        })
    }

    pub fn span(&self) -> f64 {
        self.max - self.min
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChartFrame {
    pub range: TimeRange,
    pub viewport: Viewport,
    pub bounds: Bounds,
    pub samples: usize,
    pub last_value: f64,
    pub commands: Vec<DrawCommand>,
}

/// Paint target for chart frames.
pub trait Surface {
    fn begin(&mut self, viewport: &Viewport);
    fn line(&mut self, from: Point, to: Point, color: Rgba, width: f64);
    fn fill_area(&mut self, points: &[Point], gradient: &Gradient);
    fn polyline(&mut self, points: &[Point], color: Rgba, width: f64);
    fn text(&mut self, text: &str, at: Point, align: TextAlign, color: Rgba, font: &str);
}

pub fn paint(commands: &[DrawCommand], surface: &mut impl Surface) {
    for cmd in commands {
        match cmd {
            DrawCommand::Clear { viewport } => surface.begin(viewport),
            DrawCommand::Line {
                from,
                to,
                color,
                width,
            } => surface.line(*from, *to, *color, *width),
            DrawCommand::FillArea { points, gradient } => surface.fill_area(points, gradient),
            DrawCommand::Polyline {
                points,
                color,
                width,
            } => surface.polyline(points, *color, *width),
            DrawCommand::Text {
                text,
                at,
                align,
                color,
                font,
            } => surface.text(text, *at, *align, *color, font),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ChartRenderer {
    style: ChartStyle,
}

impl ChartRenderer {
    pub fn new(style: ChartStyle) -> Self {
        Self { style }
    }

    /// Renders the samples inside `range` as of `now`. Fewer than two samples
    /// in the window yields `None` and no drawing at all.
    pub fn render(
        &self,
        samples: &[Sample],
        range: TimeRange,
        viewport: Viewport,
        now: i64,
    ) -> Option<ChartFrame> {
        let cutoff = range.cutoff(now);
        let visible: Vec<&Sample> = samples.iter().filter(|s| s.time >= cutoff).collect();
        if visible.len() < 2 {
            return None;
        }

        let bounds = Bounds::of(visible.iter().map(|s| s.value))?;
        let Viewport { width, height, .. } = viewport;
        let plot_w = width - 2.0 * PADDING;
        let plot_h = height - 2.0 * PADDING;
        let bottom = height - PADDING;
        let steps = (GRID_LINES - 1) as f64;
        let last_index = (visible.len() - 1) as f64;

        let points: Vec<Point> = visible
            .iter()
            .enumerate()
            .map(|(i, s)| Point {
                x: PADDING + plot_w * i as f64 / last_index,
                y: bottom - (s.value - bounds.min) / bounds.span() * plot_h,
            })
            .collect();

        let mut commands = Vec::with_capacity(GRID_LINES * 2 + 3);
        commands.push(DrawCommand::Clear { viewport });

        for i in 0..GRID_LINES {
            let y = PADDING + plot_h * i as f64 / steps;
            commands.push(DrawCommand::Line {
                from: Point { x: PADDING, y },
                to: Point {
                    x: width - PADDING,
                    y,
                },
                color: self.style.grid,
                width: 1.0,
            });
        }

        let mut area = points.clone();
        area.push(Point {
            x: PADDING + plot_w,
            y: bottom,
        });
        area.push(Point { x: PADDING, y: bottom });
        commands.push(DrawCommand::FillArea {
            points: area,
            gradient: Gradient {
                y0: PADDING,
                y1: bottom,
                top: self.style.accent.with_alpha(self.style.fill_top_alpha),
                bottom: self.style.accent.with_alpha(self.style.fill_bottom_alpha),
            },
        });

        commands.push(DrawCommand::Polyline {
            points,
            color: self.style.accent,
            width: self.style.line_width,
        });

        for i in 0..GRID_LINES {
            let value = bounds.min + bounds.span() * (steps - i as f64) / steps;
            let y = PADDING + plot_h * i as f64 / steps;
            commands.push(DrawCommand::Text {
                text: (value.round() as i64).to_string(),
                at: Point {
                    x: PADDING - 10.0,
                    y: y + 4.0,
                },
                align: TextAlign::Right,
                color: self.style.label,
                font: self.style.font.clone(),
            });
        }

        Some(ChartFrame {
            range,
            viewport,
            bounds,
            samples: visible.len(),
            last_value: visible[visible.len() - 1].value,
            commands,
        })
    }
}

struct ViewState {
    range: TimeRange,
    viewport: Viewport,
    renderer: ChartRenderer,
}

/// The chart widget: active range, viewport and the last rendered frame.
pub struct ChartView {
    history: Arc<HistoryBuffer>,
    sink: Arc<dyn PresentationSink>,
    state: Mutex<ViewState>,
    frame: RwLock<Option<ChartFrame>>,
}

impl ChartView {
    pub fn new(
        history: Arc<HistoryBuffer>,
        sink: Arc<dyn PresentationSink>,
        range: TimeRange,
        viewport: Viewport,
        theme: Theme,
    ) -> Self {
        for r in TimeRange::ALL {
            sink.display_class(&r.chip_id(), chip_class(r == range));
        }
        Self {
            history,
            sink,
            state: Mutex::new(ViewState {
                range,
                viewport,
                renderer: ChartRenderer::new(ChartStyle::for_theme(theme)),
            }),
            frame: RwLock::new(None),
        }
    }

    pub fn redraw(&self) -> bool {
        self.redraw_at(now_timestamp_ms())
    }

    /// Re-renders from the current history. Returns whether anything was drawn.
    pub fn redraw_at(&self, now: i64) -> bool {
        let samples = self.history.snapshot();
        let frame = {
            let state = self.lock();
            state
                .renderer
                .render(&samples, state.range, state.viewport, now)
        };
        let drawn = frame.is_some();
        match self.frame.write() {
            Ok(mut g) => *g = frame,
            Err(poisoned) => *poisoned.into_inner() = frame,
        }
        drawn
    }

    /// Swaps the active range, moves the chip highlight and re-renders.
    pub fn select_range(&self, range: TimeRange) -> TimeRange {
        let previous = {
            let mut state = self.lock();
            let previous = state.range;
            state.range = range;
            self.sink
                .display_class(&previous.chip_id(), chip_class(false));
            self.sink.display_class(&range.chip_id(), chip_class(true));
            previous
        };
        debug!("Chart range {} -> {}", previous, range);
        self.redraw();
        previous
    }

    pub fn resize(&self, viewport: Viewport) {
        self.lock().viewport = viewport;
        self.redraw();
    }

    pub fn set_theme(&self, theme: Theme) {
        self.lock().renderer = ChartRenderer::new(ChartStyle::for_theme(theme));
        self.redraw();
    }

    pub fn active_range(&self) -> TimeRange {
        self.lock().range
    }

    pub fn viewport(&self) -> Viewport {
        self.lock().viewport
    }

    pub fn latest_frame(&self) -> Option<ChartFrame> {
        match self.frame.read() {
            Ok(g) => g.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn chip_class(active: bool) -> &'static str {
    if active {
        "chart-chip active"
    } else {
        "chart-chip"
    }
}
