use crate::chart::{TimeRange, Viewport};
use crate::command::PressOutcome;
use crate::controls::UiEvent;
use crate::dashboard::{Dashboard, EventOutcome};
use crate::svg::{empty_svg, render_frame};
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub dashboard: Arc<Dashboard>,
    pub shutdown: CancellationToken,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Deserialize)]
pub struct ChartQuery {
    pub width: Option<f64>,
    pub height: Option<f64>,
    pub dpr: Option<f64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/health", get(health))
        .route("/api/view", get(view))
        .route("/api/chart.svg", get(chart_svg))
        .route("/api/controls/:id", post(click_control))
        .route("/api/range/:range", post(select_range))
        .route("/api/keys/:key", post(press_key))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    source: &'static str,
    polling: bool,
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let body = HealthResponse {
        status: if state.shutdown.is_cancelled() {
            "stopping"
        } else {
            "ok"
        },
        source: state.dashboard.source_name(),
        polling: state.dashboard.polling.is_running(),
    };
    (StatusCode::OK, Json(body)).into_response()
}

async fn view(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.dashboard.view())).into_response()
}

async fn chart_svg(
    State(state): State<AppState>,
    Query(query): Query<ChartQuery>,
) -> impl IntoResponse {
    let chart = &state.dashboard.chart;
    if query.width.is_some() || query.height.is_some() || query.dpr.is_some() {
        let current = chart.viewport();
        let viewport = Viewport::new(
            query.width.unwrap_or(current.width),
            query.height.unwrap_or(current.height),
            query.dpr.unwrap_or(current.device_pixel_ratio),
        );
        if viewport != current {
            state
                .dashboard
                .handle_event(UiEvent::Resize(viewport))
                .await;
        }
    }
    let svg = match chart.latest_frame() {
        Some(frame) => render_frame(&frame),
        None => empty_svg(&chart.viewport()),
    };
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/svg+xml"),
            (header::CACHE_CONTROL, "no-store"),
        ],
        svg,
    )
        .into_response()
}

#[derive(Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum ControlResponse<'a> {
    Handled,
    Ignored { control: &'a str },
    Sent { message: String, body: serde_json::Value },
}

async fn click_control(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    let outcome = state.dashboard.handle_event(UiEvent::Click(id.clone())).await;
    match outcome {
        EventOutcome::Unhandled => not_found(format!("unknown control: {id}")),
        EventOutcome::Handled => (StatusCode::OK, Json(ControlResponse::Handled)).into_response(),
        EventOutcome::Command(PressOutcome::Ignored) => (
            StatusCode::CONFLICT,
            Json(ControlResponse::Ignored { control: &id }),
        )
            .into_response(),
        EventOutcome::Command(PressOutcome::Sent(Ok(ack))) => (
            StatusCode::OK,
            Json(ControlResponse::Sent {
                message: ack.message,
                body: ack.body,
            }),
        )
            .into_response(),
        EventOutcome::Command(PressOutcome::Sent(Err(error))) => {
            (StatusCode::BAD_GATEWAY, Json(ErrorResponse { error })).into_response()
        }
    }
}

async fn select_range(State(state): State<AppState>, Path(range): Path<String>) -> Response {
    let range: TimeRange = match range.parse() {
        Ok(range) => range,
        Err(error) => {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
        }
    };
    state
        .dashboard
        .handle_event(UiEvent::RangeSelected(range))
        .await;
    (StatusCode::OK, Json(state.dashboard.view())).into_response()
}

/// `ctrl+r` style keys set the modifier; anything else must be one character.
async fn press_key(State(state): State<AppState>, Path(key): Path<String>) -> Response {
    let (ctrl, rest) = match key.strip_prefix("ctrl+") {
        Some(rest) => (true, rest),
        None => (false, key.as_str()),
    };
    let mut chars = rest.chars();
    let (Some(c), None) = (chars.next(), chars.next()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: format!("invalid key: {key}"),
            }),
        )
            .into_response();
    };
    let event = UiEvent::KeyDown {
        key: c,
        ctrl,
        in_text_input: false,
    };
    match state.dashboard.handle_event(event).await {
        EventOutcome::Unhandled => not_found(format!("no shortcut for {key}")),
        _ => (StatusCode::OK, Json(state.dashboard.view())).into_response(),
    }
}

fn not_found(error: String) -> Response {
    (StatusCode::NOT_FOUND, Json(ErrorResponse { error })).into_response()
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>Plastination Dashboard</title>
  <style>
    :root { --bg: #0b0f19; --panel: #0f1626; --border: #2a3550; --text: #e5e7eb; --muted: #9ca3af; --btn: #111a2d; }
    body.light { --bg: #f5f5f7; --panel: #ffffff; --border: #d1d5db; --text: #111827; --muted: #6b7280; --btn: #f3f4f6; }
    body { background: var(--bg); color: var(--text); font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, Roboto, Arial; margin: 24px; }
    .row { display: flex; gap: 12px; flex-wrap: wrap; margin-bottom: 16px; }
    .panel { background: var(--panel); border: 1px solid var(--border); border-radius: 12px; padding: 12px; min-width: 180px; }
    .label { color: var(--muted); font-size: 12px; }
    .value { font-size: 24px; }
    button { background: var(--btn); color: var(--text); border: 1px solid var(--border); border-radius: 8px; padding: 6px 10px; cursor: pointer; }
    button:disabled { opacity: 0.5; cursor: default; }
    .chart-chip.active { border-color: #0a84ff; }
    .metric-delta.up { color: #30d158; }
    .metric-delta.down { color: #ff453a; }
    .positive { color: #30d158; }
    .danger { color: #ff453a; }
    .valve-track { background: var(--border); height: 8px; border-radius: 4px; }
    #valve-position-fill { background: #0a84ff; height: 8px; border-radius: 4px; width: 0; }
    pre { white-space: pre-wrap; }
  </style>
</head>
<body>
  <div class="row">
    <h1 style="margin:0">Plastination Dashboard</h1>
    <button data-control="theme-toggle"><span id="theme-toggle-icon"></span> <span id="theme-toggle-label"></span></button>
    <button data-control="recording-control" id="recording-control"><span id="recording-dot"></span> <span id="recording-text"></span></button>
    <button data-control="camera-fullscreen-btn"><span id="camera-fullscreen-icon"></span> <span id="camera-fullscreen-label"></span></button>
  </div>

  <div class="row">
    <div class="panel"><div class="label">Bubble rate (bpm)</div><div class="value" id="bubble-rate-value">--</div><div id="bubble-rate-delta" class="metric-delta"></div></div>
    <div class="panel"><div class="label">CPU</div><div><span id="cpu-temp">--</span> °C, <span id="cpu-usage">--</span>%</div></div>
    <div class="panel"><div class="label">Memory (GB)</div><div id="memory-usage">--</div><div class="label">Uptime <span id="uptime">--</span></div></div>
    <div class="panel"><div class="label">Services</div><div>Camera <span id="camera-service">--</span></div><div>Stepper <span id="stepper-service">--</span></div></div>
  </div>

  <div class="panel" style="margin-bottom:16px">
    <div class="row">
      <button class="chart-chip" id="chart-chip-15m" data-range="15m">15m</button>
      <button class="chart-chip" id="chart-chip-1h" data-range="1h">1h</button>
      <button class="chart-chip" id="chart-chip-6h" data-range="6h">6h</button>
      <button class="chart-chip" id="chart-chip-24h" data-range="24h">24h</button>
    </div>
    <img id="chart" alt="Bubble rate" style="width:100%;max-width:800px;height:300px"/>
  </div>

  <div class="panel">
    <div class="label">Valve <span id="valve-status-text">--</span> (<span id="valve-position">--</span>%)</div>
    <div class="valve-track"><div id="valve-position-fill"></div></div>
    <div class="row" style="margin-top:12px">
      <button data-control="valve-enable">Enable</button>
      <button data-control="valve-disable">Disable</button>
      <button data-control="valve-open">Open</button>
      <button data-control="valve-close">Close</button>
      <button data-control="valve-minus">−</button>
      <button data-control="valve-plus">+</button>
      <button data-control="valve-abort">Abort</button>
    </div>
    <div id="valve-message"></div>
  </div>
  <pre id="help"></pre>

  <script>
    function apply(view) {
      document.body.classList.toggle('light', view.theme === 'light');
      for (const [id, value] of Object.entries(view.fields)) {
        const el = document.getElementById(id);
        if (!el) continue;
        if (id === 'valve-position-fill') el.style.width = value; else el.textContent = value;
      }
      for (const [id, cls] of Object.entries(view.classes)) {
        const el = document.getElementById(id);
        if (el) el.className = cls;
      }
      document.querySelectorAll('[data-control]').forEach(b => {
        b.disabled = view.disabled_controls.includes(b.dataset.control);
      });
    }
    async function refresh() {
      const res = await fetch('/api/view', { cache: 'no-store' });
      if (res.ok) apply(await res.json());
    }
    function redrawChart() {
      const img = document.getElementById('chart');
      const w = Math.round(img.clientWidth || 800), h = Math.round(img.clientHeight || 300);
      img.src = `/api/chart.svg?width=${w}&height=${h}&dpr=${window.devicePixelRatio || 1}&t=${Date.now()}`;
    }
    document.querySelectorAll('[data-control]').forEach(b => b.addEventListener('click', async () => {
      await fetch(`/api/controls/${b.dataset.control}`, { method: 'POST' });
      refresh();
    }));
    document.querySelectorAll('[data-range]').forEach(b => b.addEventListener('click', async () => {
      await fetch(`/api/range/${b.dataset.range}`, { method: 'POST' });
      refresh();
      redrawChart();
    }));
    document.addEventListener('keydown', async e => {
      const t = e.target;
      if (t && (t.tagName === 'INPUT' || t.tagName === 'TEXTAREA')) return;
      const key = e.ctrlKey ? `ctrl+${e.key}` : e.key;
      if (!['t', 'f', '?', 'ctrl+r'].includes(key)) return;
      e.preventDefault();
      await fetch(`/api/keys/${encodeURIComponent(key)}`, { method: 'POST' });
      refresh();
      redrawChart();
    });
    window.addEventListener('resize', redrawChart);
    refresh();
    redrawChart();
    setInterval(refresh, 5000);
    setInterval(redrawChart, 2000);
  </script>
</body>
</html>
"#;
