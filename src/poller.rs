use crate::chart::ChartView;
use crate::display::{project, FieldIds, PresentationSink};
use crate::metrics::{MetricKind, Reading};
use crate::source::MetricSource;
use futures::future::join_all;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Clone, Debug)]
pub struct PollingConfig {
    pub data_interval: Duration,
    pub chart_interval: Duration,
    pub tracked: Vec<MetricKind>,
    pub fields: FieldIds,
    pub full_travel_steps: i64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            data_interval: Duration::from_millis(5000),
            chart_interval: Duration::from_millis(2000),
            tracked: MetricKind::ALL.to_vec(),
            fields: FieldIds::default(),
            full_travel_steps: 200,
        }
    }
}

struct Shared {
    config: PollingConfig,
    source: Arc<dyn MetricSource>,
    fallback: Arc<dyn MetricSource>,
    sink: Arc<dyn PresentationSink>,
    chart: Arc<ChartView>,
}

impl Shared {
    async fn data_tick(&self) {
        join_all(self.config.tracked.iter().map(|kind| self.update(*kind))).await;
    }

    /// One independent update path. A failed read is logged and replaced with
    /// a synthetic reading so the fragment never goes blank.
    async fn update(&self, kind: MetricKind) {
        let reading = match self.source.read(kind).await {
            Ok(reading) => reading,
            Err(e) => {
                warn!(
                    "Error updating {} from {} source: {}",
                    kind.as_str(),
                    self.source.name(),
                    e
                );
                match self.fallback.read(kind).await {
                    Ok(reading) => reading,
                    Err(e) => {
                        warn!("Fallback for {} failed too: {}", kind.as_str(), e);
                        return;
                    }
                }
            }
        };
        self.show(&reading);
    }

    fn show(&self, reading: &Reading) {
        project(
            reading,
            &self.config.fields,
            self.config.full_travel_steps,
            self.sink.as_ref(),
        );
    }

    fn chart_tick(&self) {
        if !self.chart.redraw() {
            debug!("Chart skipped: fewer than two samples in range");
        }
    }
}

struct Running {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Two uncoordinated periodic tasks: a data tick that reads every tracked kind
/// and a chart tick that only re-renders.
pub struct PollingLoop {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl PollingLoop {
    pub fn new(
        config: PollingConfig,
        source: Arc<dyn MetricSource>,
        fallback: Arc<dyn MetricSource>,
        sink: Arc<dyn PresentationSink>,
        chart: Arc<ChartView>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                source,
                fallback,
                sink,
                chart,
            }),
            running: Mutex::new(None),
        }
    }

    pub async fn data_tick(&self) {
        self.shared.data_tick().await;
    }

    pub fn chart_tick(&self) {
        self.shared.chart_tick();
    }

    /// Spawns both tasks; each fires once immediately. Returns false if the
    /// loop was already running.
    pub fn start(&self) -> bool {
        let mut running = self.lock();
        if running.is_some() {
            return false;
        }

        let cancel = CancellationToken::new();
        let config = &self.shared.config;
        info!(
            "Polling started: source={}, data every {:?}, chart every {:?}",
            self.shared.source.name(),
            config.data_interval,
            config.chart_interval
        );

        let data = {
            let shared = self.shared.clone();
            spawn_ticker(config.data_interval, cancel.clone(), move || {
                let shared = shared.clone();
                async move { shared.data_tick().await }
            })
        };
        let chart = {
            let shared = self.shared.clone();
            spawn_ticker(config.chart_interval, cancel.clone(), move || {
                let shared = shared.clone();
                async move { shared.chart_tick() }
            })
        };

        *running = Some(Running {
            cancel,
            handles: vec![data, chart],
        });
        true
    }

    /// Cancels both timers. Stopping a stopped loop is a no-op. In-flight
    /// requests are left to finish; no further tick starts.
    pub fn stop(&self) {
        if let Some(running) = self.lock().take() {
            running.cancel.cancel();
            info!("Polling stopped");
        }
    }

    /// Stops and waits for both tasks to exit.
    pub async fn shutdown(&self) {
        let running = self.lock().take();
        if let Some(running) = running {
            running.cancel.cancel();
            for handle in running.handles {
                let _ = handle.await;
            }
            info!("Polling stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Running>> {
        match self.running.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for PollingLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

fn spawn_ticker<F, Fut>(
    period: Duration,
    cancel: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            // interval() completes its first tick immediately.
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            // Cancellation is checked between ticks only; a tick in flight runs to completion.
            tick().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::{TimeRange, Viewport};
    use crate::display::FieldStore;
    use crate::error::FetchError;
    use crate::metrics::{BubbleRate, StepperStatus};
    use crate::source::{MockConfig, MockSource};
    use crate::storage::HistoryBuffer;
    use crate::theme::Theme;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails system stats, answers everything else, and counts calls.
    #[derive(Default)]
    struct FlakySource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MetricSource for FlakySource {
        async fn read(&self, kind: MetricKind) -> Result<Reading, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match kind {
                MetricKind::BubbleRate => Ok(Reading::BubbleRate(BubbleRate {
                    bpm: Some(71.5),
                    delta: Some(0.4),
                })),
                MetricKind::SystemStats => Err(FetchError::Status {
                    url: "http://device/api/stats".into(),
                    status: 503,
                }),
                MetricKind::StepperStatus => Ok(Reading::StepperStatus(StepperStatus {
                    enabled: Some(false),
                    position_steps: Some(20),
                    ..StepperStatus::default()
                })),
            }
        }

        fn name(&self) -> &'static str {
            "flaky"
        }
    }

    struct Fixture {
        source: Arc<FlakySource>,
        fields: Arc<FieldStore>,
        history: Arc<HistoryBuffer>,
        polling: PollingLoop,
    }

    fn fixture(config: PollingConfig) -> Fixture {
        let history = Arc::new(HistoryBuffer::new(1000));
        let fields = Arc::new(FieldStore::default());
        let source = Arc::new(FlakySource::default());
        let fallback = Arc::new(MockSource::with_seed(
            MockConfig::default(),
            history.clone(),
            42,
        ));
        let chart = Arc::new(ChartView::new(
            history.clone(),
            fields.clone(),
            TimeRange::FifteenMinutes,
            Viewport::default(),
            Theme::Dark,
        ));
        let polling = PollingLoop::new(config, source.clone(), fallback, fields.clone(), chart);
        Fixture {
            source,
            fields,
            history,
            polling,
        }
    }

    #[tokio::test]
    async fn one_failure_does_not_block_the_others() {
        let f = fixture(PollingConfig::default());
        f.polling.data_tick().await;

        assert_eq!(f.fields.field("bubble-rate-value").as_deref(), Some("71.5"));
        assert_eq!(f.fields.field("valve-status-text").as_deref(), Some("Disabled"));
        assert_eq!(f.fields.field("valve-position").as_deref(), Some("10"));
        // Stats came from the fallback generator instead of staying blank.
        let temp: f64 = f.fields.field("cpu-temp").unwrap().parse().unwrap();
        assert!((45.0..=50.0).contains(&temp));
        assert_eq!(f.fields.field("memory-usage").unwrap().split(" / ").nth(1), Some("4"));
    }

    #[tokio::test]
    async fn only_tracked_kinds_are_read() {
        let f = fixture(PollingConfig {
            tracked: vec![MetricKind::StepperStatus],
            ..PollingConfig::default()
        });
        f.polling.data_tick().await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 1);
        assert!(f.fields.field("bubble-rate-value").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn start_ticks_immediately_then_on_schedule() {
        let f = fixture(PollingConfig::default());
        assert!(f.polling.start());
        assert!(!f.polling.start());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 3);

        tokio::time::sleep(Duration::from_millis(5000)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 6);
        f.polling.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_is_idempotent_and_final() {
        let f = fixture(PollingConfig::default());
        f.polling.start();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = f.source.calls.load(Ordering::SeqCst);

        f.polling.stop();
        f.polling.stop();
        assert!(!f.polling.is_running());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(f.source.calls.load(Ordering::SeqCst), before);
        f.polling.shutdown().await;
    }

    #[tokio::test]
    async fn chart_tick_does_not_read() {
        let f = fixture(PollingConfig::default());
        f.polling.chart_tick();
        assert_eq!(f.source.calls.load(Ordering::SeqCst), 0);
        assert!(f.history.is_empty());
    }
}
