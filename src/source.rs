use crate::error::FetchError;
use crate::metrics::{
    now_timestamp_ms, round1, BubbleRate, CpuStats, MemoryStats, MetricKind, Reading, Sample,
    ServiceStates, StepperStatus, SystemStats,
};
use crate::storage::HistoryBuffer;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// Produces one reading per call, from exactly one strategy.
#[async_trait]
pub trait MetricSource: Send + Sync + 'static {
    async fn read(&self, kind: MetricKind) -> Result<Reading, FetchError>;

    fn name(&self) -> &'static str;
}

/// GET paths on the device backend, relative to the base URL.
#[derive(Clone, Debug)]
pub struct Endpoints {
    pub bubble_rate: String,
    pub system_stats: String,
    pub stepper_status: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            bubble_rate: "/api/metrics".to_string(),
            system_stats: "/api/stats".to_string(),
            stepper_status: "/api/stepper/status".to_string(),
        }
    }
}

impl Endpoints {
    pub fn path(&self, kind: MetricKind) -> &str {
        match kind {
            MetricKind::BubbleRate => &self.bubble_rate,
            MetricKind::SystemStats => &self.system_stats,
            MetricKind::StepperStatus => &self.stepper_status,
        }
    }
}

pub struct LiveSource {
    client: reqwest::Client,
    base_url: String,
    endpoints: Endpoints,
    history: Arc<HistoryBuffer>,
}

impl LiveSource {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        endpoints: Endpoints,
        history: Arc<HistoryBuffer>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            endpoints,
            history,
        }
    }

    pub fn default_client() -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(4))
            .build()
    }

    async fn get_json<T: DeserializeOwned>(&self, kind: MetricKind) -> Result<T, FetchError> {
        let url = format!("{}{}", self.base_url, self.endpoints.path(kind));
        let response = self
            .client
            .get(&url)
            .header(CONTENT_TYPE, "application/json")
            .header(CACHE_CONTROL, "no-store")
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.clone(),
                source,
            })?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Decode { url, source })
    }
}

#[async_trait]
impl MetricSource for LiveSource {
    async fn read(&self, kind: MetricKind) -> Result<Reading, FetchError> {
        let reading = match kind {
            MetricKind::BubbleRate => {
                let rate: BubbleRate = self.get_json(kind).await?;
                if let Some(bpm) = rate.bpm {
                    self.history.append(Sample::new(now_timestamp_ms(), bpm));
                }
                Reading::BubbleRate(rate)
            }
            MetricKind::SystemStats => Reading::SystemStats(self.get_json(kind).await?),
            MetricKind::StepperStatus => Reading::StepperStatus(self.get_json(kind).await?),
        };
        Ok(reading)
    }

    fn name(&self) -> &'static str {
        "live"
    }
}

/// Tunables for the synthetic generator. These are presentation defaults, not
/// device calibration.
#[derive(Clone, Debug)]
pub struct MockConfig {
    pub initial_bpm: f64,
    pub bpm_min: f64,
    pub bpm_max: f64,
    /// Per-tick walk and delta are uniform in `[-bpm_step, bpm_step]`.
    pub bpm_step: f64,
    pub seed_points: usize,
    pub seed_interval_ms: i64,
    pub seed_base: f64,
    pub seed_spread: f64,
    /// Steps that correspond to a fully open valve.
    pub full_travel_steps: i64,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            initial_bpm: 70.0,
            bpm_min: 60.0,
            bpm_max: 85.0,
            bpm_step: 1.5,
            seed_points: 101,
            seed_interval_ms: 10_000,
            seed_base: 65.0,
            seed_spread: 10.0,
            full_travel_steps: 200,
        }
    }
}

struct MockState {
    rng: StdRng,
    bpm: f64,
}

/// Synthetic strategy. Never fails; every bubble-rate read appends to the
/// shared history.
pub struct MockSource {
    config: MockConfig,
    history: Arc<HistoryBuffer>,
    state: Mutex<MockState>,
}

impl MockSource {
    pub fn new(config: MockConfig, history: Arc<HistoryBuffer>) -> Self {
        Self::with_rng(config, history, StdRng::from_os_rng())
    }

    pub fn with_seed(config: MockConfig, history: Arc<HistoryBuffer>, seed: u64) -> Self {
        Self::with_rng(config, history, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut config: MockConfig, history: Arc<HistoryBuffer>, rng: StdRng) -> Self {
        if config.bpm_min > config.bpm_max {
            std::mem::swap(&mut config.bpm_min, &mut config.bpm_max);
        }
        let bpm = config.initial_bpm.clamp(config.bpm_min, config.bpm_max);
        Self {
            config,
            history,
            state: Mutex::new(MockState { rng, bpm }),
        }
    }

    /// Back-fills the history with `seed_points` synthetic samples ending at `now`.
    pub fn seed_history(&self, now: i64) {
        let mut state = self.lock();
        let points = self.config.seed_points as i64;
        for i in (0..points).rev() {
            let value = self.config.seed_base + state.rng.random::<f64>() * self.config.seed_spread;
            self.history
                .append(Sample::new(now - i * self.config.seed_interval_ms, value));
        }
        debug!("Seeded history with {} synthetic samples", points);
    }

    pub fn bubble_rate(&self) -> BubbleRate {
        let step = self.config.bpm_step.abs();
        let mut state = self.lock();
        let walk = uniform(&mut state.rng, step);
        state.bpm = (state.bpm + walk).clamp(self.config.bpm_min, self.config.bpm_max);
        let delta = uniform(&mut state.rng, step);
        let bpm = state.bpm;
        drop(state);

        self.history.append(Sample::new(now_timestamp_ms(), bpm));
        BubbleRate {
            bpm: Some(round1(bpm)),
            delta: Some(round1(delta)),
        }
    }

    pub fn system_stats(&self) -> SystemStats {
        let mut state = self.lock();
        let rng = &mut state.rng;
        let service = |rng: &mut StdRng, p: f64| {
            if rng.random_bool(p) { "active" } else { "inactive" }.to_string()
        };
        SystemStats {
            cpu: Some(CpuStats {
                temp_c: Some(45.0 + rng.random::<f64>() * 5.0),
                usage_percent: Some(30.0 + rng.random::<f64>() * 25.0),
            }),
            memory: Some(MemoryStats {
                used: Some(2.1 + rng.random::<f64>() * 0.3),
                total: Some(4.0),
                percent: Some(52.0 + rng.random::<f64>() * 8.0),
            }),
            uptime_seconds: Some(478_932.0 + rng.random_range(0..100) as f64),
            services: Some(ServiceStates {
                camera: Some(service(rng, 0.9)),
                stepper: Some(service(rng, 0.95)),
                nginx: Some("active".to_string()),
                api: Some("active".to_string()),
            }),
        }
    }

    pub fn stepper_status(&self) -> StepperStatus {
        let mut state = self.lock();
        let travel = self.config.full_travel_steps.max(1);
        StepperStatus {
            enabled: Some(true),
            moving: Some(false),
            position_steps: Some(state.rng.random_range(0..travel)),
            worker_alive: Some(true),
            last_error: None,
        }
    }

    pub fn history(&self) -> &Arc<HistoryBuffer> {
        &self.history
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        match self.state.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

fn uniform(rng: &mut StdRng, half_width: f64) -> f64 {
    if half_width == 0.0 {
        return 0.0;
    }
    rng.random_range(-half_width..=half_width)
}

#[async_trait]
impl MetricSource for MockSource {
    async fn read(&self, kind: MetricKind) -> Result<Reading, FetchError> {
        Ok(match kind {
            MetricKind::BubbleRate => Reading::BubbleRate(self.bubble_rate()),
            MetricKind::SystemStats => Reading::SystemStats(self.system_stats()),
            MetricKind::StepperStatus => Reading::StepperStatus(self.stepper_status()),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mock(seed: u64) -> MockSource {
        MockSource::with_seed(MockConfig::default(), Arc::new(HistoryBuffer::new(1000)), seed)
    }

    #[tokio::test]
    async fn bubble_rate_stays_within_clamp() {
        let source = mock(7);
        for _ in 0..1000 {
            let Reading::BubbleRate(rate) = source.read(MetricKind::BubbleRate).await.unwrap()
            else {
                panic!("wrong reading kind");
            };
            let bpm = rate.bpm.unwrap();
            assert!((60.0..=85.0).contains(&bpm), "bpm {bpm} out of range");
            assert!(rate.delta.unwrap().abs() <= 1.5);
        }
    }

    #[tokio::test]
    async fn bubble_rate_reads_append_to_history() {
        let source = mock(1);
        source.read(MetricKind::BubbleRate).await.unwrap();
        source.read(MetricKind::BubbleRate).await.unwrap();
        source.read(MetricKind::SystemStats).await.unwrap();
        assert_eq!(source.history().len(), 2);
    }

    #[test]
    fn history_append_is_bounded_at_capacity() {
        let source = mock(3);
        for _ in 0..1500 {
            source.bubble_rate();
        }
        assert_eq!(source.history().len(), 1000);
    }

    #[test]
    fn seeding_spaces_points_ten_seconds_apart() {
        let source = mock(5);
        source.seed_history(1_000_000);
        let hist = source.history().snapshot();
        assert_eq!(hist.len(), 101);
        assert_eq!(hist.last().unwrap().time, 1_000_000);
        assert_eq!(hist[0].time, 1_000_000 - 100 * 10_000);
        assert!(hist.iter().all(|s| (65.0..=75.0).contains(&s.value)));
    }

    #[test]
    fn custom_clamp_range_is_honored() {
        let config = MockConfig {
            initial_bpm: 10.0,
            bpm_min: 20.0,
            bpm_max: 22.0,
            bpm_step: 5.0,
            ..MockConfig::default()
        };
        let source = MockSource::with_seed(config, Arc::new(HistoryBuffer::new(10)), 9);
        for _ in 0..200 {
            let bpm = source.bubble_rate().bpm.unwrap();
            assert!((20.0..=22.0).contains(&bpm));
        }
    }

    #[test]
    fn mock_stats_fill_every_field() {
        let source = mock(11);
        let stats = source.system_stats();
        let cpu = stats.cpu.unwrap();
        assert!((45.0..=50.0).contains(&cpu.temp_c.unwrap()));
        assert_eq!(stats.memory.unwrap().total, Some(4.0));
        assert_eq!(stats.services.unwrap().nginx.as_deref(), Some("active"));

        let stepper = source.stepper_status();
        assert!((0..200).contains(&stepper.position_steps.unwrap()));
        assert!(stepper.last_error.is_none());
    }
}
