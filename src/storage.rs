use crate::metrics::Sample;
use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

pub const DEFAULT_HISTORY: usize = 1000;

/// Fixed-capacity rolling window of samples. Appending at capacity evicts the
/// oldest sample.
pub struct HistoryBuffer {
    capacity: usize,
    inner: RwLock<VecDeque<Sample>>,
}

impl HistoryBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn append(&self, sample: Sample) {
        let mut guard = self.write();
        if guard.len() >= self.capacity {
            guard.pop_front();
        }
        guard.push_back(sample);
    }

    pub fn extend(&self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.append(sample);
        }
    }

    /// All samples with `time >= cutoff`, oldest first.
    pub fn filter(&self, cutoff: i64) -> Vec<Sample> {
        self.read()
            .iter()
            .filter(|s| s.time >= cutoff)
            .copied()
            .collect()
    }

    pub fn latest(&self) -> Option<Sample> {
        self.read().back().copied()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn snapshot(&self) -> Vec<Sample> {
        self.read().iter().copied().collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<Sample>> {
        match self.inner.read() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<Sample>> {
        match self.inner.write() {
            Ok(g) => g,
            // Continue with the inner value even if poisoned.
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t: i64) -> Sample {
        Sample::new(t, t as f64 * 0.5)
    }

    #[test]
    fn trims_to_capacity() {
        let buf = HistoryBuffer::new(3);
        for t in 1..=4 {
            buf.append(sample(t));
        }
        let hist = buf.snapshot();
        assert_eq!(hist.len(), 3);
        assert_eq!(hist[0].time, 2);
        assert_eq!(hist[2].time, 4);
        assert_eq!(buf.latest().unwrap().time, 4);
    }

    #[test]
    fn keeps_most_recent_in_order_after_overflow() {
        let buf = HistoryBuffer::new(1000);
        for t in 0..2500 {
            buf.append(sample(t));
            assert!(buf.len() <= 1000);
        }
        let hist = buf.snapshot();
        assert_eq!(hist.len(), 1000);
        let times: Vec<i64> = hist.iter().map(|s| s.time).collect();
        let expected: Vec<i64> = (1500..2500).collect();
        assert_eq!(times, expected);
    }

    #[test]
    fn filter_is_a_non_mutating_suffix() {
        let buf = HistoryBuffer::new(10);
        buf.extend((0..10).map(|t| sample(t * 100)));

        let before = buf.len();
        let first = buf.filter(450);
        let second = buf.filter(450);
        assert_eq!(first, second);
        assert_eq!(buf.len(), before);
        assert_eq!(first.len(), 5);
        assert_eq!(first[0].time, 500);
    }

    #[test]
    fn filter_includes_cutoff_boundary() {
        let buf = HistoryBuffer::new(10);
        buf.extend([sample(100), sample(200), sample(300)]);
        assert_eq!(buf.filter(200).len(), 2);
        assert!(buf.filter(301).is_empty());
        assert_eq!(buf.filter(i64::MIN).len(), 3);
    }

    #[test]
    fn wider_cutoff_never_loses_samples() {
        let buf = HistoryBuffer::new(100);
        buf.extend((0..100).map(|t| sample(t * 60_000)));
        let narrow = buf.filter(99 * 60_000 - 15 * 60_000).len();
        let wide = buf.filter(99 * 60_000 - 60 * 60_000).len();
        assert!(wide >= narrow);
    }
}
