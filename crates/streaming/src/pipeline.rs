use std::sync::Arc;

use formats::{Histogram, RegionFeature};
use parking_lot::Mutex;
use runtime::epoch::{Epoch, EpochCounter};
use tracing::{debug, warn};

use crate::cache::FeatureCache;
use crate::source::RegionSource;

/// One batch of fetch-or-reuse steps, in histogram order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub epoch: Epoch,
    pub codes: Vec<String>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub epoch: Epoch,
    /// Steps that ended with a render call.
    pub rendered: usize,
    /// Steps whose fetch failed.
    pub failed: usize,
    /// Steps never dispatched because a newer batch took over.
    pub skipped: usize,
}

impl BatchReport {
    pub fn superseded(&self) -> bool {
        self.skipped > 0
    }
}

/// Staleness-aware sequential loader for region geometry.
///
/// A batch runs its steps strictly one after another. After every step the
/// batch compares its epoch with the loader's current one and stops issuing
/// steps once a newer batch has begun. A step that was already dispatched
/// still caches and renders its result, since a valid feature is harmless;
/// only the continuation of the old batch is cut.
///
/// Cache hits never fetch.
pub struct SequencedLoader<S> {
    source: Arc<S>,
    epochs: EpochCounter,
    histogram: Mutex<Histogram>,
    cache: Mutex<FeatureCache>,
}

impl<S: RegionSource> SequencedLoader<S> {
    pub fn new(source: Arc<S>) -> Self {
        Self {
            source,
            epochs: EpochCounter::new(),
            histogram: Mutex::new(Histogram::new()),
            cache: Mutex::new(FeatureCache::new()),
        }
    }

    pub fn source(&self) -> &Arc<S> {
        &self.source
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epochs.current()
    }

    /// Snapshot of the histogram installed by the most recent batch.
    pub fn histogram(&self) -> Histogram {
        self.histogram.lock().clone()
    }

    pub fn with_cache<R>(&self, f: impl FnOnce(&FeatureCache) -> R) -> R {
        f(&self.cache.lock())
    }

    pub fn find_key_by_secondary_code(&self, code: &str) -> Option<String> {
        self.cache
            .lock()
            .find_key_by_secondary_code(code)
            .map(str::to_string)
    }

    /// Installs `histogram` and a fresh epoch, superseding any batch in flight.
    pub fn begin(&self, histogram: Histogram) -> Batch {
        let mut current = self.histogram.lock();
        let codes = histogram
            .nonzero()
            .map(|(code, _)| code.to_string())
            .collect();
        *current = histogram;
        let epoch = self.epochs.advance();
        debug!(%epoch, "region batch started");
        Batch { epoch, codes }
    }

    /// Starts a new batch over the histogram already installed.
    pub fn begin_rerun(&self) -> Batch {
        let histogram = self.histogram();
        self.begin(histogram)
    }

    pub async fn run<F>(&self, histogram: Histogram, render: F) -> BatchReport
    where
        F: FnMut(&str, &RegionFeature),
    {
        let batch = self.begin(histogram);
        self.drive(batch, render).await
    }

    /// Executes `batch` one step at a time, calling `render` for every region
    /// that is cached or fetched successfully.
    pub async fn drive<F>(&self, batch: Batch, mut render: F) -> BatchReport
    where
        F: FnMut(&str, &RegionFeature),
    {
        let mut report = BatchReport {
            epoch: batch.epoch,
            rendered: 0,
            failed: 0,
            skipped: 0,
        };

        let total = batch.codes.len();
        for (i, code) in batch.codes.iter().enumerate() {
            if self.step(code, &mut render).await {
                report.rendered += 1;
            } else {
                report.failed += 1;
            }

            if !self.epochs.is_current(batch.epoch) {
                report.skipped = total - i - 1;
                debug!(
                    epoch = %batch.epoch,
                    skipped = report.skipped,
                    "region batch superseded"
                );
                break;
            }
        }
        report
    }

    async fn step<F>(&self, code: &str, render: &mut F) -> bool
    where
        F: FnMut(&str, &RegionFeature),
    {
        let cached = self.cache.lock().get(code);
        let feature = match cached {
            Some(feature) => feature,
            None => match self.source.fetch_region(code).await {
                Ok(feature) => self.cache.lock().put(code, feature),
                Err(err) => {
                    warn!(code, error = %err, "region geometry fetch failed");
                    return false;
                }
            },
        };
        render(code, &feature);
        true
    }
}
