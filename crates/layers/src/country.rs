use std::sync::Arc;

use formats::{Histogram, RegionFeature};
use foundation::viewport::ViewportState;
use futures_util::future::join;
use parking_lot::Mutex;
use serde_json::Value;
use streaming::{Batch, BatchReport, RegionSource, SequencedLoader};
use tracing::{debug, warn};

use crate::config::{CountBounds, OverlayConfig};
use crate::layer::{Layer, LayerId, OverlayLayer};
use crate::symbology::{ColorError, ColorScale, FeatureStyle, LinearRamp};
use crate::translate::GeometryTranslator;

/// Geometry overlay the choropleth draws into.
pub trait RenderSink {
    fn add_data(&mut self, code: &str, feature: RegionFeature, style: FeatureStyle);

    fn clear_layers(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedRegion {
    pub code: String,
    pub feature: RegionFeature,
    pub style: FeatureStyle,
}

/// In-memory sink: keeps everything added since the last clear.
#[derive(Debug, Default)]
pub struct GeometryOverlay {
    pub regions: Vec<RenderedRegion>,
    pub clears: usize,
}

impl GeometryOverlay {
    pub fn codes(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.code.as_str()).collect()
    }
}

impl RenderSink for GeometryOverlay {
    fn add_data(&mut self, code: &str, feature: RegionFeature, style: FeatureStyle) {
        self.regions.push(RenderedRegion {
            code: code.to_string(),
            feature,
            style,
        });
    }

    fn clear_layers(&mut self) {
        self.regions.clear();
        self.clears += 1;
    }
}

/// Chart payloads for a selected region. A failed fetch leaves its field empty.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionCharts {
    pub key: String,
    pub outliers: Option<Value>,
    pub date_histogram: Option<Value>,
}

/// Last viewport seen plus the batch it (or a data change) scheduled.
struct ViewState {
    viewport: ViewportState,
    pending: Option<Batch>,
}

/// Choropleth of per-region client counts.
///
/// Scheduling and driving are split: [`CountryLayer::set`] and
/// [`CountryLayer::update_bounds`] take `&self`, so a newer call can begin its
/// batch while an older one is still awaiting a fetch. The older batch then
/// finishes its current step and stops.
pub struct CountryLayer<S, K> {
    id: LayerId,
    loader: Arc<SequencedLoader<S>>,
    sink: Option<Arc<Mutex<K>>>,
    color: Box<dyn ColorScale>,
    view: Mutex<ViewState>,
    counts: CountBounds,
    country_count: Option<usize>,
    outlier_limit: usize,
}

impl<S: RegionSource, K: RenderSink> CountryLayer<S, K> {
    pub fn new(
        id: u64,
        source: Arc<S>,
        config: &OverlayConfig,
        color: impl ColorScale + 'static,
    ) -> Self {
        Self {
            id: LayerId(id),
            loader: Arc::new(SequencedLoader::new(source)),
            sink: None,
            color: Box::new(color),
            view: Mutex::new(ViewState {
                viewport: ViewportState::new(0.0, 1.0, 0.0),
                pending: None,
            }),
            counts: config.country_counts(),
            country_count: None,
            outlier_limit: config.outlier_limit(),
        }
    }

    /// Layer colored by the config's `countries_color_ramp`.
    pub fn from_config(
        id: u64,
        source: Arc<S>,
        config: &OverlayConfig,
    ) -> Result<Self, ColorError> {
        let ramp = LinearRamp::from_hex(&config.countries_color_ramp)?;
        Ok(Self::new(id, source, config, ramp))
    }

    pub fn loader(&self) -> &Arc<SequencedLoader<S>> {
        &self.loader
    }

    pub fn sink(&self) -> Option<&Arc<Mutex<K>>> {
        self.sink.as_ref()
    }

    pub fn viewport(&self) -> ViewportState {
        self.view.lock().viewport
    }

    pub fn country_count(&self) -> usize {
        self.country_count.unwrap_or(self.counts.default)
    }

    pub fn set_country_count(&mut self, count: f64) {
        self.country_count = Some(count.round().max(0.0) as usize);
    }

    pub fn country_count_min(&self) -> usize {
        self.counts.min
    }

    pub fn country_count_max(&self) -> usize {
        self.counts.max
    }

    /// Installs `histogram` and schedules a batch over its non-zero regions,
    /// superseding whatever batch is in flight.
    pub fn schedule(&self, histogram: Histogram) {
        let batch = self.loader.begin(histogram);
        self.view.lock().pending = Some(batch);
    }

    /// Records `viewport`. Translations are relative to the window's left
    /// edge, so a change of it clears the overlay and schedules a full rerun.
    ///
    /// Returns whether a batch is waiting for [`CountryLayer::flush`].
    pub fn view_changed(&self, viewport: &ViewportState) -> bool {
        let mut view = self.view.lock();
        let moved = viewport.min_x != view.viewport.min_x;
        view.viewport = *viewport;
        if moved {
            if let Some(sink) = self.sink.as_ref() {
                sink.lock().clear_layers();
            }
            view.pending = Some(self.loader.begin_rerun());
        }
        view.pending.is_some()
    }

    /// Replaces the histogram and renders every non-zero region.
    pub async fn set(&self, histogram: Histogram) -> Option<BatchReport> {
        self.schedule(histogram);
        self.flush().await
    }

    /// Applies a view change, re-rendering everything if the window moved.
    pub async fn update_bounds(&self, viewport: &ViewportState) -> Option<BatchReport> {
        if self.view_changed(viewport) {
            self.flush().await
        } else {
            None
        }
    }

    /// Runs the batch scheduled by the last data or view change.
    pub async fn flush(&self) -> Option<BatchReport> {
        let (batch, viewport) = {
            let mut view = self.view.lock();
            let batch = view.pending.take()?;
            if self.sink.is_none() {
                warn!(epoch = %batch.epoch, "country layer has no render sink yet");
                view.pending = Some(batch);
                return None;
            }
            (batch, view.viewport)
        };
        let sink = self.sink.as_ref()?;

        let histogram = self.loader.histogram();
        let translator = GeometryTranslator::for_viewport(&viewport);
        let color = &*self.color;
        let report = self
            .loader
            .drive(batch, |code, feature| {
                let style = FeatureStyle::choropleth(color.color_at(histogram.relative(code)));
                let translated = translator.translate_region(feature);
                sink.lock().add_data(code, translated, style);
            })
            .await;
        debug!(
            epoch = %report.epoch,
            rendered = report.rendered,
            failed = report.failed,
            skipped = report.skipped,
            "country batch finished"
        );
        Some(report)
    }

    /// Fill style for the region carrying `secondary_code`.
    pub fn feature_style(&self, secondary_code: &str) -> FeatureStyle {
        let histogram = self.loader.histogram();
        let t = self
            .loader
            .find_key_by_secondary_code(secondary_code)
            .map_or(0.0, |key| histogram.relative(&key));
        FeatureStyle::choropleth(self.color.color_at(t))
    }

    pub fn hover_style(&self) -> FeatureStyle {
        FeatureStyle::HOVER
    }

    /// Fetches chart data for a rendered region picked by its secondary code.
    pub async fn select_region(&self, secondary_code: &str) -> Option<RegionCharts> {
        let Some(key) = self.loader.find_key_by_secondary_code(secondary_code) else {
            debug!(code = secondary_code, "selected region is not loaded");
            return None;
        };

        let source = self.loader.source();
        let (outliers, date_histogram) = join(
            source.fetch_outliers(&key, self.outlier_limit),
            source.fetch_date_histogram(&key),
        )
        .await;

        Some(RegionCharts {
            outliers: outliers
                .inspect_err(|err| warn!(code = %key, error = %err, "outlier fetch failed"))
                .ok(),
            date_histogram: date_histogram
                .inspect_err(|err| warn!(code = %key, error = %err, "date histogram fetch failed"))
                .ok(),
            key,
        })
    }
}

impl<S, K> Layer for CountryLayer<S, K> {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl<S: RegionSource, K: RenderSink> OverlayLayer for CountryLayer<S, K> {
    type Resources = K;
    type Data = Histogram;
    /// Whether a batch is waiting for [`CountryLayer::flush`].
    type Output = bool;

    fn initialize(&mut self, sink: K) {
        self.sink = Some(Arc::new(Mutex::new(sink)));
    }

    fn update_data(&mut self, histogram: Histogram) {
        self.schedule(histogram);
    }

    fn draw_frame(&mut self, viewport: &ViewportState) -> bool {
        self.view_changed(viewport)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use formats::{GeoPoint, Histogram, RegionFeature, RegionGeometry};
    use foundation::viewport::ViewportState;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use streaming::{BoxFuture, FetchError, RegionSource};
    use tokio::sync::Notify;

    use super::{CountryLayer, GeometryOverlay};
    use crate::config::OverlayConfig;
    use crate::layer::OverlayLayer;
    use crate::symbology::FeatureStyle;

    #[derive(Default)]
    struct Fixtures {
        fetched: Mutex<Vec<String>>,
        outlier_limits: Mutex<Vec<usize>>,
    }

    impl RegionSource for Fixtures {
        fn fetch_region<'a>(
            &'a self,
            code: &'a str,
        ) -> BoxFuture<'a, Result<RegionFeature, FetchError>> {
            Box::pin(async move {
                self.fetched.lock().push(code.to_string());
                Ok(RegionFeature::new(
                    format!("{code}x").to_uppercase(),
                    RegionGeometry::Polygon(vec![vec![
                        GeoPoint::new(-170.0, 0.0),
                        GeoPoint::new(-160.0, 5.0),
                    ]]),
                ))
            })
        }

        fn fetch_outliers<'a>(
            &'a self,
            code: &'a str,
            limit: usize,
        ) -> BoxFuture<'a, Result<Value, FetchError>> {
            Box::pin(async move {
                self.outlier_limits.lock().push(limit);
                Ok(json!({ code: [] }))
            })
        }

        fn fetch_date_histogram<'a>(
            &'a self,
            code: &'a str,
        ) -> BoxFuture<'a, Result<Value, FetchError>> {
            Box::pin(async move { Err(FetchError::new(code, "503")) })
        }
    }

    fn layer() -> CountryLayer<Fixtures, GeometryOverlay> {
        let red = |t: f64| [t as f32, 0.0, 0.0, 1.0];
        let mut layer =
            CountryLayer::new(1, Arc::new(Fixtures::default()), &OverlayConfig::default(), red);
        layer.initialize(GeometryOverlay::default());
        layer
    }

    fn histogram(entries: &[(&str, u64)]) -> Histogram {
        entries.iter().map(|(c, n)| (*c, *n)).collect()
    }

    fn first_x(layer: &CountryLayer<Fixtures, GeometryOverlay>, i: usize) -> f64 {
        let sink = layer.sink().expect("sink").lock();
        sink.regions[i].feature.parts[0].geometry.rings().next().expect("ring")[0].lon_deg
    }

    #[tokio::test]
    async fn set_renders_nonzero_regions_with_ramp_colors() {
        let layer = layer();
        let report = layer
            .set(histogram(&[("aa", 4), ("bb", 2), ("cc", 0)]))
            .await
            .expect("batch ran");

        assert_eq!(report.rendered, 2);
        let sink = layer.sink().expect("sink").lock();
        assert_eq!(sink.codes(), vec!["aa", "bb"]);
        assert_eq!(sink.regions[0].style, FeatureStyle::choropleth([1.0, 0.0, 0.0, 1.0]));
        assert_eq!(sink.regions[1].style.fill_color, [0.5, 0.0, 0.0, 1.0]);
        assert_eq!(sink.regions[1].style.weight, 0.0);
    }

    #[tokio::test]
    async fn moving_the_window_clears_and_retranslates_from_cache() {
        let layer = layer();
        layer.set(histogram(&[("aa", 1)])).await;
        assert_eq!(first_x(&layer, 0), -170.0);

        // Same left edge: nothing to redo.
        let same = ViewportState::new(0.0, 0.7, 2.0);
        assert_eq!(layer.update_bounds(&same).await, None);

        let wrapped = ViewportState::new(1.25, 1.75, 2.0);
        let report = layer.update_bounds(&wrapped).await.expect("rerun");
        assert_eq!(report.rendered, 1);

        assert_eq!(first_x(&layer, 0), 550.0);
        let sink = layer.sink().expect("sink").lock();
        assert_eq!(sink.clears, 1);
        assert_eq!(sink.codes(), vec!["aa"]);
        assert_eq!(*layer.loader().source().fetched.lock(), vec!["aa"]);
    }

    /// Holds the fetch of `gated` until `release` is notified.
    struct GatedSource {
        gated: &'static str,
        requested: Notify,
        release: Notify,
        fetched: Mutex<Vec<String>>,
    }

    impl RegionSource for GatedSource {
        fn fetch_region<'a>(
            &'a self,
            code: &'a str,
        ) -> BoxFuture<'a, Result<RegionFeature, FetchError>> {
            Box::pin(async move {
                self.fetched.lock().push(code.to_string());
                if code == self.gated {
                    self.requested.notify_one();
                    self.release.notified().await;
                }
                Ok(RegionFeature::new(
                    code.to_uppercase(),
                    RegionGeometry::Polygon(vec![vec![GeoPoint::new(1.0, 1.0)]]),
                ))
            })
        }

        fn fetch_outliers<'a>(
            &'a self,
            code: &'a str,
            _limit: usize,
        ) -> BoxFuture<'a, Result<Value, FetchError>> {
            Box::pin(async move { Err(FetchError::new(code, "unused")) })
        }

        fn fetch_date_histogram<'a>(
            &'a self,
            code: &'a str,
        ) -> BoxFuture<'a, Result<Value, FetchError>> {
            Box::pin(async move { Err(FetchError::new(code, "unused")) })
        }
    }

    #[tokio::test]
    async fn newer_histogram_cuts_off_a_running_batch() {
        let source = Arc::new(GatedSource {
            gated: "aa",
            requested: Notify::new(),
            release: Notify::new(),
            fetched: Mutex::new(Vec::new()),
        });
        let mut layer: CountryLayer<GatedSource, GeometryOverlay> = CountryLayer::new(
            3,
            source.clone(),
            &OverlayConfig::default(),
            |_: f64| [0.0f32; 4],
        );
        layer.initialize(GeometryOverlay::default());

        let old = layer.set(histogram(&[("aa", 2), ("bb", 1)]));
        let newer = async {
            source.requested.notified().await;
            let report = layer.set(histogram(&[("cc", 1)])).await;
            source.release.notify_one();
            report
        };
        let (old, newer) = tokio::join!(old, newer);

        let old = old.expect("old batch ran");
        assert_eq!((old.rendered, old.skipped), (1, 1));
        assert!(old.superseded());
        assert_eq!(newer.expect("new batch ran").rendered, 1);

        assert_eq!(*source.fetched.lock(), vec!["aa", "cc"]);
        assert!(layer.loader().with_cache(|cache| cache.has("aa")));
        let sink = layer.sink().expect("sink").lock();
        assert_eq!(sink.codes(), vec!["cc", "aa"]);
    }

    #[tokio::test]
    async fn style_lookup_goes_through_secondary_code() {
        let layer = layer();
        layer.set(histogram(&[("aa", 8), ("bb", 2)])).await;

        assert_eq!(layer.feature_style("bbx").fill_color, [0.25, 0.0, 0.0, 1.0]);
        assert_eq!(layer.feature_style("AAX").fill_color, [1.0, 0.0, 0.0, 1.0]);
        assert_eq!(layer.feature_style("zz").fill_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(layer.hover_style().fill_color, [1.0, 1.0, 1.0, 1.0]);
    }

    #[tokio::test]
    async fn selecting_a_region_fetches_chart_data() {
        let layer = layer();
        assert_eq!(layer.select_region("AAX").await, None);

        layer.set(histogram(&[("aa", 1)])).await;
        let charts = layer.select_region("aax").await.expect("loaded");

        assert_eq!(charts.key, "aa");
        assert_eq!(charts.outliers, Some(json!({ "aa": [] })));
        assert_eq!(charts.date_histogram, None);
        assert_eq!(*layer.loader().source().outlier_limits.lock(), vec![10]);
    }

    #[tokio::test]
    async fn batch_waits_for_a_sink() {
        let mut layer: CountryLayer<Fixtures, GeometryOverlay> = CountryLayer::new(
            2,
            Arc::new(Fixtures::default()),
            &OverlayConfig::default(),
            |_: f64| [0.0f32; 4],
        );
        assert_eq!(layer.set(histogram(&[("aa", 1)])).await, None);

        layer.initialize(GeometryOverlay::default());
        let report = layer.flush().await.expect("pending batch");
        assert_eq!(report.rendered, 1);
    }

    #[test]
    fn country_count_rounds_and_reports_bounds() {
        let mut layer = layer();
        assert_eq!(layer.country_count(), 50);
        layer.set_country_count(12.6);
        assert_eq!(layer.country_count(), 13);
        assert_eq!((layer.country_count_min(), layer.country_count_max()), (5, 200));
    }
}
