use compute::{GeneratorEvent, ParticleBufferGenerator};
use formats::NodeSet;
use foundation::time::Clock;
use foundation::viewport::ViewportState;
use gpu::{
    ParticleBuffer, ParticleCommand, ParticleDevice, ParticleFrame, ParticleUniforms,
    TrafficSubset,
};
use runtime::epoch::Epoch;
use serde::{Deserialize, Serialize};
use streaming::ParticleSpec;
use tracing::{debug, warn};

use crate::config::{CountBounds, OverlayConfig, ZoomScale};
use crate::layer::{Layer, LayerId, OverlayLayer};

/// Visible count never drops below this share of the base count.
pub const MIN_BANDWIDTH_SCALE: f64 = 0.1;

/// Which slices of the particle population are drawn.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficFilter {
    Hidden,
    General,
    #[default]
    Both,
}

impl TrafficFilter {
    pub fn includes(self, subset: TrafficSubset) -> bool {
        match self {
            TrafficFilter::Both => true,
            TrafficFilter::Hidden => subset == TrafficSubset::Hidden,
            TrafficFilter::General => subset == TrafficSubset::General,
        }
    }
}

/// User-adjustable particle settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleSettings {
    pub speed: f64,
    pub path_offset: f64,
    pub opacity: f64,
    pub size_override: Option<f64>,
    pub scale_size_by_zoom: bool,
    pub scale_count_by_bandwidth: bool,
    pub min_bandwidth: f64,
    pub max_bandwidth: f64,
    pub current_bandwidth: f64,
    pub filter: TrafficFilter,
    /// Unscaled particle count; also the number of records generated.
    pub count: usize,
}

impl ParticleSettings {
    pub fn new(count: usize) -> Self {
        Self {
            speed: 1.0,
            path_offset: 1.0,
            opacity: 1.0,
            size_override: None,
            scale_size_by_zoom: false,
            scale_count_by_bandwidth: false,
            min_bandwidth: 0.0,
            max_bandwidth: 0.0,
            current_bandwidth: 0.0,
            filter: TrafficFilter::Both,
            count,
        }
    }
}

/// Offset/count pairs into the packed buffer: hidden records first.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Partition {
    pub hidden: u32,
    pub general: u32,
}

/// Per-frame inputs that do not come from settings.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct FrameInput {
    pub ready: bool,
    /// Records in the live buffer.
    pub records: usize,
    pub elapsed_ms: f64,
    pub zooming: bool,
}

/// Turns settings and view state into draw commands for one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ParticleRenderPipeline {
    pub settings: ParticleSettings,
    base_size: f64,
    base_speed_ms: f64,
    hidden_probability: f64,
    zoom_scale: ZoomScale,
    hidden_color: [f32; 4],
    general_color: [f32; 4],
}

impl ParticleRenderPipeline {
    pub fn new(config: &OverlayConfig) -> Self {
        Self {
            settings: ParticleSettings::new(config.particle_counts().default),
            base_size: config.particle_size,
            base_speed_ms: config.particle_base_speed_ms,
            hidden_probability: config.hidden_service_probability.clamp(0.0, 1.0),
            zoom_scale: config.particle_zoom_scale.clone(),
            hidden_color: config.particle_hidden_color,
            general_color: config.particle_general_color,
        }
    }

    pub fn effective_count(&self) -> f64 {
        let s = &self.settings;
        let base = s.count as f64;
        if !s.scale_count_by_bandwidth {
            return base;
        }
        let range = s.max_bandwidth - s.min_bandwidth;
        let scale = if range == 0.0 {
            1.0
        } else {
            (s.current_bandwidth - s.min_bandwidth) / range
        };
        base * scale.max(MIN_BANDWIDTH_SCALE)
    }

    pub fn effective_size(&self, zoom: f64) -> f64 {
        let size = self.settings.size_override.unwrap_or(self.base_size);
        if self.settings.scale_size_by_zoom {
            self.zoom_scale.scale(zoom, size)
        } else {
            size
        }
    }

    /// Splits the effective count, clamped to the `records` available.
    pub fn partition(&self, records: usize) -> Partition {
        let effective = self.effective_count().max(0.0);
        let hidden = (self.hidden_probability * effective).floor() as usize;
        let general = (effective.floor() as usize).saturating_sub(hidden);

        let hidden = hidden.min(records);
        let general = general.min(records - hidden);
        Partition {
            hidden: u32::try_from(hidden).unwrap_or(u32::MAX),
            general: u32::try_from(general).unwrap_or(u32::MAX),
        }
    }

    pub fn uniforms(&self, viewport: &ViewportState, elapsed_ms: f64) -> ParticleUniforms {
        ParticleUniforms {
            time_ms: elapsed_ms as f32,
            speed_factor: (self.base_speed_ms / self.settings.speed) as f32,
            offset_factor: self.settings.path_offset as f32,
            point_size: self.effective_size(viewport.zoom) as f32,
            opacity: self.settings.opacity as f32,
            min_x: viewport.min_x as f32,
            max_x: viewport.max_x as f32,
            _pad: 0.0,
        }
    }

    /// Commands for one frame, or `None` while no buffer is ready.
    pub fn compose(&self, viewport: &ViewportState, input: FrameInput) -> Option<ParticleFrame> {
        if !input.ready {
            return None;
        }

        let mut frame = ParticleFrame::default();
        if !input.zooming {
            frame.push(ParticleCommand::SetCanvasOrigin(viewport.origin));
        }
        frame.push(ParticleCommand::SetUniforms(
            self.uniforms(viewport, input.elapsed_ms),
        ));

        let Partition { hidden, general } = self.partition(input.records);
        let draws = [
            (TrafficSubset::Hidden, self.hidden_color, 0, hidden),
            (TrafficSubset::General, self.general_color, hidden, general),
        ];
        for (subset, color, offset, count) in draws {
            if count > 0 && self.settings.filter.includes(subset) {
                frame.push(ParticleCommand::Draw {
                    subset,
                    color,
                    offset,
                    count,
                });
            }
        }
        Some(frame)
    }
}

/// Host-provided resources for the particle layer.
pub struct ParticleResources<D, C> {
    pub device: D,
    pub clock: C,
}

/// New node population, optionally with the aggregate bandwidth sample.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeUpdate {
    pub nodes: NodeSet,
    pub bandwidth: Option<f64>,
}

/// Animated traffic between nodes.
pub struct ParticleLayer<D, C> {
    id: LayerId,
    pipeline: ParticleRenderPipeline,
    counts: CountBounds,
    capacity: usize,
    offset: f64,
    seed: Option<u64>,
    nodes: Option<NodeSet>,
    generator: Option<ParticleBufferGenerator<D, C>>,
}

impl<D: ParticleDevice, C: Clock> ParticleLayer<D, C> {
    pub fn new(id: u64, config: &OverlayConfig) -> Self {
        let counts = config.particle_counts();
        Self {
            id: LayerId(id),
            pipeline: ParticleRenderPipeline::new(config),
            counts,
            capacity: counts.max,
            offset: config.particle_offset,
            seed: None,
            nodes: None,
            generator: None,
        }
    }

    /// Seeds trajectory generation for reproducible buffers.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn pipeline(&self) -> &ParticleRenderPipeline {
        &self.pipeline
    }

    pub fn settings_mut(&mut self) -> &mut ParticleSettings {
        &mut self.pipeline.settings
    }

    pub fn generator(&self) -> Option<&ParticleBufferGenerator<D, C>> {
        self.generator.as_ref()
    }

    pub fn generator_mut(&mut self) -> Option<&mut ParticleBufferGenerator<D, C>> {
        self.generator.as_mut()
    }

    pub fn is_ready(&self) -> bool {
        self.generator.as_ref().is_some_and(|g| g.is_ready())
    }

    pub fn particle_count(&self) -> usize {
        self.pipeline.settings.count
    }

    pub fn particle_count_min(&self) -> usize {
        self.counts.min
    }

    pub fn particle_count_max(&self) -> usize {
        self.counts.max
    }

    /// Sets the unscaled count and regenerates for the current nodes.
    pub fn set_particle_count(&mut self, count: usize) -> Option<Epoch> {
        self.pipeline.settings.count = self.counts.clamp(count).min(self.capacity);
        self.regenerate()
    }

    pub fn begin_zoom(&mut self) {
        if let Some(g) = self.generator.as_mut() {
            g.begin_view_transition();
        }
    }

    pub fn end_zoom(&mut self) {
        if let Some(g) = self.generator.as_mut() {
            g.end_view_transition();
        }
    }

    /// Waits for the running generation to finish or fail.
    pub async fn wait_generated(&mut self) -> Option<GeneratorEvent> {
        let generator = self.generator.as_mut()?;
        while let Some(event) = generator.next_event().await {
            if event.is_terminal() {
                return Some(event);
            }
        }
        None
    }

    fn regenerate(&mut self) -> Option<Epoch> {
        let generator = self.generator.as_mut()?;
        let nodes = self.nodes.clone()?;
        let spec = ParticleSpec {
            offset: self.offset,
            count: self.pipeline.settings.count,
        };
        Some(generator.generate(nodes, spec))
    }
}

impl<D, C> Layer for ParticleLayer<D, C> {
    fn id(&self) -> LayerId {
        self.id
    }
}

impl<D: ParticleDevice, C: Clock> OverlayLayer for ParticleLayer<D, C> {
    type Resources = ParticleResources<D, C>;
    type Data = NodeUpdate;
    type Output = Option<ParticleFrame>;

    /// Allocates a buffer large enough for the maximum particle count.
    fn initialize(&mut self, resources: ParticleResources<D, C>) {
        let buffer = ParticleBuffer::new(resources.device, self.capacity);
        let mut generator = ParticleBufferGenerator::new(buffer, resources.clock);
        if let Some(seed) = self.seed {
            generator = generator.with_seed(seed);
        }
        self.generator = Some(generator);
        self.regenerate();
    }

    fn update_data(&mut self, update: NodeUpdate) {
        if let Some(bandwidth) = update.bandwidth {
            self.pipeline.settings.current_bandwidth = bandwidth;
        }
        self.nodes = Some(update.nodes);
        if self.regenerate().is_none() {
            debug!("particle layer not initialized; nodes kept for later");
        }
    }

    fn draw_frame(&mut self, viewport: &ViewportState) -> Option<ParticleFrame> {
        let generator = self.generator.as_mut()?;
        for event in generator.pump() {
            if let GeneratorEvent::Failed { epoch, message } = event {
                warn!(%epoch, %message, "keeping previous particle buffer");
            }
        }

        let buffer = generator.buffer();
        let elapsed_ms = buffer
            .replaced_at()
            .map_or(0.0, |t| generator.clock().now().millis_since(t));
        let input = FrameInput {
            ready: generator.is_ready(),
            records: buffer.len(),
            elapsed_ms,
            zooming: generator.is_view_transitioning(),
        };

        let frame = self.pipeline.compose(viewport, input)?;
        generator.buffer_mut().submit(&frame);
        Some(frame)
    }
}
