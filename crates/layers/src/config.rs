use serde::{Deserialize, Serialize};

/// Point-size multiplier that applies from `zoom` upwards.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoomStep {
    pub zoom: f64,
    pub factor: f64,
}

/// Stepwise zoom-to-size scaling for particles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZoomScale {
    pub steps: Vec<ZoomStep>,
}

impl ZoomScale {
    /// Size for `zoom`, using the highest step at or below it. Zooms below the
    /// first step use the first step's factor.
    pub fn scale(&self, zoom: f64, base_size: f64) -> f64 {
        let factor = self
            .steps
            .iter()
            .take_while(|s| s.zoom <= zoom)
            .last()
            .or(self.steps.first())
            .map_or(1.0, |s| s.factor);
        base_size * factor
    }
}

impl Default for ZoomScale {
    fn default() -> Self {
        let step = |zoom, factor| ZoomStep { zoom, factor };
        Self {
            steps: vec![step(0.0, 1.0), step(4.0, 1.5), step(6.0, 2.0), step(8.0, 3.0)],
        }
    }
}

/// Client configuration for both overlays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayConfig {
    pub particle_count: usize,
    pub particle_count_min: usize,
    pub particle_count_max: usize,
    pub particle_mobile_factor: f64,
    /// Maximum perpendicular path offset, in normalized map units.
    pub particle_offset: f64,
    /// Animation period at speed 1.0.
    pub particle_base_speed_ms: f64,
    pub particle_size: f64,
    pub particle_zoom_scale: ZoomScale,
    pub hidden_service_probability: f64,
    pub particle_hidden_color: [f32; 4],
    pub particle_general_color: [f32; 4],

    pub country_count: usize,
    pub country_count_min: usize,
    pub country_count_max: usize,
    pub country_mobile_factor: f64,
    pub countries_color_ramp: Vec<String>,
    pub outlier_count: usize,
    pub outlier_count_mobile: usize,

    pub is_mobile: bool,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            particle_count: 150_000,
            particle_count_min: 10_000,
            particle_count_max: 500_000,
            particle_mobile_factor: 0.25,
            particle_offset: 0.01,
            particle_base_speed_ms: 60_000.0,
            particle_size: 1.0,
            particle_zoom_scale: ZoomScale::default(),
            hidden_service_probability: 0.05,
            particle_hidden_color: [1.0, 0.35, 0.35, 1.0],
            particle_general_color: [0.35, 0.65, 1.0, 1.0],

            country_count: 50,
            country_count_min: 5,
            country_count_max: 200,
            country_mobile_factor: 0.5,
            countries_color_ramp: vec!["#0b1f3a".to_string(), "#f2d16b".to_string()],
            outlier_count: 10,
            outlier_count_mobile: 5,

            is_mobile: false,
        }
    }
}

/// Default, min and max of a count setting, after device scaling.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CountBounds {
    pub default: usize,
    pub min: usize,
    pub max: usize,
}

impl CountBounds {
    pub fn clamp(&self, count: usize) -> usize {
        count.clamp(self.min, self.max.max(self.min))
    }
}

impl OverlayConfig {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    fn scaled(&self, count: usize, factor: f64) -> usize {
        if self.is_mobile {
            (count as f64 * factor).round() as usize
        } else {
            count
        }
    }

    pub fn particle_counts(&self) -> CountBounds {
        let f = self.particle_mobile_factor;
        CountBounds {
            default: self.scaled(self.particle_count, f),
            min: self.scaled(self.particle_count_min, f),
            max: self.scaled(self.particle_count_max, f),
        }
    }

    pub fn country_counts(&self) -> CountBounds {
        let f = self.country_mobile_factor;
        CountBounds {
            default: self.scaled(self.country_count, f),
            min: self.scaled(self.country_count_min, f),
            max: self.scaled(self.country_count_max, f),
        }
    }

    /// Rows requested for the outlier chart.
    pub fn outlier_limit(&self) -> usize {
        if self.is_mobile {
            self.outlier_count_mobile
        } else {
            self.outlier_count
        }
    }
}
