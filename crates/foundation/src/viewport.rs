use crate::bounds::Aabb2;
use crate::math::normalized_x_to_lng;

/// Edge length of a zoom-0 world in map pixels.
pub const WORLD_TILE_SIZE: f64 = 256.0;

/// Read access to the interactive map the overlay is attached to.
pub trait MapView {
    /// Visible area in map pixel space at the current zoom.
    fn pixel_bounds(&self) -> Aabb2;

    fn zoom(&self) -> f64;

    /// Layer-space position of the container's top-left corner, used to keep
    /// an overlay canvas glued to the map while panning.
    fn container_origin(&self) -> [f64; 2] {
        [0.0, 0.0]
    }
}

/// Derived view parameters consumed by geometry wrapping and particle scaling.
///
/// `min_x`/`max_x` are normalized X values: `lng / 360 + 0.5`, continuing past
/// `[0, 1)` when the map has been scrolled across the antimeridian.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ViewportState {
    pub min_x: f64,
    pub max_x: f64,
    pub zoom: f64,
    pub origin: [f64; 2],
}

impl ViewportState {
    pub fn new(min_x: f64, max_x: f64, zoom: f64) -> Self {
        Self {
            min_x,
            max_x,
            zoom,
            origin: [0.0, 0.0],
        }
    }

    pub fn from_pixel_bounds(bounds: Aabb2, zoom: f64) -> Self {
        let dim = world_dim(zoom);
        Self::new(bounds.min[0] / dim, bounds.max[0] / dim, zoom)
    }

    pub fn from_view(view: &impl MapView) -> Self {
        Self {
            origin: view.container_origin(),
            ..Self::from_pixel_bounds(view.pixel_bounds(), view.zoom())
        }
    }

    /// Longitude of the left edge of the visible window.
    pub fn min_lng(&self) -> f64 {
        normalized_x_to_lng(self.min_x)
    }

    /// Longitude of the left edge of the world copy the window starts in.
    pub fn left_page_min_lng(&self) -> f64 {
        normalized_x_to_lng(self.min_x.floor())
    }
}

/// Map pixel width of one world copy at `zoom`.
pub fn world_dim(zoom: f64) -> f64 {
    2f64.powf(zoom) * WORLD_TILE_SIZE
}
