use foundation::viewport::ViewportState;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct LayerId(pub u64);

pub trait Layer {
    fn id(&self) -> LayerId;
}

/// Lifecycle hooks shared by the map overlays.
pub trait OverlayLayer: Layer {
    /// Draw resources handed over by the host when the layer is attached.
    type Resources;
    /// Replacement input, e.g. a histogram or a node snapshot.
    type Data;
    type Output;

    fn initialize(&mut self, resources: Self::Resources);

    fn update_data(&mut self, data: Self::Data);

    /// Called once per frame (or per view change) with the current viewport.
    fn draw_frame(&mut self, viewport: &ViewportState) -> Self::Output;
}
