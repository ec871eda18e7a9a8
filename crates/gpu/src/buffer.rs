use foundation::time::Time;

use crate::renderer::{ParticleCommand, ParticleFrame, ParticleUniforms};

/// One animated trajectory: two endpoints plus two interpolation waypoints,
/// each a `(t, perpendicular offset)` pair.
///
/// Layout matches the vertex attributes the particle shader binds:
/// - location 0 (offset 0): `start.x, start.y, end.x, end.y`
/// - location 1 (offset 16): `t0, offset0, t1, offset1`
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleRecord {
    pub start: [f32; 2],
    pub end: [f32; 2],
    pub t0: f32,
    pub offset0: f32,
    pub t1: f32,
    pub offset1: f32,
}

pub const FLOATS_PER_RECORD: usize = 8;
pub const RECORD_STRIDE_BYTES: u64 = 32;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    /// Component count (f32).
    pub size: u32,
    pub offset: u64,
}

pub const PARTICLE_ATTRIBUTES: [VertexAttribute; 2] = [
    VertexAttribute {
        location: 0,
        size: 4,
        offset: 0,
    },
    VertexAttribute {
        location: 1,
        size: 4,
        offset: 16,
    },
];

/// Draw-capable vertex buffer plus shader state, provided by the host's GPU
/// context. Shader compilation and context setup happen behind this trait.
pub trait ParticleDevice {
    /// Reserves room for `records` particle records.
    fn allocate(&mut self, records: usize);

    fn buffer_data(&mut self, records: &[ParticleRecord]);

    fn set_uniforms(&mut self, uniforms: &ParticleUniforms);

    fn set_color(&mut self, color: [f32; 4]);

    /// Draws `count` records starting at record `offset` as points.
    fn draw_points(&mut self, offset: u32, count: u32);

    fn set_canvas_origin(&mut self, origin: [f64; 2]);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    /// The flat buffer does not hold a whole number of records.
    Misaligned { floats: usize },
    CapacityExceeded { records: usize, capacity: usize },
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Misaligned { floats } => write!(
                f,
                "buffer of {floats} floats is not a multiple of {FLOATS_PER_RECORD}"
            ),
            BufferError::CapacityExceeded { records, capacity } => {
                write!(f, "{records} records exceed buffer capacity {capacity}")
            }
        }
    }
}

impl std::error::Error for BufferError {}

/// GPU-resident particle records, replaced wholesale on every generation.
#[derive(Debug)]
pub struct ParticleBuffer<D> {
    device: D,
    capacity: usize,
    len: usize,
    replaced_at: Option<Time>,
}

impl<D: ParticleDevice> ParticleBuffer<D> {
    pub fn new(mut device: D, capacity: usize) -> Self {
        device.allocate(capacity);
        Self {
            device,
            capacity,
            len: 0,
            replaced_at: None,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Time of the last successful replacement; the animation time basis.
    pub fn replaced_at(&self) -> Option<Time> {
        self.replaced_at
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    /// Uploads a flat worker buffer, replacing the previous contents.
    ///
    /// On error nothing is uploaded and the previous records stay live.
    pub fn replace(&mut self, flat: &[f32], now: Time) -> Result<usize, BufferError> {
        let records: &[ParticleRecord] = bytemuck::try_cast_slice(flat)
            .map_err(|_| BufferError::Misaligned { floats: flat.len() })?;
        if records.len() > self.capacity {
            return Err(BufferError::CapacityExceeded {
                records: records.len(),
                capacity: self.capacity,
            });
        }

        self.device.buffer_data(records);
        self.len = records.len();
        self.replaced_at = Some(now);
        Ok(self.len)
    }

    /// Replays a composed frame against the device.
    pub fn submit(&mut self, frame: &ParticleFrame) {
        for command in &frame.commands {
            match command {
                ParticleCommand::SetCanvasOrigin(origin) => self.device.set_canvas_origin(*origin),
                ParticleCommand::SetUniforms(uniforms) => self.device.set_uniforms(uniforms),
                ParticleCommand::Draw {
                    color,
                    offset,
                    count,
                    ..
                } => {
                    debug_assert!((*offset as usize + *count as usize) <= self.len);
                    self.device.set_color(*color);
                    self.device.draw_points(*offset, *count);
                }
            }
        }
    }
}
