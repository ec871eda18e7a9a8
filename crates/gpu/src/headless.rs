use crate::buffer::{ParticleDevice, ParticleRecord};
use crate::renderer::ParticleUniforms;

#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    Allocate(usize),
    BufferData(usize),
    Uniforms(ParticleUniforms),
    Color([f32; 4]),
    DrawPoints { offset: u32, count: u32 },
    CanvasOrigin([f64; 2]),
}

/// Device without a GPU: keeps the uploaded records and logs every call.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    pub calls: Vec<DeviceCall>,
    pub records: Vec<ParticleRecord>,
}

impl RecordingDevice {
    pub fn draw_calls(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.calls.iter().filter_map(|c| match c {
            DeviceCall::DrawPoints { offset, count } => Some((*offset, *count)),
            _ => None,
        })
    }
}

impl ParticleDevice for RecordingDevice {
    fn allocate(&mut self, records: usize) {
        self.records.reserve(records);
        self.calls.push(DeviceCall::Allocate(records));
    }

    fn buffer_data(&mut self, records: &[ParticleRecord]) {
        self.records.clear();
        self.records.extend_from_slice(records);
        self.calls.push(DeviceCall::BufferData(records.len()));
    }

    fn set_uniforms(&mut self, uniforms: &ParticleUniforms) {
        self.calls.push(DeviceCall::Uniforms(*uniforms));
    }

    fn set_color(&mut self, color: [f32; 4]) {
        self.calls.push(DeviceCall::Color(color));
    }

    fn draw_points(&mut self, offset: u32, count: u32) {
        self.calls.push(DeviceCall::DrawPoints { offset, count });
    }

    fn set_canvas_origin(&mut self, origin: [f64; 2]) {
        self.calls.push(DeviceCall::CanvasOrigin(origin));
    }
}
