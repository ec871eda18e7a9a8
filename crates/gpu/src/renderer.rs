/// Per-frame shader parameters for the particle pass.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Default, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ParticleUniforms {
    /// Milliseconds since the record buffer was last replaced.
    pub time_ms: f32,
    /// Base animation period divided by the speed setting.
    pub speed_factor: f32,
    pub offset_factor: f32,
    pub point_size: f32,
    pub opacity: f32,
    /// Visible normalized-X window, for antimeridian wrapping in the shader.
    pub min_x: f32,
    pub max_x: f32,
    pub _pad: f32,
}

/// The two disjoint slices of the particle population.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum TrafficSubset {
    Hidden,
    General,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum ParticleCommand {
    SetCanvasOrigin([f64; 2]),
    SetUniforms(ParticleUniforms),
    /// Partitioned draw into the packed buffer; no records are copied.
    Draw {
        subset: TrafficSubset,
        color: [f32; 4],
        offset: u32,
        count: u32,
    },
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ParticleFrame {
    pub commands: Vec<ParticleCommand>,
}

impl ParticleFrame {
    pub fn push(&mut self, command: ParticleCommand) {
        self.commands.push(command);
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn draws(&self) -> impl Iterator<Item = (TrafficSubset, u32, u32)> + '_ {
        self.commands.iter().filter_map(|c| match c {
            ParticleCommand::Draw {
                subset,
                offset,
                count,
                ..
            } => Some((*subset, *offset, *count)),
            _ => None,
        })
    }

    pub fn uniforms(&self) -> Option<&ParticleUniforms> {
        self.commands.iter().find_map(|c| match c {
            ParticleCommand::SetUniforms(u) => Some(u),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ParticleCommand, ParticleFrame, ParticleUniforms, TrafficSubset};
    use crate::buffer::ParticleBuffer;
    use crate::headless::{DeviceCall, RecordingDevice};
    use foundation::time::Time;

    #[test]
    fn uniforms_are_tightly_packed() {
        assert_eq!(std::mem::size_of::<ParticleUniforms>(), 32);
        let u = ParticleUniforms {
            time_ms: 1.0,
            ..ParticleUniforms::default()
        };
        assert_eq!(bytemuck::bytes_of(&u).len(), 32);
    }

    #[test]
    fn submit_replays_commands_in_order() {
        let mut buffer = ParticleBuffer::new(RecordingDevice::default(), 8);
        buffer.replace(&[0.0; 64], Time(0.0)).expect("fits");

        let mut frame = ParticleFrame::default();
        frame.push(ParticleCommand::SetCanvasOrigin([3.0, 4.0]));
        frame.push(ParticleCommand::SetUniforms(ParticleUniforms::default()));
        frame.push(ParticleCommand::Draw {
            subset: TrafficSubset::Hidden,
            color: [1.0, 0.0, 0.0, 1.0],
            offset: 0,
            count: 2,
        });
        frame.push(ParticleCommand::Draw {
            subset: TrafficSubset::General,
            color: [0.0, 0.0, 1.0, 1.0],
            offset: 2,
            count: 6,
        });
        buffer.submit(&frame);

        assert_eq!(
            frame.draws().collect::<Vec<_>>(),
            vec![(TrafficSubset::Hidden, 0, 2), (TrafficSubset::General, 2, 6)]
        );
        assert_eq!(
            &buffer.device().calls[2..],
            &[
                DeviceCall::CanvasOrigin([3.0, 4.0]),
                DeviceCall::Uniforms(ParticleUniforms::default()),
                DeviceCall::Color([1.0, 0.0, 0.0, 1.0]),
                DeviceCall::DrawPoints { offset: 0, count: 2 },
                DeviceCall::Color([0.0, 0.0, 1.0, 1.0]),
                DeviceCall::DrawPoints { offset: 2, count: 6 },
            ]
        );
    }
}
