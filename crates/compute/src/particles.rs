//! Trajectory generation: the body of the particle worker.

use std::sync::atomic::{AtomicBool, Ordering};

use formats::NodeSet;
use foundation::math::Vec2;
use gpu::ParticleRecord;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use streaming::ParticleSpec;

/// Progress is reported at most once per this fraction of records.
const PROGRESS_STEP: f64 = 0.01;

/// Waypoint times are kept strictly inside the path and strictly ordered.
const T0_RANGE: std::ops::Range<f64> = 0.1..0.45;
const T1_RANGE: std::ops::Range<f64> = 0.55..0.9;

#[derive(Debug, Clone, PartialEq)]
pub enum GenerateError {
    NonFinitePosition { index: usize },
    /// Negative or non-finite bandwidth.
    InvalidBandwidth { index: usize, bandwidth: f64 },
    InvalidOffset(f64),
}

impl std::fmt::Display for GenerateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenerateError::NonFinitePosition { index } => {
                write!(f, "node {index} has a non-finite position")
            }
            GenerateError::InvalidBandwidth { index, bandwidth } => {
                write!(f, "node {index} has invalid bandwidth {bandwidth}")
            }
            GenerateError::InvalidOffset(offset) => write!(f, "invalid path offset {offset}"),
        }
    }
}

impl std::error::Error for GenerateError {}

/// Node positions in normalized web-mercator space paired with their weights.
pub fn project_nodes(nodes: &NodeSet) -> Result<Vec<(Vec2, f64)>, GenerateError> {
    nodes
        .nodes
        .iter()
        .enumerate()
        .map(|(index, node)| {
            if !node.bandwidth.is_finite() || node.bandwidth < 0.0 {
                return Err(GenerateError::InvalidBandwidth {
                    index,
                    bandwidth: node.bandwidth,
                });
            }
            let position = node.position();
            if !node.lat.is_finite() || !position.is_finite() {
                return Err(GenerateError::NonFinitePosition { index });
            }
            Ok((position, node.bandwidth))
        })
        .collect()
}

/// Generates `spec.count` trajectories between bandwidth-weighted node pairs.
///
/// Returns `Ok(None)` if `cancel` was raised before the last record. An empty
/// node set, or one without any bandwidth, yields an empty buffer.
pub fn generate_trajectories<R, P>(
    nodes: &NodeSet,
    spec: ParticleSpec,
    rng: &mut R,
    cancel: &AtomicBool,
    mut progress: P,
) -> Result<Option<Vec<ParticleRecord>>, GenerateError>
where
    R: Rng,
    P: FnMut(f32),
{
    if !spec.offset.is_finite() || spec.offset < 0.0 {
        return Err(GenerateError::InvalidOffset(spec.offset));
    }
    let projected = project_nodes(nodes)?;
    let Ok(weighted) = WeightedIndex::new(projected.iter().map(|(_, w)| *w)) else {
        return Ok(Some(Vec::new()));
    };
    let weighted_nodes = projected.iter().filter(|(_, w)| *w > 0.0).count();

    let step = ((spec.count as f64 * PROGRESS_STEP).ceil() as usize).max(1);
    let mut records = Vec::with_capacity(spec.count);
    for i in 0..spec.count {
        if cancel.load(Ordering::Relaxed) {
            return Ok(None);
        }

        let source = weighted.sample(rng);
        let target = if weighted_nodes > 1 {
            loop {
                let candidate = weighted.sample(rng);
                if candidate != source {
                    break candidate;
                }
            }
        } else if projected.len() > 1 {
            // Single weighted node: pair it with any other node.
            let other = rng.gen_range(0..projected.len() - 1);
            if other >= source { other + 1 } else { other }
        } else {
            source
        };

        let start = projected[source].0;
        let end = projected[target].0;
        records.push(ParticleRecord {
            start: [start.x as f32, start.y as f32],
            end: [end.x as f32, end.y as f32],
            t0: rng.gen_range(T0_RANGE) as f32,
            offset0: rng.gen_range(-spec.offset..=spec.offset) as f32,
            t1: rng.gen_range(T1_RANGE) as f32,
            offset1: rng.gen_range(-spec.offset..=spec.offset) as f32,
        });

        let done = i + 1;
        if done % step == 0 || done == spec.count {
            progress(done as f32 / spec.count as f32);
        }
    }
    Ok(Some(records))
}
