//! Message types for the particle generation worker boundary.
//!
//! The host posts a single `start` request; the worker answers with zero or
//! more `progress` messages followed by exactly one `complete` (or `error`).
//! A terminated worker simply goes silent. Every message the consumer sees is
//! wrapped in an [`Envelope`] carrying the epoch of the request that produced
//! it, so output from a superseded worker can be dropped even if it arrives
//! after termination was requested.

use formats::NodeSet;
use runtime::epoch::Epoch;
use serde::{Deserialize, Serialize};

/// Parameters for one generation run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleSpec {
    /// Maximum perpendicular path offset, in normalized map units.
    pub offset: f64,
    /// Number of particle records to produce.
    pub count: usize,
}

/// Message from host to worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
    Start { spec: ParticleSpec, nodes: NodeSet },
}

/// Message from worker to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerMessage {
    /// Fraction of records generated so far, in `[0, 1]`.
    Progress { progress: f32 },

    /// Flat packed record buffer (8 floats per record).
    Complete { buffer: Vec<f32> },

    /// Generation failed; no buffer follows.
    Error { message: String },
}

impl WorkerMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WorkerMessage::Progress { .. })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    pub epoch: Epoch,
    pub message: T,
}

impl<T> Envelope<T> {
    pub fn new(epoch: Epoch, message: T) -> Self {
        Self { epoch, message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use formats::Node;
    use serde_json::json;

    #[test]
    fn start_request_wire_shape() {
        let req = WorkerRequest::Start {
            spec: ParticleSpec {
                offset: 0.05,
                count: 1000,
            },
            nodes: NodeSet::new(vec![Node::new(10.0, 20.0, 3.0)]),
        };
        let value = serde_json::to_value(&req).expect("serialize");
        assert_eq!(
            value,
            json!({
                "type": "start",
                "spec": { "offset": 0.05, "count": 1000 },
                "nodes": [{ "lat": 10.0, "lng": 20.0, "bandwidth": 3.0 }]
            })
        );
    }

    #[test]
    fn worker_messages_are_tagged() {
        let progress: WorkerMessage =
            serde_json::from_value(json!({ "type": "progress", "progress": 0.25 })).expect("parse");
        assert_eq!(progress, WorkerMessage::Progress { progress: 0.25 });
        assert!(!progress.is_terminal());

        let complete: WorkerMessage =
            serde_json::from_value(json!({ "type": "complete", "buffer": [1.0, 2.0] }))
                .expect("parse");
        assert!(complete.is_terminal());
    }
}
