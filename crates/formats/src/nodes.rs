use foundation::math::{Vec2, lng_lat_to_normalized};
use serde::{Deserialize, Serialize};

/// A relay position with the bandwidth it advertises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub bandwidth: f64,
}

impl Node {
    pub fn new(lat: f64, lng: f64, bandwidth: f64) -> Self {
        Self {
            id: None,
            lat,
            lng,
            bandwidth,
        }
    }

    /// Position in normalized web-mercator space.
    pub fn position(&self) -> Vec2 {
        lng_lat_to_normalized(self.lng, self.lat)
    }
}

/// The full node population for one snapshot; replaced wholesale on update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeSet {
    pub nodes: Vec<Node>,
}

impl NodeSet {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn total_bandwidth(&self) -> f64 {
        self.nodes.iter().map(|n| n.bandwidth.max(0.0)).sum()
    }
}

/// Node file as written by the aggregation job: nodes plus the aggregate
/// bandwidth sample for the same date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    pub nodes: NodeSet,
    #[serde(default)]
    pub bandwidth: Option<f64>,
}

impl NodeSnapshot {
    pub fn from_json_str(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeSet, NodeSnapshot};

    #[test]
    fn parses_snapshot_with_defaults() {
        let snap = NodeSnapshot::from_json_str(
            r#"{"nodes":[{"lat":52.5,"lng":13.4,"bandwidth":2.5},{"id":"b","lat":0,"lng":0}]}"#,
        )
        .expect("parse");
        assert_eq!(snap.nodes.len(), 2);
        assert_eq!(snap.bandwidth, None);
        assert_eq!(snap.nodes.nodes[1].id.as_deref(), Some("b"));
        assert_eq!(snap.nodes.nodes[1].bandwidth, 0.0);
        assert_eq!(snap.nodes.total_bandwidth(), 2.5);
    }

    #[test]
    fn projects_into_unit_square() {
        let snap = NodeSnapshot::from_json_str(r#"{"nodes":[{"lat":0,"lng":90}],"bandwidth":7}"#)
            .expect("parse");
        let p = snap.nodes.nodes[0].position();
        assert_eq!(p.x, 0.75);
        assert!((p.y - 0.5).abs() < 1e-12);
        assert_eq!(snap.bandwidth, Some(7.0));
        assert!(NodeSet::default().is_empty());
    }
}
