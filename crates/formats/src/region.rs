use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

/// Closed polygon boundary, first/last point may repeat.
pub type Ring = Vec<GeoPoint>;

#[derive(Debug, Clone, PartialEq)]
pub enum RegionGeometry {
    Polygon(Vec<Ring>),
    MultiPolygon(Vec<Vec<Ring>>),
    /// Anything else is carried through untouched.
    Other { kind: String, raw: Value },
}

impl RegionGeometry {
    pub fn kind(&self) -> &str {
        match self {
            RegionGeometry::Polygon(_) => "Polygon",
            RegionGeometry::MultiPolygon(_) => "MultiPolygon",
            RegionGeometry::Other { kind, .. } => kind,
        }
    }

    pub fn ring_count(&self) -> usize {
        match self {
            RegionGeometry::Polygon(rings) => rings.len(),
            RegionGeometry::MultiPolygon(polys) => polys.iter().map(Vec::len).sum(),
            RegionGeometry::Other { .. } => 0,
        }
    }

    pub fn rings(&self) -> Box<dyn Iterator<Item = &Ring> + '_> {
        match self {
            RegionGeometry::Polygon(rings) => Box::new(rings.iter()),
            RegionGeometry::MultiPolygon(polys) => Box::new(polys.iter().flatten()),
            RegionGeometry::Other { .. } => Box::new(std::iter::empty()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegionPart {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    pub geometry: RegionGeometry,
}

/// Boundary geometry for one region, as served by the geometry endpoint.
///
/// The payload is a GeoJSON `FeatureCollection` with an extra top-level
/// `cc_3` member carrying the region's alpha-3 code.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionFeature {
    pub alt_code: Option<String>,
    pub parts: Vec<RegionPart>,
}

#[derive(Debug)]
pub enum FeatureError {
    NotAFeatureCollection,
    InvalidFeature { index: usize, reason: String },
}

impl std::fmt::Display for FeatureError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeatureError::NotAFeatureCollection => {
                write!(f, "expected GeoJSON FeatureCollection")
            }
            FeatureError::InvalidFeature { index, reason } => {
                write!(f, "invalid feature at index {index}: {reason}")
            }
        }
    }
}

impl std::error::Error for FeatureError {}

impl RegionFeature {
    pub fn new(alt_code: impl Into<String>, geometry: RegionGeometry) -> Self {
        Self {
            alt_code: Some(alt_code.into()),
            parts: vec![RegionPart {
                id: None,
                properties: Map::new(),
                geometry,
            }],
        }
    }

    /// Alpha-3 code of the region, falling back to the first part's `id` or
    /// `ISO_A3` property when the collection carries no `cc_3`.
    pub fn secondary_code(&self) -> Option<&str> {
        if let Some(code) = self.alt_code.as_deref() {
            return Some(code);
        }
        let first = self.parts.first()?;
        first.id.as_deref().or_else(|| {
            first
                .properties
                .get("ISO_A3")
                .and_then(|v| v.as_str())
        })
    }

    pub fn ring_count(&self) -> usize {
        self.parts.iter().map(|p| p.geometry.ring_count()).sum()
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, FeatureError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| FeatureError::InvalidFeature {
                index: 0,
                reason: format!("JSON parse error: {e}"),
            })?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, FeatureError> {
        let obj = value.as_object().ok_or(FeatureError::NotAFeatureCollection)?;
        if let Some(ty) = obj.get("type")
            && ty.as_str() != Some("FeatureCollection")
        {
            return Err(FeatureError::NotAFeatureCollection);
        }

        let features_val = obj
            .get("features")
            .and_then(|v| v.as_array())
            .ok_or(FeatureError::NotAFeatureCollection)?;

        let alt_code = obj.get("cc_3").and_then(|v| v.as_str()).map(str::to_string);

        let mut parts = Vec::with_capacity(features_val.len());
        for (index, feat_val) in features_val.iter().enumerate() {
            let feat_obj = feat_val.as_object().ok_or(FeatureError::InvalidFeature {
                index,
                reason: "feature must be an object".to_string(),
            })?;

            let id = match feat_obj.get("id") {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Number(n)) => Some(n.to_string()),
                _ => None,
            };

            let properties = feat_obj
                .get("properties")
                .and_then(|v| v.as_object())
                .cloned()
                .unwrap_or_default();

            let geometry_val = feat_obj.get("geometry").unwrap_or(&Value::Null);
            let geometry = parse_geometry(geometry_val)
                .map_err(|reason| FeatureError::InvalidFeature { index, reason })?;

            parts.push(RegionPart {
                id,
                properties,
                geometry,
            });
        }

        Ok(Self { alt_code, parts })
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );
        if let Some(code) = &self.alt_code {
            root.insert("cc_3".to_string(), Value::String(code.clone()));
        }

        let features = self
            .parts
            .iter()
            .map(|part| {
                let mut fobj = Map::new();
                fobj.insert("type".to_string(), Value::String("Feature".to_string()));
                if let Some(id) = &part.id {
                    fobj.insert("id".to_string(), Value::String(id.clone()));
                }
                fobj.insert(
                    "properties".to_string(),
                    Value::Object(part.properties.clone()),
                );
                fobj.insert(
                    "geometry".to_string(),
                    geometry_to_geojson_value(&part.geometry),
                );
                Value::Object(fobj)
            })
            .collect();

        root.insert("features".to_string(), Value::Array(features));
        Value::Object(root)
    }
}

fn geometry_to_geojson_value(geom: &RegionGeometry) -> Value {
    let coords = match geom {
        RegionGeometry::Polygon(rings) => rings_to_value(rings),
        RegionGeometry::MultiPolygon(polys) => {
            Value::Array(polys.iter().map(|poly| rings_to_value(poly)).collect())
        }
        RegionGeometry::Other { raw, .. } => return raw.clone(),
    };

    let mut obj = Map::new();
    obj.insert("type".to_string(), Value::String(geom.kind().to_string()));
    obj.insert("coordinates".to_string(), coords);
    Value::Object(obj)
}

fn rings_to_value(rings: &[Ring]) -> Value {
    Value::Array(
        rings
            .iter()
            .map(|ring| {
                Value::Array(
                    ring.iter()
                        .map(|p| Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)]))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn parse_geometry(value: &Value) -> Result<RegionGeometry, String> {
    let Some(obj) = value.as_object() else {
        return Ok(RegionGeometry::Other {
            kind: "null".to_string(),
            raw: value.clone(),
        });
    };
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    match ty {
        "Polygon" | "MultiPolygon" => {
            let coords = obj
                .get("coordinates")
                .ok_or("geometry missing coordinates".to_string())?;
            if ty == "Polygon" {
                Ok(RegionGeometry::Polygon(parse_polygon(coords)?))
            } else {
                Ok(RegionGeometry::MultiPolygon(parse_multi_polygon(coords)?))
            }
        }
        other => Ok(RegionGeometry::Other {
            kind: other.to_string(),
            raw: value.clone(),
        }),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("position must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("position must have [lon, lat]".to_string());
    }
    let lon = arr[0].as_f64().ok_or("lon must be a number".to_string())?;
    let lat = arr[1].as_f64().ok_or("lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_ring(coords: &Value) -> Result<Ring, String> {
    let arr = coords
        .as_array()
        .ok_or("ring must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_polygon(coords: &Value) -> Result<Vec<Ring>, String> {
    let rings = coords
        .as_array()
        .ok_or("Polygon coordinates must be an array of rings".to_string())?;
    rings.iter().map(parse_ring).collect()
}

fn parse_multi_polygon(coords: &Value) -> Result<Vec<Vec<Ring>>, String> {
    let polys = coords
        .as_array()
        .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
    polys.iter().map(parse_polygon).collect()
}

#[cfg(test)]
mod tests {
    use super::{FeatureError, GeoPoint, RegionFeature, RegionGeometry};
    use serde_json::json;

    fn norway() -> serde_json::Value {
        json!({
            "type": "FeatureCollection",
            "cc_3": "NOR",
            "features": [{
                "type": "Feature",
                "id": "NOR",
                "properties": { "name": "Norway" },
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [
                        [[[5.0, 58.0], [31.0, 70.0], [5.0, 70.0], [5.0, 58.0]]],
                        [[[15.0, 77.0], [25.0, 80.0], [15.0, 80.0], [15.0, 77.0]]]
                    ]
                }
            }]
        })
    }

    #[test]
    fn parses_multipolygon_collection() {
        let feature = RegionFeature::from_geojson_value(&norway()).expect("parse");
        assert_eq!(feature.secondary_code(), Some("NOR"));
        assert_eq!(feature.parts.len(), 1);
        assert_eq!(feature.ring_count(), 2);
        let RegionGeometry::MultiPolygon(polys) = &feature.parts[0].geometry else {
            panic!("expected MultiPolygon");
        };
        assert_eq!(polys[0][0][1], GeoPoint::new(31.0, 70.0));
    }

    #[test]
    fn keeps_unsupported_geometry_verbatim() {
        let value = json!({
            "features": [{
                "type": "Feature",
                "properties": { "ISO_A3": "VAT" },
                "geometry": { "type": "Point", "coordinates": [12.45, 41.9] }
            }]
        });
        let feature = RegionFeature::from_geojson_value(&value).expect("parse");
        assert_eq!(feature.secondary_code(), Some("VAT"));
        assert_eq!(feature.parts[0].geometry.kind(), "Point");

        let out = feature.to_geojson_value();
        assert_eq!(
            out["features"][0]["geometry"],
            json!({ "type": "Point", "coordinates": [12.45, 41.9] })
        );
    }

    #[test]
    fn empty_collection_is_valid() {
        let feature =
            RegionFeature::from_geojson_str(r#"{"type":"FeatureCollection","features":[]}"#)
                .expect("parse");
        assert!(feature.parts.is_empty());
        assert_eq!(feature.secondary_code(), None);
    }

    #[test]
    fn rejects_malformed_rings() {
        let value = json!({
            "type": "FeatureCollection",
            "features": [{ "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[[1.0]]] } }]
        });
        let err = RegionFeature::from_geojson_value(&value).unwrap_err();
        assert!(matches!(err, FeatureError::InvalidFeature { index: 0, .. }));

        let err = RegionFeature::from_geojson_value(&json!({ "type": "Feature" })).unwrap_err();
        assert!(matches!(err, FeatureError::NotAFeatureCollection));
    }

    #[test]
    fn emits_what_it_parsed() {
        let feature = RegionFeature::from_geojson_value(&norway()).expect("parse");
        let again = RegionFeature::from_geojson_value(&feature.to_geojson_value()).expect("reparse");
        assert_eq!(feature, again);
    }
}
