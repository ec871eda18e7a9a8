use formats::{GeoPoint, RegionFeature, RegionGeometry, Ring};
use foundation::viewport::ViewportState;
use tracing::warn;

/// Shifts polygon longitudes so a region draws next to the visible window,
/// however many times the view has wrapped past ±180°.
///
/// Each ring is shifted on its own, by a whole number of worlds.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeometryTranslator {
    left_page_min_lng: f64,
    min_lng: f64,
}

impl GeometryTranslator {
    pub fn new(left_page_min_lng: f64, min_lng: f64) -> Self {
        Self {
            left_page_min_lng,
            min_lng,
        }
    }

    pub fn for_viewport(viewport: &ViewportState) -> Self {
        Self::new(viewport.left_page_min_lng(), viewport.min_lng())
    }

    pub fn min_lng(&self) -> f64 {
        self.min_lng
    }

    /// Longitude offset for `ring`, or `None` for an empty ring.
    pub fn ring_offset(&self, ring: &[GeoPoint]) -> Option<f64> {
        let max_x = ring
            .iter()
            .map(|p| p.lon_deg)
            .fold(None, |acc: Option<f64>, x| Some(acc.map_or(x, |m| m.max(x))))?;

        let mut offset = self.left_page_min_lng + 180.0;
        if max_x + offset < self.min_lng {
            offset += 360.0;
        }
        Some(offset)
    }

    pub fn translate_ring(&self, ring: &mut Ring) {
        let Some(offset) = self.ring_offset(ring) else {
            return;
        };
        for p in ring.iter_mut() {
            p.lon_deg += offset;
        }
    }

    /// Translates polygon geometry in place. Returns `false`, leaving the
    /// geometry untouched, for any other geometry kind.
    pub fn translate_geometry(&self, geometry: &mut RegionGeometry) -> bool {
        match geometry {
            RegionGeometry::Polygon(rings) => {
                rings.iter_mut().for_each(|r| self.translate_ring(r));
                true
            }
            RegionGeometry::MultiPolygon(polys) => {
                polys
                    .iter_mut()
                    .flatten()
                    .for_each(|r| self.translate_ring(r));
                true
            }
            RegionGeometry::Other { .. } => false,
        }
    }

    /// Returns a translated copy of `feature`; the input is never modified.
    pub fn translate_region(&self, feature: &RegionFeature) -> RegionFeature {
        let mut out = feature.clone();
        for part in &mut out.parts {
            if !self.translate_geometry(&mut part.geometry) {
                warn!(
                    code = feature.secondary_code().unwrap_or("?"),
                    kind = part.geometry.kind(),
                    "unsupported region geometry left untranslated"
                );
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use formats::{GeoPoint, RegionFeature, RegionGeometry, Ring};
    use foundation::viewport::ViewportState;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::GeometryTranslator;

    fn ring(lngs: &[f64]) -> Ring {
        lngs.iter().map(|&x| GeoPoint::new(x, 10.0)).collect()
    }

    fn xs(ring: &Ring) -> Vec<f64> {
        ring.iter().map(|p| p.lon_deg).collect()
    }

    fn translator(min_x: f64) -> GeometryTranslator {
        GeometryTranslator::for_viewport(&ViewportState::new(min_x, min_x + 0.5, 3.0))
    }

    #[test]
    fn unwrapped_view_leaves_rings_in_place() {
        let t = translator(0.25);
        let mut r = ring(&[10.0, 20.0, 15.0]);
        t.translate_ring(&mut r);
        assert_eq!(xs(&r), vec![10.0, 20.0, 15.0]);
    }

    #[test]
    fn ring_left_of_window_moves_one_world_right() {
        // minLng = -90; a ring ending at -100 belongs to the next copy.
        let t = translator(0.25);
        let mut r = ring(&[-120.0, -100.0]);
        t.translate_ring(&mut r);
        assert_eq!(xs(&r), vec![240.0, 260.0]);
    }

    #[test]
    fn rings_land_within_one_wrap_of_the_window() {
        for min_x in [-2.3, -1.0, -0.6, 0.0, 0.4, 1.2, 3.9] {
            let t = translator(min_x);
            for lngs in [[-180.0, -170.0], [-10.0, 5.0], [100.0, 179.0], [170.0, 180.0]] {
                let mut r = ring(&lngs);
                t.translate_ring(&mut r);
                let max = r.iter().map(|p| p.lon_deg).fold(f64::MIN, f64::max);
                assert!(
                    max >= t.min_lng() && max <= t.min_lng() + 360.0,
                    "min_x {min_x}: ring {lngs:?} -> max {max}"
                );
                assert!(r.iter().all(|p| (p.lon_deg - t.min_lng()).abs() <= 360.0));
            }
        }
    }

    #[test]
    fn translating_twice_only_moves_by_whole_worlds() {
        for min_x in [-1.7, 0.3, 2.6] {
            let t = translator(min_x);
            let mut once = ring(&[-175.0, -160.0, -168.0]);
            t.translate_ring(&mut once);
            let mut twice = once.clone();
            t.translate_ring(&mut twice);
            for (a, b) in once.iter().zip(&twice) {
                let worlds = (b.lon_deg - a.lon_deg) / 360.0;
                assert_eq!(worlds, worlds.round());
                assert_eq!(a.lat_deg, b.lat_deg);
            }
        }
    }

    #[test]
    fn each_ring_gets_its_own_offset() {
        let t = translator(1.25);
        let mut geometry = RegionGeometry::MultiPolygon(vec![
            vec![ring(&[-170.0, -160.0])],
            vec![ring(&[100.0, 110.0]), ring(&[-179.0, -178.0])],
        ]);
        assert!(t.translate_geometry(&mut geometry));

        let rings: Vec<Vec<f64>> = geometry.rings().map(xs).collect();
        assert_eq!(
            rings,
            vec![
                vec![550.0, 560.0],
                vec![460.0, 470.0],
                vec![541.0, 542.0],
            ]
        );
    }

    #[test]
    fn empty_rings_and_collections_are_no_ops() {
        let t = translator(1.5);
        let mut empty = Ring::new();
        t.translate_ring(&mut empty);
        assert!(empty.is_empty());

        let collection = RegionFeature::from_geojson_value(&json!({
            "type": "FeatureCollection",
            "features": []
        }))
        .expect("parse");
        assert_eq!(t.translate_region(&collection), collection);
    }

    #[test]
    fn unsupported_geometry_passes_through_and_original_is_untouched() {
        let mut feature =
            RegionFeature::new("ATA", RegionGeometry::Polygon(vec![ring(&[-170.0, -150.0])]));
        feature.parts.push(formats::RegionPart {
            id: None,
            properties: serde_json::Map::new(),
            geometry: RegionGeometry::Other {
                kind: "Point".to_string(),
                raw: json!({ "type": "Point", "coordinates": [1.0, 2.0] }),
            },
        });
        let original = feature.clone();

        let translated = translator(1.0).translate_region(&feature);

        assert_eq!(feature, original);
        assert_eq!(translated.parts[1], original.parts[1]);
        let first = translated.parts[0].geometry.rings().next().expect("ring");
        assert_eq!(xs(first), vec![190.0, 210.0]);
    }
}
