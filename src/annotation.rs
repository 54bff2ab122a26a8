//! Typed form of the georeference-annotation JSON shape. Schema validation
//! of untrusted input is explicitly out of scope — the core only needs to
//! parse an already-validated document into Rust types and enforce the one
//! precondition it owns: a `gcps` count meeting the requested
//! transformation kind's minimum (see [`crate::transformer::fit`], surfaced
//! as `Error::Validation` from [`crate::warped_map_list::WarpedMapList::add`]).

use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Ring};
use crate::transformer::TransformationKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(rename = "type")]
    pub kind: String,
    pub resource: AnnotationResource,
    pub gcps: Vec<AnnotationGcp>,
    #[serde(rename = "resourceMask")]
    pub resource_mask: Vec<[f64; 2]>,
    #[serde(default)]
    pub transformation: Option<AnnotationTransformation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationResource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnnotationGcp {
    pub resource: [f64; 2],
    pub geo: [f64; 2],
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotationTransformation {
    #[serde(rename = "type")]
    pub kind: TransformationKind,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

impl Annotation {
    /// `(resource, geo)` pairs as plain points, in the order supplied.
    /// `geo` is longitude/latitude degrees — still unprojected, see
    /// [`crate::projection::Projection`].
    pub fn gcp_pairs(&self) -> Vec<(Point, Point)> {
        self.gcps
            .iter()
            .map(|gcp| {
                (
                    Point::new(gcp.resource[0], gcp.resource[1]),
                    Point::new(gcp.geo[0], gcp.geo[1]),
                )
            })
            .collect()
    }

    pub fn resource_mask_ring(&self) -> Ring {
        self.resource_mask.iter().map(|p| Point::new(p[0], p[1])).collect()
    }

    /// `polynomial-1` (3-GCP affine) is the transformation kind most
    /// annotation tools default to when `transformation` is omitted.
    pub fn transformation_kind(&self) -> TransformationKind {
        self.transformation
            .as_ref()
            .map(|t| t.kind)
            .unwrap_or(TransformationKind::Polynomial1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
 "type": "GeoreferencedMap",
 "resource": { "id": "https://example.org/iiif/map1", "type": "ImageService3", "width": 1000, "height": 800 },
 "gcps": [
 { "resource": [0, 0], "geo": [4.895, 52.370] },
 { "resource": [1000, 0], "geo": [4.910, 52.370] },
 { "resource": [0, 800], "geo": [4.895, 52.360] }
 ],
 "resourceMask": [[0,0],[1000,0],[1000,800],[0,800]],
 "transformation": { "type": "polynomial1" }
 }"#
    }

    #[test]
    fn parses_full_annotation() {
        let annotation: Annotation = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(annotation.kind, "GeoreferencedMap");
        assert_eq!(annotation.gcps.len(), 3);
        assert_eq!(annotation.transformation_kind(), TransformationKind::Polynomial1);
        assert_eq!(annotation.gcp_pairs().len(), 3);
        assert_eq!(annotation.resource_mask_ring().len(), 4);
    }

    #[test]
    fn missing_transformation_defaults_to_polynomial1() {
        let mut annotation: Annotation = serde_json::from_str(sample_json()).unwrap();
        annotation.transformation = None;
        assert_eq!(annotation.transformation_kind(), TransformationKind::Polynomial1);
    }
}
