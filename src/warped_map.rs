//! The warped-map entity: an annotation's parsed form plus all state derived
//! from it — projected GCPs, fitted transformer, matching resource/projected-geo
//! triangulations, per-vertex distortion, and the transient per-viewport
//! fields the base renderer fills in.

use std::time::{Duration, Instant};

use crate::config::RenderConfig;
use crate::error::{Error, Result};
use crate::geometry::{self, Bbox, Point, Ring, Triangle};
use crate::projection::Projection;
use crate::tile_grid::{ImageInfo, Tile, ZoomLevel};
use crate::transformer::{self, GcpTransformer, TransformationKind};

/// Stable identity of a map within a [`crate::warped_map_list::WarpedMapList`],
/// issued by the caller. `mapId` is the primary key: re-adding the same id
/// is rejected rather than silently replacing the existing map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MapId(pub u64);

#[derive(Debug, Clone, Copy)]
pub struct GroundControlPoint {
    /// Pixel coordinates in the source image, origin top-left.
    pub resource: Point,
    /// Geographic coordinates, longitude/latitude degrees, unprojected.
    pub geo: Point,
}

/// A simple polygon ring in resource coordinates enclosing the visible part
/// of the image.
pub type ResourceMask = Ring;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Created,
    ImageInfoLoading,
    Ready,
    Changing,
    Removed,
}

/// A resolved triangulation: matching resource- and projected-geo-space
/// triangles plus a distortion scalar per triangle vertex.
#[derive(Debug, Clone, Default)]
pub struct Triangulation {
    pub resource_triangles: Vec<Triangle>,
    pub projected_geo_triangles: Vec<Triangle>,
    pub distortion: Vec<[f64; 3]>,
}

impl Triangulation {
    fn build(
        mask: &ResourceMask,
        transformer: &dyn GcpTransformer,
        config: &RenderConfig,
    ) -> Self {
        let resource_triangles =
        geometry::triangulate_mask(mask, config.mask_max_edge_length, config.max_subdivision_depth);
        let mut projected_geo_triangles = Vec::with_capacity(resource_triangles.len());
        let mut distortion = Vec::with_capacity(resource_triangles.len());
        for tri in &resource_triangles {
            let verts = tri.vertices();
            let projected: Vec<Point> = verts.iter().map(|&v| transformer.forward(v)).collect();
            projected_geo_triangles.push(Triangle { a: projected[0], b: projected[1], c: projected[2] });
            let d = verts.map(|v| geometry::log_abs_det(transformer.jacobian_forward(v)));
            distortion.push(d);
        }
        Self { resource_triangles, projected_geo_triangles, distortion }
    }
}

/// Transient per-viewport fields the base renderer fills in during a render
/// pass: current/overview zoom level, fetchable tiles, and
/// the backprojected buffered viewport ring.
#[derive(Debug, Clone, Default)]
pub struct ViewportState {
    pub current_zoom_level: Option<ZoomLevel>,
    pub overview_zoom_level: Option<ZoomLevel>,
    pub fetchable_tiles: Vec<Tile>,
    pub overview_tiles: Vec<Tile>,
    pub buffered_resource_ring: Ring,
}

#[derive(Debug)]
pub struct WarpedMap {
    map_id: MapId,
    resource_id: String,
    gcps: Vec<GroundControlPoint>,
    resource_mask: ResourceMask,
    transformation_kind: TransformationKind,

    projected_gcps: Vec<(Point, Point)>,
    transformer: Box<dyn GcpTransformer>,
    triangulation: Triangulation,

    bbox: Bbox,
    convex_hull: Ring,

    previous_triangulation: Option<Triangulation>,
    transition_started_at: Option<Instant>,

    state: MapState,
    image_info: Option<ImageInfo>,
    viewport_state: ViewportState,

    opacity: f32,
}

impl WarpedMap {
    /// Builds a map from its annotation-derived parts (steps
    /// 1-5). Image info is not loaded yet — the map starts in
    /// `ImageInfoLoading`; [`WarpedMap::apply_image_info`] transitions it to
    /// `Ready`.
    pub fn new(
        map_id: MapId,
        resource_id: String,
        gcps: Vec<GroundControlPoint>,
        resource_mask: ResourceMask,
        transformation_kind: TransformationKind,
        projection: &dyn Projection,
        config: &RenderConfig,
    ) -> Result<Self> {
        if resource_mask.len() < 3 {
            return Err(Error::Validation("resource mask needs at least 3 vertices".into()));
        }

        let projected_gcps: Vec<(Point, Point)> =
        gcps.iter().map(|gcp| (gcp.resource, projection.project(gcp.geo))).collect();

        let transformer = transformer::fit(transformation_kind, &projected_gcps)?;
        let triangulation = Triangulation::build(&resource_mask, transformer.as_ref(), config);
        let (bbox, convex_hull) = Self::derive_bbox_and_hull(&triangulation);

        Ok(Self {
            map_id,
            resource_id,
            gcps,
            resource_mask,
            transformation_kind,
            projected_gcps,
            transformer,
            triangulation,
            bbox,
            convex_hull,
            previous_triangulation: None,
            transition_started_at: None,
            state: MapState::ImageInfoLoading,
            image_info: None,
            viewport_state: ViewportState::default(),
            opacity: 1.0,
        })
    }

    fn derive_bbox_and_hull(triangulation: &Triangulation) -> (Bbox, Ring) {
        let points: Vec<Point> = triangulation
            .projected_geo_triangles
            .iter()
            .flat_map(|t| t.vertices())
            .collect();
        if points.is_empty() {
            let zero = Bbox::new(Point::ZERO, Point::ZERO);
            return (zero, Vec::new());
        }
        (Bbox::from_points(&points), geometry::convex_hull(&points))
    }

    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    pub fn resource_id(&self) -> &str {
        &self.resource_id
    }

    pub fn gcps(&self) -> &[GroundControlPoint] {
        &self.gcps
    }

    pub fn resource_mask(&self) -> &ResourceMask {
        &self.resource_mask
    }

    pub fn transformation_kind(&self) -> TransformationKind {
        self.transformation_kind
    }

    pub fn transformer(&self) -> &dyn GcpTransformer {
        self.transformer.as_ref()
    }

    pub fn triangulation(&self) -> &Triangulation {
        &self.triangulation
    }

    pub fn bbox(&self) -> Bbox {
        self.bbox
    }

    pub fn convex_hull(&self) -> &Ring {
        &self.convex_hull
    }

    pub fn state(&self) -> MapState {
        self.state
    }

    pub fn image_info(&self) -> Option<&ImageInfo> {
        self.image_info.as_ref()
    }

    pub fn viewport_state(&self) -> &ViewportState {
        &self.viewport_state
    }

    pub fn viewport_state_mut(&mut self) -> &mut ViewportState {
        &mut self.viewport_state
    }

    pub fn opacity(&self) -> f32 {
        self.opacity
    }

    pub fn set_opacity(&mut self, opacity: f32) {
        self.opacity = opacity.clamp(0.0, 1.0);
    }

    /// Called once the external image-info loader resolves:
    /// `created → imageInfoLoading → ready`.
    pub fn apply_image_info(&mut self, image_info: ImageInfo) {
        self.image_info = Some(image_info);
        self.state = MapState::Ready;
    }

    pub fn mark_removed(&mut self) {
        self.state = MapState::Removed;
    }

    fn begin_transition(&mut self, old: Triangulation, config: &RenderConfig) {
        self.previous_triangulation = Some(old);
        self.transition_started_at = Some(Instant::now());
        self.state = MapState::Changing;
        let _ = config; // transition duration consulted via `transition_progress`
    }

    /// Fraction `[0, 1]` through the cross-fade window since the last
    /// setter call; `1.0` (and no previous triangulation) once the
    /// transition completes or none is in progress.
    pub fn transition_progress(&self, config: &RenderConfig) -> f64 {
        match self.transition_started_at {
            None => 1.0,
            Some(start) => {
                let elapsed = start.elapsed();
                (elapsed.as_secs_f64() / duration_secs(config.transition_duration)).min(1.0)
            }
        }
    }

    /// Advances the state machine out of `Changing` once the transition
    /// window has elapsed; a no-op otherwise. The renderer calls this once
    /// per draw so stale previous-triangulation data is freed promptly.
    pub fn settle_transition(&mut self, config: &RenderConfig) {
        if self.transition_progress(config) >= 1.0 {
            self.previous_triangulation = None;
            self.transition_started_at = None;
            if self.state == MapState::Changing {
                self.state = MapState::Ready;
            }
        }
    }

    /// Linearly interpolated projected-geo triangle points between the
    /// previous and current triangulation at progress `t`. Falls back to the
    /// current triangulation unchanged when vertex counts differ (a mask
    /// edit can change the triangle count) or no transition is active.
    pub fn interpolated_projected_triangles(&self, t: f64) -> Vec<Triangle> {
        let Some(previous) = &self.previous_triangulation else {
            return self.triangulation.projected_geo_triangles.clone();
        };
        if previous.projected_geo_triangles.len() != self.triangulation.projected_geo_triangles.len() {
            return self.triangulation.projected_geo_triangles.clone();
        }
        let t = t.clamp(0.0, 1.0);
        previous
            .projected_geo_triangles
            .iter()
            .zip(&self.triangulation.projected_geo_triangles)
            .map(|(old, new)| Triangle {
                a: old.a.lerp(new.a, t),
                b: old.b.lerp(new.b, t),
                c: old.c.lerp(new.c, t),
            })
            .collect()
    }

    /// Re-triangulates against a new mask (step 3 re-run).
    pub fn set_resource_mask(&mut self, mask: ResourceMask, config: &RenderConfig) -> Result<()> {
        if mask.len() < 3 {
            return Err(Error::Validation("resource mask needs at least 3 vertices".into()));
        }
        let new_triangulation = Triangulation::build(&mask, self.transformer.as_ref(), config);
        let old = std::mem::replace(&mut self.triangulation, new_triangulation);
        let (bbox, hull) = Self::derive_bbox_and_hull(&self.triangulation);
        self.bbox = bbox;
        self.convex_hull = hull;
        self.resource_mask = mask;
        self.begin_transition(old, config);
        Ok(())
    }

    /// Re-fits GCPs against a (possibly new) set of ground control points,
    /// re-running the full pipeline from step 1.
    pub fn set_gcps(
        &mut self,
        gcps: Vec<GroundControlPoint>,
        projection: &dyn Projection,
        config: &RenderConfig,
    ) -> Result<()> {
        let projected_gcps: Vec<(Point, Point)> =
        gcps.iter().map(|gcp| (gcp.resource, projection.project(gcp.geo))).collect();
        let transformer = transformer::fit(self.transformation_kind, &projected_gcps)?;
        let new_triangulation = Triangulation::build(&self.resource_mask, transformer.as_ref(), config);

        let old = std::mem::replace(&mut self.triangulation, new_triangulation);
        let (bbox, hull) = Self::derive_bbox_and_hull(&self.triangulation);
        self.bbox = bbox;
        self.convex_hull = hull;
        self.gcps = gcps;
        self.projected_gcps = projected_gcps;
        self.transformer = transformer;
        self.begin_transition(old, config);
        Ok(())
    }

    /// Switches `transformationKind` and re-fits against the existing GCPs.
    pub fn set_transformation_kind(&mut self, kind: TransformationKind, config: &RenderConfig) -> Result<()> {
        let transformer = transformer::fit(kind, &self.projected_gcps)?;
        let new_triangulation = Triangulation::build(&self.resource_mask, transformer.as_ref(), config);

        let old = std::mem::replace(&mut self.triangulation, new_triangulation);
        let (bbox, hull) = Self::derive_bbox_and_hull(&self.triangulation);
        self.bbox = bbox;
        self.convex_hull = hull;
        self.transformation_kind = kind;
        self.transformer = transformer;
        self.begin_transition(old, config);
        Ok(())
    }
}

fn duration_secs(d: Duration) -> f64 {
    d.as_secs_f64().max(f64::MIN_POSITIVE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projection::SphericalMercator;

    fn identity_map() -> WarpedMap {
        let gcps = vec![
            GroundControlPoint { resource: Point::new(0.0, 0.0), geo: Point::new(0.0, 0.0) },
            GroundControlPoint { resource: Point::new(100.0, 0.0), geo: Point::new(100.0, 0.0) },
            GroundControlPoint { resource: Point::new(0.0, 100.0), geo: Point::new(0.0, 100.0) },
        ];
        // Mercator projection distorts non-origin points; use a non-projecting
        // stand-in so "identity GCPs" really means resource == projectedGeo.
        #[derive(Debug)]
        struct Identity;
        impl Projection for Identity {
            fn project(&self, p: Point) -> Point {
                p
            }
            fn unproject(&self, p: Point) -> Point {
                p
            }
        }
        let mask = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        WarpedMap::new(
            MapId(1),
            "https://example.org/iiif/map1".into(),
            gcps,
            mask,
            TransformationKind::Polynomial1,
            &Identity,
            &RenderConfig::default(),
        )
            .unwrap()
    }

    #[test]
    fn identity_gcps_yield_identity_transform() {
        let map = identity_map();
        for p in [Point::new(10.0, 10.0), Point::new(50.0, 90.0), Point::new(99.0, 1.0)] {
            let fwd = map.transformer().forward(p);
            assert!((fwd - p).length() < 1e-6);
        }
    }

    #[test]
    fn bbox_matches_mask_extent() {
        let map = identity_map();
        assert!((map.bbox().min - Point::new(0.0, 0.0)).length() < 1e-6);
        assert!((map.bbox().max - Point::new(100.0, 100.0)).length() < 1e-6);
    }

    #[test]
    fn set_resource_mask_starts_a_transition() {
        let mut map = identity_map();
        let smaller_mask = vec![
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(90.0, 90.0),
            Point::new(10.0, 90.0),
        ];
        map.set_resource_mask(smaller_mask, &RenderConfig::default()).unwrap();
        assert_eq!(map.state(), MapState::Changing);
        assert!(map.previous_triangulation.is_some());
    }

    #[test]
    fn projection_is_used_for_gcps() {
        let gcps = vec![
            GroundControlPoint { resource: Point::new(0.0, 0.0), geo: Point::new(4.895, 52.370) },
            GroundControlPoint { resource: Point::new(100.0, 0.0), geo: Point::new(4.910, 52.370) },
            GroundControlPoint { resource: Point::new(0.0, 100.0), geo: Point::new(4.895, 52.360) },
        ];
        let mask = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        let map = WarpedMap::new(
            MapId(2),
            "https://example.org/iiif/map2".into(),
            gcps,
            mask,
            TransformationKind::Polynomial1,
            &SphericalMercator,
            &RenderConfig::default(),
        )
            .unwrap();
        assert_eq!(map.state(), MapState::ImageInfoLoading);
        assert!(map.bbox().width() > 0.0);
    }
}
