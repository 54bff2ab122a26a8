//! Longitude/latitude ↔ projected-geo conversion. The crate never
//! hard-codes a single global projection into the viewport cascade — it
//! goes through the [`Projection`] trait — but ships a Web/Pseudo-Mercator
//! default, the conventional default projected-geo space.

use glam::DVec2;
use miniproj::Projection as MiniprojProjection;
use miniproj_ops::popvis_pseudo_mercator::PopVisPseudoMercatorProjection;

use crate::geometry::Point;

/// Converts between geographic (longitude, latitude, degrees) coordinates and
/// a projected-geo plane. `project`/`unproject` must be inverses of one
/// another to within floating-point tolerance — see the round-trip test
/// below.
pub trait Projection: std::fmt::Debug {
    fn project(&self, lonlat: Point) -> Point;
    fn unproject(&self, projected: Point) -> Point;
}

const WEB_MERCATOR_EXTENT: f64 = 20_037_508.342789244;

// Equivalent to `miniproj::get_projection(3857).unwrap()`, inlined so the
// projection has no runtime lookup cost and no fallible construction path.
const WEB_MERCATOR: PopVisPseudoMercatorProjection = PopVisPseudoMercatorProjection {
    ellipsoid_a: 6_378_137f64,
    lon_orig: 0f64,
    false_e: 0f64,
    false_n: 0f64,
};

/// EPSG:3857 (Web/Pseudo-Mercator). The default projected-geo space used when
/// a [`crate::warped_map::WarpedMap`] or [`crate::viewport::Viewport`] is not
/// given an explicit projection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphericalMercator;

impl Projection for SphericalMercator {
    fn project(&self, lonlat: Point) -> Point {
        DVec2::from(WEB_MERCATOR.deg_to_projected(lonlat.x, lonlat.y))
    }

    fn unproject(&self, projected: Point) -> Point {
        DVec2::from(WEB_MERCATOR.projected_to_deg(projected.x, projected.y))
    }
}

impl SphericalMercator {
    /// Full extent of the projected plane along either axis, in projected
    /// units (meters); used by tile-grid math for scale-factor 0 coverage.
    pub const EXTENT: f64 = WEB_MERCATOR_EXTENT;
}
