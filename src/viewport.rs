//! The viewport value type and its cascade of affine transforms. A
//! `Viewport` is never mutated after construction — every factory returns
//! a fresh value.

use glam::DVec2;

use crate::error::{Error, Result};
use crate::geometry::{self, Affine, Bbox, Point, Ring};
use crate::warped_map::MapId;
use crate::warped_map_list::WarpedMapList;

/// `contain`: the fitted shape sits entirely inside the viewport. `cover`:
/// the viewport is entirely covered by the fitted shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Contain,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    viewport_size: (u32, u32),
    projected_geo_center: Point,
    projected_geo_per_viewport_scale: f64,
    rotation: f64,
    device_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(
        viewport_size: (u32, u32),
        projected_geo_center: Point,
        projected_geo_per_viewport_scale: f64,
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Self {
        Self {
            viewport_size,
            projected_geo_center,
            projected_geo_per_viewport_scale: projected_geo_per_viewport_scale.max(f64::MIN_POSITIVE),
            rotation,
            device_pixel_ratio: device_pixel_ratio.max(1.0),
        }
    }

    pub fn viewport_size(&self) -> (u32, u32) {
        self.viewport_size
    }

    pub fn canvas_size(&self) -> (f64, f64) {
        (
            self.viewport_size.0 as f64 * self.device_pixel_ratio,
            self.viewport_size.1 as f64 * self.device_pixel_ratio,
        )
    }

    pub fn projected_geo_center(&self) -> Point {
        self.projected_geo_center
    }

    pub fn scale(&self) -> f64 {
        self.projected_geo_per_viewport_scale
    }

    pub fn rotation(&self) -> f64 {
        self.rotation
    }

    pub fn device_pixel_ratio(&self) -> f64 {
        self.device_pixel_ratio
    }

    /// The rotated rectangle in projected-geo space this viewport frames:
    /// centered at `projectedGeoCenter`, sized `viewportSize * scale`,
    /// rotated by `rotation`. Corners are returned in order starting at
    /// top-left (pre-rotation) going clockwise.
    pub fn projected_geo_rectangle(&self) -> [Point; 4] {
        let half_w = self.viewport_size.0 as f64 * self.projected_geo_per_viewport_scale / 2.0;
        let half_h = self.viewport_size.1 as f64 * self.projected_geo_per_viewport_scale / 2.0;
        let local = [
            DVec2::new(-half_w, half_h),
            DVec2::new(half_w, half_h),
            DVec2::new(half_w, -half_h),
            DVec2::new(-half_w, -half_h),
        ];
        let rot = Affine::from_angle(self.rotation);
        local.map(|p| self.projected_geo_center + rot.transform_vector2(p))
    }

    fn projected_to_target(&self, scale: f64, target_center: Point) -> Affine {
        let to_origin = Affine::from_translation(-self.projected_geo_center);
        let rot = Affine::from_angle(-self.rotation);
        let flip_scale = Affine::from_scale(DVec2::new(1.0 / scale, -1.0 / scale));
        let to_target = Affine::from_translation(target_center);
        to_target * flip_scale * rot * to_origin
    }

    /// `projectedGeo → viewport`.
    pub fn projected_geo_to_viewport(&self) -> Affine {
        let viewport_center =
        DVec2::new(self.viewport_size.0 as f64 / 2.0, self.viewport_size.1 as f64 / 2.0);
        self.projected_to_target(self.projected_geo_per_viewport_scale, viewport_center)
    }

    /// `projectedGeo → canvas`: identical cascade, scaled by `devicePixelRatio`.
    pub fn projected_geo_to_canvas(&self) -> Affine {
        let (cw, ch) = self.canvas_size();
        let canvas_center = DVec2::new(cw / 2.0, ch / 2.0);
        self.projected_to_target(self.projected_geo_per_viewport_scale / self.device_pixel_ratio, canvas_center)
    }

    /// `projectedGeo → clip`: maps `projectedGeoRectangle` onto `[-1,1]²`.
    pub fn projected_geo_to_clip(&self) -> Affine {
        let to_origin = Affine::from_translation(-self.projected_geo_center);
        let rot = Affine::from_angle(-self.rotation);
        let sx = 2.0 / (self.viewport_size.0 as f64 * self.projected_geo_per_viewport_scale);
        let sy = 2.0 / (self.viewport_size.1 as f64 * self.projected_geo_per_viewport_scale);
        let norm = Affine::from_scale(DVec2::new(sx, sy));
        norm * rot * to_origin
    }

    /// `viewport → clip`: maps the viewport rectangle onto `[-1,1]²`, y negated.
    pub fn viewport_to_clip(&self) -> Affine {
        let w = self.viewport_size.0 as f64;
        let h = self.viewport_size.1 as f64;
        let scale = Affine::from_scale(DVec2::new(2.0 / w, -2.0 / h));
        let shift = Affine::from_translation(DVec2::new(-1.0, 1.0));
        shift * scale
    }

    fn from_size_and_bbox(
        viewport_size: (u32, u32),
        bbox: Bbox,
        fit: Fit,
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Self {
        let w = viewport_size.0.max(1) as f64;
        let h = viewport_size.1.max(1) as f64;
        let bbox_w = bbox.width().max(1e-12);
        let bbox_h = bbox.height().max(1e-12);
        let scale_x = bbox_w / w;
        let scale_y = bbox_h / h;
        let scale = match fit {
            Fit::Contain => scale_x.max(scale_y),
            Fit::Cover => scale_x.min(scale_y),
        };
        Self::new(viewport_size, bbox.center(), scale, rotation, device_pixel_ratio)
    }

    /// Fits `polygon`'s bbox into `viewport_size`.
    pub fn from_size_and_polygon(
        viewport_size: (u32, u32),
        polygon: &Ring,
        fit: Fit,
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Result<Self> {
        if polygon.is_empty() {
            return Err(Error::EmptyInput);
        }
        let bbox = geometry::ring_bbox(polygon);
        Ok(Self::from_size_and_bbox(viewport_size, bbox, fit, rotation, device_pixel_ratio))
    }

    /// Fits the convex hull of `map_ids` (every map if empty) into `viewport_size`.
    pub fn from_size_and_maps(
        viewport_size: (u32, u32),
        list: &WarpedMapList,
        map_ids: &[MapId],
        fit: Fit,
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Result<Self> {
        let hull = list.convex_hull(map_ids);
        if hull.is_empty() {
            return Err(Error::EmptyInput);
        }
        Self::from_size_and_polygon(viewport_size, &hull, fit, rotation, device_pixel_ratio)
    }

    /// Derives `viewportSize` from a fixed `scale` so `polygon`'s bbox fills it exactly.
    pub fn from_scale_and_polygon(
        scale: f64,
        polygon: &Ring,
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Result<Self> {
        if polygon.is_empty() {
            return Err(Error::EmptyInput);
        }
        let bbox = geometry::ring_bbox(polygon);
        let w = ((bbox.width() / scale).round().max(1.0)) as u32;
        let h = ((bbox.height() / scale).round().max(1.0)) as u32;
        Ok(Self::new((w, h), bbox.center(), scale, rotation, device_pixel_ratio))
    }

    pub fn from_scale_and_maps(
        scale: f64,
        list: &WarpedMapList,
        map_ids: &[MapId],
        rotation: f64,
        device_pixel_ratio: f64,
    ) -> Result<Self> {
        let hull = list.convex_hull(map_ids);
        if hull.is_empty() {
            return Err(Error::EmptyInput);
        }
        Self::from_scale_and_polygon(scale, &hull, rotation, device_pixel_ratio)
    }

    /// Buffered version of [`Viewport::projected_geo_rectangle`]'s bbox,
    /// expanded by `ratio` on every side.
    pub fn buffered_projected_geo_bbox(&self, ratio: f64) -> Bbox {
        geometry::ring_bbox(&self.projected_geo_rectangle().to_vec()).buffered(ratio)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn contain_fit_centers_on_bbox_center_with_unit_scale() {
        let square: Ring = vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        let viewport = Viewport::from_size_and_polygon((200, 100), &square, Fit::Contain, 0.0, 1.0).unwrap();
        assert_relative_eq!(viewport.projected_geo_center().x, 50.0);
        assert_relative_eq!(viewport.projected_geo_center().y, 50.0);
        assert_relative_eq!(viewport.scale(), 1.0);
    }

    #[test]
    fn projected_geo_to_viewport_maps_center_to_viewport_center() {
        let viewport = Viewport::new((800, 600), Point::new(10.0, 20.0), 2.0, 0.0, 1.0);
        let transform = viewport.projected_geo_to_viewport();
        let mapped = transform.transform_point2(viewport.projected_geo_center());
        assert_relative_eq!(mapped.x, 400.0, epsilon = 1e-9);
        assert_relative_eq!(mapped.y, 300.0, epsilon = 1e-9);
    }

    #[test]
    fn projected_geo_to_viewport_round_trips() {
        let viewport = Viewport::new((800, 600), Point::new(10.0, 20.0), 3.5, 0.6, 2.0);
        let transform = viewport.projected_geo_to_viewport();
        let inverse = transform.inverse();
        let p = Point::new(5.0, -30.0);
        let round_tripped = inverse.transform_point2(transform.transform_point2(p));
        assert_relative_eq!(round_tripped.x, p.x, epsilon = 1e-6);
        assert_relative_eq!(round_tripped.y, p.y, epsilon = 1e-6);
    }

    #[test]
    fn cover_fit_produces_smaller_scale_than_contain() {
        let rect: Ring = vec![
            Point::new(0.0, 0.0),
            Point::new(200.0, 0.0),
            Point::new(200.0, 50.0),
            Point::new(0.0, 50.0),
        ];
        let contain = Viewport::from_size_and_polygon((100, 100), &rect, Fit::Contain, 0.0, 1.0).unwrap();
        let cover = Viewport::from_size_and_polygon((100, 100), &rect, Fit::Cover, 0.0, 1.0).unwrap();
        assert!(cover.scale() < contain.scale());
    }

    #[test]
    fn empty_polygon_is_empty_input_error() {
        let err = Viewport::from_size_and_polygon((100, 100), &Vec::new(), Fit::Contain, 0.0, 1.0).unwrap_err();
        assert!(matches!(err, Error::EmptyInput));
    }
}
