//! IIIF tile grid: zoom-level bookkeeping and tile enumeration over a
//! resource-space region (`Tile`/`ZoomLevel`).

use crate::geometry::{Bbox, Point};

/// One IIIF "scale factor" level: tiles of `tile_width x tile_height` output
/// pixels, each covering a `tile_width*scale_factor x tile_height*scale_factor`
/// region of the full-resolution resource image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevel {
    pub scale_factor: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

impl ZoomLevel {
    fn region_size(&self) -> (u32, u32) {
        (self.tile_width * self.scale_factor, self.tile_height * self.scale_factor)
    }

    /// Number of tile columns/rows needed to cover an `image_width x
    /// image_height` resource image at this level.
    pub fn grid_size(&self, image_width: u32, image_height: u32) -> (u32, u32) {
        let (region_w, region_h) = self.region_size();
        (image_width.div_ceil(region_w), image_height.div_ceil(region_h))
    }
}

/// `(column, row)` at a given [`ZoomLevel`]. The zoom level itself is kept
/// alongside the indices (rather than only a scale factor) so a tile can
/// compute its own resource region without a separate lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tile {
    pub column: u32,
    pub row: u32,
    pub scale_factor: u32,
}

impl Tile {
    /// `(x, y, w, h)` resource-space region, clipped to `image_width x
    /// image_height` at the grid's right/bottom edge.
    pub fn resource_region(&self, level: &ZoomLevel, image_width: u32, image_height: u32) -> (u32, u32, u32, u32) {
        let (region_w, region_h) = level.region_size();
        let x = self.column * region_w;
        let y = self.row * region_h;
        let w = region_w.min(image_width.saturating_sub(x));
        let h = region_h.min(image_height.saturating_sub(y));
        (x, y, w, h)
    }

    pub fn resource_center(&self, level: &ZoomLevel, image_width: u32, image_height: u32) -> Point {
        let (x, y, w, h) = self.resource_region(level, image_width, image_height);
        Point::new(x as f64 + w as f64 / 2.0, y as f64 + h as f64 / 2.0)
    }
}

/// Image-info as returned by the external image-info loader:
/// native dimensions plus the available scale-factor levels.
#[derive(Debug, Clone)]
pub struct ImageInfo {
    pub resource_id: String,
    pub width: u32,
    pub height: u32,
    /// Ascending or descending order does not matter; selection methods scan.
    pub zoom_levels: Vec<ZoomLevel>,
}

impl ImageInfo {
    /// The zoom level whose `scaleFactor` is the largest value `<=
    /// resource_per_viewport_pixel`; if none qualifies, the next
    /// higher-resolution (smallest scaleFactor) level.
    pub fn select_zoom_level(&self, resource_per_viewport_pixel: f64) -> Option<&ZoomLevel> {
        let mut best: Option<&ZoomLevel> = None;
        for level in &self.zoom_levels {
            if (level.scale_factor as f64) <= resource_per_viewport_pixel
            && best.is_none_or(|b| level.scale_factor > b.scale_factor)
            {
                best = Some(level);
            }
        }
        best.or_else(|| self.zoom_levels.iter().min_by_key(|l| l.scale_factor))
    }

    /// The nearest coarser level above `selected`, used to fill in a blurry
    /// approximation while `selected`'s own tiles load. Clamped to the
    /// coarsest available level when `selected` is already at or beyond it.
    pub fn overview_zoom_level(&self, selected: &ZoomLevel) -> Option<&ZoomLevel> {
        self.zoom_levels
            .iter()
            .filter(|l| l.scale_factor > selected.scale_factor)
            .min_by_key(|l| l.scale_factor)
            .or_else(|| self.zoom_levels.iter().max_by_key(|l| l.scale_factor))
    }

    /// Tiles at `level` whose resource region overlaps `bbox`, ordered
    /// center-out from `centroid`.
    pub fn tiles_covering_ordered(&self, level: &ZoomLevel, bbox: Bbox, centroid: Point) -> Vec<Tile> {
        let (region_w, region_h) = level.region_size();
        let (cols, rows) = level.grid_size(self.width, self.height);

        let col_start = (bbox.min.x.max(0.0) / region_w as f64).floor() as u32;
        let col_end = (bbox.max.x.max(0.0) / region_w as f64).ceil() as u32;
        let row_start = (bbox.min.y.max(0.0) / region_h as f64).floor() as u32;
        let row_end = (bbox.max.y.max(0.0) / region_h as f64).ceil() as u32;

        let mut tiles = Vec::new();
        for row in row_start..row_end.min(rows) {
            for column in col_start..col_end.min(cols) {
                tiles.push(Tile { column, row, scale_factor: level.scale_factor });
            }
        }

        tiles.sort_by(|a, b| {
            let da = (a.resource_center(level, self.width, self.height) - centroid).length_squared();
            let db = (b.resource_center(level, self.width, self.height) - centroid).length_squared();
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        tiles
    }
}
