//! The base renderer: per-viewport map selection, the
//! buffered-viewport back-projection, IIIF zoom-level selection, tile
//! enumeration in center-out order, cache requesting, and pruning. Drawing
//! itself is left to [`super::raster_int`] / [`super::raster_gpu`] — this
//! module only decides *what* needs to be on screen.

use std::collections::HashSet;

use crate::cache::{TileCache, TileRequest};
use crate::config::RenderConfig;
use crate::external::iiif_tile_url;
use crate::geometry::{self, Point, Ring};
use crate::tile_grid::{Tile, ZoomLevel};
use crate::viewport::Viewport;
use crate::warped_map::{MapId, WarpedMap};
use crate::warped_map_list::WarpedMapList;

/// One tile reference resolved for the current render: its request URL
/// alongside the grid coordinates the tile-grid math needs.
#[derive(Debug, Clone)]
pub struct TileRef {
    pub url: String,
    pub tile: Tile,
}

/// Per-map output of [`BaseRenderer::prepare`]: the zoom levels chosen,
/// the tiles needed at each, and the backprojected buffered viewport ring
/// (transient per-viewport `WarpedMap` fields).
#[derive(Debug, Clone)]
pub struct MapRenderState {
    pub map_id: MapId,
    pub zoom_level: ZoomLevel,
    pub overview_zoom_level: ZoomLevel,
    pub tiles: Vec<TileRef>,
    pub overview_tiles: Vec<TileRef>,
    pub buffered_resource_ring: Ring,
}

/// Result of one `prepare` pass: every map worth drawing, in no particular
/// order (the rasterizers sort by the list's current z-order themselves,
/// since z-order can change between `prepare` and draw without a re-run).
#[derive(Debug, Clone)]
pub struct RenderPlan {
    pub viewport: Viewport,
    pub maps: Vec<MapRenderState>,
}

pub struct BaseRenderer {
    config: RenderConfig,
}

impl BaseRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Step 1: visible maps whose projected-geo bbox intersects the
    /// buffer-expanded viewport bbox.
    pub fn select_maps(&self, list: &WarpedMapList, viewport: &Viewport) -> Vec<MapId> {
        let buffered = viewport.buffered_projected_geo_bbox(self.config.buffer_ratio);
        list.maps_intersecting(buffered)
    }

    /// The viewport's projected-geo rectangle, scaled up from its center by
    /// `1 + buffer_ratio` on every side — same shape, same rotation, larger
    /// (step 2's "`projectedGeoBufferedViewportRectangle`").
    fn buffered_rectangle(viewport: &Viewport, ratio: f64) -> Ring {
        let center = viewport.projected_geo_center();
        viewport
            .projected_geo_rectangle()
            .iter()
            .map(|&corner| center + (corner - center) * (1.0 + ratio))
            .collect()
    }

    /// Back-projects `rectangle`'s corners through `map`'s transformer and
    /// recursively refines each edge until the projected-geo midpoint
    /// implied by the straight-line resource interpolant is within
    /// `max_offset_ratio * segment_length` of the true backprojection, or
    /// `max_depth` is exhausted.
    fn backproject_buffered_ring(map: &WarpedMap, rectangle: &[Point], config: &RenderConfig) -> Ring {
        let n = rectangle.len();
        let mut ring = Vec::new();
        for i in 0..n {
            let p0_proj = rectangle[i];
            let p1_proj = rectangle[(i + 1) % n];
            let p0_res = map.transformer().backward(p0_proj);
            let p1_res = map.transformer().backward(p1_proj);
            ring.push(p0_res);
            Self::refine_edge(map, p0_proj, p1_proj, p0_res, p1_res, config.max_offset_ratio, config.max_subdivision_depth, &mut ring);
        }
        ring
    }

    #[allow(clippy::too_many_arguments)]
    fn refine_edge(
        map: &WarpedMap,
        p0_proj: Point,
        p1_proj: Point,
        p0_res: Point,
        p1_res: Point,
        max_offset_ratio: f64,
        depth: u32,
        out: &mut Vec<Point>,
    ) {
        if depth == 0 {
            return;
        }
        let mid_proj = (p0_proj + p1_proj) * 0.5;
        let straight_mid_res = (p0_res + p1_res) * 0.5;
        // Where the straight-line resource interpolant actually lands once
        // forward-transformed, versus where the true midpoint is.
        let straight_mid_proj = map.transformer().forward(straight_mid_res);
        let offset = (straight_mid_proj - mid_proj).length();
        let segment_len = (p1_proj - p0_proj).length();
        if offset <= max_offset_ratio * segment_len {
            return;
        }
        let mid_res = map.transformer().backward(mid_proj);
        Self::refine_edge(map, p0_proj, mid_proj, p0_res, mid_res, max_offset_ratio, depth - 1, out);
        out.push(mid_res);
        Self::refine_edge(map, mid_proj, p1_proj, mid_res, p1_res, max_offset_ratio, depth - 1, out);
    }

    /// Step 3: the IIIF zoom level (and a coarser overview level) whose
    /// resolution best matches `resourcePerViewportPixel`, the median of
    /// sampled forward-Jacobian area scale factors converted into a
    /// resource-pixels-per-viewport-pixel ratio via the viewport's own
    /// projected-geo-per-viewport scale.
    fn select_zoom_levels(map: &WarpedMap, viewport: &Viewport, ring: &Ring, config: &RenderConfig) -> Option<(ZoomLevel, ZoomLevel)> {
        let image_info = map.image_info()?;
        let bbox = geometry::ring_bbox(ring);
        let mut area_scales: Vec<f64> = sample_grid(bbox, config.zoom_level_sample_count)
            .into_iter()
            .map(|p| map.transformer().jacobian_forward(p).determinant().abs().sqrt().max(f64::MIN_POSITIVE))
            .collect();
        area_scales.sort_by(f64::total_cmp);
        let median_projected_geo_per_resource_pixel = area_scales[area_scales.len() / 2];
        let resource_per_viewport_pixel = viewport.scale() / median_projected_geo_per_resource_pixel;

        let level = *image_info.select_zoom_level(resource_per_viewport_pixel)?;
        let overview = *image_info.overview_zoom_level(&level)?;
        Some((level, overview))
    }

    /// Steps 1-6: selects visible maps, computes their buffered resource
    /// ring, picks zoom levels, enumerates center-out tile lists, and
    /// requests them from `cache`. Step 7 (prune) runs at the end against
    /// the union of every tile URL still needed.
    pub fn prepare(&self, list: &mut WarpedMapList, viewport: &Viewport, cache: &mut TileCache) -> RenderPlan {
        let selected = self.select_maps(list, viewport);
        let buffered_rect = Self::buffered_rectangle(viewport, self.config.buffer_ratio);

        let mut map_states = Vec::new();
        let mut requests = Vec::new();
        let mut keep: HashSet<String> = HashSet::new();

        for map_id in selected {
            let Some(map) = list.get(map_id) else { continue };
            if map.image_info().is_none() {
                continue; // still in ImageInfoLoading; nothing to fetch yet
            }

            let ring = Self::backproject_buffered_ring(map, &buffered_rect, &self.config);
            let Some((level, overview)) = Self::select_zoom_levels(map, viewport, &ring, &self.config) else {
                continue;
            };

            let image_info = map.image_info().unwrap();
            let bbox = geometry::ring_bbox(&ring);
            let centroid = geometry::ring_centroid(&ring);

            let tiles = image_info.tiles_covering_ordered(&level, bbox, centroid);
            let overview_tiles = image_info.tiles_covering_ordered(&overview, bbox, centroid);

            let tile_refs = Self::build_tile_refs(map, &level, &tiles, map_id, &mut requests, &mut keep);
            let overview_refs = Self::build_tile_refs(map, &overview, &overview_tiles, map_id, &mut requests, &mut keep);

            if let Some(map_mut) = list.get_mut(map_id) {
                let state = map_mut.viewport_state_mut();
                state.current_zoom_level = Some(level);
                state.overview_zoom_level = Some(overview);
                state.fetchable_tiles = tiles;
                state.overview_tiles = overview_tiles;
                state.buffered_resource_ring = ring.clone();
            }

            map_states.push(MapRenderState {
                map_id,
                zoom_level: level,
                overview_zoom_level: overview,
                tiles: tile_refs,
                overview_tiles: overview_refs,
                buffered_resource_ring: ring,
            });
        }

        cache.request_fetchable_tiles(&requests);
        cache.prune(&keep);

        RenderPlan { viewport: *viewport, maps: map_states }
    }

    fn build_tile_refs(
        map: &WarpedMap,
        level: &ZoomLevel,
        tiles: &[Tile],
        map_id: MapId,
        requests: &mut Vec<TileRequest>,
        keep: &mut HashSet<String>,
    ) -> Vec<TileRef> {
        let image_info = map.image_info().unwrap();
        tiles
            .iter()
            .map(|&tile| {
                let (x, y, w, h) = tile.resource_region(level, image_info.width, image_info.height);
                let url = iiif_tile_url(map.resource_id(), x, y, w, h, level.tile_width);
                keep.insert(url.clone());
                requests.push(TileRequest { url: url.clone(), map_id, tile });
                TileRef { url, tile }
            })
            .collect()
    }
}

/// `n`-point roughly-even grid sample inside `bbox`, used for the
/// zoom-level Jacobian-magnitude median (step 3's "e.g. 9
/// points").
fn sample_grid(bbox: crate::geometry::Bbox, n: usize) -> Vec<Point> {
    let side = (n as f64).sqrt().ceil().max(1.0) as usize;
    let mut points = Vec::with_capacity(side * side);
    for row in 0..side {
        for col in 0..side {
            let fx = (col as f64 + 0.5) / side as f64;
            let fy = (row as f64 + 0.5) / side as f64;
            points.push(Point::new(bbox.min.x + fx * bbox.width(), bbox.min.y + fy * bbox.height()));
            if points.len() == n {
                return points;
            }
        }
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::external::{DecodedImage, TileDecoder, TileFetcher};
    use crate::projection::SphericalMercator;
    use crate::tile_grid::ImageInfo;
    use crate::transformer::TransformationKind;
    use crate::viewport::Fit;
    use crate::warped_map::{GroundControlPoint, MapId as Id, WarpedMap};
    use async_trait::async_trait;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    struct NoopFetcher;
    #[async_trait]
    impl TileFetcher for NoopFetcher {
        async fn fetch(&self, url: &str, _cancel: CancellationToken) -> Result<bytes::Bytes, crate::error::Error> {
            Err(crate::error::Error::TileFetch { url: url.to_string(), source: Box::new(std::io::Error::other("stub")) })
        }
    }
    struct NoopDecoder;
    impl TileDecoder for NoopDecoder {
        fn decode(&self, _bytes: &[u8]) -> Result<DecodedImage, crate::error::Error> {
            Err(crate::error::Error::Validation("stub decoder".into()))
        }
    }

    fn identity_map_with_image_info() -> WarpedMap {
        let gcps = vec![
            GroundControlPoint { resource: Point::new(0.0, 0.0), geo: Point::new(0.0, 0.0) },
            GroundControlPoint { resource: Point::new(1000.0, 0.0), geo: Point::new(1000.0, 0.0) },
            GroundControlPoint { resource: Point::new(0.0, 1000.0), geo: Point::new(0.0, 1000.0) },
        ];
        let mask = vec![
            Point::new(0.0, 0.0),
            Point::new(1000.0, 0.0),
            Point::new(1000.0, 1000.0),
            Point::new(0.0, 1000.0),
        ];
        #[derive(Debug)]
        struct Identity;
        impl crate::projection::Projection for Identity {
            fn project(&self, p: Point) -> Point {
                p
            }
            fn unproject(&self, p: Point) -> Point {
                p
            }
        }
        let mut map = WarpedMap::new(
            Id(1),
            "https://example.org/iiif/map1".into(),
            gcps,
            mask,
            TransformationKind::Polynomial1,
            &Identity,
            &RenderConfig::default(),
        )
            .unwrap();
        map.apply_image_info(ImageInfo {
            resource_id: "https://example.org/iiif/map1".into(),
            width: 1000,
            height: 1000,
            zoom_levels: vec![
                ZoomLevel { scale_factor: 1, tile_width: 256, tile_height: 256 },
                ZoomLevel { scale_factor: 4, tile_width: 256, tile_height: 256 },
            ],
        });
        map
    }

    #[test]
    fn prepare_selects_tiles_covering_the_viewport() {
        let mut list = WarpedMapList::new();
        list.add(identity_map_with_image_info()).unwrap();

        let square = vec![
            Point::new(0.0, 0.0),
            Point::new(1000.0, 0.0),
            Point::new(1000.0, 1000.0),
            Point::new(0.0, 1000.0),
        ];
        let viewport = Viewport::from_size_and_polygon((500, 500), &square, Fit::Contain, 0.0, 1.0).unwrap();

        let renderer = BaseRenderer::new(EngineConfig::default().render);
        let mut cache = TileCache::new(Arc::new(NoopFetcher), Arc::new(NoopDecoder), EngineConfig::default().cache);
        let plan = renderer.prepare(&mut list, &viewport, &mut cache);

        assert_eq!(plan.maps.len(), 1);
        let state = &plan.maps[0];
        assert!(!state.tiles.is_empty());

        // Tile coverage: the union of selected tiles' resource regions covers
        // the backprojected buffered viewport ring's bbox.
        let ring_bbox = geometry::ring_bbox(&state.buffered_resource_ring);
        let image_info = list.get(Id(1)).unwrap().image_info().unwrap();
        let covered = state.tiles.iter().fold(None::<crate::geometry::Bbox>, |acc, tile_ref| {
            let (x, y, w, h) = tile_ref.tile.resource_region(&state.zoom_level, image_info.width, image_info.height);
            let tile_bbox = crate::geometry::Bbox::new(Point::new(x as f64, y as f64), Point::new((x + w) as f64, (y + h) as f64));
            Some(match acc {
                Some(a) => a.union(&tile_bbox),
                None => tile_bbox,
            })
        }).unwrap();
        assert!(covered.min.x <= ring_bbox.min.x.max(0.0) + 1.0);
        assert!(covered.min.y <= ring_bbox.min.y.max(0.0) + 1.0);
        assert!(covered.max.x >= ring_bbox.max.x.min(1000.0) - 1.0);
        assert!(covered.max.y >= ring_bbox.max.y.min(1000.0) - 1.0);
    }

    #[test]
    fn prepare_skips_maps_without_image_info() {
        let mut list = WarpedMapList::new();
        let gcps = vec![
            GroundControlPoint { resource: Point::new(0.0, 0.0), geo: Point::new(0.0, 0.0) },
            GroundControlPoint { resource: Point::new(100.0, 0.0), geo: Point::new(100.0, 0.0) },
            GroundControlPoint { resource: Point::new(0.0, 100.0), geo: Point::new(0.0, 100.0) },
        ];
        let mask = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0), Point::new(0.0, 100.0)];
        let map = WarpedMap::new(Id(2), "https://example.org/iiif/map2".into(), gcps, mask, TransformationKind::Polynomial1, &SphericalMercator, &RenderConfig::default()).unwrap();
        list.add(map).unwrap();

        let square = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0), Point::new(0.0, 100.0)];
        let viewport = Viewport::from_size_and_polygon((200, 200), &square, Fit::Contain, 0.0, 1.0).unwrap();
        let renderer = BaseRenderer::new(EngineConfig::default().render);
        let mut cache = TileCache::new(Arc::new(NoopFetcher), Arc::new(NoopDecoder), EngineConfig::default().cache);
        let plan = renderer.prepare(&mut list, &viewport, &mut cache);
        assert!(plan.maps.is_empty());
    }
}
