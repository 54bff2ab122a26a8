//! End-to-end coverage exercising the engine the way an embedder would:
//! through `Engine`, `Viewport` factories, and the cache's public surface,
//! rather than any single module's internals.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use georef_render::annotation::Annotation;
use georef_render::cache::{TileCache, TileRequest};
use georef_render::config::{CacheConfig, EngineConfig};
use georef_render::error::{Error, Result};
use georef_render::external::{DecodedImage, ImageInfoLoader, RenderOutput, TileDecoder, TileFetcher};
use georef_render::geometry::Point;
use georef_render::projection::Projection;
use georef_render::tile_grid::{ImageInfo, Tile, ZoomLevel};
use georef_render::viewport::{Fit, Viewport};
use georef_render::warped_map::MapId;
use georef_render::Engine;

/// A projection that passes coordinates through unchanged, so "identity
/// GCPs" in these tests really do mean `resource == projectedGeo`.
#[derive(Debug, Clone, Copy, Default)]
struct IdentityProjection;

impl Projection for IdentityProjection {
    fn project(&self, p: Point) -> Point {
        p
    }
    fn unproject(&self, p: Point) -> Point {
        p
    }
}

struct StaticImageInfoLoader {
    infos: Vec<(String, ImageInfo)>,
}

#[async_trait]
impl ImageInfoLoader for StaticImageInfoLoader {
    async fn load(&self, resource_id: &str) -> Result<ImageInfo> {
        self.infos
            .iter()
            .find(|(id, _)| id == resource_id)
            .map(|(_, info)| info.clone())
            .ok_or_else(|| Error::ImageInfo { resource_id: resource_id.to_string(), message: "unknown resource".into() })
    }
}

/// Returns a distinct one-pixel color per resource, keyed off a substring of
/// the request URL (the IIIF base id, which is the resource id).
struct ColorByResourceFetcher {
    colors: Vec<(String, [u8; 4])>,
}

#[async_trait]
impl TileFetcher for ColorByResourceFetcher {
    async fn fetch(&self, url: &str, _cancel: CancellationToken) -> Result<Bytes> {
        let (_, color) = self
            .colors
            .iter()
            .find(|(marker, _)| url.contains(marker.as_str()))
            .expect("url should match one of the configured resources");
        Ok(Bytes::copy_from_slice(color))
    }
}

/// Interprets the fetched bytes directly as one RGBA pixel.
struct OnePixelDecoder;

impl TileDecoder for OnePixelDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        Ok(DecodedImage { width: 1, height: 1, pixels: bytes.to_vec() })
    }
}

fn single_tile_info(resource_id: &str, size: u32) -> (String, ImageInfo) {
    (
        resource_id.to_string(),
        ImageInfo {
            resource_id: resource_id.to_string(),
            width: size,
            height: size,
            zoom_levels: vec![ZoomLevel { scale_factor: 1, tile_width: size, tile_height: size }],
        },
    )
}

/// Fetches a fixed 4x4 RGBA image regardless of the requested URL: a solid
/// 2x2-pixel block per quadrant, so a viewport rotation shows up as which
/// block lands where rather than a single flat color.
struct QuadrantFetcher {
    top_left: [u8; 4],
    top_right: [u8; 4],
    bottom_left: [u8; 4],
    bottom_right: [u8; 4],
}

#[async_trait]
impl TileFetcher for QuadrantFetcher {
    async fn fetch(&self, _url: &str, _cancel: CancellationToken) -> Result<Bytes> {
        let row = |left: [u8; 4], right: [u8; 4]| [left, left, right, right].concat();
        let mut bytes = Vec::with_capacity(64);
        bytes.extend(row(self.top_left, self.top_right));
        bytes.extend(row(self.top_left, self.top_right));
        bytes.extend(row(self.bottom_left, self.bottom_right));
        bytes.extend(row(self.bottom_left, self.bottom_right));
        Ok(Bytes::from(bytes))
    }
}

/// Interprets the fetched bytes as a 4x4 RGBA image, row-major.
struct FourByFourDecoder;

impl TileDecoder for FourByFourDecoder {
    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage> {
        Ok(DecodedImage { width: 4, height: 4, pixels: bytes.to_vec() })
    }
}

fn quadrant_tile_info(resource_id: &str) -> (String, ImageInfo) {
    (
        resource_id.to_string(),
        ImageInfo {
            resource_id: resource_id.to_string(),
            width: 4,
            height: 4,
            zoom_levels: vec![ZoomLevel { scale_factor: 1, tile_width: 4, tile_height: 4 }],
        },
    )
}

fn identity_annotation(resource_id: &str, min: f64, max: f64) -> Annotation {
    let doc = serde_json::json!({
        "type": "GeoreferencedMap",
        "resource": { "id": resource_id, "type": "ImageService3", "width": max as u32, "height": max as u32 },
        "gcps": [
            { "resource": [min, min], "geo": [min, min] },
            { "resource": [max, min], "geo": [max, min] },
            { "resource": [min, max], "geo": [min, max] },
        ],
        "resourceMask": [[min, min], [max, min], [max, max], [min, max]],
        "transformation": { "type": "polynomial1" },
    });
    serde_json::from_value(doc).unwrap()
}

fn pixel_at(output: &RenderOutput, width: u32, x: u32, y: u32) -> [u8; 4] {
    match output {
        RenderOutput::RawRgba { pixels, .. } => {
            let idx = (y as usize * width as usize + x as usize) * 4;
            [pixels[idx], pixels[idx + 1], pixels[idx + 2], pixels[idx + 3]]
        }
        _ => panic!("expected RawRgba output"),
    }
}

/// Scenario: a single map with identity GCPs and a viewport matching its
/// mask exactly renders the fetched tile's color across the frame.
#[tokio::test]
async fn identity_map_with_matching_viewport_renders_source_color() {
    let loader = StaticImageInfoLoader { infos: vec![single_tile_info("https://example.org/iiif/map1", 100)] };
    let fetcher = ColorByResourceFetcher { colors: vec![("map1".to_string(), [200, 150, 50, 255])] };

    let mut engine = Engine::with_projection(
        Arc::new(loader),
        Arc::new(fetcher),
        Arc::new(OnePixelDecoder),
        Arc::new(IdentityProjection),
        EngineConfig::default(),
    );

    engine.add_annotation(MapId(1), identity_annotation("https://example.org/iiif/map1", 0.0, 100.0)).await.unwrap();

    let hull = engine.list().convex_hull(&[]);
    let viewport = Viewport::from_size_and_polygon((100, 100), &hull, Fit::Contain, 0.0, 1.0).unwrap();

    // First pass kicks off the fetch; wait for it, then render again so the
    // cache already holds the decoded tile.
    engine.prepare(&viewport);
    engine.all_requested_tiles_loaded().await;
    let output = engine.render_int_array(&viewport);

    assert_eq!(output.width(), 100);
    assert_eq!(output.height(), 100);
    assert_eq!(pixel_at(&output, 100, 50, 50), [200, 150, 50, 255]);
    assert_eq!(pixel_at(&output, 100, 1, 1), [200, 150, 50, 255]);
}

/// Scenario: the same identity-GCP setup as the matching-viewport case
/// above, but the viewport is rotated by a quarter turn. Expected: the
/// rendered quadrants land rotated 90 degrees relative to the unrotated
/// render of the same map.
#[tokio::test]
async fn rotated_viewport_renders_the_source_rotated_a_quarter_turn() {
    let resource_id = "https://example.org/iiif/quad1";
    let loader = StaticImageInfoLoader { infos: vec![quadrant_tile_info(resource_id)] };
    let fetcher = QuadrantFetcher {
        top_left: [255, 0, 0, 255],
        top_right: [0, 255, 0, 255],
        bottom_left: [0, 0, 255, 255],
        bottom_right: [255, 255, 0, 255],
    };

    let mut engine = Engine::with_projection(
        Arc::new(loader),
        Arc::new(fetcher),
        Arc::new(FourByFourDecoder),
        Arc::new(IdentityProjection),
        EngineConfig::default(),
    );
    engine.add_annotation(MapId(1), identity_annotation(resource_id, 0.0, 4.0)).await.unwrap();

    let hull = engine.list().convex_hull(&[]);
    let unrotated = Viewport::from_size_and_polygon((100, 100), &hull, Fit::Contain, 0.0, 1.0).unwrap();
    let rotated =
        Viewport::from_size_and_polygon((100, 100), &hull, Fit::Contain, std::f64::consts::FRAC_PI_2, 1.0).unwrap();

    engine.prepare(&unrotated);
    engine.all_requested_tiles_loaded().await;
    let before = engine.render_int_array(&unrotated);
    assert_eq!(pixel_at(&before, 100, 25, 75), [255, 0, 0, 255]);
    assert_eq!(pixel_at(&before, 100, 75, 75), [0, 255, 0, 255]);
    assert_eq!(pixel_at(&before, 100, 25, 25), [0, 0, 255, 255]);
    assert_eq!(pixel_at(&before, 100, 75, 25), [255, 255, 0, 255]);

    engine.prepare(&rotated);
    engine.all_requested_tiles_loaded().await;
    let after = engine.render_int_array(&rotated);
    assert_eq!(pixel_at(&after, 100, 25, 25), [255, 0, 0, 255]);
    assert_eq!(pixel_at(&after, 100, 25, 75), [0, 255, 0, 255]);
    assert_eq!(pixel_at(&after, 100, 75, 25), [0, 0, 255, 255]);
    assert_eq!(pixel_at(&after, 100, 75, 75), [255, 255, 0, 255]);
}

/// Scenario: two overlapping maps, the top one at half opacity. Checks the
/// three distinct regions (bottom-only, top-only, overlap) independently.
#[tokio::test]
async fn overlapping_maps_blend_by_z_order_and_opacity() {
    let loader = StaticImageInfoLoader {
        infos: vec![single_tile_info("https://example.org/iiif/bottom", 100), single_tile_info("https://example.org/iiif/top", 150)],
    };
    let fetcher = ColorByResourceFetcher {
        colors: vec![("bottom".to_string(), [255, 0, 0, 255]), ("top".to_string(), [0, 0, 255, 255])],
    };

    let mut engine = Engine::with_projection(
        Arc::new(loader),
        Arc::new(fetcher),
        Arc::new(OnePixelDecoder),
        Arc::new(IdentityProjection),
        EngineConfig::default(),
    );

    engine.add_annotation(MapId(1), identity_annotation("https://example.org/iiif/bottom", 0.0, 100.0)).await.unwrap();
    engine.add_annotation(MapId(2), identity_annotation("https://example.org/iiif/top", 50.0, 150.0)).await.unwrap();
    engine.list_mut().get_mut(MapId(2)).unwrap().set_opacity(0.5);

    let viewport = Viewport::new((150, 150), Point::new(75.0, 75.0), 1.0, 0.0, 1.0);

    engine.prepare(&viewport);
    engine.all_requested_tiles_loaded().await;
    let output = engine.render_int_array(&viewport);

    // Bottom-only region (top map's mask does not reach here).
    assert_eq!(pixel_at(&output, 150, 25, 125), [255, 0, 0, 255]);
    // Top-only region, composited over a transparent background.
    let top_only = pixel_at(&output, 150, 125, 25);
    assert_eq!([top_only[0], top_only[1], top_only[2]], [0, 0, 255]);
    assert!((top_only[3] as i32 - 128).abs() <= 1);
    // Overlap: half blue over opaque red.
    let overlap = pixel_at(&output, 150, 75, 75);
    assert!((overlap[0] as i32 - 128).abs() <= 1);
    assert_eq!(overlap[1], 0);
    assert!((overlap[2] as i32 - 128).abs() <= 1);
    assert_eq!(overlap[3], 255);
}

/// Scenario: `fromSizeAndPolygon` with a square that fits the viewport's
/// height exactly under `contain`.
#[test]
fn contain_fit_of_a_square_centers_and_uses_unit_scale() {
    let square = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0), Point::new(0.0, 100.0)];
    let viewport = Viewport::from_size_and_polygon((200, 100), &square, Fit::Contain, 0.0, 1.0).unwrap();
    assert_eq!(viewport.projected_geo_center(), Point::new(50.0, 50.0));
    assert_eq!(viewport.scale(), 1.0);
}

/// Scenario: aborting in-flight fetches leaves no loaded entries behind for
/// the aborted URLs, even though the entries remain (as failed) until the
/// next prune.
#[tokio::test]
async fn aborted_fetches_never_surface_as_loaded() {
    struct YieldingFetcher {
        started: AtomicUsize,
        fail_urls: Mutex<HashSet<String>>,
    }

    #[async_trait]
    impl TileFetcher for YieldingFetcher {
        async fn fetch(&self, url: &str, cancel: CancellationToken) -> Result<Bytes> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if cancel.is_cancelled() || self.fail_urls.lock().unwrap().contains(url) {
                return Err(Error::TileFetch { url: url.to_string(), source: Box::new(std::io::Error::other("aborted")) });
            }
            Ok(Bytes::from_static(b"\x01\x02\x03\xff"))
        }
    }

    let fetcher = Arc::new(YieldingFetcher { started: AtomicUsize::new(0), fail_urls: Mutex::new(HashSet::new()) });
    let mut cache = TileCache::new(fetcher.clone(), Arc::new(OnePixelDecoder), CacheConfig::default());

    let requests: Vec<TileRequest> = (0..5)
        .map(|i| TileRequest {
            url: format!("https://example.org/tile/{i}"),
            map_id: MapId(1),
            tile: Tile { column: i, row: 0, scale_factor: 1 },
        })
        .collect();
    cache.request_fetchable_tiles(&requests);
    for request in &requests {
        cache.abort(&request.url);
    }
    cache.all_requested_tiles_loaded().await;

    assert_eq!(fetcher.started.load(Ordering::SeqCst), 5);
    for request in &requests {
        let entry = cache.get(&request.url).unwrap();
        assert!(entry.is_failed());
        assert!(entry.image().is_none());
    }
}

/// Scenario: `setResourceMask` starts a transition whose interpolated
/// triangle points sit at the midpoint of the old and new triangulations
/// partway through the window.
#[test]
fn mask_change_interpolates_triangle_points_mid_transition() {
    use georef_render::config::RenderConfig;
    use georef_render::transformer::TransformationKind;
    use georef_render::warped_map::{GroundControlPoint, WarpedMap};

    let gcps = vec![
        GroundControlPoint { resource: Point::new(0.0, 0.0), geo: Point::new(0.0, 0.0) },
        GroundControlPoint { resource: Point::new(100.0, 0.0), geo: Point::new(100.0, 0.0) },
        GroundControlPoint { resource: Point::new(0.0, 100.0), geo: Point::new(0.0, 100.0) },
    ];
    let original_mask = vec![Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(100.0, 100.0), Point::new(0.0, 100.0)];
    let config = RenderConfig { max_subdivision_depth: 0, ..RenderConfig::default() };

    let mut map = WarpedMap::new(
        MapId(1),
        "https://example.org/iiif/map1".into(),
        gcps,
        original_mask.clone(),
        TransformationKind::Polynomial1,
        &IdentityProjection,
        &config,
    )
    .unwrap();

    let before = map.triangulation().projected_geo_triangles.clone();
    let shifted_mask: Vec<Point> = original_mask.iter().map(|p| *p + Point::new(10.0, 10.0)).collect();
    map.set_resource_mask(shifted_mask, &config).unwrap();
    let after = map.triangulation().projected_geo_triangles.clone();
    assert_eq!(before.len(), after.len());

    let mid = map.interpolated_projected_triangles(0.5);
    for ((b, a), m) in before.iter().zip(after.iter()).zip(mid.iter()) {
        assert!((m.a - b.a.lerp(a.a, 0.5)).length() < 1e-9);
        assert!((m.b - b.b.lerp(a.b, 0.5)).length() < 1e-9);
        assert!((m.c - b.c.lerp(a.c, 0.5)).length() < 1e-9);
    }
}
