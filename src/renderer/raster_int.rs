//! Int-array rasterizer: per-viewport-pixel backward path.
//! For every output pixel, invert `projectedGeo → viewport`, back-project
//! into resource space, locate the enclosing tile by integer division, and
//! bilinearly sample it if cached — writing transparent otherwise. Maps
//! are composited back-to-front by simple alpha-over.

use crate::cache::TileCache;
use crate::external::{DecodedImage, RenderOutput};
use crate::geometry::Point;
use crate::renderer::base::{MapRenderState, RenderPlan};
use crate::tile_grid::{Tile, ZoomLevel};
use crate::warped_map::WarpedMap;
use crate::warped_map_list::WarpedMapList;

/// Renders `plan` against `list`'s current z-order and `cache`'s currently
/// loaded tiles, producing a `width x height` RGBA buffer.
pub fn render(viewport_size: (u32, u32), list: &WarpedMapList, plan: &RenderPlan, cache: &TileCache) -> RenderOutput {
    let (width, height) = viewport_size;
    let mut pixels = vec![0u8; width as usize * height as usize * 4];

    let from_viewport = plan.viewport.projected_geo_to_viewport().inverse();

    let mut ordered: Vec<&MapRenderState> = plan.maps.iter().collect();
    let z_order = list.z_order();
    ordered.sort_by_key(|state| z_order.iter().position(|id| *id == state.map_id).unwrap_or(usize::MAX));

    for state in ordered {
        let Some(map) = list.get(state.map_id) else { continue };
        if !list.is_visible(state.map_id) {
            continue;
        }
        let opacity = map.opacity();
        if opacity <= 0.0 {
            continue;
        }

        for y in 0..height {
            for x in 0..width {
                let viewport_point = Point::new(x as f64 + 0.5, y as f64 + 0.5);
                let projected = from_viewport.transform_point2(viewport_point);
                let resource = map.transformer().backward(projected);
                if !resource.x.is_finite() || !resource.y.is_finite() {
                    continue; // transform-domain failure: leave "no data"
                }
                let Some(sample) = sample_tile(map, state, cache, resource) else { continue };
                let idx = (y as usize * width as usize + x as usize) * 4;
                blend_over(&mut pixels[idx..idx + 4], sample, opacity);
            }
        }
    }

    RenderOutput::RawRgba { width, height, pixels }
}

fn sample_tile(map: &WarpedMap, state: &MapRenderState, cache: &TileCache, resource: Point) -> Option<[u8; 4]> {
    let level = state.zoom_level;
    let image_info = map.image_info()?;
    let tile = enclosing_tile(&level, resource)?;
    let (tx, ty, tw, th) = tile.resource_region(&level, image_info.width, image_info.height);
    if tw == 0 || th == 0 {
        return None;
    }
    let url = crate::external::iiif_tile_url(map.resource_id(), tx, ty, tw, th, level.tile_width);
    let entry = cache.get(&url)?;
    if !entry.is_loaded() {
        return None; // not yet cached; left transparent for re-fetch on a later render
    }
    let image = entry.image()?;
    let local_x = (resource.x - tx as f64) / tw.max(1) as f64 * image.width as f64 - 0.5;
    let local_y = (resource.y - ty as f64) / th.max(1) as f64 * image.height as f64 - 0.5;
    Some(bilinear_sample(image, local_x, local_y))
}

fn enclosing_tile(level: &ZoomLevel, resource: Point) -> Option<Tile> {
    if resource.x < 0.0 || resource.y < 0.0 {
        return None;
    }
    let region_w = (level.tile_width * level.scale_factor) as f64;
    let region_h = (level.tile_height * level.scale_factor) as f64;
    if region_w <= 0.0 || region_h <= 0.0 {
        return None;
    }
    Some(Tile {
        column: (resource.x / region_w).floor() as u32,
        row: (resource.y / region_h).floor() as u32,
        scale_factor: level.scale_factor,
    })
}

fn bilinear_sample(image: &DecodedImage, x: f64, y: f64) -> [u8; 4] {
    let w = image.width as i64;
    let h = image.height as i64;
    if w == 0 || h == 0 {
        return [0, 0, 0, 0];
    }
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let fetch = |px: i64, py: i64| -> [f64; 4] {
        let cx = px.clamp(0, w - 1) as usize;
        let cy = py.clamp(0, h - 1) as usize;
        let idx = (cy * image.width as usize + cx) * 4;
        [
            image.pixels[idx] as f64,
            image.pixels[idx + 1] as f64,
            image.pixels[idx + 2] as f64,
            image.pixels[idx + 3] as f64,
        ]
    };

    let c00 = fetch(x0, y0);
    let c10 = fetch(x0 + 1, y0);
    let c01 = fetch(x0, y0 + 1);
    let c11 = fetch(x0 + 1, y0 + 1);

    let mut out = [0u8; 4];
    for channel in 0..4 {
        let top = c00[channel] * (1.0 - fx) + c10[channel] * fx;
        let bottom = c01[channel] * (1.0 - fx) + c11[channel] * fx;
        out[channel] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

fn blend_over(dst: &mut [u8], src: [u8; 4], opacity: f32) {
    let src_a = (src[3] as f32 / 255.0) * opacity.clamp(0.0, 1.0);
    if src_a <= 0.0 {
        return;
    }
    let dst_a = dst[3] as f32 / 255.0;
    let out_a = src_a + dst_a * (1.0 - src_a);
    if out_a <= 0.0 {
        return;
    }
    for channel in 0..3 {
        let s = src[channel] as f32 / 255.0;
        let d = dst[channel] as f32 / 255.0;
        let out = (s * src_a + d * dst_a * (1.0 - src_a)) / out_a;
        dst[channel] = (out * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bilinear_sample_of_uniform_image_returns_that_color() {
        let image = DecodedImage { width: 2, height: 2, pixels: vec![10, 20, 30, 255, 10, 20, 30, 255, 10, 20, 30, 255, 10, 20, 30, 255] };
        let sample = bilinear_sample(&image, 0.5, 0.5);
        assert_eq!(sample, [10, 20, 30, 255]);
    }

    #[test]
    fn blend_over_opaque_src_replaces_dst() {
        let mut dst = [100u8, 100, 100, 255];
        blend_over(&mut dst, [0, 0, 0, 255], 1.0);
        assert_eq!(dst, [0, 0, 0, 255]);
    }

    #[test]
    fn blend_over_half_opacity_averages_toward_background() {
        let mut dst = [0u8, 0, 0, 255];
        blend_over(&mut dst, [255, 255, 255, 255], 0.5);
        assert_eq!(dst, [128, 128, 128, 255]);
    }

    #[test]
    fn blend_over_zero_opacity_is_a_no_op() {
        let mut dst = [7u8, 8, 9, 255];
        blend_over(&mut dst, [255, 0, 0, 255], 0.0);
        assert_eq!(dst, [7, 8, 9, 255]);
    }
}
