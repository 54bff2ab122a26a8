//! GPU-style rasterizer: forward-transform path. Produces
//! plain data a GPU pipeline would consume — a packed texture atlas, vertex
//! and index buffers in clip space, and per-map effect uniforms — without
//! opening any GPU context itself; binding these to `wgpu` (or any other
//! backend) is left to the embedder.

use crate::cache::TileCache;
use crate::config::RenderConfig;
use crate::renderer::base::RenderPlan;
use crate::tile_grid::ZoomLevel;
use crate::warped_map::{MapId, WarpedMap};
use crate::warped_map_list::WarpedMapList;

/// One packed tile inside a map's [`TextureAtlas`]: where it landed in atlas
/// pixel space, the resource region it covers, and the zoom level it was
/// fetched at — everything a fragment shader needs to pick the right atlas
/// entry for a resource-space sample.
#[derive(Debug, Clone, Copy)]
pub struct AtlasEntry {
    pub atlas_origin: (u32, u32),
    pub resource_region: (u32, u32, u32, u32),
    pub scale_factor: u32,
    pub size: (u32, u32),
}

/// One map's bin-packed texture atlas: a single RGBA8 buffer plus the
/// entries locating each source tile within it.
#[derive(Debug, Clone)]
pub struct TextureAtlas {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
    pub entries: Vec<AtlasEntry>,
}

/// One triangle-mesh vertex: clip-space position, matching resource
/// coordinate (for atlas sampling), and a per-vertex distortion scalar,
/// all downcast to `f32` here — the only place in the crate that leaves
/// double precision, since this is what actually reaches a GPU buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub clip_position: [f32; 2],
    pub resource: [f32; 2],
    pub distortion: f32,
}

/// Color-removal effect: pixels close to `color` (within `threshold`, with
/// `hardness` controlling the falloff's sharpness) are treated as transparent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RemoveColor {
    pub color: [f32; 3],
    pub threshold: f32,
    pub hardness: f32,
}

/// Per-map render uniforms: opacity and saturation default to 1, colorize
/// and remove-color default to off, and the grid overlay defaults to off.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterEffects {
    pub opacity: f32,
    pub saturation: f32,
    pub colorize: Option<[f32; 3]>,
    pub remove_color: Option<RemoveColor>,
    pub grid_enabled: bool,
}

impl Default for RasterEffects {
    fn default() -> Self {
        Self { opacity: 1.0, saturation: 1.0, colorize: None, remove_color: None, grid_enabled: false }
    }
}

/// One map's draw data: its atlas, the triangle mesh (clip-space vertices +
/// triangle-list indices), and its effect uniforms.
#[derive(Debug, Clone)]
pub struct MapDrawBatch {
    pub map_id: MapId,
    pub atlas: TextureAtlas,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub effects: RasterEffects,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct GpuRasterizer;

impl GpuRasterizer {
    pub fn new() -> Self {
        Self
    }

    /// Builds one [`MapDrawBatch`] per map in `plan`, in the list's current
    /// z-order, from whichever of that map's requested tiles are currently
    /// loaded in `cache`. A map with no loaded tiles yet yields an
    /// atlas-less batch with an empty mesh — left to the embedder to skip.
    pub fn render(&self, list: &WarpedMapList, plan: &RenderPlan, cache: &TileCache, config: &RenderConfig) -> Vec<MapDrawBatch> {
        let z_order = list.z_order();
        let mut states: Vec<_> = plan.maps.iter().collect();
        states.sort_by_key(|state| z_order.iter().position(|id| *id == state.map_id).unwrap_or(usize::MAX));

        let to_clip = plan.viewport.projected_geo_to_clip();

        states
            .into_iter()
            .filter_map(|state| {
                let map = list.get(state.map_id)?;
                Some(self.build_batch(map, state, cache, config, &to_clip))
            })
            .collect()
    }

    fn build_batch(
        &self,
        map: &WarpedMap,
        state: &crate::renderer::base::MapRenderState,
        cache: &TileCache,
        config: &RenderConfig,
        to_clip: &crate::geometry::Affine,
    ) -> MapDrawBatch {
        let mut packable = Vec::new();
        for tile_ref in state.tiles.iter().chain(state.overview_tiles.iter()) {
            if let Some(entry) = cache.get(&tile_ref.url) {
                if let Some(image) = entry.image() {
                    let level = tile_level(map, tile_ref.tile.scale_factor, state);
                    let image_info = map.image_info();
                    let region = image_info
                        .map(|info| tile_ref.tile.resource_region(&level, info.width, info.height))
                        .unwrap_or((0, 0, image.width, image.height));
                    packable.push((region, tile_ref.tile.scale_factor, image.as_ref()));
                }
            }
        }

        let atlas = pack_atlas(&packable);

        let t = map.transition_progress(config);
        let projected = map.interpolated_projected_triangles(t);
        let resource = &map.triangulation().resource_triangles;
        let distortion = &map.triangulation().distortion;

        let mut vertices = Vec::with_capacity(resource.len() * 3);
        let mut indices = Vec::with_capacity(resource.len() * 3);
        for (i, (proj_tri, res_tri)) in projected.iter().zip(resource.iter()).enumerate() {
            let d = distortion.get(i).copied().unwrap_or([0.0, 0.0, 0.0]);
            let proj_verts = proj_tri.vertices();
            let res_verts = res_tri.vertices();
            for v in 0..3 {
                let clip_pos = to_clip.transform_point2(proj_verts[v]);
                vertices.push(Vertex {
                    clip_position: [clip_pos.x as f32, clip_pos.y as f32],
                    resource: [res_verts[v].x as f32, res_verts[v].y as f32],
                    distortion: d[v] as f32,
                });
            }
            let base = (i * 3) as u32;
            indices.extend_from_slice(&[base, base + 1, base + 2]);
        }

        MapDrawBatch {
            map_id: map.map_id(),
            atlas,
            vertices,
            indices,
            effects: RasterEffects { opacity: map.opacity(), ..RasterEffects::default() },
        }
    }
}

fn tile_level(map: &WarpedMap, scale_factor: u32, state: &crate::renderer::base::MapRenderState) -> ZoomLevel {
    if state.zoom_level.scale_factor == scale_factor {
        state.zoom_level
    } else if state.overview_zoom_level.scale_factor == scale_factor {
        state.overview_zoom_level
    } else {
        map.image_info()
            .and_then(|info| info.zoom_levels.iter().find(|l| l.scale_factor == scale_factor).copied())
            .unwrap_or(state.zoom_level)
    }
}

/// Shelf (row) bin-packs `tiles` into one RGBA8 atlas, widest-first. Not
/// space-optimal, but simple and deterministic; atlas dimensions are not
/// rounded to powers of two.
fn pack_atlas(tiles: &[((u32, u32, u32, u32), u32, &crate::external::DecodedImage)]) -> TextureAtlas {
    if tiles.is_empty() {
        return TextureAtlas { width: 0, height: 0, pixels: Vec::new(), entries: Vec::new() };
    }

    let mut order: Vec<usize> = (0..tiles.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(tiles[i].2.height));

    let total_area: u64 = tiles.iter().map(|(_, _, img)| img.width as u64 * img.height as u64).sum();
    let max_tile_width = tiles.iter().map(|(_, _, img)| img.width).max().unwrap_or(1);
    let atlas_width = (total_area as f64).sqrt().ceil().max(max_tile_width as f64) as u32;

    let mut shelf_x = 0u32;
    let mut shelf_y = 0u32;
    let mut shelf_height = 0u32;
    let mut atlas_width_used = 0u32;
    let mut placements = vec![(0u32, 0u32); tiles.len()];

    for &i in &order {
        let (_, _, image) = &tiles[i];
        if shelf_x + image.width > atlas_width && shelf_x > 0 {
            shelf_y += shelf_height;
            shelf_x = 0;
            shelf_height = 0;
        }
        placements[i] = (shelf_x, shelf_y);
        shelf_x += image.width;
        shelf_height = shelf_height.max(image.height);
        atlas_width_used = atlas_width_used.max(shelf_x);
    }
    let atlas_height = shelf_y + shelf_height;

    let mut pixels = vec![0u8; atlas_width_used as usize * atlas_height as usize * 4];
    let mut entries = Vec::with_capacity(tiles.len());
    for (i, (region, scale_factor, image)) in tiles.iter().enumerate() {
        let (ox, oy) = placements[i];
        for row in 0..image.height {
            let src_start = (row * image.width * 4) as usize;
            let src = &image.pixels[src_start..src_start + image.width as usize * 4];
            let dst_row = oy + row;
            let dst_start = (dst_row as usize * atlas_width_used as usize + ox as usize) * 4;
            pixels[dst_start..dst_start + src.len()].copy_from_slice(src);
        }
        entries.push(AtlasEntry {
            atlas_origin: (ox, oy),
            resource_region: *region,
            scale_factor: *scale_factor,
            size: (image.width, image.height),
        });
    }

    TextureAtlas { width: atlas_width_used, height: atlas_height, pixels, entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::DecodedImage;

    fn solid_image(w: u32, h: u32, value: u8) -> DecodedImage {
        DecodedImage { width: w, height: h, pixels: vec![value; (w * h * 4) as usize] }
    }

    #[test]
    fn pack_atlas_of_no_tiles_is_empty() {
        let atlas = pack_atlas(&[]);
        assert_eq!(atlas.width, 0);
        assert_eq!(atlas.entries.len(), 0);
    }

    #[test]
    fn pack_atlas_places_every_tile_without_overlap() {
        let a = solid_image(4, 4, 10);
        let b = solid_image(4, 4, 20);
        let tiles = vec![((0, 0, 4, 4), 1, &a), ((4, 0, 4, 4), 1, &b)];
        let atlas = pack_atlas(&tiles);
        assert_eq!(atlas.entries.len(), 2);
        assert!(atlas.width >= 4 && atlas.height >= 4);
        // Both tiles' pixel values are present somewhere in the packed buffer.
        assert!(atlas.pixels.chunks(4).any(|p| p[0] == 10));
        assert!(atlas.pixels.chunks(4).any(|p| p[0] == 20));
    }

    #[test]
    fn default_effects_match_documented_defaults() {
        let effects = RasterEffects::default();
        assert_eq!(effects.opacity, 1.0);
        assert_eq!(effects.saturation, 1.0);
        assert!(effects.colorize.is_none());
        assert!(effects.remove_color.is_none());
        assert!(!effects.grid_enabled);
    }
}
