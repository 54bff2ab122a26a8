//! Georeferenced raster warping and rendering.
//!
//! A georeference annotation (image + ground control points + a resource
//! mask) is fitted into a `WarpedMap`: a GCP-derived transform between pixel
//! space and a projected-geo plane, plus a matching triangulation used both
//! to bound the map and to drive per-vertex distortion. A `WarpedMapList`
//! holds many of these with z-order, visibility and an R-tree spatial index.
//! Given a `Viewport`, the `BaseRenderer` decides which IIIF tiles are
//! needed at which zoom level and hands them to a `TileCache` to fetch;
//! `renderer::raster_int` and `renderer::raster_gpu` turn the result into
//! pixels or GPU-ready draw data respectively.
//!
//! [`Engine`] wires these pieces together for the common case: add
//! annotations, request a render, read back pixels or draw batches. Each
//! module also works standalone for an embedder that wants finer control
//! over concurrency or draw scheduling.

pub mod annotation;
pub mod cache;
pub mod config;
pub mod error;
pub mod events;
pub mod external;
pub mod geometry;
pub mod projection;
pub mod renderer;
pub mod tile_grid;
pub mod transformer;
pub mod viewport;
pub mod warped_map;
pub mod warped_map_list;

use std::sync::Arc;

use annotation::Annotation;
use cache::TileCache;
use config::EngineConfig;
use error::Result;
use events::EventBus;
use external::{ImageInfoLoader, RenderOutput, TileDecoder, TileFetcher};
use projection::{Projection, SphericalMercator};
use renderer::{raster_gpu, raster_int, BaseRenderer, MapDrawBatch, RenderPlan};
use viewport::Viewport;
use warped_map::{GroundControlPoint, MapId, WarpedMap};
use warped_map_list::WarpedMapList;

/// Ties a [`WarpedMapList`], [`TileCache`] and the two renderer back ends
/// together behind one owner, for callers that don't need to manage them
/// independently. `WarpedMapList::add` itself stays synchronous (it takes an
/// already-built [`WarpedMap`]); `Engine::add_annotation` is the async
/// wrapper that fits the transform, inserts the map, then awaits image-info
/// loading and applies it — the one place in the crate where "construct a
/// map from an annotation" and "an async collaborator" meet.
pub struct Engine {
    list: WarpedMapList,
    cache: TileCache,
    base_renderer: BaseRenderer,
    gpu_rasterizer: raster_gpu::GpuRasterizer,
    image_info_loader: Arc<dyn ImageInfoLoader>,
    projection: Arc<dyn Projection + Send + Sync>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(
        image_info_loader: Arc<dyn ImageInfoLoader>,
        tile_fetcher: Arc<dyn TileFetcher>,
        tile_decoder: Arc<dyn TileDecoder>,
        config: EngineConfig,
    ) -> Self {
        Self::with_projection(image_info_loader, tile_fetcher, tile_decoder, Arc::new(SphericalMercator), config)
    }

    /// Like [`Engine::new`], with an explicit geographic projection instead
    /// of the default Web/Pseudo-Mercator.
    pub fn with_projection(
        image_info_loader: Arc<dyn ImageInfoLoader>,
        tile_fetcher: Arc<dyn TileFetcher>,
        tile_decoder: Arc<dyn TileDecoder>,
        projection: Arc<dyn Projection + Send + Sync>,
        config: EngineConfig,
    ) -> Self {
        Self {
            list: WarpedMapList::new(),
            cache: TileCache::new(tile_fetcher, tile_decoder, config.cache),
            base_renderer: BaseRenderer::new(config.render),
            gpu_rasterizer: raster_gpu::GpuRasterizer::new(),
            image_info_loader,
            projection,
            config,
        }
    }

    pub fn list(&self) -> &WarpedMapList {
        &self.list
    }

    pub fn list_mut(&mut self) -> &mut WarpedMapList {
        &mut self.list
    }

    pub fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut TileCache {
        &mut self.cache
    }

    pub fn list_events(&mut self) -> &mut EventBus {
        self.list.events()
    }

    pub fn cache_events(&mut self) -> &mut EventBus {
        self.cache.events()
    }

    /// Fits `annotation` into a [`WarpedMap`] under `map_id`, inserts it
    /// (`Created → imageInfoLoading`), then awaits the image-info loader and
    /// applies the result (`imageInfoLoading → ready`). Fitting/insertion
    /// errors surface directly; an image-info load failure leaves the map in
    /// `imageInfoLoading` rather than failing the whole call, since the
    /// caller may want to retry the load independently of re-adding the map.
    pub async fn add_annotation(&mut self, map_id: MapId, annotation: Annotation) -> Result<MapId> {
        let gcps: Vec<GroundControlPoint> = annotation
            .gcp_pairs()
            .into_iter()
            .map(|(resource, geo)| GroundControlPoint { resource, geo })
            .collect();
        let mask = annotation.resource_mask_ring();
        let kind = annotation.transformation_kind();
        let resource_id = annotation.resource.id.clone();

        let map = WarpedMap::new(map_id, resource_id.clone(), gcps, mask, kind, self.projection.as_ref(), &self.config.render)?;
        let map_id = self.list.add(map)?;

        match self.image_info_loader.load(&resource_id).await {
            Ok(info) => {
                if let Some(map) = self.list.get_mut(map_id) {
                    map.apply_image_info(info);
                }
            }
            Err(error) => {
                tracing::warn!(%resource_id, %error, "image-info load failed; map stays in imageInfoLoading");
            }
        }

        Ok(map_id)
    }

    pub fn remove(&mut self, map_id: MapId) -> Option<WarpedMap> {
        self.list.remove(map_id)
    }

    /// Runs one `prepare` pass (map/zoom/tile selection, cache request +
    /// prune) and returns the resulting plan, draining any fetch completions
    /// that arrived since the last render first so newly loaded tiles are
    /// visible to this pass's rasterizer call.
    pub fn prepare(&mut self, viewport: &Viewport) -> RenderPlan {
        self.cache.poll_completions();
        self.base_renderer.prepare(&mut self.list, viewport, &mut self.cache)
    }

    /// Int-array rasterizer pass (backward per-pixel path): prepares, then
    /// renders an RGBA buffer sized to `viewport`.
    pub fn render_int_array(&mut self, viewport: &Viewport) -> RenderOutput {
        let plan = self.prepare(viewport);
        raster_int::render(viewport.viewport_size(), &self.list, &plan, &self.cache)
    }

    /// GPU-style rasterizer pass (forward triangle/atlas path): prepares,
    /// then builds one draw batch per visible map.
    pub fn render_gpu_batches(&mut self, viewport: &Viewport) -> Vec<MapDrawBatch> {
        let plan = self.prepare(viewport);
        self.gpu_rasterizer.render(&self.list, &plan, &self.cache, &self.config.render)
    }

    /// Awaits every fetch the most recent `prepare`/render call started.
    pub async fn all_requested_tiles_loaded(&mut self) {
        self.cache.all_requested_tiles_loaded().await;
    }
}
