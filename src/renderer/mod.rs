//! Rendering back ends: the base renderer picks maps, zoom levels and tiles
//! for a (list, viewport) pair; the two rasterizer back ends turn the
//! resulting cached tiles into pixels or GPU-ready draw batches.

pub mod base;
pub mod raster_gpu;
pub mod raster_int;
pub mod throttle;

pub use base::{BaseRenderer, MapRenderState, RenderPlan, TileRef};
pub use raster_gpu::{GpuRasterizer, MapDrawBatch};
pub use throttle::RenderThrottle;
