//! Crate-wide error type. One variant per failure kind: validation at
//! add-time, image-info loading, per-tile fetch failures, transform-domain
//! failures, empty viewport-factory input, and unusable zoom-level
//! selection.

use thiserror::Error;

use crate::warped_map::MapId;

#[derive(Debug, Error)]
pub enum Error {
    /// An annotation (or a setter's input) failed a precondition the core
    /// itself owns — e.g. too few GCPs for the requested transformation kind.
    /// Surfaces from `WarpedMapList::add` or a `WarpedMap` setter; the map is
    /// never inserted/mutated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// `mapId` collides with one already present in the list.
    #[error("map id {0:?} already exists")]
    DuplicateMapId(MapId),

    /// The image-info loader failed or returned a malformed response.
    #[error("image info unavailable for resource {resource_id}: {message}")]
    ImageInfo { resource_id: String, message: String },

    /// A tile fetch failed. Always local to the cache entry — never
    /// propagated out of a render call, only observable via the
    /// `TileFetchError` event.
    #[error("tile fetch failed for {url}")]
    TileFetch {
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// A transformer was asked to map a point outside its convergent domain
    /// (e.g. thin-plate-spline extrapolation blowing up). Callers should
    /// treat this as "no data", not surface it.
    #[error("point outside transform domain")]
    TransformDomain,

    /// A viewport factory (`from_size_and_maps`, etc.) was given no maps and
    /// no polygon to fit.
    #[error("viewport factory received no maps or polygon to fit")]
    EmptyInput,

    /// No tile-grid zoom level satisfies the requested resource-per-viewport
    /// pixel ratio.
    #[error("no usable zoom level for this resource")]
    NoZoomLevel,
}

pub type Result<T> = std::result::Result<T, Error>;
