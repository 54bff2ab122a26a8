//! Every tunable named by this crate, gathered in one place with a
//! documented [`Default`] rather than scattered magic numbers.

use std::time::Duration;

/// Render-pipeline tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    /// Fraction the R-tree query / buffered viewport rectangle is expanded
    /// by, to pre-warm tiles just outside the visible area.
    pub buffer_ratio: f64,
    /// Backprojected-ring edge refinement tolerance: subdivide while a
    /// segment's straight-line interpolant in projected-geo space differs
    /// from the true backprojection by more than `max_offset_ratio *
    /// segment_length`.
    pub max_offset_ratio: f64,
    /// Recursion cap for both the backprojected-ring refinement and mask
    /// edge densification.
    pub max_subdivision_depth: u32,
    /// Longest edge length (resource pixels) tolerated before the mask
    /// triangulator subdivides it further.
    pub mask_max_edge_length: f64,
    /// Leading+trailing throttle window around `render` calls.
    pub render_throttle_wait: Duration,
    /// Duration of the cross-fade between previous and new triangle points
    /// after a setter invalidates a map's geometry.
    pub transition_duration: Duration,
    /// Sample count for the zoom-level Jacobian-magnitude median.
    pub zoom_level_sample_count: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_ratio: 0.25,
            max_offset_ratio: 0.01,
            max_subdivision_depth: 8,
            mask_max_edge_length: 256.0,
            render_throttle_wait: Duration::from_millis(100),
            transition_duration: Duration::from_millis(200),
            zoom_level_sample_count: 9,
        }
    }
}

/// Tile-cache tunables.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Soft cap on cached entries; `prune` is the actual eviction mechanism,
    /// this bounds how large the cache is allowed to grow between prunes.
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { max_entries: 4096 }
    }
}

/// Top-level configuration bundle threaded through the renderer and cache.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EngineConfig {
    pub render: RenderConfig,
    pub cache: CacheConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = RenderConfig::default();
        assert_eq!(cfg.buffer_ratio, 0.25);
        assert_eq!(cfg.render_throttle_wait, Duration::from_millis(100));
        assert_eq!(cfg.transition_duration, Duration::from_millis(200));
    }
}
