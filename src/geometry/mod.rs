//! Coordinate-space-agnostic geometry primitives: points, bounding boxes,
//! affine transforms, and mask triangulation. Everything here is plain math —
//! no knowledge of resource space, projected-geo space, or the viewport
//! cascade lives in this module (see [`crate::viewport`] for that).

mod affine;
mod point;
mod triangulate;

pub use affine::{jacobian, jacobian_fd, log_abs_det, translate_rotate_scale, Affine};
pub use point::{convex_hull, point_in_ring, ring_bbox, ring_centroid, Bbox, Point, Ring};
pub use triangulate::{densify_ring, triangulate_mask, triangulate_ring, Triangle};
