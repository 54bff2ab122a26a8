//! Mask triangulation: densify the mask ring so no
//! edge exceeds a configured length, triangulate the densified ring, and
//! discard any triangle whose centroid falls outside the original mask.
//!
//! We run this in `f64` throughout, unlike the fill-tessellation routines
//! typically reached for in this corpus (e.g. `lyon`'s `FillTessellator`),
//! which operate in `f32` — this crate requires triangulation to stay in
//! double precision, so the implementation here is a small ear-clipping
//! triangulator rather than a wrapped tessellation crate. See DESIGN.md.

use super::point::{point_in_ring, Point, Ring};

/// One triangle, referencing three points in whatever space they were built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Point,
    pub b: Point,
    pub c: Point,
}

impl Triangle {
    pub fn centroid(&self) -> Point {
        (self.a + self.b + self.c) / 3.0
    }

    pub fn signed_area(&self) -> f64 {
        0.5 * ((self.b.x - self.a.x) * (self.c.y - self.a.y)
            - (self.c.x - self.a.x) * (self.b.y - self.a.y))
    }

    pub fn vertices(&self) -> [Point; 3] {
        [self.a, self.b, self.c]
    }
}

/// Subdivide every edge of `ring` so no segment exceeds `max_edge_len`.
/// Mirrors this crate's "densify edges by subdivision" step; `max_depth`
/// bounds the subdivisions per original edge so pathological inputs (a
/// single huge edge against a tiny `max_edge_len`) terminate.
pub fn densify_ring(ring: &Ring, max_edge_len: f64, max_depth: u32) -> Ring {
    if ring.len() < 2 || max_edge_len <= 0.0 {
        return ring.clone();
    }
    let mut out = Vec::with_capacity(ring.len() * 2);
    let n = ring.len();
    for i in 0..n {
        let p0 = ring[i];
        let p1 = ring[(i + 1) % n];
        out.push(p0);
        subdivide_edge(p0, p1, max_edge_len, max_depth, &mut out);
    }
    out
}

fn subdivide_edge(p0: Point, p1: Point, max_edge_len: f64, depth: u32, out: &mut Vec<Point>) {
    if depth == 0 || (p1 - p0).length() <= max_edge_len {
        return;
    }
    let mid = (p0 + p1) * 0.5;
    subdivide_edge(p0, mid, max_edge_len, depth - 1, out);
    out.push(mid);
    subdivide_edge(mid, p1, max_edge_len, depth - 1, out);
}

/// Ear-clipping triangulation of a simple (non-self-intersecting) polygon
/// ring, discarding any triangle whose centroid falls outside `mask` — a
/// no-op for a convex densified ring but a real filter for concave masks
/// where `ring` is a refined/buffered version of `mask`.
pub fn triangulate_ring(ring: &Ring, mask: &Ring) -> Vec<Triangle> {
    let mut indices: Vec<usize> = (0..ring.len()).collect();
    let mut triangles = Vec::new();

    // Orient counter-clockwise so the "is this vertex an ear" convexity test
    // below has a consistent sign convention.
    if polygon_signed_area(ring) < 0.0 {
        indices.reverse();
    }

    let mut guard = 0usize;
    let max_iterations = indices.len() * indices.len() + 16;
    while indices.len() > 3 {
        guard += 1;
        if guard > max_iterations {
            break; // malformed input; return whatever triangulated cleanly so far
        }
        let n = indices.len();
        let mut clipped = false;
        for i in 0..n {
            let i_prev = indices[(i + n - 1) % n];
            let i_curr = indices[i];
            let i_next = indices[(i + 1) % n];
            let (pa, pb, pc) = (ring[i_prev], ring[i_curr], ring[i_next]);

            if !is_convex(pa, pb, pc) {
                continue;
            }
            if indices
                .iter()
                .filter(|&&idx| idx != i_prev && idx != i_curr && idx != i_next)
                .any(|&idx| point_in_triangle(ring[idx], pa, pb, pc))
            {
                continue;
            }

            push_triangle(&mut triangles, pa, pb, pc, mask);
            indices.remove(i);
            clipped = true;
            break;
        }
        if !clipped {
            break; // degenerate polygon (self-intersections); stop rather than loop forever
        }
    }
    if indices.len() == 3 {
        push_triangle(&mut triangles, ring[indices[0]], ring[indices[1]], ring[indices[2]], mask);
    }
    triangles
}

fn push_triangle(out: &mut Vec<Triangle>, a: Point, b: Point, c: Point, mask: &Ring) {
    let tri = Triangle { a, b, c };
    if tri.signed_area().abs() < 1e-12 {
        return;
    }
    if point_in_ring(mask, tri.centroid()) {
        out.push(tri);
    }
}

fn polygon_signed_area(ring: &Ring) -> f64 {
    let n = ring.len();
    let mut area = 0.0;
    for i in 0..n {
        let p0 = ring[i];
        let p1 = ring[(i + 1) % n];
        area += p0.x * p1.y - p1.x * p0.y;
    }
    area * 0.5
}

fn is_convex(a: Point, b: Point, c: Point) -> bool {
    cross2(b - a, c - b) > 1e-12
}

fn cross2(u: Point, v: Point) -> f64 {
    u.x * v.y - u.y * v.x
}

fn point_in_triangle(p: Point, a: Point, b: Point, c: Point) -> bool {
    let d1 = cross2(b - a, p - a);
    let d2 = cross2(c - b, p - b);
    let d3 = cross2(a - c, p - c);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

/// Full pipeline: densify `mask`, triangulate, discard outside triangles.
pub fn triangulate_mask(mask: &Ring, max_edge_len: f64, max_depth: u32) -> Vec<Triangle> {
    let densified = densify_ring(mask, max_edge_len, max_depth);
    triangulate_ring(&densified, mask)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Ring {
        vec![
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ]
    }

    #[test]
    fn densify_splits_long_edges() {
        let ring = square();
        let densified = densify_ring(&ring, 10.0, 8);
        assert!(densified.len() > ring.len());
        for i in 0..densified.len() {
            let p0 = densified[i];
            let p1 = densified[(i + 1) % densified.len()];
            assert!((p1 - p0).length() <= 10.0 + 1e-9);
        }
    }

    #[test]
    fn triangulate_square_covers_area() {
        let ring = square();
        let triangles = triangulate_mask(&ring, 1000.0, 4);
        assert!(!triangles.is_empty());
        let total_area: f64 = triangles.iter().map(|t| t.signed_area().abs()).sum();
        assert!((total_area - 100.0 * 100.0).abs() < 1e-6);
    }

    #[test]
    fn triangulate_concave_l_shape_discards_outside_triangles() {
        // L-shaped polygon: a 10x10 square with a 5x5 notch removed from one corner.
        let ring: Ring = vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 5.0),
            Point::new(5.0, 5.0),
            Point::new(5.0, 10.0),
            Point::new(0.0, 10.0),
        ];
        let triangles = triangulate_mask(&ring, 100.0, 4);
        let total_area: f64 = triangles.iter().map(|t| t.signed_area().abs()).sum();
        assert!((total_area - 75.0).abs() < 1e-6);
        for t in &triangles {
            assert!(point_in_ring(&ring, t.centroid()));
        }
    }
}
