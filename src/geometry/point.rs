//! Double-precision point, bounding box and ring primitives shared by every
//! coordinate space in the crate (resource, projected-geo, viewport, clip).

use glam::DVec2;

/// A point in whichever coordinate space the caller is currently working in.
/// The crate never mixes spaces without an explicit transform — see
/// [`crate::viewport::Viewport`] for the cascade between them.
pub type Point = DVec2;

/// An axis-aligned bounding box, kept in the same space as its points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bbox {
    pub min: Point,
    pub max: Point,
}

impl Bbox {
    pub fn new(min: Point, max: Point) -> Self {
        Self { min, max }
    }

    /// Smallest bbox enclosing `points`. Panics on an empty slice; callers
    /// that may pass empty data should check first (mirrors the "empty
    /// input" failure mode of viewport factories in this crate).
    pub fn from_points(points: &[Point]) -> Self {
        let mut min = points[0];
        let mut max = points[0];
        for &p in &points[1..] {
            min = min.min(p);
            max = max.max(p);
        }
        Self { min, max }
    }

    pub fn union(&self, other: &Bbox) -> Bbox {
        Bbox {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn center(&self) -> Point {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Point {
        self.max - self.min
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn contains_point(&self, p: Point) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// True if the two rectangles share any area (touching edges count as overlap).
    pub fn overlaps(&self, other: &Bbox) -> bool {
        self.min.x <= other.max.x
        && self.max.x >= other.min.x
        && self.min.y <= other.max.y
        && self.max.y >= other.min.y
    }

    /// Expand outward on every side by `ratio` of the current width/height.
    /// Used by the base renderer to pre-warm tiles at the viewport edge.
    pub fn buffered(&self, ratio: f64) -> Bbox {
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        Bbox {
            min: Point::new(self.min.x - dx, self.min.y - dy),
            max: Point::new(self.max.x + dx, self.max.y + dy),
        }
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            self.min,
            Point::new(self.max.x, self.min.y),
            self.max,
            Point::new(self.min.x, self.max.y),
        ]
    }
}

/// A simple polygon ring: ordered vertices, implicitly closed (the edge from
/// the last vertex back to the first is part of the ring).
pub type Ring = Vec<Point>;

pub fn ring_bbox(ring: &Ring) -> Bbox {
    Bbox::from_points(ring)
}

pub fn ring_centroid(ring: &Ring) -> Point {
    // Area-weighted polygon centroid (shoelace formula), falls back to the
    // vertex average for degenerate (zero-area) rings.
    let n = ring.len();
    let mut area = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    for i in 0..n {
        let p0 = ring[i];
        let p1 = ring[(i + 1) % n];
        let cross = p0.x * p1.y - p1.x * p0.y;
        area += cross;
        cx += (p0.x + p1.x) * cross;
        cy += (p0.y + p1.y) * cross;
    }
    area *= 0.5;
    if area.abs() < 1e-12 {
        let sum = ring.iter().fold(Point::ZERO, |acc, &p| acc + p);
        return sum / n as f64;
    }
    Point::new(cx / (6.0 * area), cy / (6.0 * area))
}

/// Even-odd point-in-polygon test, used to discard triangulation output that
/// falls outside the source mask.
pub fn point_in_ring(ring: &Ring, p: Point) -> bool {
    let n = ring.len();
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);
        if ((yi > p.y) != (yj > p.y)) && (p.x < (xj - xi) * (p.y - yi) / (yj - yi) + xi) {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Andrew's monotone-chain convex hull. Returns vertices in counter-clockwise
/// order with no repeated closing vertex. Degenerates to 1 or 2 points for
/// collinear/singular input. Non-finite points (produced when a degenerate
/// transform forward-projects a control point to NaN/infinity) are dropped
/// before sorting rather than left to break the comparator or propagate as
/// garbage geometry.
pub fn convex_hull(points: &[Point]) -> Vec<Point> {
    let mut pts: Vec<Point> = points.iter().copied().filter(|p| p.is_finite()).collect();
    if pts.len() < 3 {
        return pts;
    }
    pts.sort_by(|a, b| a.x.total_cmp(&b.x).then(a.y.total_cmp(&b.y)));
    pts.dedup();
    if pts.len() < 3 {
        return pts;
    }

    fn cross(o: Point, a: Point, b: Point) -> f64 {
        (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
    }

    let mut lower: Vec<Point> = Vec::new();
    for &p in &pts {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0.0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point> = Vec::new();
    for &p in pts.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0.0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}
