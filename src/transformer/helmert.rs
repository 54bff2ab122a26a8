//! Helmert (similarity) transform: uniform scale + rotation + translation,
//! 4 degrees of freedom. Linear in its parameters `(a, b, tx, ty)` via the
//! standard complex-multiplication trick (`a + bi` rotates-and-scales),
//! which makes the least-squares fit a single linear solve rather than an
//! iterative one.

use glam::DMat2;
use nalgebra::{DMatrix, DVector};

use super::GcpTransformer;
use crate::geometry::Point;

#[derive(Debug, Clone, Copy)]
pub struct HelmertTransformer {
    a: f64,
    b: f64,
    tx: f64,
    ty: f64,
}

impl HelmertTransformer {
    /// Fits `X = a*x - b*y + tx`, `Y = b*x + a*y + ty` to `pairs`. A single
    /// GCP cannot determine all 4 parameters, so that case resolves to
    /// identity scale/rotation plus the translation implied by the one pair
    /// (see the minimum-count note on [`super::TransformationKind::Helmert`]).
    pub fn fit(pairs: &[(Point, Point)]) -> Self {
        if pairs.len() == 1 {
            let (res, geo) = pairs[0];
            return Self {
                a: 1.0,
                b: 0.0,
                tx: geo.x - res.x,
                ty: geo.y - res.y,
            };
        }

        let n = pairs.len();
        let mut design = DMatrix::<f64>::zeros(2 * n, 4);
        let mut target = DVector::<f64>::zeros(2 * n);
        for (i, (res, geo)) in pairs.iter().enumerate() {
            design[(2 * i, 0)] = res.x;
            design[(2 * i, 1)] = -res.y;
            design[(2 * i, 2)] = 1.0;
            design[(2 * i, 3)] = 0.0;
            target[2 * i] = geo.x;

            design[(2 * i + 1, 0)] = res.y;
            design[(2 * i + 1, 1)] = res.x;
            design[(2 * i + 1, 2)] = 0.0;
            design[(2 * i + 1, 3)] = 1.0;
            target[2 * i + 1] = geo.y;
        }

        let svd = design.svd(true, true);
        let solution = svd
            .solve(&target, 1e-12)
            .unwrap_or_else(|_| DVector::from_element(4, 0.0));
        Self {
            a: solution[0],
            b: solution[1],
            tx: solution[2],
            ty: solution[3],
        }
    }
}

impl GcpTransformer for HelmertTransformer {
    fn forward(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x - self.b * p.y + self.tx,
            self.b * p.x + self.a * p.y + self.ty,
        )
    }

    fn backward(&self, p: Point) -> Point {
        let det = self.a * self.a + self.b * self.b;
        let dx = p.x - self.tx;
        let dy = p.y - self.ty;
        Point::new(
            (self.a * dx + self.b * dy) / det,
            (-self.b * dx + self.a * dy) / det,
        )
    }

    fn jacobian_forward(&self, _p: Point) -> DMat2 {
        DMat2::from_cols(glam::DVec2::new(self.a, self.b), glam::DVec2::new(-self.b, self.a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fits_pure_translation() {
        let pairs = vec![
            (Point::new(0.0, 0.0), Point::new(10.0, 20.0)),
            (Point::new(5.0, 0.0), Point::new(15.0, 20.0)),
        ];
        let t = HelmertTransformer::fit(&pairs);
        let p = t.forward(Point::new(2.0, 3.0));
        assert_relative_eq!(p.x, 12.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 23.0, epsilon = 1e-9);
    }

    #[test]
    fn round_trips_scale_rotation_translation() {
        let pairs = vec![
            (Point::new(0.0, 0.0), Point::new(3.0, 4.0)),
            (Point::new(10.0, 0.0), Point::new(3.0, 24.0)),
            (Point::new(0.0, 10.0), Point::new(-17.0, 4.0)),
        ];
        let t = HelmertTransformer::fit(&pairs);
        for (res, _geo) in &pairs {
            let round_tripped = t.backward(t.forward(*res));
            assert_relative_eq!(round_tripped.x, res.x, epsilon = 1e-6);
            assert_relative_eq!(round_tripped.y, res.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn single_gcp_is_translation_only() {
        let pairs = vec![(Point::new(5.0, 5.0), Point::new(105.0, 55.0))];
        let t = HelmertTransformer::fit(&pairs);
        assert_relative_eq!(t.a, 1.0);
        assert_relative_eq!(t.b, 0.0);
        let p = t.forward(Point::new(6.0, 5.0));
        assert_relative_eq!(p.x, 106.0, epsilon = 1e-9);
    }
}
