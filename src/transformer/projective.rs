//! Projective (homography) transform: 8-parameter direct linear transform
//! (DLT). Forward/backward are both closed form — the inverse of a
//! homography is the matrix inverse of its 3x3 representation — so there is
//! no iterative solve here, unlike the higher-degree polynomial kinds.

use glam::DMat2;
use nalgebra::{DMatrix, DVector, Matrix3, Vector3};

use super::GcpTransformer;
use crate::geometry::Point;

#[derive(Debug, Clone, Copy)]
pub struct ProjectiveTransformer {
    h: Matrix3<f64>,
}

impl ProjectiveTransformer {
    /// Fits `h0..h7` (with `h8` pinned to 1) so that
    /// `X = (h0 x + h1 y + h2) / (h6 x + h7 y + 1)`,
    /// `Y = (h3 x + h4 y + h5) / (h6 x + h7 y + 1)`.
    /// Each GCP contributes two linear equations in the 8 unknowns after
    /// clearing the denominator, so this is a single least-squares solve
    /// rather than the iterative DLT normalization some references use.
    pub fn fit(pairs: &[(Point, Point)]) -> Self {
        let n = pairs.len();
        let mut design = DMatrix::<f64>::zeros(2 * n, 8);
        let mut target = DVector::<f64>::zeros(2 * n);
        for (i, (res, geo)) in pairs.iter().enumerate() {
            let (x, y) = (res.x, res.y);
            let (gx, gy) = (geo.x, geo.y);

            design[(2 * i, 0)] = x;
            design[(2 * i, 1)] = y;
            design[(2 * i, 2)] = 1.0;
            design[(2 * i, 6)] = -x * gx;
            design[(2 * i, 7)] = -y * gx;
            target[2 * i] = gx;

            design[(2 * i + 1, 3)] = x;
            design[(2 * i + 1, 4)] = y;
            design[(2 * i + 1, 5)] = 1.0;
            design[(2 * i + 1, 6)] = -x * gy;
            design[(2 * i + 1, 7)] = -y * gy;
            target[2 * i + 1] = gy;
        }

        let svd = design.svd(true, true);
        let sol = svd
            .solve(&target, 1e-12)
            .unwrap_or_else(|_| DVector::from_element(8, 0.0));

        #[rustfmt::skip]
        let h = Matrix3::new(
            sol[0], sol[1], sol[2],
            sol[3], sol[4], sol[5],
            sol[6], sol[7], 1.0,
        );
        Self { h }
    }

    fn apply(&self, m: &Matrix3<f64>, p: Point) -> Point {
        let v = m * Vector3::new(p.x, p.y, 1.0);
        if v.z.abs() < 1e-15 {
            return Point::new(f64::NAN, f64::NAN);
        }
        Point::new(v.x / v.z, v.y / v.z)
    }
}

impl GcpTransformer for ProjectiveTransformer {
    fn forward(&self, p: Point) -> Point {
        self.apply(&self.h, p)
    }

    fn backward(&self, p: Point) -> Point {
        match self.h.try_inverse() {
            Some(inv) => self.apply(&inv, p),
            None => Point::new(f64::NAN, f64::NAN),
        }
    }

    fn jacobian_forward(&self, p: Point) -> DMat2 {
        let (x, y) = (p.x, p.y);
        let denom = self.h[(2, 0)] * x + self.h[(2, 1)] * y + self.h[(2, 2)];
        if denom.abs() < 1e-15 {
            return DMat2::ZERO;
        }
        let nx = self.h[(0, 0)] * x + self.h[(0, 1)] * y + self.h[(0, 2)];
        let ny = self.h[(1, 0)] * x + self.h[(1, 1)] * y + self.h[(1, 2)];
        let d2 = denom * denom;

        let dxdx = (self.h[(0, 0)] * denom - nx * self.h[(2, 0)]) / d2;
        let dxdy = (self.h[(0, 1)] * denom - nx * self.h[(2, 1)]) / d2;
        let dydx = (self.h[(1, 0)] * denom - ny * self.h[(2, 0)]) / d2;
        let dydy = (self.h[(1, 1)] * denom - ny * self.h[(2, 1)]) / d2;

        DMat2::from_cols(glam::DVec2::new(dxdx, dydx), glam::DVec2::new(dxdy, dydy))
    }
}
