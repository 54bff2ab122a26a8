//! Thin-plate-spline transform: an affine term plus a weighted sum of radial
//! basis functions centered at each GCP, solved by the standard TPS linear
//! system `[[K, P], [Pᵀ, 0]] [w; a] = [v; 0]`. Exact at the GCPs themselves;
//! `backward` has no closed form and falls back to Newton's method seeded by
//! the affine term, which is why round-trip tolerance for this kind is
//! looser than the affine/polynomial kinds.

use nalgebra::DVector;

use super::GcpTransformer;
use crate::geometry::Point;

#[derive(Debug, Clone)]
pub struct ThinPlateSplineTransformer {
    centers: Vec<Point>,
    wx: DVector<f64>,
    wy: DVector<f64>,
    // affine part: v = a[0] + a[1]*x + a[2]*y
    ax: [f64; 3],
    ay: [f64; 3],
}

fn kernel(r: f64) -> f64 {
    if r < 1e-12 {
        0.0
    } else {
        r * r * r.ln()
    }
}

impl ThinPlateSplineTransformer {
    pub fn fit(pairs: &[(Point, Point)]) -> Self {
        let n = pairs.len();
        let centers: Vec<Point> = pairs.iter().map(|(res, _)| *res).collect();

        let mut l = nalgebra::DMatrix::<f64>::zeros(n + 3, n + 3);
        for i in 0..n {
            for j in 0..n {
                l[(i, j)] = kernel((centers[i] - centers[j]).length());
            }
            l[(i, i)] += 1e-10; // regularize against coincident/near-collinear GCPs
            l[(i, n)] = 1.0;
            l[(i, n + 1)] = centers[i].x;
            l[(i, n + 2)] = centers[i].y;
            l[(n, i)] = 1.0;
            l[(n + 1, i)] = centers[i].x;
            l[(n + 2, i)] = centers[i].y;
        }

        let mut rhs_x = DVector::<f64>::zeros(n + 3);
        let mut rhs_y = DVector::<f64>::zeros(n + 3);
        for (i, (_, geo)) in pairs.iter().enumerate() {
            rhs_x[i] = geo.x;
            rhs_y[i] = geo.y;
        }

        let lu = l.lu();
        let sol_x = lu.solve(&rhs_x).unwrap_or_else(|| DVector::zeros(n + 3));
        let sol_y = lu.solve(&rhs_y).unwrap_or_else(|| DVector::zeros(n + 3));

        Self {
            wx: sol_x.rows(0, n).into_owned(),
            wy: sol_y.rows(0, n).into_owned(),
            ax: [sol_x[n], sol_x[n + 1], sol_x[n + 2]],
            ay: [sol_y[n], sol_y[n + 1], sol_y[n + 2]],
            centers,
        }
    }

    fn affine_backward(&self, p: Point) -> Point {
        let (a1, a2, b1, b2) = (self.ax[1], self.ax[2], self.ay[1], self.ay[2]);
        let det = a1 * b2 - a2 * b1;
        if det.abs() < 1e-15 {
            return Point::new(p.x - self.ax[0], p.y - self.ay[0]);
        }
        let dx = p.x - self.ax[0];
        let dy = p.y - self.ay[0];
        Point::new((b2 * dx - a2 * dy) / det, (-b1 * dx + a1 * dy) / det)
    }
}

impl GcpTransformer for ThinPlateSplineTransformer {
    fn forward(&self, p: Point) -> Point {
        let mut x = self.ax[0] + self.ax[1] * p.x + self.ax[2] * p.y;
        let mut y = self.ay[0] + self.ay[1] * p.x + self.ay[2] * p.y;
        for (i, &c) in self.centers.iter().enumerate() {
            let u = kernel((p - c).length());
            x += self.wx[i] * u;
            y += self.wy[i] * u;
        }
        Point::new(x, y)
    }

    fn backward(&self, p: Point) -> Point {
        let mut guess = self.affine_backward(p);
        for _ in 0..20 {
            let residual = self.forward(guess) - p;
            if residual.length() < 1e-6 {
                return guess;
            }
            let jac = crate::geometry::jacobian_fd(|q| self.forward(q), guess, 1e-3);
            let det = jac.determinant();
            if det.abs() < 1e-15 || !det.is_finite() {
                return Point::new(f64::NAN, f64::NAN);
            }
            guess -= jac.inverse() * residual;
        }
        if !guess.x.is_finite() || !guess.y.is_finite() {
            return Point::new(f64::NAN, f64::NAN);
        }
        guess
    }
}
