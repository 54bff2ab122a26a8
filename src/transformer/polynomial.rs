//! Polynomial (degree 1/2/3) transform: `X`/`Y` each independently fit as a
//! polynomial in resource `(x, y)`, least squares via normal equations.
//! Degree 1 is the familiar 6-parameter affine map and inverts in closed
//! form; degree 2/3 have no closed-form inverse, so `backward` runs Newton's
//! method against the forward map, seeded by the degree-1 fit of the same
//! points.

use glam::{DMat2, DVec2};
use nalgebra::{DMatrix, DVector};

use super::GcpTransformer;
use crate::geometry::Point;

/// `(i, j)` exponent pairs with `i + j <= degree`, in a fixed order shared by
/// both the forward evaluation and the fit's design matrix columns.
fn terms(degree: u32) -> Vec<(u32, u32)> {
    let mut t = Vec::new();
    for total in 0..=degree {
        for i in 0..=total {
            t.push((total - i, i));
        }
    }
    t
}

fn evaluate(coeffs: &[f64], terms: &[(u32, u32)], x: f64, y: f64) -> f64 {
    coeffs
        .iter()
        .zip(terms)
        .map(|(c, &(i, j))| c * x.powi(i as i32) * y.powi(j as i32))
        .sum()
}

#[derive(Debug, Clone)]
pub struct PolynomialTransformer {
    degree: u32,
    terms: Vec<(u32, u32)>,
    coeffs_x: Vec<f64>,
    coeffs_y: Vec<f64>,
    /// Degree-1 fit of the same GCPs, used as both the closed-form inverse
    /// (degree 1) and the Newton seed (degree 2/3).
    affine_seed: AffineSeed,
}

#[derive(Debug, Clone, Copy)]
struct AffineSeed {
    // X = a0 + a1*x + a2*y ; Y = b0 + b1*x + b2*y
    a0: f64,
    a1: f64,
    a2: f64,
    b0: f64,
    b1: f64,
    b2: f64,
}

impl AffineSeed {
    fn fit(pairs: &[(Point, Point)]) -> Self {
        let terms = terms(1);
        let (cx, cy) = fit_axes(pairs, &terms);
        Self {
            a0: cx[0],
            a1: cx[1],
            a2: cx[2],
            b0: cy[0],
            b1: cy[1],
            b2: cy[2],
        }
    }

    fn forward(&self, p: Point) -> Point {
        Point::new(
            self.a0 + self.a1 * p.x + self.a2 * p.y,
            self.b0 + self.b1 * p.x + self.b2 * p.y,
        )
    }

    /// Closed-form inverse of the linear part; falls back to the identity
    /// shift if the linear part is singular (degenerate GCP configuration).
    fn backward(&self, p: Point) -> Point {
        let det = self.a1 * self.b2 - self.a2 * self.b1;
        if det.abs() < 1e-15 {
            return Point::new(p.x - self.a0, p.y - self.b0);
        }
        let dx = p.x - self.a0;
        let dy = p.y - self.b0;
        Point::new(
            (self.b2 * dx - self.a2 * dy) / det,
            (-self.b1 * dx + self.a1 * dy) / det,
        )
    }

    fn jacobian(&self) -> DMat2 {
        DMat2::from_cols(DVec2::new(self.a1, self.b1), DVec2::new(self.a2, self.b2))
    }
}

fn fit_axes(pairs: &[(Point, Point)], terms: &[(u32, u32)]) -> (Vec<f64>, Vec<f64>) {
    let n = pairs.len();
    let k = terms.len();
    let mut design = DMatrix::<f64>::zeros(n, k);
    let mut target_x = DVector::<f64>::zeros(n);
    let mut target_y = DVector::<f64>::zeros(n);
    for (row, (res, geo)) in pairs.iter().enumerate() {
        for (col, &(i, j)) in terms.iter().enumerate() {
            design[(row, col)] = res.x.powi(i as i32) * res.y.powi(j as i32);
        }
        target_x[row] = geo.x;
        target_y[row] = geo.y;
    }
    let svd = design.svd(true, true);
    let cx = svd
        .solve(&target_x, 1e-12)
        .unwrap_or_else(|_| DVector::from_element(k, 0.0));
    let cy = svd
        .solve(&target_y, 1e-12)
        .unwrap_or_else(|_| DVector::from_element(k, 0.0));
    (cx.as_slice().to_vec(), cy.as_slice().to_vec())
}

impl PolynomialTransformer {
    pub fn fit(pairs: &[(Point, Point)], degree: u32) -> Self {
        let terms = self::terms(degree);
        let (coeffs_x, coeffs_y) = fit_axes(pairs, &terms);
        Self {
            degree,
            terms,
            coeffs_x,
            coeffs_y,
            affine_seed: AffineSeed::fit(pairs),
        }
    }
}

impl GcpTransformer for PolynomialTransformer {
    fn forward(&self, p: Point) -> Point {
        Point::new(
            evaluate(&self.coeffs_x, &self.terms, p.x, p.y),
            evaluate(&self.coeffs_y, &self.terms, p.x, p.y),
        )
    }

    fn backward(&self, p: Point) -> Point {
        if self.degree == 1 {
            return self.affine_seed.backward(p);
        }

        // Newton's method on F(x,y) = forward(x,y) - p = 0, seeded by the
        // affine inverse. A handful of iterations suffices because the
        // degree-2/3 correction to the affine term is typically small.
        let mut guess = self.affine_seed.backward(p);
        for _ in 0..12 {
            let residual = self.forward(guess) - p;
            if residual.length() < 1e-9 {
                break;
            }
            let jac = crate::geometry::jacobian_fd(|q| self.forward(q), guess, 1e-3);
            let det = jac.determinant();
            if det.abs() < 1e-15 {
                return Point::new(f64::NAN, f64::NAN);
            }
            let inv = jac.inverse();
            guess -= inv * residual;
        }
        if !guess.x.is_finite() || !guess.y.is_finite() {
            return Point::new(f64::NAN, f64::NAN);
        }
        guess
    }

    fn jacobian_forward(&self, p: Point) -> DMat2 {
        if self.degree == 1 {
            return self.affine_seed.jacobian();
        }
        crate::geometry::jacobian_fd(|q| self.forward(q), p, 1e-3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn affine_pairs() -> Vec<(Point, Point)> {
        vec![
            (Point::new(0.0, 0.0), Point::new(10.0, 20.0)),
            (Point::new(10.0, 0.0), Point::new(30.0, 20.0)),
            (Point::new(0.0, 10.0), Point::new(10.0, 40.0)),
        ]
    }

    #[test]
    fn degree1_round_trips() {
        let t = PolynomialTransformer::fit(&affine_pairs(), 1);
        for (res, _) in affine_pairs() {
            let rt = t.backward(t.forward(res));
            assert_relative_eq!(rt.x, res.x, epsilon = 1e-6);
            assert_relative_eq!(rt.y, res.y, epsilon = 1e-6);
        }
    }

    #[test]
    fn degree2_fits_exactly_with_six_points() {
        // A pure quadratic mapping; six points exactly determine six coefficients per axis.
        let f = |x: f64, y: f64| (x + 0.01 * x * x, y + 0.02 * x * y);
        let resources = [
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(0.0, 10.0),
            Point::new(10.0, 10.0),
            Point::new(5.0, 2.0),
            Point::new(2.0, 5.0),
        ];
        let pairs: Vec<_> = resources
            .iter()
            .map(|&res| {
                let (gx, gy) = f(res.x, res.y);
                (res, Point::new(gx, gy))
            })
            .collect();
        let t = PolynomialTransformer::fit(&pairs, 2);
        for &res in &resources {
            let (gx, gy) = f(res.x, res.y);
            let fwd = t.forward(res);
            assert_relative_eq!(fwd.x, gx, epsilon = 1e-6);
            assert_relative_eq!(fwd.y, gy, epsilon = 1e-6);

            let rt = t.backward(Point::new(gx, gy));
            assert_relative_eq!(rt.x, res.x, epsilon = 1e-4);
            assert_relative_eq!(rt.y, res.y, epsilon = 1e-4);
        }
    }
}
