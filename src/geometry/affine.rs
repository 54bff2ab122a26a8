//! Affine transform helpers built on [`glam::DAffine2`].
//!
//! Every cascade between resource, projected-geo, viewport and clip space is
//! a composition of these primitives. `DAffine2` already gives us
//! composition (`*`) and inversion (`.inverse()`) in double precision; this
//! module only adds the named constructors the viewport needs and a couple
//! of Jacobian helpers used by the distortion/zoom-level math.

use glam::{DAffine2, DMat2, DVec2};

use super::Point;

pub type Affine = DAffine2;

/// `translate(p). rotate(theta). scale(s)`, applied in that order to a
/// point (i.e. scale first, then rotate, then translate) — the standard
/// decomposition used to build the four viewport transforms.
pub fn translate_rotate_scale(translation: DVec2, rotation: f64, scale: DVec2) -> Affine {
    DAffine2::from_scale_angle_translation(scale, rotation, translation)
}

/// Jacobian (2x2 linear part) of an affine transform — constant everywhere,
/// independent of the evaluation point.
pub fn jacobian(affine: &Affine) -> DMat2 {
    affine.matrix2
}

/// `log(|det J|)` distortion scalar used for per-vertex distortion.
pub fn log_abs_det(jac: DMat2) -> f64 {
    jac.determinant().abs().max(f64::MIN_POSITIVE).ln()
}

/// Finite-difference Jacobian for a non-affine `forward` map (thin-plate
/// spline, projective) evaluated at `p`, central difference with step `h`.
pub fn jacobian_fd(forward: impl Fn(Point) -> Point, p: Point, h: f64) -> DMat2 {
    let dx = (forward(p + DVec2::new(h, 0.0)) - forward(p - DVec2::new(h, 0.0))) / (2.0 * h);
    let dy = (forward(p + DVec2::new(0.0, h)) - forward(p - DVec2::new(0.0, h))) / (2.0 * h);
    DMat2::from_cols(dx, dy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn translate_rotate_scale_round_trip() {
        let a = translate_rotate_scale(DVec2::new(3.0, -2.0), 0.4, DVec2::new(2.0, 2.0));
        let inv = a.inverse();
        let p = DVec2::new(7.0, 11.0);
        let round_tripped = inv.transform_point2(a.transform_point2(p));
        assert_relative_eq!(round_tripped.x, p.x, epsilon = 1e-9);
        assert_relative_eq!(round_tripped.y, p.y, epsilon = 1e-9);
    }

    #[test]
    fn jacobian_fd_matches_identity_for_affine_map() {
        let identity = |p: Point| p;
        let jac = jacobian_fd(identity, DVec2::new(1.0, 1.0), 1e-4);
        assert_relative_eq!(jac.determinant(), 1.0, epsilon = 1e-6);
    }
}
