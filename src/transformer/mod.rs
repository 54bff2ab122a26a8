//! Ground-control-point transform fitting.
//!
//! Each transform kind only needs to expose a `forward`/`backward` surface.
//! Because this crate has no injectable fitting library to depend on, the
//! five transform kinds are fitted from scratch here, each a small
//! double-precision least-squares solve via `nalgebra` — the matrix-solve
//! idiom this corpus reaches for whenever it needs a best-fit transform
//! (see DESIGN.md for the grounding references).

mod helmert;
mod polynomial;
mod projective;
mod thin_plate_spline;

use std::fmt;

use glam::DMat2;

use crate::error::{Error, Result};
use crate::geometry::Point;

pub use helmert::HelmertTransformer;
pub use polynomial::PolynomialTransformer;
pub use projective::ProjectiveTransformer;
pub use thin_plate_spline::ThinPlateSplineTransformer;

/// A fitted, invertible mapping between resource and projected-geo space.
/// `jacobian_forward` backs the per-vertex distortion computation and the
/// zoom-level selection's Jacobian sampling.
pub trait GcpTransformer: fmt::Debug + Send + Sync {
    fn forward(&self, p: Point) -> Point;
    fn backward(&self, p: Point) -> Point;

    /// Defaults to a central-difference approximation; exact implementations
    /// (affine-linear kinds) override this with their constant Jacobian.
    fn jacobian_forward(&self, p: Point) -> DMat2 {
        crate::geometry::jacobian_fd(|q| self.forward(q), p, 1e-3)
    }
}

/// The six transformation kinds named by this crate, each with its own
/// minimum GCP count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformationKind {
    Helmert,
    #[serde(rename = "polynomial1")]
    Polynomial1,
    #[serde(rename = "polynomial2")]
    Polynomial2,
    #[serde(rename = "polynomial3")]
    Polynomial3,
    ThinPlateSpline,
    Projective,
}

impl TransformationKind {
    /// Minimum GCP count: 3 for affine/polynomial-1, 6 for polynomial-2, one
    /// for helmert, etc. Helmert's 4 degrees of freedom (scale, rotation, 2
    /// translation) are not fully determined by a single point; see
    /// [`helmert::HelmertTransformer::fit`] for how the single-GCP case is
    /// resolved (translation-only — see DESIGN.md).
    pub fn min_gcp_count(self) -> usize {
        match self {
            TransformationKind::Helmert => 1,
            TransformationKind::Polynomial1 => 3,
            TransformationKind::Polynomial2 => 6,
            TransformationKind::Polynomial3 => 10,
            TransformationKind::ThinPlateSpline => 3,
            TransformationKind::Projective => 4,
        }
    }
}

/// Fit a transformer of `kind` to `pairs` of `(resource, projectedGeo)`
/// points. Returns `Error::Validation` if `pairs` is below the kind's
/// minimum GCP count, since that is a precondition of constructing the
/// transformer rather than a JSON-schema concern.
pub fn fit(kind: TransformationKind, pairs: &[(Point, Point)]) -> Result<Box<dyn GcpTransformer>> {
    let min = kind.min_gcp_count();
    if pairs.len() < min {
        return Err(Error::Validation(format!(
            "{kind:?} requires at least {min} ground control points, got {}",
            pairs.len()
        )));
    }
    Ok(match kind {
        TransformationKind::Helmert => Box::new(HelmertTransformer::fit(pairs)),
        TransformationKind::Polynomial1 => Box::new(PolynomialTransformer::fit(pairs, 1)),
        TransformationKind::Polynomial2 => Box::new(PolynomialTransformer::fit(pairs, 2)),
        TransformationKind::Polynomial3 => Box::new(PolynomialTransformer::fit(pairs, 3)),
        TransformationKind::ThinPlateSpline => Box::new(ThinPlateSplineTransformer::fit(pairs)),
        TransformationKind::Projective => Box::new(ProjectiveTransformer::fit(pairs)),
    })
}
