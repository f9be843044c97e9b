//! The geometric containment test.
//!
//! Whether a physical point lies inside an element is decided in the element's reference domain:
//! the point is pulled back through the inverse of the reference-to-physical map, and the resulting
//! local coordinates are compared against the (slightly inflated) reference element.
//!
//! Affine elements are inverted with a single linear solve. All the other elements use a Newton
//! iteration started from the reference centroid.
use crate::element::ElementRef;
use crate::error::GeometryError;
use crate::geometry::solve;

/// Default relative tolerance of the containment test.
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// Maximum number of Newton iterations of the inverse map.
pub const MAX_NEWTON_ITERATIONS: usize = 20;

/// Newton stops once the max-norm of the update falls below this value.
const NEWTON_TOLERANCE: f64 = 1e-10;

/// Local coordinates larger than this in magnitude mean the Newton iteration ran away.
const DIVERGENCE_BOUND: f64 = 1e6;

/// Jacobian determinants below this fraction of `h^D` mark a zero-measure element.
const DEGENERACY_THRESHOLD: f64 = 1e-12;

fn pad(xi: &[f64]) -> [f64; 3] {
    let mut padded = [0.; 3];
    for (p, x) in padded.iter_mut().zip(xi) {
        *p = *x;
    }
    padded
}

/// Evaluates the physical position and the Jacobian `∂x_i/∂ξ_j` at `xi`.
fn evaluate<const D: usize>(element: &ElementRef<D>, xi: &[f64]) -> ([f64; D], [[f64; D]; D]) {
    let (values, grads) = element.kind.shape(&pad(xi));
    let mut x = [0.; D];
    let mut jac = [[0.; D]; D];
    for ((node, value), grad) in element.nodes().zip(&values).zip(&grads) {
        for i in 0..D {
            x[i] += value * node[i];
            for j in 0..D {
                jac[i][j] += node[i] * grad[j];
            }
        }
    }
    (x, jac)
}

/// Maps local coordinates to the physical point they represent in `element`.
pub fn map_to_physical<const D: usize>(element: &ElementRef<D>, xi: &[f64]) -> [f64; D] {
    evaluate(element, xi).0
}

/// Jacobian of the reference-to-physical map of `element` at `xi`.
pub fn jacobian<const D: usize>(element: &ElementRef<D>, xi: &[f64]) -> [[f64; D]; D] {
    evaluate(element, xi).1
}

/// Computes the local coordinates of a physical point in `element`.
///
/// The point does not need to be inside of the element: for points outside, the returned local
/// coordinates simply lie outside of the reference domain.
pub fn inverse_map<const D: usize>(
    element: &ElementRef<D>,
    point: &[f64; D],
) -> Result<[f64; D], GeometryError> {
    let centroid = element.kind.reference_shape().centroid(D);
    let mut xi: [f64; D] = std::array::from_fn(|i| centroid[i]);
    let scale = element.bounding_box().diagonal().powi(D as i32);

    let max_iterations = if element.kind.is_affine() {
        1
    } else {
        MAX_NEWTON_ITERATIONS
    };
    let mut update = f64::INFINITY;
    for iteration in 1..=max_iterations {
        let (x, jac) = evaluate(element, &xi);
        let residual: [f64; D] = std::array::from_fn(|i| point[i] - x[i]);
        let (dxi, det) = solve(jac, residual).unwrap_or(([0.; D], 0.));
        if det.abs() <= DEGENERACY_THRESHOLD * scale {
            if iteration == 1 {
                return Err(GeometryError::Degenerate {
                    element: element.id,
                    determinant: if scale > 0. { det / scale } else { 0. },
                });
            }
            // The map folds over itself away from the element.
            return Err(GeometryError::Diverged {
                element: element.id,
                iterations: iteration,
            });
        }

        for (x, dx) in xi.iter_mut().zip(&dxi) {
            *x += dx;
        }
        if xi.iter().any(|x| !x.is_finite() || x.abs() > DIVERGENCE_BOUND) {
            return Err(GeometryError::Diverged {
                element: element.id,
                iterations: iteration,
            });
        }

        update = dxi.iter().fold(0., |acc: f64, dx| acc.max(dx.abs()));
        if element.kind.is_affine() || update < NEWTON_TOLERANCE {
            return Ok(xi);
        }
    }

    Err(GeometryError::NotConverged {
        element: element.id,
        iterations: max_iterations,
        update,
    })
}

/// Tests whether `point` lies in `element`, up to the relative tolerance `tol`.
///
/// Returns the local coordinates of the point if it is inside.
pub fn contains_point<const D: usize>(
    element: &ElementRef<D>,
    point: &[f64; D],
    tol: f64,
) -> Result<Option<[f64; D]>, GeometryError> {
    let xi = inverse_map(element, point)?;
    Ok(element
        .kind
        .reference_shape()
        .contains(&xi, tol)
        .then_some(xi))
}
