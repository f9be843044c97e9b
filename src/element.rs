use std::fmt::Display;

use smallvec::SmallVec;

use crate::geometry::BoundingBox;

/// Largest number of nodes of any supported [`ElementKind`].
pub(crate) const MAX_NODES: usize = 8;

/// Shape function values of an element evaluated at one reference point.
pub(crate) type ShapeValues = SmallVec<[f64; MAX_NODES]>;

/// Shape function gradients in reference coordinates, padded to three components.
pub(crate) type ShapeGradients = SmallVec<[[f64; 3]; MAX_NODES]>;

/// Stable identifier of an element of a mesh.
///
/// Ties between elements that all contain a query point (e.g. a point on a shared face) are always
/// broken in favor of the lowest id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ElementId(pub usize);

impl Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The canonical parameter domain of an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReferenceShape {
    /// `ξ_i >= 0` and `Σ ξ_i <= 1`.
    Simplex,
    /// `-1 <= ξ_i <= 1`.
    Hypercube,
}

impl ReferenceShape {
    /// Returns `true` if the local coordinates lie in the reference domain inflated by `tol`.
    ///
    /// `tol` is relative to the width of the domain, so the hypercube, two units wide, is inflated
    /// by `2 * tol` on each side.
    pub fn contains(&self, xi: &[f64], tol: f64) -> bool {
        match self {
            Self::Simplex => xi.iter().all(|&x| x >= -tol) && xi.iter().sum::<f64>() <= 1. + tol,
            Self::Hypercube => xi.iter().all(|&x| x.abs() <= 1. + 2. * tol),
        }
    }

    /// The centroid of the reference domain in `dim` dimensions.
    pub(crate) fn centroid(&self, dim: usize) -> [f64; 3] {
        let mut xi = [0.; 3];
        if let Self::Simplex = self {
            for x in xi.iter_mut().take(dim) {
                *x = 1. / (dim + 1) as f64;
            }
        }
        xi
    }
}

/// The supported element types.
///
/// Node ordering follows the usual finite element conventions: vertices first (counterclockwise
/// for 2D faces, bottom face then top face for hexahedra), then mid-edge nodes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementKind {
    /// Linear segment on `[-1, 1]`.
    Edge2,
    /// Linear triangle.
    Tri3,
    /// Quadratic triangle, possibly with curved edges. Mid-edge nodes are ordered `01`, `12`, `20`.
    Tri6,
    /// Bilinear quadrilateral on `[-1, 1]²`.
    Quad4,
    /// Linear tetrahedron.
    Tet4,
    /// Trilinear hexahedron on `[-1, 1]³`.
    Hex8,
}

const QUAD_CORNERS: [[f64; 2]; 4] = [[-1., -1.], [1., -1.], [1., 1.], [-1., 1.]];

const HEX_CORNERS: [[f64; 3]; 8] = [
    [-1., -1., -1.],
    [1., -1., -1.],
    [1., 1., -1.],
    [-1., 1., -1.],
    [-1., -1., 1.],
    [1., -1., 1.],
    [1., 1., 1.],
    [-1., 1., 1.],
];

impl ElementKind {
    /// Spatial dimension of the reference domain.
    pub fn dim(&self) -> usize {
        match self {
            Self::Edge2 => 1,
            Self::Tri3 | Self::Tri6 | Self::Quad4 => 2,
            Self::Tet4 | Self::Hex8 => 3,
        }
    }

    pub fn node_count(&self) -> usize {
        match self {
            Self::Edge2 => 2,
            Self::Tri3 => 3,
            Self::Tri6 => 6,
            Self::Quad4 => 4,
            Self::Tet4 => 4,
            Self::Hex8 => 8,
        }
    }

    pub fn reference_shape(&self) -> ReferenceShape {
        match self {
            Self::Tri3 | Self::Tri6 | Self::Tet4 => ReferenceShape::Simplex,
            Self::Edge2 | Self::Quad4 | Self::Hex8 => ReferenceShape::Hypercube,
        }
    }

    /// Returns `true` if the reference-to-physical map is affine, i.e. it can be inverted with a
    /// single linear solve.
    pub fn is_affine(&self) -> bool {
        matches!(self, Self::Edge2 | Self::Tri3 | Self::Tet4)
    }

    /// Returns `true` if the element geometry may bulge outside of the convex hull of its nodes.
    pub fn is_curved(&self) -> bool {
        matches!(self, Self::Tri6)
    }

    /// Evaluates the shape functions and their reference gradients at `xi`.
    pub(crate) fn shape(&self, xi: &[f64; 3]) -> (ShapeValues, ShapeGradients) {
        let mut values = ShapeValues::new();
        let mut grads = ShapeGradients::new();
        match self {
            Self::Edge2 => {
                let x = xi[0];
                values.extend([0.5 * (1. - x), 0.5 * (1. + x)]);
                grads.extend([[-0.5, 0., 0.], [0.5, 0., 0.]]);
            }
            Self::Tri3 => {
                let [x, y, _] = *xi;
                values.extend([1. - x - y, x, y]);
                grads.extend([[-1., -1., 0.], [1., 0., 0.], [0., 1., 0.]]);
            }
            Self::Tri6 => {
                let [x, y, _] = *xi;
                let l = [1. - x - y, x, y];
                let dl = [[-1., -1., 0.], [1., 0., 0.], [0., 1., 0.]];
                for i in 0..3 {
                    values.push(l[i] * (2. * l[i] - 1.));
                    let c = 4. * l[i] - 1.;
                    grads.push([c * dl[i][0], c * dl[i][1], 0.]);
                }
                for (i, j) in [(0, 1), (1, 2), (2, 0)] {
                    values.push(4. * l[i] * l[j]);
                    grads.push([
                        4. * (l[i] * dl[j][0] + l[j] * dl[i][0]),
                        4. * (l[i] * dl[j][1] + l[j] * dl[i][1]),
                        0.,
                    ]);
                }
            }
            Self::Quad4 => {
                let [x, y, _] = *xi;
                for [cx, cy] in QUAD_CORNERS {
                    values.push(0.25 * (1. + cx * x) * (1. + cy * y));
                    grads.push([
                        0.25 * cx * (1. + cy * y),
                        0.25 * cy * (1. + cx * x),
                        0.,
                    ]);
                }
            }
            Self::Tet4 => {
                let [x, y, z] = *xi;
                values.extend([1. - x - y - z, x, y, z]);
                grads.extend([
                    [-1., -1., -1.],
                    [1., 0., 0.],
                    [0., 1., 0.],
                    [0., 0., 1.],
                ]);
            }
            Self::Hex8 => {
                let [x, y, z] = *xi;
                for [cx, cy, cz] in HEX_CORNERS {
                    let (fx, fy, fz) = (1. + cx * x, 1. + cy * y, 1. + cz * z);
                    values.push(0.125 * fx * fy * fz);
                    grads.push([
                        0.125 * cx * fy * fz,
                        0.125 * cy * fx * fz,
                        0.125 * cz * fx * fy,
                    ]);
                }
            }
        }
        (values, grads)
    }
}

/// A borrowed view of one element of a [`Mesh`](crate::Mesh).
#[derive(Clone, Copy, Debug)]
pub struct ElementRef<'a, const D: usize> {
    pub(crate) id: ElementId,
    pub(crate) kind: ElementKind,
    pub(crate) connectivity: &'a [usize],
    pub(crate) points: &'a [[f64; D]],
}

impl<'a, const D: usize> ElementRef<'a, D> {
    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn kind(&self) -> ElementKind {
        self.kind
    }

    /// Indices of the element's nodes in the mesh.
    pub fn connectivity(&self) -> &'a [usize] {
        self.connectivity
    }

    /// Coordinates of the element's nodes.
    pub fn nodes(&self) -> impl ExactSizeIterator<Item = [f64; D]> + Clone + 'a {
        let points = self.points;
        self.connectivity.iter().map(move |&i| points[i])
    }

    /// The tight bounding box of the element's nodes.
    pub fn bounding_box(&self) -> BoundingBox<D> {
        BoundingBox::from_points(self.nodes())
    }

    /// The physical image of the reference centroid.
    ///
    /// For affine elements this is the usual vertex average.
    pub fn centroid(&self) -> [f64; D] {
        let xi = self.kind.reference_shape().centroid(self.kind.dim());
        crate::containment::map_to_physical(self, &xi)
    }
}
