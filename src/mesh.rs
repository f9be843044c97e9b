use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, ensure, Result};
use itertools::Itertools;
use parking_lot::RwLock;

use crate::element::{ElementId, ElementKind, ElementRef};
use crate::geometry::BoundingBox;

/// An unstructured mesh in `D` dimensions.
///
/// This is an immutable snapshot: node coordinates, the connectivity of every element, the element
/// kinds and the element ids. Elements are stored in "slots" (their position in the mesh), while
/// their [`ElementId`] is what queries report. Unless [`Mesh::with_ids`] is used, the id of an
/// element is its slot.
#[derive(Clone, Debug)]
pub struct Mesh<const D: usize> {
    points: Vec<[f64; D]>,
    cells: Vec<usize>,
    offsets: Offsets,
    kinds: Kinds,
    ids: Option<Vec<ElementId>>,
}

#[derive(Clone, Debug)]
enum Offsets {
    Implicit(usize),
    Explicit(Vec<usize>),
}

#[derive(Clone, Debug)]
enum Kinds {
    Uniform(ElementKind),
    Mixed(Vec<ElementKind>),
}

/// An iterator over the connectivity of the cells of a [`Mesh`].
pub struct Cells<'a> {
    cells: &'a [usize],
    offsets: &'a Offsets,
    idx: usize,
}

impl<'a> Iterator for Cells<'a> {
    type Item = &'a [usize];

    fn next(&mut self) -> Option<Self::Item> {
        let idx = self.idx;
        let (start, end) = match self.offsets {
            Offsets::Implicit(stride) if idx * stride < self.cells.len() => {
                (idx * stride, (idx + 1) * stride)
            }
            Offsets::Explicit(offsets) if idx + 1 < offsets.len() => {
                (offsets[idx], offsets[idx + 1])
            }
            _ => return None,
        };
        self.idx += 1;
        // This iterator can only be created from a valid `Mesh` so there cannot be bounds issues
        Some(&self.cells[start..end])
    }
}

impl<const D: usize> Mesh<D> {
    /// Creates a mesh where all the elements have the same kind.
    ///
    /// Fails if the connectivity does not describe a whole number of elements, if a node index is
    /// out of bounds or if the element kind does not live in `D` dimensions.
    pub fn uniform(points: Vec<[f64; D]>, cells: Vec<usize>, kind: ElementKind) -> Result<Self> {
        let stride = kind.node_count();
        ensure!(
            cells.len() % stride == 0,
            "The connectivity length ({}) is not a multiple of the {:?} node count ({}).",
            cells.len(),
            kind,
            stride
        );
        let mesh = Self {
            points,
            cells,
            offsets: Offsets::Implicit(stride),
            kinds: Kinds::Uniform(kind),
            ids: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Creates a mesh with mixed element kinds, one entry of `kinds` per element.
    pub fn mixed(points: Vec<[f64; D]>, cells: Vec<usize>, kinds: Vec<ElementKind>) -> Result<Self> {
        let offsets: Vec<usize> = std::iter::once(0)
            .chain(kinds.iter().scan(0, |end, kind| {
                *end += kind.node_count();
                Some(*end)
            }))
            .collect();
        let expected = offsets.last().copied().unwrap_or(0);
        ensure!(
            expected == cells.len(),
            "The element kinds require {} connectivity entries but {} were given.",
            expected,
            cells.len()
        );
        let mesh = Self {
            points,
            cells,
            offsets: Offsets::Explicit(offsets),
            kinds: Kinds::Mixed(kinds),
            ids: None,
        };
        mesh.validate()?;
        Ok(mesh)
    }

    /// Assigns explicit ids to the elements, in slot order.
    ///
    /// Fails if there is not exactly one id per element or if the ids are not unique.
    pub fn with_ids(mut self, ids: Vec<ElementId>) -> Result<Self> {
        ensure!(
            ids.len() == self.element_count(),
            "Expected {} element ids but {} were given.",
            self.element_count(),
            ids.len()
        );
        ensure!(ids.iter().all_unique(), "Element ids should be unique.");
        self.ids = Some(ids);
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        ensure!(D <= 3, "Meshes are supported up to 3 dimensions, not {}.", D);
        for slot in 0..self.element_count() {
            let kind = self.kind(slot);
            ensure!(
                kind.dim() == D,
                "Element {} is a {:?}, which cannot live in a {}D mesh.",
                slot,
                kind,
                D
            );
        }
        let n_points = self.points.len();
        if let Some(&idx) = self.cells.iter().find(|&&idx| idx >= n_points) {
            return Err(anyhow!(
                "Node index {} is out of bounds ({} nodes).",
                idx,
                n_points
            ));
        }
        Ok(())
    }

    pub fn element_count(&self) -> usize {
        match &self.offsets {
            Offsets::Implicit(stride) => self.cells.len() / stride,
            Offsets::Explicit(offsets) => offsets.len() - 1,
        }
    }

    pub fn node_count(&self) -> usize {
        self.points.len()
    }

    pub fn points(&self) -> &[[f64; D]] {
        &self.points
    }

    pub fn cells(&self) -> Cells<'_> {
        Cells {
            cells: &self.cells,
            offsets: &self.offsets,
            idx: 0,
        }
    }

    /// The kind of the element in slot `slot`.
    pub fn kind(&self, slot: usize) -> ElementKind {
        match &self.kinds {
            Kinds::Uniform(kind) => *kind,
            Kinds::Mixed(kinds) => kinds[slot],
        }
    }

    /// The id of the element in slot `slot`.
    pub fn id(&self, slot: usize) -> ElementId {
        self.ids
            .as_ref()
            .map_or(ElementId(slot), |ids| ids[slot])
    }

    /// A view of the element in slot `slot`.
    ///
    /// # Panics
    ///
    /// Panics if `slot >= self.element_count()`.
    pub fn element(&self, slot: usize) -> ElementRef<'_, D> {
        let (start, end) = match &self.offsets {
            Offsets::Implicit(stride) => (slot * stride, (slot + 1) * stride),
            Offsets::Explicit(offsets) => (offsets[slot], offsets[slot + 1]),
        };
        ElementRef {
            id: self.id(slot),
            kind: self.kind(slot),
            connectivity: &self.cells[start..end],
            points: &self.points,
        }
    }

    /// An iterator over the elements, in slot order.
    pub fn elements(&self) -> impl ExactSizeIterator<Item = ElementRef<'_, D>> + '_ {
        (0..self.element_count()).map(move |slot| self.element(slot))
    }

    /// The bounding box of all the nodes of the mesh.
    pub fn bounding_box(&self) -> BoundingBox<D> {
        BoundingBox::from_points(self.points.iter().copied())
    }
}

impl Mesh<2> {
    /// Creates a structured grid of `nx` by `ny` quadrilaterals.
    ///
    /// Cells are numbered from left to right, then from bottom to top.
    pub fn grid(xmin: f64, xmax: f64, ymin: f64, ymax: f64, nx: usize, ny: usize) -> Result<Self> {
        let (points, corners) = grid_2d(xmin, xmax, ymin, ymax, nx, ny)?;
        let cells = corners.into_iter().flatten().collect();
        Self::uniform(points, cells, ElementKind::Quad4)
    }

    /// Creates a structured grid of `nx` by `ny` squares, each one split into two triangles along
    /// its diagonal from the bottom-left to the top-right corner.
    ///
    /// The lower-right triangle of a square always comes right before its upper-left triangle.
    pub fn triangle_grid(
        xmin: f64,
        xmax: f64,
        ymin: f64,
        ymax: f64,
        nx: usize,
        ny: usize,
    ) -> Result<Self> {
        let (points, corners) = grid_2d(xmin, xmax, ymin, ymax, nx, ny)?;
        let cells = corners
            .into_iter()
            .flat_map(|[a, b, c, d]| [a, b, c, a, c, d])
            .collect();
        Self::uniform(points, cells, ElementKind::Tri3)
    }
}

impl Mesh<3> {
    /// Creates a structured grid of `nx` by `ny` by `nz` hexahedra.
    ///
    /// Cells are numbered along x first, then y, then z.
    pub fn box_grid(min: [f64; 3], max: [f64; 3], [nx, ny, nz]: [usize; 3]) -> Result<Self> {
        ensure!(
            nx > 0 && ny > 0 && nz > 0,
            "The grid should have at least one cell in each direction."
        );
        ensure!(
            (0..3).all(|axis| min[axis] < max[axis]),
            "The grid bounds should be strictly increasing."
        );
        let steps = [nx, ny, nz];
        let points: Vec<_> = (0..=nz)
            .cartesian_product(0..=ny)
            .cartesian_product(0..=nx)
            .map(|((k, j), i)| {
                let ijk = [i, j, k];
                std::array::from_fn(|axis| {
                    min[axis] + (max[axis] - min[axis]) * ijk[axis] as f64 / steps[axis] as f64
                })
            })
            .collect();
        let node = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;
        let cells = (0..nz)
            .cartesian_product(0..ny)
            .cartesian_product(0..nx)
            .flat_map(|((k, j), i)| {
                [
                    node(i, j, k),
                    node(i + 1, j, k),
                    node(i + 1, j + 1, k),
                    node(i, j + 1, k),
                    node(i, j, k + 1),
                    node(i + 1, j, k + 1),
                    node(i + 1, j + 1, k + 1),
                    node(i, j + 1, k + 1),
                ]
            })
            .collect();
        Self::uniform(points, cells, ElementKind::Hex8)
    }
}

/// Points of a structured 2D grid and the counterclockwise corners of each of its cells.
fn grid_2d(
    xmin: f64,
    xmax: f64,
    ymin: f64,
    ymax: f64,
    nx: usize,
    ny: usize,
) -> Result<(Vec<[f64; 2]>, Vec<[usize; 4]>)> {
    ensure!(
        nx > 0 && ny > 0,
        "The grid should have at least one cell in each direction."
    );
    ensure!(
        xmin < xmax && ymin < ymax,
        "The grid bounds should be strictly increasing."
    );
    let dx = (xmax - xmin) / nx as f64;
    let dy = (ymax - ymin) / ny as f64;
    let points = (0..=ny)
        .cartesian_product(0..=nx)
        .map(|(j, i)| [xmin + i as f64 * dx, ymin + j as f64 * dy])
        .collect();
    let node = |i: usize, j: usize| j * (nx + 1) + i;
    let corners = (0..ny)
        .cartesian_product(0..nx)
        .map(|(j, i)| [node(i, j), node(i + 1, j), node(i + 1, j + 1), node(i, j + 1)])
        .collect();
    Ok((points, corners))
}

/// A versioned owner of a [`Mesh`].
///
/// This is how the outside world tells the point locators that the mesh changed: every call to
/// [`replace`](Self::replace) or [`notify_topology_changed`](Self::notify_topology_changed) bumps
/// the topology version, which invalidates every index built on an older version.
#[derive(Debug)]
pub struct MeshHandle<const D: usize> {
    current: RwLock<Arc<Mesh<D>>>,
    version: AtomicU64,
}

impl<const D: usize> MeshHandle<D> {
    pub fn new(mesh: Mesh<D>) -> Self {
        Self {
            current: RwLock::new(Arc::new(mesh)),
            version: AtomicU64::new(0),
        }
    }

    /// The current mesh.
    pub fn mesh(&self) -> Arc<Mesh<D>> {
        Arc::clone(&self.current.read())
    }

    /// The current mesh together with its topology version.
    pub fn snapshot(&self) -> (Arc<Mesh<D>>, u64) {
        let current = self.current.read();
        (Arc::clone(&current), self.version.load(Ordering::Acquire))
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Swaps in a new mesh.
    pub fn replace(&self, mesh: Mesh<D>) {
        let mut current = self.current.write();
        *current = Arc::new(mesh);
        self.version.fetch_add(1, Ordering::AcqRel);
    }

    /// Signals that the mesh changed without replacing it, forcing the indices to be rebuilt.
    pub fn notify_topology_changed(&self) {
        let _current = self.current.write();
        self.version.fetch_add(1, Ordering::AcqRel);
    }
}

impl<const D: usize> From<Mesh<D>> for MeshHandle<D> {
    fn from(mesh: Mesh<D>) -> Self {
        Self::new(mesh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_uniform_mesh() -> Result<()> {
        let points = vec![[0., 0.], [1., 0.], [0., 1.]];
        let cells = vec![0, 1, 2];
        let mesh = Mesh::uniform(points, cells, ElementKind::Tri3)?;

        assert_eq!(mesh.element_count(), 1);
        assert_eq!(mesh.node_count(), 3);

        Ok(())
    }

    #[test]
    fn create_mesh_with_mixed_cell_types() -> Result<()> {
        let points = vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.], [0.5, 1.5]];
        let cells = vec![0, 1, 2, 3, 3, 2, 4];
        let kinds = vec![ElementKind::Quad4, ElementKind::Tri3];
        let mesh = Mesh::mixed(points, cells, kinds)?;

        assert_eq!(mesh.element_count(), 2);
        assert_eq!(mesh.kind(1), ElementKind::Tri3);
        assert_eq!(mesh.element(1).connectivity(), &[3, 2, 4]);

        Ok(())
    }

    #[test]
    fn iterate_over_cells_with_single_cell_type() -> Result<()> {
        let points = vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.]];
        let cells = vec![0, 1, 3, 1, 2, 3];
        let mesh = Mesh::uniform(points, cells, ElementKind::Tri3)?;

        let mut cells = mesh.cells();

        assert_eq!(cells.next(), Some([0, 1, 3].as_slice()));
        assert_eq!(cells.next(), Some([1, 2, 3].as_slice()));
        assert_eq!(cells.next(), None);

        Ok(())
    }

    #[test]
    fn iterate_over_cells_with_mixed_cell_type() -> Result<()> {
        let points = vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.], [0.5, 1.5]];
        let cells = vec![0, 1, 2, 3, 3, 2, 4];
        let kinds = vec![ElementKind::Quad4, ElementKind::Tri3];
        let mesh = Mesh::mixed(points, cells, kinds)?;

        let mut cells = mesh.cells();

        assert_eq!(cells.next(), Some([0, 1, 2, 3].as_slice()));
        assert_eq!(cells.next(), Some([3, 2, 4].as_slice()));
        assert_eq!(cells.next(), None);

        Ok(())
    }

    #[test]
    fn invalid_meshes_are_rejected() {
        // Incomplete element
        assert!(Mesh::uniform(vec![[0., 0.], [1., 0.]], vec![0, 1], ElementKind::Tri3).is_err());
        // Node index out of bounds
        assert!(Mesh::uniform(
            vec![[0., 0.], [1., 0.], [0., 1.]],
            vec![0, 1, 3],
            ElementKind::Tri3
        )
        .is_err());
        // 3D element in a 2D mesh
        assert!(Mesh::uniform(
            vec![[0., 0.], [1., 0.], [0., 1.], [1., 1.]],
            vec![0, 1, 2, 3],
            ElementKind::Tet4
        )
        .is_err());
        // Kinds that do not match the connectivity
        assert!(Mesh::mixed(
            vec![[0., 0.], [1., 0.], [0., 1.]],
            vec![0, 1, 2],
            vec![ElementKind::Quad4]
        )
        .is_err());
    }

    #[test]
    fn explicit_element_ids() -> Result<()> {
        let mesh = Mesh::triangle_grid(0., 1., 0., 1., 1, 1)?;

        assert_eq!(mesh.id(1), ElementId(1));

        let mesh = mesh.with_ids(vec![ElementId(10), ElementId(3)])?;
        assert_eq!(mesh.element(0).id(), ElementId(10));
        assert_eq!(mesh.element(1).id(), ElementId(3));

        Ok(())
    }

    #[test]
    fn duplicate_element_ids_are_rejected() -> Result<()> {
        let mesh = Mesh::triangle_grid(0., 1., 0., 1., 1, 1)?;

        assert!(mesh.clone().with_ids(vec![ElementId(2), ElementId(2)]).is_err());
        assert!(mesh.with_ids(vec![ElementId(2)]).is_err());

        Ok(())
    }

    #[test]
    fn quad_grid_numbering() -> Result<()> {
        let mesh = Mesh::grid(0., 2., 0., 3., 2, 3)?;

        assert_eq!(mesh.element_count(), 6);
        assert_eq!(mesh.node_count(), 12);
        assert_eq!(mesh.element(3).centroid(), [1.5, 1.5]);
        assert_eq!(mesh.bounding_box(), BoundingBox::from_points([[0., 0.], [2., 3.]]));

        Ok(())
    }

    #[test]
    fn triangle_grid_splits_squares_along_the_diagonal() -> Result<()> {
        let mesh = Mesh::triangle_grid(0., 1., 0., 1., 1, 1)?;
        let nodes: Vec<_> = mesh.elements().map(|e| e.nodes().collect_vec()).collect();

        assert_eq!(
            nodes,
            vec![
                vec![[0., 0.], [1., 0.], [1., 1.]],
                vec![[0., 0.], [1., 1.], [0., 1.]],
            ]
        );

        Ok(())
    }

    #[test]
    fn hexahedral_grid() -> Result<()> {
        let mesh = Mesh::box_grid([0., 0., 0.], [1., 2., 3.], [2, 2, 3])?;

        assert_eq!(mesh.element_count(), 12);
        assert_eq!(mesh.node_count(), 3 * 3 * 4);
        assert_eq!(mesh.element(0).centroid(), [0.25, 0.5, 0.5]);

        Ok(())
    }

    #[test]
    fn mesh_handle_versions() -> Result<()> {
        let handle = MeshHandle::new(Mesh::grid(0., 1., 0., 1., 1, 1)?);
        assert_eq!(handle.version(), 0);

        handle.notify_topology_changed();
        assert_eq!(handle.version(), 1);

        handle.replace(Mesh::grid(0., 1., 0., 1., 2, 2)?);
        let (mesh, version) = handle.snapshot();
        assert_eq!(version, 2);
        assert_eq!(mesh.element_count(), 4);

        Ok(())
    }
}
