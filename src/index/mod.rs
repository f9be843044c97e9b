//! The point location strategies.
//!
//! Both strategies work on an [`ElementSet`], which holds the mesh snapshot they were built on
//! together with the per-element data shared by every query: inflated bounding boxes, the
//! ascending id order used to break ties, and the overlapping neighbors used by the locator cache.
use std::sync::Arc;

use itertools::Itertools;
use log::debug;
use smallvec::SmallVec;

use crate::containment::contains_point;
use crate::element::ElementId;
use crate::error::{ConstructionError, GeometryError, LocatorResult};
use crate::geometry::BoundingBox;
use crate::mesh::Mesh;
use crate::options::{LocatorOptions, Strategy};
use crate::point_locator::{Hit, Matches, PointLocator, QueryResult};

pub mod list;
pub mod tree;

pub use list::ListIndex;
pub use tree::TreeIndex;

/// Extra margin around curved elements, relative to their size.
const CURVED_SLACK: f64 = 0.05;

#[derive(Debug)]
pub(crate) struct ElementSet<const D: usize> {
    mesh: Arc<Mesh<D>>,
    tolerance: f64,
    boxes: Vec<BoundingBox<D>>,
    by_id: Vec<usize>,
    neighbor_offsets: Vec<usize>,
    neighbors: Vec<usize>,
    region: BoundingBox<D>,
}

impl<const D: usize> ElementSet<D> {
    pub(crate) fn new(mesh: Arc<Mesh<D>>, tolerance: f64) -> Result<Self, ConstructionError> {
        if mesh.element_count() == 0 {
            return Err(ConstructionError::EmptyMesh);
        }

        let mut boxes = Vec::with_capacity(mesh.element_count());
        for element in mesh.elements() {
            let bbox = element.bounding_box();
            if !element.nodes().flatten().all(f64::is_finite) || !bbox.is_finite() {
                return Err(ConstructionError::NonFiniteCoordinates {
                    element: element.id(),
                });
            }
            let slack = if element.kind().is_curved() {
                tolerance + CURVED_SLACK
            } else {
                tolerance
            };
            boxes.push(bbox.inflated(slack * bbox.diagonal()));
        }
        let region = boxes
            .iter()
            .fold(BoundingBox::empty(), |acc, bbox| acc.union(bbox));

        let by_id = (0..mesh.element_count())
            .sorted_unstable_by_key(|&slot| mesh.id(slot))
            .collect();

        let (neighbor_offsets, neighbors) = overlapping_boxes(&mesh, &boxes);

        Ok(Self {
            mesh,
            tolerance,
            boxes,
            by_id,
            neighbor_offsets,
            neighbors,
            region,
        })
    }

    pub(crate) fn mesh(&self) -> &Arc<Mesh<D>> {
        &self.mesh
    }

    pub(crate) fn len(&self) -> usize {
        self.boxes.len()
    }

    pub(crate) fn id(&self, slot: usize) -> ElementId {
        self.mesh.id(slot)
    }

    pub(crate) fn bounding_box(&self, slot: usize) -> &BoundingBox<D> {
        &self.boxes[slot]
    }

    /// The bounding region of the whole mesh, including the tolerance.
    pub(crate) fn region(&self) -> &BoundingBox<D> {
        &self.region
    }

    /// Slots in ascending element id order.
    pub(crate) fn by_id(&self) -> &[usize] {
        &self.by_id
    }

    /// Slots of the elements whose box overlaps the one of `slot`, in ascending id order.
    pub(crate) fn neighbors(&self, slot: usize) -> &[usize] {
        &self.neighbors[self.neighbor_offsets[slot]..self.neighbor_offsets[slot + 1]]
    }

    /// Runs the containment test of the element in `slot`.
    ///
    /// Failures of the inverse map make the element a non-match and are pushed to `diagnostics`.
    pub(crate) fn hit_test(
        &self,
        slot: usize,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> Option<Hit<D>> {
        if !self.boxes[slot].contains(point) {
            return None;
        }
        let element = self.mesh.element(slot);
        match contains_point(&element, point, self.tolerance) {
            Ok(local) => local.map(|local| Hit {
                element: element.id(),
                local,
            }),
            Err(err) => {
                debug!("Skipping element during point location: {err}");
                diagnostics.push(err);
                None
            }
        }
    }

    /// Tests the candidate slots and returns the match with the lowest id, with its slot.
    pub(crate) fn best_of<I>(
        &self,
        candidates: I,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> Option<(usize, Hit<D>)>
    where
        I: IntoIterator<Item = usize>,
    {
        candidates
            .into_iter()
            .filter_map(|slot| self.hit_test(slot, point, diagnostics).map(|hit| (slot, hit)))
            .min_by_key(|(_, hit)| hit.element)
    }
}

/// Computes, for each element, the elements whose inflated box overlaps its own, in compressed row
/// format.
///
/// Two elements containing the same point always overlap, whether they share nodes or not.
fn overlapping_boxes<const D: usize>(
    mesh: &Mesh<D>,
    boxes: &[BoundingBox<D>],
) -> (Vec<usize>, Vec<usize>) {
    // Sweep along the first axis
    let order = (0..boxes.len())
        .sorted_unstable_by(|&a, &b| boxes[a].min[0].total_cmp(&boxes[b].min[0]))
        .collect_vec();
    let mut overlaps: Vec<SmallVec<[usize; 16]>> = vec![SmallVec::new(); boxes.len()];
    for (rank, &slot) in order.iter().enumerate() {
        for &other in &order[rank + 1..] {
            if boxes[other].min[0] > boxes[slot].max[0] {
                break;
            }
            if boxes[slot].intersects(&boxes[other]) {
                overlaps[slot].push(other);
                overlaps[other].push(slot);
            }
        }
    }

    let mut offsets = Vec::with_capacity(boxes.len() + 1);
    let mut neighbors = Vec::new();
    offsets.push(0);
    for list in &mut overlaps {
        list.sort_unstable_by_key(|&other| (mesh.id(other), other));
        neighbors.extend_from_slice(list);
        offsets.push(neighbors.len());
    }
    (offsets, neighbors)
}

/// The active point location index of a [`Locator`](crate::Locator).
#[derive(Debug)]
pub enum Index<const D: usize> {
    Tree(TreeIndex<D>),
    List(ListIndex<D>),
}

impl<const D: usize> Index<D> {
    /// Builds the index selected by `options.strategy` over `mesh`.
    pub fn build(mesh: Arc<Mesh<D>>, options: &LocatorOptions) -> Result<Self, ConstructionError> {
        debug!(
            "Building {} index over {} elements",
            options.strategy,
            mesh.element_count()
        );
        let elements = ElementSet::new(mesh, options.tolerance)?;
        let index = match options.strategy {
            Strategy::Tree => Self::Tree(TreeIndex::from_elements(
                elements,
                options.leaf_size,
                options.max_depth,
            )),
            Strategy::List => Self::List(ListIndex::from_elements(elements)),
        };
        if let Self::Tree(tree) = &index {
            debug!(
                "Built tree with {} nodes, {} leaves and depth {}",
                tree.node_count(),
                tree.leaf_count(),
                tree.depth()
            );
        }
        Ok(index)
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Self::Tree(_) => Strategy::Tree,
            Self::List(_) => Strategy::List,
        }
    }

    /// The mesh snapshot the index was built on.
    pub fn mesh(&self) -> &Arc<Mesh<D>> {
        self.elements().mesh()
    }

    pub(crate) fn elements(&self) -> &ElementSet<D> {
        match self {
            Self::Tree(tree) => &tree.elements,
            Self::List(list) => &list.elements,
        }
    }

    /// The matching element with the lowest id, with its slot.
    pub(crate) fn find(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> Option<(usize, Hit<D>)> {
        match self {
            Self::Tree(tree) => tree.find(point, diagnostics),
            Self::List(list) => list.find(point, diagnostics),
        }
    }

    pub(crate) fn find_all(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> SmallVec<[Hit<D>; 4]> {
        match self {
            Self::Tree(tree) => tree.find_all(point, diagnostics),
            Self::List(list) => list.find_all(point, diagnostics),
        }
    }
}

impl<const D: usize> PointLocator<D> for Index<D> {
    fn locate_one(&self, point: &[f64; D]) -> LocatorResult<QueryResult<D>> {
        let mut diagnostics = Vec::new();
        let hit = self.find(point, &mut diagnostics).map(|(_, hit)| hit);
        Ok(QueryResult::new(hit, diagnostics))
    }

    fn locate_all(&self, point: &[f64; D]) -> LocatorResult<Matches<D>> {
        let mut diagnostics = Vec::new();
        let hits = self.find_all(point, &mut diagnostics);
        Ok(Matches::new(hits, diagnostics))
    }
}
