use std::sync::Arc;

use smallvec::SmallVec;

use crate::element::ElementId;
use crate::error::{ConstructionError, GeometryError, LocatorResult};
use crate::geometry::BoundingBox;
use crate::index::ElementSet;
use crate::mesh::Mesh;
use crate::point_locator::{Hit, Matches, PointLocator, QueryResult};

/// A bounding volume hierarchy over the element bounding boxes.
///
/// The tree is built top-down: the elements of a node are split in two halves at the median of
/// their box centers along the longest axis of the node region, until at most `leaf_size`
/// elements remain or the maximum depth is reached. The nodes live in an arena and refer to each
/// other by index.
///
/// A query descends from the root, skipping every subtree whose region does not contain the point,
/// and runs the containment test on the elements of the leaves it reaches. Children are always
/// visited in the same order and each node knows the lowest element id below it, so a subtree is
/// also skipped when it cannot improve on the match already found. The result is therefore the
/// matching element with the lowest id, regardless of the shape of the tree.
#[derive(Debug)]
pub struct TreeIndex<const D: usize> {
    pub(crate) elements: ElementSet<D>,
    arena: Vec<Node<D>>,
    leaf_size: usize,
    max_depth: usize,
    depth: usize,
}

#[derive(Debug)]
struct Node<const D: usize> {
    region: BoundingBox<D>,
    // Lowest element id in the subtree
    min_id: ElementId,
    kind: NodeKind,
}

#[derive(Debug)]
enum NodeKind {
    Internal { left: usize, right: usize },
    // Slots sorted by ascending element id
    Leaf { slots: Vec<usize> },
}

impl<const D: usize> TreeIndex<D> {
    /// Builds a tree over the elements of `mesh`.
    ///
    /// Fails if the mesh is empty or has non-finite coordinates.
    pub fn build(
        mesh: Arc<Mesh<D>>,
        leaf_size: usize,
        max_depth: usize,
        tolerance: f64,
    ) -> Result<Self, ConstructionError> {
        let elements = ElementSet::new(mesh, tolerance)?;
        Ok(Self::from_elements(elements, leaf_size, max_depth))
    }

    pub(crate) fn from_elements(elements: ElementSet<D>, leaf_size: usize, max_depth: usize) -> Self {
        let mut tree = Self {
            elements,
            arena: Vec::new(),
            leaf_size: leaf_size.max(1),
            max_depth: max_depth.max(1),
            depth: 0,
        };
        let slots = (0..tree.elements.len()).collect();
        tree.split(slots, 0);
        tree
    }

    fn split(&mut self, mut slots: Vec<usize>, depth: usize) -> usize {
        let region = slots.iter().fold(BoundingBox::empty(), |acc, &slot| {
            acc.union(self.elements.bounding_box(slot))
        });
        let min_id = slots
            .iter()
            .map(|&slot| self.elements.id(slot))
            .min()
            .unwrap_or_default();
        let id = self.arena.len();
        self.depth = self.depth.max(depth);

        if slots.len() <= self.leaf_size || depth >= self.max_depth {
            let elements = &self.elements;
            slots.sort_unstable_by_key(|&slot| elements.id(slot));
            self.arena.push(Node {
                region,
                min_id,
                kind: NodeKind::Leaf { slots },
            });
            return id;
        }

        // Placeholder, replaced once the children are built
        self.arena.push(Node {
            region,
            min_id,
            kind: NodeKind::Leaf { slots: Vec::new() },
        });

        let axis = region.longest_axis();
        let mid = slots.len() / 2;
        let elements = &self.elements;
        slots.select_nth_unstable_by(mid, |&a, &b| {
            let ca = elements.bounding_box(a).center()[axis];
            let cb = elements.bounding_box(b).center()[axis];
            ca.total_cmp(&cb).then(a.cmp(&b))
        });
        let upper = slots.split_off(mid);

        let left = self.split(slots, depth + 1);
        let right = self.split(upper, depth + 1);
        self.arena[id].kind = NodeKind::Internal { left, right };
        id
    }

    /// Number of nodes of the tree.
    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.arena
            .iter()
            .filter(|node| matches!(node.kind, NodeKind::Leaf { .. }))
            .count()
    }

    /// Depth of the deepest leaf, the root being at depth `0`.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn leaf_size(&self) -> usize {
        self.leaf_size
    }

    /// The region covered by the tree.
    pub fn bounding_box(&self) -> &BoundingBox<D> {
        self.elements.region()
    }

    pub(crate) fn find(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> Option<(usize, Hit<D>)> {
        let mut best: Option<(usize, Hit<D>)> = None;
        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(0);
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            if !node.region.contains(point) {
                continue;
            }
            if matches!(best, Some((_, hit)) if node.min_id >= hit.element) {
                continue;
            }
            match &node.kind {
                NodeKind::Internal { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
                NodeKind::Leaf { slots } => {
                    for &slot in slots {
                        if matches!(best, Some((_, hit)) if self.elements.id(slot) >= hit.element) {
                            break;
                        }
                        if let Some(hit) = self.elements.hit_test(slot, point, diagnostics) {
                            best = Some((slot, hit));
                            break;
                        }
                    }
                }
            }
        }
        best
    }

    pub(crate) fn find_all(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> SmallVec<[Hit<D>; 4]> {
        let mut hits = SmallVec::new();
        let mut stack: SmallVec<[usize; 64]> = SmallVec::new();
        stack.push(0);
        while let Some(id) = stack.pop() {
            let node = &self.arena[id];
            if !node.region.contains(point) {
                continue;
            }
            match &node.kind {
                NodeKind::Internal { left, right } => {
                    stack.push(*right);
                    stack.push(*left);
                }
                NodeKind::Leaf { slots } => hits.extend(
                    slots
                        .iter()
                        .filter_map(|&slot| self.elements.hit_test(slot, point, diagnostics)),
                ),
            }
        }
        hits
    }
}

impl<const D: usize> PointLocator<D> for TreeIndex<D> {
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

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use itertools::Itertools;

    use crate::containment::DEFAULT_TOLERANCE;
    use crate::element::ElementKind;

    use super::*;

    fn leaves<const D: usize>(tree: &TreeIndex<D>) -> Vec<&[usize]> {
        tree.arena
            .iter()
            .filter_map(|node| match &node.kind {
                NodeKind::Leaf { slots } => Some(slots.as_slice()),
                NodeKind::Internal { .. } => None,
            })
            .collect()
    }

    #[test]
    fn every_element_is_in_exactly_one_leaf() -> Result<()> {
        let mesh = Arc::new(Mesh::triangle_grid(0., 1., 0., 1., 17, 13)?);
        let tree = TreeIndex::build(mesh.clone(), 5, 32, DEFAULT_TOLERANCE)?;

        let slots = leaves(&tree).concat().into_iter().sorted().collect_vec();

        assert_eq!(slots, (0..mesh.element_count()).collect_vec());
        assert!(leaves(&tree).iter().all(|leaf| leaf.len() <= 5));
        Ok(())
    }

    #[test]
    fn node_regions_contain_their_elements() -> Result<()> {
        let mesh = Arc::new(Mesh::grid(-3., 5., 0., 2., 20, 7)?);
        let tree = TreeIndex::build(mesh, 4, 32, DEFAULT_TOLERANCE)?;

        fn check<const D: usize>(tree: &TreeIndex<D>, id: usize) -> Vec<usize> {
            let node = &tree.arena[id];
            let slots = match &node.kind {
                NodeKind::Internal { left, right } => {
                    [check(tree, *left), check(tree, *right)].concat()
                }
                NodeKind::Leaf { slots } => slots.clone(),
            };
            for &slot in &slots {
                let bbox = tree.elements.bounding_box(slot);
                assert!(node.region.contains(&bbox.min) && node.region.contains(&bbox.max));
                assert!(tree.elements.id(slot) >= node.min_id);
            }
            slots
        }
        check(&tree, 0);
        Ok(())
    }

    #[test]
    fn tree_is_balanced() -> Result<()> {
        let mesh = Arc::new(Mesh::grid(0., 1., 0., 1., 32, 32)?);

        let tree = TreeIndex::build(mesh, 8, 32, DEFAULT_TOLERANCE)?;

        // 1024 elements in leaves of at most 8 elements: 7 median splits
        assert_eq!(tree.depth(), 7);
        assert_eq!(tree.leaf_count(), 128);
        assert_eq!(tree.node_count(), 255);
        Ok(())
    }

    #[test]
    fn maximum_depth_bounds_the_recursion() -> Result<()> {
        // All the elements are stacked on top of each other
        let points = vec![[0., 0.], [1., 0.], [0., 1.]];
        let cells = std::iter::repeat([0, 1, 2]).take(100).flatten().collect();
        let mesh = Arc::new(Mesh::uniform(points, cells, ElementKind::Tri3)?);

        let tree = TreeIndex::build(mesh, 1, 3, DEFAULT_TOLERANCE)?;

        assert_eq!(tree.depth(), 3);
        assert_eq!(tree.leaf_count(), 8);
        // Every copy contains the point, the lowest id wins
        let result = tree.locate_one(&[0.25, 0.25])?;
        assert_eq!(result.element(), Some(ElementId(0)));
        assert_eq!(tree.locate_all(&[0.25, 0.25])?.len(), 100);
        Ok(())
    }

    #[test]
    fn locate_points_in_grid() -> Result<()> {
        let mesh = Arc::new(Mesh::grid(0., 1., 0., 1., 10, 10)?);
        let tree = TreeIndex::build(mesh, 9, 32, DEFAULT_TOLERANCE)?;

        for j in 0..10 {
            let y = 0.05 + (j as f64) * 0.1;
            for i in 0..10 {
                let x = 0.05 + (i as f64) * 0.1;
                let result = tree.locate_one(&[x, y])?;
                assert_eq!(result.element(), Some(ElementId(j * 10 + i)));
            }
        }
        Ok(())
    }

    #[test]
    fn points_outside_of_the_root_region_are_not_found() -> Result<()> {
        let mesh = Arc::new(Mesh::grid(0., 1., 0., 1., 4, 4)?);
        let tree = TreeIndex::build(mesh, 2, 32, DEFAULT_TOLERANCE)?;

        assert!(!tree.bounding_box().contains(&[1.5, 0.5]));
        assert!(!tree.locate_one(&[1.5, 0.5])?.is_found());
        assert!(tree.locate_all(&[-0.5, -0.5])?.is_empty());
        Ok(())
    }

    #[test]
    fn shared_vertex_belongs_to_every_incident_element() -> Result<()> {
        let mesh = Arc::new(Mesh::grid(0., 1., 0., 1., 2, 2)?);
        let tree = TreeIndex::build(mesh, 1, 32, DEFAULT_TOLERANCE)?;

        let matches = tree.locate_all(&[0.5, 0.5])?;

        assert_eq!(
            matches.elements().collect_vec(),
            vec![ElementId(0), ElementId(1), ElementId(2), ElementId(3)]
        );
        assert_eq!(tree.locate_one(&[0.5, 0.5])?.element(), Some(ElementId(0)));
        Ok(())
    }
}
