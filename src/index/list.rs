use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{ConstructionError, GeometryError, LocatorResult};
use crate::index::ElementSet;
use crate::mesh::Mesh;
use crate::point_locator::{Hit, Matches, PointLocator, QueryResult};

/// An exhaustive point locator.
///
/// There is no preprocessing beyond the element bounding boxes: a query tests the elements one
/// after the other, in ascending id order, and stops at the first one that contains the point.
/// This is the right choice for small meshes, and a reference to validate [`TreeIndex`] against.
///
/// [`TreeIndex`]: crate::index::TreeIndex
#[derive(Debug)]
pub struct ListIndex<const D: usize> {
    pub(crate) elements: ElementSet<D>,
}

impl<const D: usize> ListIndex<D> {
    /// Creates a list locator over the elements of `mesh`.
    ///
    /// Fails if the mesh is empty or has non-finite coordinates.
    pub fn build(mesh: Arc<Mesh<D>>, tolerance: f64) -> Result<Self, ConstructionError> {
        Ok(Self::from_elements(ElementSet::new(mesh, tolerance)?))
    }

    pub(crate) fn from_elements(elements: ElementSet<D>) -> Self {
        Self { elements }
    }

    pub(crate) fn find(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> Option<(usize, Hit<D>)> {
        if !self.elements.region().contains(point) {
            return None;
        }
        self.elements.by_id().iter().find_map(|&slot| {
            self.elements
                .hit_test(slot, point, diagnostics)
                .map(|hit| (slot, hit))
        })
    }

    pub(crate) fn find_all(
        &self,
        point: &[f64; D],
        diagnostics: &mut Vec<GeometryError>,
    ) -> SmallVec<[Hit<D>; 4]> {
        if !self.elements.region().contains(point) {
            return SmallVec::new();
        }
        self.elements
            .by_id()
            .iter()
            .filter_map(|&slot| self.elements.hit_test(slot, point, diagnostics))
            .collect()
    }
}

impl<const D: usize> PointLocator<D> for ListIndex<D> {
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
    use crate::element::{ElementId, ElementKind};
    use crate::error::GeometryError;

    use super::*;

    #[test]
    fn locate_points_in_single_triangle() -> Result<()> {
        let mesh = Mesh::uniform(
            vec![[0., 0.], [1., 0.], [0.5, 0.5]],
            vec![0, 1, 2],
            ElementKind::Tri3,
        )?;
        let list = ListIndex::build(Arc::new(mesh), DEFAULT_TOLERANCE)?;

        let inside = list.locate_one(&[0.5, 0.25])?;
        assert_eq!(inside.element(), Some(ElementId(0)));
        let local = inside.local().unwrap();
        assert!((local[0] - 0.25).abs() < 1e-14 && (local[1] - 0.5).abs() < 1e-14);

        // Inside of the bounding box but outside of the triangle
        assert!(!list.locate_one(&[0.1, 0.4])?.is_found());
        // Outside of the bounding box
        assert!(!list.locate_one(&[2., 2.])?.is_found());
        Ok(())
    }

    #[test]
    fn mixed_element_kinds() -> Result<()> {
        //
        //      4
        //     / \
        //    / 1 \
        //  3+-----+2
        //   |     |
        //   |  0  |
        //   |     |
        //  0+-----+1
        //
        let mesh = Mesh::mixed(
            vec![[0., 0.], [1., 0.], [1., 1.], [0., 1.], [0.5, 1.5]],
            vec![0, 1, 2, 3, 3, 2, 4],
            vec![ElementKind::Quad4, ElementKind::Tri3],
        )?;
        let list = ListIndex::build(Arc::new(mesh), DEFAULT_TOLERANCE)?;

        let results = list.locate_many(&[[0.5, 0.5], [0.5, 1.25], [0.9, 1.4], [0.5, 1.]])?;

        assert_eq!(
            results.iter().map(QueryResult::element).collect_vec(),
            vec![Some(ElementId(0)), Some(ElementId(1)), None, Some(ElementId(0))]
        );
        assert_eq!(list.locate_all(&[0.5, 1.])?.len(), 2);
        Ok(())
    }

    #[test]
    fn degenerate_element_is_reported_and_skipped() -> Result<()> {
        // Element 0 is flat, element 1 is a regular triangle over the same region
        let mesh = Mesh::uniform(
            vec![[0., 0.], [2., 0.], [1., 0.], [0., 2.]],
            vec![0, 2, 1, 0, 1, 3],
            ElementKind::Tri3,
        )?;
        let list = ListIndex::build(Arc::new(mesh), DEFAULT_TOLERANCE)?;

        let result = list.locate_one(&[1., 0.])?;

        assert_eq!(result.element(), Some(ElementId(1)));
        assert!(matches!(
            result.diagnostics(),
            [GeometryError::Degenerate {
                element: ElementId(0),
                ..
            }]
        ));
        Ok(())
    }

    #[test]
    fn parallel_and_sequential_queries_agree() -> Result<()> {
        let mesh = Mesh::triangle_grid(0., 3., 0., 2., 6, 4)?;
        let list = ListIndex::build(Arc::new(mesh), DEFAULT_TOLERANCE)?;
        let points = (0..50)
            .map(|k| {
                let t = k as f64 / 50.;
                [3.2 * t - 0.1, 2. * (1. - t)]
            })
            .collect_vec();

        assert_eq!(list.locate_many(&points)?, list.par_locate_many(&points)?);
        Ok(())
    }
}
