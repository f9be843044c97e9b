use rayon::prelude::*;
use smallvec::SmallVec;

use crate::element::ElementId;
use crate::error::{GeometryError, LocatorResult};

/// An element containing a query point, with the local coordinates of the point in that element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit<const D: usize> {
    pub element: ElementId,
    pub local: [f64; D],
}

/// The answer to a single point location query.
///
/// A point outside of the mesh is a normal outcome and yields a result without a hit. Elements
/// whose inverse map failed while answering the query are reported in
/// [`diagnostics`](Self::diagnostics); they were treated as non-matches.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryResult<const D: usize> {
    pub(crate) hit: Option<Hit<D>>,
    pub(crate) diagnostics: Vec<GeometryError>,
}

impl<const D: usize> QueryResult<D> {
    pub(crate) fn new(hit: Option<Hit<D>>, diagnostics: Vec<GeometryError>) -> Self {
        Self { hit, diagnostics }
    }

    pub fn hit(&self) -> Option<&Hit<D>> {
        self.hit.as_ref()
    }

    /// The element containing the point, if any.
    pub fn element(&self) -> Option<ElementId> {
        self.hit.map(|hit| hit.element)
    }

    /// The local coordinates of the point in [`element`](Self::element).
    pub fn local(&self) -> Option<&[f64; D]> {
        self.hit.as_ref().map(|hit| &hit.local)
    }

    pub fn is_found(&self) -> bool {
        self.hit.is_some()
    }

    pub fn diagnostics(&self) -> &[GeometryError] {
        &self.diagnostics
    }

    pub fn into_hit(self) -> Option<Hit<D>> {
        self.hit
    }
}

/// Every element containing a query point, sorted by ascending id.
///
/// There is more than one only when the point lies on a face, edge or vertex shared by several
/// elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matches<const D: usize> {
    pub(crate) hits: SmallVec<[Hit<D>; 4]>,
    pub(crate) diagnostics: Vec<GeometryError>,
}

impl<const D: usize> Matches<D> {
    pub(crate) fn new(mut hits: SmallVec<[Hit<D>; 4]>, diagnostics: Vec<GeometryError>) -> Self {
        hits.sort_unstable_by_key(|hit| hit.element);
        Self { hits, diagnostics }
    }

    pub fn hits(&self) -> &[Hit<D>] {
        &self.hits
    }

    pub fn elements(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.hits.iter().map(|hit| hit.element)
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn diagnostics(&self) -> &[GeometryError] {
        &self.diagnostics
    }
}

/// A trait to locate one or several query points within a mesh.
pub trait PointLocator<const D: usize> {
    /// Locates one query point within a mesh.
    ///
    /// When several elements contain the point, the one with the lowest id is returned.
    fn locate_one(&self, point: &[f64; D]) -> LocatorResult<QueryResult<D>>;

    /// Finds every element containing the query point.
    fn locate_all(&self, point: &[f64; D]) -> LocatorResult<Matches<D>>;

    /// Locates several query points within a mesh.
    fn locate_many(&self, points: &[[f64; D]]) -> LocatorResult<Vec<QueryResult<D>>> {
        points.iter().map(|point| self.locate_one(point)).collect()
    }

    /// Locates several query points within a mesh in parallel.
    fn par_locate_many(&self, points: &[[f64; D]]) -> LocatorResult<Vec<QueryResult<D>>>
    where
        Self: std::marker::Sync,
    {
        points
            .par_iter()
            .map(|point| self.locate_one(point))
            .collect()
    }
}
