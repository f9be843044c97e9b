//! Point location in unstructured finite element meshes.
//!
//! Given a mesh of 1D, 2D or 3D elements and a query point, `meshloc` finds the element containing
//! the point along with the local coordinates of the point in that element. Two strategies are
//! available: a bounding volume hierarchy ([`TreeIndex`]) and an exhaustive scan ([`ListIndex`]).
//! Both return the same answer: when the point lies on the boundary between several elements, the
//! one with the lowest id wins.
//!
//! Most users go through a [`Locator`], which builds its index on the first query, rebuilds it
//! after the mesh changes, and can share it with slave locators:
//!
//! ```
//! use meshloc::{Locator, LocatorOptions, Mesh, MeshHandle, PointLocator};
//!
//! let mesh = MeshHandle::new(Mesh::grid(0., 4., 0., 2., 8, 4)?);
//! let master = Locator::new(&mesh, LocatorOptions::default())?;
//! let slave = Locator::with_master(&mesh, &master, LocatorOptions::default())?;
//!
//! let results = slave.locate_many(&[[0.3, 0.3], [3.9, 1.9], [5., 5.]])?;
//! assert_eq!(results.iter().filter(|result| result.is_found()).count(), 2);
//! assert_eq!(master.build_count(), 1);
//! # Ok::<(), anyhow::Error>(())
//! ```
mod containment;
mod element;
mod error;
mod geometry;
pub mod index;
mod locator;
mod mesh;
mod options;
mod point_locator;

pub use containment::{
    contains_point, inverse_map, jacobian, map_to_physical, DEFAULT_TOLERANCE,
    MAX_NEWTON_ITERATIONS,
};
pub use element::{ElementId, ElementKind, ElementRef, ReferenceShape};
pub use error::{
    ConfigurationError, ConstructionError, GeometryError, LocatorError, LocatorResult,
};
pub use geometry::{distance, BoundingBox};
pub use index::{Index, ListIndex, TreeIndex};
pub use locator::{BuildState, Locator};
pub use mesh::{Cells, Mesh, MeshHandle};
pub use options::{LocatorOptions, Strategy, DEFAULT_LEAF_SIZE, DEFAULT_MAX_DEPTH};
pub use point_locator::{Hit, Matches, PointLocator, QueryResult};
