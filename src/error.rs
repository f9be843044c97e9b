use thiserror::Error;

use crate::element::ElementId;

/// Result type of the fallible [`Locator`](crate::Locator) operations.
pub type LocatorResult<T> = Result<T, LocatorError>;

/// Errors returned by a [`Locator`](crate::Locator).
///
/// Note that a point lying outside of the mesh is *not* an error: it is reported as a
/// [`QueryResult`](crate::QueryResult) without a hit.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LocatorError {
    /// The locator was misconfigured by the caller.
    #[error("invalid locator configuration: {0}")]
    Configuration(#[from] ConfigurationError),

    /// The index could not be built. The build is retried on the next query.
    #[error("failed to build the point locator index: {0}")]
    Construction(#[from] ConstructionError),
}

/// Caller misuse, detected when a [`Locator`](crate::Locator) is constructed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("unknown point locator strategy {0:?} (expected \"tree\" or \"list\")")]
    UnknownStrategy(String),

    #[error("a slave locator must be built on the same mesh as its master")]
    MeshMismatch,

    #[error("the leaf size must be positive")]
    InvalidLeafSize,

    #[error("the maximum tree depth must be positive")]
    InvalidMaxDepth,

    #[error("the tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),
}

/// Failure to build a point location index over a mesh.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstructionError {
    #[error("the mesh has no elements")]
    EmptyMesh,

    #[error("element {element} has non-finite node coordinates")]
    NonFiniteCoordinates { element: ElementId },
}

/// Failure of the inverse geometric map of a single element.
///
/// These never abort a query: the element is treated as a non-match and the error is
/// reported alongside the result.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("element {element} is degenerate (relative jacobian determinant {determinant:e})")]
    Degenerate {
        element: ElementId,
        determinant: f64,
    },

    #[error("inverse map of element {element} diverged after {iterations} Newton iterations")]
    Diverged {
        element: ElementId,
        iterations: usize,
    },

    #[error(
        "inverse map of element {element} did not converge in {iterations} Newton iterations \
         (last update {update:e})"
    )]
    NotConverged {
        element: ElementId,
        iterations: usize,
        update: f64,
    },
}

impl GeometryError {
    /// The element whose inverse map failed.
    pub fn element(&self) -> ElementId {
        match *self {
            Self::Degenerate { element, .. }
            | Self::Diverged { element, .. }
            | Self::NotConverged { element, .. } => element,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_error_converts_into_locator_error() {
        let err: LocatorError = ConfigurationError::MeshMismatch.into();

        assert!(matches!(
            err,
            LocatorError::Configuration(ConfigurationError::MeshMismatch)
        ));
        assert!(err.to_string().contains("same mesh"));
    }

    #[test]
    fn geometry_error_reports_its_element() {
        let err = GeometryError::Diverged {
            element: ElementId(7),
            iterations: 3,
        };

        assert_eq!(err.element(), ElementId(7));
        assert!(err.to_string().contains("element 7"));
    }
}
