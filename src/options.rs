use std::fmt::Display;
use std::str::FromStr;

use crate::containment::DEFAULT_TOLERANCE;
use crate::error::ConfigurationError;

/// Default maximum number of elements in a leaf of the tree.
pub const DEFAULT_LEAF_SIZE: usize = 20;

/// Default maximum depth of the tree.
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// The point location algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// A bounding volume hierarchy, with logarithmic queries.
    #[default]
    Tree,
    /// An exhaustive scan of the elements, without any preprocessing.
    List,
}

impl FromStr for Strategy {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tree" => Ok(Self::Tree),
            "list" => Ok(Self::List),
            _ => Err(ConfigurationError::UnknownStrategy(s.to_owned())),
        }
    }
}

impl Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tree => write!(f, "tree"),
            Self::List => write!(f, "list"),
        }
    }
}

/// Options of a [`Locator`](crate::Locator).
///
/// ```
/// use meshloc::{LocatorOptions, Strategy};
///
/// let options = LocatorOptions::default()
///     .with_strategy(Strategy::List)
///     .with_tolerance(1e-8)
///     .with_cache(false);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocatorOptions {
    pub strategy: Strategy,
    /// Maximum number of elements in a leaf of the tree.
    pub leaf_size: usize,
    /// Maximum depth of the tree, which bounds the recursion on clustered geometry.
    pub max_depth: usize,
    /// Relative slack of the containment and bounding box tests.
    pub tolerance: f64,
    /// Try the previously located element and its neighbors before a full search.
    pub enable_cache: bool,
}

impl Default for LocatorOptions {
    fn default() -> Self {
        Self {
            strategy: Strategy::Tree,
            leaf_size: DEFAULT_LEAF_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
            tolerance: DEFAULT_TOLERANCE,
            enable_cache: true,
        }
    }
}

impl LocatorOptions {
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: usize) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_cache(mut self, enable_cache: bool) -> Self {
        self.enable_cache = enable_cache;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.leaf_size == 0 {
            return Err(ConfigurationError::InvalidLeafSize);
        }
        if self.max_depth == 0 {
            return Err(ConfigurationError::InvalidMaxDepth);
        }
        if !self.tolerance.is_finite() || self.tolerance < 0. {
            return Err(ConfigurationError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("tree", Strategy::Tree)]
    #[case("TREE", Strategy::Tree)]
    #[case(" list ", Strategy::List)]
    fn parse_strategy(#[case] tag: &str, #[case] expected: Strategy) {
        assert_eq!(tag.parse::<Strategy>(), Ok(expected));
        assert_eq!(expected.to_string().parse::<Strategy>(), Ok(expected));
    }

    #[test]
    fn unknown_strategy_is_a_configuration_error() {
        assert_eq!(
            "octree".parse::<Strategy>(),
            Err(ConfigurationError::UnknownStrategy("octree".to_owned()))
        );
    }

    #[rstest]
    #[case(LocatorOptions::default().with_leaf_size(0), ConfigurationError::InvalidLeafSize)]
    #[case(LocatorOptions::default().with_max_depth(0), ConfigurationError::InvalidMaxDepth)]
    #[case(LocatorOptions::default().with_tolerance(-1.), ConfigurationError::InvalidTolerance(-1.))]
    fn invalid_options(#[case] options: LocatorOptions, #[case] expected: ConfigurationError) {
        assert_eq!(options.validate(), Err(expected));
    }

    #[test]
    fn nan_tolerance_is_rejected() {
        assert!(LocatorOptions::default()
            .with_tolerance(f64::NAN)
            .validate()
            .is_err());
    }
}
