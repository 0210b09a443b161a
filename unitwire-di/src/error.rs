use crate::instance::ErrorPtr;
use itertools::Itertools;
use std::fmt::{Display, Formatter};
use thiserror::Error;

/// A dependency which exists as a unit, but was never registered.
#[derive(Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
pub struct MissingDependency {
    pub name: String,
    /// Units which declared the dependency. Only used for diagnostics, so it might be incomplete.
    pub referenced_by: Vec<String>,
}

impl Display for MissingDependency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.referenced_by.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(
                f,
                "{} (declared in: {})",
                self.name,
                self.referenced_by.iter().join(", ")
            )
        }
    }
}

/// Errors related to resolving units.
#[derive(Error, Clone, Debug)]
pub enum ResolutionError {
    #[error("Cannot find unit: {0}")]
    UnitNotFound(String),
    #[error(
        "The dependency could not be resolved: {unit}. Missing dependencies: {}",
        .missing.iter().join("; ")
    )]
    UnresolvedDependency {
        unit: String,
        missing: Vec<MissingDependency>,
    },
    #[error("Circular dependency found at {referenced_by}: {dependency}")]
    CircularDependency {
        referenced_by: String,
        dependency: String,
    },
    #[error("Cannot determine instance name for: {0}")]
    InvalidIdentity(String),
    #[error("Instance of unit '{name}' is not of type {expected}")]
    IncompatibleInstance {
        name: String,
        expected: &'static str,
    },
    #[error("Argument {index} for unit '{name}' is not of type {expected}")]
    IncompatibleArgument {
        name: String,
        index: usize,
        expected: &'static str,
    },
    #[error("Missing argument {index} for unit '{name}'")]
    MissingArgument { name: String, index: usize },
    #[error("Error instantiating unit '{name}': {error}")]
    InstantiationFailed { name: String, error: ErrorPtr },
}

impl ResolutionError {
    /// Returns true for errors caused by the structure of the dependency graph, rather than by
    /// instantiation itself.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            ResolutionError::UnitNotFound(_)
                | ResolutionError::CircularDependency { .. }
                | ResolutionError::InvalidIdentity(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::error::{MissingDependency, ResolutionError};

    #[test]
    fn should_list_missing_dependencies() {
        let error = ResolutionError::UnresolvedDependency {
            unit: "a".to_string(),
            missing: vec![
                MissingDependency {
                    name: "x".to_string(),
                    referenced_by: vec!["a".to_string(), "b".to_string()],
                },
                MissingDependency {
                    name: "y".to_string(),
                    referenced_by: vec![],
                },
            ],
        };

        assert_eq!(
            error.to_string(),
            "The dependency could not be resolved: a. Missing dependencies: x (declared in: a, b); y"
        );
        assert!(!error.is_structural());
    }
}
