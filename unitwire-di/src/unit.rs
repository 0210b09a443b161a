//! A [Unit] is a single node in the dependency graph. Units are created the first time their name
//! is referenced, either by registration or by being declared as a dependency of another unit. The
//! latter case creates a placeholder ([UnitKind::Pending]), which is later filled in by its own
//! registration, so units can depend on each other regardless of registration order.

use crate::instance::{ConstructorPtr, FactoryPtr, UnitInstanceAnyPtr};
use derivative::Derivative;
use std::sync::Arc;
use tokio::sync::OnceCell;

/// Shared cell holding the singleton instance of a unit. Concurrent resolutions await the same
/// cell, so the instance is created at most once.
pub(crate) type InstanceCell = Arc<OnceCell<UnitInstanceAnyPtr>>;

/// The way a unit produces its instance.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub enum UnitKind {
    /// Referenced, but not registered yet.
    Pending,
    /// Static value, resolved from the moment of registration.
    Value,
    /// Instance created by a constructor, with dependencies as arguments.
    Class {
        #[derivative(Debug = "ignore")]
        constructor: ConstructorPtr,
    },
    /// Instance created by a factory function, optionally bound to the instance of the context
    /// unit.
    Factory {
        #[derivative(Debug = "ignore")]
        factory: FactoryPtr,
        context: Option<String>,
    },
    /// Shares the instance of the target unit.
    Alias { target: String },
}

/// Edge to a declared dependency.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum DependencyEdge {
    /// Dependency on the unit with the given canonical name.
    Unit(String),
    /// Dependency declared with a reference, for which no name can be determined. Fails resolution
    /// of the declaring unit.
    Invalid(String),
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct Unit {
    name: String,
    kind: UnitKind,
    dependencies: Vec<DependencyEdge>,
    #[derivative(Debug = "ignore")]
    instance: InstanceCell,
}

impl Unit {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            kind: UnitKind::Pending,
            dependencies: Vec::new(),
            instance: Default::default(),
        }
    }

    /// Canonical instance name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> &UnitKind {
        &self.kind
    }

    /// Declared dependencies, in declaration order.
    #[inline]
    pub fn dependencies(&self) -> &[DependencyEdge] {
        &self.dependencies
    }

    #[inline]
    pub fn is_registered(&self) -> bool {
        !matches!(self.kind, UnitKind::Pending)
    }

    #[inline]
    pub fn is_resolved(&self) -> bool {
        self.instance.initialized()
    }

    /// Name of the unit this unit is an alias of.
    pub fn alias_target(&self) -> Option<&str> {
        match &self.kind {
            UnitKind::Alias { target } => Some(target),
            _ => None,
        }
    }

    /// Returns the instance, if already resolved.
    pub fn instance(&self) -> Option<UnitInstanceAnyPtr> {
        self.instance.get().cloned()
    }

    #[inline]
    pub(crate) fn instance_cell(&self) -> InstanceCell {
        self.instance.clone()
    }

    #[inline]
    pub(crate) fn set_kind(&mut self, kind: UnitKind) {
        self.kind = kind;
    }

    pub(crate) fn set_value(&mut self, value: UnitInstanceAnyPtr) {
        self.kind = UnitKind::Value;
        self.instance = Arc::new(OnceCell::new_with(Some(value)));
    }

    /// Adds a dependency edge, unless already present.
    pub(crate) fn add_dependency(&mut self, dependency: DependencyEdge) {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }
}
