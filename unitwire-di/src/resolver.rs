//! Core functionality for resolving [Unit] instances.
//!
//! Resolution happens in two steps. First, the dependency graph of the requested unit is walked
//! depth-first, in declaration order, while the registry is locked. This detects circular
//! dependencies and collects all dependencies which were never registered, and produces the list
//! of units to instantiate, dependencies first. Then the lock is released and the units are
//! instantiated in that order, awaiting asynchronous constructors and factories.
//!
//! Every unit holds its instance in a shared cell, so instances are created at most once, even
//! when the same unit is being resolved by concurrent calls - latecomers wait for the instance
//! created by the first call.

use crate::error::{MissingDependency, ResolutionError};
use crate::identity::Identity;
use crate::instance::{
    Arguments, BoxFuture, ConstructorPtr, FactoryPtr, FutureExt, UnitInstanceAnyPtr,
    UnitInstancePtr,
};
use crate::object_factory::{DirectObjectFactory, ObjectFactoryPtr};
use crate::unit::{DependencyEdge, InstanceCell, Unit, UnitKind};
use crate::unit_registry::{FactoryInfo, InjectableInfo, UnitRegistry};
use derivative::Derivative;
use fxhash::FxHashSet;
use itertools::Itertools;
use parking_lot::Mutex;
use std::any::{type_name, Any};
use std::sync::{Arc, Weak};
use tracing::{debug, error, warn};

/// Name under which [DependencyManager] registers itself.
pub const DEPENDENCY_MANAGER: &str = "dependencyManager";

/// Instance type of the [DEPENDENCY_MANAGER] unit. The manager owns its units, so it can only
/// refer to itself weakly.
pub type DependencyManagerRef = Weak<DependencyManager>;

/// Generic resolver for unit instances.
pub trait UnitResolver {
    /// Returns the shared instance of the unit with given identity, resolving all its
    /// dependencies first.
    fn resolve_unit(
        &self,
        identity: Identity,
    ) -> BoxFuture<'_, Result<UnitInstanceAnyPtr, ResolutionError>>;
}

/// Helper trait for [UnitResolver] providing strongly-typed access.
pub trait TypedUnitResolver {
    /// Typesafe version of [UnitResolver::resolve_unit].
    fn resolve_typed<T: Any + Send + Sync>(
        &self,
        identity: impl Into<Identity>,
    ) -> BoxFuture<'_, Result<UnitInstancePtr<T>, ResolutionError>>;
}

impl<R: UnitResolver + Sync + ?Sized> TypedUnitResolver for R {
    fn resolve_typed<T: Any + Send + Sync>(
        &self,
        identity: impl Into<Identity>,
    ) -> BoxFuture<'_, Result<UnitInstancePtr<T>, ResolutionError>> {
        let identity = identity.into();
        async move {
            let name = identity.instance_name()?;
            self.resolve_unit(identity)
                .await?
                .downcast::<T>()
                .map_err(|_| ResolutionError::IncompatibleInstance {
                    name,
                    expected: type_name::<T>(),
                })
        }
        .boxed()
    }
}

/// Configuration of a [DependencyManager].
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DependencyManagerOptions {
    /// Name under which the manager registers itself.
    pub self_name: String,
    /// Log a warning when a factory is called without a context instance.
    pub warn_on_missing_factory_context: bool,
    #[derivative(Debug = "ignore")]
    pub object_factory: ObjectFactoryPtr,
}

impl Default for DependencyManagerOptions {
    fn default() -> Self {
        Self {
            self_name: DEPENDENCY_MANAGER.to_string(),
            warn_on_missing_factory_context: true,
            object_factory: Box::<DirectObjectFactory>::default(),
        }
    }
}

/// Builder for [DependencyManager] with sensible defaults, for easy construction.
#[derive(Debug, Default)]
pub struct DependencyManagerBuilder {
    options: DependencyManagerOptions,
}

impl DependencyManagerBuilder {
    /// Creates a new builder with a default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the name under which the manager registers itself.
    pub fn with_self_name<T: ToString>(mut self, self_name: T) -> Self {
        self.options.self_name = self_name.to_string();
        self
    }

    /// Enables or disables the warning logged when a factory is called without a context.
    pub fn with_warn_on_missing_factory_context(mut self, warn: bool) -> Self {
        self.options.warn_on_missing_factory_context = warn;
        self
    }

    /// Sets new [ObjectFactory](crate::object_factory::ObjectFactory).
    pub fn with_object_factory(mut self, object_factory: ObjectFactoryPtr) -> Self {
        self.options.object_factory = object_factory;
        self
    }

    /// Builds resulting [DependencyManager].
    pub fn build(self) -> Arc<DependencyManager> {
        DependencyManager::new(self.options)
    }
}

/// Registry of units, which resolves them on request. Registration never resolves anything by
/// itself - units can be registered in any order, as long as all dependencies are registered
/// before the dependent unit is resolved.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DependencyManager {
    registry: Mutex<UnitRegistry>,
    #[derivative(Debug = "ignore")]
    object_factory: ObjectFactoryPtr,
    warn_on_missing_factory_context: bool,
}

impl DependencyManager {
    /// Creates a new manager and registers it as a [DependencyManagerRef] value under the
    /// configured name.
    pub fn new(options: DependencyManagerOptions) -> Arc<Self> {
        Arc::new_cyclic(|this| {
            let mut registry = UnitRegistry::default();
            registry.register_value(
                &Identity::from(options.self_name),
                UnitInstancePtr::new(this.clone()) as UnitInstanceAnyPtr,
            );

            Self {
                registry: Mutex::new(registry),
                object_factory: options.object_factory,
                warn_on_missing_factory_context: options.warn_on_missing_factory_context,
            }
        })
    }

    /// Registers a static value, which doesn't need any resolution.
    pub fn register_value<I: Into<Identity>, T: Any + Send + Sync>(&self, name: I, value: T) {
        self.register_instance(name, UnitInstancePtr::new(value) as UnitInstanceAnyPtr);
    }

    /// Registers an already type-erased instance as a static value.
    pub fn register_instance<I: Into<Identity>>(&self, name: I, instance: UnitInstanceAnyPtr) {
        self.registry.lock().register_value(&name.into(), instance);
    }

    /// Registers a class-based unit. See [UnitRegistry::register_class].
    pub fn register_class<I: Into<Identity>>(
        &self,
        name: I,
        constructor: ConstructorPtr,
        dependencies: &[Identity],
        alias_of: Option<Identity>,
    ) {
        self.registry.lock().register_class(
            &name.into(),
            constructor,
            dependencies,
            alias_of.as_ref(),
        );
    }

    /// Registers a factory-based unit. See [UnitRegistry::register_factory].
    pub fn register_factory<I: Into<Identity>>(
        &self,
        name: I,
        factory: FactoryPtr,
        dependencies: &[Identity],
        context: Option<Identity>,
    ) {
        self.registry.lock().register_factory(
            &name.into(),
            factory,
            dependencies,
            context.as_ref(),
        );
    }

    /// Registers a class-based unit described by declared metadata.
    pub fn injectable(&self, injectable: InjectableInfo) {
        self.registry.lock().register_class(
            injectable.identity(),
            injectable.constructor.clone(),
            &injectable.dependencies,
            injectable.alias_of.as_ref(),
        );
    }

    /// Registers a factory-based unit described by declared metadata.
    pub fn factory(&self, factory: FactoryInfo) {
        self.registry.lock().register_factory(
            factory.identity(),
            factory.factory.clone(),
            &factory.dependencies,
            factory.context.as_ref(),
        );
    }

    /// Checks if a unit with given identity has been registered.
    pub fn is_registered<I: Into<Identity>>(&self, identity: I) -> bool {
        let registry = self.registry.lock();
        matches!(
            registry.unit_by_identity(&identity.into()),
            Ok(Some(unit)) if unit.is_registered()
        )
    }

    /// Checks if a unit with given identity already has its instance.
    pub fn is_resolved<I: Into<Identity>>(&self, identity: I) -> bool {
        let registry = self.registry.lock();
        match registry.unit_by_identity(&identity.into()) {
            Ok(Some(unit)) => registry
                .follow_aliases(unit)
                .map(|unit| unit.is_resolved())
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Returns names of all known units, including ones which are only referenced as dependencies.
    pub fn unit_names(&self) -> Vec<String> {
        self.registry.lock().unit_names()
    }

    /// Returns errors of registrations which were ignored because of an invalid target identity.
    pub fn rejected_registrations(&self) -> Vec<ResolutionError> {
        self.registry.lock().rejected_registrations().to_vec()
    }

    /// Returns the shared instance of the unit with given identity, resolving and instantiating
    /// all its dependencies first.
    pub async fn resolve<I: Into<Identity>>(
        &self,
        identity: I,
    ) -> Result<UnitInstanceAnyPtr, ResolutionError> {
        let identity = identity.into();
        let plan = {
            let registry = self.registry.lock();
            ResolutionPlanner::new(&registry).plan(&identity)?
        };

        self.execute(plan).await
    }

    async fn execute(&self, plan: ResolutionPlan) -> Result<UnitInstanceAnyPtr, ResolutionError> {
        for step in &plan.steps {
            step.instance
                .get_or_try_init(|| self.instantiate(step))
                .await?;
        }

        plan.target
            .get()
            .cloned()
            .ok_or(ResolutionError::UnitNotFound(plan.name))
    }

    async fn instantiate(
        &self,
        step: &PlannedInstantiation,
    ) -> Result<UnitInstanceAnyPtr, ResolutionError> {
        let values = step
            .dependencies
            .iter()
            .map(|(name, instance)| step.dependency_instance(name, instance))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Instantiating {}.", step.name);

        let arguments = Arguments::new(step.name.clone(), values);
        let instance = match &step.instantiation {
            Instantiation::Class(constructor) => {
                self.object_factory
                    .create_instance(&step.name, constructor, arguments)
                    .await
            }
            Instantiation::Factory { factory, context } => {
                let context = match context {
                    Some((name, instance)) => Some(step.dependency_instance(name, instance)?),
                    None => {
                        if self.warn_on_missing_factory_context {
                            warn!(
                                "No context defined for factory {}. The factory will be called without a context instance.",
                                step.name
                            );
                        }

                        None
                    }
                };

                factory(context, arguments).await
            }
        };

        instance.map_err(|error| ResolutionError::InstantiationFailed {
            name: step.name.clone(),
            error,
        })
    }
}

impl UnitResolver for DependencyManager {
    #[inline]
    fn resolve_unit(
        &self,
        identity: Identity,
    ) -> BoxFuture<'_, Result<UnitInstanceAnyPtr, ResolutionError>> {
        self.resolve(identity).boxed()
    }
}

enum Instantiation {
    Class(ConstructorPtr),
    Factory {
        factory: FactoryPtr,
        context: Option<(String, InstanceCell)>,
    },
}

struct PlannedInstantiation {
    name: String,
    instance: InstanceCell,
    instantiation: Instantiation,
    dependencies: Vec<(String, InstanceCell)>,
}

impl PlannedInstantiation {
    fn dependency_instance(
        &self,
        name: &str,
        instance: &InstanceCell,
    ) -> Result<UnitInstanceAnyPtr, ResolutionError> {
        instance
            .get()
            .cloned()
            .ok_or_else(|| ResolutionError::UnresolvedDependency {
                unit: self.name.clone(),
                missing: vec![MissingDependency {
                    name: name.to_string(),
                    referenced_by: vec![self.name.clone()],
                }],
            })
    }
}

struct ResolutionPlan {
    name: String,
    target: InstanceCell,
    // dependencies come before their dependents
    steps: Vec<PlannedInstantiation>,
}

#[derive(Clone, Copy)]
enum PlanEdge<'a> {
    Context(&'a str),
    Dependency(&'a str),
    Invalid(&'a str),
}

enum DependencyLookup<'a> {
    Ready(&'a Unit),
    Unresolvable,
    Pending(&'a Unit),
}

// unit being planned, with its edges visited so far
struct PlanFrame<'a> {
    unit: &'a Unit,
    edges: Vec<PlanEdge<'a>>,
    next: usize,
    current: Option<PlanEdge<'a>>,
    resolved: bool,
    context: Option<&'a Unit>,
    dependencies: Vec<&'a Unit>,
}

impl<'a> PlanFrame<'a> {
    fn new(unit: &'a Unit) -> Self {
        let context = match unit.kind() {
            UnitKind::Factory {
                context: Some(name),
                ..
            } => Some(PlanEdge::Context(name.as_str())),
            _ => None,
        };

        let edges = context
            .into_iter()
            .chain(unit.dependencies().iter().map(|edge| match edge {
                DependencyEdge::Unit(name) => PlanEdge::Dependency(name.as_str()),
                DependencyEdge::Invalid(reference) => PlanEdge::Invalid(reference.as_str()),
            }))
            .collect();

        Self {
            unit,
            edges,
            next: 0,
            current: None,
            resolved: true,
            context: None,
            dependencies: Vec::new(),
        }
    }

    fn next_edge(&mut self) -> Option<PlanEdge<'a>> {
        self.current = self.edges.get(self.next).copied();
        if self.current.is_some() {
            self.next += 1;
        }

        self.current
    }

    // binds the dependency to the edge returned last by next_edge
    fn accept(&mut self, dependency: &'a Unit) {
        match self.current {
            Some(PlanEdge::Context(_)) => self.context = Some(dependency),
            _ => self.dependencies.push(dependency),
        }
    }
}

struct ResolutionPlanner<'a> {
    registry: &'a UnitRegistry,
    unresolved: FxHashSet<&'a str>,
    planned: FxHashSet<&'a str>,
    failed: FxHashSet<&'a str>,
    not_registered: Vec<&'a str>,
    steps: Vec<PlannedInstantiation>,
}

impl<'a> ResolutionPlanner<'a> {
    fn new(registry: &'a UnitRegistry) -> Self {
        Self {
            registry,
            unresolved: Default::default(),
            planned: Default::default(),
            failed: Default::default(),
            not_registered: Default::default(),
            steps: Default::default(),
        }
    }

    fn plan(mut self, identity: &Identity) -> Result<ResolutionPlan, ResolutionError> {
        let registry = self.registry;
        let requested = identity.instance_name()?;
        let unit = registry
            .unit(&requested)
            .ok_or_else(|| ResolutionError::UnitNotFound(requested.clone()))?;
        let unit = registry.follow_aliases(unit)?;

        if unit.is_registered() {
            self.resolve_unit(unit)?;
        } else {
            self.add_not_registered(unit.name());
        }

        if !self.not_registered.is_empty() {
            let missing = self
                .not_registered
                .iter()
                .map(|name| MissingDependency {
                    name: name.to_string(),
                    referenced_by: registry.referenced_by(name),
                })
                .collect_vec();

            for dependency in &missing {
                error!(
                    "The dependency {} declared in [{}] could not be found. Make sure it's registered.",
                    dependency.name,
                    dependency.referenced_by.iter().join(", ")
                );
            }

            return Err(ResolutionError::UnresolvedDependency {
                unit: requested,
                missing,
            });
        }

        Ok(ResolutionPlan {
            name: requested,
            target: unit.instance_cell(),
            steps: self.steps,
        })
    }

    // walks the graph with an explicit stack, so deep chains don't exhaust the thread stack
    fn resolve_unit(&mut self, root: &'a Unit) -> Result<bool, ResolutionError> {
        if root.is_resolved() || self.planned.contains(root.name()) {
            return Ok(true);
        }

        if self.failed.contains(root.name()) {
            return Ok(false);
        }

        self.unresolved.insert(root.name());
        let mut stack = vec![PlanFrame::new(root)];

        while let Some(frame) = stack.last_mut() {
            let Some(edge) = frame.next_edge() else {
                let Some(frame) = stack.pop() else {
                    break;
                };

                let unit = frame.unit;
                let resolved = self.finish(frame);

                match stack.last_mut() {
                    Some(parent) if resolved => parent.accept(unit),
                    Some(parent) => parent.resolved = false,
                    None => return Ok(resolved),
                }

                continue;
            };

            let name = match edge {
                PlanEdge::Context(name) | PlanEdge::Dependency(name) => name,
                PlanEdge::Invalid(reference) => {
                    return Err(ResolutionError::InvalidIdentity(reference.to_string()))
                }
            };

            match self.lookup_dependency(frame.unit, name)? {
                DependencyLookup::Ready(dependency) => frame.accept(dependency),
                // continue to collect all the broken dependencies
                DependencyLookup::Unresolvable => frame.resolved = false,
                DependencyLookup::Pending(dependency) => {
                    self.unresolved.insert(dependency.name());
                    stack.push(PlanFrame::new(dependency));
                }
            }
        }

        Ok(false)
    }

    fn finish(&mut self, frame: PlanFrame<'a>) -> bool {
        let unit = frame.unit;
        self.unresolved.remove(unit.name());

        if !frame.resolved {
            self.failed.insert(unit.name());
            return false;
        }

        let instantiation = match unit.kind() {
            UnitKind::Class { constructor } => Instantiation::Class(constructor.clone()),
            UnitKind::Factory { factory, .. } => Instantiation::Factory {
                factory: factory.clone(),
                context: frame
                    .context
                    .map(|context| (context.name().to_string(), context.instance_cell())),
            },
            UnitKind::Pending => {
                self.add_not_registered(unit.name());
                return false;
            }
            // values are always resolved and aliases are followed before getting here
            UnitKind::Value | UnitKind::Alias { .. } => return true,
        };

        self.steps.push(PlannedInstantiation {
            name: unit.name().to_string(),
            instance: unit.instance_cell(),
            instantiation,
            dependencies: frame
                .dependencies
                .iter()
                .map(|dependency| (dependency.name().to_string(), dependency.instance_cell()))
                .collect(),
        });
        self.planned.insert(unit.name());

        true
    }

    fn lookup_dependency(
        &mut self,
        referenced_by: &'a Unit,
        name: &'a str,
    ) -> Result<DependencyLookup<'a>, ResolutionError> {
        let registry = self.registry;
        let Some(dependency) = registry.unit(name) else {
            self.add_not_registered(name);
            return Ok(DependencyLookup::Unresolvable);
        };

        let dependency = registry.follow_aliases(dependency)?;
        if dependency.is_resolved() || self.planned.contains(dependency.name()) {
            return Ok(DependencyLookup::Ready(dependency));
        }

        if !dependency.is_registered() {
            self.add_not_registered(dependency.name());
            return Ok(DependencyLookup::Unresolvable);
        }

        if self.unresolved.contains(dependency.name()) {
            return Err(ResolutionError::CircularDependency {
                referenced_by: referenced_by.name().to_string(),
                dependency: dependency.name().to_string(),
            });
        }

        if self.failed.contains(dependency.name()) {
            return Ok(DependencyLookup::Unresolvable);
        }

        Ok(DependencyLookup::Pending(dependency))
    }

    fn add_not_registered(&mut self, name: &'a str) {
        if !self.not_registered.contains(&name) {
            self.not_registered.push(name);
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ResolutionError;
    use crate::identity::Identity;
    use crate::instance::{
        sync_constructor, sync_factory, FutureExt, UnitInstanceAnyPtr, UnitInstancePtr,
    };
    use crate::object_factory::{MockObjectFactory, ObjectFactoryPtr};
    use crate::resolver::{
        DependencyManagerBuilder, DependencyManagerRef, TypedUnitResolver, DEPENDENCY_MANAGER,
    };
    use mockall::predicate::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn should_use_object_factory_for_classes() {
        let mut object_factory = MockObjectFactory::new();
        object_factory
            .expect_create_instance()
            .with(eq("service"), always(), always())
            .times(1)
            .returning(|_, _, _| {
                async { Ok(UnitInstancePtr::new(7_u8) as UnitInstanceAnyPtr) }.boxed()
            });

        let manager = DependencyManagerBuilder::new()
            .with_object_factory(Box::new(object_factory) as ObjectFactoryPtr)
            .build();
        manager.register_class("service", sync_constructor(|_| Ok(1_u8)), &[], None);

        let instance = manager.resolve_typed::<u8>("service").await.unwrap();
        assert_eq!(*instance, 7);

        // second resolution must not reach the object factory
        manager.resolve("service").await.unwrap();
    }

    #[tokio::test]
    async fn should_not_use_object_factory_for_factories() {
        let mut object_factory = MockObjectFactory::new();
        object_factory.expect_create_instance().never();

        let manager = DependencyManagerBuilder::new()
            .with_object_factory(Box::new(object_factory) as ObjectFactoryPtr)
            .build();
        manager.register_factory("service", sync_factory(|_, _| Ok(1_u8)), &[], None);

        assert_eq!(*manager.resolve_typed::<u8>("service").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn should_register_itself() {
        let manager = DependencyManagerBuilder::new().build();

        let this = manager
            .resolve_typed::<DependencyManagerRef>(DEPENDENCY_MANAGER)
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&this.upgrade().unwrap(), &manager));
    }

    #[tokio::test]
    async fn should_describe_registered_units() {
        let manager = DependencyManagerBuilder::new().build();
        manager.register_value("config", 1_u8);

        let description = format!("{manager:?}");
        assert!(description.contains("config"));
        assert!(description.contains(DEPENDENCY_MANAGER));
    }

    #[tokio::test]
    async fn should_register_itself_under_custom_name() {
        let manager = DependencyManagerBuilder::new()
            .with_self_name("Injector")
            .build();

        assert!(manager.is_resolved("injector"));
        assert!(!manager.is_registered(DEPENDENCY_MANAGER));
    }

    #[tokio::test]
    async fn should_report_unregistered_root() {
        let manager = DependencyManagerBuilder::new().build();
        manager.register_class(
            "service",
            sync_constructor(|_| Ok(1_u8)),
            &["dep".into()],
            None,
        );

        match manager.resolve("dep").await.unwrap_err() {
            ResolutionError::UnresolvedDependency { unit, missing } => {
                assert_eq!(unit, "dep");
                assert_eq!(missing[0].name, "dep");
                assert_eq!(missing[0].referenced_by, vec!["service".to_string()]);
            }
            error => panic!("Unexpected error: {error}"),
        }
    }

    #[tokio::test]
    async fn should_report_incompatible_instance() {
        let manager = DependencyManagerBuilder::new().build();
        manager.register_value("value", 1_u8);

        assert!(matches!(
            manager.resolve_typed::<String>("value").await.unwrap_err(),
            ResolutionError::IncompatibleInstance { .. }
        ));
    }

    #[tokio::test]
    async fn should_detect_alias_cycles() {
        let manager = DependencyManagerBuilder::new().build();
        manager.register_class(
            "a",
            sync_constructor(|_| Ok(1_u8)),
            &[],
            Some("b".into()),
        );
        manager.register_class(
            "b",
            sync_constructor(|_| Ok(1_u8)),
            &[],
            Some("a".into()),
        );

        assert!(matches!(
            manager.resolve("a").await.unwrap_err(),
            ResolutionError::CircularDependency { .. }
        ));
    }

    #[tokio::test]
    async fn should_not_report_cycle_for_failed_shared_dependency() {
        let manager = DependencyManagerBuilder::new().build();
        manager.register_class(
            "a",
            sync_constructor(|_| Ok(1_u8)),
            &["b".into(), "c".into()],
            None,
        );
        manager.register_class("b", sync_constructor(|_| Ok(1_u8)), &["x".into()], None);
        manager.register_class("c", sync_constructor(|_| Ok(1_u8)), &["b".into()], None);

        match manager.resolve(Identity::from("a")).await.unwrap_err() {
            ResolutionError::UnresolvedDependency { missing, .. } => {
                assert_eq!(missing.len(), 1);
                assert_eq!(missing[0].name, "x");
            }
            error => panic!("Unexpected error: {error}"),
        }
    }
}
