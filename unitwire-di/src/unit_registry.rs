//! Functionality related to registering [Unit]s. Registration only describes how to create an
//! instance and what it depends on - nothing gets resolved until the unit is requested from a
//! [DependencyManager](crate::resolver::DependencyManager).
//!
//! There are three kinds of registrations:
//!
//! * values - ready instances, which need no resolution
//! * classes - instances created by a [constructor](crate::instance::constructor) taking resolved
//! dependencies as arguments; optionally registered as an alias of another unit, thus sharing its
//! instance
//! * factories - instances created by a [factory](crate::instance::factory) function, optionally
//! executed in the context of an instance of another unit
//!
//! Declared metadata for classes and factories can be described by [InjectableInfo] and
//! [FactoryInfo].

use crate::error::ResolutionError;
use crate::identity::{instance_name, Identity};
use crate::instance::{
    factory, Arguments, ConstructorPtr, ErrorPtr, FactoryPtr, UnitInstanceAnyPtr,
};
use crate::unit::{DependencyEdge, Unit, UnitKind};
use derivative::Derivative;
use fxhash::{FxHashMap, FxHashSet};
use itertools::Itertools;
use std::any::Any;
use std::future::Future;
use tracing::{debug, warn};

/// Declared metadata of a class-based unit.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct InjectableInfo {
    /// Explicit name; when missing, the name is derived from the class reference.
    pub name: Option<Identity>,
    pub class: Identity,
    #[derivative(Debug = "ignore")]
    pub constructor: ConstructorPtr,
    pub dependencies: Vec<Identity>,
    /// Unit whose instance should be shared with this one.
    pub alias_of: Option<Identity>,
}

impl InjectableInfo {
    /// Creates metadata for class `T` without any dependencies.
    pub fn new<T: ?Sized + 'static>(constructor: ConstructorPtr) -> Self {
        Self {
            name: None,
            class: Identity::of::<T>(),
            constructor,
            dependencies: Vec::new(),
            alias_of: None,
        }
    }

    /// Sets an explicit name, instead of the one derived from the reference.
    pub fn with_name<I: Into<Identity>>(mut self, name: I) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a dependency, passed as the next argument.
    pub fn with_dependency<I: Into<Identity>>(mut self, dependency: I) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds dependencies, in iteration order.
    pub fn with_dependencies<I: Into<Identity>, D: IntoIterator<Item = I>>(
        mut self,
        dependencies: D,
    ) -> Self {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Makes the unit share the instance of given unit.
    pub fn with_alias_of<I: Into<Identity>>(mut self, alias_of: I) -> Self {
        self.alias_of = Some(alias_of.into());
        self
    }

    /// Identity under which the unit will be registered.
    pub fn identity(&self) -> &Identity {
        self.name.as_ref().unwrap_or(&self.class)
    }
}

/// Declared metadata of a factory-based unit.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct FactoryInfo {
    /// Explicit name; when missing, the name is derived from the factory function reference.
    pub name: Option<Identity>,
    pub function: Identity,
    #[derivative(Debug = "ignore")]
    pub factory: FactoryPtr,
    pub dependencies: Vec<Identity>,
    /// Unit whose instance is passed as the context of the factory call.
    pub context: Option<Identity>,
}

impl FactoryInfo {
    /// Creates metadata for a factory registered under given identity.
    pub fn new<I: Into<Identity>>(function: I, factory: FactoryPtr) -> Self {
        Self {
            name: None,
            function: function.into(),
            factory,
            dependencies: Vec::new(),
            context: None,
        }
    }

    /// Creates metadata for an async factory function, deriving the name from the function
    /// itself.
    pub fn from_fn<T, F, Fut>(function: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(Option<UnitInstanceAnyPtr>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
    {
        let identity = Identity::of_val(&function);
        Self::new(identity, factory(function))
    }

    /// Sets an explicit name, instead of the one derived from the reference.
    pub fn with_name<I: Into<Identity>>(mut self, name: I) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a dependency, passed as the next argument.
    pub fn with_dependency<I: Into<Identity>>(mut self, dependency: I) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Adds dependencies, in iteration order.
    pub fn with_dependencies<I: Into<Identity>, D: IntoIterator<Item = I>>(
        mut self,
        dependencies: D,
    ) -> Self {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    /// Sets the unit whose instance is passed as the factory context.
    pub fn with_context<I: Into<Identity>>(mut self, context: I) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Identity under which the unit will be registered.
    pub fn identity(&self) -> &Identity {
        self.name.as_ref().unwrap_or(&self.function)
    }
}

/// Store of all [Unit]s, keyed by canonical instance name.
#[derive(Clone, Debug, Default)]
pub struct UnitRegistry {
    units: FxHashMap<String, Unit>,
    // dependency name -> units declaring it
    referenced_by: FxHashMap<String, FxHashSet<String>>,
    rejected: Vec<ResolutionError>,
}

impl UnitRegistry {
    /// Returns an existing unit for given name or creates a new, pending one.
    pub fn get_or_create(&mut self, name: &str) -> &mut Unit {
        let name = instance_name(name);
        self.units
            .entry(name)
            .or_insert_with_key(|name| Unit::new(name.clone()))
    }

    /// Returns a unit for given name, if it has ever been referenced.
    pub fn unit(&self, name: &str) -> Option<&Unit> {
        self.units.get(&instance_name(name))
    }

    /// Returns a unit for given identity, if it has ever been referenced.
    pub fn unit_by_identity(&self, identity: &Identity) -> Result<Option<&Unit>, ResolutionError> {
        identity
            .instance_name()
            .map(|name| self.units.get(&name))
    }

    /// Follows alias references starting at given unit and returns the unit owning the instance.
    pub fn follow_aliases<'a>(&'a self, unit: &'a Unit) -> Result<&'a Unit, ResolutionError> {
        let mut unit = unit;
        let mut visited = FxHashSet::default();

        while let Some(target) = unit.alias_target() {
            if !visited.insert(unit.name()) {
                return Err(ResolutionError::CircularDependency {
                    referenced_by: unit.name().to_string(),
                    dependency: target.to_string(),
                });
            }

            unit = self
                .units
                .get(target)
                .ok_or_else(|| ResolutionError::UnitNotFound(target.to_string()))?;
        }

        Ok(unit)
    }

    /// Returns names of all known units, registered or not.
    pub fn unit_names(&self) -> Vec<String> {
        self.units.keys().cloned().sorted().collect()
    }

    /// Returns sorted names of units declaring given dependency.
    pub fn referenced_by(&self, dependency: &str) -> Vec<String> {
        self.referenced_by
            .get(dependency)
            .map(|references| references.iter().cloned().sorted().collect())
            .unwrap_or_default()
    }

    /// Returns errors of registrations which were dropped because their target name could not be
    /// determined.
    pub fn rejected_registrations(&self) -> &[ResolutionError] {
        &self.rejected
    }

    /// Registers a ready value under given name.
    pub fn register_value(&mut self, name: &Identity, value: UnitInstanceAnyPtr) {
        let Some(name) = self.target_name(name) else {
            return;
        };

        debug!("Registering value {}.", name);

        let unit = self.get_or_create(&name);
        if unit.is_resolved() {
            warn!("Replacing already resolved instance of {}.", name);
        }

        unit.set_value(value);
    }

    /// Registers a class-based unit. If `alias_of` is present, the unit will share the instance
    /// with the given unit.
    pub fn register_class(
        &mut self,
        name: &Identity,
        constructor: ConstructorPtr,
        dependencies: &[Identity],
        alias_of: Option<&Identity>,
    ) {
        let Some(name) = self.target_name(name) else {
            return;
        };

        debug!("Registering class {}.", name);

        let kind = match alias_of.map(|alias_of| (alias_of, alias_of.instance_name())) {
            Some((_, Ok(target))) => {
                self.get_or_create(&target);
                self.add_unit_reference(&target, &name);
                UnitKind::Alias { target }
            }
            Some((alias_of, Err(_))) => {
                self.get_or_create(&name)
                    .add_dependency(DependencyEdge::Invalid(alias_of.to_string()));
                UnitKind::Class { constructor }
            }
            None => UnitKind::Class { constructor },
        };

        self.get_or_create(&name).set_kind(kind);
        self.register_dependencies(&name, dependencies);
    }

    /// Registers a factory-based unit. If `context` is present, the instance of the given unit is
    /// passed to the factory, which also makes the context a dependency of the factory unit.
    pub fn register_factory(
        &mut self,
        name: &Identity,
        factory: FactoryPtr,
        dependencies: &[Identity],
        context: Option<&Identity>,
    ) {
        let Some(name) = self.target_name(name) else {
            return;
        };

        debug!("Registering factory {}.", name);

        let context = match context.map(|context| (context, context.instance_name())) {
            Some((_, Ok(context))) => {
                self.get_or_create(&context);
                self.add_unit_reference(&context, &name);
                Some(context)
            }
            Some((context, Err(_))) => {
                self.get_or_create(&name)
                    .add_dependency(DependencyEdge::Invalid(context.to_string()));
                None
            }
            None => None,
        };

        self.get_or_create(&name)
            .set_kind(UnitKind::Factory { factory, context });
        self.register_dependencies(&name, dependencies);
    }

    fn target_name(&mut self, identity: &Identity) -> Option<String> {
        match identity.instance_name() {
            Ok(name) => Some(name),
            Err(error) => {
                warn!("Ignoring registration: {}", error);
                self.rejected.push(error);
                None
            }
        }
    }

    fn register_dependencies(&mut self, name: &str, dependencies: &[Identity]) {
        for dependency in dependencies {
            let edge = match dependency.instance_name() {
                Ok(dependency_name) => {
                    self.get_or_create(&dependency_name);
                    self.add_unit_reference(&dependency_name, name);
                    DependencyEdge::Unit(dependency_name)
                }
                Err(_) => DependencyEdge::Invalid(dependency.to_string()),
            };

            self.get_or_create(name).add_dependency(edge);
        }
    }

    fn add_unit_reference(&mut self, dependency: &str, unit: &str) {
        self.referenced_by
            .entry(dependency.to_string())
            .or_default()
            .insert(unit.to_string());
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ResolutionError;
    use crate::identity::Identity;
    use crate::instance::{
        sync_constructor, sync_factory, ConstructorPtr, UnitInstanceAnyPtr, UnitInstancePtr,
    };
    use crate::unit::{DependencyEdge, UnitKind};
    use crate::unit_registry::{FactoryInfo, InjectableInfo, UnitRegistry};

    struct TestService;

    fn create_constructor() -> ConstructorPtr {
        sync_constructor(|_| Ok(TestService))
    }

    #[test]
    fn should_canonicalize_names() {
        let mut registry = UnitRegistry::default();
        registry.get_or_create("TestService");

        assert!(registry.unit("testService").is_some());
        assert!(registry.unit("TestService").is_some());
        assert_eq!(registry.unit_names(), vec!["testService".to_string()]);
    }

    #[test]
    fn should_not_overwrite_existing_unit() {
        let mut registry = UnitRegistry::default();
        registry.register_value(&"value".into(), UnitInstancePtr::new(1) as UnitInstanceAnyPtr);
        registry.get_or_create("value");

        assert!(registry.unit("value").unwrap().is_resolved());
    }

    #[test]
    fn should_register_value() {
        let mut registry = UnitRegistry::default();
        registry.register_value(&"Config".into(), UnitInstancePtr::new(1) as UnitInstanceAnyPtr);

        let unit = registry.unit("config").unwrap();
        assert!(unit.is_registered());
        assert!(unit.is_resolved());
    }

    #[test]
    fn should_register_class_with_pending_dependencies() {
        let mut registry = UnitRegistry::default();
        registry.register_class(
            &Identity::of::<TestService>(),
            create_constructor(),
            &["dep1".into(), "Dep2".into(), "dep1".into()],
            None,
        );

        let unit = registry.unit("testService").unwrap();
        assert!(matches!(unit.kind(), UnitKind::Class { .. }));
        assert_eq!(
            unit.dependencies(),
            &[
                DependencyEdge::Unit("dep1".to_string()),
                DependencyEdge::Unit("dep2".to_string())
            ]
        );

        let dependency = registry.unit("dep2").unwrap();
        assert!(!dependency.is_registered());
        assert_eq!(registry.referenced_by("dep2"), vec!["testService"]);
    }

    #[test]
    fn should_register_alias() {
        let mut registry = UnitRegistry::default();
        registry.register_class(
            &"parent".into(),
            create_constructor(),
            &[],
            Some(&"child".into()),
        );

        assert_eq!(registry.unit("parent").unwrap().alias_target(), Some("child"));
        assert!(!registry.unit("child").unwrap().is_registered());
    }

    #[test]
    fn should_register_factory_context_as_reference() {
        let mut registry = UnitRegistry::default();
        registry.register_factory(
            &"client".into(),
            sync_factory(|_, _| Ok(1_u8)),
            &["endpoint".into()],
            Some(&"Configuration".into()),
        );

        let unit = registry.unit("client").unwrap();
        assert!(matches!(
            unit.kind(),
            UnitKind::Factory { context: Some(context), .. } if context == "configuration"
        ));
        assert_eq!(registry.referenced_by("configuration"), vec!["client"]);
        assert_eq!(registry.referenced_by("endpoint"), vec!["client"]);
    }

    #[test]
    fn should_defer_invalid_dependency() {
        let closure = || {};

        let mut registry = UnitRegistry::default();
        registry.register_class(
            &"service".into(),
            create_constructor(),
            &[Identity::of_val(&closure)],
            None,
        );

        assert!(matches!(
            registry.unit("service").unwrap().dependencies()[0],
            DependencyEdge::Invalid(_)
        ));
    }

    #[test]
    fn should_reject_invalid_target() {
        let mut registry = UnitRegistry::default();
        registry.register_value(&"".into(), UnitInstancePtr::new(1) as UnitInstanceAnyPtr);

        assert!(registry.unit_names().is_empty());
        assert!(matches!(
            registry.rejected_registrations(),
            [ResolutionError::InvalidIdentity(_)]
        ));
    }

    #[test]
    fn should_fall_back_to_reference_identity() {
        let injectable = InjectableInfo::new::<TestService>(create_constructor());
        assert_eq!(injectable.identity(), &Identity::of::<TestService>());

        let injectable = injectable.with_name("named");
        assert_eq!(injectable.identity(), &Identity::from("named"));

        let factory = FactoryInfo::new("create", sync_factory(|_, _| Ok(1_u8)));
        assert_eq!(factory.identity(), &Identity::from("create"));
    }
}
