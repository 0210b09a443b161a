//! Type-erased instance pointers and the functions producing them. Units are resolved to
//! [UnitInstanceAnyPtr]s, which are handed to constructors and factories as [Arguments] in
//! dependency declaration order.

use crate::error::ResolutionError;
pub use futures::future::{BoxFuture, FutureExt};
use std::any::{type_name, Any};
use std::error::Error;
use std::future::Future;
use std::sync::Arc;

pub type UnitInstancePtr<T> = Arc<T>;

pub type UnitInstanceAnyPtr = UnitInstancePtr<dyn Any + Send + Sync + 'static>;

/// Type-erased error returned by user-supplied constructors and factories.
pub type ErrorPtr = Arc<dyn Error + Send + Sync + 'static>;

/// Creates an instance of a class-based unit from its resolved dependencies.
pub type ConstructorPtr = Arc<
    dyn Fn(Arguments) -> BoxFuture<'static, Result<UnitInstanceAnyPtr, ErrorPtr>> + Send + Sync,
>;

/// Creates an instance of a factory-based unit. The first parameter is the resolved instance of
/// the factory context, if one was configured.
pub type FactoryPtr = Arc<
    dyn Fn(
            Option<UnitInstanceAnyPtr>,
            Arguments,
        ) -> BoxFuture<'static, Result<UnitInstanceAnyPtr, ErrorPtr>>
        + Send
        + Sync,
>;

impl From<ResolutionError> for ErrorPtr {
    fn from(error: ResolutionError) -> Self {
        Arc::new(error)
    }
}

/// Resolved dependency values passed to a constructor or factory, in the order the dependencies
/// were declared.
#[derive(Clone, Debug)]
pub struct Arguments {
    unit: String,
    values: Vec<UnitInstanceAnyPtr>,
}

impl Arguments {
    pub(crate) fn new(unit: String, values: Vec<UnitInstanceAnyPtr>) -> Self {
        Self { unit, values }
    }

    /// Name of the unit being instantiated.
    #[inline]
    pub fn unit_name(&self) -> &str {
        &self.unit
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the type-erased value at the given position.
    #[inline]
    pub fn get_any(&self, index: usize) -> Option<&UnitInstanceAnyPtr> {
        self.values.get(index)
    }

    /// Returns the value at the given position, downcast to `T`.
    pub fn get<T: Any + Send + Sync>(
        &self,
        index: usize,
    ) -> Result<UnitInstancePtr<T>, ResolutionError> {
        let value = self
            .values
            .get(index)
            .cloned()
            .ok_or_else(|| ResolutionError::MissingArgument {
                name: self.unit.clone(),
                index,
            })?;

        value
            .downcast::<T>()
            .map_err(|_| ResolutionError::IncompatibleArgument {
                name: self.unit.clone(),
                index,
                expected: type_name::<T>(),
            })
    }

    pub fn into_vec(self) -> Vec<UnitInstanceAnyPtr> {
        self.values
    }
}

/// Wraps an async constructor returning a concrete type.
pub fn constructor<T, F, Fut>(constructor: F) -> ConstructorPtr
where
    T: Any + Send + Sync,
    F: Fn(Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
{
    Arc::new(move |arguments| {
        constructor(arguments)
            .map(|result| result.map(|instance| Arc::new(instance) as UnitInstanceAnyPtr))
            .boxed()
    })
}

/// Wraps a synchronous constructor returning a concrete type.
pub fn sync_constructor<T, F>(constructor: F) -> ConstructorPtr
where
    T: Any + Send + Sync,
    F: Fn(Arguments) -> Result<T, ErrorPtr> + Send + Sync + 'static,
{
    Arc::new(move |arguments| {
        let result =
            constructor(arguments).map(|instance| Arc::new(instance) as UnitInstanceAnyPtr);
        async move { result }.boxed()
    })
}

/// Wraps an async factory function returning a concrete type.
pub fn factory<T, F, Fut>(factory: F) -> FactoryPtr
where
    T: Any + Send + Sync,
    F: Fn(Option<UnitInstanceAnyPtr>, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, ErrorPtr>> + Send + 'static,
{
    Arc::new(move |context, arguments| {
        factory(context, arguments)
            .map(|result| result.map(|instance| Arc::new(instance) as UnitInstanceAnyPtr))
            .boxed()
    })
}

/// Wraps a synchronous factory function returning a concrete type.
pub fn sync_factory<T, F>(factory: F) -> FactoryPtr
where
    T: Any + Send + Sync,
    F: Fn(Option<UnitInstanceAnyPtr>, Arguments) -> Result<T, ErrorPtr> + Send + Sync + 'static,
{
    Arc::new(move |context, arguments| {
        let result =
            factory(context, arguments).map(|instance| Arc::new(instance) as UnitInstanceAnyPtr);
        async move { result }.boxed()
    })
}
