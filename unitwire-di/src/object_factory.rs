//! Class-based units are instantiated through an [ObjectFactory], which makes it possible to
//! customize instantiation, e.g. to wrap or instrument created instances. The default
//! [DirectObjectFactory] simply calls the registered constructor.
//!
//! Factory-based units call their factory function directly and don't use the object factory.

use crate::instance::{Arguments, BoxFuture, ConstructorPtr, ErrorPtr, UnitInstanceAnyPtr};
#[cfg(test)]
use mockall::automock;

pub type ObjectFactoryPtr = Box<dyn ObjectFactory + Send + Sync>;

/// Creates instances of class-based units.
#[cfg_attr(test, automock)]
pub trait ObjectFactory {
    /// Creates a new instance of the unit with given name, passing resolved dependencies to the
    /// constructor.
    fn create_instance(
        &self,
        name: &str,
        constructor: &ConstructorPtr,
        arguments: Arguments,
    ) -> BoxFuture<'static, Result<UnitInstanceAnyPtr, ErrorPtr>>;
}

#[derive(Default, Copy, Clone, Eq, PartialEq, Debug)]
pub struct DirectObjectFactory;

impl ObjectFactory for DirectObjectFactory {
    #[inline]
    fn create_instance(
        &self,
        _name: &str,
        constructor: &ConstructorPtr,
        arguments: Arguments,
    ) -> BoxFuture<'static, Result<UnitInstanceAnyPtr, ErrorPtr>> {
        constructor(arguments)
    }
}

#[cfg(test)]
mod tests {
    use crate::instance::{sync_constructor, Arguments, UnitInstanceAnyPtr, UnitInstancePtr};
    use crate::object_factory::{DirectObjectFactory, ObjectFactory};

    #[tokio::test]
    async fn should_call_constructor() {
        let constructor = sync_constructor(|arguments| {
            let value = arguments.get::<u8>(0)?;
            Ok(*value * 2)
        });

        let instance = DirectObjectFactory
            .create_instance(
                "unit",
                &constructor,
                Arguments::new(
                    "unit".to_string(),
                    vec![UnitInstancePtr::new(4_u8) as UnitInstanceAnyPtr],
                ),
            )
            .await
            .unwrap();

        assert_eq!(*instance.downcast::<u8>().unwrap(), 8);
    }
}
