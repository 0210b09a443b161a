//! Dependency injection engine based on named units. A [Unit](unit::Unit) is a node in the
//! dependency graph, which is either a static value, an instance created by a constructor, or an
//! instance produced by a factory function. Units are registered in a
//! [DependencyManager](resolver::DependencyManager) together with names of their dependencies, and
//! resolved lazily on request - each unit is instantiated at most once and shared afterwards.
//!
//! ```
//! use unitwire_di::instance::sync_constructor;
//! use unitwire_di::resolver::{DependencyManagerBuilder, TypedUnitResolver};
//! use unitwire_di::unit_registry::InjectableInfo;
//!
//! struct Greeter {
//!     greeting: String,
//! }
//!
//! # futures::executor::block_on(async {
//! let manager = DependencyManagerBuilder::new().build();
//! manager.register_value("greeting", "hi".to_string());
//! manager.injectable(
//!     InjectableInfo::new::<Greeter>(sync_constructor(|arguments| {
//!         Ok(Greeter {
//!             greeting: arguments.get::<String>(0)?.to_string(),
//!         })
//!     }))
//!     .with_dependency("greeting"),
//! );
//!
//! let greeter = manager.resolve_typed::<Greeter>("greeter").await.unwrap();
//! assert_eq!(greeter.greeting, "hi");
//! # });
//! ```

pub mod error;
pub mod identity;
pub mod instance;
pub mod object_factory;
pub mod resolver;
pub mod unit;
pub mod unit_registry;

pub use error::ResolutionError;
pub use identity::Identity;
