//! Runners executing actual application logic.

use derive_more::{Constructor, Deref};
pub use futures::future::{BoxFuture, FutureExt};
#[cfg(test)]
use mockall::automock;
use unitwire_di::instance::{sync_constructor, Arguments, ConstructorPtr};
pub use unitwire_di::instance::ErrorPtr;

pub type ApplicationRunnerPtr = dyn ApplicationRunner + Send + Sync;

/// Runs application logic. Runners are units registered in the
/// [DependencyManager](unitwire_di::resolver::DependencyManager) and run by the
/// [Application](crate::application::Application).
#[cfg_attr(test, automock)]
pub trait ApplicationRunner {
    /// Runs any application code.
    fn run(&self) -> BoxFuture<'_, Result<(), ErrorPtr>>;

    /// Returns the priority for this runner. Higher priorities get run first. Default 0.
    fn priority(&self) -> i8 {
        0
    }
}

/// Instance of a runner unit. Units are type-erased, so runners need to be stored behind a sized
/// wrapper to be retrieved as [ApplicationRunnerPtr].
#[derive(Constructor, Deref)]
pub struct RunnerUnit(Box<ApplicationRunnerPtr>);

/// Wraps a runner constructor, so the created runner can be registered as a class unit.
pub fn runner_constructor<R, F>(constructor: F) -> ConstructorPtr
where
    R: ApplicationRunner + Send + Sync + 'static,
    F: Fn(Arguments) -> Result<R, ErrorPtr> + Send + Sync + 'static,
{
    sync_constructor(move |arguments| {
        constructor(arguments).map(|runner| RunnerUnit::new(Box::new(runner)))
    })
}
