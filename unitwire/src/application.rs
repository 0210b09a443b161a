//! Core application framework functionality.

use crate::config::{ApplicationConfig, APPLICATION_CONFIG};
use crate::runner::{ErrorPtr, RunnerUnit};
use itertools::Itertools;
use std::cmp::Reverse;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use unitwire_di::error::ResolutionError;
use unitwire_di::identity::Identity;
use unitwire_di::resolver::{DependencyManager, DependencyManagerBuilder, TypedUnitResolver};

#[derive(Clone, Error, Debug)]
pub enum ApplicationError {
    #[error("Error loading configuration: {0}")]
    Config(ErrorPtr),
    #[error("Error retrieving runners: {0}")]
    RunnerResolution(ResolutionError),
    #[error("Runner error: {0}")]
    RunnerError(ErrorPtr),
}

type Registration = Box<dyn FnOnce(&DependencyManager) + Send>;

/// Main entrypoint for the application. Bootstraps the [DependencyManager], registers application
/// units and runs [ApplicationRunners](crate::runner::ApplicationRunner).
pub struct Application {
    config: ApplicationConfig,
    registrations: Vec<Registration>,
    runners: Vec<Identity>,
}

impl Application {
    pub fn new(config: ApplicationConfig) -> Self {
        Self {
            config,
            registrations: Vec::new(),
            runners: Vec::new(),
        }
    }

    /// Creates the application with config loaded from the environment.
    pub fn from_environment() -> Result<Self, ApplicationError> {
        ApplicationConfig::init_from_environment()
            .map(Self::new)
            .map_err(ApplicationError::Config)
    }

    /// Adds a callback registering units in the [DependencyManager]. Callbacks are called in the
    /// order of addition, when the application is run.
    pub fn with_registration<F>(mut self, registration: F) -> Self
    where
        F: FnOnce(&DependencyManager) + Send + 'static,
    {
        self.registrations.push(Box::new(registration));
        self
    }

    /// Adds a unit which should be run as an [ApplicationRunner](crate::runner::ApplicationRunner).
    /// The unit instance must be a [RunnerUnit].
    pub fn with_runner<I: Into<Identity>>(mut self, identity: I) -> Self {
        self.runners.push(identity.into());
        self
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// Creates the [DependencyManager], registers all units and runs registered runners in the
    /// order of descending priority. Returns the manager for further use.
    pub async fn run(self) -> Result<Arc<DependencyManager>, ApplicationError> {
        if self.config.install_tracing_logger {
            install_tracing_logger();
        }

        let manager = DependencyManagerBuilder::new()
            .with_warn_on_missing_factory_context(self.config.warn_on_missing_factory_context)
            .build();

        manager.register_value(APPLICATION_CONFIG, self.config);
        for registration in self.registrations {
            registration(&manager);
        }

        info!("Searching for application runners...");

        let mut runners = Vec::with_capacity(self.runners.len());
        for identity in self.runners {
            debug!(runner = %identity, "Resolving application runner.");
            runners.push(
                manager
                    .resolve_typed::<RunnerUnit>(identity)
                    .await
                    .map_err(ApplicationError::RunnerResolution)?,
            );
        }

        info!("Running application runners...");

        for runner in runners
            .iter()
            .sorted_by_key(|runner| Reverse(runner.priority()))
        {
            runner.run().await.map_err(ApplicationError::RunnerError)?;
        }

        Ok(manager)
    }
}

fn install_tracing_logger() {
    if let Err(error) = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init()
    {
        warn!("Cannot install tracing logger: {error}");
    }
}

#[cfg(test)]
mod tests {
    use crate::application::{Application, ApplicationError};
    use crate::config::ApplicationConfig;
    use crate::runner::{ErrorPtr, FutureExt, MockApplicationRunner, RunnerUnit};
    use std::sync::{Arc, Mutex};
    use unitwire_di::error::ResolutionError;

    fn create_config() -> ApplicationConfig {
        let mut config = ApplicationConfig::default();
        config.install_tracing_logger = false;
        config
    }

    fn ordered_runner(priority: i8, order: Arc<Mutex<Vec<i8>>>) -> RunnerUnit {
        let mut runner = MockApplicationRunner::new();
        runner.expect_priority().return_const(priority);
        runner.expect_run().times(1).returning(move || {
            order.lock().unwrap().push(priority);
            async { Ok(()) }.boxed()
        });

        RunnerUnit::new(Box::new(runner))
    }

    #[tokio::test]
    async fn should_run_runners_by_priority() {
        let order = Arc::new(Mutex::new(vec![]));
        let registration_order = order.clone();

        Application::new(create_config())
            .with_registration(move |manager| {
                manager.register_value("low", ordered_runner(-128, registration_order.clone()));
                manager.register_value("high", ordered_runner(10, registration_order.clone()));
                manager.register_value("default", ordered_runner(0, registration_order));
            })
            .with_runner("low")
            .with_runner("high")
            .with_runner("default")
            .run()
            .await
            .unwrap();

        assert_eq!(*order.lock().unwrap(), vec![10, 0, -128]);
    }

    #[tokio::test]
    async fn should_register_config() {
        let manager = Application::new(create_config()).run().await.unwrap();

        assert!(manager.is_resolved("applicationConfig"));
        assert_eq!(
            *manager
                .resolve("applicationConfig")
                .await
                .unwrap()
                .downcast::<ApplicationConfig>()
                .unwrap(),
            create_config()
        );
    }

    #[tokio::test]
    async fn should_return_resolution_error() {
        let result = Application::new(create_config())
            .with_runner("missingRunner")
            .run()
            .await;

        assert!(matches!(
            result.unwrap_err(),
            ApplicationError::RunnerResolution(ResolutionError::UnitNotFound(_))
        ));
    }

    #[tokio::test]
    async fn should_return_runner_error() {
        let mut runner = MockApplicationRunner::new();
        runner.expect_priority().return_const(0);
        runner.expect_run().times(1).returning(|| {
            async {
                Err(Arc::new(ResolutionError::UnitNotFound("runner".to_string())) as ErrorPtr)
            }
            .boxed()
        });

        let result = Application::new(create_config())
            .with_registration(move |manager| {
                manager.register_value("failingRunner", RunnerUnit::new(Box::new(runner)));
            })
            .with_runner("failingRunner")
            .run()
            .await;

        assert!(matches!(result.unwrap_err(), ApplicationError::RunnerError(_)));
    }
}
