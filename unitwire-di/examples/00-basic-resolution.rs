use std::sync::Arc;
use unitwire_di::instance::sync_constructor;
use unitwire_di::resolver::{DependencyManagerBuilder, TypedUnitResolver};
use unitwire_di::unit_registry::InjectableInfo;

struct Repository {
    url: Arc<String>,
}

struct Service {
    repository: Arc<Repository>,
}

impl Service {
    fn describe(&self) {
        println!("Service using repository at {}", self.repository.url);
    }
}

#[tokio::main]
async fn main() {
    let manager = DependencyManagerBuilder::new().build();

    // plain values are registered as already resolved units
    manager.register_value("databaseUrl", "postgres://localhost".to_string());

    // units can be registered in any order - dependencies are only looked up on resolution
    manager.injectable(
        InjectableInfo::new::<Service>(sync_constructor(|arguments| {
            Ok(Service {
                repository: arguments.get::<Repository>(0)?,
            })
        }))
        .with_dependency("repository"),
    );

    // unit names default to the type name with the first letter lowercased
    manager.injectable(
        InjectableInfo::new::<Repository>(sync_constructor(|arguments| {
            Ok(Repository {
                url: arguments.get::<String>(0)?,
            })
        }))
        .with_dependency("databaseUrl"),
    );

    let service = manager
        .resolve_typed::<Service>("service")
        .await
        .expect("error resolving service");

    service.describe();

    // every unit is instantiated only once
    let repository = manager
        .resolve_typed::<Repository>("repository")
        .await
        .expect("error resolving repository");

    assert!(Arc::ptr_eq(&repository, &service.repository));
}
