// note: this example assumes you've analyzed the previous ones

use unitwire_di::instance::sync_constructor;
use unitwire_di::resolver::DependencyManagerBuilder;

#[tokio::main]
async fn main() {
    let manager = DependencyManagerBuilder::new().build();

    // all missing dependencies are reported at once, together with units referencing them
    manager.register_class(
        "service",
        sync_constructor(|_| Ok(())),
        &["repository".into(), "cache".into()],
        None,
    );

    if let Err(error) = manager.resolve("service").await {
        println!("{error}");
    }

    // circular dependencies are detected before anything gets instantiated
    manager.register_class(
        "repository",
        sync_constructor(|_| Ok(())),
        &["cache".into()],
        None,
    );
    manager.register_class(
        "cache",
        sync_constructor(|_| Ok(())),
        &["repository".into()],
        None,
    );

    if let Err(error) = manager.resolve("service").await {
        println!("{error}");
    }

    // aliases share the instance of their target
    manager.register_class(
        "store",
        sync_constructor(|_| Ok(())),
        &[],
        Some("cache".into()),
    );

    println!("Registered units: {:?}", manager.unit_names());
}
