// note: this example assumes you've analyzed the previous one

use unitwire_di::instance::{factory, Arguments, ErrorPtr, UnitInstanceAnyPtr};
use unitwire_di::resolver::{DependencyManagerBuilder, TypedUnitResolver};
use unitwire_di::unit_registry::FactoryInfo;

struct Settings {
    prefix: String,
}

struct Client {
    address: String,
}

// factory functions get the optional context instance and resolved dependencies
async fn create_client(
    context: Option<UnitInstanceAnyPtr>,
    arguments: Arguments,
) -> Result<Client, ErrorPtr> {
    let prefix = context
        .and_then(|context| context.downcast::<Settings>().ok())
        .map(|settings| settings.prefix.clone())
        .unwrap_or_default();

    Ok(Client {
        address: format!("{}{}", prefix, arguments.get::<String>(0)?),
    })
}

#[tokio::main]
async fn main() {
    let manager = DependencyManagerBuilder::new().build();

    manager.register_value(
        "settings",
        Settings {
            prefix: "https://".to_string(),
        },
    );
    manager.register_value("host", "localhost".to_string());

    // without an explicit name, the unit is named after the function
    manager.factory(
        FactoryInfo::from_fn(create_client)
            .with_context("settings")
            .with_dependency("host"),
    );

    // dependencies of other units may also be provided by factories
    manager.register_factory(
        "greeting",
        factory(|_, arguments| async move {
            let client = arguments.get::<Client>(0)?;
            Ok::<_, ErrorPtr>(format!("Hello from {}", client.address))
        }),
        &["create_client".into()],
        None,
    );

    let greeting = manager
        .resolve_typed::<String>("greeting")
        .await
        .expect("error resolving greeting");

    println!("{greeting}");
}
