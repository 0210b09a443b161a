use std::sync::Arc;
use unitwire::application::Application;
use unitwire::runner::{runner_constructor, ApplicationRunner, BoxFuture, ErrorPtr, FutureExt};

struct PrintGreetingRunner {
    greeting: Arc<String>,
}

impl ApplicationRunner for PrintGreetingRunner {
    fn run(&self) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async {
            println!("{}", self.greeting);
            Ok(())
        }
        .boxed()
    }
}

struct PrintFirstRunner;

impl ApplicationRunner for PrintFirstRunner {
    fn run(&self) -> BoxFuture<'_, Result<(), ErrorPtr>> {
        async {
            println!("Starting...");
            Ok(())
        }
        .boxed()
    }

    // for ordered execution of application runners, priorities can be used
    fn priority(&self) -> i8 {
        10
    }
}

#[tokio::main]
async fn main() {
    // the config is read from unitwire.json and UNITWIRE_ environment variables
    Application::from_environment()
        .expect("error loading config")
        .with_registration(|manager| {
            manager.register_value("greeting", "Hello world!".to_string());
            manager.register_class(
                "printGreetingRunner",
                runner_constructor(|arguments| {
                    Ok(PrintGreetingRunner {
                        greeting: arguments.get::<String>(0)?,
                    })
                }),
                &["greeting".into()],
                None,
            );
            manager.register_class(
                "printFirstRunner",
                runner_constructor(|_| Ok(PrintFirstRunner)),
                &[],
                None,
            );
        })
        .with_runner("printGreetingRunner")
        .with_runner("printFirstRunner")
        .run()
        .await
        .expect("error running application");
}
