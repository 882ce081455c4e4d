use std::sync::Arc;

use lifecycle_di::Component;

use crate::services::ExampleService;

/// A regular controller, showing where a plain component shows up in the lifecycle
pub struct ExampleController {
    example_service: Arc<ExampleService>,
}
impl ExampleController {
    pub fn new(example_service: Arc<ExampleService>) -> Self {
        tracing::info!("## I'm in the ExampleController Constructor!");
        Self { example_service }
    }

    pub fn do_something(&self) -> String {
        self.example_service.do_the_thing()
    }
}
impl Component for ExampleController {}
