use std::sync::Arc;

use anyhow::Context;
use lifecycle_di::{ComponentDefinition, Container, ContainerOptions, DynError};
use tracing_subscriber::EnvFilter;

mod controllers;
mod services;

use controllers::ExampleController;
use services::{CustomPostProcessor, ExampleService, LifeCycleDemoBean};

/// Optional number of construction workers
const WORKERS_ENV: &str = "LIFECYCLE_DEMO_WORKERS";

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let container = Container::with_options(options()?);
    register_components(&container)?;

    container.start().context("Failed to start the container")?;
    tracing::info!("Construction order: {:?}", container.construction_order());

    tracing::info!("## LifecycleDemo - Requesting the ExampleController from the Container!");
    let controller = container.resolve_as::<ExampleController>("exampleController")?;
    tracing::info!("{}", controller.do_something());

    let bean = container.resolve_as::<LifeCycleDemoBean>("lifeCycleDemoBean")?;
    tracing::debug!("Demo bean is registered as {:?}", bean.name());

    container.shutdown()?;
    Ok(())
}

fn options() -> anyhow::Result<ContainerOptions> {
    let options = ContainerOptions::new();
    match std::env::var(WORKERS_ENV) {
        Ok(workers) => {
            let workers = workers
                .parse::<usize>()
                .with_context(|| format!("{WORKERS_ENV} must be a number, got '{workers}'"))?;
            Ok(options.workers(workers))
        }
        Err(_) => Ok(options),
    }
}

fn register_components(container: &Container) -> anyhow::Result<()> {
    container.register(ComponentDefinition::new("exampleService", |_| {
        Ok::<_, DynError>(ExampleService::new())
    }))?;

    container.register(
        ComponentDefinition::new("exampleController", |deps| {
            let service: Arc<ExampleService> = deps.get("exampleService")?;
            Ok::<_, DynError>(ExampleController::new(service))
        })
        .depends_on(["exampleService"]),
    )?;

    container.register(ComponentDefinition::new("lifeCycleDemoBean", |_| {
        Ok::<_, DynError>(LifeCycleDemoBean::new())
    }))?;

    container.register(ComponentDefinition::post_processor(
        "customPostProcessor",
        0,
        |_| Ok::<_, DynError>(CustomPostProcessor),
    ))?;

    Ok(())
}
