//! Lifecycle DI is a small dependency injection container which walks every
//! component through a fixed lifecycle.
//!
//! The container is split into three major parts:
//! 1. Definitions: a name, the names of its dependencies and a factory
//! 2. Resolution: a dependency graph deciding the construction order
//! 3. Lifecycle: construction, awareness setters, post-processor hooks, own init
//!    callbacks, and finally destruction in reverse order on shutdown
//!
//! # Examples
//!
//! ```rust
//! use lifecycle_di::{
//!     Component, ComponentDefinition, Container, DisposableComponent, DynError,
//!     InitializingComponent,
//! };
//! use std::sync::Arc;
//!
//! struct Pool {
//!     size: usize,
//! }
//! impl InitializingComponent for Pool {
//!     fn after_properties_set(&mut self) -> Result<(), DynError> {
//!         if self.size == 0 {
//!             return Err("pool size must not be 0".into());
//!         }
//!         Ok(())
//!     }
//! }
//! impl DisposableComponent for Pool {
//!     fn destroy(&self) -> Result<(), DynError> {
//!         println!("closing {} connections", self.size);
//!         Ok(())
//!     }
//! }
//! impl Component for Pool {
//!     fn as_initializing(&mut self) -> Option<&mut dyn InitializingComponent> {
//!         Some(self)
//!     }
//!
//!     fn as_disposable(&self) -> Option<&dyn DisposableComponent> {
//!         Some(self)
//!     }
//! }
//!
//! struct Repository {
//!     pool: Arc<Pool>,
//! }
//! impl Component for Repository {}
//!
//! fn run() -> Result<(), Box<dyn std::error::Error>> {
//!     let container = Container::new();
//!     container.register(
//!         ComponentDefinition::new("repository", |deps| {
//!             Ok::<_, DynError>(Repository {
//!                 pool: deps.get("pool")?,
//!             })
//!         })
//!         .depends_on(["pool"]),
//!     )?;
//!     container.register(ComponentDefinition::new("pool", |_| {
//!         Ok::<_, DynError>(Pool { size: 4 })
//!     }))?;
//!
//!     container.start()?;
//!     assert_eq!(container.construction_order(), ["pool", "repository"]);
//!
//!     let repository = container.resolve_as::<Repository>("repository")?;
//!     assert_eq!(repository.pool.size, 4);
//!
//!     container.shutdown()?;
//!     Ok(())
//! }
//! run().unwrap();
//! ```
//!
//! Lifecycle DI consists of the following modules:
//!
//! 1. types - the component trait, its capabilities and the lifecycle states
//! 2. definitions - component definitions and the store holding them
//! 3. dependency_graph - construction order, gates and cycle detection
//! 4. post_processor - hooks run around every component's init callbacks
//! 5. container - the facade, plus the handles given to aware components
//! 6. errors - every error the container reports

pub mod container;
pub mod definitions;
pub mod dependency_graph;
pub mod errors;
pub mod factories;
mod initiator;
mod lifecycle;
pub mod options;
pub mod post_processor;
pub mod types;

pub use container::{Container, ContainerContext, RegistryHandle};
pub use definitions::{ComponentDefinition, ComponentKind};
pub use dependency_graph::{ConstructionPlan, DependencyGraph, PlanStep};
pub use errors::{
    ContainerStateError, DependencyError, DestroyError, DestroyStage, RegistrationError,
    ResolutionError, ResolveError, ShutdownError, ShutdownErrors, StartError,
};
pub use factories::{Dependencies, FnFactory, InstanceFactory};
pub use options::{ContainerOptions, TransitionListener};
pub use post_processor::{FnPostProcessor, PostProcessor, PostProcessorChain, PostProcessorEntry};
pub use types::{
    AsAny, Capability, Component, ContainerPhase, ContextAware, DisposableComponent, DynError,
    InitializingComponent, LifecycleState, NameAware, RegistryAware,
};
