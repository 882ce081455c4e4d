use std::{
    collections::HashMap,
    fmt::Debug,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak,
    },
    time::Instant,
};

use crate::{
    definitions::{ComponentDefinition, DefinitionStore},
    dependency_graph::DependencyGraph,
    errors::{
        ContainerStateError, RegistrationError, ResolveError, ShutdownError, ShutdownErrors,
        StartError,
    },
    initiator::Initiator,
    lifecycle,
    options::ContainerOptions,
    post_processor::{PostProcessor, PostProcessorChain},
    types::{downcast_component, Component, ContainerPhase, LifecycleState},
};

/// The container: registers definitions, starts every component, resolves
/// ready instances by name and shuts everything down in reverse order.
///
/// Cloning yields another handle to the same container.
///
/// ```rust
/// use lifecycle_di::{Component, ComponentDefinition, Container, DynError};
/// use std::sync::Arc;
///
/// struct Greeting(&'static str);
/// impl Component for Greeting {}
///
/// struct Greeter {
///     greeting: Arc<Greeting>,
/// }
/// impl Component for Greeter {}
///
/// let container = Container::new();
/// container
///     .register(ComponentDefinition::new("greeting", |_| Ok::<_, DynError>(Greeting("hello"))))
///     .unwrap();
/// container
///     .register(
///         ComponentDefinition::new("greeter", |deps| {
///             Ok::<_, DynError>(Greeter {
///                 greeting: deps.get("greeting")?,
///             })
///         })
///         .depends_on(["greeting"]),
///     )
///     .unwrap();
///
/// container.start().unwrap();
/// let greeter = container.resolve_as::<Greeter>("greeter").unwrap();
/// assert_eq!(greeter.greeting.0, "hello");
/// container.shutdown().unwrap();
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}
impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}
impl Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_struct("Container");
        map.field("phase", &self.phase());
        for name in self.definition_names() {
            let state = self
                .state_of(&name)
                .unwrap_or(LifecycleState::Unconstructed);
            map.field(&name, &state);
        }
        map.finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    pub fn with_options(options: ContainerOptions) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                options,
                phase: RwLock::new(ContainerPhase::Registering),
                definitions: RwLock::default(),
                post_processors: RwLock::default(),
                registry: RwLock::default(),
                graph: RwLock::default(),
                sequence: AtomicUsize::new(0),
            }),
        }
    }

    /// Registers a definition. Only allowed before `start()`.
    pub fn register(&self, definition: ComponentDefinition) -> Result<(), RegistrationError> {
        let phase = read(&self.inner.phase);
        if *phase != ContainerPhase::Registering {
            return Err(ContainerStateError {
                operation: "register components",
                phase: *phase,
            }
            .into());
        }

        let name = definition.name().to_string();
        let sequence = self.inner.next_sequence();
        write(&self.inner.definitions).register(sequence, definition)?;
        tracing::debug!("Registered component '{}'", name);
        Ok(())
    }

    /// Adds a hook run around the init callbacks of every component.
    ///
    /// Lower priorities run first, equal priorities in registration order.
    pub fn add_post_processor<P: PostProcessor + 'static>(
        &self,
        priority: i32,
        processor: P,
    ) -> Result<(), ContainerStateError> {
        let phase = read(&self.inner.phase);
        if *phase != ContainerPhase::Registering {
            return Err(ContainerStateError {
                operation: "add post-processors",
                phase: *phase,
            });
        }

        let sequence = self.inner.next_sequence();
        write(&self.inner.post_processors).add_standalone(priority, sequence, Arc::new(processor));
        tracing::debug!("Added post-processor with priority {}", priority);
        Ok(())
    }

    /// Resolves the dependency graph and brings every component to `Ready`.
    ///
    /// Fails fast: components which became ready stay ready (and are destroyed
    /// by `shutdown()`), the remaining ones are listed in the error.
    pub fn start(&self) -> Result<(), StartError> {
        self.inner
            .enter_phase("start", ContainerPhase::Starting, |phase| {
                phase == ContainerPhase::Registering
            })?;

        let started = Instant::now();
        tracing::info!(
            "Starting container with {} components",
            read(&self.inner.definitions).all_definitions().len()
        );

        let result = self.try_start();
        let phase = match &result {
            Ok(()) => {
                tracing::info!(
                    "Container started in {:?} - {} components ready",
                    started.elapsed(),
                    read(&self.inner.registry).order.len()
                );
                ContainerPhase::Running
            }
            Err(e) => {
                tracing::error!("Container failed to start: {}", e);
                ContainerPhase::Failed
            }
        };
        *write(&self.inner.phase) = phase;

        result
    }

    fn try_start(&self) -> Result<(), StartError> {
        let definitions = read(&self.inner.definitions).all_definitions().to_vec();

        let graph = DependencyGraph::new(&definitions);
        *write(&self.inner.graph) = Some(graph.clone());
        let plan = graph.construction_plan()?;
        tracing::debug!("Construction order: {:?}", plan.order());

        {
            let mut registry = write(&self.inner.registry);
            for step in plan.steps() {
                registry.instances.insert(
                    step.name.clone(),
                    ComponentInstance {
                        state: LifecycleState::Unconstructed,
                        instance: None,
                    },
                );
            }
        }

        let chain = read(&self.inner.post_processors).clone();
        Initiator::new(self.inner.clone(), &plan, &definitions, chain).initiate()
    }

    /// Returns the ready instance registered under `name`
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ResolveError> {
        self.inner.resolve(name)
    }

    /// Returns the ready instance registered under `name`, downcast to `T`
    pub fn resolve_as<T: Component>(&self, name: &str) -> Result<Arc<T>, ResolveError> {
        downcast_component(name, self.inner.resolve(name)?)
    }

    /// Destroys every ready component in reverse construction order.
    ///
    /// Callback failures do not stop the walk, they are returned together at
    /// the end. Calling it again is a no-op.
    pub fn shutdown(&self) -> Result<(), ShutdownError> {
        {
            let mut phase = write(&self.inner.phase);
            match *phase {
                ContainerPhase::Stopped => return Ok(()),
                ContainerPhase::Registering => {
                    *phase = ContainerPhase::Stopped;
                    return Ok(());
                }
                ContainerPhase::Starting | ContainerPhase::ShuttingDown => {
                    return Err(ContainerStateError {
                        operation: "shut down",
                        phase: *phase,
                    }
                    .into());
                }
                ContainerPhase::Running | ContainerPhase::Failed => {
                    *phase = ContainerPhase::ShuttingDown;
                }
            }
        }

        let order = self.inner.construction_order();
        tracing::info!("Shutting down {} components", order.len());

        let container = Arc::downgrade(&self.inner);
        let mut errors = Vec::new();
        for name in order.iter().rev() {
            let Some(component) = self.inner.ready_instance(name) else {
                continue;
            };
            errors.extend(lifecycle::destroy(name, &*component, &container));
        }

        *write(&self.inner.phase) = ContainerPhase::Stopped;

        if errors.is_empty() {
            tracing::info!("Container shut down");
            Ok(())
        } else {
            tracing::warn!(
                "Container shut down with {} failed callback(s)",
                errors.len()
            );
            Err(ShutdownErrors { errors }.into())
        }
    }

    pub fn phase(&self) -> ContainerPhase {
        self.inner.phase()
    }

    /// Current lifecycle state, `None` for unknown names
    pub fn state_of(&self, name: &str) -> Option<LifecycleState> {
        self.inner.state_of(name)
    }

    /// Names in the order they became `Ready`
    pub fn construction_order(&self) -> Vec<String> {
        self.inner.construction_order()
    }

    /// Registered names, in registration order
    pub fn definition_names(&self) -> Vec<String> {
        read(&self.inner.definitions).names()
    }

    /// The graph built by the last `start()`, kept for diagnostics
    pub fn dependency_graph(&self) -> Option<DependencyGraph> {
        read(&self.inner.graph).clone()
    }

    /// Number of post-processors in the chain, managed ones included once started
    pub fn post_processor_count(&self) -> usize {
        read(&self.inner.post_processors).len()
    }

    pub fn registry(&self) -> RegistryHandle {
        RegistryHandle::new(Arc::downgrade(&self.inner))
    }

    pub fn context(&self) -> ContainerContext {
        ContainerContext::new(Arc::downgrade(&self.inner))
    }
}

/// Shared state behind [`Container`] and its handles
pub(crate) struct ContainerInner {
    options: ContainerOptions,
    phase: RwLock<ContainerPhase>,
    definitions: RwLock<DefinitionStore>,
    post_processors: RwLock<PostProcessorChain>,
    registry: RwLock<Registry>,
    graph: RwLock<Option<DependencyGraph>>,
    /// Shared by definitions and post-processors, so equal priorities keep registration order
    sequence: AtomicUsize,
}

/// Lifecycle state and (once ready) the instance of every component
#[derive(Default)]
struct Registry {
    instances: HashMap<String, ComponentInstance>,
    /// Order in which components became ready
    order: Vec<String>,
}

struct ComponentInstance {
    state: LifecycleState,
    instance: Option<Arc<dyn Component>>,
}

impl ContainerInner {
    fn next_sequence(&self) -> usize {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    fn enter_phase(
        &self,
        operation: &'static str,
        next: ContainerPhase,
        allowed: impl Fn(ContainerPhase) -> bool,
    ) -> Result<(), ContainerStateError> {
        let mut phase = write(&self.phase);
        if !allowed(*phase) {
            return Err(ContainerStateError {
                operation,
                phase: *phase,
            });
        }
        *phase = next;
        Ok(())
    }

    pub(crate) fn options(&self) -> &ContainerOptions {
        &self.options
    }

    pub(crate) fn phase(&self) -> ContainerPhase {
        *read(&self.phase)
    }

    /// Stores the new state, destroyed components release their instance
    pub(crate) fn record_transition(&self, name: &str, state: LifecycleState) {
        {
            let mut registry = write(&self.registry);
            let entry = registry
                .instances
                .entry(name.to_string())
                .or_insert(ComponentInstance {
                    state,
                    instance: None,
                });
            entry.state = state;
            if state == LifecycleState::Destroyed {
                entry.instance = None;
            }
        }
        self.notify(name, state);
    }

    /// Makes the instance visible to `resolve`
    pub(crate) fn publish(&self, name: &str, component: Arc<dyn Component>) {
        {
            let mut registry = write(&self.registry);
            registry.instances.insert(
                name.to_string(),
                ComponentInstance {
                    state: LifecycleState::Ready,
                    instance: Some(component),
                },
            );
            registry.order.push(name.to_string());
        }
        self.notify(name, LifecycleState::Ready);
    }

    fn notify(&self, name: &str, state: LifecycleState) {
        tracing::debug!("'{}' -> {}", name, state);
        if let Some(listener) = self.options.listener() {
            listener(name, state);
        }
    }

    pub(crate) fn replace_post_processors(&self, chain: PostProcessorChain) {
        *write(&self.post_processors) = chain;
    }

    fn ready_instance(&self, name: &str) -> Option<Arc<dyn Component>> {
        let registry = read(&self.registry);
        registry
            .instances
            .get(name)
            .filter(|entry| entry.state == LifecycleState::Ready)
            .and_then(|entry| entry.instance.clone())
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ResolveError> {
        if !read(&self.definitions).contains(name) {
            return Err(ResolveError::UnknownComponent(name.to_string()));
        }

        self.ready_instance(name)
            .ok_or_else(|| ResolveError::NotReady(name.to_string()))
    }

    pub(crate) fn state_of(&self, name: &str) -> Option<LifecycleState> {
        if let Some(entry) = read(&self.registry).instances.get(name) {
            return Some(entry.state);
        }

        read(&self.definitions)
            .contains(name)
            .then_some(LifecycleState::Unconstructed)
    }

    fn construction_order(&self) -> Vec<String> {
        read(&self.registry).order.clone()
    }
}

/// Lookup of ready components, handed to registry-aware components
#[derive(Clone)]
pub struct RegistryHandle {
    container: Weak<ContainerInner>,
}
impl Debug for RegistryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryHandle")
            .field("alive", &(self.container.strong_count() > 0))
            .finish()
    }
}
impl RegistryHandle {
    pub(crate) fn new(container: Weak<ContainerInner>) -> Self {
        Self { container }
    }

    fn upgrade(&self) -> Result<Arc<ContainerInner>, ResolveError> {
        self.container
            .upgrade()
            .ok_or(ResolveError::ContainerDropped)
    }

    /// Returns the ready component registered under `name`
    pub fn get(&self, name: &str) -> Result<Arc<dyn Component>, ResolveError> {
        self.upgrade()?.resolve(name)
    }

    pub fn get_as<T: Component>(&self, name: &str) -> Result<Arc<T>, ResolveError> {
        downcast_component(name, self.get(name)?)
    }

    /// Whether a definition with this name exists
    pub fn contains(&self, name: &str) -> bool {
        self.upgrade()
            .map(|container| read(&container.definitions).contains(name))
            .unwrap_or(false)
    }

    pub fn is_ready(&self, name: &str) -> bool {
        self.get(name).is_ok()
    }
}

/// Handle to the container, handed to context-aware components
#[derive(Clone, Debug)]
pub struct ContainerContext {
    registry: RegistryHandle,
}
impl ContainerContext {
    pub(crate) fn new(container: Weak<ContainerInner>) -> Self {
        Self {
            registry: RegistryHandle::new(container),
        }
    }

    pub fn registry(&self) -> &RegistryHandle {
        &self.registry
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Component>, ResolveError> {
        self.registry.get(name)
    }

    pub fn resolve_as<T: Component>(&self, name: &str) -> Result<Arc<T>, ResolveError> {
        self.registry.get_as(name)
    }

    /// `None` once the container is gone
    pub fn phase(&self) -> Option<ContainerPhase> {
        self.registry.upgrade().ok().map(|container| container.phase())
    }

    pub fn state_of(&self, name: &str) -> Option<LifecycleState> {
        self.registry.upgrade().ok()?.state_of(name)
    }

    pub fn definition_names(&self) -> Vec<String> {
        self.registry
            .upgrade()
            .map(|container| read(&container.definitions).names())
            .unwrap_or_default()
    }

    /// Components which are ready so far, in the order they became ready
    pub fn construction_order(&self) -> Vec<String> {
        self.registry
            .upgrade()
            .map(|container| container.construction_order())
            .unwrap_or_default()
    }
}

// A panicking user callback must not wedge the container
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
