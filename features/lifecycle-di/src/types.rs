use std::{
    any::{type_name, Any},
    fmt,
    sync::Arc,
};

use crate::{
    container::{ContainerContext, RegistryHandle},
    errors::ResolveError,
    post_processor::PostProcessor,
};

/// Errors produced by user code (factories and callbacks)
pub type DynError = Box<dyn std::error::Error + Send + Sync>;

/// Type erasure helpers, implemented for every sized `Send + Sync + 'static` type
///
/// Components may be built on worker threads and are shared through `Arc`,
/// so anything managed needs to be Send + Sync + 'static.
pub trait AsAny: Any + Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
    fn type_name(&self) -> &'static str;
}
impl<T: Any + Send + Sync> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }

    fn type_name(&self) -> &'static str {
        type_name::<T>()
    }
}

/// A managed instance.
///
/// Every capability is optional and exposed through an accessor which returns
/// `None` unless the component overrides it. The lifecycle asks the instance
/// for each capability instead of casting it to a concrete type.
///
/// ```rust
/// use lifecycle_di::{Component, NameAware};
///
/// #[derive(Default)]
/// struct Greeter {
///     name: String,
/// }
///
/// impl NameAware for Greeter {
///     fn set_component_name(&mut self, name: &str) {
///         self.name = name.to_string();
///     }
/// }
///
/// impl Component for Greeter {
///     fn as_name_aware(&mut self) -> Option<&mut dyn NameAware> {
///         Some(self)
///     }
/// }
/// ```
pub trait Component: AsAny {
    fn as_name_aware(&mut self) -> Option<&mut dyn NameAware> {
        None
    }

    fn as_registry_aware(&mut self) -> Option<&mut dyn RegistryAware> {
        None
    }

    fn as_context_aware(&mut self) -> Option<&mut dyn ContextAware> {
        None
    }

    fn as_initializing(&mut self) -> Option<&mut dyn InitializingComponent> {
        None
    }

    fn as_disposable(&self) -> Option<&dyn DisposableComponent> {
        None
    }

    /// Only consulted for components declared with [`crate::ComponentDefinition::post_processor`]
    fn as_post_processor(&self) -> Option<&dyn PostProcessor> {
        None
    }

    /// Whether this instance exposes the given capability
    fn supports(&mut self, capability: Capability) -> bool {
        match capability {
            Capability::NameAware => self.as_name_aware().is_some(),
            Capability::RegistryAware => self.as_registry_aware().is_some(),
            Capability::ContextAware => self.as_context_aware().is_some(),
            Capability::Initializing => self.as_initializing().is_some(),
            Capability::Disposable => self.as_disposable().is_some(),
            Capability::PostProcessor => self.as_post_processor().is_some(),
        }
    }
}

impl dyn Component {
    pub fn is<T: Component>(&self) -> bool {
        AsAny::as_any(self).is::<T>()
    }

    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        AsAny::as_any(self).downcast_ref()
    }

    pub fn downcast_mut<T: Component>(&mut self) -> Option<&mut T> {
        AsAny::as_any_mut(self).downcast_mut()
    }

    /// Name of the concrete type behind the trait object
    pub fn concrete_type_name(&self) -> &'static str {
        AsAny::type_name(self)
    }
}

/// Downcasts a shared component, reporting the actual type on mismatch
pub(crate) fn downcast_component<T: Component>(
    name: &str,
    component: Arc<dyn Component>,
) -> Result<Arc<T>, ResolveError> {
    let mismatch = |actual| ResolveError::Downcast {
        name: name.to_string(),
        expected: type_name::<T>(),
        actual,
    };

    let actual = component.concrete_type_name();
    if !component.is::<T>() {
        return Err(mismatch(actual));
    }

    AsAny::into_any_arc(component)
        .downcast::<T>()
        .map_err(|_| mismatch(actual))
}

/// Optional behaviours a component may expose, in the order the lifecycle visits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Capability {
    NameAware,
    RegistryAware,
    ContextAware,
    Initializing,
    Disposable,
    PostProcessor,
}

/// Receives the name the component was registered under
pub trait NameAware {
    fn set_component_name(&mut self, name: &str);
}

/// Receives a handle for looking up other ready components
pub trait RegistryAware {
    fn set_registry(&mut self, registry: RegistryHandle);
}

/// Receives a handle to the container itself
pub trait ContextAware {
    fn set_context(&mut self, context: ContainerContext);
}

/// Own init callbacks, run after the before-init hooks and before the after-init hooks.
///
/// `post_construct` runs first, then `after_properties_set`.
pub trait InitializingComponent {
    fn post_construct(&mut self) -> Result<(), DynError> {
        Ok(())
    }

    fn after_properties_set(&mut self) -> Result<(), DynError> {
        Ok(())
    }
}

/// Destruction callbacks, `pre_destroy` runs before `destroy`.
///
/// Published components are shared, so these only get `&self`.
pub trait DisposableComponent {
    fn pre_destroy(&self) -> Result<(), DynError> {
        Ok(())
    }

    fn destroy(&self) -> Result<(), DynError> {
        Ok(())
    }
}

/// Stage of a single component. Stages are strictly ordered and never skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Unconstructed,
    Constructed,
    DependenciesBound,
    AwarenessBound,
    PreInitHooksRun,
    OwnInitCallbackRun,
    PostInitHooksRun,
    Ready,
    PreDestroyRun,
    Destroyed,
}
impl LifecycleState {
    /// All stages in order
    pub const ALL: [LifecycleState; 10] = [
        LifecycleState::Unconstructed,
        LifecycleState::Constructed,
        LifecycleState::DependenciesBound,
        LifecycleState::AwarenessBound,
        LifecycleState::PreInitHooksRun,
        LifecycleState::OwnInitCallbackRun,
        LifecycleState::PostInitHooksRun,
        LifecycleState::Ready,
        LifecycleState::PreDestroyRun,
        LifecycleState::Destroyed,
    ];

    /// The only state reachable from this one
    pub fn next(self) -> Option<LifecycleState> {
        let position = Self::ALL.iter().position(|state| *state == self)?;
        Self::ALL.get(position + 1).copied()
    }
}
impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Phase of the whole container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerPhase {
    /// Accepting definitions and post-processors
    Registering,
    /// `start()` is running
    Starting,
    /// Every component is ready
    Running,
    /// `start()` failed, components which became ready stay ready
    Failed,
    ShuttingDown,
    Stopped,
}
impl fmt::Display for ContainerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ContainerPhase::Registering => "registering",
            ContainerPhase::Starting => "starting",
            ContainerPhase::Running => "running",
            ContainerPhase::Failed => "failed",
            ContainerPhase::ShuttingDown => "shutting down",
            ContainerPhase::Stopped => "stopped",
        };
        f.write_str(text)
    }
}
