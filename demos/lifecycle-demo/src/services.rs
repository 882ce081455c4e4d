use lifecycle_di::{
    Component, ContainerContext, ContextAware, DisposableComponent, DynError,
    InitializingComponent, NameAware, PostProcessor, RegistryAware, RegistryHandle,
};

/// A regular service, injected into the controller
pub struct ExampleService;
impl ExampleService {
    pub fn new() -> Self {
        tracing::info!("## I'm in the ExampleService Constructor!");
        Self
    }

    pub fn do_the_thing(&self) -> String {
        "Hello World - From the Example Bean!".to_string()
    }
}
impl Component for ExampleService {}

/// Opts into every lifecycle capability and reports each call
pub struct LifeCycleDemoBean {
    name: Option<String>,
    registry: Option<RegistryHandle>,
    context: Option<ContainerContext>,
}
impl LifeCycleDemoBean {
    pub fn new() -> Self {
        tracing::info!("## I'm in the LifeCycleDemoBean Constructor!");
        Self {
            name: None,
            registry: None,
            context: None,
        }
    }

    /// Called by the [`CustomPostProcessor`] before the init callbacks
    pub fn before_init(&self) {
        tracing::info!("## LifeCycleDemoBean - Before Init - Called by CustomPostProcessor!");
    }

    /// Called by the [`CustomPostProcessor`] after the init callbacks
    pub fn after_init(&self) {
        tracing::info!("## LifeCycleDemoBean - After Init - Called by CustomPostProcessor!");
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}
impl NameAware for LifeCycleDemoBean {
    fn set_component_name(&mut self, name: &str) {
        tracing::info!("## LifeCycleDemoBean - Bean Name has been set! My Bean Name is: {name}");
        self.name = Some(name.to_string());
    }
}
impl RegistryAware for LifeCycleDemoBean {
    fn set_registry(&mut self, registry: RegistryHandle) {
        tracing::info!("## LifeCycleDemoBean - Bean Factory has been set!");
        self.registry = Some(registry);
    }
}
impl ContextAware for LifeCycleDemoBean {
    fn set_context(&mut self, context: ContainerContext) {
        tracing::info!(
            "## LifeCycleDemoBean - Application context has been set! (container is {})",
            context
                .phase()
                .map(|phase| phase.to_string())
                .unwrap_or_else(|| "gone".to_string())
        );
        self.context = Some(context);
    }
}
impl InitializingComponent for LifeCycleDemoBean {
    fn post_construct(&mut self) -> Result<(), DynError> {
        tracing::info!("## LifeCycleDemoBean - post construct callback has been called!");
        Ok(())
    }

    fn after_properties_set(&mut self) -> Result<(), DynError> {
        tracing::info!("## LifeCycleDemoBean - My properties have been set!");
        Ok(())
    }
}
impl DisposableComponent for LifeCycleDemoBean {
    fn pre_destroy(&self) -> Result<(), DynError> {
        tracing::info!("## LifeCycleDemoBean - pre destroy callback has been called!");
        if let Some(context) = &self.context {
            tracing::debug!(
                "Components still ready: {:?}",
                context.construction_order()
            );
        }
        Ok(())
    }

    fn destroy(&self) -> Result<(), DynError> {
        tracing::info!("## LifeCycleDemoBean - I've been terminated!");
        if let Some(registry) = &self.registry {
            // Our own entry is already on its way out
            tracing::debug!(
                "'{}' still resolvable during destroy: {}",
                self.name().unwrap_or_default(),
                registry.is_ready(self.name().unwrap_or_default())
            );
        }
        Ok(())
    }
}
impl Component for LifeCycleDemoBean {
    fn as_name_aware(&mut self) -> Option<&mut dyn NameAware> {
        Some(self)
    }

    fn as_registry_aware(&mut self) -> Option<&mut dyn RegistryAware> {
        Some(self)
    }

    fn as_context_aware(&mut self) -> Option<&mut dyn ContextAware> {
        Some(self)
    }

    fn as_initializing(&mut self) -> Option<&mut dyn InitializingComponent> {
        Some(self)
    }

    fn as_disposable(&self) -> Option<&dyn DisposableComponent> {
        Some(self)
    }
}

/// Hooks into every component and calls the demo bean's helpers
pub struct CustomPostProcessor;
impl PostProcessor for CustomPostProcessor {
    fn before_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        tracing::debug!("CustomPostProcessor - before init of '{name}'");
        if let Some(bean) = component.downcast_ref::<LifeCycleDemoBean>() {
            bean.before_init();
        }
        component
    }

    fn after_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        tracing::debug!("CustomPostProcessor - after init of '{name}'");
        if let Some(bean) = component.downcast_ref::<LifeCycleDemoBean>() {
            bean.after_init();
        }
        component
    }
}
impl Component for CustomPostProcessor {
    fn as_post_processor(&self) -> Option<&dyn PostProcessor> {
        Some(self)
    }
}
