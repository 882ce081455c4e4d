use std::sync::Arc;

use crate::{
    errors::DependencyError,
    types::{downcast_component, Component, DynError},
};

/// A Factory providing instances of a given component type
pub trait InstanceFactory: Send + Sync + 'static {
    type Provides: Component;

    /// Constructs a new instance, receiving every declared dependency already `Ready`
    ///
    /// Returns the constructed instance, or an error if the instantiation failed
    fn construct(
        &self,
        dependencies: &Dependencies,
    ) -> Result<Self::Provides, impl Into<DynError>>;
}

/// Wrapper Trait for factories, providing boxed components
pub trait DynFactory: Send + Sync {
    fn construct(&self, dependencies: &Dependencies) -> Result<Box<dyn Component>, DynError>;
}
// Impl DynFactory for any InstanceFactory
impl<T: Component, SpecificFactory: InstanceFactory<Provides = T>> DynFactory for SpecificFactory {
    fn construct(&self, dependencies: &Dependencies) -> Result<Box<dyn Component>, DynError> {
        // Forward the call to the specific implementation
        <SpecificFactory as InstanceFactory>::construct(self, dependencies)
            .map(|component| Box::new(component) as Box<dyn Component>)
            .map_err(|e| e.into())
    }
}

/// Adapts a closure into an [`InstanceFactory`]
pub struct FnFactory<F>(pub F);
impl<F, C, E> InstanceFactory for FnFactory<F>
where
    F: Fn(&Dependencies) -> Result<C, E> + Send + Sync + 'static,
    C: Component,
    E: Into<DynError>,
{
    type Provides = C;

    fn construct(&self, dependencies: &Dependencies) -> Result<C, impl Into<DynError>> {
        (self.0)(dependencies)
    }
}

/// The ready dependencies handed to a factory, keyed by component name
pub struct Dependencies {
    owner: String,
    resolved: Vec<(String, Arc<dyn Component>)>,
}
impl Dependencies {
    pub(crate) fn new(owner: impl Into<String>, resolved: Vec<(String, Arc<dyn Component>)>) -> Self {
        Self {
            owner: owner.into(),
            resolved,
        }
    }

    /// Name of the component being constructed
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the dependency as a trait object
    pub fn component(&self, name: &str) -> Result<Arc<dyn Component>, DependencyError> {
        self.resolved
            .iter()
            .find(|(dependency, _)| dependency == name)
            .map(|(_, component)| component.clone())
            .ok_or_else(|| DependencyError::Undeclared {
                component: self.owner.clone(),
                dependency: name.to_string(),
            })
    }

    /// Returns the dependency downcast to its concrete type
    pub fn get<T: Component>(&self, name: &str) -> Result<Arc<T>, DependencyError> {
        let component = self.component(name)?;
        downcast_component(name, component).map_err(DependencyError::from)
    }

    /// Names of all dependencies, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.resolved.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }
}
impl std::fmt::Debug for Dependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dependencies")
            .field("owner", &self.owner)
            .field("names", &self.names().collect::<Vec<_>>())
            .finish()
    }
}
