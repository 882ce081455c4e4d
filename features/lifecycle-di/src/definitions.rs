use std::{collections::HashMap, fmt::Debug, sync::Arc};

use crate::{
    errors::RegistrationError,
    factories::{Dependencies, DynFactory, FnFactory, InstanceFactory},
    types::{Component, DynError},
};

/// How the container treats a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentKind {
    Regular,
    /// The ready instance joins the post-processor chain with this priority
    PostProcessor { priority: i32 },
}

/// Static description of a component: name, factory and dependency names.
///
/// ```rust
/// use lifecycle_di::{Component, ComponentDefinition, DynError};
/// use std::sync::Arc;
///
/// struct Repository;
/// impl Component for Repository {}
///
/// struct Service {
///     repository: Arc<Repository>,
/// }
/// impl Component for Service {}
///
/// let definition = ComponentDefinition::new("service", |deps| {
///     Ok::<_, DynError>(Service {
///         repository: deps.get::<Repository>("repository")?,
///     })
/// })
/// .depends_on(["repository"]);
///
/// assert_eq!(definition.name(), "service");
/// assert_eq!(definition.dependencies(), ["repository"]);
/// ```
pub struct ComponentDefinition {
    name: String,
    dependencies: Vec<String>,
    factory: Box<dyn DynFactory>,
    kind: ComponentKind,
}
impl ComponentDefinition {
    /// Defines a component built by a closure
    pub fn new<F, C, E>(name: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<C, E> + Send + Sync + 'static,
        C: Component,
        E: Into<DynError>,
    {
        Self::from_factory(name, FnFactory(factory))
    }

    /// Defines a component built by an [`InstanceFactory`]
    pub fn from_factory<Factory: InstanceFactory>(
        name: impl Into<String>,
        factory: Factory,
    ) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            factory: Box::new(factory),
            kind: ComponentKind::Regular,
        }
    }

    /// Defines a managed component which also acts as a post-processor.
    ///
    /// The built instance must expose [`Component::as_post_processor`].
    /// Every regular component waits for all post-processor components
    /// to be ready, so their hooks apply to it.
    pub fn post_processor<F, C, E>(name: impl Into<String>, priority: i32, factory: F) -> Self
    where
        F: Fn(&Dependencies) -> Result<C, E> + Send + Sync + 'static,
        C: Component,
        E: Into<DynError>,
    {
        Self {
            kind: ComponentKind::PostProcessor { priority },
            ..Self::new(name, factory)
        }
    }

    /// Declares dependencies, which are built first and handed to the factory
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = dependency.into();
            if !self.dependencies.contains(&dependency) {
                self.dependencies.push(dependency);
            }
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn kind(&self) -> ComponentKind {
        self.kind
    }

    pub fn is_post_processor(&self) -> bool {
        matches!(self.kind, ComponentKind::PostProcessor { .. })
    }

    pub(crate) fn factory(&self) -> &dyn DynFactory {
        self.factory.as_ref()
    }
}
impl Debug for ComponentDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentDefinition")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("kind", &self.kind)
            .finish()
    }
}

/// A registered definition, together with its registration sequence number
#[derive(Debug, Clone)]
pub(crate) struct RegisteredDefinition {
    pub sequence: usize,
    pub definition: Arc<ComponentDefinition>,
}

/// Holds all definitions in registration order
#[derive(Default)]
pub(crate) struct DefinitionStore {
    definitions: Vec<RegisteredDefinition>,
    by_name: HashMap<String, usize>,
}
impl DefinitionStore {
    pub fn register(
        &mut self,
        sequence: usize,
        definition: ComponentDefinition,
    ) -> Result<(), RegistrationError> {
        if self.by_name.contains_key(definition.name()) {
            return Err(RegistrationError::DuplicateName(definition.name().to_string()));
        }

        self.by_name
            .insert(definition.name().to_string(), self.definitions.len());
        self.definitions.push(RegisteredDefinition {
            sequence,
            definition: Arc::new(definition),
        });
        Ok(())
    }

    /// All definitions, in registration order
    pub fn all_definitions(&self) -> &[RegisteredDefinition] {
        &self.definitions
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.definitions
            .iter()
            .map(|registered| registered.definition.name().to_string())
            .collect()
    }
}
