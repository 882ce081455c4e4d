use std::{fmt, time::Duration};

use thiserror::Error;

use crate::types::{ContainerPhase, DynError};

/// An operation was attempted in a phase which does not allow it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Cannot {operation} while the container is {phase}")]
pub struct ContainerStateError {
    pub operation: &'static str,
    pub phase: ContainerPhase,
}

/// Errors when registering components or post-processors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    /// The name is already taken
    #[error("A component named '{0}' is already registered")]
    DuplicateName(String),
    /// Registration is closed once `start()` has been called
    #[error(transparent)]
    ContainerState(#[from] ContainerStateError),
}

/// Issues with the declared dependency graph
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("'{component}' needs '{missing}' but it is not registered")]
    UnresolvedDependency { component: String, missing: String },
    /// Members are listed in the order the resolver encountered them
    #[error("A cyclic dependency exists: {}", cycle_path(.cycle))]
    CyclicDependency { cycle: Vec<String> },
}

fn cycle_path(cycle: &[String]) -> String {
    let mut path = cycle.join(" -> ");
    if let Some(first) = cycle.first() {
        path.push_str(" -> ");
        path.push_str(first);
    }
    path
}

/// Errors aborting `start()`
///
/// Components which were already ready stay ready, `unconstructed` lists the
/// ones which never got built.
#[derive(Error, Debug)]
pub enum StartError {
    #[error(transparent)]
    ContainerState(#[from] ContainerStateError),
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    /// The factory failed
    #[error("Factory for '{name}' failed - error: {cause}")]
    Construction {
        name: String,
        #[source]
        cause: DynError,
        unconstructed: Vec<String>,
    },
    /// The component's own init callback failed
    #[error("Init callback of '{name}' failed - error: {cause}")]
    InitCallback {
        name: String,
        #[source]
        cause: DynError,
        unconstructed: Vec<String>,
    },
    /// Construction was not finished within the configured timeout
    #[error("Start timed out after {elapsed:?} - {} component(s) were never constructed", .unconstructed.len())]
    Timeout {
        elapsed: Duration,
        unconstructed: Vec<String>,
    },
}
impl StartError {
    /// The component whose failure aborted the start, if any
    pub fn component(&self) -> Option<&str> {
        match self {
            StartError::Construction { name, .. } | StartError::InitCallback { name, .. } => {
                Some(name)
            }
            StartError::Resolution(ResolutionError::UnresolvedDependency { component, .. }) => {
                Some(component)
            }
            _ => None,
        }
    }

    /// Components left unconstructed by the failed start
    pub fn unconstructed(&self) -> &[String] {
        match self {
            StartError::Construction { unconstructed, .. }
            | StartError::InitCallback { unconstructed, .. }
            | StartError::Timeout { unconstructed, .. } => unconstructed,
            _ => &[],
        }
    }
}

/// Errors when looking up a component
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// Registered, but not ready (not started yet, failed, or destroyed)
    #[error("Component '{0}' is not ready")]
    NotReady(String),
    #[error("No component named '{0}' is registered")]
    UnknownComponent(String),
    #[error("Failed to downcast '{name}', required: '{expected}' actual: '{actual}'")]
    Downcast {
        name: String,
        expected: &'static str,
        actual: &'static str,
    },
    /// Handles given to components do not keep the container alive
    #[error("The container behind this handle has been dropped")]
    ContainerDropped,
}

/// Errors when a factory accesses its dependencies
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DependencyError {
    #[error("'{component}' did not declare a dependency on '{dependency}'")]
    Undeclared {
        component: String,
        dependency: String,
    },
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Destruction callback which failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DestroyStage {
    PreDestroy,
    Destroy,
}
impl fmt::Display for DestroyStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestroyStage::PreDestroy => f.write_str("pre-destroy"),
            DestroyStage::Destroy => f.write_str("destroy"),
        }
    }
}

#[derive(Error, Debug)]
#[error("The {stage} callback of '{name}' failed - error: {cause}")]
pub struct DestroyError {
    pub name: String,
    pub stage: DestroyStage,
    #[source]
    pub cause: DynError,
}

/// All callback failures collected during one shutdown
#[derive(Error, Debug)]
pub struct ShutdownErrors {
    pub errors: Vec<DestroyError>,
}
impl fmt::Display for ShutdownErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut display = Vec::new();
        display.push("Shutdown finished with one or more errors:".to_string());
        for error in &self.errors {
            display.push(format!("- {}", error));
        }
        f.write_str(&display.join("\n"))
    }
}

/// Errors returned by `shutdown()`
#[derive(Error, Debug)]
pub enum ShutdownError {
    #[error(transparent)]
    ContainerState(#[from] ContainerStateError),
    #[error(transparent)]
    Callbacks(#[from] ShutdownErrors),
}
