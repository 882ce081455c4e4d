//! Walks a single component through its lifecycle stages
//!
//! Construction: factory, awareness setters, before-init hooks, own init
//! callbacks, after-init hooks. Publishing (`Ready`) is left to the caller.
//! Destruction: pre-destroy then destroy, failures are collected.

use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Weak},
};

use crate::{
    container::{ContainerContext, ContainerInner, RegistryHandle},
    definitions::ComponentDefinition,
    errors::{DestroyError, DestroyStage},
    factories::Dependencies,
    post_processor::PostProcessorChain,
    types::{Component, DynError, LifecycleState},
};

/// Everything needed to bring one component up to `PostInitHooksRun`
pub(crate) struct Job {
    pub position: usize,
    pub definition: Arc<ComponentDefinition>,
    pub dependencies: Dependencies,
    pub chain: Arc<PostProcessorChain>,
    pub container: Weak<ContainerInner>,
}

pub(crate) struct Completion {
    pub position: usize,
    pub outcome: Result<Box<dyn Component>, LifecycleFailure>,
}

#[derive(Debug)]
pub(crate) enum LifecycleFailure {
    Construction(DynError),
    InitCallback(DynError),
}

/// Runs the job
///
/// A panic inside the own init callbacks is an init failure, any other panic
/// (factory, awareness setters, hooks) is a construction failure.
pub(crate) fn run(job: Job) -> Completion {
    let position = job.position;
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| drive(job)))
        .unwrap_or_else(|payload| Err(LifecycleFailure::Construction(panicked(payload))));

    Completion { position, outcome }
}

fn panicked(payload: Box<dyn Any + Send>) -> DynError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|message| message.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("panicked: {message}").into()
}

fn drive(job: Job) -> Result<Box<dyn Component>, LifecycleFailure> {
    let Job {
        definition,
        dependencies,
        chain,
        container,
        ..
    } = job;
    let name = definition.name();
    let mut progress = Progress::new(name, &container);

    let mut working = definition
        .factory()
        .construct(&dependencies)
        .map_err(LifecycleFailure::Construction)?;
    progress.advance(LifecycleState::Constructed);

    // Dependencies were handed to the factory
    progress.advance(LifecycleState::DependenciesBound);

    bind_awareness(working.as_mut(), name, &container);
    progress.advance(LifecycleState::AwarenessBound);

    working = chain.apply_before_init(working, name);
    progress.advance(LifecycleState::PreInitHooksRun);

    panic::catch_unwind(AssertUnwindSafe(|| init_callbacks(working.as_mut())))
        .unwrap_or_else(|payload| Err(panicked(payload)))
        .map_err(LifecycleFailure::InitCallback)?;
    progress.advance(LifecycleState::OwnInitCallbackRun);

    working = chain.apply_after_init(working, name);
    progress.advance(LifecycleState::PostInitHooksRun);

    Ok(working)
}

fn init_callbacks(component: &mut dyn Component) -> Result<(), DynError> {
    let Some(initializing) = component.as_initializing() else {
        return Ok(());
    };
    initializing.post_construct()?;
    initializing.after_properties_set()
}

/// Aware setters, each at most once, in capability order
fn bind_awareness(component: &mut dyn Component, name: &str, container: &Weak<ContainerInner>) {
    if let Some(aware) = component.as_name_aware() {
        aware.set_component_name(name);
    }
    if let Some(aware) = component.as_registry_aware() {
        aware.set_registry(RegistryHandle::new(container.clone()));
    }
    if let Some(aware) = component.as_context_aware() {
        aware.set_context(ContainerContext::new(container.clone()));
    }
}

/// Runs the destruction callbacks of a ready component.
///
/// A failing pre-destroy callback does not prevent the destroy callback.
pub(crate) fn destroy(
    name: &str,
    component: &dyn Component,
    container: &Weak<ContainerInner>,
) -> Vec<DestroyError> {
    let mut progress = Progress::resume(name, LifecycleState::Ready, container);
    let mut errors = Vec::new();
    let disposable = component.as_disposable();

    if let Some(disposable) = disposable {
        if let Err(cause) = disposable.pre_destroy() {
            tracing::warn!("Pre-destroy callback of '{}' failed: {}", name, cause);
            errors.push(DestroyError {
                name: name.to_string(),
                stage: DestroyStage::PreDestroy,
                cause,
            });
        }
    }
    progress.advance(LifecycleState::PreDestroyRun);

    if let Some(disposable) = disposable {
        if let Err(cause) = disposable.destroy() {
            tracing::warn!("Destroy callback of '{}' failed: {}", name, cause);
            errors.push(DestroyError {
                name: name.to_string(),
                stage: DestroyStage::Destroy,
                cause,
            });
        }
    }
    progress.advance(LifecycleState::Destroyed);

    errors
}

/// Tracks the state of one component during a single pass
struct Progress<'a> {
    name: &'a str,
    state: LifecycleState,
    container: &'a Weak<ContainerInner>,
}
impl<'a> Progress<'a> {
    fn new(name: &'a str, container: &'a Weak<ContainerInner>) -> Self {
        Self::resume(name, LifecycleState::Unconstructed, container)
    }

    fn resume(name: &'a str, state: LifecycleState, container: &'a Weak<ContainerInner>) -> Self {
        Self {
            name,
            state,
            container,
        }
    }

    fn advance(&mut self, next: LifecycleState) {
        debug_assert_eq!(
            self.state.next(),
            Some(next),
            "'{}' skipped a lifecycle stage",
            self.name
        );
        self.state = next;
        if let Some(container) = self.container.upgrade() {
            container.record_transition(self.name, next);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        post_processor::FnPostProcessor,
        types::{DisposableComponent, InitializingComponent, NameAware},
    };

    #[derive(Default)]
    struct Recorder {
        name: String,
        calls: Arc<Mutex<Vec<String>>>,
        fail_init: bool,
    }
    impl Recorder {
        fn push(&self, call: &str) {
            self.calls.lock().unwrap().push(call.to_string());
        }
    }
    impl NameAware for Recorder {
        fn set_component_name(&mut self, name: &str) {
            self.name = name.to_string();
            self.push("name");
        }
    }
    impl InitializingComponent for Recorder {
        fn post_construct(&mut self) -> Result<(), DynError> {
            self.push("post_construct");
            if self.fail_init {
                return Err("init refused".into());
            }
            Ok(())
        }

        fn after_properties_set(&mut self) -> Result<(), DynError> {
            self.push("after_properties_set");
            Ok(())
        }
    }
    impl DisposableComponent for Recorder {
        fn pre_destroy(&self) -> Result<(), DynError> {
            self.push("pre_destroy");
            Err("still busy".into())
        }

        fn destroy(&self) -> Result<(), DynError> {
            self.push("destroy");
            Ok(())
        }
    }
    impl Component for Recorder {
        fn as_name_aware(&mut self) -> Option<&mut dyn NameAware> {
            Some(self)
        }

        fn as_initializing(&mut self) -> Option<&mut dyn InitializingComponent> {
            Some(self)
        }

        fn as_disposable(&self) -> Option<&dyn DisposableComponent> {
            Some(self)
        }
    }

    fn job(calls: Arc<Mutex<Vec<String>>>, fail_init: bool) -> Job {
        let hook_calls = calls.clone();
        let after_calls = calls.clone();
        let mut chain = PostProcessorChain::default();
        chain.add_standalone(
            0,
            0,
            Arc::new(
                FnPostProcessor::new()
                    .before_init(move |component, _| {
                        hook_calls.lock().unwrap().push("before_init".into());
                        component
                    })
                    .after_init(move |component, _| {
                        after_calls.lock().unwrap().push("after_init".into());
                        component
                    }),
            ),
        );

        let factory_calls = calls.clone();
        let definition = ComponentDefinition::new("recorder", move |_| {
            factory_calls.lock().unwrap().push("construct".into());
            Ok::<_, DynError>(Recorder {
                calls: factory_calls.clone(),
                fail_init,
                ..Default::default()
            })
        });

        Job {
            position: 3,
            definition: Arc::new(definition),
            dependencies: Dependencies::new("recorder", Vec::new()),
            chain: Arc::new(chain),
            container: Weak::new(),
        }
    }

    #[test]
    fn stages_run_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let completion = run(job(calls.clone(), false));
        assert_eq!(completion.position, 3);

        let component = completion.outcome.unwrap();
        assert_eq!(component.downcast_ref::<Recorder>().unwrap().name, "recorder");
        assert_eq!(
            *calls.lock().unwrap(),
            [
                "construct",
                "name",
                "before_init",
                "post_construct",
                "after_properties_set",
                "after_init"
            ]
        );
    }

    #[test]
    fn failing_init_callback_stops_the_pass() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let completion = run(job(calls.clone(), true));

        assert!(matches!(
            completion.outcome,
            Err(LifecycleFailure::InitCallback(_))
        ));
        assert_eq!(
            *calls.lock().unwrap(),
            ["construct", "name", "before_init", "post_construct"]
        );
    }

    #[test]
    fn panicking_factory_is_a_construction_failure() {
        let definition =
            ComponentDefinition::new("bomb", |_| -> Result<Recorder, DynError> { panic!("kaboom") });
        let completion = run(Job {
            position: 0,
            definition: Arc::new(definition),
            dependencies: Dependencies::new("bomb", Vec::new()),
            chain: Arc::default(),
            container: Weak::new(),
        });

        match completion.outcome {
            Err(LifecycleFailure::Construction(cause)) => {
                assert!(cause.to_string().contains("kaboom"))
            }
            _ => panic!("expected a construction failure"),
        }
    }

    struct Exploding;
    impl InitializingComponent for Exploding {
        fn post_construct(&mut self) -> Result<(), DynError> {
            panic!("init exploded")
        }
    }
    impl Component for Exploding {
        fn as_initializing(&mut self) -> Option<&mut dyn InitializingComponent> {
            Some(self)
        }
    }

    #[test]
    fn panicking_init_callback_is_an_init_failure() {
        let definition = ComponentDefinition::new("bad", |_| Ok::<_, DynError>(Exploding));
        let completion = run(Job {
            position: 0,
            definition: Arc::new(definition),
            dependencies: Dependencies::new("bad", Vec::new()),
            chain: Arc::default(),
            container: Weak::new(),
        });

        match completion.outcome {
            Err(LifecycleFailure::InitCallback(cause)) => {
                assert_eq!(cause.to_string(), "panicked: init exploded")
            }
            _ => panic!("expected an init callback failure"),
        }
    }

    #[test]
    fn panicking_hook_is_a_construction_failure() {
        let mut chain = PostProcessorChain::default();
        chain.add_standalone(
            0,
            0,
            Arc::new(FnPostProcessor::new().after_init(|_, _| panic!("hook exploded"))),
        );
        let definition = ComponentDefinition::new("hooked", |_| {
            Ok::<_, DynError>(Recorder::default())
        });
        let completion = run(Job {
            position: 0,
            definition: Arc::new(definition),
            dependencies: Dependencies::new("hooked", Vec::new()),
            chain: Arc::new(chain),
            container: Weak::new(),
        });

        match completion.outcome {
            Err(LifecycleFailure::Construction(cause)) => {
                assert_eq!(cause.to_string(), "panicked: hook exploded")
            }
            _ => panic!("expected a construction failure"),
        }
    }

    #[test]
    fn destroy_runs_after_failed_pre_destroy() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorder = Recorder {
            calls: calls.clone(),
            ..Default::default()
        };

        let errors = destroy("recorder", &recorder, &Weak::new());
        assert_eq!(*calls.lock().unwrap(), ["pre_destroy", "destroy"]);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].stage, DestroyStage::PreDestroy);
        assert_eq!(errors[0].name, "recorder");
    }
}
