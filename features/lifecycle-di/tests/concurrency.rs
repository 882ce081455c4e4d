//! Construction on worker threads
use lifecycle_di::{
    Component, ComponentDefinition, Container, ContainerOptions, DisposableComponent, DynError,
    LifecycleState, StartError,
};
use std::{
    collections::HashMap,
    sync::{Arc, Barrier, Mutex},
    thread,
    time::Duration,
};

struct Unit;
impl Component for Unit {}

type Events = Arc<Mutex<Vec<(String, LifecycleState)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn container_with(workers: usize, events: &Events) -> Container {
    let events = events.clone();
    Container::with_options(ContainerOptions::new().workers(workers).on_transition(
        move |name, state| {
            events.lock().unwrap().push((name.to_string(), state));
        },
    ))
}

fn unit(name: &str) -> ComponentDefinition {
    ComponentDefinition::new(name, |_| {
        thread::sleep(Duration::from_millis(5));
        Ok::<_, DynError>(Unit)
    })
}

/// Position of the first event matching name and state
fn position(events: &[(String, LifecycleState)], name: &str, state: LifecycleState) -> usize {
    events
        .iter()
        .position(|(n, s)| n == name && *s == state)
        .unwrap_or_else(|| panic!("{name} never reached {state}"))
}

#[test]
fn gates_hold_on_worker_threads() {
    init_tracing();
    let events: Events = Arc::default();
    let container = container_with(4, &events);

    let graph: [(&str, &[&str]); 8] = [
        ("web", &["service", "auth"]),
        ("service", &["repo", "cache"]),
        ("auth", &["config"]),
        ("repo", &["pool"]),
        ("cache", &["config"]),
        ("pool", &["config"]),
        ("config", &[]),
        ("metrics", &[]),
    ];
    for (name, dependencies) in graph {
        container
            .register(unit(name).depends_on(dependencies.iter().copied()))
            .unwrap();
    }

    container.start().unwrap();
    assert_eq!(container.construction_order().len(), 8);

    let events = events.lock().unwrap().clone();
    for (name, dependencies) in graph {
        let constructed = position(&events, name, LifecycleState::Constructed);
        for dependency in dependencies {
            let ready = position(&events, dependency, LifecycleState::Ready);
            assert!(ready < constructed, "{name} constructed before {dependency} was ready");
        }
    }
}

#[test]
fn independent_components_are_built_at_the_same_time() {
    let barrier = Arc::new(Barrier::new(2));
    let container = Container::with_options(ContainerOptions::new().workers(2));
    for name in ["left", "right"] {
        let barrier = barrier.clone();
        container
            .register(ComponentDefinition::new(name, move |_| {
                // Only passes once both factories are running
                barrier.wait();
                Ok::<_, DynError>(Unit)
            }))
            .unwrap();
    }

    container.start().unwrap();
    let mut order = container.construction_order();
    order.sort();
    assert_eq!(order, ["left", "right"]);
}

#[test]
fn post_processor_components_gate_everything_else() {
    let events: Events = Arc::default();
    let container = container_with(3, &events);

    struct Hook;
    impl lifecycle_di::PostProcessor for Hook {}
    impl Component for Hook {
        fn as_post_processor(&self) -> Option<&dyn lifecycle_di::PostProcessor> {
            Some(self)
        }
    }

    container.register(unit("a")).unwrap();
    container.register(unit("b")).unwrap();
    container
        .register(ComponentDefinition::post_processor("hook", 0, |_| {
            thread::sleep(Duration::from_millis(20));
            Ok::<_, DynError>(Hook)
        }))
        .unwrap();

    container.start().unwrap();
    let events = events.lock().unwrap().clone();
    let hook_ready = position(&events, "hook", LifecycleState::Ready);
    for name in ["a", "b"] {
        assert!(position(&events, name, LifecycleState::Constructed) > hook_ready);
    }
    assert_eq!(container.construction_order()[0], "hook");
}

#[test]
fn failure_on_a_worker_drains_in_flight_components() {
    init_tracing();
    let container = Container::with_options(ContainerOptions::new().workers(2));
    container
        .register(ComponentDefinition::new("broken", |_| -> Result<Unit, DynError> {
            Err("disk full".into())
        }))
        .unwrap();
    container
        .register(ComponentDefinition::new("slow", |_| {
            thread::sleep(Duration::from_millis(50));
            Ok::<_, DynError>(Unit)
        }))
        .unwrap();
    container
        .register(unit("late").depends_on(["slow"]))
        .unwrap();

    let err = container.start().unwrap_err();
    assert_eq!(err.component(), Some("broken"));
    // `slow` was already running and finished, `late` was never dispatched
    assert!(container.resolve("slow").is_ok());
    assert_eq!(err.unconstructed(), ["broken", "late"]);
}

/// Counts destroy callbacks
struct Closable {
    closed: Arc<Mutex<HashMap<String, usize>>>,
    name: String,
}
impl DisposableComponent for Closable {
    fn destroy(&self) -> Result<(), DynError> {
        *self
            .closed
            .lock()
            .unwrap()
            .entry(self.name.clone())
            .or_default() += 1;
        Ok(())
    }
}
impl Component for Closable {
    fn as_disposable(&self) -> Option<&dyn DisposableComponent> {
        Some(self)
    }
}

#[test]
fn timeout_still_destroys_what_was_built() {
    let closed: Arc<Mutex<HashMap<String, usize>>> = Arc::default();
    let container = Container::with_options(
        ContainerOptions::new()
            .workers(2)
            .start_timeout(Duration::from_millis(20)),
    );

    let slow_closed = closed.clone();
    container
        .register(ComponentDefinition::new("slow", move |_| {
            thread::sleep(Duration::from_millis(150));
            Ok::<_, DynError>(Closable {
                closed: slow_closed.clone(),
                name: "slow".into(),
            })
        }))
        .unwrap();
    container
        .register(unit("after").depends_on(["slow"]))
        .unwrap();

    let err = container.start().unwrap_err();
    assert!(matches!(err, StartError::Timeout { .. }));
    assert_eq!(err.unconstructed(), ["after"]);

    container.shutdown().unwrap();
    container.shutdown().unwrap();
    assert_eq!(closed.lock().unwrap().get("slow"), Some(&1));
}

#[test]
fn shutdown_reverses_ready_order_after_parallel_start() {
    let events: Events = Arc::default();
    let container = container_with(4, &events);
    for name in ["a", "b", "c", "d", "e"] {
        container.register(unit(name)).unwrap();
    }
    container.start().unwrap();
    let order = container.construction_order();

    events.lock().unwrap().clear();
    container.shutdown().unwrap();

    let destroyed: Vec<String> = events
        .lock()
        .unwrap()
        .iter()
        .filter(|(_, state)| *state == LifecycleState::Destroyed)
        .map(|(name, _)| name.clone())
        .collect();
    let reversed: Vec<String> = order.into_iter().rev().collect();
    assert_eq!(destroyed, reversed);
}
