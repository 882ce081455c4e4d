use std::{
    collections::{BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::{Duration, Instant},
};

use futures::StreamExt;
use futures_channel::{mpsc, oneshot};

use crate::{
    container::ContainerInner,
    definitions::{ComponentDefinition, ComponentKind, RegisteredDefinition},
    dependency_graph::ConstructionPlan,
    errors::StartError,
    factories::Dependencies,
    lifecycle::{self, Completion, Job, LifecycleFailure},
    post_processor::PostProcessorChain,
    types::{Component, LifecycleState},
};

/// Brings every component of a construction plan to `Ready`
///
/// A component is dispatched once its whole gate is ready. Among the
/// dispatchable components the one earliest in the plan goes first, so a
/// single worker builds exactly in plan order.
///
/// Post-processor components and their dependencies only ever see the
/// standalone hooks, so managed post-processors never process each other
/// whatever the worker count.
pub(crate) struct Initiator {
    container: Arc<ContainerInner>,
    /// Indexed by plan position
    steps: Vec<Scheduled>,
    by_name: HashMap<String, usize>,
    /// Positions whose gate contains the position
    dependents: Vec<Vec<usize>>,
    /// Number of gate members which are not ready yet
    pending: Vec<usize>,
    dispatchable: BTreeSet<usize>,
    ready: Vec<Option<Arc<dyn Component>>>,
    /// Replaced whenever a post-processor component becomes ready
    chain: Arc<PostProcessorChain>,
    /// Standalone hooks only, applied to early components
    standalone: Arc<PostProcessorChain>,
    in_flight: usize,
    completed: usize,
}

struct Scheduled {
    sequence: usize,
    early: bool,
    definition: Arc<ComponentDefinition>,
}

/// Reason to stop dispatching
enum Abort {
    Failed {
        name: String,
        failure: LifecycleFailure,
    },
    TimedOut,
}

impl Initiator {
    pub(crate) fn new(
        container: Arc<ContainerInner>,
        plan: &ConstructionPlan,
        definitions: &[RegisteredDefinition],
        chain: PostProcessorChain,
    ) -> Self {
        let steps: Vec<Scheduled> = plan
            .steps()
            .iter()
            .map(|step| {
                let registered = &definitions[step.index];
                Scheduled {
                    sequence: registered.sequence,
                    early: step.early,
                    definition: registered.definition.clone(),
                }
            })
            .collect();

        let by_name: HashMap<String, usize> = plan
            .steps()
            .iter()
            .enumerate()
            .map(|(position, step)| (step.name.clone(), position))
            .collect();

        let mut dependents = vec![Vec::new(); steps.len()];
        let mut pending = vec![0; steps.len()];
        let mut dispatchable = BTreeSet::new();
        for (position, step) in plan.steps().iter().enumerate() {
            for member in &step.gate {
                if let Some(&gate_position) = by_name.get(member) {
                    dependents[gate_position].push(position);
                    pending[position] += 1;
                }
            }
            if pending[position] == 0 {
                dispatchable.insert(position);
            }
        }

        Self {
            container,
            ready: vec![None; steps.len()],
            steps,
            by_name,
            dependents,
            pending,
            dispatchable,
            standalone: Arc::new(chain.clone()),
            chain: Arc::new(chain),
            in_flight: 0,
            completed: 0,
        }
    }

    pub(crate) fn initiate(mut self) -> Result<(), StartError> {
        let workers = self.container.options().worker_count();
        let started = Instant::now();
        let (timer, timeout) = StartTimer::start(self.container.options().timeout());

        tracing::debug!(
            "Constructing {} components with {} worker(s)",
            self.steps.len(),
            workers
        );

        let result = if workers == 1 {
            self.run_inline(timeout)
        } else {
            self.run_parallel(workers, timeout)
        };
        timer.cancel();

        self.container
            .replace_post_processors((*self.chain).clone());

        match result {
            Ok(()) => {
                debug_assert_eq!(self.completed, self.steps.len(), "Not all components were built");
                Ok(())
            }
            Err(abort) => Err(self.into_error(abort, started.elapsed())),
        }
    }

    /// Builds every component on the calling thread, in plan order
    fn run_inline(&mut self, mut timeout: oneshot::Receiver<()>) -> Result<(), Abort> {
        loop {
            if matches!(timeout.try_recv(), Ok(Some(()))) {
                tracing::warn!("Start timed out - no further components are constructed");
                return Err(Abort::TimedOut);
            }

            let Some(job) = self.next_job() else {
                return Ok(());
            };
            self.in_flight += 1;
            let completion = lifecycle::run(job);
            self.in_flight -= 1;
            self.complete(completion)?;
        }
    }

    /// Builds up to `workers` components at the same time on scoped threads.
    ///
    /// After a failure or timeout nothing new is dispatched, but components
    /// already in flight are waited for and published.
    fn run_parallel(
        &mut self,
        workers: usize,
        mut timeout: oneshot::Receiver<()>,
    ) -> Result<(), Abort> {
        let (completion_tx, mut completion_rx) = mpsc::unbounded::<Completion>();
        let total = self.steps.len();

        thread::scope(|scope| {
            futures::executor::block_on(async {
                let mut abort: Option<Abort> = None;

                loop {
                    if abort.is_none() {
                        while self.in_flight < workers {
                            let Some(job) = self.next_job() else {
                                break;
                            };
                            let completion_tx = completion_tx.clone();
                            scope.spawn(move || {
                                let _ = completion_tx.unbounded_send(lifecycle::run(job));
                            });
                            self.in_flight += 1;
                        }
                    }

                    if self.in_flight == 0 {
                        break;
                    }

                    tracing::debug!(
                        "Waiting for components to finish [{} of {} complete]",
                        self.completed,
                        total
                    );

                    futures::select! {
                        completion = completion_rx.select_next_some() => {
                            self.in_flight -= 1;
                            if let Err(failure) = self.complete(completion) {
                                abort.get_or_insert(failure);
                            }
                        }
                        fired = timeout => {
                            // A dropped sender means there is no timeout
                            if fired.is_ok() && abort.is_none() {
                                tracing::warn!(
                                    "Start timed out - waiting for {} component(s) in flight",
                                    self.in_flight
                                );
                                abort = Some(Abort::TimedOut);
                            }
                        }
                    }
                }

                abort.map_or(Ok(()), Err)
            })
        })
    }

    /// Takes the earliest dispatchable component and collects its dependencies
    fn next_job(&mut self) -> Option<Job> {
        let position = self.dispatchable.pop_first()?;
        let definition = self.steps[position].definition.clone();
        let chain = if self.steps[position].early {
            self.standalone.clone()
        } else {
            self.chain.clone()
        };

        let resolved = definition
            .dependencies()
            .iter()
            .filter_map(|dependency| {
                let dependency_position = *self.by_name.get(dependency)?;
                let component = self.ready[dependency_position].clone()?;
                Some((dependency.clone(), component))
            })
            .collect();

        tracing::trace!("Dispatching '{}'", definition.name());
        Some(Job {
            position,
            dependencies: Dependencies::new(definition.name(), resolved),
            definition,
            chain,
            container: Arc::downgrade(&self.container),
        })
    }

    /// Publishes a finished component and releases everything gated on it
    fn complete(&mut self, completion: Completion) -> Result<(), Abort> {
        let Completion { position, outcome } = completion;
        let sequence = self.steps[position].sequence;
        let kind = self.steps[position].definition.kind();
        let name = self.steps[position].definition.name().to_string();

        let component: Arc<dyn Component> = match outcome {
            Ok(component) => Arc::from(component),
            Err(failure) => {
                tracing::error!("Failed to construct '{}': {:?}", name, failure);
                self.roll_back(&name);
                return Err(Abort::Failed { name, failure });
            }
        };

        if let ComponentKind::PostProcessor { priority } = kind {
            if component.as_post_processor().is_none() {
                let failure = LifecycleFailure::Construction(
                    format!(
                        "'{}' is registered as a post-processor but its type '{}' does not provide one",
                        name,
                        component.concrete_type_name()
                    )
                    .into(),
                );
                tracing::error!("Failed to construct '{}': {:?}", name, failure);
                self.roll_back(&name);
                return Err(Abort::Failed { name, failure });
            }

            let mut chain = (*self.chain).clone();
            chain.add_managed(priority, sequence, &name, component.clone());
            self.chain = Arc::new(chain);
            tracing::debug!("'{}' joined the post-processor chain", name);
        }

        self.container.publish(&name, component.clone());
        self.ready[position] = Some(component);
        self.completed += 1;

        for dependent in std::mem::take(&mut self.dependents[position]) {
            self.pending[dependent] -= 1;
            if self.pending[dependent] == 0 {
                self.dispatchable.insert(dependent);
            }
        }

        Ok(())
    }

    /// A failed component never became ready, its instance is gone
    fn roll_back(&self, name: &str) {
        if self.container.state_of(name) != Some(LifecycleState::Unconstructed) {
            self.container
                .record_transition(name, LifecycleState::Unconstructed);
        }
    }

    fn into_error(self, abort: Abort, elapsed: Duration) -> StartError {
        let unconstructed: Vec<String> = self
            .steps
            .iter()
            .map(|step| step.definition.name())
            .filter(|name| self.container.state_of(name) == Some(LifecycleState::Unconstructed))
            .map(str::to_string)
            .collect();

        match abort {
            Abort::Failed {
                name,
                failure: LifecycleFailure::Construction(cause),
            } => StartError::Construction {
                name,
                cause,
                unconstructed,
            },
            Abort::Failed {
                name,
                failure: LifecycleFailure::InitCallback(cause),
            } => StartError::InitCallback {
                name,
                cause,
                unconstructed,
            },
            Abort::TimedOut => StartError::Timeout {
                elapsed,
                unconstructed,
            },
        }
    }
}

/// Thread which fires a oneshot once the start timeout elapsed
///
/// The thread parks until the deadline. Dropping or cancelling the timer
/// wakes it, and it exits without firing.
struct StartTimer {
    cancelled: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl StartTimer {
    /// Without a timeout the sender is dropped right away, so the receiver
    /// only ever reports cancellation.
    fn start(timeout: Option<Duration>) -> (Self, oneshot::Receiver<()>) {
        let (timeout_tx, timeout_rx) = oneshot::channel::<()>();
        let cancelled = Arc::new(AtomicBool::new(false));

        let thread = timeout.map(|timeout| {
            let cancelled = cancelled.clone();
            let deadline = Instant::now() + timeout;
            thread::spawn(move || {
                loop {
                    if cancelled.load(Ordering::Acquire) {
                        return;
                    }
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    // Spurious wake-ups just loop around
                    thread::park_timeout(deadline - now);
                }
                let _ = timeout_tx.send(());
            })
        });

        (Self { cancelled, thread }, timeout_rx)
    }

    fn cancel(self) {
        drop(self);
    }
}

impl Drop for StartTimer {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
        if let Some(thread) = self.thread.take() {
            thread.thread().unpark();
            let _ = thread.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{container::Container, options::ContainerOptions, types::DynError};

    struct Unit;
    impl Component for Unit {}

    fn recorded(name: &str, log: &Arc<Mutex<Vec<String>>>) -> ComponentDefinition {
        let log = log.clone();
        let owned = name.to_string();
        ComponentDefinition::new(name, move |_| {
            log.lock().unwrap().push(owned.clone());
            Ok::<_, DynError>(Unit)
        })
    }

    #[test]
    fn single_worker_builds_in_plan_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let container = Container::new();
        container
            .register(recorded("c", &log).depends_on(["a", "b"]))
            .unwrap();
        container.register(recorded("b", &log)).unwrap();
        container.register(recorded("a", &log)).unwrap();
        container.start().unwrap();

        // Dependencies in registration order: b before a
        assert_eq!(*log.lock().unwrap(), ["b", "a", "c"]);
        assert_eq!(container.construction_order(), ["b", "a", "c"]);
    }

    #[test]
    fn elapsed_timeout_stops_dispatching() {
        let container =
            Container::with_options(ContainerOptions::new().start_timeout(Duration::from_millis(10)));
        container
            .register(ComponentDefinition::new("slow", |_| {
                thread::sleep(Duration::from_millis(100));
                Ok::<_, DynError>(Unit)
            }))
            .unwrap();
        container
            .register(ComponentDefinition::new("after", |_| Ok::<_, DynError>(Unit)).depends_on(["slow"]))
            .unwrap();

        let err = container.start().unwrap_err();
        assert!(matches!(err, StartError::Timeout { .. }));
        assert_eq!(err.unconstructed(), ["after"]);
        // Already built components remain available
        assert!(container.resolve("slow").is_ok());
    }

    #[test]
    fn timeout_without_expiry_is_harmless() {
        let container = Container::with_options(
            ContainerOptions::new()
                .workers(3)
                .start_timeout(Duration::from_secs(60)),
        );
        for name in ["a", "b", "c", "d"] {
            container
                .register(ComponentDefinition::new(name, |_| Ok::<_, DynError>(Unit)))
                .unwrap();
        }
        container.start().unwrap();
        assert_eq!(container.construction_order().len(), 4);
    }

    #[test]
    fn cancelled_timer_exits_without_firing() {
        let (timer, mut fired) = StartTimer::start(Some(Duration::from_secs(60)));
        let cancelled_at = Instant::now();
        timer.cancel();

        assert!(cancelled_at.elapsed() < Duration::from_secs(5));
        // The sender is gone without a value
        assert!(fired.try_recv().is_err());
    }

    #[test]
    fn timer_fires_after_the_deadline() {
        let (timer, fired) = StartTimer::start(Some(Duration::from_millis(10)));
        assert_eq!(futures::executor::block_on(fired), Ok(()));
        timer.cancel();
    }

    /// Managed post-processor recording every component it saw
    struct Seen {
        seen: Arc<Mutex<Vec<String>>>,
    }
    impl crate::post_processor::PostProcessor for Seen {
        fn before_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
            self.seen.lock().unwrap().push(name.to_string());
            component
        }
    }
    impl Component for Seen {
        fn as_post_processor(&self) -> Option<&dyn crate::post_processor::PostProcessor> {
            Some(self)
        }
    }

    #[test]
    fn post_processors_never_process_each_other() {
        for workers in [1, 3] {
            let container = Container::with_options(ContainerOptions::new().workers(workers));
            let mut logs = Vec::new();
            for name in ["first", "second"] {
                let seen: Arc<Mutex<Vec<String>>> = Arc::default();
                logs.push(seen.clone());
                container
                    .register(ComponentDefinition::post_processor(name, 0, move |_| {
                        Ok::<_, DynError>(Seen { seen: seen.clone() })
                    }))
                    .unwrap();
            }
            container
                .register(ComponentDefinition::new("plain", |_| Ok::<_, DynError>(Unit)))
                .unwrap();

            container.start().unwrap();
            for seen in logs {
                assert_eq!(*seen.lock().unwrap(), ["plain"], "with {workers} worker(s)");
            }
        }
    }
}
