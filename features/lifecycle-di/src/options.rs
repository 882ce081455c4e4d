use std::{fmt::Debug, sync::Arc, time::Duration};

use crate::types::LifecycleState;

/// Called for every lifecycle transition of every component
pub type TransitionListener = Arc<dyn Fn(&str, LifecycleState) + Send + Sync>;

/// Settings applied when the container starts
///
/// ```rust
/// use lifecycle_di::ContainerOptions;
/// use std::time::Duration;
///
/// let options = ContainerOptions::new()
///     .workers(4)
///     .start_timeout(Duration::from_secs(30));
/// assert_eq!(options.worker_count(), 4);
/// ```
#[derive(Clone, Default)]
pub struct ContainerOptions {
    workers: usize,
    start_timeout: Option<Duration>,
    listener: Option<TransitionListener>,
}
impl ContainerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of components which may be constructed at the same time.
    ///
    /// With a single worker (the default) everything is built on the calling
    /// thread, in construction order.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Stop dispatching new components once the timeout elapsed
    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Observe every lifecycle transition
    pub fn on_transition<F>(mut self, listener: F) -> Self
    where
        F: Fn(&str, LifecycleState) + Send + Sync + 'static,
    {
        self.listener = Some(Arc::new(listener));
        self
    }

    pub fn worker_count(&self) -> usize {
        self.workers.max(1)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.start_timeout
    }

    pub(crate) fn listener(&self) -> Option<&TransitionListener> {
        self.listener.as_ref()
    }
}
impl Debug for ContainerOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerOptions")
            .field("workers", &self.worker_count())
            .field("start_timeout", &self.start_timeout)
            .field("listener", &self.listener.is_some())
            .finish()
    }
}
