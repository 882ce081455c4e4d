use std::sync::Arc;

use crate::types::Component;

/// Global hook invoked around every component's own init callback.
///
/// Both hooks default to returning the component unchanged. Whatever a hook
/// returns replaces the working instance for every later hook, the init
/// callback and finally the registry.
pub trait PostProcessor: Send + Sync {
    fn before_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        let _ = name;
        component
    }

    fn after_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        let _ = name;
        component
    }
}

type HookFn = dyn Fn(Box<dyn Component>, &str) -> Box<dyn Component> + Send + Sync;

/// Post-processor assembled from optional closures
///
/// ```rust
/// use lifecycle_di::FnPostProcessor;
///
/// let audit = FnPostProcessor::new()
///     .before_init(|component, name| {
///         println!("about to initialize {name}");
///         component
///     });
/// ```
#[derive(Default)]
pub struct FnPostProcessor {
    before: Option<Box<HookFn>>,
    after: Option<Box<HookFn>>,
}
impl FnPostProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn before_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(Box<dyn Component>, &str) -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.before = Some(Box::new(hook));
        self
    }

    pub fn after_init<F>(mut self, hook: F) -> Self
    where
        F: Fn(Box<dyn Component>, &str) -> Box<dyn Component> + Send + Sync + 'static,
    {
        self.after = Some(Box::new(hook));
        self
    }
}
impl PostProcessor for FnPostProcessor {
    fn before_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        match &self.before {
            Some(hook) => hook(component, name),
            None => component,
        }
    }

    fn after_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        match &self.after {
            Some(hook) => hook(component, name),
            None => component,
        }
    }
}

#[derive(Clone)]
enum Hook {
    /// Added through `Container::add_post_processor`
    Standalone(Arc<dyn PostProcessor>),
    /// A ready component exposing the post-processor capability
    Managed(Arc<dyn Component>),
}

/// One link of the chain
#[derive(Clone)]
pub struct PostProcessorEntry {
    priority: i32,
    sequence: usize,
    label: String,
    hook: Hook,
}
impl PostProcessorEntry {
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Component name for managed post-processors, a generated label otherwise
    pub fn label(&self) -> &str {
        &self.label
    }

    fn before_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        match &self.hook {
            Hook::Standalone(processor) => processor.before_init(component, name),
            Hook::Managed(managed) => match managed.as_post_processor() {
                Some(processor) => processor.before_init(component, name),
                None => component,
            },
        }
    }

    fn after_init(&self, component: Box<dyn Component>, name: &str) -> Box<dyn Component> {
        match &self.hook {
            Hook::Standalone(processor) => processor.after_init(component, name),
            Hook::Managed(managed) => match managed.as_post_processor() {
                Some(processor) => processor.after_init(component, name),
                None => component,
            },
        }
    }
}

/// Post-processors ordered by ascending priority, then registration sequence
#[derive(Clone, Default)]
pub struct PostProcessorChain {
    entries: Vec<PostProcessorEntry>,
}
impl PostProcessorChain {
    pub(crate) fn add_standalone(
        &mut self,
        priority: i32,
        sequence: usize,
        processor: Arc<dyn PostProcessor>,
    ) {
        self.insert(PostProcessorEntry {
            priority,
            sequence,
            label: format!("post-processor#{sequence}"),
            hook: Hook::Standalone(processor),
        });
    }

    pub(crate) fn add_managed(
        &mut self,
        priority: i32,
        sequence: usize,
        name: &str,
        component: Arc<dyn Component>,
    ) {
        self.insert(PostProcessorEntry {
            priority,
            sequence,
            label: name.to_string(),
            hook: Hook::Managed(component),
        });
    }

    fn insert(&mut self, entry: PostProcessorEntry) {
        let key = (entry.priority, entry.sequence);
        let position = self
            .entries
            .partition_point(|existing| (existing.priority, existing.sequence) <= key);
        self.entries.insert(position, entry);
    }

    pub fn entries(&self) -> &[PostProcessorEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs every before-init hook in order, each receiving the previous hook's result
    pub(crate) fn apply_before_init(
        &self,
        mut component: Box<dyn Component>,
        name: &str,
    ) -> Box<dyn Component> {
        for entry in &self.entries {
            tracing::trace!("Running before-init hook '{}' on '{}'", entry.label, name);
            component = entry.before_init(component, name);
        }
        component
    }

    /// Runs every after-init hook in order, each receiving the previous hook's result
    pub(crate) fn apply_after_init(
        &self,
        mut component: Box<dyn Component>,
        name: &str,
    ) -> Box<dyn Component> {
        for entry in &self.entries {
            tracing::trace!("Running after-init hook '{}' on '{}'", entry.label, name);
            component = entry.after_init(component, name);
        }
        component
    }
}
