use std::collections::{BTreeSet, HashMap};

use crate::{definitions::RegisteredDefinition, errors::ResolutionError};

/// Graph of all registered components
/// Used to check missing and circular dependencies and to derive the construction order
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// Entries in registration order
    entries: Vec<DependencyGraphEntry>,
    by_name: HashMap<String, usize>,
}
impl DependencyGraph {
    pub(crate) fn new(definitions: &[RegisteredDefinition]) -> Self {
        let mut graph = Self {
            entries: Vec::with_capacity(definitions.len()),
            by_name: HashMap::with_capacity(definitions.len()),
        };

        for registered in definitions {
            let definition = &registered.definition;
            graph
                .by_name
                .insert(definition.name().to_string(), graph.entries.len());
            graph.entries.push(DependencyGraphEntry {
                name: definition.name().to_string(),
                dependencies: definition.dependencies().to_vec(),
                post_processor: definition.is_post_processor(),
            });
        }

        graph
    }

    /// Names of all components, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    /// Declared dependencies of a component
    pub fn dependencies_of(&self, name: &str) -> Option<&[String]> {
        self.by_name
            .get(name)
            .map(|index| self.entries[*index].dependencies.as_slice())
    }

    /// Validate the graph
    ///
    /// Missing dependencies are reported before cycles, both in registration order
    pub fn check(&self) -> Result<(), ResolutionError> {
        self.construction_plan().map(|_| ())
    }

    /// Orders all components so every dependency precedes its dependents.
    ///
    /// Depth first, ties broken by registration order. Post-processor components
    /// (and whatever they depend on) are placed before everything else.
    pub fn construction_plan(&self) -> Result<ConstructionPlan, ResolutionError> {
        for entry in &self.entries {
            if let Some(missing) = entry
                .dependencies
                .iter()
                .find(|dependency| !self.by_name.contains_key(dependency.as_str()))
            {
                return Err(ResolutionError::UnresolvedDependency {
                    component: entry.name.clone(),
                    missing: missing.clone(),
                });
            }
        }

        let mut visit = Visit {
            graph: self,
            marks: vec![Mark::Unvisited; self.entries.len()],
            stack: Vec::new(),
            order: Vec::with_capacity(self.entries.len()),
        };

        let post_processors = (0..self.entries.len()).filter(|i| self.entries[*i].post_processor);
        for index in post_processors {
            visit.visit(index)?;
        }
        // Everything ordered so far must be ready before post-processors can run
        let early_count = visit.order.len();

        for index in 0..self.entries.len() {
            visit.visit(index)?;
        }

        let post_processor_names: BTreeSet<String> = self
            .entries
            .iter()
            .filter(|entry| entry.post_processor)
            .map(|entry| entry.name.clone())
            .collect();

        let steps = visit
            .order
            .iter()
            .enumerate()
            .map(|(position, index)| {
                let entry = &self.entries[*index];
                let mut gate: BTreeSet<String> = entry.dependencies.iter().cloned().collect();
                let early = position < early_count;
                if early {
                    if !entry.post_processor {
                        tracing::debug!(
                            "'{}' is required by a post-processor - it is built before post-processors are ready",
                            entry.name
                        );
                    }
                } else {
                    gate.extend(post_processor_names.iter().cloned());
                }

                PlanStep {
                    index: *index,
                    name: entry.name.clone(),
                    dependencies: entry.dependencies.clone(),
                    gate,
                    post_processor: entry.post_processor,
                    early,
                }
            })
            .collect();

        Ok(ConstructionPlan { steps })
    }
}

#[derive(Debug, Clone)]
struct DependencyGraphEntry {
    name: String,
    dependencies: Vec<String>,
    post_processor: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    /// Currently on the recursion stack
    Active,
    Done,
}

struct Visit<'a> {
    graph: &'a DependencyGraph,
    marks: Vec<Mark>,
    stack: Vec<usize>,
    order: Vec<usize>,
}
impl Visit<'_> {
    fn visit(&mut self, index: usize) -> Result<(), ResolutionError> {
        match self.marks[index] {
            Mark::Done => return Ok(()),
            Mark::Active => {
                // Circular Dependency - report the chain starting at the repeated entry
                let start = self
                    .stack
                    .iter()
                    .position(|on_stack| *on_stack == index)
                    .unwrap_or_default();
                let cycle = self.stack[start..]
                    .iter()
                    .map(|i| self.graph.entries[*i].name.clone())
                    .collect();
                return Err(ResolutionError::CyclicDependency { cycle });
            }
            Mark::Unvisited => {}
        }

        self.marks[index] = Mark::Active;
        self.stack.push(index);

        let graph = self.graph;
        let mut dependencies: Vec<usize> = graph.entries[index]
            .dependencies
            .iter()
            .filter_map(|dependency| graph.by_name.get(dependency.as_str()).copied())
            .collect();
        // Registration order is the tie break
        dependencies.sort_unstable();

        for dependency in dependencies {
            self.visit(dependency)?;
        }

        self.stack.pop();
        self.marks[index] = Mark::Done;
        self.order.push(index);
        Ok(())
    }
}

/// Construction order together with each component's gate
#[derive(Debug, Clone)]
pub struct ConstructionPlan {
    steps: Vec<PlanStep>,
}
impl ConstructionPlan {
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Names in construction order
    pub fn order(&self) -> Vec<String> {
        self.steps.iter().map(|step| step.name.clone()).collect()
    }

    /// Names which must be `Ready` before the component may begin construction
    pub fn gate(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.steps
            .iter()
            .find(|step| step.name == name)
            .map(|step| &step.gate)
    }
}

#[derive(Debug, Clone)]
pub struct PlanStep {
    /// Position among the definitions the graph was built from
    pub(crate) index: usize,
    pub name: String,
    pub dependencies: Vec<String>,
    /// Direct dependencies, plus every post-processor component for components
    /// which are not themselves needed by a post-processor
    pub gate: BTreeSet<String>,
    pub post_processor: bool,
    /// Ordered before post-processors, so not processed by post-processor components
    pub early: bool,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        definitions::ComponentDefinition,
        types::{Component, DynError},
    };

    struct Unit;
    impl Component for Unit {}

    fn regular(name: &str, deps: &[&str]) -> ComponentDefinition {
        ComponentDefinition::new(name, |_| Ok::<_, DynError>(Unit)).depends_on(deps.iter().copied())
    }

    fn processor(name: &str, deps: &[&str]) -> ComponentDefinition {
        ComponentDefinition::post_processor(name, 0, |_| Ok::<_, DynError>(Unit))
            .depends_on(deps.iter().copied())
    }

    fn graph(definitions: Vec<ComponentDefinition>) -> DependencyGraph {
        let registered: Vec<_> = definitions
            .into_iter()
            .enumerate()
            .map(|(sequence, definition)| RegisteredDefinition {
                sequence,
                definition: Arc::new(definition),
            })
            .collect();
        DependencyGraph::new(&registered)
    }

    fn order(definitions: Vec<ComponentDefinition>) -> Vec<String> {
        graph(definitions).construction_plan().unwrap().order()
    }

    #[test]
    fn dependencies_come_first() {
        assert_eq!(
            order(vec![regular("b", &["a"]), regular("a", &[])]),
            ["a", "b"]
        );
    }

    #[test]
    fn ties_follow_registration_order() {
        assert_eq!(
            order(vec![
                regular("a", &["c"]),
                regular("b", &[]),
                regular("c", &[])
            ]),
            ["c", "a", "b"]
        );
        // Declaration order of dependencies does not matter, registration order does
        assert_eq!(
            order(vec![
                regular("top", &["y", "x"]),
                regular("x", &[]),
                regular("y", &[])
            ]),
            ["x", "y", "top"]
        );
    }

    #[test]
    fn every_dependency_precedes_its_dependents() {
        let definitions = vec![
            regular("web", &["service", "config"]),
            regular("service", &["repo", "cache"]),
            regular("repo", &["pool"]),
            regular("cache", &["config"]),
            regular("pool", &["config"]),
            regular("config", &[]),
            regular("metrics", &[]),
        ];
        let graph = graph(definitions);
        let order = graph.construction_plan().unwrap().order();
        assert_eq!(order.len(), 7);

        for (position, name) in order.iter().enumerate() {
            for dependency in graph.dependencies_of(name).unwrap() {
                let dependency_position = order.iter().position(|n| n == dependency).unwrap();
                assert!(dependency_position < position, "{dependency} after {name}");
            }
        }
    }

    #[test]
    fn missing_dependency_names_both_sides() {
        let err = graph(vec![regular("a", &[]), regular("b", &["ghost"])])
            .check()
            .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::UnresolvedDependency {
                component: "b".into(),
                missing: "ghost".into()
            }
        );
    }

    #[test]
    fn detects_self_reference() {
        let err = graph(vec![regular("a", &["a"])]).check().unwrap_err();
        assert_eq!(
            err,
            ResolutionError::CyclicDependency {
                cycle: vec!["a".into()]
            }
        );
    }

    #[test]
    fn detects_mutual_reference_in_encounter_order() {
        let err = graph(vec![
            regular("root", &["x"]),
            regular("x", &["y"]),
            regular("y", &["x"]),
        ])
        .check()
        .unwrap_err();
        assert_eq!(
            err,
            ResolutionError::CyclicDependency {
                cycle: vec!["x".into(), "y".into()]
            }
        );
    }

    #[test]
    fn post_processors_are_ordered_first_and_gate_regular_components() {
        let graph = graph(vec![
            regular("a", &[]),
            regular("b", &["a"]),
            processor("audit", &["clock"]),
            regular("clock", &[]),
        ]);
        let plan = graph.construction_plan().unwrap();
        assert_eq!(plan.order(), ["clock", "audit", "a", "b"]);

        let gate = |name| plan.gate(name).unwrap().iter().cloned().collect::<Vec<_>>();
        assert_eq!(gate("clock"), Vec::<String>::new());
        assert_eq!(gate("audit"), ["clock"]);
        assert_eq!(gate("a"), ["audit"]);
        assert_eq!(gate("b"), ["a", "audit"]);

        let clock = &plan.steps()[0];
        assert!(clock.early && !clock.post_processor);
        assert!(!plan.steps()[2].early);
    }
}
