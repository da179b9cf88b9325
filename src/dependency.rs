// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! System dependency graph and execution levels
//!
//! Edges point from a dependent system to the system it depends on. The
//! graph is kept acyclic: an edge that would close a cycle is rejected and
//! the graph is left as it was. Levels group systems whose dependencies all
//! sit in earlier levels, so everything inside one level may run at once.

use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::{EcsError, Result};
use crate::system::SystemId;

/// Systems that can run concurrently, ascending by id
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionLevel {
    pub systems: Vec<SystemId>,
}

impl ExecutionLevel {
    pub fn contains(&self, system: SystemId) -> bool {
        self.systems.binary_search(&system).is_ok()
    }

    pub fn len(&self) -> usize {
        self.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }
}

type Adjacency = FxHashMap<SystemId, FxHashSet<SystemId>>;

#[derive(Default, Clone)]
struct GraphEdges {
    /// system -> systems it depends on
    dependencies: Adjacency,
    /// system -> systems depending on it
    dependents: Adjacency,
}

impl GraphEdges {
    fn ensure_node(&mut self, system: SystemId) -> bool {
        if self.dependencies.contains_key(&system) {
            return false;
        }
        self.dependencies.insert(system, FxHashSet::default());
        self.dependents.insert(system, FxHashSet::default());
        true
    }

    /// Insert `dependent -> dependency` unless it closes a cycle
    fn try_insert_edge(&mut self, dependent: SystemId, dependency: SystemId) -> Result<bool> {
        if self
            .dependencies
            .get(&dependent)
            .is_some_and(|deps| deps.contains(&dependency))
        {
            return Ok(false);
        }

        let mut scratch = self.dependencies.clone();
        scratch.entry(dependent).or_default().insert(dependency);
        if let Some(path) = find_cycle(&scratch) {
            return Err(EcsError::CyclicDependency { path });
        }

        self.dependencies
            .entry(dependent)
            .or_default()
            .insert(dependency);
        self.dependents
            .entry(dependency)
            .or_default()
            .insert(dependent);
        Ok(true)
    }
}

/// Depth-first search state for cycle detection
#[derive(Default)]
struct CycleSearch {
    visited: FxHashSet<SystemId>,
    on_stack: FxHashSet<SystemId>,
    path: Vec<SystemId>,
}

impl CycleSearch {
    fn visit(&mut self, current: SystemId, graph: &Adjacency) -> bool {
        if self.on_stack.contains(&current) {
            self.path.push(current);
            return true;
        }
        if !self.visited.insert(current) {
            return false;
        }

        self.on_stack.insert(current);
        self.path.push(current);

        if let Some(next) = graph.get(&current) {
            for dependency in sorted(next) {
                if self.visit(dependency, graph) {
                    return true;
                }
            }
        }

        self.on_stack.remove(&current);
        self.path.pop();
        false
    }
}

/// Path of the first cycle found, ending with the node that closed it
fn find_cycle(graph: &Adjacency) -> Option<Vec<SystemId>> {
    let mut search = CycleSearch::default();
    let mut nodes: Vec<SystemId> = graph.keys().copied().collect();
    nodes.sort_unstable();

    for node in nodes {
        if search.visit(node, graph) {
            return Some(search.path);
        }
    }
    None
}

fn sorted(set: &FxHashSet<SystemId>) -> Vec<SystemId> {
    let mut ids: Vec<SystemId> = set.iter().copied().collect();
    ids.sort_unstable();
    ids
}

/// Level-by-level topological order
fn compute_levels(edges: &GraphEdges) -> Result<Vec<ExecutionLevel>> {
    let mut pending: FxHashMap<SystemId, usize> = edges
        .dependencies
        .iter()
        .map(|(&system, deps)| (system, deps.len()))
        .collect();
    let mut levels = Vec::new();

    while !pending.is_empty() {
        let mut ready: Vec<SystemId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(&system, _)| system)
            .collect();

        if ready.is_empty() {
            return Err(EcsError::UnresolvableLevels {
                remaining: pending.len(),
            });
        }
        ready.sort_unstable();

        for system in &ready {
            pending.remove(system);
            if let Some(dependents) = edges.dependents.get(system) {
                for dependent in dependents {
                    if let Some(count) = pending.get_mut(dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }

        levels.push(ExecutionLevel { systems: ready });
    }

    Ok(levels)
}

type GraphListener = Box<dyn Fn() + Send + Sync>;

/// Thread-safe dependency graph with cached execution levels
///
/// Every mutation drops the cached levels and notifies the registered
/// listeners after the graph lock is released.
#[derive(Default)]
pub struct SystemDependencyGraph {
    edges: RwLock<GraphEdges>,
    cached_levels: RwLock<Option<Arc<[ExecutionLevel]>>>,
    listeners: RwLock<Vec<GraphListener>>,
    revision: AtomicU64,
}

impl SystemDependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system with no edges. Known systems are left alone.
    pub fn add_system(&self, system: SystemId) -> bool {
        let added = self.edges.write().ensure_node(system);
        if added {
            self.changed();
        }
        added
    }

    /// Make `dependent` run in a later level than `dependency`
    pub fn add_dependency(&self, dependent: SystemId, dependency: SystemId) -> Result<()> {
        if dependent == dependency {
            return Err(EcsError::SelfDependency(dependent));
        }

        let changed = {
            let mut edges = self.edges.write();
            let mut changed = edges.ensure_node(dependent);
            changed |= edges.ensure_node(dependency);
            match edges.try_insert_edge(dependent, dependency) {
                Ok(inserted) => changed | inserted,
                Err(err) => {
                    tracing::warn!(%dependent, %dependency, error = %err, "rejected system dependency");
                    return Err(err);
                }
            }
        };

        if changed {
            self.changed();
        }
        Ok(())
    }

    /// Remove a system, linking its dependents to its dependencies
    ///
    /// A link that would close a cycle is skipped and logged.
    pub fn remove_system(&self, system: SystemId) -> bool {
        {
            let mut edges = self.edges.write();
            let (Some(dependencies), Some(dependents)) =
                (edges.dependencies.get(&system), edges.dependents.get(&system))
            else {
                return false;
            };
            let dependencies = sorted(dependencies);
            let dependents = sorted(dependents);

            for &dependent in &dependents {
                for &dependency in &dependencies {
                    if dependent == dependency {
                        continue;
                    }
                    if let Err(err) = edges.try_insert_edge(dependent, dependency) {
                        tracing::warn!(
                            %dependent,
                            %dependency,
                            error = %err,
                            "skipping transitive dependency while removing system {system}"
                        );
                    }
                }
            }

            for dependent in &dependents {
                if let Some(deps) = edges.dependencies.get_mut(dependent) {
                    deps.remove(&system);
                }
            }
            for dependency in &dependencies {
                if let Some(deps) = edges.dependents.get_mut(dependency) {
                    deps.remove(&system);
                }
            }
            edges.dependencies.remove(&system);
            edges.dependents.remove(&system);
        }

        self.changed();
        true
    }

    /// Execution levels, cached until the next mutation
    pub fn execution_levels(&self) -> Result<Arc<[ExecutionLevel]>> {
        if let Some(levels) = self.cached_levels.read().as_ref() {
            return Ok(Arc::clone(levels));
        }

        let cache = self.cached_levels.upgradable_read();
        if let Some(levels) = cache.as_ref() {
            return Ok(Arc::clone(levels));
        }

        let levels: Arc<[ExecutionLevel]> = compute_levels(&self.edges.read())?.into();
        let mut cache = RwLockUpgradableReadGuard::upgrade(cache);
        *cache = Some(Arc::clone(&levels));
        Ok(levels)
    }

    pub fn has_dependency(&self, dependent: SystemId, dependency: SystemId) -> bool {
        self.edges
            .read()
            .dependencies
            .get(&dependent)
            .is_some_and(|deps| deps.contains(&dependency))
    }

    /// Direct dependencies, ascending
    pub fn dependencies_of(&self, system: SystemId) -> Vec<SystemId> {
        self.edges
            .read()
            .dependencies
            .get(&system)
            .map(sorted)
            .unwrap_or_default()
    }

    /// Direct dependents, ascending
    pub fn dependents_of(&self, system: SystemId) -> Vec<SystemId> {
        self.edges
            .read()
            .dependents
            .get(&system)
            .map(sorted)
            .unwrap_or_default()
    }

    pub fn contains(&self, system: SystemId) -> bool {
        self.edges.read().dependencies.contains_key(&system)
    }

    pub fn len(&self) -> usize {
        self.edges.read().dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumped on every mutation
    pub fn revision(&self) -> u64 {
        self.revision.load(Ordering::Acquire)
    }

    /// Call `listener` after each mutation
    ///
    /// Listeners must not register further listeners from inside the callback.
    pub fn on_graph_changed<F>(&self, listener: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.listeners.write().push(Box::new(listener));
    }

    /// Human readable dump of the graph, one system per line
    pub fn describe(&self) -> String {
        let edges = self.edges.read();
        let mut systems: Vec<SystemId> = edges.dependencies.keys().copied().collect();
        systems.sort_unstable();

        let mut out = String::new();
        for system in systems {
            let _ = write!(out, "System {system}");
            if let Some(deps) = edges.dependencies.get(&system).filter(|deps| !deps.is_empty()) {
                let deps: Vec<String> = sorted(deps).iter().map(ToString::to_string).collect();
                let _ = write!(out, " depends on {}", deps.join(", "));
            }
            out.push('\n');
        }
        out
    }

    fn changed(&self) {
        *self.cached_levels.write() = None;
        let revision = self.revision.fetch_add(1, Ordering::AcqRel) + 1;
        tracing::trace!(revision, "system dependency graph changed");

        for listener in self.listeners.read().iter() {
            listener();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    fn ids(raw: &[u32]) -> Vec<SystemId> {
        raw.iter().copied().map(SystemId).collect()
    }

    #[test]
    fn test_levels_follow_dependencies() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        for id in 0..4 {
            graph.add_system(SystemId(id));
        }
        graph.add_dependency(SystemId(1), SystemId(0))?;
        graph.add_dependency(SystemId(2), SystemId(0))?;
        graph.add_dependency(SystemId(3), SystemId(1))?;
        graph.add_dependency(SystemId(3), SystemId(2))?;

        let levels = graph.execution_levels()?;
        let levels: Vec<Vec<SystemId>> = levels.iter().map(|l| l.systems.clone()).collect();
        assert_eq!(levels, vec![ids(&[0]), ids(&[1, 2]), ids(&[3])]);
        Ok(())
    }

    #[test]
    fn test_self_dependency_rejected() {
        let graph = SystemDependencyGraph::new();
        assert_eq!(
            graph.add_dependency(SystemId(1), SystemId(1)),
            Err(EcsError::SelfDependency(SystemId(1)))
        );
        assert!(graph.is_empty());
    }

    #[test]
    fn test_cycle_rejected_and_graph_unchanged() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        graph.add_dependency(SystemId(0), SystemId(1))?;
        graph.add_dependency(SystemId(1), SystemId(2))?;
        let before = graph.describe();
        let revision = graph.revision();

        let err = graph.add_dependency(SystemId(2), SystemId(0)).unwrap_err();
        match err {
            EcsError::CyclicDependency { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(graph.describe(), before);
        assert_eq!(graph.revision(), revision);
        assert!(!graph.has_dependency(SystemId(2), SystemId(0)));
        assert_eq!(graph.execution_levels()?.len(), 3);
        Ok(())
    }

    #[test]
    fn test_duplicate_edge_is_noop() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        graph.add_dependency(SystemId(1), SystemId(0))?;
        let revision = graph.revision();
        graph.add_dependency(SystemId(1), SystemId(0))?;
        assert_eq!(graph.revision(), revision);
        assert_eq!(graph.dependencies_of(SystemId(1)), ids(&[0]));
        Ok(())
    }

    #[test]
    fn test_remove_system_rewires_dependents() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        graph.add_dependency(SystemId(2), SystemId(1))?;
        graph.add_dependency(SystemId(1), SystemId(0))?;

        assert!(graph.remove_system(SystemId(1)));
        assert!(!graph.remove_system(SystemId(1)));
        assert!(graph.has_dependency(SystemId(2), SystemId(0)));
        assert_eq!(graph.dependents_of(SystemId(0)), ids(&[2]));
        assert!(!graph.contains(SystemId(1)));
        Ok(())
    }

    #[test]
    fn test_cache_invalidated_and_listeners_notified() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        graph.on_graph_changed(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        graph.add_system(SystemId(0));
        graph.add_system(SystemId(1));
        assert_eq!(graph.execution_levels()?.len(), 1);

        graph.add_dependency(SystemId(1), SystemId(0))?;
        assert_eq!(graph.execution_levels()?.len(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        Ok(())
    }

    #[test]
    fn test_cached_levels_are_shared() -> Result<()> {
        let graph = SystemDependencyGraph::new();
        graph.add_system(SystemId(0));
        let first = graph.execution_levels()?;
        let second = graph.execution_levels()?;
        assert!(Arc::ptr_eq(&first, &second));
        Ok(())
    }
}
