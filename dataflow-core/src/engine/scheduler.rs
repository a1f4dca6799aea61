//! Scheduling
//!
//! A scheduler turns the module/connection graph into an execution order in
//! which every module comes after all of its upstream producers.
//!
//! # Algorithm
//!
//! Both schedulers use Kahn's algorithm over the modules in scope:
//!
//! 1. Count, for each module, the incoming connections whose producer is also
//!    in scope
//! 2. Seed the ready set with every module whose count is zero
//! 3. Repeatedly take a ready module, append it to the order and decrement
//!    the counts of its consumers
//! 4. If modules remain with non-zero counts, they sit on or behind a cycle
//!
//! Ties are broken by the module's insertion index in the network, so the
//! same network always yields the same order. A cycle is reported as an
//! error without any partial order.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::error::SchedulingError;
use crate::network::{ModuleId, Network};

/// Total order in which a pass executes modules.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ModuleExecutionOrder {
    modules: Vec<ModuleId>,
}

impl ModuleExecutionOrder {
    pub fn new(modules: Vec<ModuleId>) -> Self {
        Self { modules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModuleId> {
        self.modules.iter()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Position of a module in the order.
    pub fn position(&self, id: &ModuleId) -> Option<usize> {
        self.modules.iter().position(|m| m == id)
    }

    pub fn contains(&self, id: &ModuleId) -> bool {
        self.position(id).is_some()
    }

    pub fn as_slice(&self) -> &[ModuleId] {
        &self.modules
    }
}

impl<'a> IntoIterator for &'a ModuleExecutionOrder {
    type Item = &'a ModuleId;
    type IntoIter = std::slice::Iter<'a, ModuleId>;

    fn into_iter(self) -> Self::IntoIter {
        self.modules.iter()
    }
}

/// Computes execution orders for a network.
pub trait Scheduler: Send + Sync {
    /// Order the modules accepted by `include`.
    fn schedule_subset(
        &self,
        network: &Network,
        include: &dyn Fn(&ModuleId) -> bool,
    ) -> Result<ModuleExecutionOrder, SchedulingError>;

    /// Order every module in the network.
    fn schedule(&self, network: &Network) -> Result<ModuleExecutionOrder, SchedulingError> {
        self.schedule_subset(network, &|_| true)
    }

    /// Order `start` and everything downstream of it. An unknown `start`
    /// yields an empty order.
    fn schedule_from(
        &self,
        network: &Network,
        start: &ModuleId,
    ) -> Result<ModuleExecutionOrder, SchedulingError> {
        if !network.contains_module(start) {
            return Ok(ModuleExecutionOrder::default());
        }
        let mut scope = network.downstream_closure(start);
        scope.insert(start.clone());
        self.schedule_subset(network, &|id| scope.contains(id))
    }
}

/// Kahn's algorithm with insertion-order tie-breaking.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialScheduler;

impl Scheduler for SerialScheduler {
    fn schedule_subset(
        &self,
        network: &Network,
        include: &dyn Fn(&ModuleId) -> bool,
    ) -> Result<ModuleExecutionOrder, SchedulingError> {
        let mut graph = ScopedGraph::build(network, include);
        let mut ready: BinaryHeap<Reverse<usize>> =
            graph.initial_ready().into_iter().map(Reverse).collect();
        let mut order = Vec::with_capacity(graph.len());

        while let Some(Reverse(index)) = ready.pop() {
            order.push(index);
            for next in graph.release(index) {
                ready.push(Reverse(next));
            }
        }

        graph.finish(network, order).map(ModuleExecutionOrder::new)
    }
}

/// Modules grouped into dependency levels.
///
/// Modules in one level have no connections between them; every producer of
/// a level-`k` module is in a level below `k`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParallelExecutionOrder {
    levels: Vec<Vec<ModuleId>>,
}

impl ParallelExecutionOrder {
    pub fn levels(&self) -> &[Vec<ModuleId>] {
        &self.levels
    }

    pub fn nlevels(&self) -> usize {
        self.levels.len()
    }

    /// Level index of a module.
    pub fn level_of(&self, id: &ModuleId) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(id))
    }

    /// Concatenate the levels into a serial order.
    pub fn flatten(&self) -> ModuleExecutionOrder {
        ModuleExecutionOrder::new(self.levels.iter().flatten().cloned().collect())
    }
}

/// Groups modules into dependency levels, then serializes level by level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LeveledScheduler;

impl LeveledScheduler {
    pub fn levels(&self, network: &Network) -> Result<ParallelExecutionOrder, SchedulingError> {
        self.levels_subset(network, &|_| true)
    }

    fn levels_subset(
        &self,
        network: &Network,
        include: &dyn Fn(&ModuleId) -> bool,
    ) -> Result<ParallelExecutionOrder, SchedulingError> {
        let mut graph = ScopedGraph::build(network, include);
        let mut current = graph.initial_ready();
        let mut levels = Vec::new();

        while !current.is_empty() {
            current.sort_unstable();
            let mut next = Vec::new();
            for &index in &current {
                next.extend(graph.release(index));
            }
            levels.push(std::mem::replace(&mut current, next));
        }

        let flat: Vec<usize> = levels.iter().flatten().copied().collect();
        graph.finish(network, flat)?;

        let levels = levels
            .into_iter()
            .map(|level| level.into_iter().map(|i| graph.id(network, i)).collect())
            .collect();
        Ok(ParallelExecutionOrder { levels })
    }
}

impl Scheduler for LeveledScheduler {
    fn schedule_subset(
        &self,
        network: &Network,
        include: &dyn Fn(&ModuleId) -> bool,
    ) -> Result<ModuleExecutionOrder, SchedulingError> {
        Ok(self.levels_subset(network, include)?.flatten())
    }
}

/// The in-scope part of a network, indexed by module insertion position.
struct ScopedGraph {
    in_degree: HashMap<usize, usize>,
    consumers: HashMap<usize, Vec<usize>>,
}

impl ScopedGraph {
    fn build(network: &Network, include: &dyn Fn(&ModuleId) -> bool) -> Self {
        let scope: HashSet<usize> = network
            .module_ids()
            .enumerate()
            .filter(|(_, id)| include(*id))
            .map(|(i, _)| i)
            .collect();

        let mut in_degree: HashMap<usize, usize> = scope.iter().map(|&i| (i, 0)).collect();
        let mut consumers: HashMap<usize, Vec<usize>> = HashMap::new();

        // Only count edges within the scope
        for connection in network.connections() {
            let (Some(from), Some(to)) = (
                network.index_of(connection.source()),
                network.index_of(connection.target()),
            ) else {
                continue;
            };
            if !scope.contains(&from) || !scope.contains(&to) {
                continue;
            }
            consumers.entry(from).or_default().push(to);
            if let Some(degree) = in_degree.get_mut(&to) {
                *degree += 1;
            }
        }

        Self {
            in_degree,
            consumers,
        }
    }

    fn len(&self) -> usize {
        self.in_degree.len()
    }

    fn initial_ready(&self) -> Vec<usize> {
        let mut ready: Vec<usize> = self
            .in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(&i, _)| i)
            .collect();
        ready.sort_unstable();
        ready
    }

    /// Mark `index` as scheduled; returns consumers that became ready.
    fn release(&mut self, index: usize) -> Vec<usize> {
        let mut ready = Vec::new();
        let Some(targets) = self.consumers.get(&index) else {
            return ready;
        };
        for &target in targets {
            if let Some(degree) = self.in_degree.get_mut(&target) {
                *degree = degree.saturating_sub(1);
                if *degree == 0 {
                    ready.push(target);
                }
            }
        }
        ready
    }

    fn id(&self, network: &Network, index: usize) -> ModuleId {
        network.module(index).id().clone()
    }

    /// Convert scheduled indices to ids, or report the unscheduled rest.
    fn finish(&self, network: &Network, order: Vec<usize>) -> Result<Vec<ModuleId>, SchedulingError> {
        if order.len() < self.len() {
            let scheduled: HashSet<usize> = order.into_iter().collect();
            let mut stuck: Vec<usize> = self
                .in_degree
                .keys()
                .copied()
                .filter(|i| !scheduled.contains(i))
                .collect();
            stuck.sort_unstable();
            let modules: Vec<ModuleId> = stuck.into_iter().map(|i| self.id(network, i)).collect();
            debug!(unscheduled = modules.len(), "scheduling stopped at a cycle");
            return Err(SchedulingError::NetworkHasCycles { modules });
        }

        let ids: Vec<ModuleId> = order.into_iter().map(|i| self.id(network, i)).collect();
        debug!(modules = ids.len(), "computed execution order");
        Ok(ids)
    }
}
