//! Dependency graph over one project's milestones.
//!
//! # Responsibility
//! - Index milestones by id and resolve dependency edges to positions.
//! - Produce a dependency-first order, or report the cycle that prevents one.
//! - Detect cycles and dangling references ahead of any mutation.
//!
//! # Invariants
//! - Traversal follows input order, so results are deterministic for a
//!   deterministic load order.
//! - Edges to ids absent from the input are dropped here; callers that care
//!   use `find_missing_dependencies`.

use crate::model::milestone::{Milestone, MilestoneId};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// A dependency cycle, as the ids along the loop with the first id repeated
/// at the end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError {
    pub path: Vec<MilestoneId>,
}

impl Display for CycleError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let rendered = self
            .path
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(" -> ");
        write!(f, "circular dependency: {rendered}")
    }
}

impl Error for CycleError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    Temporary,
    Done,
}

/// Adjacency view of a milestone slice.
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    milestones: &'a [Milestone],
    index: HashMap<MilestoneId, usize>,
    dependencies: Vec<Vec<usize>>,
    successors: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    pub fn build(milestones: &'a [Milestone]) -> Self {
        let index: HashMap<MilestoneId, usize> = milestones
            .iter()
            .enumerate()
            .map(|(position, milestone)| (milestone.uuid, position))
            .collect();

        let mut dependencies = vec![Vec::new(); milestones.len()];
        let mut successors = vec![Vec::new(); milestones.len()];
        for (position, milestone) in milestones.iter().enumerate() {
            for dep_id in &milestone.dependencies {
                let Some(&dep) = index.get(dep_id) else {
                    continue;
                };
                if dependencies[position].contains(&dep) {
                    continue;
                }
                dependencies[position].push(dep);
                successors[dep].push(position);
            }
        }

        Self {
            milestones,
            index,
            dependencies,
            successors,
        }
    }

    pub fn len(&self) -> usize {
        self.milestones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.milestones.is_empty()
    }

    pub fn position(&self, id: MilestoneId) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn milestone(&self, position: usize) -> &'a Milestone {
        &self.milestones[position]
    }

    /// Positions of the milestones `position` depends on.
    pub fn dependencies_of(&self, position: usize) -> &[usize] {
        &self.dependencies[position]
    }

    /// Positions of the milestones that depend on `position`.
    pub fn successors_of(&self, position: usize) -> &[usize] {
        &self.successors[position]
    }

    /// Dependency-first order of positions.
    ///
    /// # Errors
    /// Returns the first cycle met by the traversal. No partial order is
    /// ever returned.
    pub fn topological_order(&self) -> Result<Vec<usize>, CycleError> {
        let mut marks = vec![Mark::Unvisited; self.len()];
        let mut trail = Vec::new();
        let mut order = Vec::with_capacity(self.len());
        for position in 0..self.len() {
            self.visit(position, &mut marks, &mut trail, &mut order)?;
        }
        Ok(order)
    }

    fn visit(
        &self,
        position: usize,
        marks: &mut [Mark],
        trail: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), CycleError> {
        match marks[position] {
            Mark::Done => return Ok(()),
            Mark::Temporary => return Err(self.cycle_from(trail, position)),
            Mark::Unvisited => {}
        }

        marks[position] = Mark::Temporary;
        trail.push(position);
        for &dep in self.dependencies_of(position) {
            self.visit(dep, marks, trail, order)?;
        }
        trail.pop();
        marks[position] = Mark::Done;
        order.push(position);
        Ok(())
    }

    /// First cycle reachable in input order, if any.
    pub fn find_cycle(&self) -> Option<Vec<MilestoneId>> {
        let mut visited = vec![false; self.len()];
        let mut on_stack = vec![false; self.len()];
        let mut stack = Vec::new();
        for position in 0..self.len() {
            if visited[position] {
                continue;
            }
            if let Some(cycle) =
                self.search_cycle(position, &mut visited, &mut on_stack, &mut stack)
            {
                return Some(cycle.path);
            }
        }
        None
    }

    fn search_cycle(
        &self,
        position: usize,
        visited: &mut [bool],
        on_stack: &mut [bool],
        stack: &mut Vec<usize>,
    ) -> Option<CycleError> {
        visited[position] = true;
        on_stack[position] = true;
        stack.push(position);

        for &dep in self.dependencies_of(position) {
            if on_stack[dep] {
                return Some(self.cycle_from(stack, dep));
            }
            if !visited[dep] {
                if let Some(cycle) = self.search_cycle(dep, visited, on_stack, stack) {
                    return Some(cycle);
                }
            }
        }

        stack.pop();
        on_stack[position] = false;
        None
    }

    fn cycle_from(&self, stack: &[usize], closing: usize) -> CycleError {
        let start = stack
            .iter()
            .position(|&entry| entry == closing)
            .unwrap_or(0);
        let mut path: Vec<MilestoneId> = stack[start..]
            .iter()
            .map(|&entry| self.milestones[entry].uuid)
            .collect();
        path.push(self.milestones[closing].uuid);
        CycleError { path }
    }
}

/// Orders milestone ids so every dependency precedes its dependents.
///
/// # Errors
/// Returns `CycleError` when the dependency relation is cyclic.
pub fn topological_sort(milestones: &[Milestone]) -> Result<Vec<MilestoneId>, CycleError> {
    let graph = DependencyGraph::build(milestones);
    let order = graph.topological_order()?;
    Ok(order
        .into_iter()
        .map(|position| graph.milestone(position).uuid)
        .collect())
}

/// Returns the first dependency cycle found, as an id path.
pub fn find_cycle(milestones: &[Milestone]) -> Option<Vec<MilestoneId>> {
    DependencyGraph::build(milestones).find_cycle()
}

pub fn detect_circular_dependencies(milestones: &[Milestone]) -> bool {
    find_cycle(milestones).is_some()
}

/// Lists `(milestone, dependency)` pairs whose dependency id is not present
/// in `milestones`.
pub fn find_missing_dependencies(milestones: &[Milestone]) -> Vec<(MilestoneId, MilestoneId)> {
    let graph = DependencyGraph::build(milestones);
    milestones
        .iter()
        .flat_map(|milestone| {
            milestone
                .dependencies
                .iter()
                .filter(|dep| graph.position(**dep).is_none())
                .map(move |dep| (milestone.uuid, *dep))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{
        detect_circular_dependencies, find_cycle, find_missing_dependencies, topological_sort,
        DependencyGraph,
    };
    use crate::model::milestone::{Milestone, MilestoneId};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn chain(names: &[&str], edges: &[(usize, usize)]) -> Vec<Milestone> {
        let project = Uuid::new_v4();
        let mut milestones: Vec<Milestone> = names
            .iter()
            .map(|name| Milestone::new(project, *name))
            .collect();
        for &(from, to) in edges {
            let dep = milestones[to].uuid;
            milestones[from].dependencies.push(dep);
        }
        milestones
    }

    fn assert_dependency_first(milestones: &[Milestone], order: &[MilestoneId]) {
        let rank: HashMap<MilestoneId, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        assert_eq!(order.len(), milestones.len());
        for milestone in milestones {
            for dep in &milestone.dependencies {
                assert!(
                    rank[dep] < rank[&milestone.uuid],
                    "{} must follow its dependency",
                    milestone.name
                );
            }
        }
    }

    #[test]
    fn sort_places_dependencies_first() {
        // d -> b, d -> c, b -> a, c -> a; listed in reverse.
        let milestones = chain(&["d", "c", "b", "a"], &[(0, 2), (0, 1), (2, 3), (1, 3)]);
        let order = topological_sort(&milestones).expect("acyclic input should sort");
        assert_dependency_first(&milestones, &order);
        assert_eq!(order[0], milestones[3].uuid);
        assert_eq!(order[3], milestones[0].uuid);
    }

    #[test]
    fn sort_keeps_input_order_for_independent_nodes() {
        let milestones = chain(&["x", "y", "z"], &[]);
        let order = topological_sort(&milestones).unwrap();
        let expected: Vec<_> = milestones.iter().map(|m| m.uuid).collect();
        assert_eq!(order, expected);
    }

    #[test]
    fn sort_reports_cycle_instead_of_partial_order() {
        let milestones = chain(&["a", "b", "c"], &[(0, 1), (1, 2), (2, 0)]);
        let err = topological_sort(&milestones).unwrap_err();
        assert_eq!(err.path.first(), err.path.last());
        assert_eq!(err.path.len(), 4);
        assert!(err.to_string().starts_with("circular dependency"));
    }

    #[test]
    fn detect_finds_cycles_and_accepts_dags() {
        let dag = chain(&["a", "b", "c"], &[(1, 0), (2, 0), (2, 1)]);
        assert!(!detect_circular_dependencies(&dag));

        let cyclic = chain(&["a", "b", "c", "d"], &[(1, 0), (2, 1), (3, 2), (1, 3)]);
        assert!(detect_circular_dependencies(&cyclic));

        let cycle = find_cycle(&cyclic).unwrap();
        assert_eq!(cycle.first(), cycle.last());
        assert!(!cycle.contains(&cyclic[0].uuid));
    }

    #[test]
    fn detect_handles_empty_input() {
        assert!(!detect_circular_dependencies(&[]));
        assert!(topological_sort(&[]).unwrap().is_empty());
    }

    #[test]
    fn dangling_dependencies_are_ignored_by_sort_and_reported() {
        let mut milestones = chain(&["a", "b"], &[(1, 0)]);
        let ghost = Uuid::new_v4();
        milestones[0].dependencies.push(ghost);

        let order = topological_sort(&milestones).unwrap();
        assert_eq!(order, vec![milestones[0].uuid, milestones[1].uuid]);
        assert_eq!(
            find_missing_dependencies(&milestones),
            vec![(milestones[0].uuid, ghost)]
        );
    }

    #[test]
    fn graph_exposes_successors() {
        let milestones = chain(&["a", "b", "c"], &[(1, 0), (2, 0)]);
        let graph = DependencyGraph::build(&milestones);
        assert_eq!(graph.successors_of(0), &[1, 2]);
        assert!(graph.successors_of(1).is_empty());
        assert_eq!(graph.dependencies_of(2), &[0]);
    }
}
