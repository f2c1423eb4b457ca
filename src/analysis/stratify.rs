//! Stratification
//!
//! Builds the predicate dependency graph with positive/negative edges,
//! computes strongly connected components (Tarjan's algorithm), rejects
//! recursion through negation or aggregation, and layers the IDB into
//! strata. Negated relations and aggregation inputs must be fully computed
//! in a strictly lower stratum.

use crate::ast::{Clause, PredicateSym};
use crate::error::AnalysisError;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Type of dependency between predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyType {
    /// Head depends on the predicate via a positive premise; may share a
    /// stratum
    Positive,
    /// Head depends on the predicate via negation or aggregation; must be
    /// in a strictly lower stratum
    Negative,
}

/// Dependency graph over the program's predicates.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Map from predicate to its dependencies with edge types
    pub edges: BTreeMap<PredicateSym, Vec<(PredicateSym, DependencyType)>>,
    /// All predicates in the graph
    pub nodes: BTreeSet<PredicateSym>,
}

impl DependencyGraph {
    /// Build the graph from rewritten rules. IDB predicates carry edges to
    /// everything they depend on; referenced EDB predicates appear as leaf
    /// nodes so they land in the bottom stratum. A clause with a `group_by`
    /// transform aggregates over its body, so every body edge of that
    /// clause is negative.
    pub fn from_clauses(clauses: &[Clause]) -> Self {
        let mut graph = DependencyGraph::default();
        for clause in clauses {
            if clause.is_fact() {
                continue;
            }
            graph.nodes.insert(clause.head.pred.clone());
            let aggregating = clause
                .transform
                .as_ref()
                .is_some_and(|t| t.group_by().is_some());
            for premise in &clause.premises {
                let Some(dep) = premise.pred() else { continue };
                if dep.is_builtin() {
                    continue;
                }
                let edge_type = if premise.is_negated() || aggregating {
                    DependencyType::Negative
                } else {
                    DependencyType::Positive
                };
                graph.nodes.insert(dep.clone());
                graph
                    .edges
                    .entry(clause.head.pred.clone())
                    .or_default()
                    .push((dep.clone(), edge_type));
            }
        }
        graph
    }

    /// Dependencies of one predicate
    pub fn deps(&self, sym: &PredicateSym) -> &[(PredicateSym, DependencyType)] {
        self.edges.get(sym).map_or(&[], Vec::as_slice)
    }

    /// True when the predicate depends directly on itself
    pub fn has_self_loop(&self, sym: &PredicateSym) -> bool {
        self.deps(sym).iter().any(|(dep, _)| dep == sym)
    }

    /// Strongly connected components in completion order (dependencies
    /// before dependents), deterministic in predicate name order.
    pub fn sccs(&self) -> Vec<Vec<PredicateSym>> {
        Tarjan::new(self).run()
    }
}

/// Tarjan's strongly-connected-components algorithm.
struct Tarjan<'a> {
    graph: &'a DependencyGraph,
    index: usize,
    indices: HashMap<PredicateSym, usize>,
    lowlinks: HashMap<PredicateSym, usize>,
    on_stack: BTreeSet<PredicateSym>,
    stack: Vec<PredicateSym>,
    sccs: Vec<Vec<PredicateSym>>,
}

impl<'a> Tarjan<'a> {
    fn new(graph: &'a DependencyGraph) -> Self {
        Tarjan {
            graph,
            index: 0,
            indices: HashMap::new(),
            lowlinks: HashMap::new(),
            on_stack: BTreeSet::new(),
            stack: Vec::new(),
            sccs: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Vec<PredicateSym>> {
        let nodes: Vec<PredicateSym> = self.graph.nodes.iter().cloned().collect();
        for node in nodes {
            if !self.indices.contains_key(&node) {
                self.strongconnect(&node);
            }
        }
        self.sccs
    }

    fn strongconnect(&mut self, v: &PredicateSym) {
        self.indices.insert(v.clone(), self.index);
        self.lowlinks.insert(v.clone(), self.index);
        self.index += 1;
        self.stack.push(v.clone());
        self.on_stack.insert(v.clone());

        let deps: Vec<PredicateSym> =
            self.graph.deps(v).iter().map(|(dep, _)| dep.clone()).collect();
        for dep in deps {
            if !self.indices.contains_key(&dep) {
                self.strongconnect(&dep);
                let low = self.lowlinks[&dep].min(self.lowlinks[v]);
                self.lowlinks.insert(v.clone(), low);
            } else if self.on_stack.contains(&dep) {
                let low = self.indices[&dep].min(self.lowlinks[v]);
                self.lowlinks.insert(v.clone(), low);
            }
        }

        if self.lowlinks[v] == self.indices[v] {
            let mut component = Vec::new();
            while let Some(top) = self.stack.pop() {
                self.on_stack.remove(&top);
                let done = top == *v;
                component.push(top);
                if done {
                    break;
                }
            }
            component.sort();
            self.sccs.push(component);
        }
    }
}

/// The stratification result: strata in evaluation order plus the stratum
/// index of every IDB predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stratification {
    pub strata: Vec<Vec<PredicateSym>>,
    pub stratum_of: BTreeMap<PredicateSym, usize>,
}

/// Stratify the program. Rejects it when any strongly connected component
/// contains a negative edge.
pub fn stratify(clauses: &[Clause]) -> Result<Stratification, Vec<AnalysisError>> {
    let graph = DependencyGraph::from_clauses(clauses);
    let sccs = graph.sccs();

    let mut component_of: BTreeMap<&PredicateSym, usize> = BTreeMap::new();
    for (i, scc) in sccs.iter().enumerate() {
        for sym in scc {
            component_of.insert(sym, i);
        }
    }

    // A negative edge inside one component is recursion through negation
    // or aggregation.
    let mut errors = Vec::new();
    for scc in &sccs {
        for sym in scc {
            for (dep, edge_type) in graph.deps(sym) {
                if *edge_type == DependencyType::Negative
                    && component_of.get(dep) == component_of.get(sym)
                {
                    errors.push(AnalysisError::NotStratifiable {
                        pred: sym.to_string(),
                    });
                }
            }
        }
    }
    if !errors.is_empty() {
        return Err(errors);
    }

    // Components complete dependencies-first, so each component's level is
    // one past the deepest component it depends on.
    let mut levels = vec![0usize; sccs.len()];
    for (i, scc) in sccs.iter().enumerate() {
        let mut level = 0;
        for sym in scc {
            for (dep, _) in graph.deps(sym) {
                let j = component_of[dep];
                if j != i {
                    level = level.max(levels[j] + 1);
                }
            }
        }
        levels[i] = level;
    }

    let max_level = levels.iter().copied().max().unwrap_or(0);
    let mut strata: Vec<Vec<PredicateSym>> = vec![Vec::new(); max_level + 1];
    let mut stratum_of = BTreeMap::new();
    for (i, scc) in sccs.iter().enumerate() {
        for sym in scc {
            strata[levels[i]].push(sym.clone());
            stratum_of.insert(sym.clone(), levels[i]);
        }
    }
    for stratum in &mut strata {
        stratum.sort();
    }
    if graph.nodes.is_empty() {
        strata.clear();
    }

    Ok(Stratification { strata, stratum_of })
}
