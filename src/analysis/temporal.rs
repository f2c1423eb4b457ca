//! Temporal Recursion Checking
//!
//! Runs the same SCC computation as the stratifier, restricted to temporal
//! predicates, and produces severity-tagged warnings:
//!
//! - a self-recursive temporal predicate is a warning;
//! - mutual recursion through temporal predicates is critical;
//! - a future-operator premise whose literal is in the same component as
//!   the head is critical.
//!
//! Critical warnings are elevated to errors by the pipeline; the rest
//! accumulate in `ProgramInfo`.

use super::stratify::DependencyGraph;
use crate::ast::{Clause, Decl, Premise, PredicateSym};
use crate::error::TemporalWarning;
use std::collections::BTreeMap;

/// Inspect the rewritten rules for temporal recursion patterns.
pub fn check_temporal_recursion(
    clauses: &[Clause],
    decls: &BTreeMap<PredicateSym, Decl>,
) -> Vec<TemporalWarning> {
    let graph = DependencyGraph::from_clauses(clauses);
    let sccs = graph.sccs();
    let is_temporal = |sym: &PredicateSym| {
        decls
            .get(sym)
            .is_some_and(|d| d.is_temporal() || d.is_maybe_temporal())
    };

    let mut component_of: BTreeMap<&PredicateSym, usize> = BTreeMap::new();
    for (i, scc) in sccs.iter().enumerate() {
        for sym in scc {
            component_of.insert(sym, i);
        }
    }

    let mut warnings = Vec::new();
    for scc in &sccs {
        if scc.len() >= 2 {
            if let Some(sym) = scc.iter().find(|sym| is_temporal(sym)) {
                warnings.push(TemporalWarning::critical(format!(
                    "mutual recursion through temporal predicates involving {sym}"
                )));
            }
        } else if let Some(sym) = scc.first() {
            if graph.has_self_loop(sym) && is_temporal(sym) {
                warnings.push(TemporalWarning::warning(format!(
                    "self-recursive temporal predicate {sym}"
                )));
            }
        }
    }

    // Future operators inside a recursive component never converge.
    for clause in clauses {
        if clause.is_fact() {
            continue;
        }
        let head_component = component_of.get(&clause.head.pred);
        for premise in &clause.premises {
            let Premise::TemporalLiteral { atom, op, .. } = premise else {
                continue;
            };
            if !op.is_future() {
                continue;
            }
            if component_of.get(&atom.pred) == head_component && head_component.is_some() {
                warnings.push(TemporalWarning::critical(format!(
                    "future operator on {} in recursive temporal rule for {}",
                    atom.pred, clause.head.pred
                )));
            }
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ClauseBuilder, DeclBuilder};
    use crate::ast::{Atom, Interval, IntervalOp, Term, TimeArg};
    use crate::error::Severity;

    fn temporal_decl(name: &str, vars: &[&str]) -> (PredicateSym, Decl) {
        let decl = DeclBuilder::new(name)
            .head_vars(vars.iter().copied())
            .temporal()
            .build();
        (decl.pred().clone(), decl)
    }

    fn literal(name: &str, var: &str, op: IntervalOp) -> Premise {
        Premise::TemporalLiteral {
            atom: Atom::new(name, vec![Term::var(var)]),
            op,
            interval: Interval::new(TimeArg::Value(0), TimeArg::Value(100)),
        }
    }

    #[test]
    fn test_self_recursive_temporal_is_warning() {
        let (sym, decl) = temporal_decl("p", &["X"]);
        let decls = BTreeMap::from([(sym, decl)]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .premise(literal("p", "X", IntervalOp::In))
            .build();
        let warnings = check_temporal_recursion(&[clause], &decls);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].severity, Severity::Warning);
        assert!(warnings[0].message.contains("self-recursive"));
    }

    #[test]
    fn test_mutual_temporal_recursion_is_critical() {
        let (ps, pd) = temporal_decl("p", &["X"]);
        let (qs, qd) = temporal_decl("q", &["X"]);
        let decls = BTreeMap::from([(ps, pd), (qs, qd)]);
        let clauses = vec![
            ClauseBuilder::new("p")
                .head_vars(["X"])
                .premise(literal("q", "X", IntervalOp::In))
                .build(),
            ClauseBuilder::new("q")
                .head_vars(["X"])
                .premise(literal("p", "X", IntervalOp::In))
                .build(),
        ];
        let warnings = check_temporal_recursion(&clauses, &decls);
        assert!(warnings
            .iter()
            .any(|w| w.severity == Severity::Critical && w.message.contains("mutual recursion")));
    }

    #[test]
    fn test_future_operator_in_recursion_is_critical() {
        let (sym, decl) = temporal_decl("p", &["X"]);
        let decls = BTreeMap::from([(sym, decl)]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .premise(literal("p", "X", IntervalOp::FutureOpen))
            .build();
        let warnings = check_temporal_recursion(&[clause], &decls);
        assert!(warnings
            .iter()
            .any(|w| w.severity == Severity::Critical && w.message.contains("future operator")));
    }

    #[test]
    fn test_future_operator_outside_recursion_is_fine() {
        let (ps, pd) = temporal_decl("p", &["X"]);
        let (qs, qd) = temporal_decl("q", &["X"]);
        let decls = BTreeMap::from([(ps, pd), (qs, qd)]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .premise(literal("q", "X", IntervalOp::FutureClosed))
            .build();
        let warnings = check_temporal_recursion(&[clause], &decls);
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_non_temporal_recursion_silent() {
        let clause = ClauseBuilder::new("path")
            .head_vars(["X"])
            .body_atom("path", ["X"])
            .build();
        let warnings = check_temporal_recursion(&[clause], &BTreeMap::new());
        assert!(warnings.is_empty());
    }
}
