//! Declaration Collection
//!
//! Merges declarations from all source units with host-supplied ambient
//! declarations, producing exactly one declaration per `(name, arity)`.
//! Predicates used or headed in a clause without a matching declaration get
//! a synthetic one; synthetic declarations of predicates used under a
//! non-eternal temporal annotation are tagged `maybeTemporal` and promoted
//! to `temporal` once all clauses are seen.

use crate::ast::{descr, Atom, Clause, Decl, Premise, PredicateSym, Term, TemporalSpec};
use crate::error::AnalysisError;
use std::collections::{BTreeMap, BTreeSet};

/// True for annotations that constrain time, i.e. anything but an eternal
/// `@`-interval.
pub fn is_non_eternal(spec: &TemporalSpec) -> bool {
    !(spec.op == crate::ast::IntervalOp::In && spec.interval.is_eternal())
}

/// Merge user and ambient declarations and synthesize the missing ones.
///
/// Returns the per-predicate declaration map, or every conflict found.
pub fn collect_decls(
    user_decls: &[Decl],
    extra_decls: &[Decl],
    clauses: &[Clause],
) -> Result<BTreeMap<PredicateSym, Decl>, Vec<AnalysisError>> {
    let mut errors = Vec::new();
    let mut merged: BTreeMap<PredicateSym, Decl> = BTreeMap::new();
    let mut user_claimed: BTreeSet<PredicateSym> = BTreeSet::new();

    // Ambient declarations seed the map; user declarations override them
    // when symbol and arity match.
    for decl in extra_decls {
        merged.insert(decl.pred().clone(), decl.clone());
    }

    for decl in user_decls {
        let sym = decl.pred().clone();
        // A same-name declaration at a different arity is a conflict.
        for existing in merged.keys() {
            if existing.name == sym.name && existing.arity != sym.arity {
                errors.push(AnalysisError::ArityConflict {
                    name: sym.name.clone(),
                    first: existing.arity,
                    second: sym.arity,
                });
            }
        }
        if user_claimed.contains(&sym) {
            errors.push(AnalysisError::MultipleDecls {
                pred: sym.to_string(),
            });
            continue;
        }
        merged.insert(sym.clone(), decl.clone());
        user_claimed.insert(sym);
    }

    if !errors.is_empty() {
        return Err(errors);
    }

    // Predicates used or headed without a declaration get a synthetic one.
    // Head clauses contribute their variable names.
    let mut temporally_used: BTreeSet<PredicateSym> = BTreeSet::new();
    for clause in clauses {
        let head_sym = clause.head.pred.clone();
        if !merged.contains_key(&head_sym) {
            merged.insert(head_sym.clone(), synthesize(&clause.head));
        }
        if clause.head_time.as_ref().is_some_and(is_non_eternal) {
            temporally_used.insert(head_sym);
        }
        for premise in &clause.premises {
            let (atom, temporal_use) = match premise {
                Premise::Atom(a) | Premise::NegAtom(a) => (a, false),
                Premise::TemporalAtom { atom, interval, .. } => (atom, interval.is_some()),
                Premise::TemporalLiteral { atom, .. } => (atom, true),
                Premise::Eq(_, _) | Premise::Ineq(_, _) => continue,
            };
            if atom.pred.is_builtin() {
                continue;
            }
            if !merged.contains_key(&atom.pred) {
                merged.insert(atom.pred.clone(), synthesize(atom));
            }
            if temporal_use {
                temporally_used.insert(atom.pred.clone());
            }
        }
    }

    for sym in temporally_used {
        if let Some(decl) = merged.get_mut(&sym) {
            if decl.synthetic && !decl.is_temporal() && !decl.is_maybe_temporal() {
                decl.descr.push(Atom::new(descr::MAYBE_TEMPORAL, vec![]));
            }
        }
    }

    // Promote every maybeTemporal to temporal.
    for decl in merged.values_mut() {
        let mut promoted = false;
        for atom in &mut decl.descr {
            if atom.pred.name == descr::MAYBE_TEMPORAL {
                *atom = Atom::new(descr::TEMPORAL, vec![]);
                promoted = true;
            }
        }
        if promoted {
            // Collapse a duplicate temporal() left behind by promotion.
            let mut seen_temporal = false;
            decl.descr.retain(|atom| {
                if atom.pred.name == descr::TEMPORAL {
                    if seen_temporal {
                        return false;
                    }
                    seen_temporal = true;
                }
                true
            });
        }
    }

    Ok(merged)
}

/// Build a synthetic declaration from an observed atom, preserving variable
/// names where the atom has them.
fn synthesize(atom: &Atom) -> Decl {
    let mut used: BTreeSet<String> = atom
        .args
        .iter()
        .filter_map(|t| t.as_variable().map(str::to_string))
        .collect();
    let args: Vec<Term> = atom
        .args
        .iter()
        .enumerate()
        .map(|(i, t)| match t.as_variable() {
            Some(v) => Term::var(v),
            None => {
                let mut idx = i;
                loop {
                    let candidate = format!("X{idx}");
                    if used.insert(candidate.clone()) {
                        return Term::var(candidate);
                    }
                    idx += 1;
                }
            }
        })
        .collect();
    Decl::synthetic(Atom {
        pred: atom.pred.clone(),
        args,
    })
}

/// Per-clause temporal consistency, checked once declarations are final:
///
/// - a clause whose head predicate is temporal must carry a head annotation;
/// - a clause whose head predicate is not temporal must not carry a
///   non-eternal one;
/// - temporal predicates may only be referenced under a temporal annotation;
/// - temporal annotations may only be applied to temporal predicates.
pub fn check_temporal_consistency(
    clauses: &[Clause],
    decls: &BTreeMap<PredicateSym, Decl>,
) -> Vec<AnalysisError> {
    let mut errors = Vec::new();
    let is_temporal =
        |sym: &PredicateSym| decls.get(sym).is_some_and(|d| d.is_temporal() || d.is_maybe_temporal());

    for clause in clauses {
        let rendered = clause.to_string();
        if is_temporal(&clause.head.pred) {
            if clause.head_time.is_none() {
                errors.push(AnalysisError::MissingTemporalAnnotation {
                    pred: clause.head.pred.to_string(),
                    clause: rendered.clone(),
                });
            }
        } else if clause.head_time.as_ref().is_some_and(is_non_eternal) {
            errors.push(AnalysisError::UnexpectedTemporalAnnotation {
                pred: clause.head.pred.to_string(),
                clause: rendered.clone(),
            });
        }

        for premise in &clause.premises {
            match premise {
                Premise::Atom(atom) | Premise::NegAtom(atom) => {
                    if is_temporal(&atom.pred) {
                        errors.push(AnalysisError::BareTemporalReference {
                            pred: atom.pred.to_string(),
                            clause: rendered.clone(),
                        });
                    }
                }
                Premise::TemporalAtom { atom, interval, .. } => {
                    if interval.is_some() && !is_temporal(&atom.pred) {
                        errors.push(AnalysisError::TemporalOverNonTemporal {
                            pred: atom.pred.to_string(),
                            clause: rendered.clone(),
                        });
                    }
                    if interval.is_none() && is_temporal(&atom.pred) {
                        errors.push(AnalysisError::BareTemporalReference {
                            pred: atom.pred.to_string(),
                            clause: rendered.clone(),
                        });
                    }
                }
                Premise::TemporalLiteral { atom, .. } => {
                    if !is_temporal(&atom.pred) {
                        errors.push(AnalysisError::TemporalOverNonTemporal {
                            pred: atom.pred.to_string(),
                            clause: rendered.clone(),
                        });
                    }
                }
                Premise::Eq(_, _) | Premise::Ineq(_, _) => {}
            }
        }
    }
    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ClauseBuilder, DeclBuilder};
    use crate::ast::{Interval, IntervalOp, TimeArg};

    #[test]
    fn test_synthesizes_missing_decls() {
        let clause = ClauseBuilder::new("reach")
            .head_vars(["X"])
            .body_atom("edge", ["X", "Y"])
            .build();
        let decls = collect_decls(&[], &[], &[clause]).expect("collect");
        assert!(decls.contains_key(&PredicateSym::new("reach", 1)));
        let edge = decls.get(&PredicateSym::new("edge", 2)).expect("edge");
        assert!(edge.synthetic);
    }

    #[test]
    fn test_synthetic_preserves_head_variable_names() {
        let clause = ClauseBuilder::new("reach")
            .head_vars(["From", "To"])
            .body_atom("edge", ["From", "To"])
            .build();
        let decls = collect_decls(&[], &[], &[clause]).expect("collect");
        let reach = decls.get(&PredicateSym::new("reach", 2)).expect("reach");
        let names: Vec<_> = reach
            .atom
            .args
            .iter()
            .filter_map(Term::as_variable)
            .collect();
        assert_eq!(names, vec!["From", "To"]);
    }

    #[test]
    fn test_user_decl_replaces_ambient() {
        let ambient = DeclBuilder::new("host").head_vars(["X"]).build();
        let user = DeclBuilder::new("host")
            .head_vars(["X"])
            .doc("overridden")
            .build();
        let decls = collect_decls(&[user], &[ambient], &[]).expect("collect");
        let host = decls.get(&PredicateSym::new("host", 1)).expect("host");
        assert!(host.doc().is_some());
    }

    #[test]
    fn test_duplicate_user_decl_rejected() {
        let first = DeclBuilder::new("p").head_vars(["X"]).build();
        let second = DeclBuilder::new("p").head_vars(["Y"]).build();
        let errors = collect_decls(&[first, second], &[], &[]).expect_err("conflict");
        assert!(matches!(errors[0], AnalysisError::MultipleDecls { .. }));
    }

    #[test]
    fn test_arity_conflict_rejected() {
        let first = DeclBuilder::new("p").head_vars(["X"]).build();
        let second = DeclBuilder::new("p").head_vars(["X", "Y"]).build();
        let errors = collect_decls(&[first, second], &[], &[]).expect_err("conflict");
        assert!(errors
            .iter()
            .any(|e| matches!(e, AnalysisError::ArityConflict { .. })));
    }

    #[test]
    fn test_temporal_use_promotes_synthetic_decl() {
        let interval = Interval::new(TimeArg::Variable("S".to_string()), TimeArg::Value(100));
        let clause = ClauseBuilder::new("q")
            .head_vars(["X"])
            .premise(Premise::TemporalAtom {
                atom: Atom::new("event", vec![Term::var("X")]),
                op: IntervalOp::In,
                interval: Some(interval),
            })
            .build();
        let decls = collect_decls(&[], &[], &[clause]).expect("collect");
        let event = decls.get(&PredicateSym::new("event", 1)).expect("event");
        assert!(event.is_temporal());
        assert!(!event.is_maybe_temporal());
    }

    #[test]
    fn test_missing_head_annotation_detected() {
        let decl = DeclBuilder::new("p").head_vars(["X"]).temporal().build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .build();
        let decls = collect_decls(&[decl], &[], std::slice::from_ref(&clause)).expect("collect");
        let errors = check_temporal_consistency(&[clause], &decls);
        assert!(matches!(
            errors[0],
            AnalysisError::MissingTemporalAnnotation { .. }
        ));
    }

    #[test]
    fn test_unexpected_head_annotation_detected() {
        // p has a user declaration without temporal(), so the annotation is
        // an error rather than a reason to synthesize a temporal decl.
        let decl = DeclBuilder::new("p").head_vars(["X"]).build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .build()
            .with_head_time(TemporalSpec::over(Interval::new(
                TimeArg::Value(0),
                TimeArg::Value(100),
            )));
        let decls = collect_decls(&[decl], &[], std::slice::from_ref(&clause)).expect("collect");
        let errors = check_temporal_consistency(&[clause], &decls);
        assert!(matches!(
            errors[0],
            AnalysisError::UnexpectedTemporalAnnotation { .. }
        ));
    }

    #[test]
    fn test_undeclared_temporal_head_synthesized() {
        // An undeclared head used with a temporal annotation becomes a
        // temporal predicate rather than an error.
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .build()
            .with_head_time(TemporalSpec::over(Interval::new(
                TimeArg::Value(0),
                TimeArg::Value(100),
            )));
        let decls = collect_decls(&[], &[], std::slice::from_ref(&clause)).expect("collect");
        let p = decls.get(&PredicateSym::new("p", 1)).expect("p");
        assert!(p.is_temporal());
        assert!(check_temporal_consistency(&[clause], &decls).is_empty());
    }

    #[test]
    fn test_bare_temporal_reference_detected() {
        let decl = DeclBuilder::new("event").head_vars(["X"]).temporal().build();
        let clause = ClauseBuilder::new("q")
            .head_vars(["X"])
            .body_atom("event", ["X"])
            .build();
        let decls = collect_decls(&[decl], &[], std::slice::from_ref(&clause)).expect("collect");
        let errors = check_temporal_consistency(&[clause], &decls);
        assert!(matches!(
            errors[0],
            AnalysisError::BareTemporalReference { .. }
        ));
    }
}
