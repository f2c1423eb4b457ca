//! Clause Rewriting
//!
//! Rewrites clauses under declaration information before the safety and
//! bounds passes run:
//!
//! 1. temporal normalization: `TemporalAtom` becomes `TemporalLiteral`, or a
//!    bare atom when no interval was written;
//! 2. reflect rewrite: calls to predicates declared `reflects(/prefix)`
//!    become `:match_prefix(arg0, /prefix)` goals when the argument is an
//!    input or already bound;
//! 3. negation delay: negated atoms move after the positive premises they
//!    were interleaved with, keeping the relative order of positives and of
//!    negatives. Negation is safe only when its free variables are bound.

use crate::ast::{ArgMode, Atom, Clause, Const, Decl, Premise, PredicateSym, Term};
use crate::builtin;
use std::collections::{BTreeMap, HashSet};

/// Rewrite one clause. Earlier artifacts are never mutated; the result is a
/// fresh clause.
pub fn rewrite_clause(clause: &Clause, decls: &BTreeMap<PredicateSym, Decl>) -> Clause {
    let normalized = normalize_temporal(&clause.premises);
    let reflected = reflect_prefixes(&normalized, decls);
    let delayed = delay_negations(reflected);
    Clause {
        head: clause.head.clone(),
        premises: delayed,
        transform: clause.transform.clone(),
        head_time: clause.head_time.clone(),
    }
}

/// `TemporalAtom` with an interval becomes `TemporalLiteral`; without one it
/// collapses to a bare atom (the temporal-consistency check rejects the
/// bare form when the inner predicate is temporal).
fn normalize_temporal(premises: &[Premise]) -> Vec<Premise> {
    premises
        .iter()
        .map(|premise| match premise {
            Premise::TemporalAtom {
                atom,
                op,
                interval: Some(interval),
            } => Premise::TemporalLiteral {
                atom: atom.clone(),
                op: *op,
                interval: interval.clone(),
            },
            Premise::TemporalAtom {
                atom,
                interval: None,
                ..
            } => Premise::Atom(atom.clone()),
            other => other.clone(),
        })
        .collect()
}

/// Rewrite calls to reflecting predicates into prefix-match goals.
fn reflect_prefixes(premises: &[Premise], decls: &BTreeMap<PredicateSym, Decl>) -> Vec<Premise> {
    let mut bound: HashSet<String> = HashSet::new();
    let mut result = Vec::with_capacity(premises.len());
    for premise in premises {
        let rewritten = match premise {
            Premise::Atom(atom) => match reflect_atom(atom, decls, &bound) {
                Some(goal) => Premise::Atom(goal),
                None => premise.clone(),
            },
            other => other.clone(),
        };
        collect_bound(&rewritten, &mut bound);
        result.push(rewritten);
    }
    result
}

fn reflect_atom(
    atom: &Atom,
    decls: &BTreeMap<PredicateSym, Decl>,
    bound: &HashSet<String>,
) -> Option<Atom> {
    let decl = decls.get(&atom.pred)?;
    let prefix = decl.reflected_prefix()?.clone();
    let first = atom.args.first()?;
    let input_mode = decl
        .modes()
        .and_then(|m| m.first().copied())
        .is_some_and(|m| m == ArgMode::Input);
    let already_bound = first
        .as_variable()
        .is_some_and(|v| bound.contains(v))
        || first.is_constant();
    if !input_mode && !already_bound {
        return None;
    }
    Some(Atom::new(
        builtin::MATCH_PREFIX,
        vec![first.clone(), Term::Constant(Const::Name(prefix))],
    ))
}

/// Variables a premise makes available to later reflect decisions.
fn collect_bound(premise: &Premise, bound: &mut HashSet<String>) {
    match premise {
        Premise::Atom(atom) | Premise::TemporalLiteral { atom, .. } => {
            bound.extend(atom.variables());
        }
        Premise::TemporalAtom { atom, .. } => {
            bound.extend(atom.variables());
        }
        Premise::Eq(left, right) => {
            // A variable equated to a ground term becomes available.
            if let (Some(v), true) = (left.as_variable(), right.ground()) {
                bound.insert(v.to_string());
            }
            if let (Some(v), true) = (right.as_variable(), left.ground()) {
                bound.insert(v.to_string());
            }
        }
        Premise::NegAtom(_) | Premise::Ineq(_, _) => {}
    }
}

/// Move negated atoms after the positive premises, keeping the relative
/// order of positives and of negatives.
fn delay_negations(premises: Vec<Premise>) -> Vec<Premise> {
    let (negated, rest): (Vec<Premise>, Vec<Premise>) =
        premises.into_iter().partition(Premise::is_negated);
    let mut result = rest;
    result.extend(negated);
    result
}
