//! Bounds Analysis - Relation-Type Inference and Checking
//!
//! The analyzer works over two domains at once: a per-clause variable
//! environment mapping each variable to a bound expression, and a
//! per-predicate relation type (one `Rel` row, or a union of alternative
//! rows). Declared bounds constrain inference; predicates without bounds get
//! their relation types inferred from initial facts and rules.
//!
//! Inference over one clause is a breadth-first frontier search: a premise
//! with several feasible alternatives forks the state, and a meet that
//! yields the empty type prunes the branch. An empty frontier is a type
//! mismatch at that premise.
//!
//! Recursive predicates are handled with a `visiting` set: a predicate
//! re-entered during its own inference contributes an all-`Any` row, which
//! is sound because relation types are monotone in the environment.

use crate::ast::{Atom, Clause, Const, Decl, NamePath, Premise, PredicateSym, Term, WILDCARD};
use crate::builtin::{self, FnClass};
use crate::error::AnalysisError;
use crate::types::{
    meet, set_conforms, skolemize, type_of_const, upper_bound, FreshNameAllocator, NameTrie,
    TypeContext, TypeExpr,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// How typing findings are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BoundsCheckMode {
    /// Bounds analysis is skipped entirely
    None,
    /// Findings are logged, analysis succeeds
    Log,
    /// Findings are errors
    #[default]
    Error,
}

// ============================================================================
// Inference state
// ============================================================================

/// Variable environment for one branch of the frontier search. The type
/// context travels with the state so polymorphic refinements survive across
/// premises.
#[derive(Debug, Clone)]
struct InferState {
    vars: Vec<String>,
    types: Vec<TypeExpr>,
    ctx: TypeContext,
}

impl InferState {
    fn new() -> Self {
        InferState {
            vars: Vec::new(),
            types: Vec::new(),
            ctx: TypeContext::new(),
        }
    }

    fn lookup(&self, v: &str) -> Option<&TypeExpr> {
        self.vars.iter().position(|x| x == v).map(|i| &self.types[i])
    }

    /// Bind or refine a variable. Returns `false` when the meet with the
    /// existing binding is empty; the empty type is never a legal binding.
    fn add_or_refine(&mut self, v: &str, t: &TypeExpr) -> bool {
        if v == WILDCARD {
            return true;
        }
        if t.is_empty_type() {
            return false;
        }
        match self.vars.iter().position(|x| x == v) {
            Some(i) => {
                let refined = meet(&mut self.ctx, &self.types[i], t);
                if refined.is_empty_type() {
                    return false;
                }
                self.types[i] = refined;
                true
            }
            None => {
                self.vars.push(v.to_string());
                self.types.push(t.clone());
                true
            }
        }
    }

    /// Overwrite a binding without a meet (negative refinement).
    fn overwrite(&mut self, v: &str, t: TypeExpr) {
        if let Some(i) = self.vars.iter().position(|x| x == v) {
            self.types[i] = t;
        }
    }
}

// ============================================================================
// Analyzer
// ============================================================================

/// The bounds analyzer for one program. All internal state lives for one
/// analysis and is discarded afterwards.
pub struct BoundsAnalyzer<'a> {
    decls: &'a BTreeMap<PredicateSym, Decl>,
    rules: BTreeMap<PredicateSym, Vec<&'a Clause>>,
    facts: BTreeMap<PredicateSym, Vec<&'a Clause>>,
    clauses: &'a [Clause],
    trie: NameTrie,
    mode: BoundsCheckMode,
    declared: BTreeMap<PredicateSym, TypeExpr>,
    inferred: BTreeMap<PredicateSym, TypeExpr>,
    visiting: BTreeSet<PredicateSym>,
}

impl<'a> BoundsAnalyzer<'a> {
    /// Build an analyzer over rewritten clauses and collected declarations.
    pub fn new(
        decls: &'a BTreeMap<PredicateSym, Decl>,
        clauses: &'a [Clause],
        mode: BoundsCheckMode,
    ) -> Self {
        let mut rules: BTreeMap<PredicateSym, Vec<&Clause>> = BTreeMap::new();
        let mut facts: BTreeMap<PredicateSym, Vec<&Clause>> = BTreeMap::new();
        for clause in clauses {
            let bucket = if clause.is_fact() { &mut facts } else { &mut rules };
            bucket.entry(clause.head.pred.clone()).or_default().push(clause);
        }

        let mut trie = NameTrie::new();
        let mut declared = BTreeMap::new();
        for (sym, decl) in decls {
            if let Some(rel) = declared_rel_type(decl) {
                collect_prefixes(&rel, &mut trie);
                declared.insert(sym.clone(), rel);
            }
            if let Some(prefix) = decl.reflected_prefix() {
                trie.insert(prefix);
            }
        }

        BoundsAnalyzer {
            decls,
            rules,
            facts,
            clauses,
            trie,
            mode,
            declared,
            inferred: BTreeMap::new(),
            visiting: BTreeSet::new(),
        }
    }

    /// Run inference and conformance checking over the whole program.
    ///
    /// Typing findings respect the configured mode; interval-typing
    /// violations are always fatal.
    pub fn run(&mut self) -> Result<(), Vec<AnalysisError>> {
        if self.mode == BoundsCheckMode::None {
            return Ok(());
        }
        let mut typing: Vec<AnalysisError> = Vec::new();
        let mut fatal: Vec<AnalysisError> = Vec::new();

        // Initial facts must conform to their declarations.
        let fact_preds: Vec<PredicateSym> = self.facts.keys().cloned().collect();
        for sym in fact_preds {
            let Some(declared) = self.declared.get(&sym).cloned() else {
                continue;
            };
            let observations: Vec<(String, TypeExpr)> = self
                .facts
                .get(&sym)
                .into_iter()
                .flatten()
                .map(|clause| (clause.head.to_string(), self.observe_fact(&clause.head)))
                .collect();
            for (rendered, observation) in observations {
                if !set_conforms(&TypeContext::new(), &observation, &declared) {
                    typing.push(AnalysisError::FactTypeMismatch {
                        pred: sym.to_string(),
                        fact: rendered,
                    });
                }
            }
        }

        // Every rule is inferred and checked against its head declaration.
        let clauses: &'a [Clause] = self.clauses;
        for clause in clauses {
            if clause.is_fact() {
                continue;
            }
            let sym = clause.head.pred.clone();
            debug!(pred = %sym, "inferring clause types");
            match self.infer_clause(clause) {
                Ok(contribution) => {
                    if let Some(declared) = self.declared.get(&sym) {
                        if !set_conforms(&TypeContext::new(), &contribution, declared) {
                            typing.push(AnalysisError::DeclaredTypeMismatch {
                                pred: sym.to_string(),
                                inferred: contribution.to_string(),
                                declared: declared.to_string(),
                            });
                        }
                    }
                }
                Err(errors) => {
                    for error in errors {
                        if matches!(error, AnalysisError::IntervalNotTime { .. }) {
                            fatal.push(error);
                        } else {
                            typing.push(error);
                        }
                    }
                }
            }
        }

        match self.mode {
            BoundsCheckMode::None => Ok(()),
            BoundsCheckMode::Log => {
                for finding in &typing {
                    warn!(%finding, "bounds check");
                }
                if fatal.is_empty() {
                    Ok(())
                } else {
                    Err(fatal)
                }
            }
            BoundsCheckMode::Error => {
                fatal.extend(typing);
                if fatal.is_empty() {
                    Ok(())
                } else {
                    Err(fatal)
                }
            }
        }
    }

    /// The relation-type observation of one initial fact.
    fn observe_fact(&self, head: &Atom) -> TypeExpr {
        TypeExpr::Rel(
            head.args
                .iter()
                .map(|arg| match arg {
                    Term::Constant(c) => type_of_const(c, Some(&self.trie)),
                    _ => TypeExpr::Any,
                })
                .collect(),
        )
    }

    // ------------------------------------------------------------------
    // Per-clause inference
    // ------------------------------------------------------------------

    /// Infer the clause's contribution to its head predicate's relation
    /// type: the union over surviving end states of the head row.
    fn infer_clause(&mut self, clause: &Clause) -> Result<TypeExpr, Vec<AnalysisError>> {
        let rendered = clause.to_string();
        let mut initial = InferState::new();
        self.seed_head_inputs(clause, &mut initial);

        // Frontier search with pruning.
        let mut states = vec![initial];
        for premise in &clause.premises {
            let mut next: Vec<InferState> = Vec::new();
            for state in &states {
                next.extend(self.step(state, premise));
            }
            if next.is_empty() {
                return Err(vec![AnalysisError::TypeMismatch {
                    clause: rendered,
                    premise: premise.to_string(),
                }]);
            }
            states = next;
        }

        // Interval variables in the head annotation must be of type Time.
        if let Some(spec) = &clause.head_time {
            for v in spec.interval.variables() {
                let survivors: Vec<InferState> = states
                    .iter()
                    .filter_map(|state| {
                        let mut s = state.clone();
                        s.add_or_refine(v, &TypeExpr::Time).then_some(s)
                    })
                    .collect();
                if survivors.is_empty() {
                    return Err(vec![AnalysisError::IntervalNotTime {
                        var: v.to_string(),
                        clause: rendered,
                    }]);
                }
                states = survivors;
            }
        }

        // Let statements extend the environment.
        if let Some(transform) = &clause.transform {
            for stmt in &transform.statements {
                let Some(var) = &stmt.var else { continue };
                states = states
                    .into_iter()
                    .filter_map(|mut state| {
                        let t = self.check_fun_apply(&stmt.func.name, &stmt.args, &mut state);
                        (!t.is_empty_type() && state.add_or_refine(var, &t)).then_some(state)
                    })
                    .collect();
                if states.is_empty() {
                    return Err(vec![AnalysisError::TypeMismatch {
                        clause: rendered,
                        premise: stmt.to_string(),
                    }]);
                }
            }
        }

        let rows: Vec<TypeExpr> = states
            .iter()
            .map(|state| {
                TypeExpr::Rel(
                    clause
                        .head
                        .args
                        .iter()
                        .map(|arg| {
                            let mut scratch = state.clone();
                            self.bound_of_arg(arg, &mut scratch)
                        })
                        .collect(),
                )
            })
            .collect();
        Ok(TypeExpr::union_of(rows))
    }

    /// Seed head variables in `+` positions from the declared bounds,
    /// taking the union across alternatives.
    fn seed_head_inputs(&self, clause: &Clause, state: &mut InferState) {
        let Some(decl) = self.decls.get(&clause.head.pred) else {
            return;
        };
        let Some(modes) = decl.modes() else { return };
        let Some(declared) = self.declared.get(&clause.head.pred) else {
            return;
        };
        for (i, (arg, mode)) in clause.head.args.iter().zip(&modes).enumerate() {
            if *mode != crate::ast::ArgMode::Input {
                continue;
            }
            let Some(v) = arg.as_variable() else { continue };
            let position_union = TypeExpr::union_of(
                declared
                    .alternatives()
                    .iter()
                    .filter_map(|alt| match alt {
                        TypeExpr::Rel(parts) => parts.get(i).cloned(),
                        _ => None,
                    })
                    .collect(),
            );
            if !position_union.is_empty_type() {
                state.add_or_refine(v, &position_union);
            }
        }
    }

    /// Expand one premise: zero or more successor states.
    fn step(&mut self, state: &InferState, premise: &Premise) -> Vec<InferState> {
        match premise {
            Premise::Atom(atom) => self.step_atom(state, atom),
            Premise::NegAtom(atom) => self.step_neg_atom(state, atom),
            Premise::Eq(left, right) => self.step_eq(state, left, right),
            Premise::Ineq(left, right) => self.step_ineq(state, left, right),
            Premise::TemporalLiteral { atom, interval, .. } => {
                let successors = self.step_atom(state, atom);
                successors
                    .into_iter()
                    .filter_map(|mut s| {
                        for v in interval.variables() {
                            if !s.add_or_refine(v, &TypeExpr::Time) {
                                return None;
                            }
                        }
                        Some(s)
                    })
                    .collect()
            }
            Premise::TemporalAtom { atom, interval, .. } => {
                // Pre-normalization form; treated like its normalized shape.
                let successors = self.step_atom(state, atom);
                match interval {
                    None => successors,
                    Some(iv) => successors
                        .into_iter()
                        .filter_map(|mut s| {
                            for v in iv.variables() {
                                if !s.add_or_refine(v, &TypeExpr::Time) {
                                    return None;
                                }
                            }
                            Some(s)
                        })
                        .collect(),
                }
            }
        }
    }

    fn step_atom(&mut self, state: &InferState, atom: &Atom) -> Vec<InferState> {
        let alternatives = self.feasible_alternatives(state, atom);
        let mut successors = Vec::with_capacity(alternatives.len());
        'alts: for (row, ctx) in alternatives {
            let mut next = state.clone();
            next.ctx = ctx;
            for (arg, t) in atom.args.iter().zip(&row) {
                if let Some(v) = arg.as_variable() {
                    if !next.add_or_refine(v, t) {
                        continue 'alts;
                    }
                }
            }
            successors.push(next);
        }
        successors
    }

    /// Negated atoms bind nothing. `!:match_prefix(v, /prefix)` refines a
    /// union-typed binding by removing the prefix and its descendants.
    fn step_neg_atom(&mut self, state: &InferState, atom: &Atom) -> Vec<InferState> {
        if atom.pred.name == builtin::MATCH_PREFIX {
            if let [first, Term::Constant(Const::Name(prefix))] = atom.args.as_slice() {
                if let Some(v) = first.as_variable() {
                    return match refine_negative(state, v, prefix) {
                        Some(next) => vec![next],
                        None => Vec::new(),
                    };
                }
            }
        }
        // Alternatives are computed for their side effects on feasibility
        // diagnostics, but no variable is bound.
        let _ = self.feasible_alternatives(state, atom);
        vec![state.clone()]
    }

    fn step_eq(&mut self, state: &InferState, left: &Term, right: &Term) -> Vec<InferState> {
        let mut next = state.clone();
        let lb = self.bound_of_arg(left, &mut next);
        let rb = self.bound_of_arg(right, &mut next);
        let m = meet(&mut next.ctx, &lb, &rb);
        if m.is_empty_type() {
            return Vec::new();
        }
        for side in [left, right] {
            if let Some(v) = side.as_variable() {
                if !next.add_or_refine(v, &m) {
                    return Vec::new();
                }
            }
        }
        vec![next]
    }

    /// For inequality the meet is computed only to detect an impossible
    /// comparison; nothing is refined.
    fn step_ineq(&mut self, state: &InferState, left: &Term, right: &Term) -> Vec<InferState> {
        let mut scratch = state.clone();
        let lb = self.bound_of_arg(left, &mut scratch);
        let rb = self.bound_of_arg(right, &mut scratch);
        let m = meet(&mut scratch.ctx, &lb, &rb);
        if m.is_empty_type() {
            return Vec::new();
        }
        vec![state.clone()]
    }

    // ------------------------------------------------------------------
    // Feasible alternatives
    // ------------------------------------------------------------------

    /// The relation-type alternatives of a predicate that are consistent
    /// with the current argument bounds, with the type context each
    /// alternative refines.
    fn feasible_alternatives(
        &mut self,
        state: &InferState,
        atom: &Atom,
    ) -> Vec<(Vec<TypeExpr>, TypeContext)> {
        if let Some(special) = self.structural_builtin(state, atom) {
            return special;
        }

        let rel = if let Some(fixed) = builtin::comparison_rel_type(&atom.pred.name) {
            fixed
        } else if atom.pred.is_builtin() {
            // Remaining built-ins (`:match`) impose no constraints.
            TypeExpr::Rel(vec![TypeExpr::Any; atom.args.len()])
        } else {
            self.get_or_infer_rel_type(&atom.pred)
        };

        let actual = {
            let mut scratch = state.clone();
            TypeExpr::Rel(
                atom.args
                    .iter()
                    .map(|arg| self.bound_of_arg(arg, &mut scratch))
                    .collect(),
            )
        };

        let mut result = Vec::new();
        for alternative in rel.alternatives() {
            let mut ctx = state.ctx.clone();
            let mut alloc = FreshNameAllocator::avoiding(
                ctx.names().map(str::to_string).collect::<Vec<_>>(),
            );
            let (skolemized, _) = skolemize(alternative, &mut ctx, &mut alloc);
            let m = meet(&mut ctx, &actual, &skolemized);
            if let TypeExpr::Rel(parts) = m {
                result.push((parts, ctx));
            }
        }
        result
    }

    /// Structure-aware typing for `:list:member`, `:match_prefix`,
    /// `:match_entry`, `:match_field`, and `:match_cons`.
    fn structural_builtin(
        &mut self,
        state: &InferState,
        atom: &Atom,
    ) -> Option<Vec<(Vec<TypeExpr>, TypeContext)>> {
        let name = atom.pred.name.as_str();
        let mut scratch = state.clone();
        match name {
            ":list:member" => {
                let [elem, xs] = atom.args.as_slice() else {
                    return Some(Vec::new());
                };
                let xs_bound = self.bound_of_arg(xs, &mut scratch);
                let mut ctx = state.ctx.clone();
                let list = meet(&mut ctx, &xs_bound, &TypeExpr::list(TypeExpr::Any));
                let TypeExpr::List(e) = list else {
                    return Some(Vec::new());
                };
                let elem_bound = self.bound_of_arg(elem, &mut scratch);
                let refined = meet(&mut ctx, &e, &elem_bound);
                if refined.is_empty_type() {
                    return Some(Vec::new());
                }
                Some(vec![(vec![refined, TypeExpr::List(e)], ctx)])
            }
            ":match_prefix" => {
                let [x, prefix] = atom.args.as_slice() else {
                    return Some(Vec::new());
                };
                let Some(Const::Name(path)) = prefix.as_constant() else {
                    return Some(Vec::new());
                };
                let x_bound = self.bound_of_arg(x, &mut scratch);
                let mut ctx = state.ctx.clone();
                let m = meet(&mut ctx, &x_bound, &TypeExpr::NamePrefix(path.clone()));
                if m.is_empty_type() {
                    return Some(Vec::new());
                }
                Some(vec![(vec![m, TypeExpr::Name], ctx)])
            }
            ":match_entry" => {
                let [map, key, value] = atom.args.as_slice() else {
                    return Some(Vec::new());
                };
                let map_bound = self.bound_of_arg(map, &mut scratch);
                let mut ctx = state.ctx.clone();
                let m = meet(
                    &mut ctx,
                    &map_bound,
                    &TypeExpr::map(TypeExpr::Any, TypeExpr::Any),
                );
                let TypeExpr::Map(kt, vt) = m else {
                    return Some(Vec::new());
                };
                let key_refined = meet(&mut ctx, &kt, &self.bound_of_arg(key, &mut scratch));
                let value_refined = meet(&mut ctx, &vt, &self.bound_of_arg(value, &mut scratch));
                if key_refined.is_empty_type() || value_refined.is_empty_type() {
                    return Some(Vec::new());
                }
                Some(vec![(
                    vec![TypeExpr::Map(kt, vt), key_refined, value_refined],
                    ctx,
                )])
            }
            ":match_field" => {
                let [subject, field, value] = atom.args.as_slice() else {
                    return Some(Vec::new());
                };
                let Some(Const::Name(field_path)) = field.as_constant() else {
                    return Some(Vec::new());
                };
                let subject_bound = self.bound_of_arg(subject, &mut scratch);
                let TypeExpr::Struct(fields) = &subject_bound else {
                    return Some(Vec::new());
                };
                let Some((_, field_type)) = fields.iter().find(|(p, _)| p == field_path) else {
                    return Some(Vec::new());
                };
                let mut ctx = state.ctx.clone();
                let value_refined = meet(
                    &mut ctx,
                    field_type,
                    &self.bound_of_arg(value, &mut scratch),
                );
                if value_refined.is_empty_type() {
                    return Some(Vec::new());
                }
                Some(vec![(
                    vec![subject_bound.clone(), TypeExpr::Name, value_refined],
                    ctx,
                )])
            }
            ":match_cons" => {
                let [xs, head, tail] = atom.args.as_slice() else {
                    return Some(Vec::new());
                };
                let xs_bound = self.bound_of_arg(xs, &mut scratch);
                let mut ctx = state.ctx.clone();
                let list = meet(&mut ctx, &xs_bound, &TypeExpr::list(TypeExpr::Any));
                let TypeExpr::List(e) = list else {
                    return Some(Vec::new());
                };
                let head_refined = meet(&mut ctx, &e, &self.bound_of_arg(head, &mut scratch));
                let tail_refined = meet(
                    &mut ctx,
                    &TypeExpr::List(e.clone()),
                    &self.bound_of_arg(tail, &mut scratch),
                );
                if head_refined.is_empty_type() || tail_refined.is_empty_type() {
                    return Some(Vec::new());
                }
                Some(vec![(
                    vec![TypeExpr::List(e), head_refined, tail_refined],
                    ctx,
                )])
            }
            _ => None,
        }
    }

    // ------------------------------------------------------------------
    // Cross-predicate fixpoint
    // ------------------------------------------------------------------

    /// The relation type of a predicate: declared, memoized, a recursion
    /// sentinel, or freshly inferred.
    fn get_or_infer_rel_type(&mut self, sym: &PredicateSym) -> TypeExpr {
        if let Some(declared) = self.declared.get(sym) {
            return declared.clone();
        }
        if let Some(inferred) = self.inferred.get(sym) {
            return inferred.clone();
        }
        if self.visiting.contains(sym) {
            return TypeExpr::Rel(vec![TypeExpr::Any; sym.arity]);
        }
        self.visiting.insert(sym.clone());
        let result = self.infer_rel_type(sym);
        self.visiting.remove(sym);
        self.inferred.insert(sym.clone(), result.clone());
        result
    }

    /// Infer an undeclared predicate's relation type: seed alternatives
    /// from initial-fact observations, then accumulate novel alternatives
    /// from each defining rule.
    fn infer_rel_type(&mut self, sym: &PredicateSym) -> TypeExpr {
        let mut alternatives: Vec<TypeExpr> = Vec::new();
        let fact_rows: Vec<TypeExpr> = self
            .facts
            .get(sym)
            .into_iter()
            .flatten()
            .map(|clause| self.observe_fact(&clause.head))
            .collect();
        for row in fact_rows {
            if !alternatives.contains(&row) {
                alternatives.push(row);
            }
        }

        let defining: Vec<&Clause> = self.rules.get(sym).cloned().unwrap_or_default();
        for clause in defining {
            let Ok(contribution) = self.infer_clause(clause) else {
                // The clause's own top-level check reports the failure.
                continue;
            };
            let current = TypeExpr::union_of(alternatives.clone());
            for alt in contribution.alternatives() {
                let novel = current.is_empty_type()
                    || !set_conforms(&TypeContext::new(), alt, &current);
                if novel && !alternatives.contains(alt) {
                    alternatives.push(alt.clone());
                }
            }
        }

        if alternatives.is_empty() {
            return TypeExpr::Rel(vec![TypeExpr::Any; sym.arity]);
        }
        TypeExpr::union_of(alternatives)
    }

    // ------------------------------------------------------------------
    // Argument and function typing
    // ------------------------------------------------------------------

    /// The bound of a term under the current environment.
    fn bound_of_arg(&mut self, term: &Term, state: &mut InferState) -> TypeExpr {
        match term {
            Term::Variable(v) if v == WILDCARD => TypeExpr::Any,
            Term::Variable(v) => state.lookup(v).cloned().unwrap_or(TypeExpr::Any),
            Term::Constant(c) => type_of_const(c, Some(&self.trie)),
            Term::Apply(func, args) => self.check_fun_apply(&func.name, args, state),
        }
    }

    /// Unified function-application typing: validates argument types and
    /// returns the declared result type, or `Empty` on mismatch. Used both
    /// for function applications in premises and for transform statements.
    fn check_fun_apply(&mut self, name: &str, args: &[Term], state: &mut InferState) -> TypeExpr {
        let arg_bounds: Vec<TypeExpr> = args
            .iter()
            .map(|arg| self.bound_of_arg(arg, state))
            .collect();
        if arg_bounds.iter().any(TypeExpr::is_empty_type) {
            return TypeExpr::Empty;
        }

        match name {
            "fn:count" => return TypeExpr::Number,
            "fn:sum" => {
                let operand = arg_bounds.first().cloned().unwrap_or(TypeExpr::Empty);
                let mut scratch = state.ctx.clone();
                for numeric in [TypeExpr::Number, TypeExpr::Float64] {
                    if !meet(&mut scratch, &operand, &numeric).is_empty_type() {
                        return numeric;
                    }
                }
                return TypeExpr::Empty;
            }
            "fn:min" | "fn:max" => {
                return arg_bounds.first().cloned().unwrap_or(TypeExpr::Empty);
            }
            "fn:collect" | "fn:collect_distinct" => {
                let elem = arg_bounds
                    .iter()
                    .fold(TypeExpr::Bot, |acc, t| upper_bound(&acc, t));
                return TypeExpr::list(elem);
            }
            "fn:collect_to_map" => {
                let [k, v] = arg_bounds.as_slice() else {
                    return TypeExpr::Empty;
                };
                return TypeExpr::map(k.clone(), v.clone());
            }
            builtin::GROUP_BY => return TypeExpr::Any,
            _ => {}
        }

        let Some(class) = builtin::fn_class(name) else {
            return TypeExpr::Empty;
        };
        let all_meet = |expected: &TypeExpr, state: &mut InferState| {
            arg_bounds
                .iter()
                .all(|b| !meet(&mut state.ctx, b, expected).is_empty_type())
        };
        match class {
            FnClass::Arith => {
                if all_meet(&TypeExpr::Number, state) {
                    TypeExpr::Number
                } else {
                    TypeExpr::Empty
                }
            }
            FnClass::FloatArith => {
                if all_meet(&TypeExpr::Float64, state) {
                    TypeExpr::Float64
                } else {
                    TypeExpr::Empty
                }
            }
            FnClass::StringConcat => {
                if all_meet(&TypeExpr::String, state) {
                    TypeExpr::String
                } else {
                    TypeExpr::Empty
                }
            }
            FnClass::ListCtor => {
                let elem = arg_bounds
                    .iter()
                    .fold(TypeExpr::Bot, |acc, t| upper_bound(&acc, t));
                TypeExpr::list(elem)
            }
            FnClass::PairCtor => {
                let [a, b] = arg_bounds.as_slice() else {
                    return TypeExpr::Empty;
                };
                TypeExpr::Pair(Box::new(a.clone()), Box::new(b.clone()))
            }
            FnClass::TupleCtor => {
                if arg_bounds.len() < 3 {
                    return TypeExpr::Empty;
                }
                TypeExpr::Tuple(arg_bounds)
            }
            FnClass::MapCtor => {
                if arg_bounds.len() % 2 != 0 {
                    return TypeExpr::Empty;
                }
                let (mut key, mut value) = (TypeExpr::Bot, TypeExpr::Bot);
                for chunk in arg_bounds.chunks(2) {
                    key = upper_bound(&key, &chunk[0]);
                    value = upper_bound(&value, &chunk[1]);
                }
                TypeExpr::map(key, value)
            }
            FnClass::StructCtor => {
                if args.len() % 2 != 0 {
                    return TypeExpr::Empty;
                }
                let mut fields = Vec::with_capacity(args.len() / 2);
                for (i, chunk) in args.chunks(2).enumerate() {
                    let Some(path) = chunk[0].as_constant().and_then(Const::as_name) else {
                        return TypeExpr::Empty;
                    };
                    fields.push((path.clone(), arg_bounds[i * 2 + 1].clone()));
                }
                TypeExpr::struct_of(fields)
            }
        }
    }
}

/// Negative prefix refinement: a no-op on non-union bindings; on a union,
/// drops the prefix and its descendants. Rejects the state when the binding
/// equals the prefix exactly or the union empties out.
fn refine_negative(state: &InferState, v: &str, prefix: &NamePath) -> Option<InferState> {
    let Some(binding) = state.lookup(v) else {
        return Some(state.clone());
    };
    match binding {
        TypeExpr::NamePrefix(path) if path == prefix => None,
        TypeExpr::Union(members) => {
            let kept: Vec<TypeExpr> = members
                .iter()
                .filter(|member| !prefix_covers(prefix, member))
                .cloned()
                .collect();
            if kept.is_empty() {
                return None;
            }
            let mut next = state.clone();
            next.overwrite(v, TypeExpr::union_of(kept));
            Some(next)
        }
        _ => Some(state.clone()),
    }
}

/// Does removing `/prefix` remove this union member?
fn prefix_covers(prefix: &NamePath, member: &TypeExpr) -> bool {
    match member {
        TypeExpr::NamePrefix(path) => prefix.is_prefix_of(path),
        TypeExpr::Singleton(Const::Name(path)) => prefix.is_prefix_of(path),
        _ => false,
    }
}

/// The declared relation type of a predicate: one `Rel` row per bound
/// declaration, multiple declarations joined as a union. `None` when the
/// declaration carries no bounds.
pub fn declared_rel_type(decl: &Decl) -> Option<TypeExpr> {
    if decl.bounds.is_empty() {
        return None;
    }
    let rows: Vec<TypeExpr> = decl
        .bounds
        .iter()
        .filter_map(|bound| {
            let parts: Result<Vec<TypeExpr>, _> =
                bound.0.iter().map(TypeExpr::from_term).collect();
            parts.ok().map(TypeExpr::Rel)
        })
        .collect();
    if rows.is_empty() {
        return None;
    }
    Some(TypeExpr::union_of(rows))
}

/// Collect every name-prefix type mentioned by a type expression into the
/// trie.
fn collect_prefixes(expr: &TypeExpr, trie: &mut NameTrie) {
    match expr {
        TypeExpr::NamePrefix(path) => trie.insert(path),
        TypeExpr::Singleton(Const::Name(path)) => trie.insert(path),
        TypeExpr::List(t) | TypeExpr::Option(t) => collect_prefixes(t, trie),
        TypeExpr::Pair(a, b) | TypeExpr::Map(a, b) => {
            collect_prefixes(a, trie);
            collect_prefixes(b, trie);
        }
        TypeExpr::Tuple(ts) | TypeExpr::Union(ts) | TypeExpr::Rel(ts) => {
            for t in ts {
                collect_prefixes(t, trie);
            }
        }
        TypeExpr::Struct(fields) => {
            for (path, t) in fields {
                trie.insert(path);
                collect_prefixes(t, trie);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{AtomBuilder, ClauseBuilder, DeclBuilder};
    use crate::ast::{Clause, FunctionSym, Interval, TemporalSpec, TimeArg, Transform, TransformStmt};

    fn decl_map(decls: Vec<Decl>) -> BTreeMap<PredicateSym, Decl> {
        decls.into_iter().map(|d| (d.pred().clone(), d)).collect()
    }

    fn run(decls: Vec<Decl>, clauses: Vec<Clause>) -> Result<(), Vec<AnalysisError>> {
        let decls = decl_map(decls);
        let mut analyzer = BoundsAnalyzer::new(&decls, &clauses, BoundsCheckMode::Error);
        analyzer.run()
    }

    #[test]
    fn test_basic_conformance() {
        // foo(X) :- bar(X), X = 3. with foo, bar bound [/number].
        let decls = vec![
            DeclBuilder::new("foo").head_vars(["X"]).bound(["/number"]).build(),
            DeclBuilder::new("bar").head_vars(["X"]).bound(["/number"]).build(),
        ];
        let clause = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("bar", ["X"])
            .body_eq(Term::var("X"), Term::Constant(Const::Number(3)))
            .build();
        assert!(run(decls, vec![clause]).is_ok());
    }

    #[test]
    fn test_reject_string_into_number() {
        // foo(X) :- bar(X), X = 'hello'. with bar bound [/number].
        let decls = vec![
            DeclBuilder::new("foo").head_vars(["X"]).bound(["/number"]).build(),
            DeclBuilder::new("bar").head_vars(["X"]).bound(["/number"]).build(),
        ];
        let clause = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("bar", ["X"])
            .body_eq(
                Term::var("X"),
                Term::Constant(Const::String("hello".to_string())),
            )
            .build();
        let errors = run(decls, vec![clause]).expect_err("typing error");
        assert!(matches!(&errors[0], AnalysisError::TypeMismatch { premise, .. }
            if premise.contains("hello")));
    }

    #[test]
    fn test_union_decl_two_rules() {
        let foo = Decl::new(
            Atom::new("foo", vec![Term::var("X")]),
            vec![],
            vec![
                crate::ast::BoundDecl::new(vec![Term::Constant(Const::name("/string").expect("p"))]),
                crate::ast::BoundDecl::new(vec![Term::Constant(Const::name("/number").expect("p"))]),
            ],
        );
        let decls = vec![
            foo,
            DeclBuilder::new("bar").head_vars(["X"]).bound(["/string"]).build(),
            DeclBuilder::new("baz").head_vars(["X"]).bound(["/number"]).build(),
        ];
        let clauses = vec![
            ClauseBuilder::new("foo").head_vars(["X"]).body_atom("bar", ["X"]).build(),
            ClauseBuilder::new("foo").head_vars(["X"]).body_atom("baz", ["X"]).build(),
        ];
        assert!(run(decls, clauses).is_ok());
    }

    #[test]
    fn test_negated_match_prefix_refinement() {
        // boo: Union(/bar, /bazzz); foo(X) :- boo(X), !:match_prefix(X, /bazzz).
        let boo = DeclBuilder::new("boo")
            .head_vars(["X"])
            .bound_terms(vec![Term::Apply(
                FunctionSym::new("Union", -1),
                vec![
                    Term::Constant(Const::name("/bar").expect("p")),
                    Term::Constant(Const::name("/bazzz").expect("p")),
                ],
            )])
            .build();
        let foo = DeclBuilder::new("foo").head_vars(["X"]).bound(["/bar"]).build();
        let clause = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("boo", ["X"])
            .premise(Premise::NegAtom(
                AtomBuilder::new(":match_prefix").var("X").name("/bazzz").build(),
            ))
            .build();
        assert!(run(vec![boo, foo], vec![clause]).is_ok());
    }

    #[test]
    fn test_negated_match_prefix_exact_rejects() {
        let boo = DeclBuilder::new("boo").head_vars(["X"]).bound(["/bazzz"]).build();
        let clause = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("boo", ["X"])
            .premise(Premise::NegAtom(
                AtomBuilder::new(":match_prefix").var("X").name("/bazzz").build(),
            ))
            .build();
        let errors = run(vec![boo], vec![clause]).expect_err("no surviving state");
        assert!(matches!(&errors[0], AnalysisError::TypeMismatch { .. }));
    }

    #[test]
    fn test_interval_variable_must_be_time() {
        // p(1) @[S, _] :- q(S). with q bound [/string].
        let p = DeclBuilder::new("p").head_vars(["X"]).temporal().bound(["/any"]).build();
        let q = DeclBuilder::new("q").head_vars(["S"]).bound(["/string"]).build();
        let clause = Clause::new(
            Atom::new("p", vec![Term::Constant(Const::Number(1))]),
            vec![Premise::Atom(Atom::new("q", vec![Term::var("S")]))],
        )
        .with_head_time(TemporalSpec::over(Interval::new(
            TimeArg::Variable("S".to_string()),
            TimeArg::Variable(WILDCARD.to_string()),
        )));
        let errors = run(vec![p, q], vec![clause]).expect_err("interval typing");
        assert!(matches!(&errors[0], AnalysisError::IntervalNotTime { var, .. } if var == "S"));
    }

    #[test]
    fn test_fact_conformance() {
        let p = DeclBuilder::new("p").head_vars(["X"]).bound(["/number"]).build();
        let good = Clause::fact(Atom::new("p", vec![Term::Constant(Const::Number(1))]));
        assert!(run(vec![p.clone()], vec![good]).is_ok());

        let bad = Clause::fact(Atom::new(
            "p",
            vec![Term::Constant(Const::String("nope".to_string()))],
        ));
        let errors = run(vec![p], vec![bad]).expect_err("fact mismatch");
        assert!(matches!(&errors[0], AnalysisError::FactTypeMismatch { .. }));
    }

    #[test]
    fn test_inference_from_facts() {
        // bar is undeclared; its facts are numbers, so foo's declared
        // /number bound is satisfied.
        let foo = DeclBuilder::new("foo").head_vars(["X"]).bound(["/number"]).build();
        let fact = Clause::fact(Atom::new("bar", vec![Term::Constant(Const::Number(7))]));
        let rule = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("bar", ["X"])
            .build();
        assert!(run(vec![foo], vec![fact, rule]).is_ok());
    }

    #[test]
    fn test_inference_from_facts_mismatch() {
        let foo = DeclBuilder::new("foo").head_vars(["X"]).bound(["/number"]).build();
        let fact = Clause::fact(Atom::new(
            "bar",
            vec![Term::Constant(Const::String("s".to_string()))],
        ));
        let rule = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("bar", ["X"])
            .build();
        let errors = run(vec![foo], vec![fact, rule]).expect_err("mismatch");
        assert!(matches!(&errors[0], AnalysisError::DeclaredTypeMismatch { .. }));
    }

    #[test]
    fn test_recursive_predicate_inference_terminates() {
        let fact = Clause::fact(Atom::new(
            "edge",
            vec![
                Term::Constant(Const::Number(1)),
                Term::Constant(Const::Number(2)),
            ],
        ));
        let base = ClauseBuilder::new("path")
            .head_vars(["X", "Y"])
            .body_atom("edge", ["X", "Y"])
            .build();
        let step = ClauseBuilder::new("path")
            .head_vars(["X", "Z"])
            .body_atom("path", ["X", "Y"])
            .body_atom("edge", ["Y", "Z"])
            .build();
        assert!(run(vec![], vec![fact, base, step]).is_ok());
    }

    #[test]
    fn test_list_member_typing() {
        // xs: List(/number); p(E) :- xs(L), :list:member(E, L). p: /number.
        let xs = DeclBuilder::new("xs")
            .head_vars(["L"])
            .bound_terms(vec![Term::Apply(
                FunctionSym::new("List", 1),
                vec![Term::Constant(Const::name("/number").expect("p"))],
            )])
            .build();
        let p = DeclBuilder::new("p").head_vars(["E"]).bound(["/number"]).build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["E"])
            .body_atom("xs", ["L"])
            .body_atom(":list:member", ["E", "L"])
            .build();
        assert!(run(vec![xs, p], vec![clause]).is_ok());
    }

    #[test]
    fn test_list_member_non_list_rejected() {
        let xs = DeclBuilder::new("xs").head_vars(["L"]).bound(["/number"]).build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["E"])
            .body_atom("xs", ["L"])
            .body_atom(":list:member", ["E", "L"])
            .build();
        let errors = run(vec![xs], vec![clause]).expect_err("not a list");
        assert!(matches!(&errors[0], AnalysisError::TypeMismatch { .. }));
    }

    #[test]
    fn test_match_field_typing() {
        // s: Struct(/id, /number); p(V) :- s(S), :match_field(S, /id, V).
        let s = DeclBuilder::new("s")
            .head_vars(["S"])
            .bound_terms(vec![Term::Apply(
                FunctionSym::new("Struct", -1),
                vec![
                    Term::Constant(Const::name("/id").expect("p")),
                    Term::Constant(Const::name("/number").expect("p")),
                ],
            )])
            .build();
        let p = DeclBuilder::new("p").head_vars(["V"]).bound(["/number"]).build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["V"])
            .body_atom("s", ["S"])
            .premise(Premise::Atom(Atom::new(
                ":match_field",
                vec![
                    Term::var("S"),
                    Term::Constant(Const::name("/id").expect("p")),
                    Term::var("V"),
                ],
            )))
            .build();
        assert!(run(vec![s, p], vec![clause]).is_ok());
    }

    #[test]
    fn test_match_field_missing_field_rejected() {
        let s = DeclBuilder::new("s")
            .head_vars(["S"])
            .bound_terms(vec![Term::Apply(
                FunctionSym::new("Struct", -1),
                vec![
                    Term::Constant(Const::name("/id").expect("p")),
                    Term::Constant(Const::name("/number").expect("p")),
                ],
            )])
            .build();
        let clause = ClauseBuilder::new("p")
            .head_vars(["V"])
            .body_atom("s", ["S"])
            .premise(Premise::Atom(Atom::new(
                ":match_field",
                vec![
                    Term::var("S"),
                    Term::Constant(Const::name("/missing").expect("p")),
                    Term::var("V"),
                ],
            )))
            .build();
        let errors = run(vec![s], vec![clause]).expect_err("missing field");
        assert!(matches!(&errors[0], AnalysisError::TypeMismatch { .. }));
    }

    #[test]
    fn test_transform_arithmetic_over_strings_rejected() {
        // Unified check_fun_apply: fn:plus over a string operand fails even
        // inside a transform.
        let q = DeclBuilder::new("q").head_vars(["X"]).bound(["/string"]).build();
        let transform = Transform::new(vec![TransformStmt::let_stmt(
            "Y",
            FunctionSym::new("fn:plus", -1),
            vec![Term::var("X"), Term::Constant(Const::Number(1))],
        )]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["Y"])
            .body_atom("q", ["X"])
            .build()
            .with_transform(transform);
        let errors = run(vec![q], vec![clause]).expect_err("arith over strings");
        assert!(matches!(&errors[0], AnalysisError::TypeMismatch { .. }));
    }

    #[test]
    fn test_log_mode_collects_without_failing() {
        let foo = DeclBuilder::new("foo").head_vars(["X"]).bound(["/number"]).build();
        let bar = DeclBuilder::new("bar").head_vars(["X"]).bound(["/string"]).build();
        let clause = ClauseBuilder::new("foo")
            .head_vars(["X"])
            .body_atom("bar", ["X"])
            .build();
        let decls = decl_map(vec![foo, bar]);
        let clauses = vec![clause];
        let mut analyzer = BoundsAnalyzer::new(&decls, &clauses, BoundsCheckMode::Log);
        assert!(analyzer.run().is_ok());
        let mut analyzer = BoundsAnalyzer::new(&decls, &clauses, BoundsCheckMode::None);
        assert!(analyzer.run().is_ok());
    }

    #[test]
    fn test_polymorphic_alternative_shared_variable() {
        // pick: Rel(List(T), T). q(E) :- nums(L), pick(L, E). with
        // nums: List(/number), q declared /number.
        let pick = DeclBuilder::new("pick")
            .head_vars(["L", "E"])
            .bound_terms(vec![
                Term::Apply(FunctionSym::new("List", 1), vec![Term::var("T")]),
                Term::var("T"),
            ])
            .build();
        let nums = DeclBuilder::new("nums")
            .head_vars(["L"])
            .bound_terms(vec![Term::Apply(
                FunctionSym::new("List", 1),
                vec![Term::Constant(Const::name("/number").expect("p"))],
            )])
            .build();
        let q = DeclBuilder::new("q").head_vars(["E"]).bound(["/number"]).build();
        let clause = ClauseBuilder::new("q")
            .head_vars(["E"])
            .body_atom("nums", ["L"])
            .body_atom("pick", ["L", "E"])
            .build();
        assert!(run(vec![pick, nums, q], vec![clause]).is_ok());
    }

    #[test]
    fn test_name_constant_deepest_prefix() {
        // Declared prefix /foo; the fact /foo/bar/baz observes as /foo.
        let p = DeclBuilder::new("p").head_vars(["X"]).bound(["/foo"]).build();
        let fact = Clause::fact(Atom::new(
            "p",
            vec![Term::Constant(Const::name("/foo/bar/baz").expect("p"))],
        ));
        assert!(run(vec![p], vec![fact]).is_ok());
    }
}
