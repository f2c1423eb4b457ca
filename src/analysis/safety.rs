//! Clause Safety Checking
//!
//! Range restriction under modes: every variable used in the head, in a
//! negated premise, in a constraint, or in a transform must be bound by the
//! positive body. Modes refine what "bound" means: `+` positions are inputs
//! that must already be bound, `-`/`?` positions bind their variables, and
//! built-in outputs bind only once the built-in's inputs are bound.
//!
//! Variables equated through `Eq(v1, v2)` share boundness through a small
//! union-find rebuilt per clause.

use crate::ast::{
    ArgMode, Atom, Clause, Decl, Premise, PredicateSym, Term, WILDCARD,
};
use crate::builtin;
use crate::error::AnalysisError;
use std::collections::{BTreeMap, HashMap, HashSet};

// ============================================================================
// Union-find over variable names
// ============================================================================

/// Parent-pointer union-find keyed by variable name, rebuilt per clause.
#[derive(Debug, Default)]
struct UnionFind {
    parent: HashMap<String, String>,
}

impl UnionFind {
    fn find(&mut self, v: &str) -> String {
        let parent = match self.parent.get(v) {
            Some(p) => p.clone(),
            None => return v.to_string(),
        };
        if parent == v {
            return parent;
        }
        let root = self.find(&parent);
        self.parent.insert(v.to_string(), root.clone());
        root
    }

    fn union(&mut self, a: &str, b: &str) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent.insert(ra, rb);
        }
    }
}

/// Boundness state for one clause: equivalence classes plus the set of
/// bound class representatives.
#[derive(Debug, Default)]
struct BoundState {
    uf: UnionFind,
    bound: HashSet<String>,
}

impl BoundState {
    fn bind(&mut self, v: &str) -> bool {
        if v == WILDCARD {
            return false;
        }
        let root = self.uf.find(v);
        self.bound.insert(root)
    }

    fn is_bound(&mut self, v: &str) -> bool {
        if v == WILDCARD {
            return true;
        }
        let root = self.uf.find(v);
        self.bound.contains(&root)
    }

    fn equate(&mut self, a: &str, b: &str) -> bool {
        let ra = self.uf.find(a);
        let rb = self.uf.find(b);
        if ra == rb {
            return false;
        }
        let was_bound = self.bound.remove(&ra) | self.bound.remove(&rb);
        self.uf.union(a, b);
        if was_bound {
            let root = self.uf.find(a);
            self.bound.insert(root);
        }
        true
    }

    /// All free variables of the term are bound (constants trivially so)
    fn term_bound(&mut self, term: &Term) -> bool {
        term.variables().iter().all(|v| self.is_bound(v))
    }
}

// ============================================================================
// Clause checking
// ============================================================================

/// Check one clause for safety, transform well-formedness, visibility, and
/// function-application arity. Returns every diagnostic found.
pub fn check_clause(clause: &Clause, decls: &BTreeMap<PredicateSym, Decl>) -> Vec<AnalysisError> {
    let mut errors = Vec::new();
    let rendered = clause.to_string();

    check_function_applications(clause, &mut errors);
    check_visibility(clause, decls, &mut errors);
    check_builtin_arities(clause, &mut errors);

    let mut state = BoundState::default();
    seed_head_inputs(clause, decls, &mut state);
    propagate(clause, decls, &mut state);
    check_required_bound(clause, decls, &rendered, &mut state, &mut errors);
    if let Some(transform) = &clause.transform {
        check_transform(transform, &rendered, &mut state, &mut errors);
    }

    errors
}

/// Head variables in positions whose unified mode is `+` are pre-bound.
fn seed_head_inputs(clause: &Clause, decls: &BTreeMap<PredicateSym, Decl>, state: &mut BoundState) {
    let Some(decl) = decls.get(&clause.head.pred) else {
        return;
    };
    let Some(modes) = decl.modes() else {
        return;
    };
    for (arg, mode) in clause.head.args.iter().zip(&modes) {
        if *mode == ArgMode::Input {
            if let Some(v) = arg.as_variable() {
                state.bind(v);
            }
        }
    }
}

/// Run the left-to-right binding rules to a fixpoint. Built-in outputs wait
/// for their inputs, so one pass is not always enough.
fn propagate(clause: &Clause, decls: &BTreeMap<PredicateSym, Decl>, state: &mut BoundState) {
    loop {
        let mut changed = false;
        for premise in &clause.premises {
            match premise {
                Premise::Atom(atom) => {
                    changed |= bind_positive_atom(atom, decls, state);
                }
                Premise::TemporalAtom { atom, interval, .. } => {
                    changed |= bind_positive_atom(atom, decls, state);
                    if let Some(iv) = interval {
                        for v in iv.variables() {
                            changed |= state.bind(v);
                        }
                    }
                }
                Premise::TemporalLiteral { atom, interval, .. } => {
                    changed |= bind_positive_atom(atom, decls, state);
                    for v in interval.variables() {
                        changed |= state.bind(v);
                    }
                }
                Premise::Eq(left, right) => {
                    changed |= bind_equality(left, right, state);
                }
                Premise::NegAtom(_) | Premise::Ineq(_, _) => {}
            }
        }
        if !changed {
            break;
        }
    }
}

fn bind_positive_atom(
    atom: &Atom,
    decls: &BTreeMap<PredicateSym, Decl>,
    state: &mut BoundState,
) -> bool {
    let modes = if atom.pred.is_builtin() {
        builtin::builtin_modes(&atom.pred)
    } else {
        decls.get(&atom.pred).and_then(Decl::modes)
    };
    let mut changed = false;
    match modes {
        None => {
            // No mode declaration: every argument position binds.
            for arg in &atom.args {
                for v in arg.variables() {
                    changed |= state.bind(&v);
                }
            }
        }
        Some(modes) => {
            // Output positions bind only once every input is bound.
            let inputs_bound = atom
                .args
                .iter()
                .zip(&modes)
                .filter(|(_, m)| **m == ArgMode::Input)
                .all(|(arg, _)| state.term_bound(arg));
            if inputs_bound {
                for (arg, mode) in atom.args.iter().zip(&modes) {
                    if matches!(mode, ArgMode::Output | ArgMode::InputOutput) {
                        for v in arg.variables() {
                            changed |= state.bind(&v);
                        }
                    }
                }
            }
        }
    }
    changed
}

fn bind_equality(left: &Term, right: &Term, state: &mut BoundState) -> bool {
    // Two plain variables: unify their classes.
    if let (Some(a), Some(b)) = (left.as_variable(), right.as_variable()) {
        let a = a.to_string();
        let b = b.to_string();
        return state.equate(&a, &b);
    }
    let mut changed = false;
    // A variable equated to a constant, a bound variable, or a function
    // application over bound variables becomes bound.
    if let Some(v) = left.as_variable() {
        let v = v.to_string();
        if state.term_bound(right) {
            changed |= state.bind(&v);
        }
    }
    if let Some(v) = right.as_variable() {
        let v = v.to_string();
        if state.term_bound(left) {
            changed |= state.bind(&v);
        }
    }
    changed
}

/// Everything that must be bound once propagation settles: head variables,
/// head-time interval variables, negated-premise variables, constraint
/// variables, and declared input positions.
fn check_required_bound(
    clause: &Clause,
    decls: &BTreeMap<PredicateSym, Decl>,
    rendered: &str,
    state: &mut BoundState,
    errors: &mut Vec<AnalysisError>,
) {
    let mut report = |var: &str, errors: &mut Vec<AnalysisError>| {
        errors.push(AnalysisError::UnboundVariable {
            var: var.to_string(),
            clause: rendered.to_string(),
        });
    };

    // Variables a transform introduces count as bound for the head.
    let transform_defined: HashSet<&str> = clause
        .transform
        .as_ref()
        .map(|t| t.let_variables().into_iter().collect())
        .unwrap_or_default();

    // Head arguments. A wildcard in the head can never be bound.
    for arg in &clause.head.args {
        if arg.is_wildcard() && !clause.is_fact() {
            report(WILDCARD, errors);
            continue;
        }
        for v in sorted(arg.variables()) {
            if !state.is_bound(&v) && !transform_defined.contains(v.as_str()) && !clause.is_fact()
            {
                report(&v, errors);
            }
        }
    }

    if let Some(spec) = &clause.head_time {
        for v in spec.interval.variables() {
            if !state.is_bound(v) {
                report(v, errors);
            }
        }
    }

    for premise in &clause.premises {
        match premise {
            Premise::NegAtom(atom) => {
                for v in sorted(atom.variables()) {
                    if !state.is_bound(&v) {
                        report(&v, errors);
                    }
                }
            }
            Premise::Ineq(left, right) => {
                for term in [left, right] {
                    for v in sorted(term.variables()) {
                        if !state.is_bound(&v) {
                            report(&v, errors);
                        }
                    }
                }
            }
            Premise::Eq(left, right) => {
                // Function-application inputs must be bound.
                for term in [left, right] {
                    if matches!(term, Term::Apply(_, _)) {
                        for v in sorted(term.variables()) {
                            if !state.is_bound(&v) {
                                report(&v, errors);
                            }
                        }
                    }
                }
            }
            Premise::Atom(atom)
            | Premise::TemporalAtom { atom, .. }
            | Premise::TemporalLiteral { atom, .. } => {
                // Declared input positions must be bound.
                let modes = if atom.pred.is_builtin() {
                    builtin::builtin_modes(&atom.pred)
                } else {
                    decls.get(&atom.pred).and_then(Decl::modes)
                };
                if let Some(modes) = modes {
                    for (arg, mode) in atom.args.iter().zip(&modes) {
                        if *mode == ArgMode::Input {
                            for v in sorted(arg.variables()) {
                                if !state.is_bound(&v) {
                                    report(&v, errors);
                                }
                            }
                        }
                    }
                }
            }
        }
    }
}

fn sorted(vars: HashSet<String>) -> Vec<String> {
    let mut v: Vec<String> = vars.into_iter().collect();
    v.sort();
    v
}

// ============================================================================
// Transforms
// ============================================================================

fn check_transform(
    transform: &crate::ast::Transform,
    rendered: &str,
    state: &mut BoundState,
    errors: &mut Vec<AnalysisError>,
) {
    let malformed = |message: String, errors: &mut Vec<AnalysisError>| {
        errors.push(AnalysisError::MalformedTransform {
            clause: rendered.to_string(),
            message,
        });
    };

    let group_by = transform.group_by();
    let mut defined: HashSet<String> = HashSet::new();
    if let Some(gb) = group_by {
        for arg in &gb.args {
            match arg.as_variable() {
                Some(v) => {
                    if !state.is_bound(v) {
                        errors.push(AnalysisError::UnboundVariable {
                            var: v.to_string(),
                            clause: rendered.to_string(),
                        });
                    }
                    defined.insert(v.to_string());
                }
                None => malformed(format!("group_by argument {arg} is not a variable"), errors),
            }
        }
    }

    for (i, stmt) in transform.statements.iter().enumerate() {
        if i == 0 && group_by.is_some() {
            continue;
        }
        let Some(var) = &stmt.var else {
            malformed(format!("do {} is only allowed as a leading group_by", stmt.func), errors);
            continue;
        };
        if var == WILDCARD {
            malformed("transform variable is the wildcard".to_string(), errors);
            continue;
        }
        // A transform variable must not shadow a body variable.
        if state.is_bound(var) {
            errors.push(AnalysisError::TransformShadowsVariable {
                var: var.clone(),
                clause: rendered.to_string(),
            });
        }
        if defined.contains(var) {
            malformed(format!("transform variable {var} defined twice"), errors);
        }

        let is_reducer = builtin::is_reducer(&stmt.func.name);
        if is_reducer && group_by.is_none() {
            malformed(
                format!("reducer {} outside a group_by transform", stmt.func),
                errors,
            );
        }
        if stmt.func.name == builtin::GROUP_BY {
            malformed("group_by is only allowed as the leading statement".to_string(), errors);
        }

        // Statement arguments draw on body variables, group keys, and
        // variables defined earlier in the transform.
        for v in sorted(stmt.arg_variables()) {
            if !state.is_bound(&v) && !defined.contains(&v) {
                errors.push(AnalysisError::UnboundVariable {
                    var: v,
                    clause: rendered.to_string(),
                });
            }
        }
        defined.insert(var.clone());
    }
}

// ============================================================================
// Function applications, visibility, built-in arity
// ============================================================================

fn check_function_applications(clause: &Clause, errors: &mut Vec<AnalysisError>) {
    let mut visit = |term: &Term, errors: &mut Vec<AnalysisError>| {
        visit_applies(term, errors);
    };
    for premise in &clause.premises {
        match premise {
            Premise::Eq(l, r) | Premise::Ineq(l, r) => {
                visit(l, errors);
                visit(r, errors);
            }
            Premise::Atom(atom)
            | Premise::NegAtom(atom)
            | Premise::TemporalAtom { atom, .. }
            | Premise::TemporalLiteral { atom, .. } => {
                for arg in &atom.args {
                    visit(arg, errors);
                }
            }
        }
    }
    for arg in &clause.head.args {
        visit(arg, errors);
    }
    if let Some(transform) = &clause.transform {
        for stmt in &transform.statements {
            if !builtin::function_arity_ok(&stmt.func.name, stmt.args.len()) {
                if builtin::function_arity(&stmt.func.name).is_none() {
                    errors.push(AnalysisError::UnknownFunction {
                        name: stmt.func.name.clone(),
                    });
                } else {
                    errors.push(AnalysisError::FunctionArity {
                        name: stmt.func.name.clone(),
                        got: stmt.args.len(),
                    });
                }
            }
            for arg in &stmt.args {
                visit(arg, errors);
            }
        }
    }
}

fn visit_applies(term: &Term, errors: &mut Vec<AnalysisError>) {
    if let Term::Apply(func, args) = term {
        match builtin::function_arity(&func.name) {
            None => errors.push(AnalysisError::UnknownFunction {
                name: func.name.clone(),
            }),
            Some(_) => {
                if !builtin::function_arity_ok(&func.name, args.len()) {
                    errors.push(AnalysisError::FunctionArity {
                        name: func.name.clone(),
                        got: args.len(),
                    });
                }
                // Map and struct constructors pair keys with values.
                if matches!(func.name.as_str(), "fn:map" | "fn:struct") && args.len() % 2 != 0 {
                    errors.push(AnalysisError::FunctionArity {
                        name: func.name.clone(),
                        got: args.len(),
                    });
                }
            }
        }
        for arg in args {
            visit_applies(arg, errors);
        }
    }
}

fn check_visibility(
    clause: &Clause,
    decls: &BTreeMap<PredicateSym, Decl>,
    errors: &mut Vec<AnalysisError>,
) {
    let package = clause.head.pred.package().to_string();
    for premise in &clause.premises {
        let Some(pred) = premise.pred() else { continue };
        if pred.is_builtin() || pred.package() == package {
            continue;
        }
        if let Some(decl) = decls.get(pred) {
            if !decl.is_public() {
                errors.push(AnalysisError::PrivatePredicate {
                    pred: pred.to_string(),
                    package: pred.package().to_string(),
                });
            }
        }
    }
}

fn check_builtin_arities(clause: &Clause, errors: &mut Vec<AnalysisError>) {
    for premise in &clause.premises {
        let Some(pred) = premise.pred() else { continue };
        if pred.is_builtin() && !builtin::builtin_arity_ok(pred) {
            errors.push(AnalysisError::ArityMismatch {
                pred: pred.to_string(),
                expected: builtin::builtin_modes(pred).map_or(0, |m| m.len()),
                got: pred.arity,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::{ClauseBuilder, DeclBuilder};
    use crate::ast::{Const, FunctionSym, Transform, TransformStmt};

    fn no_decls() -> BTreeMap<PredicateSym, Decl> {
        BTreeMap::new()
    }

    #[test]
    fn test_safe_clause() {
        let clause = ClauseBuilder::new("path")
            .head_vars(["X", "Z"])
            .body_atom("path", ["X", "Y"])
            .body_atom("edge", ["Y", "Z"])
            .build();
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_unbound_head_variable() {
        let clause = ClauseBuilder::new("p")
            .head_vars(["X", "Y"])
            .body_atom("q", ["X"])
            .build();
        let errors = check_clause(&clause, &no_decls());
        assert!(matches!(
            &errors[0],
            AnalysisError::UnboundVariable { var, .. } if var == "Y"
        ));
    }

    #[test]
    fn test_negated_variable_must_be_bound() {
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .body_neg_atom("r", ["Z"])
            .build();
        let errors = check_clause(&clause, &no_decls());
        assert!(matches!(
            &errors[0],
            AnalysisError::UnboundVariable { var, .. } if var == "Z"
        ));
    }

    #[test]
    fn test_equality_binds_variable() {
        let clause = ClauseBuilder::new("p")
            .head_vars(["X", "Y"])
            .body_atom("q", ["X"])
            .body_eq(Term::var("Y"), Term::Constant(Const::Number(3)))
            .build();
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_union_find_propagates_boundness() {
        // Y = Z before Z is bound; q(Z) binds the class later.
        let clause = ClauseBuilder::new("p")
            .head_vars(["Y"])
            .body_eq(Term::var("Y"), Term::var("Z"))
            .body_atom("q", ["Z"])
            .build();
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_function_application_binds_via_eq() {
        let app = Term::Apply(
            FunctionSym::new("fn:plus", -1),
            vec![Term::var("X"), Term::Constant(Const::Number(1))],
        );
        let clause = ClauseBuilder::new("p")
            .head_vars(["Y"])
            .body_atom("q", ["X"])
            .body_eq(Term::var("Y"), app)
            .build();
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_builtin_output_waits_for_input() {
        // :list:member(E, Xs): Xs is input, E output. Xs never bound.
        let clause = ClauseBuilder::new("p")
            .head_vars(["E"])
            .body_atom(":list:member", ["E", "Xs"])
            .build();
        let errors = check_clause(&clause, &no_decls());
        assert!(errors
            .iter()
            .any(|e| matches!(e, AnalysisError::UnboundVariable { var, .. } if var == "E")));
        assert!(errors
            .iter()
            .any(|e| matches!(e, AnalysisError::UnboundVariable { var, .. } if var == "Xs")));
    }

    #[test]
    fn test_builtin_output_binds_after_input() {
        let clause = ClauseBuilder::new("p")
            .head_vars(["E"])
            .body_atom("lists", ["Xs"])
            .body_atom(":list:member", ["E", "Xs"])
            .build();
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_mode_input_seeds_head() {
        let decl = DeclBuilder::new("p").head_vars(["X"]).mode(["+"]).build();
        let mut decls = BTreeMap::new();
        decls.insert(decl.pred().clone(), decl);
        // X is an input: bound before the body runs.
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_neg_atom("q", ["X"])
            .build();
        assert!(check_clause(&clause, &decls).is_empty());
    }

    #[test]
    fn test_wildcard_in_head_rejected() {
        let clause = Clause::new(
            Atom::new("p", vec![Term::wildcard()]),
            vec![Premise::Atom(Atom::new("q", vec![Term::var("X")]))],
        );
        let errors = check_clause(&clause, &no_decls());
        assert!(matches!(
            &errors[0],
            AnalysisError::UnboundVariable { var, .. } if var == WILDCARD
        ));
    }

    #[test]
    fn test_private_predicate_rejected() {
        let decl = DeclBuilder::new("lib.secret")
            .head_vars(["X"])
            .private()
            .build();
        let mut decls = BTreeMap::new();
        decls.insert(decl.pred().clone(), decl);
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("lib.secret", ["X"])
            .build();
        let errors = check_clause(&clause, &decls);
        assert!(matches!(&errors[0], AnalysisError::PrivatePredicate { .. }));
    }

    #[test]
    fn test_same_package_private_allowed() {
        let decl = DeclBuilder::new("lib.secret")
            .head_vars(["X"])
            .private()
            .build();
        let mut decls = BTreeMap::new();
        decls.insert(decl.pred().clone(), decl);
        let clause = ClauseBuilder::new("lib.user")
            .head_vars(["X"])
            .body_atom("lib.secret", ["X"])
            .build();
        assert!(check_clause(&clause, &decls).is_empty());
    }

    #[test]
    fn test_unknown_function_rejected() {
        let app = Term::Apply(FunctionSym::new("fn:mystery", 1), vec![Term::var("X")]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["Y"])
            .body_atom("q", ["X"])
            .body_eq(Term::var("Y"), app)
            .build();
        let errors = check_clause(&clause, &no_decls());
        assert!(matches!(&errors[0], AnalysisError::UnknownFunction { .. }));
    }

    #[test]
    fn test_transform_shadowing_rejected() {
        let transform = Transform::new(vec![TransformStmt::let_stmt(
            "X",
            FunctionSym::new("fn:plus", -1),
            vec![Term::var("X"), Term::Constant(Const::Number(1))],
        )]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["X"])
            .body_atom("q", ["X"])
            .build()
            .with_transform(transform);
        let errors = check_clause(&clause, &no_decls());
        assert!(matches!(
            &errors[0],
            AnalysisError::TransformShadowsVariable { var, .. } if var == "X"
        ));
    }

    #[test]
    fn test_reducer_outside_group_by_rejected() {
        let transform = Transform::new(vec![TransformStmt::let_stmt(
            "N",
            FunctionSym::new("fn:sum", 1),
            vec![Term::var("X")],
        )]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["N"])
            .body_atom("q", ["X"])
            .build()
            .with_transform(transform);
        let errors = check_clause(&clause, &no_decls());
        assert!(errors
            .iter()
            .any(|e| matches!(e, AnalysisError::MalformedTransform { .. })));
    }

    #[test]
    fn test_full_aggregation_permitted() {
        // do fn:group_by(), let N = fn:count().
        let transform = Transform::new(vec![
            TransformStmt::do_stmt(FunctionSym::new(builtin::GROUP_BY, -1), vec![]),
            TransformStmt::let_stmt("N", FunctionSym::new("fn:count", 0), vec![]),
        ]);
        let clause = ClauseBuilder::new("total")
            .head_vars(["N"])
            .body_atom("q", ["X"])
            .build()
            .with_transform(transform);
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_group_by_with_keys_and_reducer() {
        let transform = Transform::new(vec![
            TransformStmt::do_stmt(FunctionSym::new(builtin::GROUP_BY, -1), vec![Term::var("K")]),
            TransformStmt::let_stmt("N", FunctionSym::new("fn:sum", 1), vec![Term::var("V")]),
        ]);
        let clause = ClauseBuilder::new("sums")
            .head_vars(["K", "N"])
            .body_atom("data", ["K", "V"])
            .build()
            .with_transform(transform);
        assert!(check_clause(&clause, &no_decls()).is_empty());
    }

    #[test]
    fn test_unbound_transform_use_rejected() {
        let transform = Transform::new(vec![TransformStmt::let_stmt(
            "Y",
            FunctionSym::new("fn:plus", -1),
            vec![Term::var("Missing"), Term::Constant(Const::Number(1))],
        )]);
        let clause = ClauseBuilder::new("p")
            .head_vars(["Y"])
            .body_atom("q", ["X"])
            .build()
            .with_transform(transform);
        let errors = check_clause(&clause, &no_decls());
        assert!(errors
            .iter()
            .any(|e| matches!(e, AnalysisError::UnboundVariable { var, .. } if var == "Missing")));
    }
}
