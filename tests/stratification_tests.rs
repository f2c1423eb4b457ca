//! Integration Tests for Stratification
//!
//! Layered orderings, rejection of negation/aggregation cycles, and the
//! stratum partial-order invariant through the full pipeline.

use stratalog::analysis::{Analyzer, BoundsCheckMode, SourceUnit};
use stratalog::ast::builders::ClauseBuilder;
use stratalog::ast::{Atom, Clause, Const, FunctionSym, PredicateSym, Term, Transform, TransformStmt};
use stratalog::error::AnalysisError;

fn analyze(unit: SourceUnit) -> Result<stratalog::ProgramInfo, Vec<AnalysisError>> {
    Analyzer::new(BoundsCheckMode::Error).analyze(&[unit])
}

fn sym(name: &str, arity: usize) -> PredicateSym {
    PredicateSym::new(name, arity)
}

// a(X) :- b(X), !c(X).  b(X) :- d(X).  c(X) :- d(X).  d(/x).
// Strata: {d}, {b, c}, {a}.
#[test]
fn test_three_layer_stratification() {
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            ClauseBuilder::new("a")
                .head_vars(["X"])
                .body_atom("b", ["X"])
                .body_neg_atom("c", ["X"])
                .build(),
            ClauseBuilder::new("b").head_vars(["X"]).body_atom("d", ["X"]).build(),
            ClauseBuilder::new("c").head_vars(["X"]).body_atom("d", ["X"]).build(),
            Clause::fact(Atom::new(
                "d",
                vec![Term::Constant(Const::name("/x").expect("path"))],
            )),
        ],
    };
    let info = analyze(unit).expect("stratifiable");
    assert_eq!(
        info.strata,
        vec![
            vec![sym("d", 1)],
            vec![sym("b", 1), sym("c", 1)],
            vec![sym("a", 1)]
        ]
    );
}

// p(X) :- d(X), !p(X). - recursion through negation.
#[test]
fn test_negative_recursion_rejected() {
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            Clause::fact(Atom::new("d", vec![Term::Constant(Const::Number(1))])),
            ClauseBuilder::new("p")
                .head_vars(["X"])
                .body_atom("d", ["X"])
                .body_neg_atom("p", ["X"])
                .build(),
        ],
    };
    let errors = analyze(unit).expect_err("not stratifiable");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::NotStratifiable { .. })));
}

// Aggregation behaves like negation for stratification.
#[test]
fn test_aggregation_recursion_rejected() {
    let transform = Transform::new(vec![
        TransformStmt::do_stmt(FunctionSym::new("fn:group_by", -1), vec![]),
        TransformStmt::let_stmt("N", FunctionSym::new("fn:count", 0), vec![]),
    ]);
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            ClauseBuilder::new("total")
                .head_vars(["N"])
                .body_atom("item", ["X"])
                .build()
                .with_transform(transform),
            ClauseBuilder::new("item").head_vars(["N"]).body_atom("total", ["N"]).build(),
        ],
    };
    let errors = analyze(unit).expect_err("aggregation cycle");
    assert!(errors
        .iter()
        .any(|e| matches!(e, AnalysisError::NotStratifiable { .. })));
}

// Mutual positive recursion shares a stratum.
#[test]
fn test_mutual_positive_recursion_shares_stratum() {
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            Clause::fact(Atom::new("seed", vec![Term::Constant(Const::Number(1))])),
            ClauseBuilder::new("even").head_vars(["X"]).body_atom("seed", ["X"]).build(),
            ClauseBuilder::new("even").head_vars(["X"]).body_atom("odd", ["X"]).build(),
            ClauseBuilder::new("odd").head_vars(["X"]).body_atom("even", ["X"]).build(),
        ],
    };
    let info = analyze(unit).expect("stratifiable");
    assert_eq!(
        info.pred_to_stratum[&sym("even", 1)],
        info.pred_to_stratum[&sym("odd", 1)]
    );
}

// Every dependency edge respects the stratum partial order.
#[test]
fn test_stratum_partial_order() {
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            Clause::fact(Atom::new("base", vec![Term::Constant(Const::Number(1))])),
            ClauseBuilder::new("l1").head_vars(["X"]).body_atom("base", ["X"]).build(),
            ClauseBuilder::new("l2")
                .head_vars(["X"])
                .body_atom("l1", ["X"])
                .body_neg_atom("other", ["X"])
                .build(),
            ClauseBuilder::new("other").head_vars(["X"]).body_atom("base", ["X"]).build(),
        ],
    };
    let info = analyze(unit).expect("stratifiable");
    for rule in &info.rules {
        let head_stratum = info.pred_to_stratum[&rule.head.pred];
        for premise in &rule.premises {
            let Some(dep) = premise.pred() else { continue };
            if dep.is_builtin() {
                continue;
            }
            let dep_stratum = info.pred_to_stratum[dep];
            assert!(dep_stratum <= head_stratum);
            if premise.is_negated() {
                assert!(dep_stratum < head_stratum);
            }
        }
    }
}

// Negations are delayed before stratification sees them; the order of
// premises in the input does not change the result.
#[test]
fn test_premise_order_does_not_change_strata() {
    let build = |neg_first: bool| {
        let mut builder = ClauseBuilder::new("a").head_vars(["X"]);
        if neg_first {
            builder = builder.body_neg_atom("c", ["X"]).body_atom("b", ["X"]);
        } else {
            builder = builder.body_atom("b", ["X"]).body_neg_atom("c", ["X"]);
        }
        SourceUnit {
            decls: vec![],
            clauses: vec![
                builder.build(),
                ClauseBuilder::new("b").head_vars(["X"]).body_atom("d", ["X"]).build(),
                ClauseBuilder::new("c").head_vars(["X"]).body_atom("d", ["X"]).build(),
                Clause::fact(Atom::new("d", vec![Term::Constant(Const::Number(1))])),
            ],
        }
    };
    let first = analyze(build(true)).expect("stratifiable");
    let second = analyze(build(false)).expect("stratifiable");
    assert_eq!(first.strata, second.strata);
    assert_eq!(first.pred_to_stratum, second.pred_to_stratum);
}

// Strata are deterministic: repeated runs produce identical output.
#[test]
fn test_deterministic_strata() {
    let unit = SourceUnit {
        decls: vec![],
        clauses: vec![
            Clause::fact(Atom::new("z", vec![Term::Constant(Const::Number(1))])),
            ClauseBuilder::new("m").head_vars(["X"]).body_atom("z", ["X"]).build(),
            ClauseBuilder::new("a").head_vars(["X"]).body_atom("z", ["X"]).build(),
            ClauseBuilder::new("k").head_vars(["X"]).body_atom("z", ["X"]).build(),
        ],
    };
    let first = analyze(unit.clone()).expect("ok");
    let second = analyze(unit).expect("ok");
    assert_eq!(first.strata, second.strata);
    // Same level, name order.
    assert_eq!(
        first.strata[1],
        vec![sym("a", 1), sym("k", 1), sym("m", 1)]
    );
}
