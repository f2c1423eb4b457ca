//! Declaration Checking
//!
//! Context-free validation of a single declaration: head-atom shape,
//! descriptor atoms, and bound expressions. Produces a list of diagnostics;
//! an empty list means the declaration is well-formed.

use crate::ast::{descr, Const, Decl, Term};
use crate::builtin;
use crate::error::AnalysisError;
use crate::types::TypeExpr;
use std::collections::HashSet;

/// Validate one declaration. Returns every diagnostic found, in source
/// order; unknown descriptor atoms are ignored.
pub fn check_decl(decl: &Decl) -> Vec<AnalysisError> {
    let mut errors = Vec::new();
    let pred = decl.pred().to_string();
    let malformed = |message: String| AnalysisError::MalformedDecl {
        pred: pred.clone(),
        message,
    };

    // Head arguments must be distinct variables.
    let mut seen = HashSet::new();
    for arg in &decl.atom.args {
        match arg.as_variable() {
            Some(v) => {
                if !seen.insert(v.to_string()) {
                    errors.push(malformed(format!("duplicate head variable {v}")));
                }
            }
            None => {
                errors.push(malformed(format!("head argument {arg} is not a variable")));
            }
        }
    }

    // At most one doc atom with non-empty, all-string arguments.
    let docs: Vec<_> = decl.descr_atoms(descr::DOC).collect();
    if docs.len() > 1 {
        errors.push(malformed("more than one doc(...) atom".to_string()));
    }
    for doc in &docs {
        if doc.args.is_empty() {
            errors.push(malformed("doc(...) atom has no arguments".to_string()));
        }
        for arg in &doc.args {
            if !matches!(arg, Term::Constant(Const::String(_))) {
                errors.push(malformed(format!("doc(...) argument {arg} is not a string")));
            }
        }
    }

    // arg(...) atoms reference head variables, without duplicates; when any
    // are present on a user declaration, they must cover every head variable.
    let head_vars: Vec<&str> = decl
        .atom
        .args
        .iter()
        .filter_map(Term::as_variable)
        .collect();
    let arg_atoms: Vec<_> = decl.descr_atoms(descr::ARG).collect();
    let mut described = HashSet::new();
    for atom in &arg_atoms {
        match atom.args.first().and_then(Term::as_variable) {
            Some(v) if head_vars.contains(&v) => {
                if !described.insert(v.to_string()) {
                    errors.push(malformed(format!("variable {v} described more than once")));
                }
            }
            Some(v) => {
                errors.push(malformed(format!("arg(...) references unknown variable {v}")));
            }
            None => {
                errors.push(malformed("arg(...) first argument is not a variable".to_string()));
            }
        }
    }
    if !arg_atoms.is_empty() && !decl.synthetic {
        for v in &head_vars {
            if !described.contains(*v) {
                errors.push(malformed(format!("head variable {v} has no arg(...) atom")));
            }
        }
    }

    // Bound declarations: length matches arity, every entry is a valid type
    // expression. A predicate-name string constant is tolerated only on
    // reflects declarations.
    let reflects = decl.has_descr(descr::REFLECTS);
    for bound in &decl.bounds {
        if bound.len() != decl.atom.arity() {
            errors.push(AnalysisError::BoundLengthMismatch {
                pred: pred.clone(),
                expected: decl.atom.arity(),
                got: bound.len(),
            });
            continue;
        }
        for term in &bound.0 {
            if let Err(e) = TypeExpr::from_term(term) {
                let tolerated = reflects && matches!(term, Term::Constant(Const::String(_)));
                if !tolerated {
                    errors.push(malformed(format!("bad bound expression {term}: {e}")));
                }
            }
        }
    }

    // external() requires exactly one mode(...).
    if decl.has_descr(descr::EXTERNAL) {
        let mode_count = decl.descr_atoms(descr::MODE).count();
        if mode_count != 1 {
            errors.push(malformed(format!(
                "external predicate must have exactly one mode(...) atom, found {mode_count}"
            )));
        }
    }

    // fundep(...) arguments must reference head variables.
    for atom in decl.descr_atoms(descr::FUNDEP) {
        for arg in &atom.args {
            let ok = match arg {
                Term::Variable(_) => arg.as_variable().is_some_and(|v| head_vars.contains(&v)),
                // A list of head variables is also accepted.
                Term::Constant(Const::List(_)) => true,
                _ => false,
            };
            if !ok {
                errors.push(malformed(format!(
                    "fundep(...) argument {arg} is not a head variable"
                )));
            }
        }
    }

    // merge(path, reducer) requires a reducer symbol.
    for atom in decl.descr_atoms(descr::MERGE) {
        let reducer_ok = atom.args.get(1).is_some_and(|t| match t {
            Term::Apply(func, _) => builtin::is_reducer(&func.name),
            Term::Constant(Const::String(s)) => builtin::is_reducer(s),
            _ => false,
        });
        if !reducer_ok {
            errors.push(malformed("merge(...) second argument is not a reducer".to_string()));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::DeclBuilder;
    use crate::ast::{Atom, BoundDecl, NamePath};

    #[test]
    fn test_valid_decl() {
        let decl = DeclBuilder::new("foo")
            .head_vars(["X"])
            .doc("some predicate")
            .bound(["/number"])
            .build();
        assert!(check_decl(&decl).is_empty());
    }

    #[test]
    fn test_duplicate_head_variable() {
        let decl = Decl::new(
            Atom::new("foo", vec![Term::var("X"), Term::var("X")]),
            vec![],
            vec![],
        );
        let errors = check_decl(&decl);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].to_string().contains("duplicate head variable"));
    }

    #[test]
    fn test_constant_head_argument_rejected() {
        let decl = Decl::new(
            Atom::new("foo", vec![Term::Constant(Const::Number(1))]),
            vec![],
            vec![],
        );
        assert!(!check_decl(&decl).is_empty());
    }

    #[test]
    fn test_two_doc_atoms_rejected() {
        let decl = DeclBuilder::new("foo")
            .head_vars(["X"])
            .doc("first")
            .doc("second")
            .build();
        let errors = check_decl(&decl);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("more than one doc")));
    }

    #[test]
    fn test_arg_atom_coverage() {
        let arg_atom = Atom::new(
            descr::ARG,
            vec![
                Term::var("X"),
                Term::Constant(Const::String("the x".to_string())),
            ],
        );
        let decl = Decl::new(
            Atom::new("foo", vec![Term::var("X"), Term::var("Y")]),
            vec![arg_atom],
            vec![],
        );
        let errors = check_decl(&decl);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("Y has no arg(...) atom")));
    }

    #[test]
    fn test_arg_atom_unknown_variable() {
        let arg_atom = Atom::new(
            descr::ARG,
            vec![
                Term::var("Z"),
                Term::Constant(Const::String("mystery".to_string())),
            ],
        );
        let decl = Decl::new(Atom::new("foo", vec![Term::var("X")]), vec![arg_atom], vec![]);
        assert!(!check_decl(&decl).is_empty());
    }

    #[test]
    fn test_bound_length_mismatch() {
        let decl = Decl::new(
            Atom::new("foo", vec![Term::var("X"), Term::var("Y")]),
            vec![],
            vec![BoundDecl::new(vec![Term::Constant(Const::Name(
                NamePath::parse("/number").expect("parse"),
            ))])],
        );
        let errors = check_decl(&decl);
        assert!(matches!(
            errors[0],
            AnalysisError::BoundLengthMismatch { expected: 2, got: 1, .. }
        ));
    }

    #[test]
    fn test_external_requires_single_mode() {
        let decl = DeclBuilder::new("foo")
            .head_vars(["X"])
            .descr_atom(Atom::new(descr::EXTERNAL, vec![]))
            .build();
        let errors = check_decl(&decl);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("exactly one mode")));
    }

    #[test]
    fn test_unknown_descriptor_ignored() {
        let decl = DeclBuilder::new("foo")
            .head_vars(["X"])
            .descr_atom(Atom::new("mystery", vec![]))
            .build();
        assert!(check_decl(&decl).is_empty());
    }

    #[test]
    fn test_empty_union_bound_rejected() {
        use crate::ast::FunctionSym;
        let decl = Decl::new(
            Atom::new("foo", vec![Term::var("X")]),
            vec![],
            vec![BoundDecl::new(vec![Term::Apply(
                FunctionSym::new("Union", -1),
                vec![],
            )])],
        );
        let errors = check_decl(&decl);
        assert!(errors
            .iter()
            .any(|e| e.to_string().contains("bad bound expression")));
    }
}
