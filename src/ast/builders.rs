//! Fluent construction of atoms, clauses, and declarations.
//!
//! There is no parser in this crate, so every program under analysis is
//! assembled from AST values. Doing that with raw `Term`/`Atom` literals
//! buries the shape of a clause in nesting; the builders here keep a
//! hand-written program close to its concrete-syntax reading.
//!
//! ```rust
//! use stratalog::ast::builders::{ClauseBuilder, DeclBuilder};
//!
//! // reach(X, Y) :- link(X, Y), alive(Y).
//! let clause = ClauseBuilder::new("reach")
//!     .head_vars(["X", "Y"])
//!     .body_atom("link", ["X", "Y"])
//!     .body_atom("alive", ["Y"])
//!     .build();
//!
//! // Decl reach(X, Y) bound [/name, /name].
//! let decl = DeclBuilder::new("reach")
//!     .head_vars(["X", "Y"])
//!     .bound(["/name", "/name"])
//!     .build();
//!
//! assert_eq!(clause.head.pred, *decl.pred());
//! ```

use super::{
    Atom, BoundDecl, Clause, Const, Decl, NamePath, Premise, Term, descr,
};

// ============================================================================
// AtomBuilder
// ============================================================================

/// Builder for constructing Atom instances
#[derive(Debug, Clone)]
pub struct AtomBuilder {
    name: String,
    args: Vec<Term>,
}

impl AtomBuilder {
    /// Start building an atom with the given predicate name
    pub fn new(name: impl Into<String>) -> Self {
        AtomBuilder {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Add a variable argument
    pub fn var(mut self, name: impl Into<String>) -> Self {
        self.args.push(Term::var(name));
        self
    }

    /// Add a number constant argument
    pub fn num(mut self, value: i64) -> Self {
        self.args.push(Term::Constant(Const::Number(value)));
        self
    }

    /// Add a string constant argument
    pub fn string(mut self, value: impl Into<String>) -> Self {
        self.args.push(Term::Constant(Const::String(value.into())));
        self
    }

    /// Add a name constant argument like `/foo/bar`; panics on malformed paths
    pub fn name(mut self, path: &str) -> Self {
        let path = NamePath::parse(path).expect("malformed name path");
        self.args.push(Term::Constant(Const::Name(path)));
        self
    }

    /// Add an arbitrary term argument
    pub fn term(mut self, term: Term) -> Self {
        self.args.push(term);
        self
    }

    /// Finish building
    pub fn build(self) -> Atom {
        Atom::new(self.name, self.args)
    }
}

// ============================================================================
// ClauseBuilder
// ============================================================================

/// Builder for constructing Clause instances
#[derive(Debug, Clone)]
pub struct ClauseBuilder {
    head_name: String,
    head_args: Vec<Term>,
    premises: Vec<Premise>,
}

impl ClauseBuilder {
    /// Start building a clause with the given head predicate name
    pub fn new(head_name: impl Into<String>) -> Self {
        ClauseBuilder {
            head_name: head_name.into(),
            head_args: Vec::new(),
            premises: Vec::new(),
        }
    }

    /// Set head arguments to the given variables
    pub fn head_vars<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        self.head_args = vars.into_iter().map(Term::var).collect();
        self
    }

    /// Set head arguments to arbitrary terms
    pub fn head_terms(mut self, terms: impl IntoIterator<Item = Term>) -> Self {
        self.head_args = terms.into_iter().collect();
        self
    }

    /// Add a positive body atom over the given variables
    pub fn body_atom<'a>(
        mut self,
        name: impl Into<String>,
        vars: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let args = vars.into_iter().map(Term::var).collect();
        self.premises.push(Premise::Atom(Atom::new(name, args)));
        self
    }

    /// Add a negated body atom over the given variables
    pub fn body_neg_atom<'a>(
        mut self,
        name: impl Into<String>,
        vars: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let args = vars.into_iter().map(Term::var).collect();
        self.premises.push(Premise::NegAtom(Atom::new(name, args)));
        self
    }

    /// Add an equality premise
    pub fn body_eq(mut self, left: Term, right: Term) -> Self {
        self.premises.push(Premise::Eq(left, right));
        self
    }

    /// Add an arbitrary premise
    pub fn premise(mut self, premise: Premise) -> Self {
        self.premises.push(premise);
        self
    }

    /// Finish building
    pub fn build(self) -> Clause {
        Clause::new(Atom::new(self.head_name, self.head_args), self.premises)
    }
}

// ============================================================================
// DeclBuilder
// ============================================================================

/// Builder for constructing Decl instances
#[derive(Debug, Clone)]
pub struct DeclBuilder {
    name: String,
    head_vars: Vec<String>,
    descr: Vec<Atom>,
    bounds: Vec<BoundDecl>,
}

impl DeclBuilder {
    /// Start building a declaration for the given predicate name
    pub fn new(name: impl Into<String>) -> Self {
        DeclBuilder {
            name: name.into(),
            head_vars: Vec::new(),
            descr: Vec::new(),
            bounds: Vec::new(),
        }
    }

    /// Set the declaration head variables
    pub fn head_vars<'a>(mut self, vars: impl IntoIterator<Item = &'a str>) -> Self {
        self.head_vars = vars.into_iter().map(str::to_string).collect();
        self
    }

    /// Add a descriptor atom
    pub fn descr_atom(mut self, atom: Atom) -> Self {
        self.descr.push(atom);
        self
    }

    /// Mark the predicate private
    pub fn private(mut self) -> Self {
        self.descr.push(Atom::new(descr::PRIVATE, vec![]));
        self
    }

    /// Mark the predicate temporal
    pub fn temporal(mut self) -> Self {
        self.descr.push(Atom::new(descr::TEMPORAL, vec![]));
        self
    }

    /// Add a `mode(...)` descriptor atom from spellings like `"+"`, `"-"`, `"?"`
    pub fn mode<'a>(mut self, modes: impl IntoIterator<Item = &'a str>) -> Self {
        let args = modes
            .into_iter()
            .map(|m| Term::Constant(Const::String(m.to_string())))
            .collect();
        self.descr.push(Atom::new(descr::MODE, args));
        self
    }

    /// Add a `reflects(/prefix)` descriptor atom; panics on malformed paths
    pub fn reflects(mut self, prefix: &str) -> Self {
        let path = NamePath::parse(prefix).expect("malformed name path");
        self.descr.push(Atom::new(
            descr::REFLECTS,
            vec![Term::Constant(Const::Name(path))],
        ));
        self
    }

    /// Add a `doc(...)` descriptor atom
    pub fn doc(mut self, text: impl Into<String>) -> Self {
        self.descr.push(Atom::new(
            descr::DOC,
            vec![Term::Constant(Const::String(text.into()))],
        ));
        self
    }

    /// Add a bound declaration from name-path spellings like `"/number"`;
    /// panics on malformed paths
    pub fn bound<'a>(mut self, bounds: impl IntoIterator<Item = &'a str>) -> Self {
        let terms: Vec<Term> = bounds
            .into_iter()
            .map(|b| {
                let path = NamePath::parse(b).expect("malformed name path");
                Term::Constant(Const::Name(path))
            })
            .collect();
        self.bounds.push(BoundDecl::new(terms));
        self
    }

    /// Add a bound declaration from arbitrary bound-expression terms
    pub fn bound_terms(mut self, terms: impl IntoIterator<Item = Term>) -> Self {
        self.bounds.push(BoundDecl::new(terms.into_iter().collect()));
        self
    }

    /// Finish building
    pub fn build(self) -> Decl {
        let args = self.head_vars.iter().map(Term::var).collect();
        Decl::new(Atom::new(self.name, args), self.descr, self.bounds)
    }
}
