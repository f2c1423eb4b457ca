//! # Datalog AST - Abstract Syntax Tree Types
//!
//! Abstract Syntax Tree types for the temporal Datalog dialect analyzed by
//! this crate. The analyzer consumes already-parsed programs: a collection of
//! predicate declarations and clauses (rules and initial facts).
//!
//! ## Builders
//!
//! For programmatic construction of AST nodes, see the [`builders`] module
//! which provides fluent APIs like `AtomBuilder` and `ClauseBuilder`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

pub mod builders;

/// Unix-epoch milliseconds, the payload of time constants.
pub type Timestamp = i64;

/// The reserved wildcard variable name.
pub const WILDCARD: &str = "_";

// ============================================================================
// Symbols
// ============================================================================

/// A predicate symbol: name plus arity.
///
/// Predicates with the same name and different arity are distinct symbols.
/// Dotted names (`other.p`) place the predicate in package `other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PredicateSym {
    pub name: String,
    pub arity: usize,
}

impl PredicateSym {
    /// Create a new predicate symbol
    pub fn new(name: impl Into<String>, arity: usize) -> Self {
        PredicateSym {
            name: name.into(),
            arity,
        }
    }

    /// The package portion of a dotted predicate name, empty for the
    /// default package. Built-in predicates (`:`-prefixed) have no package.
    pub fn package(&self) -> &str {
        if self.name.starts_with(':') {
            return "";
        }
        match self.name.rfind('.') {
            Some(idx) => &self.name[..idx],
            None => "",
        }
    }

    /// Check if this is a built-in predicate symbol (`:`-prefixed)
    pub fn is_builtin(&self) -> bool {
        self.name.starts_with(':')
    }
}

impl fmt::Display for PredicateSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.arity)
    }
}

/// A function symbol: name plus arity. Arity `-1` denotes variadic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FunctionSym {
    pub name: String,
    pub arity: i32,
}

impl FunctionSym {
    /// Create a new function symbol
    pub fn new(name: impl Into<String>, arity: i32) -> Self {
        FunctionSym {
            name: name.into(),
            arity,
        }
    }

    /// Check if this symbol accepts any nonzero argument count
    pub fn is_variadic(&self) -> bool {
        self.arity < 0
    }
}

impl fmt::Display for FunctionSym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

// ============================================================================
// Name paths
// ============================================================================

/// A hierarchical name constant path: `/foo/bar` has segments `["foo", "bar"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NamePath(pub Vec<String>);

impl NamePath {
    /// Build a path from segments
    pub fn new(segments: Vec<String>) -> Self {
        NamePath(segments)
    }

    /// Parse a `/foo/bar` string into a path. Empty and non-`/`-prefixed
    /// strings are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }
        let segments: Vec<String> = rest.split('/').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return None;
        }
        Some(NamePath(segments))
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty path (the root)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check whether `self` is a (non-strict) prefix of `other`
    pub fn is_prefix_of(&self, other: &NamePath) -> bool {
        self.0.len() <= other.0.len() && other.0[..self.0.len()] == self.0[..]
    }

    /// Segments accessor
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for NamePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Constants and terms
// ============================================================================

/// A constant payload. Name constants are hierarchical; list/map/struct
/// constants nest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    /// 64-bit integer constant
    Number(i64),
    /// 64-bit float constant
    Float(f64),
    /// String constant
    String(String),
    /// Hierarchical name constant: `/foo/bar`
    Name(NamePath),
    /// Time constant (Unix-epoch milliseconds)
    Time(Timestamp),
    /// Duration constant (milliseconds)
    Duration(i64),
    /// List constant
    List(Vec<Const>),
    /// Map constant (ordered key/value pairs)
    Map(Vec<(Const, Const)>),
    /// Struct constant (ordered field/value pairs; fields are name constants)
    Struct(Vec<(Const, Const)>),
}

impl Const {
    /// Convenience constructor for name constants
    pub fn name(path: &str) -> Option<Self> {
        NamePath::parse(path).map(Const::Name)
    }

    /// Check if this constant is a name constant
    pub fn is_name(&self) -> bool {
        matches!(self, Const::Name(_))
    }

    /// Get the name path if this is a name constant
    pub fn as_name(&self) -> Option<&NamePath> {
        if let Const::Name(path) = self {
            Some(path)
        } else {
            None
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Number(n) => write!(f, "{n}"),
            Const::Float(x) => write!(f, "{x}"),
            Const::String(s) => write!(f, "'{s}'"),
            Const::Name(path) => write!(f, "{path}"),
            Const::Time(ms) => match chrono::DateTime::from_timestamp_millis(*ms) {
                Some(dt) => write!(f, "{}", dt.to_rfc3339()),
                None => write!(f, "@{ms}ms"),
            },
            Const::Duration(ms) => write!(f, "{ms}ms"),
            Const::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Const::Map(entries) => {
                write!(f, "[")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "]")
            }
            Const::Struct(fields) => {
                write!(f, "{{")?;
                for (i, (k, v)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// A term: variable, constant, or function application.
///
/// Function application doubles as the concrete form of type expressions in
/// declaration bounds (`List(T)`, `Map(K, V)`, `Union(T1, T2)`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Term {
    /// A variable; the name `_` is the wildcard and never binds
    Variable(String),
    /// A constant
    Constant(Const),
    /// Function application
    Apply(FunctionSym, Vec<Term>),
}

impl Term {
    /// Convenience constructor for variables
    pub fn var(name: impl Into<String>) -> Self {
        Term::Variable(name.into())
    }

    /// The wildcard variable
    pub fn wildcard() -> Self {
        Term::Variable(WILDCARD.to_string())
    }

    /// Check if this term is a variable (including the wildcard)
    pub fn is_variable(&self) -> bool {
        matches!(self, Term::Variable(_))
    }

    /// Check if this term is the wildcard variable
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Term::Variable(v) if v == WILDCARD)
    }

    /// Check if this term is a constant
    pub fn is_constant(&self) -> bool {
        matches!(self, Term::Constant(_))
    }

    /// Get the variable name if this is a non-wildcard variable
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            Term::Variable(name) if name != WILDCARD => Some(name),
            _ => None,
        }
    }

    /// Get the constant if this is a constant term
    pub fn as_constant(&self) -> Option<&Const> {
        if let Term::Constant(c) = self {
            Some(c)
        } else {
            None
        }
    }

    /// True if the term contains no variables
    pub fn ground(&self) -> bool {
        match self {
            Term::Variable(_) => false,
            Term::Constant(_) => true,
            Term::Apply(_, args) => args.iter().all(Term::ground),
        }
    }

    /// Get all non-wildcard variables referenced by this term
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        self.collect_variables(&mut vars);
        vars
    }

    pub(crate) fn collect_variables(&self, vars: &mut HashSet<String>) {
        match self {
            Term::Variable(name) => {
                if name != WILDCARD {
                    vars.insert(name.clone());
                }
            }
            Term::Constant(_) => {}
            Term::Apply(_, args) => {
                for arg in args {
                    arg.collect_variables(vars);
                }
            }
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(name) => write!(f, "{name}"),
            Term::Constant(c) => write!(f, "{c}"),
            Term::Apply(func, args) => {
                write!(f, "{}(", func.name)?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ============================================================================
// Atoms and premises
// ============================================================================

/// An atom like `edge(X, Y)` or `:match_prefix(X, /foo)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    pub pred: PredicateSym,
    pub args: Vec<Term>,
}

impl Atom {
    /// Create a new atom; the predicate arity is the argument count
    pub fn new(name: impl Into<String>, args: Vec<Term>) -> Self {
        let name = name.into();
        let arity = args.len();
        Atom {
            pred: PredicateSym::new(name, arity),
            args,
        }
    }

    /// Get all non-wildcard variables in this atom
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = HashSet::new();
        for term in &self.args {
            term.collect_variables(&mut vars);
        }
        vars
    }

    /// True if every argument is a ground term
    pub fn is_ground(&self) -> bool {
        self.args.iter().all(Term::ground)
    }

    /// The arity (number of arguments) of this atom
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.pred.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// Interval endpoint: a variable or a concrete timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TimeArg {
    /// Variable endpoint, bound during evaluation
    Variable(String),
    /// Concrete timestamp endpoint
    Value(Timestamp),
}

impl TimeArg {
    /// Get the variable name if this is a non-wildcard variable endpoint
    pub fn as_variable(&self) -> Option<&str> {
        match self {
            TimeArg::Variable(v) if v != WILDCARD => Some(v),
            _ => None,
        }
    }
}

impl fmt::Display for TimeArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeArg::Variable(v) => write!(f, "{v}"),
            TimeArg::Value(ms) => write!(f, "{}", Const::Time(*ms)),
        }
    }
}

/// A time interval `[start, end]` attached to temporal atoms and clause heads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub start: TimeArg,
    pub end: TimeArg,
}

impl Interval {
    /// Create a new interval
    pub fn new(start: TimeArg, end: TimeArg) -> Self {
        Interval { start, end }
    }

    /// The eternal interval `[-inf, +inf]`
    pub fn eternity() -> Self {
        Interval {
            start: TimeArg::Value(Timestamp::MIN),
            end: TimeArg::Value(Timestamp::MAX),
        }
    }

    /// Check if this is the eternal interval
    pub fn is_eternal(&self) -> bool {
        matches!(self.start, TimeArg::Value(Timestamp::MIN))
            && matches!(self.end, TimeArg::Value(Timestamp::MAX))
    }

    /// Non-wildcard variables appearing at the endpoints
    pub fn variables(&self) -> Vec<&str> {
        [&self.start, &self.end]
            .into_iter()
            .filter_map(TimeArg::as_variable)
            .collect()
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.start, self.end)
    }
}

/// Temporal interval operator attached to a temporal annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalOp {
    /// `@[S, E]` - holds within the interval
    In,
    /// `<-` - open past operator
    PastOpen,
    /// `[-` - closed past operator
    PastClosed,
    /// `<+` - open future operator
    FutureOpen,
    /// `[+` - closed future operator
    FutureClosed,
}

impl IntervalOp {
    /// Future operators refer to times after the fact's own interval
    pub fn is_future(&self) -> bool {
        matches!(self, IntervalOp::FutureOpen | IntervalOp::FutureClosed)
    }

    /// Get the concrete-syntax spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalOp::In => "@",
            IntervalOp::PastOpen => "<-",
            IntervalOp::PastClosed => "[-",
            IntervalOp::FutureOpen => "<+",
            IntervalOp::FutureClosed => "[+",
        }
    }
}

/// A temporal annotation: operator plus interval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalSpec {
    pub op: IntervalOp,
    pub interval: Interval,
}

impl TemporalSpec {
    /// Create a new temporal annotation
    pub fn new(op: IntervalOp, interval: Interval) -> Self {
        TemporalSpec { op, interval }
    }

    /// An `@`-annotation over the given interval
    pub fn over(interval: Interval) -> Self {
        TemporalSpec {
            op: IntervalOp::In,
            interval,
        }
    }
}

impl fmt::Display for TemporalSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.op.as_str(), self.interval)
    }
}

/// A clause premise: positive or negated atom, (in)equality, or temporal
/// reference. `TemporalAtom` is the pre-normalization form produced by the
/// parser; the rewriter turns it into `TemporalLiteral` (or a bare atom when
/// no interval is given).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Premise {
    /// Positive atom
    Atom(Atom),
    /// Negated atom
    NegAtom(Atom),
    /// Equality between two terms
    Eq(Term, Term),
    /// Inequality between two terms
    Ineq(Term, Term),
    /// Temporal reference before normalization; `interval == None` means a
    /// bare reference
    TemporalAtom {
        atom: Atom,
        op: IntervalOp,
        interval: Option<Interval>,
    },
    /// Normalized temporal reference
    TemporalLiteral {
        atom: Atom,
        op: IntervalOp,
        interval: Interval,
    },
}

impl Premise {
    /// The predicate referenced by this premise, if any
    pub fn pred(&self) -> Option<&PredicateSym> {
        match self {
            Premise::Atom(a) | Premise::NegAtom(a) => Some(&a.pred),
            Premise::TemporalAtom { atom, .. } | Premise::TemporalLiteral { atom, .. } => {
                Some(&atom.pred)
            }
            Premise::Eq(_, _) | Premise::Ineq(_, _) => None,
        }
    }

    /// Check if this is a positive (non-negated, non-constraint) premise
    pub fn is_positive(&self) -> bool {
        matches!(
            self,
            Premise::Atom(_) | Premise::TemporalAtom { .. } | Premise::TemporalLiteral { .. }
        )
    }

    /// Check if this is a negated atom
    pub fn is_negated(&self) -> bool {
        matches!(self, Premise::NegAtom(_))
    }

    /// Get all non-wildcard variables in this premise
    pub fn variables(&self) -> HashSet<String> {
        match self {
            Premise::Atom(a) | Premise::NegAtom(a) => a.variables(),
            Premise::Eq(left, right) | Premise::Ineq(left, right) => {
                let mut vars = left.variables();
                vars.extend(right.variables());
                vars
            }
            Premise::TemporalAtom { atom, interval, .. } => {
                let mut vars = atom.variables();
                if let Some(iv) = interval {
                    vars.extend(iv.variables().into_iter().map(str::to_string));
                }
                vars
            }
            Premise::TemporalLiteral { atom, interval, .. } => {
                let mut vars = atom.variables();
                vars.extend(interval.variables().into_iter().map(str::to_string));
                vars
            }
        }
    }
}

impl fmt::Display for Premise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Premise::Atom(a) => write!(f, "{a}"),
            Premise::NegAtom(a) => write!(f, "!{a}"),
            Premise::Eq(l, r) => write!(f, "{l} = {r}"),
            Premise::Ineq(l, r) => write!(f, "{l} != {r}"),
            Premise::TemporalAtom {
                atom,
                op,
                interval: Some(iv),
            } => write!(f, "{atom} {}{iv}", op.as_str()),
            Premise::TemporalAtom { atom, .. } => write!(f, "{atom}"),
            Premise::TemporalLiteral { atom, op, interval } => {
                write!(f, "{atom} {}{interval}", op.as_str())
            }
        }
    }
}

// ============================================================================
// Transforms
// ============================================================================

/// One transform statement: `let v = fn(...)`, or `do fn:group_by(...)` when
/// `var` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStmt {
    /// The variable introduced by a `let` statement; `None` for `do`
    pub var: Option<String>,
    /// The applied function
    pub func: FunctionSym,
    /// Function arguments
    pub args: Vec<Term>,
}

impl TransformStmt {
    /// A `let v = fn(args)` statement
    pub fn let_stmt(var: impl Into<String>, func: FunctionSym, args: Vec<Term>) -> Self {
        TransformStmt {
            var: Some(var.into()),
            func,
            args,
        }
    }

    /// A `do fn(args)` statement
    pub fn do_stmt(func: FunctionSym, args: Vec<Term>) -> Self {
        TransformStmt {
            var: None,
            func,
            args,
        }
    }

    /// Variables consumed by this statement's arguments
    pub fn arg_variables(&self) -> HashSet<String> {
        self.args.iter().flat_map(Term::variables).collect()
    }
}

impl fmt::Display for TransformStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.var {
            Some(v) => write!(f, "let {v} = ")?,
            None => write!(f, "do ")?,
        }
        write!(f, "{}(", self.func.name)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}

/// An ordered sequence of transform statements attached to a clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub statements: Vec<TransformStmt>,
}

impl Transform {
    /// Create a transform from statements
    pub fn new(statements: Vec<TransformStmt>) -> Self {
        Transform { statements }
    }

    /// The leading `do fn:group_by(...)` statement, if present
    pub fn group_by(&self) -> Option<&TransformStmt> {
        self.statements
            .first()
            .filter(|stmt| stmt.var.is_none() && stmt.func.name == "fn:group_by")
    }

    /// Variables introduced by `let` statements, in order
    pub fn let_variables(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter_map(|stmt| stmt.var.as_deref())
            .collect()
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, stmt) in self.statements.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{stmt}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Clauses
// ============================================================================

/// A clause: a rule when the premise list is non-empty, an initial fact
/// otherwise. `head_time` carries the head's temporal annotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub head: Atom,
    pub premises: Vec<Premise>,
    pub transform: Option<Transform>,
    pub head_time: Option<TemporalSpec>,
}

impl Clause {
    /// Create a rule clause
    pub fn new(head: Atom, premises: Vec<Premise>) -> Self {
        Clause {
            head,
            premises,
            transform: None,
            head_time: None,
        }
    }

    /// Create an initial-fact clause
    pub fn fact(head: Atom) -> Self {
        Clause {
            head,
            premises: Vec::new(),
            transform: None,
            head_time: None,
        }
    }

    /// Attach a transform
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Attach a head temporal annotation
    pub fn with_head_time(mut self, spec: TemporalSpec) -> Self {
        self.head_time = Some(spec);
        self
    }

    /// True for body-less clauses (initial facts)
    pub fn is_fact(&self) -> bool {
        self.premises.is_empty()
    }

    /// All non-wildcard variables appearing anywhere in the clause
    pub fn variables(&self) -> HashSet<String> {
        let mut vars = self.head.variables();
        for premise in &self.premises {
            vars.extend(premise.variables());
        }
        if let Some(transform) = &self.transform {
            for stmt in &transform.statements {
                vars.extend(stmt.arg_variables());
                if let Some(v) = &stmt.var {
                    if v != WILDCARD {
                        vars.insert(v.clone());
                    }
                }
            }
        }
        if let Some(spec) = &self.head_time {
            vars.extend(spec.interval.variables().into_iter().map(str::to_string));
        }
        vars
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if let Some(spec) = &self.head_time {
            write!(f, " {spec}")?;
        }
        if !self.premises.is_empty() {
            write!(f, " :- ")?;
            for (i, premise) in self.premises.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{premise}")?;
            }
        }
        if let Some(transform) = &self.transform {
            write!(f, " |> {transform}")?;
        }
        write!(f, ".")
    }
}

// ============================================================================
// Declarations
// ============================================================================

/// Well-known descriptor atom names.
pub mod descr {
    pub const DOC: &str = "doc";
    pub const ARG: &str = "arg";
    pub const MODE: &str = "mode";
    pub const PRIVATE: &str = "private";
    pub const EXTERNAL: &str = "external";
    pub const REFLECTS: &str = "reflects";
    pub const TEMPORAL: &str = "temporal";
    pub const MAYBE_TEMPORAL: &str = "maybeTemporal";
    pub const FUNDEP: &str = "fundep";
    pub const MERGE: &str = "merge";
    pub const DEFERRED: &str = "deferred";
}

/// Per-argument mode annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArgMode {
    /// `+` - the argument is an input and must be bound at call time
    Input,
    /// `-` - the argument is an output, bound by the call
    Output,
    /// `?` - input or output
    InputOutput,
}

impl ArgMode {
    /// Parse a mode spelling
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "+" => Some(ArgMode::Input),
            "-" => Some(ArgMode::Output),
            "?" => Some(ArgMode::InputOutput),
            _ => None,
        }
    }

    /// Get the concrete-syntax spelling
    pub fn as_str(&self) -> &'static str {
        match self {
            ArgMode::Input => "+",
            ArgMode::Output => "-",
            ArgMode::InputOutput => "?",
        }
    }

    /// Unify two modes; disagreement widens to `?`
    pub fn unify(self, other: ArgMode) -> ArgMode {
        if self == other {
            self
        } else {
            ArgMode::InputOutput
        }
    }
}

/// One bound declaration: a vector of bound expressions aligned with the
/// predicate's argument positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundDecl(pub Vec<Term>);

impl BoundDecl {
    /// Create a bound declaration
    pub fn new(bounds: Vec<Term>) -> Self {
        BoundDecl(bounds)
    }

    /// Number of bound expressions
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when no bounds are present
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A predicate declaration: head atom, descriptor atoms, and bound
/// declarations. `synthetic` marks declarations the collector invented for
/// predicates without a user declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decl {
    pub atom: Atom,
    pub descr: Vec<Atom>,
    pub bounds: Vec<BoundDecl>,
    pub synthetic: bool,
}

impl Decl {
    /// Create a user declaration
    pub fn new(atom: Atom, descr: Vec<Atom>, bounds: Vec<BoundDecl>) -> Self {
        Decl {
            atom,
            descr,
            bounds,
            synthetic: false,
        }
    }

    /// Create a synthetic declaration for an undeclared predicate
    pub fn synthetic(atom: Atom) -> Self {
        Decl {
            atom,
            descr: Vec::new(),
            bounds: Vec::new(),
            synthetic: true,
        }
    }

    /// The declared predicate symbol
    pub fn pred(&self) -> &PredicateSym {
        &self.atom.pred
    }

    /// Check for a given descriptor atom by name
    pub fn has_descr(&self, name: &str) -> bool {
        self.descr.iter().any(|a| a.pred.name == name)
    }

    /// All descriptor atoms with the given name
    pub fn descr_atoms<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Atom> + 'a {
        self.descr.iter().filter(move |a| a.pred.name == name)
    }

    /// Check if the predicate is visible from other packages
    pub fn is_public(&self) -> bool {
        !self.has_descr(descr::PRIVATE)
    }

    /// Check if the predicate is declared temporal
    pub fn is_temporal(&self) -> bool {
        self.has_descr(descr::TEMPORAL)
    }

    /// Check if the predicate is tentatively temporal
    pub fn is_maybe_temporal(&self) -> bool {
        self.has_descr(descr::MAYBE_TEMPORAL)
    }

    /// The declared argument modes, unified across all `mode(...)`
    /// descriptor atoms; `None` when no mode atom is present. Disagreement
    /// between atoms widens the position to `?`.
    pub fn modes(&self) -> Option<Vec<ArgMode>> {
        let mut unified: Option<Vec<ArgMode>> = None;
        for atom in self.descr_atoms(descr::MODE) {
            let modes: Vec<ArgMode> = atom
                .args
                .iter()
                .filter_map(|t| match t {
                    Term::Constant(Const::String(s)) => ArgMode::parse(s),
                    _ => None,
                })
                .collect();
            if modes.len() != atom.args.len() {
                continue;
            }
            unified = Some(match unified {
                None => modes,
                Some(prev) if prev.len() == modes.len() => prev
                    .into_iter()
                    .zip(modes)
                    .map(|(a, b)| a.unify(b))
                    .collect(),
                Some(prev) => prev,
            });
        }
        unified
    }

    /// The name prefix this predicate reflects, if declared
    pub fn reflected_prefix(&self) -> Option<&NamePath> {
        self.descr_atoms(descr::REFLECTS)
            .next()
            .and_then(|atom| atom.args.first())
            .and_then(Term::as_constant)
            .and_then(Const::as_name)
    }

    /// The doc string, if declared
    pub fn doc(&self) -> Option<String> {
        self.descr_atoms(descr::DOC).next().map(|atom| {
            atom.args
                .iter()
                .filter_map(|t| match t {
                    Term::Constant(Const::String(s)) => Some(s.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(" ")
        })
    }
}

impl fmt::Display for Decl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decl {}", self.atom)?;
        if !self.descr.is_empty() {
            write!(f, " descr [")?;
            for (i, atom) in self.descr.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{atom}")?;
            }
            write!(f, "]")?;
        }
        for bound in &self.bounds {
            write!(f, " bound [")?;
            for (i, term) in bound.0.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{term}")?;
            }
            write!(f, "]")?;
        }
        write!(f, ".")
    }
}
