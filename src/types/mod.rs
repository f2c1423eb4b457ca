//! # Type-Expression Lattice
//!
//! Bound expressions constrain variables and predicate arguments during
//! relation-type inference. They form a lattice under subtyping with `Any`
//! at the top and `Bot` at the bottom; `Empty` is the failure element a meet
//! produces when two constraints have no common instance.
//!
//! Name constants are hierarchical: `/foo/bar` is a subtype of `/foo`, of
//! `/name`, and of `/any`. The [`NameTrie`] computes the deepest declared
//! prefix of a name constant, which is that constant's bound.

use crate::ast::{Const, FunctionSym, NamePath, Term, WILDCARD};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

// ============================================================================
// Type expressions
// ============================================================================

/// A bound expression / type expression.
///
/// Relation types are `Rel(...)` rows; a predicate's relation-type expression
/// is either one `Rel` or a `Union` of `Rel`s (its "alternatives").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// Top of the lattice; every value conforms
    Any,
    /// Bottom of the lattice; the element type of the empty list
    Bot,
    /// The failure element: no value has this type
    Empty,
    /// All name constants
    Name,
    /// 64-bit integers
    Number,
    /// 64-bit floats
    Float64,
    /// Strings
    String,
    /// Timestamps
    Time,
    /// Durations
    Duration,
    /// Name constants under a declared prefix, e.g. `/foo/bar`
    NamePrefix(NamePath),
    /// Exactly one constant
    Singleton(Const),
    /// Homogeneous lists
    List(Box<TypeExpr>),
    /// Optional values
    Option(Box<TypeExpr>),
    /// Two-element products
    Pair(Box<TypeExpr>, Box<TypeExpr>),
    /// Products of three or more components
    Tuple(Vec<TypeExpr>),
    /// Maps from key type to value type
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// Records with named fields, sorted by field path
    Struct(Vec<(NamePath, TypeExpr)>),
    /// Untagged unions
    Union(Vec<TypeExpr>),
    /// Relation row types
    Rel(Vec<TypeExpr>),
    /// A type variable (free in polymorphic alternatives)
    Var(String),
}

impl TypeExpr {
    /// Build a list type
    pub fn list(elem: TypeExpr) -> Self {
        TypeExpr::List(Box::new(elem))
    }

    /// Build a map type
    pub fn map(key: TypeExpr, value: TypeExpr) -> Self {
        TypeExpr::Map(Box::new(key), Box::new(value))
    }

    /// Build a struct type; fields are sorted by path for canonical compare
    pub fn struct_of(mut fields: Vec<(NamePath, TypeExpr)>) -> Self {
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        TypeExpr::Struct(fields)
    }

    /// Build a name-prefix type from a `/foo/bar` spelling; panics on
    /// malformed paths (test helper)
    pub fn prefix(path: &str) -> Self {
        TypeExpr::NamePrefix(NamePath::parse(path).expect("malformed name path"))
    }

    /// Canonicalize a union: flatten, drop `Empty`, drop duplicates and
    /// members subsumed by another member, and order deterministically.
    /// Zero members collapse to `Empty`, one member to itself.
    pub fn union_of(members: Vec<TypeExpr>) -> Self {
        let mut flat: Vec<TypeExpr> = Vec::new();
        let mut stack = members;
        stack.reverse();
        while let Some(member) = stack.pop() {
            match member {
                TypeExpr::Union(inner) => {
                    for m in inner.into_iter().rev() {
                        stack.push(m);
                    }
                }
                TypeExpr::Empty => {}
                other => {
                    if !flat.contains(&other) {
                        flat.push(other);
                    }
                }
            }
        }
        // Absorb members subsumed by another member.
        let mut kept: Vec<TypeExpr> = Vec::new();
        for (i, member) in flat.iter().enumerate() {
            let subsumed = flat.iter().enumerate().any(|(j, other)| {
                i != j
                    && member != other
                    && conforms(&mut TypeContext::new(), member, other)
            });
            if !subsumed && !kept.contains(member) {
                kept.push(member.clone());
            }
        }
        if kept.is_empty() {
            // All members identical or subsumed pairwise; fall back to flat.
            kept = flat;
            kept.dedup();
        }
        match kept.len() {
            0 => TypeExpr::Empty,
            1 => kept.into_iter().next().unwrap_or(TypeExpr::Empty),
            _ => {
                kept.sort_by_key(|t| t.to_string());
                TypeExpr::Union(kept)
            }
        }
    }

    /// The alternatives of a relation-type expression: members for a
    /// `Union`, the expression itself otherwise.
    pub fn alternatives(&self) -> Vec<&TypeExpr> {
        match self {
            TypeExpr::Union(members) => members.iter().collect(),
            other => vec![other],
        }
    }

    /// Check if this is the failure element
    pub fn is_empty_type(&self) -> bool {
        matches!(self, TypeExpr::Empty)
    }

    /// Free type-variable names in this expression
    pub fn free_vars(&self) -> BTreeSet<String> {
        let mut vars = BTreeSet::new();
        self.collect_free_vars(&mut vars);
        vars
    }

    fn collect_free_vars(&self, vars: &mut BTreeSet<String>) {
        match self {
            TypeExpr::Var(name) => {
                vars.insert(name.clone());
            }
            TypeExpr::List(t) | TypeExpr::Option(t) => t.collect_free_vars(vars),
            TypeExpr::Pair(a, b) | TypeExpr::Map(a, b) => {
                a.collect_free_vars(vars);
                b.collect_free_vars(vars);
            }
            TypeExpr::Tuple(ts) | TypeExpr::Union(ts) | TypeExpr::Rel(ts) => {
                for t in ts {
                    t.collect_free_vars(vars);
                }
            }
            TypeExpr::Struct(fields) => {
                for (_, t) in fields {
                    t.collect_free_vars(vars);
                }
            }
            _ => {}
        }
    }

    /// Rename free type variables according to the substitution
    pub fn rename_vars(&self, subst: &BTreeMap<String, String>) -> TypeExpr {
        match self {
            TypeExpr::Var(name) => match subst.get(name) {
                Some(fresh) => TypeExpr::Var(fresh.clone()),
                None => self.clone(),
            },
            TypeExpr::List(t) => TypeExpr::list(t.rename_vars(subst)),
            TypeExpr::Option(t) => TypeExpr::Option(Box::new(t.rename_vars(subst))),
            TypeExpr::Pair(a, b) => {
                TypeExpr::Pair(Box::new(a.rename_vars(subst)), Box::new(b.rename_vars(subst)))
            }
            TypeExpr::Map(k, v) => TypeExpr::map(k.rename_vars(subst), v.rename_vars(subst)),
            TypeExpr::Tuple(ts) => {
                TypeExpr::Tuple(ts.iter().map(|t| t.rename_vars(subst)).collect())
            }
            TypeExpr::Union(ts) => {
                TypeExpr::Union(ts.iter().map(|t| t.rename_vars(subst)).collect())
            }
            TypeExpr::Rel(ts) => TypeExpr::Rel(ts.iter().map(|t| t.rename_vars(subst)).collect()),
            TypeExpr::Struct(fields) => TypeExpr::Struct(
                fields
                    .iter()
                    .map(|(p, t)| (p.clone(), t.rename_vars(subst)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Substitute type variables by their context bindings, leaving unbound
    /// variables in place
    pub fn apply_ctx(&self, ctx: &TypeContext) -> TypeExpr {
        match self {
            TypeExpr::Var(name) => match ctx.upper(name) {
                Some(bound) if !matches!(bound, TypeExpr::Any) => bound.clone(),
                _ => self.clone(),
            },
            TypeExpr::List(t) => TypeExpr::list(t.apply_ctx(ctx)),
            TypeExpr::Option(t) => TypeExpr::Option(Box::new(t.apply_ctx(ctx))),
            TypeExpr::Pair(a, b) => {
                TypeExpr::Pair(Box::new(a.apply_ctx(ctx)), Box::new(b.apply_ctx(ctx)))
            }
            TypeExpr::Map(k, v) => TypeExpr::map(k.apply_ctx(ctx), v.apply_ctx(ctx)),
            TypeExpr::Tuple(ts) => TypeExpr::Tuple(ts.iter().map(|t| t.apply_ctx(ctx)).collect()),
            TypeExpr::Union(ts) => {
                TypeExpr::union_of(ts.iter().map(|t| t.apply_ctx(ctx)).collect())
            }
            TypeExpr::Rel(ts) => TypeExpr::Rel(ts.iter().map(|t| t.apply_ctx(ctx)).collect()),
            TypeExpr::Struct(fields) => TypeExpr::Struct(
                fields
                    .iter()
                    .map(|(p, t)| (p.clone(), t.apply_ctx(ctx)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Any => write!(f, "/any"),
            TypeExpr::Bot => write!(f, "/bot"),
            TypeExpr::Empty => write!(f, "/empty"),
            TypeExpr::Name => write!(f, "/name"),
            TypeExpr::Number => write!(f, "/number"),
            TypeExpr::Float64 => write!(f, "/float64"),
            TypeExpr::String => write!(f, "/string"),
            TypeExpr::Time => write!(f, "/time"),
            TypeExpr::Duration => write!(f, "/duration"),
            TypeExpr::NamePrefix(path) => write!(f, "{path}"),
            TypeExpr::Singleton(c) => write!(f, "Singleton({c})"),
            TypeExpr::List(t) => write!(f, "List({t})"),
            TypeExpr::Option(t) => write!(f, "Option({t})"),
            TypeExpr::Pair(a, b) => write!(f, "Pair({a}, {b})"),
            TypeExpr::Tuple(ts) => {
                write!(f, "Tuple(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            TypeExpr::Map(k, v) => write!(f, "Map({k}, {v})"),
            TypeExpr::Struct(fields) => {
                write!(f, "Struct(")?;
                for (i, (path, t)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{path}, {t}")?;
                }
                write!(f, ")")
            }
            TypeExpr::Union(ts) => {
                write!(f, "Union(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            TypeExpr::Rel(ts) => {
                write!(f, "Rel(")?;
                for (i, t) in ts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{t}")?;
                }
                write!(f, ")")
            }
            TypeExpr::Var(name) => write!(f, "{name}"),
        }
    }
}

// ============================================================================
// Parsing bound expressions from terms
// ============================================================================

/// Error from parsing a bound-expression term.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TypeParseError {
    #[error("malformed bound expression: {0}")]
    Malformed(String),
    #[error("empty union type is not allowed")]
    EmptyUnion,
    #[error("{0} constructor requires an even argument count")]
    OddPairing(String),
    #[error("Tuple requires at least three components, got {0}")]
    ShortTuple(usize),
}

impl TypeExpr {
    /// Parse a bound-expression term into a type expression.
    ///
    /// Base types are spelled as name constants (`/any`, `/number`, ...),
    /// other name constants denote name-prefix types, variables denote type
    /// variables, and `Apply` terms denote the type constructors.
    pub fn from_term(term: &Term) -> Result<TypeExpr, TypeParseError> {
        match term {
            Term::Variable(v) if v == WILDCARD => Ok(TypeExpr::Any),
            Term::Variable(v) => Ok(TypeExpr::Var(v.clone())),
            Term::Constant(Const::Name(path)) => Ok(Self::from_name_path(path)),
            Term::Constant(c) => Ok(TypeExpr::Singleton(c.clone())),
            Term::Apply(func, args) => Self::from_apply(func, args),
        }
    }

    fn from_name_path(path: &NamePath) -> TypeExpr {
        if path.len() == 1 {
            match path.segments()[0].as_str() {
                "any" => return TypeExpr::Any,
                "bot" => return TypeExpr::Bot,
                "name" => return TypeExpr::Name,
                "number" => return TypeExpr::Number,
                "float64" => return TypeExpr::Float64,
                "string" => return TypeExpr::String,
                "time" => return TypeExpr::Time,
                "duration" => return TypeExpr::Duration,
                _ => {}
            }
        }
        TypeExpr::NamePrefix(path.clone())
    }

    fn from_apply(func: &FunctionSym, args: &[Term]) -> Result<TypeExpr, TypeParseError> {
        let sub = |t: &Term| TypeExpr::from_term(t);
        match func.name.as_str() {
            "List" => match args {
                [] => Ok(TypeExpr::list(TypeExpr::Bot)),
                [elem] => Ok(TypeExpr::list(sub(elem)?)),
                _ => Err(TypeParseError::Malformed(format!(
                    "List takes at most one argument, got {}",
                    args.len()
                ))),
            },
            "Option" => match args {
                [elem] => Ok(TypeExpr::Option(Box::new(sub(elem)?))),
                _ => Err(TypeParseError::Malformed(
                    "Option takes exactly one argument".to_string(),
                )),
            },
            "Pair" => match args {
                [a, b] => Ok(TypeExpr::Pair(Box::new(sub(a)?), Box::new(sub(b)?))),
                _ => Err(TypeParseError::Malformed(
                    "Pair takes exactly two arguments".to_string(),
                )),
            },
            "Tuple" => {
                if args.len() < 3 {
                    return Err(TypeParseError::ShortTuple(args.len()));
                }
                let parts: Result<Vec<_>, _> = args.iter().map(sub).collect();
                Ok(TypeExpr::Tuple(parts?))
            }
            "Map" => match args {
                [k, v] => Ok(TypeExpr::map(sub(k)?, sub(v)?)),
                _ => Err(TypeParseError::Malformed(
                    "Map takes exactly two arguments".to_string(),
                )),
            },
            "Struct" => {
                if args.len() % 2 != 0 {
                    return Err(TypeParseError::OddPairing("Struct".to_string()));
                }
                let mut fields = Vec::with_capacity(args.len() / 2);
                for chunk in args.chunks(2) {
                    let path = chunk[0]
                        .as_constant()
                        .and_then(Const::as_name)
                        .ok_or_else(|| {
                            TypeParseError::Malformed(format!(
                                "Struct field {} is not a name constant",
                                chunk[0]
                            ))
                        })?;
                    fields.push((path.clone(), sub(&chunk[1])?));
                }
                Ok(TypeExpr::struct_of(fields))
            }
            "Union" => {
                if args.is_empty() {
                    return Err(TypeParseError::EmptyUnion);
                }
                let parts: Result<Vec<_>, _> = args.iter().map(sub).collect();
                Ok(TypeExpr::union_of(parts?))
            }
            "Singleton" => match args {
                [Term::Constant(c)] => Ok(TypeExpr::Singleton(c.clone())),
                _ => Err(TypeParseError::Malformed(
                    "Singleton takes exactly one constant argument".to_string(),
                )),
            },
            "Rel" => {
                let parts: Result<Vec<_>, _> = args.iter().map(sub).collect();
                Ok(TypeExpr::Rel(parts?))
            }
            other => Err(TypeParseError::Malformed(format!(
                "unknown type constructor {other}"
            ))),
        }
    }
}

// ============================================================================
// Type-variable contexts and skolemization
// ============================================================================

/// Per-type-variable bounds tracked during inference and conformance.
///
/// The `upper` bound shrinks as meets refine the variable; the `lower`
/// bound grows as conformance checks accumulate witnessed subtypes. A
/// variable is consistent while `lower` conforms to `upper`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeContext {
    bindings: BTreeMap<String, TypeBinding>,
}

#[derive(Debug, Clone, PartialEq)]
struct TypeBinding {
    upper: TypeExpr,
    lower: TypeExpr,
}

impl TypeContext {
    /// Create an empty context
    pub fn new() -> Self {
        TypeContext::default()
    }

    /// Introduce a type variable with the given upper bound
    pub fn introduce(&mut self, name: impl Into<String>, upper: TypeExpr) {
        self.bindings.insert(
            name.into(),
            TypeBinding {
                upper,
                lower: TypeExpr::Bot,
            },
        );
    }

    /// Check if the variable is known to this context
    pub fn contains(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// The current upper bound of a variable
    pub fn upper(&self, name: &str) -> Option<&TypeExpr> {
        self.bindings.get(name).map(|b| &b.upper)
    }

    /// The accumulated lower bound of a variable
    pub fn lower(&self, name: &str) -> Option<&TypeExpr> {
        self.bindings.get(name).map(|b| &b.lower)
    }

    /// Replace a variable's upper bound
    pub fn refine_upper(&mut self, name: &str, upper: TypeExpr) {
        let entry = self
            .bindings
            .entry(name.to_string())
            .or_insert_with(|| TypeBinding {
                upper: TypeExpr::Any,
                lower: TypeExpr::Bot,
            });
        entry.upper = upper;
    }

    fn raise_lower(&mut self, name: &str, lower: TypeExpr) {
        let entry = self
            .bindings
            .entry(name.to_string())
            .or_insert_with(|| TypeBinding {
                upper: TypeExpr::Any,
                lower: TypeExpr::Bot,
            });
        entry.lower = lower;
    }

    /// Names currently in scope
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }
}

/// Allocates fresh type-variable names disjoint from every name in scope.
#[derive(Debug, Clone, Default)]
pub struct FreshNameAllocator {
    used: BTreeSet<String>,
}

impl FreshNameAllocator {
    /// Create an allocator that avoids the given names
    pub fn avoiding<I: IntoIterator<Item = String>>(names: I) -> Self {
        FreshNameAllocator {
            used: names.into_iter().collect(),
        }
    }

    /// Record a name as in scope
    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    /// Produce a fresh name derived from `base`
    pub fn fresh(&mut self, base: &str) -> String {
        if !self.used.contains(base) {
            self.used.insert(base.to_string());
            return base.to_string();
        }
        let mut counter = 1usize;
        loop {
            let candidate = format!("{base}#{counter}");
            if !self.used.contains(&candidate) {
                self.used.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }
}

/// Rename the free type variables of `expr` to fresh skolem names, add them
/// to `ctx` with upper bound `Any`, and return the renamed expression with
/// the substitution used.
pub fn skolemize(
    expr: &TypeExpr,
    ctx: &mut TypeContext,
    alloc: &mut FreshNameAllocator,
) -> (TypeExpr, BTreeMap<String, String>) {
    let mut subst = BTreeMap::new();
    for var in expr.free_vars() {
        let fresh = alloc.fresh(&var);
        ctx.introduce(fresh.clone(), TypeExpr::Any);
        subst.insert(var, fresh);
    }
    (expr.rename_vars(&subst), subst)
}

// ============================================================================
// Name trie
// ============================================================================

/// A prefix tree over name-path segments. Lookup returns the deepest
/// declared prefix of a path; deeper declared paths yield more specific
/// bounds (monotone in depth).
#[derive(Debug, Clone, Default)]
pub struct NameTrie {
    root: TrieNode,
}

#[derive(Debug, Clone, Default)]
struct TrieNode {
    children: BTreeMap<String, TrieNode>,
    declared: bool,
}

impl NameTrie {
    /// Create an empty trie
    pub fn new() -> Self {
        NameTrie::default()
    }

    /// Declare a prefix
    pub fn insert(&mut self, path: &NamePath) {
        let mut node = &mut self.root;
        for segment in path.segments() {
            node = node.children.entry(segment.clone()).or_default();
        }
        node.declared = true;
    }

    /// The deepest declared prefix of `path`, if any
    pub fn deepest_prefix(&self, path: &NamePath) -> Option<NamePath> {
        let mut node = &self.root;
        let mut deepest: Option<usize> = None;
        for (depth, segment) in path.segments().iter().enumerate() {
            node = match node.children.get(segment) {
                Some(child) => child,
                None => break,
            };
            if node.declared {
                deepest = Some(depth + 1);
            }
        }
        deepest.map(|d| NamePath::new(path.segments()[..d].to_vec()))
    }

    /// The bound of a name constant: its deepest declared prefix, falling
    /// back to `/name`
    pub fn bound_for(&self, path: &NamePath) -> TypeExpr {
        match self.deepest_prefix(path) {
            Some(prefix) => TypeExpr::NamePrefix(prefix),
            None => TypeExpr::Name,
        }
    }
}

// ============================================================================
// Constant typing
// ============================================================================

/// The natural bound of a constant. Name constants take their deepest
/// declared prefix from the trie when one is supplied.
pub fn type_of_const(c: &Const, trie: Option<&NameTrie>) -> TypeExpr {
    match c {
        Const::Number(_) => TypeExpr::Number,
        Const::Float(_) => TypeExpr::Float64,
        Const::String(_) => TypeExpr::String,
        Const::Time(_) => TypeExpr::Time,
        Const::Duration(_) => TypeExpr::Duration,
        Const::Name(path) => match trie {
            Some(trie) => trie.bound_for(path),
            None => TypeExpr::NamePrefix(path.clone()),
        },
        Const::List(items) => {
            let elem = items
                .iter()
                .map(|item| type_of_const(item, trie))
                .fold(TypeExpr::Bot, |acc, t| upper_bound(&acc, &t));
            TypeExpr::list(elem)
        }
        Const::Map(entries) => {
            let (mut key, mut value) = (TypeExpr::Bot, TypeExpr::Bot);
            for (k, v) in entries {
                key = upper_bound(&key, &type_of_const(k, trie));
                value = upper_bound(&value, &type_of_const(v, trie));
            }
            TypeExpr::map(key, value)
        }
        Const::Struct(fields) => {
            let mut typed = Vec::with_capacity(fields.len());
            for (k, v) in fields {
                let path = match k.as_name() {
                    Some(p) => p.clone(),
                    None => return TypeExpr::Empty,
                };
                typed.push((path, type_of_const(v, trie)));
            }
            TypeExpr::struct_of(typed)
        }
    }
}

/// Check that a constant inhabits a type without consulting a trie.
fn const_conforms(c: &Const, ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Any => true,
        TypeExpr::Bot | TypeExpr::Empty => false,
        TypeExpr::Number => matches!(c, Const::Number(_)),
        TypeExpr::Float64 => matches!(c, Const::Float(_)),
        TypeExpr::String => matches!(c, Const::String(_)),
        TypeExpr::Time => matches!(c, Const::Time(_)),
        TypeExpr::Duration => matches!(c, Const::Duration(_)),
        TypeExpr::Name => matches!(c, Const::Name(_)),
        TypeExpr::NamePrefix(prefix) => {
            matches!(c, Const::Name(path) if prefix.is_prefix_of(path))
        }
        TypeExpr::Singleton(d) => c == d,
        TypeExpr::List(elem) => match c {
            Const::List(items) => items.iter().all(|item| const_conforms(item, elem)),
            _ => false,
        },
        TypeExpr::Map(k, v) => match c {
            Const::Map(entries) => entries
                .iter()
                .all(|(ck, cv)| const_conforms(ck, k) && const_conforms(cv, v)),
            _ => false,
        },
        TypeExpr::Struct(fields) => match c {
            Const::Struct(centries) => fields.iter().all(|(path, ft)| {
                centries
                    .iter()
                    .any(|(ck, cv)| ck.as_name() == Some(path) && const_conforms(cv, ft))
            }),
            _ => false,
        },
        TypeExpr::Union(members) => members.iter().any(|m| const_conforms(c, m)),
        TypeExpr::Option(inner) => const_conforms(c, inner),
        TypeExpr::Pair(_, _) | TypeExpr::Tuple(_) | TypeExpr::Rel(_) | TypeExpr::Var(_) => false,
    }
}

// ============================================================================
// Lattice operations
// ============================================================================

/// Least upper bound (join) under subtyping. Heterogeneous joins produce a
/// canonical union rather than collapsing straight to `Any`.
pub fn upper_bound(a: &TypeExpr, b: &TypeExpr) -> TypeExpr {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (TypeExpr::Any, _) | (_, TypeExpr::Any) => TypeExpr::Any,
        (TypeExpr::Bot | TypeExpr::Empty, other) | (other, TypeExpr::Bot | TypeExpr::Empty) => {
            other.clone()
        }
        (TypeExpr::NamePrefix(p), TypeExpr::NamePrefix(q)) => {
            let common: Vec<String> = p
                .segments()
                .iter()
                .zip(q.segments())
                .take_while(|(x, y)| x == y)
                .map(|(x, _)| x.clone())
                .collect();
            if common.is_empty() {
                TypeExpr::Name
            } else {
                TypeExpr::NamePrefix(NamePath::new(common))
            }
        }
        (TypeExpr::NamePrefix(_) | TypeExpr::Name, TypeExpr::Name | TypeExpr::NamePrefix(_)) => {
            TypeExpr::Name
        }
        (TypeExpr::Singleton(c), other) | (other, TypeExpr::Singleton(c)) => {
            if const_conforms(c, other) {
                other.clone()
            } else {
                upper_bound(&type_of_const(c, None), other)
            }
        }
        (TypeExpr::List(x), TypeExpr::List(y)) => TypeExpr::list(upper_bound(x, y)),
        (TypeExpr::Option(x), TypeExpr::Option(y)) => {
            TypeExpr::Option(Box::new(upper_bound(x, y)))
        }
        (TypeExpr::Pair(a1, a2), TypeExpr::Pair(b1, b2)) => TypeExpr::Pair(
            Box::new(upper_bound(a1, b1)),
            Box::new(upper_bound(a2, b2)),
        ),
        (TypeExpr::Tuple(xs), TypeExpr::Tuple(ys)) if xs.len() == ys.len() => TypeExpr::Tuple(
            xs.iter()
                .zip(ys)
                .map(|(x, y)| upper_bound(x, y))
                .collect(),
        ),
        (TypeExpr::Map(k1, v1), TypeExpr::Map(k2, v2)) => {
            TypeExpr::map(upper_bound(k1, k2), upper_bound(v1, v2))
        }
        (TypeExpr::Rel(xs), TypeExpr::Rel(ys)) if xs.len() == ys.len() => TypeExpr::Rel(
            xs.iter()
                .zip(ys)
                .map(|(x, y)| upper_bound(x, y))
                .collect(),
        ),
        (TypeExpr::Struct(xs), TypeExpr::Struct(ys)) => {
            // Join on common fields; fields missing on one side are dropped.
            let mut fields = Vec::new();
            for (path, xt) in xs {
                if let Some((_, yt)) = ys.iter().find(|(q, _)| q == path) {
                    fields.push((path.clone(), upper_bound(xt, yt)));
                }
            }
            TypeExpr::struct_of(fields)
        }
        _ => TypeExpr::union_of(vec![a.clone(), b.clone()]),
    }
}

/// Greatest lower bound (meet). Produces `Empty` when the two constraints
/// have no common instance. Type variables in either operand are refined in
/// `ctx`: the variable's upper bound shrinks to the meet.
pub fn meet(ctx: &mut TypeContext, a: &TypeExpr, b: &TypeExpr) -> TypeExpr {
    if a == b {
        return a.clone();
    }
    match (a, b) {
        (TypeExpr::Var(x), TypeExpr::Var(y)) => {
            let ux = ctx.upper(x).cloned().unwrap_or(TypeExpr::Any);
            let uy = ctx.upper(y).cloned().unwrap_or(TypeExpr::Any);
            let m = meet(ctx, &ux, &uy);
            if m.is_empty_type() {
                return TypeExpr::Empty;
            }
            ctx.refine_upper(x, m.clone());
            ctx.refine_upper(y, m.clone());
            m
        }
        (TypeExpr::Var(x), other) | (other, TypeExpr::Var(x)) => {
            let ux = ctx.upper(x).cloned().unwrap_or(TypeExpr::Any);
            let m = meet(ctx, &ux, other);
            if m.is_empty_type() {
                return TypeExpr::Empty;
            }
            ctx.refine_upper(x, m.clone());
            m
        }
        (TypeExpr::Empty, _) | (_, TypeExpr::Empty) => TypeExpr::Empty,
        (TypeExpr::Any, other) | (other, TypeExpr::Any) => other.clone(),
        (TypeExpr::Bot, _) | (_, TypeExpr::Bot) => TypeExpr::Bot,
        (TypeExpr::NamePrefix(p), TypeExpr::NamePrefix(q)) => {
            if p.is_prefix_of(q) {
                TypeExpr::NamePrefix(q.clone())
            } else if q.is_prefix_of(p) {
                TypeExpr::NamePrefix(p.clone())
            } else {
                TypeExpr::Empty
            }
        }
        (TypeExpr::NamePrefix(p), TypeExpr::Name) | (TypeExpr::Name, TypeExpr::NamePrefix(p)) => {
            TypeExpr::NamePrefix(p.clone())
        }
        (TypeExpr::Singleton(c), other) | (other, TypeExpr::Singleton(c)) => {
            if const_conforms(c, other) {
                TypeExpr::Singleton(c.clone())
            } else {
                TypeExpr::Empty
            }
        }
        (TypeExpr::Union(members), other) | (other, TypeExpr::Union(members)) => {
            let met: Vec<TypeExpr> = members
                .iter()
                .map(|m| meet(ctx, m, other))
                .filter(|m| !m.is_empty_type())
                .collect();
            TypeExpr::union_of(met)
        }
        (TypeExpr::List(x), TypeExpr::List(y)) => {
            let elem = meet(ctx, x, y);
            if elem.is_empty_type() {
                TypeExpr::Empty
            } else {
                TypeExpr::list(elem)
            }
        }
        (TypeExpr::Option(x), TypeExpr::Option(y)) => {
            let inner = meet(ctx, x, y);
            if inner.is_empty_type() {
                TypeExpr::Empty
            } else {
                TypeExpr::Option(Box::new(inner))
            }
        }
        (TypeExpr::Pair(a1, a2), TypeExpr::Pair(b1, b2)) => {
            let first = meet(ctx, a1, b1);
            let second = meet(ctx, a2, b2);
            if first.is_empty_type() || second.is_empty_type() {
                TypeExpr::Empty
            } else {
                TypeExpr::Pair(Box::new(first), Box::new(second))
            }
        }
        (TypeExpr::Tuple(xs), TypeExpr::Tuple(ys)) if xs.len() == ys.len() => {
            let mut parts = Vec::with_capacity(xs.len());
            for (x, y) in xs.iter().zip(ys) {
                let m = meet(ctx, x, y);
                if m.is_empty_type() {
                    return TypeExpr::Empty;
                }
                parts.push(m);
            }
            TypeExpr::Tuple(parts)
        }
        (TypeExpr::Map(k1, v1), TypeExpr::Map(k2, v2)) => {
            let key = meet(ctx, k1, k2);
            let value = meet(ctx, v1, v2);
            if key.is_empty_type() || value.is_empty_type() {
                TypeExpr::Empty
            } else {
                TypeExpr::map(key, value)
            }
        }
        (TypeExpr::Struct(xs), TypeExpr::Struct(ys)) => {
            // Merge field maps; meet on common fields, keep the rest.
            let mut fields: Vec<(NamePath, TypeExpr)> = Vec::new();
            for (path, xt) in xs {
                match ys.iter().find(|(q, _)| q == path) {
                    Some((_, yt)) => {
                        let m = meet(ctx, xt, yt);
                        if m.is_empty_type() {
                            return TypeExpr::Empty;
                        }
                        fields.push((path.clone(), m));
                    }
                    None => fields.push((path.clone(), xt.clone())),
                }
            }
            for (path, yt) in ys {
                if !xs.iter().any(|(p, _)| p == path) {
                    fields.push((path.clone(), yt.clone()));
                }
            }
            TypeExpr::struct_of(fields)
        }
        (TypeExpr::Rel(xs), TypeExpr::Rel(ys)) if xs.len() == ys.len() => {
            let mut parts = Vec::with_capacity(xs.len());
            for (x, y) in xs.iter().zip(ys) {
                let m = meet(ctx, x, y);
                if m.is_empty_type() {
                    return TypeExpr::Empty;
                }
                parts.push(m);
            }
            TypeExpr::Rel(parts)
        }
        _ => TypeExpr::Empty,
    }
}

/// Subtyping check: does every instance of `sub` inhabit `sup`?
///
/// Skolem type variables on the `sup` side accumulate lower bounds in `ctx`
/// (join of every witnessed subtype) and stay consistent while that lower
/// bound conforms to the variable's upper bound.
pub fn conforms(ctx: &mut TypeContext, sub: &TypeExpr, sup: &TypeExpr) -> bool {
    if sub == sup {
        return true;
    }
    match (sub, sup) {
        (_, TypeExpr::Any) => true,
        (TypeExpr::Bot | TypeExpr::Empty, _) => true,
        (_, TypeExpr::Empty) => false,
        (sub, TypeExpr::Var(x)) => {
            let lower = ctx.lower(x).cloned().unwrap_or(TypeExpr::Bot);
            let upper = ctx.upper(x).cloned().unwrap_or(TypeExpr::Any);
            let raised = upper_bound(&lower, sub);
            if conforms(ctx, &raised, &upper) {
                ctx.raise_lower(x, raised);
                true
            } else {
                false
            }
        }
        (TypeExpr::Var(x), sup) => {
            let upper = ctx.upper(x).cloned().unwrap_or(TypeExpr::Any);
            conforms(ctx, &upper, sup)
        }
        (TypeExpr::Union(members), sup) => {
            members.iter().all(|m| conforms(ctx, m, sup))
        }
        (sub, TypeExpr::Union(members)) => {
            members.iter().any(|m| conforms(ctx, sub, m))
        }
        (TypeExpr::NamePrefix(_), TypeExpr::Name) => true,
        (TypeExpr::NamePrefix(p), TypeExpr::NamePrefix(q)) => q.is_prefix_of(p),
        (TypeExpr::Singleton(c), sup) => const_conforms(c, sup),
        (TypeExpr::List(x), TypeExpr::List(y)) => conforms(ctx, x, y),
        (TypeExpr::Option(x), TypeExpr::Option(y)) => conforms(ctx, x, y),
        (TypeExpr::Pair(a1, a2), TypeExpr::Pair(b1, b2)) => {
            conforms(ctx, a1, b1) && conforms(ctx, a2, b2)
        }
        (TypeExpr::Tuple(xs), TypeExpr::Tuple(ys)) if xs.len() == ys.len() => {
            xs.iter().zip(ys).all(|(x, y)| conforms(ctx, x, y))
        }
        (TypeExpr::Map(k1, v1), TypeExpr::Map(k2, v2)) => {
            conforms(ctx, k1, k2) && conforms(ctx, v1, v2)
        }
        (TypeExpr::Struct(xs), TypeExpr::Struct(ys)) => {
            // Width subtyping: the subtype may carry extra fields.
            ys.iter().all(|(path, yt)| {
                xs.iter()
                    .any(|(p, xt)| p == path && conforms(ctx, xt, yt))
            })
        }
        (TypeExpr::Rel(xs), TypeExpr::Rel(ys)) if xs.len() == ys.len() => {
            xs.iter().zip(ys).all(|(x, y)| conforms(ctx, x, y))
        }
        _ => false,
    }
}

/// Relation-type conformance: every alternative of `inferred` must conform
/// to some alternative of `declared`. Polymorphic declared alternatives are
/// skolemized into `ctx` before checking, so one alternative's variables are
/// shared across its components but not across alternatives.
pub fn set_conforms(ctx: &TypeContext, inferred: &TypeExpr, declared: &TypeExpr) -> bool {
    let declared_alts: Vec<&TypeExpr> = declared.alternatives();
    inferred.alternatives().iter().all(|alt| {
        declared_alts.iter().any(|decl_alt| {
            let mut scratch = ctx.clone();
            let mut alloc = FreshNameAllocator::avoiding(
                scratch.names().map(str::to_string).collect::<Vec<_>>(),
            );
            let (skolemized, _) = skolemize(decl_alt, &mut scratch, &mut alloc);
            conforms(&mut scratch, alt, &skolemized)
        })
    })
}
