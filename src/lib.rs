//! # Stratalog - Static Analysis Core for a Temporal Datalog Dialect
//!
//! Given a parsed program - predicate declarations plus clauses (rules and
//! initial facts) - the analyzer classifies predicates as EDB or IDB,
//! validates clause safety under modes and transforms, rewrites clauses
//! using declaration information, infers and checks relation types,
//! detects temporal recursion, and stratifies the program for evaluation.
//!
//! ## Pipeline
//!
//! ```text
//! parsed units
//!     ↓
//! [DeclChecker]      → declaration validation
//!     ↓
//! [DeclCollector]    → merged + synthetic declarations
//!     ↓
//! [ClauseRewriter]   → reflect, negation delay, temporal normalization
//!     ↓
//! [ClauseChecker]    → safety, visibility, transforms
//!     ↓
//! [BoundsAnalyzer]   → relation-type inference and conformance
//!     ↓
//! [Stratifier]       → strata + temporal warnings
//!     ↓
//! ProgramInfo
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use stratalog::analysis::{Analyzer, BoundsCheckMode, SourceUnit};
//! use stratalog::ast::builders::{ClauseBuilder, DeclBuilder};
//!
//! let unit = SourceUnit {
//!     decls: vec![
//!         DeclBuilder::new("reach").head_vars(["X"]).bound(["/name"]).build(),
//!         DeclBuilder::new("source").head_vars(["X"]).bound(["/name"]).build(),
//!     ],
//!     clauses: vec![ClauseBuilder::new("reach")
//!         .head_vars(["X"])
//!         .body_atom("source", ["X"])
//!         .build()],
//! };
//!
//! let info = Analyzer::new(BoundsCheckMode::Error)
//!     .analyze(&[unit])
//!     .expect("program is well-formed");
//! assert_eq!(info.rules.len(), 1);
//! ```
//!
//! Runtime evaluation, persistence, and concrete syntax are out of scope;
//! the crate consumes already-parsed [`analysis::SourceUnit`]s and returns
//! [`analysis::ProgramInfo`] or an aggregated error list.

// AST and type-expression modules
pub mod ast;
pub mod types;

// Built-in predicate and function vocabulary
pub mod builtin;

// Error types
pub mod error;

// The analysis pipeline
pub mod analysis;

// Re-export the surface most callers need
pub use crate::analysis::{Analyzer, BoundsCheckMode, ProgramInfo, SourceUnit};
pub use crate::ast::{
    Atom, Clause, Const, Decl, FunctionSym, NamePath, Premise, PredicateSym, Term,
};
pub use crate::error::{AnalysisError, Severity, TemporalWarning};
pub use crate::types::TypeExpr;
