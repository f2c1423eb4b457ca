//! Analysis Error Types
//!
//! Every failure the analyzer can report. Errors are values, never panics;
//! each phase aggregates all of its findings before returning so one bad
//! clause does not mask later ones within the same phase.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis errors, grouped by category.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnalysisError {
    // Structural
    /// Predicate used with the wrong number of arguments
    #[error("predicate {pred} expects {expected} arguments, got {got}")]
    ArityMismatch {
        pred: String,
        expected: usize,
        got: usize,
    },

    /// More than one declaration for the same predicate symbol
    #[error("multiple declarations for predicate {pred}")]
    MultipleDecls { pred: String },

    /// Declarations for the same name disagree on arity
    #[error("conflicting arities for predicate '{name}': {first} vs {second}")]
    ArityConflict {
        name: String,
        first: usize,
        second: usize,
    },

    /// A declaration failed context-free validation
    #[error("invalid declaration for {pred}: {message}")]
    MalformedDecl { pred: String, message: String },

    /// Bound declaration length does not match predicate arity
    #[error("bound declaration for {pred} has {got} entries, expected {expected}")]
    BoundLengthMismatch {
        pred: String,
        expected: usize,
        got: usize,
    },

    /// Unknown function symbol in a function application
    #[error("unknown function {name}")]
    UnknownFunction { name: String },

    /// Function applied with the wrong number of arguments
    #[error("function {name} applied to {got} arguments")]
    FunctionArity { name: String, got: usize },

    // Safety
    /// A head, transform, or built-in input variable is not bound by the body
    #[error("unbound variable {var} in clause {clause}")]
    UnboundVariable { var: String, clause: String },

    /// A transform statement redefines a variable bound by the body
    #[error("transform redefines body variable {var} in clause {clause}")]
    TransformShadowsVariable { var: String, clause: String },

    /// A transform is not well-formed
    #[error("malformed transform in clause {clause}: {message}")]
    MalformedTransform { clause: String, message: String },

    // Visibility
    /// A clause references a private predicate from another package
    #[error("predicate {pred} is private to package '{package}'")]
    PrivatePredicate { pred: String, package: String },

    // Typing
    /// No feasible typing for a premise under the current constraints
    #[error("type mismatch at premise {premise} in clause {clause}")]
    TypeMismatch { clause: String, premise: String },

    /// Inferred relation type does not conform to the declaration
    #[error("inferred type {inferred} for {pred} does not conform to declared {declared}")]
    DeclaredTypeMismatch {
        pred: String,
        inferred: String,
        declared: String,
    },

    /// An initial fact does not conform to the declared relation type
    #[error("initial fact {fact} does not conform to the declared type of {pred}")]
    FactTypeMismatch { pred: String, fact: String },

    /// A structure-aware built-in was applied to a non-structured argument
    #[error("built-in {pred} applied to incompatible argument in clause {clause}")]
    StructureMismatch { pred: String, clause: String },

    // Temporal
    /// A temporal predicate was referenced without a temporal annotation
    #[error("temporal predicate {pred} referenced without temporal annotation in clause {clause}")]
    BareTemporalReference { pred: String, clause: String },

    /// A temporal annotation was applied to a non-temporal predicate
    #[error("non-temporal predicate {pred} referenced with temporal annotation in clause {clause}")]
    TemporalOverNonTemporal { pred: String, clause: String },

    /// A clause head over a temporal predicate is missing its annotation
    #[error("clause for temporal predicate {pred} is missing a temporal annotation: {clause}")]
    MissingTemporalAnnotation { pred: String, clause: String },

    /// A clause head over a non-temporal predicate carries an annotation
    #[error("clause for non-temporal predicate {pred} carries a temporal annotation: {clause}")]
    UnexpectedTemporalAnnotation { pred: String, clause: String },

    /// An interval endpoint variable is not of type Time
    #[error("HeadTime variables must be of type Time: {var} in clause {clause}")]
    IntervalNotTime { var: String, clause: String },

    /// A critical temporal-recursion warning, elevated to an error
    #[error("temporal recursion: {message}")]
    TemporalRecursion { message: String },

    // Stratification
    /// Recursion through negation or aggregation
    #[error("program is not stratifiable: recursion through negation or aggregation involving {pred}")]
    NotStratifiable { pred: String },
}

/// Severity of a temporal-recursion warning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    /// Accumulated in `ProgramInfo`, analysis continues
    Warning,
    /// Elevated to an error
    Critical,
}

/// A temporal-recursion finding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalWarning {
    pub severity: Severity,
    pub message: String,
}

impl TemporalWarning {
    /// Create a non-critical warning
    pub fn warning(message: impl Into<String>) -> Self {
        TemporalWarning {
            severity: Severity::Warning,
            message: message.into(),
        }
    }

    /// Create a critical warning
    pub fn critical(message: impl Into<String>) -> Self {
        TemporalWarning {
            severity: Severity::Critical,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TemporalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.severity {
            Severity::Warning => write!(f, "warning: {}", self.message),
            Severity::Critical => write!(f, "critical: {}", self.message),
        }
    }
}
