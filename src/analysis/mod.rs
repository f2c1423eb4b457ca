//! # Static Analysis Pipeline
//!
//! Six passes over an immutable AST, producing the [`ProgramInfo`] that
//! downstream evaluation consumes:
//!
//! ```text
//! parsed units
//!     ↓
//! [DeclChecker]      → per-declaration validation
//!     ↓
//! [DeclCollector]    → merged decls, synthetic decls, temporal promotion
//!     ↓
//! [ClauseRewriter]   → reflect rewrite, negation delay, temporal normalization
//!     ↓
//! [ClauseChecker]    → safety, transforms, visibility, temporal consistency
//!     ↓
//! [BoundsAnalyzer]   → relation-type inference and conformance
//!     ↓
//! [Stratifier + TemporalCheck] → strata, temporal warnings
//!     ↓
//! ProgramInfo
//! ```
//!
//! Later passes consume the outputs of earlier ones; nothing is mutated in
//! place. Every phase aggregates all of its findings before failing, so one
//! bad clause does not mask another within the same phase.

use crate::ast::{Clause, Decl, Interval, PredicateSym};
use crate::error::{AnalysisError, Severity, TemporalWarning};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub mod bounds;
pub mod collect;
pub mod decl_check;
pub mod rewrite;
pub mod safety;
pub mod stratify;
pub mod temporal;

pub use bounds::{BoundsAnalyzer, BoundsCheckMode};
pub use stratify::{DependencyGraph, DependencyType, Stratification};

/// One parsed source unit: declarations plus clauses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceUnit {
    pub decls: Vec<Decl>,
    pub clauses: Vec<Clause>,
}

/// The analysis result consumed by evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramInfo {
    /// Predicates supplied by facts only
    pub edb_predicates: BTreeSet<PredicateSym>,
    /// Predicates computed by rules
    pub idb_predicates: BTreeSet<PredicateSym>,
    /// Head atoms of body-less clauses
    pub initial_facts: Vec<crate::ast::Atom>,
    /// Parallel vector of optional fact intervals
    pub initial_fact_times: Vec<Option<Interval>>,
    /// Clauses with a non-empty body, post-rewrite
    pub rules: Vec<Clause>,
    /// Desugared per-predicate declarations, synthetic ones included
    #[serde(
        serialize_with = "serialize_map_as_pairs",
        deserialize_with = "deserialize_map_from_pairs"
    )]
    pub decls: BTreeMap<PredicateSym, Decl>,
    /// Non-critical temporal warnings
    pub warnings: Vec<TemporalWarning>,
    /// Strata in evaluation order
    pub strata: Vec<Vec<PredicateSym>>,
    /// Stratum index per predicate
    #[serde(
        serialize_with = "serialize_map_as_pairs",
        deserialize_with = "deserialize_map_from_pairs"
    )]
    pub pred_to_stratum: BTreeMap<PredicateSym, usize>,
}

// `PredicateSym` serializes as a struct, which `serde_json` cannot use as a
// JSON object key ("key must be a string"). Encode these maps as sequences
// of pairs instead so `ProgramInfo` keeps round-tripping through serde_json.
fn serialize_map_as_pairs<S, K, V>(map: &BTreeMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    K: Serialize,
    V: Serialize,
{
    use serde::ser::SerializeSeq;
    let mut seq = serializer.serialize_seq(Some(map.len()))?;
    for pair in map {
        seq.serialize_element(&pair)?;
    }
    seq.end()
}

fn deserialize_map_from_pairs<'de, D, K, V>(deserializer: D) -> Result<BTreeMap<K, V>, D::Error>
where
    D: serde::Deserializer<'de>,
    K: Deserialize<'de> + Ord,
    V: Deserialize<'de>,
{
    let pairs: Vec<(K, V)> = Vec::deserialize(deserializer)?;
    Ok(pairs.into_iter().collect())
}

/// The analyzer façade. Configure once, analyze many programs.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    extra_decls: Vec<Decl>,
    mode: BoundsCheckMode,
}

impl Analyzer {
    /// Create an analyzer with the given bounds-checking mode.
    pub fn new(mode: BoundsCheckMode) -> Self {
        Analyzer {
            extra_decls: Vec::new(),
            mode,
        }
    }

    /// Supply ambient declarations for host-injected predicates.
    pub fn with_extra_decls(mut self, decls: Vec<Decl>) -> Self {
        self.extra_decls = decls;
        self
    }

    /// Run the full pipeline over the given source units.
    pub fn analyze(&self, units: &[SourceUnit]) -> Result<ProgramInfo, Vec<AnalysisError>> {
        let user_decls: Vec<Decl> = units.iter().flat_map(|u| u.decls.clone()).collect();
        let clauses: Vec<Clause> = units.iter().flat_map(|u| u.clauses.clone()).collect();

        // Per-declaration validation.
        debug!(decls = user_decls.len(), "checking declarations");
        let mut errors: Vec<AnalysisError> = user_decls
            .iter()
            .flat_map(decl_check::check_decl)
            .collect();
        if !errors.is_empty() {
            return Err(errors);
        }

        // Merge, synthesize, promote.
        debug!("collecting declarations");
        let decls = collect::collect_decls(&user_decls, &self.extra_decls, &clauses)?;

        // Rewrite under the collected declarations.
        debug!(clauses = clauses.len(), "rewriting clauses");
        let rewritten: Vec<Clause> = clauses
            .iter()
            .map(|clause| rewrite::rewrite_clause(clause, &decls))
            .collect();

        // Safety and temporal consistency aggregate across the program.
        debug!("checking clause safety");
        errors.extend(collect::check_temporal_consistency(&rewritten, &decls));
        for clause in &rewritten {
            errors.extend(safety::check_clause(clause, &decls));
        }
        if !errors.is_empty() {
            return Err(errors);
        }

        // Relation-type inference and conformance.
        debug!("running bounds analysis");
        BoundsAnalyzer::new(&decls, &rewritten, self.mode).run()?;

        // Stratification.
        debug!("stratifying");
        let stratification = stratify::stratify(&rewritten)?;

        // Temporal recursion warnings; critical findings become errors.
        let mut warnings = temporal::check_temporal_recursion(&rewritten, &decls);
        let critical: Vec<AnalysisError> = warnings
            .iter()
            .filter(|w| w.severity == Severity::Critical)
            .map(|w| AnalysisError::TemporalRecursion {
                message: w.message.clone(),
            })
            .collect();
        if !critical.is_empty() {
            return Err(critical);
        }
        warnings.retain(|w| w.severity == Severity::Warning);

        Ok(build_program_info(rewritten, decls, warnings, stratification))
    }
}

fn build_program_info(
    rewritten: Vec<Clause>,
    decls: BTreeMap<PredicateSym, Decl>,
    warnings: Vec<TemporalWarning>,
    stratification: Stratification,
) -> ProgramInfo {
    let mut idb_predicates: BTreeSet<PredicateSym> = BTreeSet::new();
    let mut referenced: BTreeSet<PredicateSym> = BTreeSet::new();
    for clause in &rewritten {
        referenced.insert(clause.head.pred.clone());
        if !clause.is_fact() {
            idb_predicates.insert(clause.head.pred.clone());
        }
        for premise in &clause.premises {
            if let Some(pred) = premise.pred() {
                if !pred.is_builtin() {
                    referenced.insert(pred.clone());
                }
            }
        }
    }
    let edb_predicates: BTreeSet<PredicateSym> =
        referenced.difference(&idb_predicates).cloned().collect();

    let mut initial_facts = Vec::new();
    let mut initial_fact_times = Vec::new();
    let mut rules = Vec::new();
    for clause in rewritten {
        if clause.is_fact() {
            initial_fact_times.push(clause.head_time.as_ref().map(|s| s.interval.clone()));
            initial_facts.push(clause.head);
        } else {
            rules.push(clause);
        }
    }

    ProgramInfo {
        edb_predicates,
        idb_predicates,
        initial_facts,
        initial_fact_times,
        rules,
        decls,
        warnings,
        strata: stratification.strata,
        pred_to_stratum: stratification.stratum_of,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::builders::ClauseBuilder;

    #[test]
    fn test_edb_idb_disjoint() {
        let unit = SourceUnit {
            decls: vec![],
            clauses: vec![
                Clause::fact(crate::ast::Atom::new(
                    "edge",
                    vec![
                        crate::ast::Term::Constant(crate::ast::Const::Number(1)),
                        crate::ast::Term::Constant(crate::ast::Const::Number(2)),
                    ],
                )),
                ClauseBuilder::new("path")
                    .head_vars(["X", "Y"])
                    .body_atom("edge", ["X", "Y"])
                    .build(),
            ],
        };
        let info = Analyzer::default().analyze(&[unit]).expect("analysis");
        assert!(info.edb_predicates.is_disjoint(&info.idb_predicates));
        assert!(info.edb_predicates.contains(&PredicateSym::new("edge", 2)));
        assert!(info.idb_predicates.contains(&PredicateSym::new("path", 2)));
        assert_eq!(info.initial_facts.len(), 1);
        assert_eq!(info.initial_fact_times.len(), 1);
        assert_eq!(info.rules.len(), 1);
    }

    #[test]
    fn test_fact_and_rule_head_is_idb() {
        // A predicate with both a fact and a rule is IDB.
        let unit = SourceUnit {
            decls: vec![],
            clauses: vec![
                Clause::fact(crate::ast::Atom::new(
                    "p",
                    vec![crate::ast::Term::Constant(crate::ast::Const::Number(1))],
                )),
                ClauseBuilder::new("p").head_vars(["X"]).body_atom("q", ["X"]).build(),
            ],
        };
        let info = Analyzer::default().analyze(&[unit]).expect("analysis");
        assert!(info.idb_predicates.contains(&PredicateSym::new("p", 1)));
        assert!(!info.edb_predicates.contains(&PredicateSym::new("p", 1)));
    }
}
