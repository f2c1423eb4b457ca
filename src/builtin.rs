//! # Built-in Vocabulary
//!
//! Closed tables of built-in predicates, reducer functions, and scalar
//! functions referenced by the safety checker and the bounds analyzer.
//!
//! Built-in predicate names are `:`-prefixed (`:match_prefix`, `:lt`);
//! function names are `fn:`-prefixed (`fn:count`, `fn:plus`).

use crate::ast::{ArgMode, PredicateSym};
use crate::types::TypeExpr;

/// The group-by transform marker function.
pub const GROUP_BY: &str = "fn:group_by";

/// The prefix-match built-in targeted by the reflect rewrite.
pub const MATCH_PREFIX: &str = ":match_prefix";

// ============================================================================
// Built-in predicates
// ============================================================================

/// Mode pattern of a built-in predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuiltinModes {
    /// A fixed per-argument pattern
    Fixed(&'static [ArgMode]),
    /// `:match`-style: first argument input, every further argument output
    FirstInRestOut,
}

struct BuiltinPred {
    name: &'static str,
    /// Minimum arity; `max_arity` of `None` means unbounded
    min_arity: usize,
    max_arity: Option<usize>,
    modes: BuiltinModes,
}

use ArgMode::{Input, Output};

const IN_IN: &[ArgMode] = &[Input, Input];
const OUT_IN: &[ArgMode] = &[Output, Input];
const IN_IN_OUT: &[ArgMode] = &[Input, Input, Output];
const IN_OUT_OUT: &[ArgMode] = &[Input, Output, Output];

const BUILTIN_PREDS: &[BuiltinPred] = &[
    BuiltinPred {
        name: ":match_prefix",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":match_entry",
        min_arity: 3,
        max_arity: Some(3),
        modes: BuiltinModes::Fixed(IN_IN_OUT),
    },
    BuiltinPred {
        name: ":match_field",
        min_arity: 3,
        max_arity: Some(3),
        modes: BuiltinModes::Fixed(IN_IN_OUT),
    },
    BuiltinPred {
        name: ":match_cons",
        min_arity: 3,
        max_arity: Some(3),
        modes: BuiltinModes::Fixed(IN_OUT_OUT),
    },
    BuiltinPred {
        name: ":match",
        min_arity: 3,
        max_arity: None,
        modes: BuiltinModes::FirstInRestOut,
    },
    BuiltinPred {
        name: ":list:member",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(OUT_IN),
    },
    BuiltinPred {
        name: ":lt",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":le",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":gt",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":ge",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":string:starts_with",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":string:ends_with",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":string:contains",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":time:lt",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":time:le",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":time:gt",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":time:ge",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
    BuiltinPred {
        name: ":duration:le",
        min_arity: 2,
        max_arity: Some(2),
        modes: BuiltinModes::Fixed(IN_IN),
    },
];

fn lookup(name: &str) -> Option<&'static BuiltinPred> {
    BUILTIN_PREDS.iter().find(|p| p.name == name)
}

/// Check if the name denotes a known built-in predicate
pub fn is_builtin_pred(name: &str) -> bool {
    lookup(name).is_some()
}

/// Check that a built-in predicate is used with a legal arity
pub fn builtin_arity_ok(pred: &PredicateSym) -> bool {
    match lookup(&pred.name) {
        Some(spec) => {
            pred.arity >= spec.min_arity
                && spec.max_arity.is_none_or(|max| pred.arity <= max)
        }
        None => false,
    }
}

/// The argument modes of a built-in predicate at the given arity
pub fn builtin_modes(pred: &PredicateSym) -> Option<Vec<ArgMode>> {
    let spec = lookup(&pred.name)?;
    match spec.modes {
        BuiltinModes::Fixed(modes) => Some(modes.to_vec()),
        BuiltinModes::FirstInRestOut => {
            let mut modes = vec![Input];
            modes.resize(pred.arity, Output);
            Some(modes)
        }
    }
}

/// The fixed relation type of a comparison-style built-in, if it has one.
/// The structure-aware built-ins (`:match_*`, `:list:member`) are typed by
/// the bounds analyzer instead.
pub fn comparison_rel_type(name: &str) -> Option<TypeExpr> {
    let row = |t: TypeExpr| TypeExpr::Rel(vec![t.clone(), t]);
    match name {
        ":lt" | ":le" | ":gt" | ":ge" => Some(row(TypeExpr::Number)),
        ":string:starts_with" | ":string:ends_with" | ":string:contains" => {
            Some(row(TypeExpr::String))
        }
        ":time:lt" | ":time:le" | ":time:gt" | ":time:ge" => Some(row(TypeExpr::Time)),
        ":duration:le" => Some(row(TypeExpr::Duration)),
        _ => None,
    }
}

// ============================================================================
// Functions
// ============================================================================

const REDUCERS: &[&str] = &[
    "fn:count",
    "fn:sum",
    "fn:min",
    "fn:max",
    "fn:collect",
    "fn:collect_distinct",
    "fn:collect_to_map",
];

/// Check if the name denotes a reducer function
pub fn is_reducer(name: &str) -> bool {
    REDUCERS.contains(&name)
}

/// Declared arity of a known function symbol; `-1` is variadic.
/// `fn:count` alone takes zero arguments.
pub fn function_arity(name: &str) -> Option<i32> {
    match name {
        "fn:count" => Some(0),
        "fn:sum" | "fn:min" | "fn:max" => Some(1),
        "fn:collect" | "fn:collect_distinct" => Some(-1),
        "fn:collect_to_map" => Some(2),
        GROUP_BY => Some(-1),
        "fn:plus" | "fn:minus" | "fn:mult" => Some(-1),
        "fn:div" => Some(2),
        "fn:float:plus" | "fn:float:mult" => Some(-1),
        "fn:float:div" => Some(2),
        "fn:string:concat" => Some(-1),
        "fn:list" => Some(-1),
        "fn:pair" => Some(2),
        "fn:tuple" => Some(-1),
        "fn:map" | "fn:struct" => Some(-1),
        _ => None,
    }
}

/// Check a function application's argument count against the declared
/// arity. Variadic symbols accept any nonzero count, except `fn:group_by`
/// and `fn:list`, which also accept zero.
pub fn function_arity_ok(name: &str, argc: usize) -> bool {
    match function_arity(name) {
        Some(-1) => argc > 0 || name == GROUP_BY || name == "fn:list",
        Some(n) => argc == usize::try_from(n).unwrap_or(usize::MAX),
        None => false,
    }
}

/// Argument and result typing class of a scalar function, consumed by the
/// bounds analyzer's `check_fun_apply`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnClass {
    /// All-Number arguments, Number result
    Arith,
    /// All-Float64 arguments, Float64 result
    FloatArith,
    /// All-String arguments, String result
    StringConcat,
    /// `fn:list` - List of the joined argument types
    ListCtor,
    /// `fn:pair`
    PairCtor,
    /// `fn:tuple` (at least three components)
    TupleCtor,
    /// `fn:map` (even argument count)
    MapCtor,
    /// `fn:struct` (even argument count, name-constant fields)
    StructCtor,
}

/// Classify a scalar (non-reducer) function by name
pub fn fn_class(name: &str) -> Option<FnClass> {
    match name {
        "fn:plus" | "fn:minus" | "fn:mult" | "fn:div" => Some(FnClass::Arith),
        "fn:float:plus" | "fn:float:mult" | "fn:float:div" => Some(FnClass::FloatArith),
        "fn:string:concat" => Some(FnClass::StringConcat),
        "fn:list" => Some(FnClass::ListCtor),
        "fn:pair" => Some(FnClass::PairCtor),
        "fn:tuple" => Some(FnClass::TupleCtor),
        "fn:map" => Some(FnClass::MapCtor),
        "fn:struct" => Some(FnClass::StructCtor),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup() {
        assert!(is_builtin_pred(":match_prefix"));
        assert!(is_builtin_pred(":duration:le"));
        assert!(!is_builtin_pred("edge"));
        assert!(!is_builtin_pred(":nope"));
    }

    #[test]
    fn test_builtin_arity() {
        assert!(builtin_arity_ok(&PredicateSym::new(":match_prefix", 2)));
        assert!(!builtin_arity_ok(&PredicateSym::new(":match_prefix", 3)));
        // :match is >= 3
        assert!(builtin_arity_ok(&PredicateSym::new(":match", 4)));
        assert!(!builtin_arity_ok(&PredicateSym::new(":match", 2)));
    }

    #[test]
    fn test_match_modes_first_in_rest_out() {
        let modes = builtin_modes(&PredicateSym::new(":match", 4)).expect("modes");
        assert_eq!(modes, vec![Input, Output, Output, Output]);
    }

    #[test]
    fn test_reducer_arity() {
        assert!(function_arity_ok("fn:count", 0));
        assert!(!function_arity_ok("fn:count", 1));
        assert!(function_arity_ok("fn:sum", 1));
        assert!(!function_arity_ok("fn:sum", 2));
        assert!(function_arity_ok("fn:collect", 2));
        assert!(!function_arity_ok("fn:collect", 0));
    }

    #[test]
    fn test_group_by_accepts_zero_args() {
        assert!(function_arity_ok(GROUP_BY, 0));
        assert!(function_arity_ok(GROUP_BY, 3));
    }

    #[test]
    fn test_comparison_rel_types() {
        assert_eq!(
            comparison_rel_type(":lt"),
            Some(TypeExpr::Rel(vec![TypeExpr::Number, TypeExpr::Number]))
        );
        assert!(comparison_rel_type(":match_prefix").is_none());
    }
}
