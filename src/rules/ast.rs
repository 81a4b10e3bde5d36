//! Expression tree types (C5): the raw, user-facing form deserialized from
//! a Play artefact (`RawExpr`/`RawOperand`) and the compiled, validated form
//! the evaluator actually walks (`CompiledExpr`/`Operand`/`CompiledRef`).
//!
//! Ported from `original_source/src/backtest/rules/dsl_nodes.py` per
//! SPEC_FULL.md §4.7: both forms are immutable, cheaply cloneable value
//! types. Compilation resolves every path once; the hot path never parses
//! a string again.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::feed::TfRole;

// ── Raw (deserialized) form ──────────────────────────────────────────

/// One leaf operand as it appears in a Play artefact: either a bare
/// reference path / literal token, a literal number or bool straight from
/// TOML, or a nested arithmetic composition.
///
/// Also serializes (round-trip, not just read): a Play's full identity
/// hash is the canonical JSON encoding of its raw action trees, matching
/// `fingerprint.rs::StrategyConfig::full_hash`'s "serde_json with
/// deterministic key order" convention.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOperand {
    Arithmetic(Box<RawArithmetic>),
    Number(f64),
    Bool(bool),
    /// A path (`"indicator.rsi_14"`), a bare enum token (`"bullish"`), or a
    /// stringly-encoded literal (`"50"`, `"true"`) — disambiguated by the
    /// compiler, never here.
    Token(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawArithmetic {
    pub left: RawOperand,
    pub op: String,
    pub right: RawOperand,
}

/// Condition tree node as deserialized from a Play's `actions.*` block.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawExpr {
    Cond {
        lhs: RawOperand,
        op: String,
        rhs: RawOperand,
        tolerance: Option<f64>,
    },
    All {
        children: Vec<RawExpr>,
    },
    Any {
        children: Vec<RawExpr>,
    },
    Not {
        child: Box<RawExpr>,
    },
    HoldsFor {
        bars: usize,
        anchor_tf: Option<String>,
        child: Box<RawExpr>,
    },
    OccurredWithin {
        bars: usize,
        anchor_tf: Option<String>,
        child: Box<RawExpr>,
    },
    CountTrue {
        bars: usize,
        min_true: usize,
        anchor_tf: Option<String>,
        child: Box<RawExpr>,
    },
    SetupRef {
        setup_id: String,
    },
}

// ── Compiled form ────────────────────────────────────────────────────

/// A resolved, pre-parsed path into the snapshot (spec.md §3, "Compiled
/// Reference"). Produced once at compile time and stored inline on the
/// condition node thereafter.
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledRef {
    Price { source: String, field: String, role: TfRole },
    Indicator { key: String, role: TfRole },
    Structure { block: String, field: String, role: TfRole },
    StructureZone { block: String, zone: String, field: String, role: TfRole },
}

impl CompiledRef {
    /// Fully-qualified feed key this reference resolves against — the same
    /// string a `Feed`'s indicator/structure array was registered under.
    pub fn feed_key(&self) -> String {
        match self {
            CompiledRef::Price { field, .. } => field.clone(),
            CompiledRef::Indicator { key, .. } => key.clone(),
            CompiledRef::Structure { block, field, .. } => format!("{block}.{field}"),
            CompiledRef::StructureZone { block, zone, field, .. } => {
                format!("{block}.zones.{zone}.{field}")
            }
        }
    }

    pub fn role(&self) -> TfRole {
        match self {
            CompiledRef::Price { role, .. }
            | CompiledRef::Indicator { role, .. }
            | CompiledRef::Structure { role, .. }
            | CompiledRef::StructureZone { role, .. } => *role,
        }
    }

    pub fn path_repr(&self) -> String {
        let role_suffix = match self.role() {
            TfRole::Exec => String::new(),
            TfRole::MedTf => ".med_tf".to_string(),
            TfRole::HighTf => ".high_tf".to_string(),
        };
        match self {
            CompiledRef::Price { source, field, .. } => format!("price.{source}.{field}"),
            CompiledRef::Indicator { key, .. } => format!("indicator.{key}{role_suffix}"),
            CompiledRef::Structure { block, field, .. } => {
                format!("structure.{block}.{field}")
            }
            CompiledRef::StructureZone { block, zone, field, .. } => {
                format!("structure.{block}.zones.{zone}.{field}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Bool(bool),
    Enum(String),
}

impl Literal {
    pub fn repr(&self) -> String {
        match self {
            Literal::Number(n) => n.to_string(),
            Literal::Bool(b) => b.to_string(),
            Literal::Enum(s) => s.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

/// A compiled leaf/arithmetic operand. `Range`/`List` only ever appear as
/// the RHS of `between`/`in` respectively — they are not arithmetic leaves.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Ref(CompiledRef),
    Literal(Literal),
    Arithmetic(Box<Operand>, ArithOp, Box<Operand>),
    Range(f64, f64),
    List(Vec<Literal>),
}

impl Operand {
    pub fn repr(&self) -> String {
        match self {
            Operand::Ref(r) => r.path_repr(),
            Operand::Literal(l) => l.repr(),
            Operand::Arithmetic(l, op, r) => {
                let sym = match op {
                    ArithOp::Add => "+",
                    ArithOp::Sub => "-",
                    ArithOp::Mul => "*",
                    ArithOp::Div => "/",
                    ArithOp::Mod => "%",
                };
                format!("({} {} {})", l.repr(), sym, r.repr())
            }
            Operand::Range(lo, hi) => format!("[{lo}, {hi}]"),
            Operand::List(items) => {
                format!("[{}]", items.iter().map(Literal::repr).collect::<Vec<_>>().join(", "))
            }
        }
    }
}

/// Closed operator set (spec.md §4.5). Crossover operators are reachable
/// only through `Cond` — the compiler never produces them anywhere else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    NearAbs,
    NearPct,
    Between,
    In,
    CrossAbove,
    CrossBelow,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::NearAbs => "near_abs",
            Operator::NearPct => "near_pct",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::CrossAbove => "cross_above",
            Operator::CrossBelow => "cross_below",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CondExpr {
    pub lhs: Operand,
    pub op: Operator,
    pub rhs: Operand,
    pub tolerance: Option<f64>,
}

/// Compiled AST node. Pure data; a Play's identity hash incorporates the
/// canonical encoding of this tree (spec.md §4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum CompiledExpr {
    Cond(CondExpr),
    All(Vec<CompiledExpr>),
    Any(Vec<CompiledExpr>),
    Not(Box<CompiledExpr>),
    HoldsFor { bars: usize, scale: usize, child: Box<CompiledExpr> },
    OccurredWithin { bars: usize, scale: usize, child: Box<CompiledExpr> },
    CountTrue { bars: usize, min_true: usize, scale: usize, child: Box<CompiledExpr> },
    SetupRef(String),
}

/// A reusable, named condition referenced from action blocks via
/// `SetupRef`. Setups may declare their own features, which the compiler
/// folds into the same declared-feature registry used for the rest of the
/// Play before resolving the setup's own condition.
#[derive(Debug, Clone)]
pub struct Setup {
    pub id: String,
    pub condition: CompiledExpr,
}

pub type SetupTable = BTreeMap<String, Setup>;
