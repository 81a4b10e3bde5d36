//! Compile time (C5): resolves every raw path in a Play's action blocks
//! against the declared feature/structure registry, rejects banned
//! operators, and produces the pure-data `CompiledExpr` the evaluator
//! walks. Ported from `original_source/src/backtest/rules/dsl_nodes.py`'s
//! validation pass (SPEC_FULL.md §4.7).

use std::collections::{BTreeSet, HashMap};

use thiserror::Error;

use crate::domain::{Timeframe, TimeframeError};
use crate::feed::TfRole;
use crate::structure::StructureType;

use super::ast::{
    ArithOp, CompiledExpr, CompiledRef, CondExpr, Literal, Operand, RawArithmetic, RawExpr,
    RawOperand, Setup, SetupTable,
};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompileError {
    #[error("unknown reference namespace in path '{0}' — expected price./indicator./structure.")]
    UnknownNamespace(String),

    #[error(
        "undeclared indicator key '{key}' on timeframe role {role:?} — declared keys: [{declared}]"
    )]
    UndeclaredIndicator { key: String, role: TfRole, declared: String },

    #[error("undeclared structure block '{0}' — declared blocks: [{1}]")]
    UndeclaredStructureBlock(String, String),

    #[error("structure block '{block}' has no field '{field}' for its kind {kind:?}")]
    UndeclaredStructureField { block: String, field: String, kind: StructureType },

    #[error("structure block '{0}' has no zones declared")]
    StructureHasNoZones(String),

    #[error("undeclared zone '{zone}' on structure block '{block}'")]
    UndeclaredZone { block: String, zone: String },

    #[error("undeclared setup id '{0}' — declared setups: [{1}]")]
    UndeclaredSetup(String, String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("crossover operators (cross_above/cross_below) require a feature reference on the left-hand side and a feature reference or numeric literal on the right-hand side, got '{0}' and '{1}'")]
    CrossoverRequiresFeatureRefs(String, String),

    #[error("'==' / '!=' reject a float literal on either side ('{0}'); use near_abs/near_pct with an explicit tolerance")]
    FloatEquality(String),

    #[error("near_abs/near_pct require an explicit tolerance")]
    MissingTolerance,

    #[error("'between' requires exactly two numeric bounds, got '{0}'")]
    InvalidBetweenBounds(String),

    #[error("'in' requires a non-empty literal list, got '{0}'")]
    InvalidInList(String),

    #[error("unknown arithmetic operator '{0}'")]
    UnknownArithOp(String),

    #[error("invalid timeframe in anchor_tf: {0}")]
    InvalidAnchorTf(#[from] TimeframeError),

    #[error("anchor_tf {anchor_minutes}m is not an integer multiple of exec_tf {exec_minutes}m")]
    AnchorTfNotMultiple { anchor_minutes: i64, exec_minutes: i64 },

    #[error("empty boolean composition ('{0}' with zero children)")]
    EmptyComposition(&'static str),
}

/// Everything the Play's declared features/structures expose, keyed the
/// way paths reference them. Built once when a Play is compiled; consumed
/// read-only by every `compile_expr` call that follows (setups included).
#[derive(Debug, Clone, Default)]
pub struct DeclaredRegistry {
    pub price_sources: BTreeSet<String>,
    pub indicator_keys: HashMap<TfRole, BTreeSet<String>>,
    pub structure_roles: HashMap<String, TfRole>,
    pub structure_kinds: HashMap<String, StructureType>,
    pub structure_zone_keys: HashMap<String, BTreeSet<String>>,
    pub setup_ids: BTreeSet<String>,
    pub exec_tf_minutes: i64,
}

pub(crate) const SWING_FIELDS: &[&str] =
    &["high_level", "low_level", "high_version", "low_version", "pair_version", "pair_direction"];
pub(crate) const TREND_FIELDS: &[&str] = &["state"];
pub(crate) const ZONE_FIELDS: &[&str] = &["state", "upper", "lower"];
const PRICE_FIELDS: &[&str] = &["open", "high", "low", "close", "volume"];

impl DeclaredRegistry {
    pub fn indicator_declared(&self, role: TfRole, key: &str) -> bool {
        self.indicator_keys.get(&role).is_some_and(|s| s.contains(key))
    }

    fn declared_indicator_list(&self, role: TfRole) -> String {
        self.indicator_keys
            .get(&role)
            .map(|s| s.iter().cloned().collect::<Vec<_>>().join(", "))
            .unwrap_or_default()
    }

    fn structure_field_kind(&self, block: &str, field: &str) -> Option<StructureType> {
        let kind = *self.structure_kinds.get(block)?;
        let valid = match kind {
            StructureType::Swing => SWING_FIELDS,
            StructureType::Trend => TREND_FIELDS,
        };
        valid.contains(&field).then_some(kind)
    }
}

/// Parses a reference path (`price.mark.close`, `indicator.rsi_14.high_tf`,
/// `structure.swing1.high_level`, `structure.swing1.zones.demand.state`)
/// into a [`CompiledRef`]. Pure function of `(path, declared)`, per
/// spec.md §3.
pub fn compile_ref(path: &str, declared: &DeclaredRegistry) -> Result<CompiledRef, CompileError> {
    let parts: Vec<&str> = path.split('.').collect();
    match parts.as_slice() {
        ["price", source, field] => {
            if !PRICE_FIELDS.contains(field) {
                return Err(CompileError::UnknownNamespace(path.to_string()));
            }
            Ok(CompiledRef::Price {
                source: source.to_string(),
                field: field.to_string(),
                role: TfRole::Exec,
            })
        }
        ["indicator", key] => {
            if !declared.indicator_declared(TfRole::Exec, key) {
                return Err(CompileError::UndeclaredIndicator {
                    key: key.to_string(),
                    role: TfRole::Exec,
                    declared: declared.declared_indicator_list(TfRole::Exec),
                });
            }
            Ok(CompiledRef::Indicator { key: key.to_string(), role: TfRole::Exec })
        }
        ["indicator", key, role_tok] => {
            let role = parse_tf_role(role_tok)?;
            if !declared.indicator_declared(role, key) {
                return Err(CompileError::UndeclaredIndicator {
                    key: key.to_string(),
                    role,
                    declared: declared.declared_indicator_list(role),
                });
            }
            Ok(CompiledRef::Indicator { key: key.to_string(), role })
        }
        ["structure", block, field] => {
            let role = *declared
                .structure_roles
                .get(*block)
                .ok_or_else(|| {
                    CompileError::UndeclaredStructureBlock(
                        block.to_string(),
                        declared.structure_roles.keys().cloned().collect::<Vec<_>>().join(", "),
                    )
                })?;
            let kind = declared.structure_field_kind(block, field).ok_or_else(|| {
                CompileError::UndeclaredStructureField {
                    block: block.to_string(),
                    field: field.to_string(),
                    kind: *declared.structure_kinds.get(*block).unwrap(),
                }
            })?;
            let _ = kind;
            Ok(CompiledRef::Structure { block: block.to_string(), field: field.to_string(), role })
        }
        ["structure", block, "zones", zone, field] => {
            let role = *declared.structure_roles.get(*block).ok_or_else(|| {
                CompileError::UndeclaredStructureBlock(
                    block.to_string(),
                    declared.structure_roles.keys().cloned().collect::<Vec<_>>().join(", "),
                )
            })?;
            let zones = declared
                .structure_zone_keys
                .get(*block)
                .ok_or_else(|| CompileError::StructureHasNoZones(block.to_string()))?;
            if !zones.contains(*zone) {
                return Err(CompileError::UndeclaredZone {
                    block: block.to_string(),
                    zone: zone.to_string(),
                });
            }
            if !ZONE_FIELDS.contains(field) {
                return Err(CompileError::UndeclaredStructureField {
                    block: block.to_string(),
                    field: field.to_string(),
                    kind: StructureType::Swing,
                });
            }
            Ok(CompiledRef::StructureZone {
                block: block.to_string(),
                zone: zone.to_string(),
                field: field.to_string(),
                role,
            })
        }
        _ => Err(CompileError::UnknownNamespace(path.to_string())),
    }
}

fn parse_tf_role(tok: &str) -> Result<TfRole, CompileError> {
    match tok {
        "exec" => Ok(TfRole::Exec),
        "med_tf" => Ok(TfRole::MedTf),
        "high_tf" => Ok(TfRole::HighTf),
        _ => Err(CompileError::UnknownNamespace(tok.to_string())),
    }
}

fn is_path(token: &str) -> bool {
    token.starts_with("price.") || token.starts_with("indicator.") || token.starts_with("structure.")
}

fn compile_operand(raw: &RawOperand, declared: &DeclaredRegistry) -> Result<Operand, CompileError> {
    match raw {
        RawOperand::Number(n) => Ok(Operand::Literal(Literal::Number(*n))),
        RawOperand::Bool(b) => Ok(Operand::Literal(Literal::Bool(*b))),
        RawOperand::Token(tok) => {
            if is_path(tok) {
                return Ok(Operand::Ref(compile_ref(tok, declared)?));
            }
            if let Ok(n) = tok.parse::<f64>() {
                return Ok(Operand::Literal(Literal::Number(n)));
            }
            match tok.as_str() {
                "true" => Ok(Operand::Literal(Literal::Bool(true))),
                "false" => Ok(Operand::Literal(Literal::Bool(false))),
                other => Ok(Operand::Literal(Literal::Enum(other.to_string()))),
            }
        }
        RawOperand::Arithmetic(a) => compile_arithmetic(a, declared),
    }
}

fn compile_arithmetic(
    raw: &RawArithmetic,
    declared: &DeclaredRegistry,
) -> Result<Operand, CompileError> {
    let left = compile_operand(&raw.left, declared)?;
    let right = compile_operand(&raw.right, declared)?;
    let op = match raw.op.as_str() {
        "+" => ArithOp::Add,
        "-" => ArithOp::Sub,
        "*" => ArithOp::Mul,
        "/" => ArithOp::Div,
        "%" => ArithOp::Mod,
        other => return Err(CompileError::UnknownArithOp(other.to_string())),
    };
    Ok(Operand::Arithmetic(Box::new(left), op, Box::new(right)))
}

fn is_float_literal(op: &Operand) -> bool {
    matches!(op, Operand::Literal(Literal::Number(n)) if n.fract() != 0.0)
}

fn compile_cond(
    lhs: &RawOperand,
    op: &str,
    rhs: &RawOperand,
    tolerance: Option<f64>,
    declared: &DeclaredRegistry,
) -> Result<CompiledExpr, CompileError> {
    let operator = match op {
        ">" => super::ast::Operator::Gt,
        "<" => super::ast::Operator::Lt,
        ">=" => super::ast::Operator::Ge,
        "<=" => super::ast::Operator::Le,
        "==" => super::ast::Operator::Eq,
        "!=" => super::ast::Operator::Ne,
        "near_abs" => super::ast::Operator::NearAbs,
        "near_pct" => super::ast::Operator::NearPct,
        "between" => super::ast::Operator::Between,
        "in" => super::ast::Operator::In,
        "cross_above" => super::ast::Operator::CrossAbove,
        "cross_below" => super::ast::Operator::CrossBelow,
        other => return Err(CompileError::UnknownOperator(other.to_string())),
    };

    use super::ast::Operator as Op;

    // `between`/`in` carry their RHS shape directly — a two-element range or
    // a literal list — rather than going through `compile_operand`.
    if operator == Op::Between {
        let compiled_lhs = compile_operand(lhs, declared)?;
        let (lo, hi) = extract_two_numbers(rhs)
            .ok_or_else(|| CompileError::InvalidBetweenBounds(format!("{rhs:?}")))?;
        return Ok(CompiledExpr::Cond(CondExpr {
            lhs: compiled_lhs,
            op: operator,
            rhs: Operand::Range(lo, hi),
            tolerance: None,
        }));
    }
    if operator == Op::In {
        let compiled_lhs = compile_operand(lhs, declared)?;
        let items = extract_list(rhs)
            .ok_or_else(|| CompileError::InvalidInList(format!("{rhs:?}")))?;
        return Ok(CompiledExpr::Cond(CondExpr {
            lhs: compiled_lhs,
            op: operator,
            rhs: Operand::List(items),
            tolerance: None,
        }));
    }

    let compiled_lhs = compile_operand(lhs, declared)?;
    let compiled_rhs = compile_operand(rhs, declared)?;

    if matches!(operator, Op::NearAbs | Op::NearPct) && tolerance.is_none() {
        return Err(CompileError::MissingTolerance);
    }
    if matches!(operator, Op::Eq | Op::Ne)
        && (is_float_literal(&compiled_lhs) || is_float_literal(&compiled_rhs))
    {
        return Err(CompileError::FloatEquality(format!(
            "{} {} {}",
            compiled_lhs.repr(),
            op,
            compiled_rhs.repr()
        )));
    }
    if matches!(operator, Op::CrossAbove | Op::CrossBelow)
        && !(matches!(compiled_lhs, Operand::Ref(_))
            && matches!(compiled_rhs, Operand::Ref(_) | Operand::Literal(Literal::Number(_))))
    {
        return Err(CompileError::CrossoverRequiresFeatureRefs(
            compiled_lhs.repr(),
            compiled_rhs.repr(),
        ));
    }

    Ok(CompiledExpr::Cond(CondExpr {
        lhs: compiled_lhs,
        op: operator,
        rhs: compiled_rhs,
        tolerance,
    }))
}

/// `between`'s RHS is conventionally written as an arithmetic node whose
/// `op` is ignored and whose `left`/`right` are the two bounds — this
/// keeps the raw wire format to a single recursive `RawOperand` shape
/// without a dedicated range literal type.
fn extract_two_numbers(raw: &RawOperand) -> Option<(f64, f64)> {
    match raw {
        RawOperand::Arithmetic(a) => {
            let lo = match &a.left {
                RawOperand::Number(n) => *n,
                RawOperand::Token(t) => t.parse().ok()?,
                _ => return None,
            };
            let hi = match &a.right {
                RawOperand::Number(n) => *n,
                RawOperand::Token(t) => t.parse().ok()?,
                _ => return None,
            };
            Some((lo, hi))
        }
        _ => None,
    }
}

fn extract_list(raw: &RawOperand) -> Option<Vec<Literal>> {
    // `in`'s RHS is a `Token` carrying a comma-separated literal list
    // (`"bullish,bearish"`) — the simplest shape a TOML string can hold
    // without a dedicated array-of-literals wire type.
    match raw {
        RawOperand::Token(t) => {
            let items: Vec<Literal> = t
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| {
                    if let Ok(n) = s.parse::<f64>() {
                        Literal::Number(n)
                    } else if s == "true" {
                        Literal::Bool(true)
                    } else if s == "false" {
                        Literal::Bool(false)
                    } else {
                        Literal::Enum(s.to_string())
                    }
                })
                .collect();
            (!items.is_empty()).then_some(items)
        }
        _ => None,
    }
}

fn resolve_scale(
    anchor_tf: &Option<String>,
    declared: &DeclaredRegistry,
) -> Result<usize, CompileError> {
    match anchor_tf {
        None => Ok(1),
        Some(tf_str) => {
            let tf = Timeframe::parse(tf_str)?;
            let anchor_minutes = tf.minutes();
            let exec_minutes = declared.exec_tf_minutes;
            if anchor_minutes % exec_minutes != 0 {
                return Err(CompileError::AnchorTfNotMultiple { anchor_minutes, exec_minutes });
            }
            Ok((anchor_minutes / exec_minutes) as usize)
        }
    }
}

/// Compiles one raw expression tree into its validated form. Recurses
/// through boolean composition and window operators; `SetupRef` is
/// validated against the declared setup-id set but resolved lazily by the
/// evaluator, not inlined here (a setup's own condition is compiled
/// separately, see [`compile_setups`]).
pub fn compile_expr(raw: &RawExpr, declared: &DeclaredRegistry) -> Result<CompiledExpr, CompileError> {
    match raw {
        RawExpr::Cond { lhs, op, rhs, tolerance } => compile_cond(lhs, op, rhs, *tolerance, declared),
        RawExpr::All { children } => {
            if children.is_empty() {
                return Err(CompileError::EmptyComposition("all"));
            }
            Ok(CompiledExpr::All(
                children.iter().map(|c| compile_expr(c, declared)).collect::<Result<_, _>>()?,
            ))
        }
        RawExpr::Any { children } => {
            if children.is_empty() {
                return Err(CompileError::EmptyComposition("any"));
            }
            Ok(CompiledExpr::Any(
                children.iter().map(|c| compile_expr(c, declared)).collect::<Result<_, _>>()?,
            ))
        }
        RawExpr::Not { child } => Ok(CompiledExpr::Not(Box::new(compile_expr(child, declared)?))),
        RawExpr::HoldsFor { bars, anchor_tf, child } => Ok(CompiledExpr::HoldsFor {
            bars: *bars,
            scale: resolve_scale(anchor_tf, declared)?,
            child: Box::new(compile_expr(child, declared)?),
        }),
        RawExpr::OccurredWithin { bars, anchor_tf, child } => Ok(CompiledExpr::OccurredWithin {
            bars: *bars,
            scale: resolve_scale(anchor_tf, declared)?,
            child: Box::new(compile_expr(child, declared)?),
        }),
        RawExpr::CountTrue { bars, min_true, anchor_tf, child } => Ok(CompiledExpr::CountTrue {
            bars: *bars,
            min_true: *min_true,
            scale: resolve_scale(anchor_tf, declared)?,
            child: Box::new(compile_expr(child, declared)?),
        }),
        RawExpr::SetupRef { setup_id } => {
            if !declared.setup_ids.contains(setup_id) {
                return Err(CompileError::UndeclaredSetup(
                    setup_id.clone(),
                    declared.setup_ids.iter().cloned().collect::<Vec<_>>().join(", "),
                ));
            }
            Ok(CompiledExpr::SetupRef(setup_id.clone()))
        }
    }
}

/// Compiles every declared setup's raw condition into the `SetupTable` the
/// evaluator consults on a `SetupRef` cache miss.
pub fn compile_setups(
    raw: &HashMap<String, RawExpr>,
    declared: &DeclaredRegistry,
) -> Result<SetupTable, CompileError> {
    raw.iter()
        .map(|(id, expr)| {
            let condition = compile_expr(expr, declared)?;
            Ok((id.clone(), Setup { id: id.clone(), condition }))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declared() -> DeclaredRegistry {
        let mut d = DeclaredRegistry { exec_tf_minutes: 15, ..Default::default() };
        d.indicator_keys.entry(TfRole::Exec).or_default().insert("ema_20".to_string());
        d.indicator_keys.entry(TfRole::Exec).or_default().insert("rsi_14".to_string());
        d.indicator_keys.entry(TfRole::HighTf).or_default().insert("rsi_14".to_string());
        d.structure_roles.insert("swing1".to_string(), TfRole::Exec);
        d.structure_kinds.insert("swing1".to_string(), StructureType::Swing);
        d.structure_zone_keys.insert("swing1".to_string(), BTreeSet::from(["demand".to_string()]));
        d
    }

    #[test]
    fn compiles_simple_cond() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Token("price.mark.close".to_string()),
            op: ">".to_string(),
            rhs: RawOperand::Token("indicator.ema_20".to_string()),
            tolerance: None,
        };
        let compiled = compile_expr(&raw, &declared()).unwrap();
        match compiled {
            CompiledExpr::Cond(c) => {
                assert!(matches!(c.lhs, Operand::Ref(CompiledRef::Price { .. })));
                assert!(matches!(c.rhs, Operand::Ref(CompiledRef::Indicator { .. })));
            }
            _ => panic!("expected Cond"),
        }
    }

    #[test]
    fn rejects_undeclared_indicator() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Token("indicator.nope".to_string()),
            op: ">".to_string(),
            rhs: RawOperand::Number(1.0),
            tolerance: None,
        };
        let err = compile_expr(&raw, &declared()).unwrap_err();
        assert!(matches!(err, CompileError::UndeclaredIndicator { .. }));
    }

    #[test]
    fn rejects_float_equality() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Token("indicator.ema_20".to_string()),
            op: "==".to_string(),
            rhs: RawOperand::Number(1.5),
            tolerance: None,
        };
        let err = compile_expr(&raw, &declared()).unwrap_err();
        assert!(matches!(err, CompileError::FloatEquality(_)));
    }

    #[test]
    fn rejects_near_without_tolerance() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Token("indicator.ema_20".to_string()),
            op: "near_abs".to_string(),
            rhs: RawOperand::Number(1.0),
            tolerance: None,
        };
        let err = compile_expr(&raw, &declared()).unwrap_err();
        assert!(matches!(err, CompileError::MissingTolerance));
    }

    #[test]
    fn accepts_crossover_against_numeric_literal() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Token("indicator.ema_20".to_string()),
            op: "cross_above".to_string(),
            rhs: RawOperand::Number(50.0),
            tolerance: None,
        };
        let compiled = compile_expr(&raw, &declared()).unwrap();
        let CompiledExpr::Cond(c) = compiled else { panic!("expected Cond") };
        assert!(matches!(c.rhs, Operand::Literal(Literal::Number(n)) if n == 50.0));
    }

    #[test]
    fn rejects_crossover_with_literal_on_lhs() {
        let raw = RawExpr::Cond {
            lhs: RawOperand::Number(50.0),
            op: "cross_above".to_string(),
            rhs: RawOperand::Token("indicator.ema_20".to_string()),
            tolerance: None,
        };
        let err = compile_expr(&raw, &declared()).unwrap_err();
        assert!(matches!(err, CompileError::CrossoverRequiresFeatureRefs(..)));
    }

    #[test]
    fn resolves_high_tf_role_suffix() {
        let compiled_ref = compile_ref("indicator.rsi_14.high_tf", &declared()).unwrap();
        assert_eq!(compiled_ref.role(), TfRole::HighTf);
    }

    #[test]
    fn anchor_tf_must_be_an_exact_multiple() {
        let raw = RawExpr::HoldsFor {
            bars: 3,
            anchor_tf: Some("1h".to_string()),
            child: Box::new(RawExpr::Cond {
                lhs: RawOperand::Token("indicator.ema_20".to_string()),
                op: ">".to_string(),
                rhs: RawOperand::Number(0.0),
                tolerance: None,
            }),
        };
        // exec_tf is 15m; 60 / 15 = 4, an exact multiple.
        let compiled = compile_expr(&raw, &declared()).unwrap();
        assert!(matches!(compiled, CompiledExpr::HoldsFor { scale: 4, .. }));
    }

    #[test]
    fn structure_zone_path_compiles() {
        let r = compile_ref("structure.swing1.zones.demand.state", &declared()).unwrap();
        assert!(matches!(r, CompiledRef::StructureZone { .. }));
    }

    #[test]
    fn empty_all_is_rejected() {
        let raw = RawExpr::All { children: vec![] };
        assert!(matches!(compile_expr(&raw, &declared()), Err(CompileError::EmptyComposition(_))));
    }
}
