//! Typed rule evaluator (C5): resolves compiled references against a
//! `Snapshot`, enforces the closed operator contract, and returns a
//! `ReasonCode`-carrying `EvalResult` for every evaluation — never a float
//! `bool`, so a caller can always tell *why* a rule did or didn't fire.
//!
//! Ported from `original_source/src/backtest/rules/evaluation/*.py`
//! (SPEC_FULL.md §4.7): `core.py` → the dispatch loop here,
//! `boolean_ops.py` → `All`/`Any`/`Not`, `condition_ops.py` → operator
//! dispatch + crossover, `resolve.py` → `RefValue` resolution and
//! arithmetic, `setups.py` → setup caching/recursion guard,
//! `window_ops.py` → the offset-shifting window operators.

use std::cell::RefCell;
use std::collections::HashSet;

use crate::feed::TfRole;
use crate::snapshot::{DeclaredType, Snapshot};

use super::ast::{ArithOp, CompiledExpr, CompiledRef, CondExpr, Literal, Operand, Operator, SetupTable};

/// Closed enumeration of why a single evaluation produced its boolean
/// result (spec.md §4.5). A failed evaluation is never an error — reason
/// codes other than `Ok` just mean "did not trigger".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    Ok,
    MissingLhs,
    MissingRhs,
    MissingPrevValue,
    TypeMismatch,
    FloatEquality,
    InvalidTolerance,
    UnknownOperator,
    InternalError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvalResult {
    pub ok: bool,
    pub reason: ReasonCode,
    pub lhs_path: String,
    pub rhs_repr: String,
    pub operator: String,
}

impl EvalResult {
    fn ok(lhs: &Operand, rhs: &Operand, op: Operator) -> Self {
        Self { ok: true, reason: ReasonCode::Ok, lhs_path: lhs.repr(), rhs_repr: rhs.repr(), operator: op.as_str().to_string() }
    }
    fn fail(lhs: &Operand, rhs: &Operand, op: Operator, reason: ReasonCode) -> Self {
        Self { ok: false, reason, lhs_path: lhs.repr(), rhs_repr: rhs.repr(), operator: op.as_str().to_string() }
    }
    fn internal(msg: impl Into<String>) -> Self {
        Self { ok: false, reason: ReasonCode::InternalError, lhs_path: msg.into(), rhs_repr: String::new(), operator: String::new() }
    }
}

/// A resolved value pulled through the snapshot, carrying its runtime
/// type so the evaluator never compares apples to oranges. `Missing` is a
/// distinguished variant (spec.md §9's design note), never a NaN sentinel
/// — NaN stays an internal encoding inside feed arrays only.
#[derive(Debug, Clone, PartialEq)]
pub enum RefValue {
    Number(f64),
    Bool(bool),
    Enum(String),
    Missing,
}

impl RefValue {
    fn as_number(&self) -> Option<f64> {
        match self {
            RefValue::Number(n) => Some(*n),
            RefValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }
}

fn coerce(raw: f64, declared: DeclaredType, key: &str, snapshot: &Snapshot) -> RefValue {
    match declared {
        DeclaredType::Float => RefValue::Number(raw),
        DeclaredType::Int => RefValue::Number(raw.round()),
        DeclaredType::Bool => RefValue::Bool(raw != 0.0),
        DeclaredType::String => {
            snapshot.enum_label(key, raw.round() as i64).map(RefValue::Enum).unwrap_or(RefValue::Number(raw))
        }
    }
}

fn resolve_ref(cref: &CompiledRef, snapshot: &Snapshot, extra_offset: usize) -> RefValue {
    let key = cref.feed_key();
    let raw = snapshot.get(&key, cref.role(), extra_offset);
    match raw {
        None => RefValue::Missing,
        Some(v) => {
            // The feed key doubles as the type-registry key: both are the
            // same dotted string a Play's compiler declares types against.
            let declared = snapshot.get_declared_type(&key, "");
            coerce(v, declared, &key, snapshot)
        }
    }
}

fn resolve_operand(op: &Operand, snapshot: &Snapshot, extra_offset: usize) -> RefValue {
    match op {
        Operand::Ref(r) => resolve_ref(r, snapshot, extra_offset),
        Operand::Literal(Literal::Number(n)) => RefValue::Number(*n),
        Operand::Literal(Literal::Bool(b)) => RefValue::Bool(*b),
        Operand::Literal(Literal::Enum(s)) => RefValue::Enum(s.clone()),
        Operand::Arithmetic(l, arith_op, r) => {
            let lv = resolve_operand(l, snapshot, extra_offset).as_number();
            let rv = resolve_operand(r, snapshot, extra_offset).as_number();
            match (lv, rv) {
                (Some(a), Some(b)) => match arith_op {
                    ArithOp::Add => RefValue::Number(a + b),
                    ArithOp::Sub => RefValue::Number(a - b),
                    ArithOp::Mul => RefValue::Number(a * b),
                    ArithOp::Div => {
                        if b == 0.0 {
                            RefValue::Missing
                        } else {
                            RefValue::Number(a / b)
                        }
                    }
                    ArithOp::Mod => {
                        if b == 0.0 {
                            RefValue::Missing
                        } else {
                            RefValue::Number(a % b)
                        }
                    }
                },
                _ => RefValue::Missing,
            }
        }
        // Range/List are only ever read directly by `between`/`in` dispatch.
        Operand::Range(..) | Operand::List(..) => RefValue::Missing,
    }
}

/// Stateless apart from the setup cache/recursion guard it carries —
/// matching spec.md §9's "Recursion guards" design note. One evaluator is
/// constructed per Play and reused across every bar.
pub struct Evaluator<'a> {
    setups: &'a SetupTable,
    eval_stack: RefCell<HashSet<String>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(setups: &'a SetupTable) -> Self {
        Self { setups, eval_stack: RefCell::new(HashSet::new()) }
    }

    pub fn eval(&self, expr: &CompiledExpr, snapshot: &Snapshot) -> EvalResult {
        self.eval_at(expr, snapshot, 0)
    }

    fn eval_at(&self, expr: &CompiledExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        match expr {
            CompiledExpr::Cond(c) => self.eval_cond(c, snapshot, extra_offset),
            CompiledExpr::All(children) => {
                let mut last = EvalResult::internal("all() with no children");
                for child in children {
                    let r = self.eval_at(child, snapshot, extra_offset);
                    if !r.ok {
                        return r;
                    }
                    last = r;
                }
                last
            }
            CompiledExpr::Any(children) => {
                let mut last = EvalResult::internal("any() with no children");
                for child in children {
                    let r = self.eval_at(child, snapshot, extra_offset);
                    if r.ok {
                        return r;
                    }
                    last = r;
                }
                last
            }
            CompiledExpr::Not(child) => {
                let r = self.eval_at(child, snapshot, extra_offset);
                if r.reason != ReasonCode::Ok {
                    // A condition that failed to evaluate is not made true
                    // by negation — propagate the failure reason unchanged.
                    return r;
                }
                EvalResult { ok: !r.ok, reason: ReasonCode::Ok, ..r }
            }
            CompiledExpr::HoldsFor { bars, scale, child } => {
                let mut last = EvalResult::internal("holds_for() with bars=0");
                for k in 0..*bars {
                    let r = self.eval_at(child, snapshot, extra_offset + k * scale);
                    if !r.ok {
                        return r;
                    }
                    last = r;
                }
                last
            }
            CompiledExpr::OccurredWithin { bars, scale, child } => {
                let mut last = EvalResult::internal("occurred_within() with bars=0");
                for k in 0..*bars {
                    let r = self.eval_at(child, snapshot, extra_offset + k * scale);
                    if r.ok {
                        return r;
                    }
                    last = r;
                }
                last
            }
            CompiledExpr::CountTrue { bars, min_true, scale, child } => {
                let mut count = 0usize;
                let mut last = EvalResult::internal("count_true() with bars=0");
                for k in 0..*bars {
                    let r = self.eval_at(child, snapshot, extra_offset + k * scale);
                    if r.ok {
                        count += 1;
                        last = r.clone();
                        if count >= *min_true {
                            return r;
                        }
                    } else {
                        last = r;
                    }
                }
                EvalResult { ok: false, ..last }
            }
            CompiledExpr::SetupRef(id) => self.eval_setup(id, snapshot, extra_offset),
        }
    }

    fn eval_setup(&self, id: &str, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        if self.eval_stack.borrow().contains(id) {
            return EvalResult::internal(format!("circular setup reference: '{id}'"));
        }
        let Some(setup) = self.setups.get(id) else {
            return EvalResult::internal(format!("setup '{id}' not found at evaluation time"));
        };
        self.eval_stack.borrow_mut().insert(id.to_string());
        let result = self.eval_at(&setup.condition, snapshot, extra_offset);
        self.eval_stack.borrow_mut().remove(id);
        result
    }

    fn eval_cond(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        use Operator as Op;
        match c.op {
            Op::Gt | Op::Lt | Op::Ge | Op::Le => self.eval_ordering(c, snapshot, extra_offset),
            Op::Eq | Op::Ne => self.eval_equality(c, snapshot, extra_offset),
            Op::NearAbs | Op::NearPct => self.eval_near(c, snapshot, extra_offset),
            Op::Between => self.eval_between(c, snapshot, extra_offset),
            Op::In => self.eval_in(c, snapshot, extra_offset),
            Op::CrossAbove | Op::CrossBelow => self.eval_crossover(c, snapshot, extra_offset),
        }
    }

    fn eval_ordering(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let lv = resolve_operand(&c.lhs, snapshot, extra_offset);
        let rv = resolve_operand(&c.rhs, snapshot, extra_offset);
        let (Some(l), Some(r)) = (lv.as_number(), rv.as_number()) else {
            let reason = if matches!(lv, RefValue::Missing) { ReasonCode::MissingLhs } else { ReasonCode::MissingRhs };
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, reason);
        };
        let ok = match c.op {
            Operator::Gt => l > r,
            Operator::Lt => l < r,
            Operator::Ge => l >= r,
            Operator::Le => l <= r,
            _ => unreachable!(),
        };
        if ok { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }

    fn eval_equality(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let lv = resolve_operand(&c.lhs, snapshot, extra_offset);
        let rv = resolve_operand(&c.rhs, snapshot, extra_offset);
        if matches!(lv, RefValue::Missing) {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::MissingLhs);
        }
        if matches!(rv, RefValue::Missing) {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::MissingRhs);
        }
        // The compiler already rejects float-literal `==`/`!=`; a float
        // Number vs Number pair here can only arise from two feature refs,
        // which is still disallowed at evaluation time for safety.
        if let (RefValue::Number(a), RefValue::Number(b)) = (&lv, &rv) {
            if a.fract() != 0.0 || b.fract() != 0.0 {
                return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::FloatEquality);
            }
        }
        let equal = match (&lv, &rv) {
            (RefValue::Number(a), RefValue::Number(b)) => a == b,
            (RefValue::Bool(a), RefValue::Bool(b)) => a == b,
            (RefValue::Enum(a), RefValue::Enum(b)) => a == b,
            _ => return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::TypeMismatch),
        };
        let ok = if c.op == Operator::Eq { equal } else { !equal };
        if ok { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }

    fn eval_near(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let Some(tol) = c.tolerance else {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::InvalidTolerance);
        };
        let lv = resolve_operand(&c.lhs, snapshot, extra_offset);
        let rv = resolve_operand(&c.rhs, snapshot, extra_offset);
        let (Some(l), Some(r)) = (lv.as_number(), rv.as_number()) else {
            let reason = if matches!(lv, RefValue::Missing) { ReasonCode::MissingLhs } else { ReasonCode::MissingRhs };
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, reason);
        };
        let within = match c.op {
            Operator::NearAbs => (l - r).abs() <= tol,
            Operator::NearPct => (l - r).abs() <= tol * l.abs().max(r.abs()),
            _ => unreachable!(),
        };
        if within { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }

    fn eval_between(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let Operand::Range(lo, hi) = &c.rhs else {
            return EvalResult::internal("between() compiled without a Range RHS");
        };
        let lv = resolve_operand(&c.lhs, snapshot, extra_offset);
        let Some(v) = lv.as_number() else {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::MissingLhs);
        };
        let ok = v >= *lo && v <= *hi;
        if ok { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }

    fn eval_in(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let Operand::List(items) = &c.rhs else {
            return EvalResult::internal("in() compiled without a List RHS");
        };
        let lv = resolve_operand(&c.lhs, snapshot, extra_offset);
        if matches!(lv, RefValue::Missing) {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::MissingLhs);
        }
        let ok = items.iter().any(|lit| match (&lv, lit) {
            (RefValue::Number(a), Literal::Number(b)) => a == b,
            (RefValue::Bool(a), Literal::Bool(b)) => a == b,
            (RefValue::Enum(a), Literal::Enum(b)) => a == b,
            _ => false,
        });
        if ok { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }

    /// `rhs` may be a feature ref or a numeric literal (spec.md §6: `LHS =
    /// numeric feature`, `RHS = feature or numeric`). A literal has no
    /// history of its own, so its "previous" value is defined as equal to
    /// its current value — matching `original_source`'s
    /// `eval_crossover` (`rhs_prev = rhs_curr` for a `ScalarValue` RHS).
    fn eval_crossover(&self, c: &CondExpr, snapshot: &Snapshot, extra_offset: usize) -> EvalResult {
        let Operand::Ref(lhs_ref) = &c.lhs else {
            return EvalResult::internal("crossover compiled without a Ref LHS");
        };
        let cur_l = resolve_ref(lhs_ref, snapshot, extra_offset).as_number();
        let (cur_r, prev_r) = match &c.rhs {
            Operand::Ref(rhs_ref) => (
                resolve_ref(rhs_ref, snapshot, extra_offset).as_number(),
                resolve_ref(rhs_ref, snapshot, extra_offset + 1).as_number(),
            ),
            Operand::Literal(Literal::Number(n)) => (Some(*n), Some(*n)),
            _ => return EvalResult::internal("crossover compiled with an unsupported RHS"),
        };
        let (Some(cur_l), Some(cur_r)) = (cur_l, cur_r) else {
            let reason = if cur_l.is_none() { ReasonCode::MissingLhs } else { ReasonCode::MissingRhs };
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, reason);
        };
        let prev_l = resolve_ref(lhs_ref, snapshot, extra_offset + 1).as_number();
        let (Some(prev_l), Some(prev_r)) = (prev_l, prev_r) else {
            return EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::MissingPrevValue);
        };
        let ok = match c.op {
            Operator::CrossAbove => prev_l <= prev_r && cur_l > cur_r,
            Operator::CrossBelow => prev_l >= prev_r && cur_l < cur_r,
            _ => unreachable!(),
        };
        if ok { EvalResult::ok(&c.lhs, &c.rhs, c.op) } else { EvalResult::fail(&c.lhs, &c.rhs, c.op, ReasonCode::Ok) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Bar, Timeframe};
    use crate::feed::{Feed, MultiFeed};
    use crate::snapshot::{MarkPriceSource, TypeRegistry};
    use std::collections::HashMap;

    fn bar(ts_close: i64, close: f64) -> Bar {
        Bar { ts_open: ts_close - 60_000, ts_close, open: close, high: close, low: close, close, volume: 1.0 }
    }

    fn feed_with(key: &str, values: &[f64]) -> Feed {
        let mut feed = Feed::new("BTCUSDT", Timeframe::M1, vec![key.to_string()], vec![]);
        for (i, &v) in values.iter().enumerate() {
            let mut ind = HashMap::new();
            ind.insert(key.to_string(), v);
            feed.append(bar((i as i64 + 1) * 60_000, v), &ind, &HashMap::new()).unwrap();
        }
        feed
    }

    fn snapshot_at<'a>(
        feeds: &'a MultiFeed,
        idx: usize,
        types: &'a TypeRegistry,
    ) -> Snapshot<'a> {
        Snapshot::new(feeds, idx, 0.0, MarkPriceSource::LastClose, types)
    }

    /// S4: `holds_for(3, rsi > 50)` over `rsi = [55, 52, 48, 53, 54]`
    /// evaluated at the last bar must fail because offset 2 (rsi=48) fails.
    #[test]
    fn holds_for_fails_when_any_offset_fails() {
        let feed = feed_with("rsi_14", &[55.0, 52.0, 48.0, 53.0, 54.0]);
        let feeds = MultiFeed::new(feed, None, None);
        let types = TypeRegistry::new();
        let setups = SetupTable::new();
        let evaluator = Evaluator::new(&setups);

        let expr = CompiledExpr::HoldsFor {
            bars: 3,
            scale: 1,
            child: Box::new(CompiledExpr::Cond(CondExpr {
                lhs: Operand::Ref(CompiledRef::Indicator { key: "rsi_14".to_string(), role: TfRole::Exec }),
                op: Operator::Gt,
                rhs: Operand::Literal(Literal::Number(50.0)),
                tolerance: None,
            })),
        };
        let snapshot = snapshot_at(&feeds, 4, &types);
        let result = evaluator.eval(&expr, &snapshot);
        assert!(!result.ok);
    }

    /// S3: `ema_fast = [49, 51]`, `ema_slow = [50, 50]`, evaluated at
    /// index 1: cross_above is true.
    #[test]
    fn crossover_detects_cross_above() {
        let fast = feed_with("ema_fast", &[49.0, 51.0]);
        let mut slow_feed = Feed::new("BTCUSDT", Timeframe::M1, vec!["ema_slow".to_string()], vec![]);
        for (i, &v) in [50.0, 50.0].iter().enumerate() {
            let mut ind = HashMap::new();
            ind.insert("ema_slow".to_string(), v);
            slow_feed.append(bar((i as i64 + 1) * 60_000, v), &ind, &HashMap::new()).unwrap();
        }
        // Both indicators must live on the same feed for a single snapshot
        // to resolve both — merge them into one feed with two keys.
        let mut combined = Feed::new("BTCUSDT", Timeframe::M1, vec!["ema_fast".to_string(), "ema_slow".to_string()], vec![]);
        for i in 0..2 {
            let mut ind = HashMap::new();
            ind.insert("ema_fast".to_string(), [49.0, 51.0][i]);
            ind.insert("ema_slow".to_string(), [50.0, 50.0][i]);
            combined.append(bar((i as i64 + 1) * 60_000, 0.0), &ind, &HashMap::new()).unwrap();
        }
        let _ = fast;
        let feeds = MultiFeed::new(combined, None, None);
        let types = TypeRegistry::new();
        let setups = SetupTable::new();
        let evaluator = Evaluator::new(&setups);

        let expr = CompiledExpr::Cond(CondExpr {
            lhs: Operand::Ref(CompiledRef::Indicator { key: "ema_fast".to_string(), role: TfRole::Exec }),
            op: Operator::CrossAbove,
            rhs: Operand::Ref(CompiledRef::Indicator { key: "ema_slow".to_string(), role: TfRole::Exec }),
            tolerance: None,
        });
        let snapshot = snapshot_at(&feeds, 1, &types);
        let result = evaluator.eval(&expr, &snapshot);
        assert!(result.ok, "{result:?}");
    }

    /// `ema_fast cross_above 50.0`: a numeric-literal RHS has no history of
    /// its own, so its "previous" value is taken equal to its current
    /// value — a feature crossing up through a fixed level still fires.
    #[test]
    fn crossover_against_numeric_literal_rhs() {
        let mut feed = Feed::new("BTCUSDT", Timeframe::M1, vec!["ema_fast".to_string()], vec![]);
        for (i, &v) in [49.0, 51.0].iter().enumerate() {
            let mut ind = HashMap::new();
            ind.insert("ema_fast".to_string(), v);
            feed.append(bar((i as i64 + 1) * 60_000, v), &ind, &HashMap::new()).unwrap();
        }
        let feeds = MultiFeed::new(feed, None, None);
        let types = TypeRegistry::new();
        let setups = SetupTable::new();
        let evaluator = Evaluator::new(&setups);

        let expr = CompiledExpr::Cond(CondExpr {
            lhs: Operand::Ref(CompiledRef::Indicator { key: "ema_fast".to_string(), role: TfRole::Exec }),
            op: Operator::CrossAbove,
            rhs: Operand::Literal(Literal::Number(50.0)),
            tolerance: None,
        });
        let snapshot = snapshot_at(&feeds, 1, &types);
        let result = evaluator.eval(&expr, &snapshot);
        assert!(result.ok, "{result:?}");
    }

    #[test]
    fn division_by_zero_is_missing_not_a_panic() {
        let feed = feed_with("x", &[0.0]);
        let feeds = MultiFeed::new(feed, None, None);
        let types = TypeRegistry::new();
        let snapshot = snapshot_at(&feeds, 0, &types);
        let op = Operand::Arithmetic(
            Box::new(Operand::Literal(Literal::Number(10.0))),
            ArithOp::Div,
            Box::new(Operand::Ref(CompiledRef::Indicator { key: "x".to_string(), role: TfRole::Exec })),
        );
        let v = resolve_operand(&op, &snapshot, 0);
        assert_eq!(v, RefValue::Missing);
    }

    #[test]
    fn circular_setup_reference_is_internal_error_not_infinite_loop() {
        let feed = Feed::new("BTCUSDT", Timeframe::M1, vec![], vec![]);
        let feeds = MultiFeed::new(feed, None, None);
        let types = TypeRegistry::new();
        let mut setups = SetupTable::new();
        setups.insert(
            "a".to_string(),
            super::super::ast::Setup { id: "a".to_string(), condition: CompiledExpr::SetupRef("a".to_string()) },
        );
        let evaluator = Evaluator::new(&setups);
        let snapshot = Snapshot::new(&feeds, 0, 0.0, MarkPriceSource::LastClose, &types);
        let result = evaluator.eval(&CompiledExpr::SetupRef("a".to_string()), &snapshot);
        assert_eq!(result.reason, ReasonCode::InternalError);
    }
}
