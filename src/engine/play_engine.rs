//! Play Engine (C6): the per-bar orchestrator described in spec.md §4.6.
//! `process_bar` is the single entry point; it is agnostic to whether the
//! closed bars it is handed came from replaying an in-memory array
//! (backtest) or a live WebSocket subscription (SPEC_FULL.md §5) — the
//! caller owns that distinction and the data-provider interface (spec.md
//! §6), not this type.
//!
//! Ordering inside one call, exactly as spec.md §4.6 lists it: ingest →
//! advance indicators/structures → build snapshot → evaluate exit →
//! risk checks → evaluate entry → update equity/journal. Steps never
//! interleave across symbols or across bars — the per-engine bar loop is
//! single-threaded and cooperative (spec.md §5).

use std::collections::{BTreeMap, HashMap};

use crate::domain::Bar;
use crate::feed::{Feed, MultiFeed, TfRole};
use crate::indicators::{Incremental, Ind, Ohlcv};
use crate::play::{Account, CompiledPlay, RiskModel};
use crate::rules::{EvalResult, Evaluator};
use crate::snapshot::{MarkPriceSource, Snapshot};
use crate::structure::{StructureType, SwingDetector, TrendDetector, ZoneDetector, ZoneState, ZoneType};

use super::error::{DataError, EngineError};
use super::exec_adapter::ExecAdapter;
use super::order_intent::{OrderIntent, OrderResult, OrderSide, PositionSide};

/// Closed bars a data provider is handing the engine for one exec-bar
/// tick. `med`/`high` are `Some` only on the tick where that companion
/// timeframe's bar closes — most exec ticks carry `None` for both,
/// per spec.md §4.1's forward-fill model.
#[derive(Debug, Clone, Copy)]
pub struct ClosedBars {
    pub exec: Bar,
    pub med: Option<Bar>,
    pub high: Option<Bar>,
}

/// One structure block's live runtime state. A `Swing` block owns the
/// zone detectors for the zone keys the Play declared as its children,
/// plus the last-seen pivot version counters so a zone is only spawned
/// on the bar a pivot is *newly* confirmed, never re-spawned every bar
/// the (persistent) `SwingOutput::high_level`/`low_level` stays `Some`.
/// A `Trend` block carries no state of its own beyond the classifier —
/// it is fed pivot events from every swing block declared on the same
/// timeframe role (see `DESIGN.md`'s "trend/swing wiring" entry for why
/// there is no explicit link field on `StructureSpec`).
enum StructureRuntime {
    Swing {
        detector: SwingDetector,
        zones: Vec<(String, ZoneType, ZoneDetector)>,
        last_high_version: u64,
        last_low_version: u64,
    },
    Trend {
        detector: TrendDetector,
    },
}

/// Zone keys are expected to name their side directly (`"demand"` /
/// `"supply"`, case-insensitive) since `StructureSpec`'s `ZoneSpec` does
/// not carry a separate type tag. Any other key name defaults to the
/// demand side; Play authors should name zones accordingly.
fn zone_type_for_key(key: &str) -> ZoneType {
    if key.eq_ignore_ascii_case("supply") {
        ZoneType::Supply
    } else {
        ZoneType::Demand
    }
}

fn build_structure_runtime(spec: &crate::play::StructureSpec) -> StructureRuntime {
    match spec.kind() {
        StructureType::Swing => {
            let crate::play::StructureParams::Swing { params, zones } = &spec.params else {
                unreachable!("StructureSpec::kind() returned Swing for a non-Swing params value")
            };
            let zones = zones
                .iter()
                .map(|z| (z.key.clone(), zone_type_for_key(&z.key), ZoneDetector::new()))
                .collect();
            StructureRuntime::Swing {
                detector: SwingDetector::new(params.left, params.right),
                zones,
                last_high_version: 0,
                last_low_version: 0,
            }
        }
        StructureType::Trend => StructureRuntime::Trend { detector: TrendDetector::new() },
    }
}

/// Feed keys one structure block registers, matching exactly the dotted
/// paths `CompiledRef` resolves for that block's fields.
fn structure_feed_keys(spec: &crate::play::StructureSpec) -> Vec<String> {
    let id = &spec.id;
    match spec.kind() {
        StructureType::Swing => {
            let mut keys = vec![
                format!("{id}.high_level"),
                format!("{id}.low_level"),
                format!("{id}.high_version"),
                format!("{id}.low_version"),
                format!("{id}.pair_version"),
                format!("{id}.pair_direction"),
            ];
            for zone in spec.zone_keys() {
                keys.push(format!("{id}.zones.{zone}.state"));
                keys.push(format!("{id}.zones.{zone}.upper"));
                keys.push(format!("{id}.zones.{zone}.lower"));
            }
            keys
        }
        StructureType::Trend => vec![format!("{id}.state")],
    }
}

/// `Ind`'s concrete variant's secondary output names, for the `ingest`
/// lookup pass — mirrors `play::feature::secondary_output_names`'s match
/// arms exactly so the two stay in lockstep (a new multi-output indicator
/// must be added to both; `IndicatorTemplate`'s type tag is private to
/// `play::play`, so this matches on the built `Ind` value instead).
fn known_secondary_names(ind: &Ind) -> &'static [&'static str] {
    match ind {
        Ind::Macd(_) => &["signal", "histogram"],
        Ind::BBands(_) => &["upper", "lower", "bandwidth"],
        Ind::Stochastic(_) => &["d"],
        Ind::Adx(_) => &["plus_di", "minus_di"],
        Ind::SuperTrend(_) => &["direction"],
        Ind::Ppo(_) => &["signal"],
        Ind::Kvo(_) => &["signal"],
        Ind::Aroon(_) => &["down", "oscillator"],
        Ind::Donchian(_) | Ind::Kc(_) => &["upper", "lower"],
        Ind::Dm(_) => &["plus", "minus"],
        Ind::Vortex(_) => &["minus"],
        Ind::Psar(_) => &["direction"],
        Ind::Squeeze(_) => &["on"],
        _ => &[],
    }
}

/// Per-symbol runtime state the engine owns exclusively: its feeds, its
/// instantiated indicators (one fresh instance per symbol, built from the
/// Play's templates), and its structure detectors. Structures are kept in
/// a `BTreeMap` (not a `HashMap`) so the order in which multiple same-role
/// swing blocks feed a trend block's pivot events is fixed by block id,
/// not by a process-randomised hash seed — required for the bar-loop
/// determinism invariant (spec.md §8).
struct SymbolRuntime {
    feeds: MultiFeed,
    indicators: HashMap<TfRole, Vec<(String, Ind)>>,
    structures: BTreeMap<String, StructureRuntime>,
    position_retry: u32,
    entries_suspended: bool,
}

impl SymbolRuntime {
    fn new(compiled: &CompiledPlay, symbol: &str) -> Result<Self, crate::indicators::FactoryError> {
        let exec_keys = compiled.declared.indicator_keys.get(&TfRole::Exec).cloned().unwrap_or_default();
        let med_keys = compiled.declared.indicator_keys.get(&TfRole::MedTf).cloned().unwrap_or_default();
        let high_keys = compiled.declared.indicator_keys.get(&TfRole::HighTf).cloned().unwrap_or_default();

        let structure_keys_for = |role: TfRole| -> Vec<String> {
            compiled.structures.iter().filter(|s| s.tf == role).flat_map(structure_feed_keys).collect()
        };

        let exec_feed =
            Feed::new(symbol, compiled.exec_tf, exec_keys.into_iter().collect(), structure_keys_for(TfRole::Exec));
        let med_feed = compiled
            .med_tf
            .map(|tf| Feed::new(symbol, tf, med_keys.into_iter().collect(), structure_keys_for(TfRole::MedTf)));
        let high_feed = compiled
            .high_tf
            .map(|tf| Feed::new(symbol, tf, high_keys.into_iter().collect(), structure_keys_for(TfRole::HighTf)));

        let mut indicators: HashMap<TfRole, Vec<(String, Ind)>> = HashMap::new();
        for (role, templates) in &compiled.indicator_templates {
            let mut built = Vec::with_capacity(templates.len());
            for (key, template) in templates {
                built.push((key.clone(), template.build()?));
            }
            indicators.insert(*role, built);
        }

        let mut structures = BTreeMap::new();
        for spec in &compiled.structures {
            structures.insert(spec.id.clone(), build_structure_runtime(spec));
        }

        Ok(Self {
            feeds: MultiFeed::new(exec_feed, med_feed, high_feed),
            indicators,
            structures,
            position_retry: 0,
            entries_suspended: false,
        })
    }

    /// Advances every indicator and structure detector registered on
    /// `role`'s feed by exactly one bar, then appends the bar plus the
    /// freshly computed values. Spec.md §4.6 step 2's "an indicator's
    /// output at index i must depend only on feed data at indices ≤ i"
    /// holds here because every update happens before the append that
    /// exposes index i to readers.
    ///
    /// Structures run first, not indicators, because `AnchoredVwap`'s reset
    /// signal is a structure pivot-completion event on this same bar
    /// (spec.md §3.3, §4.2) — the indicator loop needs to know whether one
    /// fired before it updates. `Vwap`'s session-boundary reset instead
    /// keys off the bar's own `ts_close`, not a structure event.
    fn ingest(&mut self, role: TfRole, bar: Bar) -> Result<(), EngineError> {
        let ohlcv = Ohlcv::from(&bar);
        let (structure_values, anchor_fired) = self.update_structures(role, ohlcv);

        let mut indicator_values = HashMap::new();
        if let Some(inds) = self.indicators.get_mut(&role) {
            for (key, ind) in inds.iter_mut() {
                match ind {
                    Ind::Vwap(vwap) => vwap.update_at(ohlcv, bar.ts_close),
                    Ind::AnchoredVwap(avwap) => avwap.update_with_reset(ohlcv, anchor_fired),
                    other => other.update(ohlcv),
                }
                if let Some(v) = ind.value() {
                    indicator_values.insert(key.clone(), v);
                }
            }
            for (key, ind) in inds.iter() {
                for name in known_secondary_names(ind) {
                    if let Some(v) = ind.secondary(name) {
                        indicator_values.insert(format!("{key}_{name}"), v);
                    }
                }
            }
        }

        let feed = match role {
            TfRole::Exec => &mut self.feeds.exec,
            TfRole::MedTf => self.feeds.med.as_mut().ok_or(EngineError::MissingFeed(role))?,
            TfRole::HighTf => self.feeds.high.as_mut().ok_or(EngineError::MissingFeed(role))?,
        };
        let symbol = feed.symbol().to_string();
        feed.append(bar, &indicator_values, &structure_values).map_err(|e| {
            EngineError::Data(match e {
                crate::feed::FeedError::NonMonotonicTimestamp { last_ts, new_ts } => {
                    DataError::NonMonotonicTimestamp { symbol, last_ts, new_ts }
                }
                other => DataError::Feed(other),
            })
        })?;
        Ok(())
    }

    /// Advances every structure block declared on `role` by one bar. Swing
    /// blocks run first so a pivot they confirm *this* bar can feed a
    /// trend block's classifier in the same tick, matching the dependency
    /// a Play author would expect from declaring a trend block on top of
    /// a swing block on the same timeframe.
    ///
    /// The second return value is the anchor-event signal any
    /// `AnchoredVwap` indicator on this role resets on: `true` iff any
    /// swing block on `role` newly confirmed a high or low pivot this bar
    /// (spec.md §3.3's "structure outputs … drive anchored-VWAP resets").
    fn update_structures(&mut self, role: TfRole, ohlcv: Ohlcv) -> (HashMap<String, f64>, bool) {
        let mut out = HashMap::new();
        let mut new_highs: Vec<f64> = Vec::new();
        let mut new_lows: Vec<f64> = Vec::new();

        for (id, rt) in self.structures.iter_mut() {
            let StructureRuntime::Swing { detector, zones, last_high_version, last_low_version } = rt else {
                continue;
            };
            detector.update(ohlcv);
            let o = detector.output();

            let confirmed_high = (o.high_version > *last_high_version).then_some(o.high_level).flatten();
            let confirmed_low = (o.low_version > *last_low_version).then_some(o.low_level).flatten();
            *last_high_version = o.high_version;
            *last_low_version = o.low_version;
            if let Some(level) = confirmed_high {
                new_highs.push(level);
            }
            if let Some(level) = confirmed_low {
                new_lows.push(level);
            }

            out.insert(format!("{id}.high_level"), o.high_level.unwrap_or(f64::NAN));
            out.insert(format!("{id}.low_level"), o.low_level.unwrap_or(f64::NAN));
            out.insert(format!("{id}.high_version"), o.high_version as f64);
            out.insert(format!("{id}.low_version"), o.low_version as f64);
            out.insert(format!("{id}.pair_version"), o.pair_version as f64);
            if let Some(dir) = o.pair_direction {
                out.insert(format!("{id}.pair_direction"), dir.as_code() as f64);
            }

            for (key, zone_type, zdet) in zones.iter_mut() {
                zdet.update(ohlcv);
                match zone_type {
                    ZoneType::Supply => {
                        if let Some(level) = confirmed_high {
                            zdet.on_swing_high(level, ohlcv);
                        }
                    }
                    ZoneType::Demand => {
                        if let Some(level) = confirmed_low {
                            zdet.on_swing_low(level, ohlcv);
                        }
                    }
                }
                let (state, upper, lower) = match zdet.latest(*zone_type) {
                    Some(z) => (z.state, z.upper, z.lower),
                    None => (ZoneState::None, f64::NAN, f64::NAN),
                };
                out.insert(format!("{id}.zones.{key}.state"), state.as_code() as f64);
                out.insert(format!("{id}.zones.{key}.upper"), upper);
                out.insert(format!("{id}.zones.{key}.lower"), lower);
            }
        }

        for (id, rt) in self.structures.iter_mut() {
            let StructureRuntime::Trend { detector } = rt else { continue };
            for level in &new_highs {
                detector.on_swing_high(*level);
            }
            for level in &new_lows {
                detector.on_swing_low(*level);
            }
            out.insert(format!("{id}.state"), detector.state().as_code() as f64);
        }

        let anchor_fired = !new_highs.is_empty() || !new_lows.is_empty();
        (out, anchor_fired)
    }
}

/// One evaluated exit, whether or not it fired.
#[derive(Debug, Clone)]
pub struct ExitDecision {
    pub result: EvalResult,
    pub order: Option<OrderResult>,
}

/// One evaluated entry, whether or not it fired.
#[derive(Debug, Clone)]
pub struct EntryDecision {
    pub side: OrderSide,
    pub result: EvalResult,
    pub order: Option<OrderResult>,
}

/// Everything `process_bar` produced for one exec-bar tick, enough to
/// reconstruct the order-intent log spec.md §8's determinism property
/// (invariant 3, scenario S6) checks byte-for-byte.
#[derive(Debug, Clone, Default)]
pub struct BarOutcome {
    pub ts_close: i64,
    pub exit: Option<ExitDecision>,
    pub entries: Vec<EntryDecision>,
}

const MAX_EXIT_RETRIES: u32 = 3;

/// The per-bar orchestrator (spec.md §4.6). One `PlayEngine` drives one
/// `CompiledPlay` across its whole symbol universe; `process_bar` is
/// called once per exec-bar close per symbol.
pub struct PlayEngine<'a> {
    play: &'a CompiledPlay,
    symbols: HashMap<String, SymbolRuntime>,
    paused: bool,
    cancelled: bool,
}

impl<'a> PlayEngine<'a> {
    pub fn new(play: &'a CompiledPlay) -> Result<Self, crate::indicators::FactoryError> {
        let mut symbols = HashMap::new();
        for symbol in &play.symbol_universe {
            symbols.insert(symbol.clone(), SymbolRuntime::new(play, symbol)?);
        }
        Ok(Self { play, symbols, paused: false, cancelled: false })
    }

    pub fn start(&mut self) {
        self.paused = false;
        self.cancelled = false;
    }

    /// Cooperative cancel: takes effect before the next `process_bar`
    /// call, never mid-bar (spec.md §5 — mid-bar cancellation would break
    /// determinism).
    pub fn stop(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Stops new signal evaluation while indicator/structure updates
    /// continue; never cancels an already-open position (spec.md §5).
    pub fn pause(&mut self) {
        self.paused = true;
    }

    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// The per-bar pipeline, spec.md §4.6 steps 1–8. `mark_price` is the
    /// price the exec adapter fills against this bar; the caller sets it
    /// on its `ExecAdapter` before calling this (see
    /// `SimAdapter::set_mark_price`).
    pub fn process_bar(
        &mut self,
        symbol: &str,
        closed: ClosedBars,
        mark_price: f64,
        adapter: &mut dyn ExecAdapter,
    ) -> Result<BarOutcome, EngineError> {
        if self.cancelled {
            return Err(EngineError::Cancelled);
        }
        let runtime = self.symbols.get_mut(symbol).ok_or(EngineError::MissingFeed(TfRole::Exec))?;

        // Step 1-2: ingest + advance. Higher-TF bars ingest first so a
        // snapshot built this tick already reflects their forward-filled
        // close, matching spec.md §4.6 step 1's ordering.
        if let Some(high_bar) = closed.high {
            runtime.ingest(TfRole::HighTf, high_bar)?;
        }
        if let Some(med_bar) = closed.med {
            runtime.ingest(TfRole::MedTf, med_bar)?;
        }
        runtime.ingest(TfRole::Exec, closed.exec)?;

        // Step 3-4: forward-fill indices are resolved lazily by
        // `Snapshot::new`; build it once for this tick.
        let exec_idx = runtime.feeds.exec.length() - 1;
        let snapshot = Snapshot::new(&runtime.feeds, exec_idx, mark_price, MarkPriceSource::LastClose, &self.play.types);
        let ts_close = snapshot.ts_close();
        let evaluator = Evaluator::new(&self.play.setups);

        let mut outcome = BarOutcome { ts_close, exit: None, entries: vec![] };

        if self.paused {
            return Ok(outcome);
        }

        // Step 5: position management first — an open position is always
        // checked for exit before any new entry is considered.
        let existing = adapter.current_position(symbol);
        let mut flat_after_exit = existing.is_none();
        if let Some(pos) = &existing {
            let action_name = match pos.side {
                PositionSide::Long => "exit_long",
                PositionSide::Short => "exit_short",
            };
            if let Some(expr) = self.play.actions.get(action_name) {
                let result = evaluator.eval(expr, &snapshot);
                if result.ok {
                    let side = match pos.side {
                        PositionSide::Long => OrderSide::Short,
                        PositionSide::Short => OrderSide::Long,
                    };
                    let intent = OrderIntent::reduce_only_exit(symbol, side, pos.qty);
                    let res = adapter.submit(&intent);
                    if res.success {
                        runtime.position_retry = 0;
                        flat_after_exit = true;
                        outcome.exit = Some(ExitDecision { result, order: Some(res) });
                    } else {
                        runtime.position_retry += 1;
                        if runtime.position_retry >= MAX_EXIT_RETRIES {
                            runtime.entries_suspended = true;
                            outcome.exit = Some(ExitDecision { result, order: Some(res) });
                            return Err(EngineError::PositionUnprotected {
                                symbol: symbol.to_string(),
                                attempts: runtime.position_retry,
                            });
                        }
                        outcome.exit = Some(ExitDecision { result, order: Some(res) });
                    }
                } else {
                    outcome.exit = Some(ExitDecision { result, order: None });
                }
            }
        }

        // Step 6-7: risk checks — never open a second same-direction
        // position unless scale-in is enabled; never flip without
        // `allow_flip`. A position still "unprotected" from a failed exit
        // blocks all new entries until the next successful exit.
        if runtime.entries_suspended {
            return Ok(outcome);
        }
        let still_open = !flat_after_exit;
        let risk: &RiskModel = &self.play.risk_model;

        let directions: &[(OrderSide, &str)] = &[(OrderSide::Long, "entry_long"), (OrderSide::Short, "entry_short")];

        for (side, action_name) in directions {
            let Some(expr) = self.play.actions.get(*action_name) else { continue };

            if still_open {
                let same_direction = existing.as_ref().is_some_and(|p| p.side == PositionSide::from(*side));
                if same_direction && !risk.allow_scale_in {
                    continue;
                }
                if !same_direction && !risk.allow_flip {
                    continue;
                }
            }

            let result = evaluator.eval(expr, &snapshot);
            if !result.ok {
                outcome.entries.push(EntryDecision { side: *side, result, order: None });
                continue;
            }

            let order = self.build_and_submit_entry(*side, symbol, mark_price, &snapshot, adapter);
            outcome.entries.push(EntryDecision { side: *side, result, order });
        }

        Ok(outcome)
    }

    /// Step 7: stop-loss / take-profit / sizing via the Play's `RiskModel`
    /// and `Account`, then submission through the exec adapter. Returns
    /// `None` without submitting anything if the risk model or account
    /// caps make the trade impossible at this equity (e.g. an
    /// `AtrMultiple` stop with no ATR value yet, or a clamped notional
    /// below the account's minimum).
    fn build_and_submit_entry(
        &self,
        side: OrderSide,
        symbol: &str,
        entry_price: f64,
        snapshot: &Snapshot,
        adapter: &mut dyn ExecAdapter,
    ) -> Option<OrderResult> {
        let risk: &RiskModel = &self.play.risk_model;
        let account: &Account = &self.play.account;
        let is_long = side == OrderSide::Long;

        let atr = snapshot.get("atr", TfRole::Exec, 0);
        let stop_level = risk.stop_loss.level(entry_price, is_long, atr)?;
        let take_level = risk.take_profit.level(entry_price, is_long, stop_level);

        let equity = adapter.account_state().equity;
        let raw_notional = risk.sizing.notional(equity, entry_price, stop_level);
        let notional = account.clamp_notional(raw_notional, equity)?;
        let qty = notional / entry_price;
        if qty <= 0.0 {
            return None;
        }

        let mut intent = OrderIntent::market_entry(symbol, side, qty);
        intent.sl = Some(stop_level);
        intent.tp = Some(take_level);
        Some(adapter.submit(&intent))
    }
}
