//! Play: the declarative strategy artefact (spec.md §3, §6). `Play` is the
//! deserialized (TOML) form; `compile` produces a `CompiledPlay` — the
//! immutable runtime configuration the Play Engine consumes, ported from
//! `runtime_config.py`'s `RuntimeConfig::from_play` (SPEC_FULL.md §4.8).

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::domain::{ConfigHash, FullHash, Timeframe};
use crate::feed::TfRole;
use crate::indicators::{build_indicator, Ind};
use crate::rules::{compile_expr, compile_setups, CompiledExpr, DeclaredRegistry, RawExpr, SetupTable};
use crate::snapshot::{DeclaredType, TypeRegistry};
use crate::structure::{StructureType, TrendState, ZoneState};

use super::error::{PlayCompileError, PlayLoadError};
use super::feature::{to_indicator_params, FeatureSet, FeatureSpec};
use super::risk::{Account, RiskModel};
use super::structure_spec::{validate_structures, StructureSpec};

/// The deserialized Play artefact (spec.md §6's text format). Every field
/// here is exactly what a Play author writes; nothing is defaulted for
/// `risk_model`/`account`, matching `RuntimeConfig`'s "fail loud" policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Play {
    pub id: String,
    pub version: String,
    pub symbol_universe: Vec<String>,
    pub exec_tf: String,
    pub med_tf: Option<String>,
    pub high_tf: Option<String>,
    pub features: Vec<FeatureSpec>,
    #[serde(default)]
    pub structures: Vec<StructureSpec>,
    pub actions: BTreeMap<String, RawExpr>,
    #[serde(default)]
    pub setups: BTreeMap<String, RawExpr>,
    pub risk_model: RiskModel,
    pub account: Account,
}

/// Per-timeframe warmup requirement and the indicators that must be built
/// to satisfy it, resolved at compile time (§4.8's "per-timeframe
/// warmup-bar requirements and required_indicators per role").
#[derive(Debug, Clone, Default)]
pub struct WarmupRequirement {
    pub bars_needed: usize,
    pub required_indicators: BTreeSet<String>,
}

/// The resolved, immutable runtime configuration a Play Engine consumes.
/// Pure data — building one never touches feeds or bars.
pub struct CompiledPlay {
    pub id: String,
    pub version: String,
    pub symbol_universe: Vec<String>,
    pub exec_tf: Timeframe,
    pub med_tf: Option<Timeframe>,
    pub high_tf: Option<Timeframe>,
    pub declared: DeclaredRegistry,
    pub types: TypeRegistry,
    pub setups: SetupTable,
    pub actions: HashMap<String, CompiledExpr>,
    /// Indicator instances to build per timeframe role, output key ->
    /// instance. The Play Engine clones/owns one set per symbol it runs.
    pub indicator_templates: HashMap<TfRole, Vec<(String, IndicatorTemplate)>>,
    pub structures: Vec<StructureSpec>,
    pub risk_model: RiskModel,
    pub account: Account,
    pub warmup: HashMap<TfRole, WarmupRequirement>,
    pub config_hash: ConfigHash,
    pub full_hash: FullHash,
}

/// A factory closure captured once at compile time, so the Play Engine can
/// instantiate a fresh indicator per symbol without re-reading params.
pub struct IndicatorTemplate {
    indicator_type: String,
    params: super::feature::ParamMap,
}

impl IndicatorTemplate {
    pub fn build(&self) -> Result<Ind, crate::indicators::FactoryError> {
        build_indicator(&self.indicator_type, &to_indicator_params(&self.params))
    }
}

/// Estimate of the number of closed bars an indicator needs before
/// `is_ready()` — the largest numeric parameter that looks like a period
/// (`period`, `length`, `long`, `slow`), or 1 if none is declared. This is
/// a conservative over-estimate for indicators whose true warmup is a
/// function of two periods (e.g. Macd's slow+signal); it is only used to
/// gate preflight, never to change indicator behaviour.
fn estimated_warmup_bars(spec: &FeatureSpec) -> usize {
    let period_like = ["period", "length", "long", "slow", "k_period", "rsi_period", "medium"];
    spec.params
        .iter()
        .filter(|(k, _)| period_like.contains(&k.as_str()))
        .filter_map(|(_, v)| match v {
            super::feature::ParamValue::Number(n) => Some(*n as usize),
            super::feature::ParamValue::Text(_) => None,
        })
        .max()
        .unwrap_or(1)
}

fn declare_structure_enum_types(types: &mut TypeRegistry, spec: &StructureSpec) {
    match spec.kind() {
        StructureType::Swing => {
            types.declare_enum(format!("{}.pair_direction", spec.id), &["bearish", "bullish"]);
            for zone in spec.zone_keys() {
                let key = format!("{}.zones.{}.state", spec.id, zone);
                types.declare_enum(
                    key,
                    &[zone_state_label(ZoneState::None), zone_state_label(ZoneState::Active), zone_state_label(ZoneState::Broken)],
                );
            }
        }
        StructureType::Trend => {
            types.declare_enum(
                format!("{}.state", spec.id),
                &[trend_state_label(TrendState::Unknown), trend_state_label(TrendState::Up), trend_state_label(TrendState::Down)],
            );
        }
    }
}

fn trend_state_label(s: TrendState) -> &'static str {
    match s {
        TrendState::Unknown => "unknown",
        TrendState::Up => "up",
        TrendState::Down => "down",
    }
}

fn zone_state_label(s: ZoneState) -> &'static str {
    match s {
        ZoneState::None => "none",
        ZoneState::Active => "active",
        ZoneState::Broken => "broken",
    }
}

impl Play {
    /// Deserializes a Play artefact from its TOML text form (spec.md §6).
    /// Structural/type errors surface here; semantic validation (empty
    /// symbol universe, bad account fields, dangling refs) only happens
    /// once `compile` runs.
    pub fn from_toml(text: &str) -> Result<Self, PlayLoadError> {
        Ok(toml::from_str(text)?)
    }

    /// Resolves every declared feature/structure/action against the Play's
    /// own declarations and produces the immutable runtime configuration.
    /// Pure function of `self` — no I/O, no feed access.
    pub fn compile(&self) -> Result<CompiledPlay, PlayCompileError> {
        if self.symbol_universe.is_empty() {
            return Err(PlayCompileError::EmptySymbolUniverse { id: self.id.clone() });
        }
        self.account.validate()?;
        validate_structures(&self.structures)?;

        let exec_tf = Timeframe::parse(&self.exec_tf)?;
        let med_tf = self.med_tf.as_deref().map(Timeframe::parse).transpose()?;
        let high_tf = self.high_tf.as_deref().map(Timeframe::parse).transpose()?;

        // Build one FeatureSet per role to validate ordering/duplicates,
        // then flatten into the declared-indicator-key registry.
        let mut sets: HashMap<TfRole, FeatureSet> = HashMap::new();
        for spec in &self.features {
            if (spec.tf == TfRole::MedTf && med_tf.is_none())
                || (spec.tf == TfRole::HighTf && high_tf.is_none())
            {
                return Err(PlayCompileError::FeatureOnUndeclaredTf(spec.output_key.clone(), spec.tf));
            }
            sets.entry(spec.tf).or_default().push(spec.clone())?;
        }

        let mut declared = DeclaredRegistry {
            exec_tf_minutes: exec_tf.minutes(),
            price_sources: BTreeSet::from(["mark".to_string()]),
            ..Default::default()
        };
        for (role, set) in &sets {
            declared.indicator_keys.insert(*role, set.all_output_keys());
        }
        for s in &self.structures {
            declared.structure_roles.insert(s.id.clone(), s.tf);
            declared.structure_kinds.insert(s.id.clone(), s.kind());
            let zones = s.zone_keys();
            if !zones.is_empty() {
                declared.structure_zone_keys.insert(s.id.clone(), zones);
            }
        }
        declared.setup_ids = self.setups.keys().cloned().collect();

        let setups = compile_setups(&self.setups, &declared)?;
        let mut actions = HashMap::new();
        for (name, raw) in &self.actions {
            actions.insert(name.clone(), compile_expr(raw, &declared)?);
        }
        if actions.is_empty() {
            return Err(PlayCompileError::EmptyActionBlock(self.id.clone()));
        }

        let mut types = TypeRegistry::new();
        for s in &self.structures {
            declare_structure_enum_types(&mut types, s);
        }
        for spec in &self.features {
            if matches!(spec.indicator_type.as_str(), "supertrend" | "psar") {
                types.declare(format!("{}_direction", spec.output_key), DeclaredType::Int);
            }
        }

        let mut indicator_templates: HashMap<TfRole, Vec<(String, IndicatorTemplate)>> = HashMap::new();
        let mut warmup: HashMap<TfRole, WarmupRequirement> = HashMap::new();
        for spec in &self.features {
            // Validates the params eagerly so a Play with a malformed
            // indicator fails at compile time, not on the first live bar.
            build_indicator(&spec.indicator_type, &to_indicator_params(&spec.params)).map_err(|source| {
                PlayCompileError::IndicatorBuild { feature: spec.output_key.clone(), source }
            })?;
            let req = warmup.entry(spec.tf).or_default();
            req.bars_needed = req.bars_needed.max(estimated_warmup_bars(spec));
            req.required_indicators.insert(spec.output_key.clone());
            indicator_templates.entry(spec.tf).or_default().push((
                spec.output_key.clone(),
                IndicatorTemplate { indicator_type: spec.indicator_type.clone(), params: spec.params.clone() },
            ));
        }

        let config_hash = self.config_hash();
        let full_hash = self.full_hash();

        Ok(CompiledPlay {
            id: self.id.clone(),
            version: self.version.clone(),
            symbol_universe: self.symbol_universe.clone(),
            exec_tf,
            med_tf,
            high_tf,
            declared,
            types,
            setups,
            actions,
            indicator_templates,
            structures: self.structures.clone(),
            risk_model: self.risk_model,
            account: self.account,
            warmup,
            config_hash,
            full_hash,
        })
    }

    /// Structural identity: feature/structure types and action shape, no
    /// parameter values — two Plays that only differ in a period length
    /// hash the same here, matching `StrategyConfig::config_hash`.
    pub fn config_hash(&self) -> ConfigHash {
        let mut indicator_types: Vec<&str> =
            self.features.iter().map(|f| f.indicator_type.as_str()).collect();
        indicator_types.sort_unstable();
        let mut structure_kinds: Vec<String> =
            self.structures.iter().map(|s| format!("{:?}", s.kind())).collect();
        structure_kinds.sort_unstable();
        let mut action_names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        action_names.sort_unstable();

        let structural = format!(
            "{}+{}+{}",
            indicator_types.join(","),
            structure_kinds.join(","),
            action_names.join(",")
        );
        ConfigHash::from_bytes(structural.as_bytes())
    }

    /// Exact identity: the canonical JSON encoding of the whole Play,
    /// including every parameter value (`BTreeMap` storage keeps key
    /// order deterministic), matching `StrategyConfig::full_hash`.
    pub fn full_hash(&self) -> FullHash {
        let json = serde_json::to_string(self).expect("Play must serialize");
        FullHash::from_bytes(json.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::play::feature::ParamMap;
    use crate::play::risk::{FeeModel, MarginMode, Sizing, StopLoss, TakeProfit};

    fn minimal_play() -> Play {
        let mut ema_params = ParamMap::new();
        ema_params.insert("period".to_string(), super::super::feature::ParamValue::Number(20.0));

        let mut actions = BTreeMap::new();
        actions.insert(
            "entry_long".to_string(),
            RawExpr::Cond {
                lhs: crate::rules::RawOperand::Token("price.mark.close".to_string()),
                op: ">".to_string(),
                rhs: crate::rules::RawOperand::Token("indicator.ema_20".to_string()),
                tolerance: None,
            },
        );
        actions.insert(
            "exit_long".to_string(),
            RawExpr::Cond {
                lhs: crate::rules::RawOperand::Token("price.mark.close".to_string()),
                op: "<".to_string(),
                rhs: crate::rules::RawOperand::Token("indicator.ema_20".to_string()),
                tolerance: None,
            },
        );

        Play {
            id: "ema-trend".to_string(),
            version: "1.0.0".to_string(),
            symbol_universe: vec!["BTCUSDT".to_string()],
            exec_tf: "15m".to_string(),
            med_tf: None,
            high_tf: None,
            features: vec![FeatureSpec {
                output_key: "ema_20".to_string(),
                tf: TfRole::Exec,
                indicator_type: "ema".to_string(),
                params: ema_params,
                input_source: None,
            }],
            structures: vec![],
            actions,
            setups: BTreeMap::new(),
            risk_model: RiskModel {
                stop_loss: StopLoss::Percent { value: 5.0 },
                take_profit: TakeProfit::RrRatio { value: 2.0 },
                sizing: Sizing::PercentEquity { value: 10.0 },
                max_positions_per_symbol: 1,
                allow_flip: false,
                allow_scale_in: false,
                allow_scale_out: false,
            },
            account: Account {
                starting_equity_usdt: 10_000.0,
                max_leverage: 5.0,
                margin_mode: MarginMode::Isolated,
                min_trade_notional_usdt: 10.0,
                max_notional_usdt: None,
                max_margin_usdt: None,
                fee_model: FeeModel { taker: 0.0006, maker: 0.0002 },
                slippage_bps: None,
            },
        }
    }

    #[test]
    fn minimal_play_compiles() {
        let compiled = minimal_play().compile().unwrap();
        assert_eq!(compiled.actions.len(), 2);
        assert!(compiled.declared.indicator_declared(TfRole::Exec, "ema_20"));
        assert_eq!(compiled.warmup[&TfRole::Exec].bars_needed, 20);
    }

    #[test]
    fn from_toml_round_trips_a_compiling_play() {
        let toml_text = toml::to_string(&minimal_play()).unwrap();
        let loaded = Play::from_toml(&toml_text).unwrap();
        assert_eq!(loaded.id, "ema-trend");
        assert!(loaded.compile().is_ok());
    }

    #[test]
    fn from_toml_rejects_malformed_text() {
        assert!(matches!(Play::from_toml("not = [valid"), Err(PlayLoadError::Toml(_))));
    }

    #[test]
    fn empty_symbol_universe_is_rejected() {
        let mut play = minimal_play();
        play.symbol_universe.clear();
        assert!(matches!(play.compile(), Err(PlayCompileError::EmptySymbolUniverse { .. })));
    }

    #[test]
    fn feature_on_undeclared_tf_is_rejected() {
        let mut play = minimal_play();
        play.features[0].tf = TfRole::HighTf;
        assert!(matches!(play.compile(), Err(PlayCompileError::FeatureOnUndeclaredTf(..))));
    }

    #[test]
    fn config_hash_ignores_params_full_hash_does_not() {
        let play_a = minimal_play();
        let mut play_b = minimal_play();
        play_b.features[0].params.insert(
            "period".to_string(),
            super::super::feature::ParamValue::Number(50.0),
        );
        assert_eq!(play_a.config_hash(), play_b.config_hash());
        assert_ne!(play_a.full_hash(), play_b.full_hash());
    }

    #[test]
    fn unknown_indicator_type_fails_compilation() {
        let mut play = minimal_play();
        play.features[0].indicator_type = "not_real".to_string();
        assert!(matches!(play.compile(), Err(PlayCompileError::IndicatorBuild { .. })));
    }
}
