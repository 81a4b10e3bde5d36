//! Feature Spec / Feature Set (spec.md §3): an immutable descriptor of
//! one indicator instance plus the per-timeframe ordered collection that
//! enforces topological ordering and rejects duplicate output keys.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feed::TfRole;
use crate::indicators::IndicatorParams;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Number(f64),
    Text(String),
}

pub type ParamMap = BTreeMap<String, ParamValue>;

pub fn to_indicator_params(params: &ParamMap) -> IndicatorParams {
    params.iter().fold(IndicatorParams::new(), |acc, (k, v)| match v {
        ParamValue::Number(n) => acc.with_numeric(k, *n),
        ParamValue::Text(t) => acc.with_text(k, t),
    })
}

/// The secondary output names a multi-output indicator type exposes,
/// ordered the way the corresponding `Incremental::secondary` match arms
/// are listed in `indicators/*.rs` — this table is the single place that
/// has to change if a new secondary output is added to a concrete
/// indicator, per spec.md §3's "output keys ... deterministic from spec".
pub fn secondary_output_names(indicator_type: &str) -> &'static [&'static str] {
    match indicator_type {
        "macd" => &["signal", "histogram"],
        "bbands" => &["upper", "lower", "bandwidth"],
        "stochastic" => &["d"],
        "adx" => &["plus_di", "minus_di"],
        "supertrend" => &["direction"],
        "ppo" => &["signal"],
        "kvo" => &["signal"],
        "aroon" => &["down", "oscillator"],
        "donchian" | "kc" => &["upper", "lower"],
        "dm" => &["plus", "minus"],
        "vortex" => &["minus"],
        "psar" => &["direction"],
        "squeeze" => &["on"],
        _ => &[],
    }
}

/// An immutable descriptor of one indicator instance (spec.md §3). The
/// artefact field named `id` in spec.md §6's Play text format is this
/// struct's `output_key`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSpec {
    #[serde(rename = "id")]
    pub output_key: String,
    pub tf: TfRole,
    pub indicator_type: String,
    #[serde(default)]
    pub params: ParamMap,
    pub input_source: Option<String>,
}

impl FeatureSpec {
    /// Every feed key this spec writes: the primary `output_key` plus
    /// `output_key_<secondary>` for each secondary output its indicator
    /// type exposes.
    pub fn expanded_output_keys(&self) -> Vec<String> {
        let mut keys = vec![self.output_key.clone()];
        for secondary in secondary_output_names(&self.indicator_type) {
            keys.push(format!("{}_{}", self.output_key, secondary));
        }
        keys
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FeatureSetError {
    #[error("duplicate output key '{0}' across feature specs on the same timeframe")]
    DuplicateOutputKey(String),

    #[error("feature '{spec}' depends on input '{input}' which is not declared before it")]
    DependencyNotDeclaredBefore { spec: String, input: String },
}

/// A per-timeframe ordered collection of feature specs (spec.md §3). A
/// spec referencing another spec's output as `input_source` must appear
/// after it — this is enforced at construction, not computed by a
/// topological sort, because Play authors are expected to declare
/// features in dependency order (matching the teacher's declaration-order
/// convention for action blocks, SPEC_FULL.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    specs: Vec<FeatureSpec>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, spec: FeatureSpec) -> Result<(), FeatureSetError> {
        let mut seen: BTreeSet<&str> = BTreeSet::new();
        for existing in &self.specs {
            for key in existing.expanded_output_keys() {
                seen.insert(Box::leak(key.into_boxed_str()));
            }
        }
        for key in spec.expanded_output_keys() {
            if seen.contains(key.as_str()) {
                return Err(FeatureSetError::DuplicateOutputKey(key));
            }
        }
        if let Some(input) = &spec.input_source {
            let declared_before =
                self.specs.iter().any(|s| s.expanded_output_keys().iter().any(|k| k == input));
            if !declared_before {
                return Err(FeatureSetError::DependencyNotDeclaredBefore {
                    spec: spec.output_key.clone(),
                    input: input.clone(),
                });
            }
        }
        self.specs.push(spec);
        Ok(())
    }

    pub fn specs(&self) -> &[FeatureSpec] {
        &self.specs
    }

    pub fn all_output_keys(&self) -> BTreeSet<String> {
        self.specs.iter().flat_map(|s| s.expanded_output_keys()).collect()
    }
}
