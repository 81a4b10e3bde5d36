//! Play compilation and preflight errors (spec.md §7): compile errors are
//! surfaced at Play load and the engine never starts; preflight errors are
//! surfaced before the bar loop starts, once historical data is on hand.

use thiserror::Error;

use crate::domain::TimeframeError;
use crate::feed::TfRole;
use crate::indicators::FactoryError;
use crate::rules::CompileError;

use super::feature::FeatureSetError;
use super::risk::AccountValidationError;
use super::structure_spec::StructureSpecError;

#[derive(Debug, Error)]
pub enum PlayCompileError {
    #[error("play '{id}' declares an empty symbol_universe")]
    EmptySymbolUniverse { id: String },

    #[error(transparent)]
    InvalidTimeframe(#[from] TimeframeError),

    #[error(transparent)]
    InvalidStructure(#[from] StructureSpecError),

    #[error(transparent)]
    InvalidFeatureSet(#[from] FeatureSetError),

    #[error(transparent)]
    InvalidAccount(#[from] AccountValidationError),

    #[error("failed to build indicator for feature '{feature}': {source}")]
    IndicatorBuild {
        feature: String,
        #[source]
        source: FactoryError,
    },

    #[error(transparent)]
    RuleCompile(#[from] CompileError),

    #[error("action block '{0}' declares neither entry nor exit expression")]
    EmptyActionBlock(String),

    #[error("feature '{0}' declares tf {1:?} but the play has no feed for that role")]
    FeatureOnUndeclaredTf(String, TfRole),
}

/// Errors loading a Play artefact from its TOML text form (spec.md §6).
#[derive(Debug, Error)]
pub enum PlayLoadError {
    #[error("invalid play TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PreflightError {
    #[error("insufficient warmup on {role:?}: have {have} bars, need {need}")]
    InsufficientWarmup { role: TfRole, have: usize, need: usize },

    #[error("symbol '{0}' is not a USDT-margined pair")]
    NonUsdtPair(String),
}
