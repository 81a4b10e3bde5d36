//! Play artefact: declaration, validation, and compilation into the
//! immutable runtime configuration the Play Engine consumes (spec.md §3,
//! §6; SPEC_FULL.md §4.8).

pub mod error;
pub mod feature;
pub mod play;
pub mod risk;
pub mod structure_spec;

pub use error::{PlayCompileError, PlayLoadError, PreflightError};
pub use feature::{secondary_output_names, to_indicator_params, FeatureSet, FeatureSetError, FeatureSpec, ParamMap, ParamValue};
pub use play::{CompiledPlay, IndicatorTemplate, Play, WarmupRequirement};
pub use risk::{Account, AccountValidationError, FeeModel, MarginMode, RiskModel, Sizing, StopLoss, TakeProfit};
pub use structure_spec::{validate_structures, StructureParams, StructureSpec, StructureSpecError, SwingParams, ZoneSpec};
