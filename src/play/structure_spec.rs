//! Structure block declarations: the Play-authored shape that resolves
//! into `DeclaredRegistry.structure_roles`/`structure_kinds`/`structure_zone_keys`
//! at compile time, and into live `SwingDetector`/`TrendDetector`/`ZoneDetector`
//! instances at runtime.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::feed::TfRole;
use crate::structure::StructureType;

/// One zone a swing block spawns children for (spec.md §4.3's "optional
/// children of a swing block").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub key: String,
}

/// Swing-block confirmation window, in bars on either side of the
/// candidate pivot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SwingParams {
    pub left: usize,
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StructureParams {
    Swing {
        #[serde(flatten)]
        params: SwingParams,
        #[serde(default)]
        zones: Vec<ZoneSpec>,
    },
    Trend,
}

/// One declared structure block (spec.md §6's Play artefact `structures:
/// [ { id, tf, type, params, confirmation } ]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSpec {
    pub id: String,
    pub tf: TfRole,
    pub params: StructureParams,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StructureSpecError {
    #[error("duplicate structure block id '{0}'")]
    DuplicateId(String),
    #[error("structure block '{0}' declares zones but is not a swing block")]
    ZonesOnNonSwing(String),
    #[error("zone key '{zone}' duplicated on structure block '{block}'")]
    DuplicateZoneKey { block: String, zone: String },
}

impl StructureSpec {
    pub fn kind(&self) -> StructureType {
        match self.params {
            StructureParams::Swing { .. } => StructureType::Swing,
            StructureParams::Trend => StructureType::Trend,
        }
    }

    pub fn zone_keys(&self) -> BTreeSet<String> {
        match &self.params {
            StructureParams::Swing { zones, .. } => zones.iter().map(|z| z.key.clone()).collect(),
            StructureParams::Trend => BTreeSet::new(),
        }
    }

    pub fn validate(&self) -> Result<(), StructureSpecError> {
        if let StructureParams::Swing { zones, .. } = &self.params {
            let mut seen = BTreeSet::new();
            for z in zones {
                if !seen.insert(z.key.clone()) {
                    return Err(StructureSpecError::DuplicateZoneKey {
                        block: self.id.clone(),
                        zone: z.key.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Validates a full structure-block list for id uniqueness, then each
/// spec individually.
pub fn validate_structures(specs: &[StructureSpec]) -> Result<(), StructureSpecError> {
    let mut seen_ids = BTreeSet::new();
    for spec in specs {
        if !seen_ids.insert(spec.id.clone()) {
            return Err(StructureSpecError::DuplicateId(spec.id.clone()));
        }
        spec.validate()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn swing(id: &str, zones: Vec<&str>) -> StructureSpec {
        StructureSpec {
            id: id.to_string(),
            tf: TfRole::Exec,
            params: StructureParams::Swing {
                params: SwingParams { left: 2, right: 2 },
                zones: zones.into_iter().map(|k| ZoneSpec { key: k.to_string() }).collect(),
            },
        }
    }

    #[test]
    fn rejects_duplicate_block_id() {
        let specs = vec![swing("swing1", vec![]), swing("swing1", vec![])];
        assert_eq!(
            validate_structures(&specs),
            Err(StructureSpecError::DuplicateId("swing1".to_string()))
        );
    }

    #[test]
    fn rejects_duplicate_zone_key_on_same_block() {
        let specs = vec![swing("swing1", vec!["demand", "demand"])];
        assert_eq!(
            validate_structures(&specs),
            Err(StructureSpecError::DuplicateZoneKey {
                block: "swing1".to_string(),
                zone: "demand".to_string()
            })
        );
    }

    #[test]
    fn trend_block_has_no_zone_keys() {
        let spec = StructureSpec { id: "trend1".to_string(), tf: TfRole::Exec, params: StructureParams::Trend };
        assert!(spec.zone_keys().is_empty());
        assert_eq!(spec.kind(), StructureType::Trend);
    }
}
