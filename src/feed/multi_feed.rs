//! Multi-timeframe coordination: resolves the forward-fill index on the
//! companion (med/high) feeds for a given exec-bar index.

use serde::{Deserialize, Serialize};

use crate::feed::feed::Feed;

/// One feed per role. `med`/`high` are optional — a Play may declare only
/// `exec_tf`.
pub struct MultiFeed {
    pub exec: Feed,
    pub med: Option<Feed>,
    pub high: Option<Feed>,
}

/// Role a feed plays in a Play's declared timeframe set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TfRole {
    Exec,
    MedTf,
    HighTf,
}

impl MultiFeed {
    pub fn new(exec: Feed, med: Option<Feed>, high: Option<Feed>) -> Self {
        Self { exec, med, high }
    }

    pub fn feed_for(&self, role: TfRole) -> Option<&Feed> {
        match role {
            TfRole::Exec => Some(&self.exec),
            TfRole::MedTf => self.med.as_ref(),
            TfRole::HighTf => self.high.as_ref(),
        }
    }

    /// The forward-fill index on `role`'s feed for the given exec bar: the
    /// largest index `i` on that feed with `ts_close[i] <= exec.ts_close[exec_idx]`.
    /// Returns `None` if the role has no feed, or no companion bar has closed yet.
    pub fn forward_fill_idx(&self, role: TfRole, exec_idx: usize) -> Option<usize> {
        if let TfRole::Exec = role {
            return Some(exec_idx);
        }
        let exec_ts = self.exec.ts_close_at(exec_idx)?;
        self.feed_for(role)?.find_idx_at_or_before(exec_ts)
    }
}
