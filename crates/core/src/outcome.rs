//! Closed-loop outcomes: terminal, human-confirmed lead results.
//!
//! Outcomes are append-only. A correction is a newer outcome for the same
//! lead; only the latest one per lead is used for training.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{DbId, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeLabel {
    Converted,
    Rejected,
}

impl OutcomeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Converted => "converted",
            Self::Rejected => "rejected",
        }
    }

    pub fn is_converted(&self) -> bool {
        matches!(self, Self::Converted)
    }
}

impl fmt::Display for OutcomeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutcomeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "converted" => Ok(Self::Converted),
            "rejected" => Ok(Self::Rejected),
            other => Err(format!("unknown outcome label '{other}'")),
        }
    }
}

/// A recorded outcome as used for training selection.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    pub id: DbId,
    pub lead_id: DbId,
    pub label: OutcomeLabel,
    pub recorded_at: Timestamp,
}

/// Keep the newest outcome per lead, ordered by lead id.
///
/// Ties on `recorded_at` are broken by the higher id (inserted later).
pub fn latest_per_lead(outcomes: &[OutcomeRecord]) -> Vec<&OutcomeRecord> {
    let mut latest: BTreeMap<DbId, &OutcomeRecord> = BTreeMap::new();
    for outcome in outcomes {
        latest
            .entry(outcome.lead_id)
            .and_modify(|current| {
                if (outcome.recorded_at, outcome.id) > (current.recorded_at, current.id) {
                    *current = outcome;
                }
            })
            .or_insert(outcome);
    }
    latest.into_values().collect()
}
