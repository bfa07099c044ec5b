//! Fallback resolution: decide the final value of a field from the fresh
//! outcome and the prior snapshot.

use crate::extract::ExtractionOutcome;
use crate::field::FieldValue;
use crate::snapshot::Snapshot;
use serde::{Deserialize, Serialize};

/// Where a final value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldOrigin {
    Fresh,
    Snapshot,
    Absent,
}

/// Final value of a field after fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalValue {
    /// Extracted in this run
    Fresh(FieldValue),
    /// Carried over from the prior snapshot
    Stale(FieldValue),
    /// Neither this run nor the snapshot has it
    Absent,
}

impl FinalValue {
    pub fn origin(&self) -> FieldOrigin {
        match self {
            FinalValue::Fresh(_) => FieldOrigin::Fresh,
            FinalValue::Stale(_) => FieldOrigin::Snapshot,
            FinalValue::Absent => FieldOrigin::Absent,
        }
    }

    pub fn into_value(self) -> Option<FieldValue> {
        match self {
            FinalValue::Fresh(v) | FinalValue::Stale(v) => Some(v),
            FinalValue::Absent => None,
        }
    }
}

/// Outcome of resolving one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub value: FinalValue,
    /// The extraction itself errored, whether or not the snapshot covered it
    pub errored: bool,
}

/// Resolve one field. Current data always beats the snapshot, and the
/// snapshot always beats absence.
pub fn resolve(
    outcome: ExtractionOutcome,
    field_name: &str,
    snapshot: Option<&Snapshot>,
) -> Resolution {
    let from_snapshot = || match snapshot.and_then(|s| s.get(field_name)) {
        Some(v) => FinalValue::Stale(v.clone()),
        None => FinalValue::Absent,
    };

    match outcome {
        ExtractionOutcome::Found(v) => Resolution {
            value: FinalValue::Fresh(v),
            errored: false,
        },
        ExtractionOutcome::NotFound => Resolution {
            value: from_snapshot(),
            errored: false,
        },
        ExtractionOutcome::Error(_) => Resolution {
            value: from_snapshot(),
            errored: true,
        },
    }
}
