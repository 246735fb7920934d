use std::collections::BTreeMap;

use chrono::{DateTime, DurationRound, Local, SecondsFormat, TimeDelta, Utc};
use serde::Serialize;

use crate::{api::home_assistant::State, prelude::*};

/// Recorded state changes of a platform entity.
///
/// Implementations may block, callers are expected to offload them.
pub trait HistorySource: Send + Sync {
    fn state_changes(&self, entity_id: &str, since: DateTime<Utc>) -> Result<Vec<State>>;
}

/// Start of the history window: local midnight, `window` ago.
#[must_use]
pub fn history_since(now: DateTime<Local>, window: TimeDelta) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|midnight| midnight.and_local_timezone(Local).earliest())
        .unwrap_or(now);
    (midnight - window).with_timezone(&Utc)
}

/// Previously recorded hourly energy, keyed by the UTC hour in ISO 8601.
#[must_use]
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    derive_more::Deref,
    derive_more::IntoIterator,
)]
pub struct HistorySnapshot(BTreeMap<String, f64>);

impl HistorySnapshot {
    /// Build the snapshot from raw states, skipping anything that is not a positive number.
    ///
    /// When an hour has several states, the earliest one wins.
    pub fn from_states(states: impl IntoIterator<Item = State>) -> Self {
        let mut states: Vec<State> = states.into_iter().collect();
        states.sort_by_key(|state| state.last_updated_at);

        let mut snapshot = BTreeMap::new();
        for state in states {
            let Ok(value) = state.value.trim().parse::<f64>() else {
                continue;
            };
            if value.is_finite() && value > 0.0 {
                snapshot.entry(hour_key(state.last_updated_at)).or_insert(value);
            }
        }
        Self(snapshot)
    }
}

fn hour_key(at: DateTime<Utc>) -> String {
    at.duration_trunc(TimeDelta::hours(1)).unwrap_or(at).to_rfc3339_opts(SecondsFormat::Secs, false)
}
