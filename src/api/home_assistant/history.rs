use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_with::serde_as;

#[must_use]
#[derive(Deserialize, derive_more::IntoIterator)]
pub struct EntitiesHistory(pub Vec<EntityHistory>);

#[must_use]
#[serde_as]
#[derive(Deserialize, derive_more::Index, derive_more::IntoIterator)]
pub struct EntityHistory(#[serde_as(as = "serde_with::VecSkipError<_>")] pub Vec<State>);

/// Raw state change: the value stays a string, parsing is up to the consumer.
#[must_use]
#[derive(Clone, Debug, Deserialize)]
pub struct State {
    #[serde(rename = "last_updated")]
    pub last_updated_at: DateTime<Utc>,

    #[serde(rename = "state")]
    pub value: String,
}
