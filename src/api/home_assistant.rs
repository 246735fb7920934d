mod history;

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::Url;
use ureq::Agent;

pub use self::history::{EntitiesHistory, State};
use crate::{core::history::HistorySource, prelude::*};

/// Blocking Home Assistant REST client.
pub struct Api {
    agent: Agent,
    base_url: Url,
    authorization: String,
}

impl Api {
    /// `base_url` points to the API root, for example: `http://localhost:8123/api`.
    pub fn new(access_token: &str, base_url: Url) -> Self {
        let agent =
            Agent::config_builder().timeout_global(Some(Duration::from_secs(60))).build().into();
        Self { agent, base_url, authorization: format!("Bearer {access_token}") }
    }

    #[instrument(skip_all, fields(entity_id = entity_id, since = %since))]
    pub fn get_history(&self, entity_id: &str, since: DateTime<Utc>) -> Result<EntitiesHistory> {
        info!("fetching the state changes…");
        let url = self.history_url(since)?;
        let history = self
            .agent
            .get(url.as_str())
            .header("Authorization", &self.authorization)
            .query("filter_entity_id", entity_id)
            .query("no_attributes", "true")
            .call()
            .context("failed to request the history")?
            .body_mut()
            .read_json::<EntitiesHistory>()
            .context("failed to deserialize the history")?;
        info!(n_entities = history.0.len(), "fetched");
        Ok(history)
    }

    fn history_url(&self, since: DateTime<Utc>) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow!("invalid base URL"))?
            .pop_if_empty()
            .push("history")
            .push("period")
            .push(&since.to_rfc3339());
        Ok(url)
    }
}

impl HistorySource for Api {
    fn state_changes(&self, entity_id: &str, since: DateTime<Utc>) -> Result<Vec<State>> {
        Ok(self.get_history(entity_id, since)?.into_iter().flatten().collect())
    }
}
