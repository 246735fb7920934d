use chrono::TimeDelta;
use clap::Parser;
use reqwest::Url;

use crate::api::home_assistant;

#[derive(Parser)]
pub struct HomeAssistantArgs {
    #[clap(flatten)]
    pub connection: HomeAssistantConnectionArgs,

    /// Sensor whose recorded states make up the previous energy.
    #[clap(
        long = "home-assistant-entity-id",
        env = "HOME_ASSISTANT_ENTITY_ID",
        default_value = "sensor.forecast_this_hour"
    )]
    pub entity_id: String,

    #[clap(
        long = "home-assistant-history-days",
        env = "HOME_ASSISTANT_HISTORY_DAYS",
        default_value = "1000",
        value_parser = clap::value_parser!(i64).range(1..=36500),
    )]
    pub n_history_days: i64,
}

impl HomeAssistantArgs {
    pub fn history_window(&self) -> TimeDelta {
        TimeDelta::days(self.n_history_days)
    }
}

#[derive(Parser)]
pub struct HomeAssistantConnectionArgs {
    /// Home Assistant long-lived access token.
    #[clap(long = "home-assistant-access-token", env = "HOME_ASSISTANT_ACCESS_TOKEN")]
    pub access_token: String,

    /// Home Assistant API base URL. For example: `http://localhost:8123/api`.
    #[clap(long = "home-assistant-api-base-url", env = "HOME_ASSISTANT_API_BASE_URL")]
    pub base_url: Url,
}

impl HomeAssistantConnectionArgs {
    pub fn new_client(&self) -> home_assistant::Api {
        home_assistant::Api::new(&self.access_token, self.base_url.clone())
    }
}
