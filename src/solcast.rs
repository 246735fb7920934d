use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeDelta, Timelike, Utc};
use itertools::Itertools;
use tokio::sync::watch;

use crate::{
    api::solcast::{Api, Site, Usage},
    core::{
        forecast::{EnergyData, Forecast, ForecastPeriod, ForecastSource, SiteForecast, day_after},
        sensor::DayForecast,
    },
    prelude::*,
    quantity::energy::KilowattHours,
};

/// Seven days ahead.
const FORECAST_HOURS: u32 = 168;

/// Everything known about the rooftop sites, replaced as a whole on every poll.
#[derive(Clone, Debug, Default)]
pub struct State {
    pub sites: Vec<Site>,
    pub site_forecasts: BTreeMap<String, SiteForecast>,
    pub usage: Usage,

    /// Time of the last successful poll, with the seconds zeroed.
    pub last_updated: Option<DateTime<Utc>>,

    pub forecast: Forecast,
}

/// Forecast collaborator backed by the Solcast API.
pub struct Solcast {
    api: Api,
    api_keys: Vec<String>,
    state: watch::Sender<Arc<State>>,
}

impl Solcast {
    pub fn new(api: Api, api_keys: impl IntoIterator<Item = String>) -> Self {
        let api_keys = api_keys
            .into_iter()
            .map(|api_key| api_key.trim().to_owned())
            .filter(|api_key| !api_key.is_empty())
            .collect();
        Self { api, api_keys, state: watch::Sender::new(Arc::default()) }
    }

    /// Load the sites and poll the forecasts for the first time.
    ///
    /// Failing to load the sites is fatal, a failed poll is only logged.
    pub async fn initialize(&self) -> Result {
        self.load_sites().await?;
        if self.state().sites.is_empty() {
            warn!("no rooftop sites are configured under the API keys");
        } else if let Err(error) = self.poll().await {
            error!("failed to poll the forecasts: {error:#}");
        }
        Ok(())
    }

    #[must_use]
    pub fn state(&self) -> Arc<State> {
        Arc::clone(&*self.state.borrow())
    }

    #[must_use]
    pub fn sites(&self) -> Vec<Site> {
        self.state().sites.clone()
    }

    /// Fetch the sites under every API key, forgetting forecasts of the sites that are gone.
    ///
    /// A site shared by several keys is kept once, with the first key.
    #[instrument(skip_all)]
    pub async fn load_sites(&self) -> Result {
        ensure!(!self.api_keys.is_empty(), "no Solcast API keys are configured");
        let mut sites = Vec::new();
        for api_key in &self.api_keys {
            sites.extend(self.api.get_sites(api_key).await?);
        }
        let sites: Vec<Site> =
            sites.into_iter().unique_by(|site| site.resource_id.clone()).collect();
        info!(n_sites = sites.len(), "loaded");
        self.state.send_modify(|current| {
            let mut state = State::clone(current);
            state.site_forecasts.retain(|site_id, _| {
                sites.iter().any(|site| &site.resource_id == site_id)
            });
            state.sites = sites;
            *current = Arc::new(state);
        });
        Ok(())
    }

    /// Fetch the forecasts of every site and publish the new state.
    ///
    /// The state is only replaced when all the sites are fetched successfully.
    #[instrument(skip_all)]
    pub async fn poll(&self) -> Result {
        let previous = self.state();
        let now = Local::now();
        let today = now.date_naive();

        let mut site_forecasts = BTreeMap::new();
        for site in &previous.sites {
            let periods = self
                .api
                .get_forecasts(&site.resource_id, &site.api_key, FORECAST_HOURS)
                .await
                .with_context(|| format!("failed to poll the site `{}`", site.resource_id))?;
            let mut forecast =
                previous.site_forecasts.get(&site.resource_id).cloned().unwrap_or_default();
            forecast.merge(periods, today);
            site_forecasts.insert(site.resource_id.clone(), forecast);
        }

        let usage = match self.fetch_usage().await {
            Ok(usage) => usage,
            Err(error) => {
                warn!("failed to fetch the API usage, keeping the previous one: {error:#}");
                previous.usage
            }
        };

        let forecast = Forecast::build(&site_forecasts, today);
        let last_updated = Utc::now().with_second(0).and_then(|now| now.with_nanosecond(0));
        let state = State {
            sites: previous.sites.clone(),
            site_forecasts,
            usage,
            last_updated,
            forecast,
        };
        info!(
            n_periods = state.forecast.half_hourly().len(),
            api_used = state.usage.daily_limit_consumed,
            api_limit = state.usage.daily_limit,
            "polled",
        );
        self.state.send_replace(Arc::new(state));
        Ok(())
    }

    async fn fetch_usage(&self) -> Result<Usage> {
        let api_key = self.api_keys.first().context("no Solcast API keys are configured")?;
        self.api.get_usage(api_key).await
    }
}

#[async_trait]
impl ForecastSource for Solcast {
    async fn force_poll(&self) -> Result {
        self.poll().await
    }

    fn forecast_list(&self) -> Vec<ForecastPeriod> {
        self.state().forecast.half_hourly().to_vec()
    }

    fn energy_data(&self) -> EnergyData {
        self.state().forecast.energy().clone()
    }

    fn total_kwh_forecast_today(&self) -> KilowattHours {
        self.total_kwh_forecast_future_for_day(0)
    }

    fn peak_w_day(&self, n_days: u32) -> Option<KilowattHours> {
        self.state().forecast.peak_energy_on(day_after(Local::now(), n_days))
    }

    fn peak_w_time_day(&self, n_days: u32) -> Option<DateTime<Local>> {
        let state = self.state();
        state.forecast.peak_on(day_after(Local::now(), n_days)).map(|period| period.period_start)
    }

    fn forecast_this_hour(&self) -> KilowattHours {
        energy_at_hour(&self.state().forecast, Local::now())
    }

    fn forecast_next_hour(&self) -> KilowattHours {
        energy_at_hour(&self.state().forecast, Local::now() + TimeDelta::hours(1))
    }

    fn total_kwh_forecast_future_for_day(&self, n_days: u32) -> KilowattHours {
        self.state().forecast.total_on(day_after(Local::now(), n_days))
    }

    fn remaining_today(&self) -> KilowattHours {
        self.state().forecast.remaining_on(Local::now())
    }

    fn api_used_count(&self) -> u32 {
        self.state().usage.daily_limit_consumed
    }

    fn api_limit(&self) -> u32 {
        self.state().usage.daily_limit
    }

    fn last_updated(&self) -> Option<DateTime<Utc>> {
        self.state().last_updated
    }

    fn forecast_future_day(&self, n_days: u32) -> DayForecast {
        let day = day_after(Local::now(), n_days);
        DayForecast {
            detailed_forecast: self.state().forecast.half_hourly_on(day).copied().collect(),
            day_name: day.format("%A").to_string(),
        }
    }

    fn rooftop_site_total_today(&self, site_id: &str) -> KilowattHours {
        self.state().forecast.tally(site_id)
    }

    fn rooftop_site_extra_data(&self, site_id: &str) -> Option<Site> {
        self.state().sites.iter().find(|site| site.resource_id == site_id).cloned()
    }
}

fn energy_at_hour(forecast: &Forecast, at: DateTime<Local>) -> KilowattHours {
    forecast.at_hour(at).map(|period| period.estimate.median).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use chrono::NaiveDate;
    use mockito::{Matcher, Mock, Server, ServerGuard};

    use super::*;

    /// Tomorrow is always within the kept window.
    fn tomorrow_at(hour: u32, minute: u32) -> DateTime<Utc> {
        day_after(Local::now(), 1)
            .and_hms_opt(hour, minute, 0)
            .unwrap()
            .and_local_timezone(Local)
            .earliest()
            .unwrap()
            .with_timezone(&Utc)
    }

    fn tomorrow() -> NaiveDate {
        day_after(Local::now(), 1)
    }

    async fn mock_sites(server: &mut ServerGuard) -> Mock {
        server
            .mock("GET", "/rooftop_sites")
            .match_query(Matcher::UrlEncoded("api_key".into(), "key-1".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            // language=JSON
            .with_body(
                r#"{
                    "sites": [
                        {"name": "Garage", "resource_id": "aaaa", "capacity": 5.0},
                        {"name": "Shed", "resource_id": "bbbb", "capacity": 1.5}
                    ]
                }"#,
            )
            .create_async()
            .await
    }

    async fn mock_usage(server: &mut ServerGuard, status: usize) -> Mock {
        server
            .mock("GET", "/json/reply/GetUserUsageAllowance")
            .match_query(Matcher::UrlEncoded("api_key".into(), "key-1".into()))
            .with_status(status)
            .with_header("content-type", "application/json")
            // language=JSON
            .with_body(r#"{"daily_limit": 10, "daily_limit_consumed": 3}"#)
            .create_async()
            .await
    }

    async fn mock_forecasts(server: &mut ServerGuard, site_id: &str, median: f64) -> Mock {
        let body = serde_json::json!({
            "forecasts": [
                {
                    "period_end": tomorrow_at(12, 0).to_rfc3339(),
                    "pv_estimate": median,
                    "pv_estimate10": median / 2.0,
                    "pv_estimate90": median * 2.0,
                    "period": "PT30M",
                },
                {
                    "period_end": tomorrow_at(12, 30).to_rfc3339(),
                    "pv_estimate": median * 2.0,
                    "pv_estimate10": median,
                    "pv_estimate90": median * 4.0,
                    "period": "PT30M",
                },
            ],
        });
        server
            .mock("GET", format!("/rooftop_sites/{site_id}/forecasts").as_str())
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("api_key".into(), "key-1".into()),
                Matcher::UrlEncoded("hours".into(), "168".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body.to_string())
            .create_async()
            .await
    }

    fn solcast(server: &ServerGuard) -> Result<Solcast> {
        Ok(Solcast::new(Api::new(server.url().parse()?)?, [" key-1 ".to_owned(), String::new()]))
    }

    #[tokio::test]
    async fn test_initialize_ok() -> Result {
        let mut server = Server::new_async().await;
        let sites = mock_sites(&mut server).await;
        let usage = mock_usage(&mut server, 200).await;
        let forecasts_a = mock_forecasts(&mut server, "aaaa", 1.0).await;
        let forecasts_b = mock_forecasts(&mut server, "bbbb", 0.5).await;

        let solcast = solcast(&server)?;
        solcast.initialize().await?;
        sites.assert_async().await;
        usage.assert_async().await;
        forecasts_a.assert_async().await;
        forecasts_b.assert_async().await;

        assert_eq!(solcast.sites().len(), 2);
        assert_eq!(solcast.sites()[0].api_key, "key-1");
        assert_eq!(solcast.api_used_count(), 3);
        assert_eq!(solcast.api_limit(), 10);
        assert!(solcast.last_updated().is_some_and(|at| at.second() == 0));

        let forecast_list = solcast.forecast_list();
        assert_eq!(forecast_list.len(), 2);
        assert_abs_diff_eq!(forecast_list[0].estimate.median.0, 0.75);
        assert_abs_diff_eq!(forecast_list[1].estimate.median.0, 1.5);
        assert_abs_diff_eq!(solcast.total_kwh_forecast_future_for_day(1).0, 2.25);
        assert_eq!(solcast.peak_w_day(1).map(KilowattHours::watt_hours), Some(1500));
        assert_eq!(
            solcast.peak_w_time_day(1),
            Some(tomorrow_at(12, 0).with_timezone(&Local)),
        );

        let day_forecast = solcast.forecast_future_day(1);
        assert_eq!(day_forecast.detailed_forecast.len(), 2);
        assert_eq!(day_forecast.day_name, tomorrow().format("%A").to_string());

        assert!(solcast.rooftop_site_extra_data("bbbb").is_some());
        assert!(solcast.rooftop_site_extra_data("cccc").is_none());
        assert_abs_diff_eq!(solcast.rooftop_site_total_today("unknown").0, 0.0);
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_poll_keeps_previous_state() -> Result {
        let mut server = Server::new_async().await;
        let _sites = mock_sites(&mut server).await;
        let _usage = mock_usage(&mut server, 200).await;
        let forecasts_a = mock_forecasts(&mut server, "aaaa", 1.0).await;
        let _forecasts_b = mock_forecasts(&mut server, "bbbb", 0.5).await;

        let solcast = solcast(&server)?;
        solcast.initialize().await?;
        let last_updated = solcast.last_updated();

        forecasts_a.remove_async().await;
        let _forecasts_a = server
            .mock("GET", "/rooftop_sites/aaaa/forecasts")
            .match_query(Matcher::Any)
            .with_status(429)
            .create_async()
            .await;
        assert!(solcast.force_poll().await.is_err());
        assert_eq!(solcast.last_updated(), last_updated);
        assert_eq!(solcast.forecast_list().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_usage_failure_keeps_previous_usage() -> Result {
        let mut server = Server::new_async().await;
        let _sites = mock_sites(&mut server).await;
        let usage = mock_usage(&mut server, 200).await;
        let _forecasts_a = mock_forecasts(&mut server, "aaaa", 1.0).await;
        let _forecasts_b = mock_forecasts(&mut server, "bbbb", 0.5).await;

        let solcast = solcast(&server)?;
        solcast.initialize().await?;

        usage.remove_async().await;
        let _usage = mock_usage(&mut server, 500).await;
        solcast.force_poll().await?;
        assert_eq!(solcast.api_used_count(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn test_no_api_keys() -> Result {
        let server = Server::new_async().await;
        let solcast = Solcast::new(Api::new(server.url().parse()?)?, [" ".to_owned()]);
        assert!(solcast.initialize().await.is_err());
        Ok(())
    }

    #[test]
    fn test_energy_at_missing_hour_is_zero() {
        assert_abs_diff_eq!(energy_at_hour(&Forecast::default(), Local::now()).0, 0.0);
    }
}
