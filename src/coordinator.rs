use std::sync::Arc;

use bon::Builder;
use chrono::{DateTime, Local, TimeDelta, Utc};
use tokio::sync::watch;

use crate::{
    api::solcast::Site,
    core::{
        forecast::{EnergyData, ForecastPeriod, ForecastSource},
        history::{HistorySnapshot, HistorySource, history_since},
        schedule::{Scheduler, TimeTrigger},
        sensor::{DayForecast, SensorKey, SensorValue},
    },
    prelude::*,
    quantity::energy::KilowattHours,
};

const REFRESH_HISTORY_AT: TimeTrigger = TimeTrigger::daily(0, 0, 30);
const UPDATE_LISTENERS_AT: TimeTrigger = TimeTrigger::hourly(0, 15);

/// Glues the forecast collaborator and the platform history to the sensors.
///
/// Every operation logs its failures and carries on: nothing here returns an error.
#[must_use]
#[derive(Builder)]
pub struct Coordinator<F, H> {
    forecast: Arc<F>,
    history: Arc<H>,

    /// Entity whose recorded states make up the previous energy.
    #[builder(into, default = "sensor.forecast_this_hour".to_owned())]
    entity_id: String,

    #[builder(default = TimeDelta::days(1000))]
    history_window: TimeDelta,

    /// `None` until the first history refresh has finished.
    #[builder(skip = watch::Sender::new(None))]
    previous_energy: watch::Sender<Option<Arc<HistorySnapshot>>>,

    /// Bumped whenever the listeners should re-read the sensors.
    #[builder(skip = watch::Sender::new(Utc::now()))]
    listeners: watch::Sender<DateTime<Utc>>,
}

impl<F: ForecastSource + 'static, H: HistorySource + 'static> Coordinator<F, H> {
    /// Load the history and register the scheduled jobs.
    ///
    /// The snapshot falls back to empty when the very first history read fails.
    #[instrument(skip_all)]
    pub async fn setup(self: &Arc<Self>, scheduler: &mut Scheduler) {
        info!("setting up…");
        if let Err(error) = self.refresh_history().await {
            error!("failed to load the past history, starting with none: {error:#}");
            self.previous_energy.send_replace(Some(Arc::default()));
        }

        {
            let this = Arc::clone(self);
            scheduler.spawn("reset_past_data", REFRESH_HISTORY_AT, move || {
                let this = Arc::clone(&this);
                async move { this.reset_past_data().await }
            });
        }
        {
            let this = Arc::clone(self);
            scheduler.spawn("update_integration_listeners", UPDATE_LISTENERS_AT, move || {
                let this = Arc::clone(&this);
                async move { this.update_integration_listeners() }
            });
        }
        // The API usage counter is reset by the provider, so there is no job for it.
        info!(n_jobs = scheduler.len(), "set up");
    }

    /// Daily job: rebuild the history snapshot, keeping the previous one on failure.
    #[instrument(skip_all)]
    pub async fn reset_past_data(&self) {
        debug!("resetting the past data…");
        if let Err(error) = self.refresh_history().await {
            error!("failed to reset the past data: {error:#}");
        }
    }

    /// Hourly job: let the listeners re-read the sensors.
    pub fn update_integration_listeners(&self) {
        let now = Utc::now();
        debug!(%now, "updating the listeners…");
        self.listeners.send_replace(now);
    }

    /// Notifies on every listener update.
    pub fn subscribe(&self) -> watch::Receiver<DateTime<Utc>> {
        self.listeners.subscribe()
    }

    /// Poll the forecasts right away and refresh the listeners, even if the poll fails.
    #[instrument(skip_all)]
    pub async fn service_event_update(&self) {
        info!("forcing a forecast update…");
        if let Err(error) = self.forecast.force_poll().await {
            error!("failed to force the update: {error:#}");
        }
        self.update_integration_listeners();
    }

    pub fn service_get_forecasts(&self) -> Vec<ForecastPeriod> {
        info!("listing the forecasts…");
        self.forecast.forecast_list()
    }

    pub fn get_energy_tab_data(&self) -> EnergyData {
        self.forecast.energy_data()
    }

    /// Current value of the sensor, unknown keys yield [`SensorValue::Unknown`].
    pub fn get_sensor_value(&self, key: &str) -> SensorValue {
        let Ok(key) = key.parse::<SensorKey>() else {
            debug!(key, "unknown sensor");
            return SensorValue::Unknown;
        };
        let forecast = &self.forecast;
        match key {
            SensorKey::TotalForecastToday => forecast.total_kwh_forecast_today().into(),
            SensorKey::TotalForecastFutureDay(n_days) => {
                forecast.total_kwh_forecast_future_for_day(n_days).into()
            }
            SensorKey::PeakPower(n_days) => forecast
                .peak_w_day(n_days)
                .map_or(SensorValue::Unknown, |energy| SensorValue::Watts(energy.watt_hours())),
            SensorKey::PeakTime(n_days) => {
                forecast.peak_w_time_day(n_days).map_or(SensorValue::Unknown, SensorValue::Timestamp)
            }
            SensorKey::ForecastThisHour => watt_hours(forecast.forecast_this_hour()),
            SensorKey::ForecastNextHour => watt_hours(forecast.forecast_next_hour()),
            SensorKey::RemainingToday => forecast.remaining_today().into(),
            SensorKey::ApiCounter => SensorValue::Count(forecast.api_used_count()),
            SensorKey::ApiLimit => SensorValue::Count(forecast.api_limit()),
            SensorKey::LastUpdated => forecast.last_updated().map_or(SensorValue::Unknown, |at| {
                SensorValue::Timestamp(at.with_timezone(&Local))
            }),
        }
    }

    /// Detailed forecast of the day for the daily total sensors, `None` for the rest.
    pub fn get_sensor_extra_attributes(&self, key: &str) -> Option<DayForecast> {
        let n_days = key.parse::<SensorKey>().ok()?.attributes_day()?;
        Some(self.forecast.forecast_future_day(n_days))
    }

    /// Today's energy of the rooftop site.
    pub fn get_site_value(&self, site_id: &str) -> KilowattHours {
        self.forecast.rooftop_site_total_today(site_id)
    }

    pub fn get_site_extra_attributes(&self, site_id: &str) -> Option<Site> {
        self.forecast.rooftop_site_extra_data(site_id)
    }

    #[must_use]
    pub fn previous_energy(&self) -> Option<Arc<HistorySnapshot>> {
        self.previous_energy.borrow().clone()
    }

    /// Read the history off the runtime and swap in the new snapshot.
    async fn refresh_history(&self) -> Result {
        let history = Arc::clone(&self.history);
        let entity_id = self.entity_id.clone();
        let since = history_since(Local::now(), self.history_window);
        let states =
            tokio::task::spawn_blocking(move || history.state_changes(&entity_id, since)).await??;
        let snapshot = HistorySnapshot::from_states(states);
        info!(n_hours = snapshot.len(), "refreshed the past history");
        self.previous_energy.send_replace(Some(Arc::new(snapshot)));
        Ok(())
    }
}

fn watt_hours(energy: KilowattHours) -> SensorValue {
    SensorValue::WattHours(energy.watt_hours())
}
