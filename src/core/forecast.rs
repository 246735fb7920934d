use std::{cmp::Reverse, collections::BTreeMap};

use async_trait::async_trait;
use chrono::{DateTime, Days, Local, NaiveDate, TimeDelta, Timelike, Utc};
use ordered_float::OrderedFloat;
use serde::Serialize;

use crate::{
    api::solcast::{Estimate, ForecastPeriod as SolcastPeriod, Site},
    core::sensor::DayForecast,
    prelude::*,
    quantity::{energy::KilowattHours, power::Kilowatts},
};

/// Solar forecast data as seen by the sensors, all the queries are relative to the local now.
#[async_trait]
pub trait ForecastSource: Send + Sync {
    /// Fetch fresh forecasts from the provider right away.
    async fn force_poll(&self) -> Result;

    /// Half-hourly forecasts of all the sites combined.
    fn forecast_list(&self) -> Vec<ForecastPeriod>;

    fn energy_data(&self) -> EnergyData;

    fn total_kwh_forecast_today(&self) -> KilowattHours;

    /// Energy of the peak half an hour, the sensor shows it as watts.
    fn peak_w_day(&self, n_days: u32) -> Option<KilowattHours>;

    fn peak_w_time_day(&self, n_days: u32) -> Option<DateTime<Local>>;

    /// Zero when the hour is not forecasted.
    fn forecast_this_hour(&self) -> KilowattHours;

    /// Zero when the hour is not forecasted.
    fn forecast_next_hour(&self) -> KilowattHours;

    fn total_kwh_forecast_future_for_day(&self, n_days: u32) -> KilowattHours;

    fn remaining_today(&self) -> KilowattHours;

    fn api_used_count(&self) -> u32;

    fn api_limit(&self) -> u32;

    fn last_updated(&self) -> Option<DateTime<Utc>>;

    fn forecast_future_day(&self, n_days: u32) -> DayForecast;

    fn rooftop_site_total_today(&self, site_id: &str) -> KilowattHours;

    fn rooftop_site_extra_data(&self, site_id: &str) -> Option<Site>;
}

pub const HALF_HOUR: TimeDelta = TimeDelta::minutes(30);

/// Number of days, starting today, for which the forecasts are kept.
pub const N_DAYS: u64 = 7;

/// Date `n_days` after the date of `now`.
#[must_use]
pub fn day_after(now: DateTime<Local>, n_days: u32) -> NaiveDate {
    let today = now.date_naive();
    today.checked_add_days(Days::new(n_days.into())).unwrap_or(today)
}

/// Stored forecasts of a single rooftop site, keyed by the period end.
#[derive(Clone, Debug, Default, derive_more::Deref, derive_more::IntoIterator)]
#[into_iterator(owned, ref)]
pub struct SiteForecast(BTreeMap<DateTime<Utc>, Estimate<Kilowatts>>);

impl SiteForecast {
    /// Merge freshly fetched periods and drop those outside the kept window.
    ///
    /// Existing periods get their estimates replaced, new periods are inserted.
    pub fn merge(&mut self, periods: impl IntoIterator<Item = SolcastPeriod>, today: NaiveDate) {
        for period in periods {
            self.0.insert(period.period_end, period.estimate.map(|power| power.round(4)));
        }
        self.0.retain(|period_end, _| is_kept(start_of(*period_end), today));
    }
}

fn start_of(period_end: DateTime<Utc>) -> DateTime<Local> {
    (period_end - HALF_HOUR).with_timezone(&Local)
}

fn is_kept(period_start: DateTime<Local>, today: NaiveDate) -> bool {
    let day = period_start.date_naive();
    day >= today && today.checked_add_days(Days::new(N_DAYS)).is_none_or(|last| day < last)
}

/// Forecasted energy over a period starting at `period_start`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct ForecastPeriod {
    pub period_start: DateTime<Local>,

    #[serde(flatten)]
    pub estimate: Estimate<KilowattHours>,
}

/// Payload for the energy dashboard: watt-hours per half an hour.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct EnergyData {
    pub wh_hours: BTreeMap<DateTime<Local>, f64>,
}

impl EnergyData {
    /// Keep the producing periods along with the idle periods adjacent to them,
    /// so that the dashboard draws the curve down to zero.
    fn from_half_hourly(periods: &[ForecastPeriod]) -> Self {
        let mut wh_hours = BTreeMap::new();
        let mut previous: Option<&ForecastPeriod> = None;
        for period in periods {
            let watt_hours = (period.estimate.median.0 * 1000.0).round();
            if period.estimate.median.is_positive() {
                if let Some(previous) = previous
                    && !previous.estimate.median.is_positive()
                {
                    wh_hours.insert(previous.period_start, 0.0);
                }
                wh_hours.insert(period.period_start, watt_hours);
            } else if previous.is_some_and(|previous| previous.estimate.median.is_positive()) {
                wh_hours.insert(period.period_start, 0.0);
            }
            previous = Some(period);
        }
        Self { wh_hours }
    }
}

/// Forecasts of all the rooftop sites combined, in the local timezone.
#[derive(Clone, Debug, Default)]
pub struct Forecast {
    half_hourly: Vec<ForecastPeriod>,
    hourly: Vec<ForecastPeriod>,
    tallies: BTreeMap<String, KilowattHours>,
    energy: EnergyData,
}

impl Forecast {
    pub fn build<'a>(
        sites: impl IntoIterator<Item = (&'a String, &'a SiteForecast)>,
        today: NaiveDate,
    ) -> Self {
        let mut half_hourly = BTreeMap::<DateTime<Local>, Estimate<KilowattHours>>::new();
        let mut tallies = BTreeMap::new();

        for (site_id, forecast) in sites {
            let mut tally = KilowattHours::ZERO;
            for (period_end, estimate) in forecast {
                let period_start = start_of(*period_end);
                if !is_kept(period_start, today) {
                    continue;
                }
                let energy = estimate.map(|power| power * HALF_HOUR);
                if period_start.date_naive() == today {
                    tally += energy.median;
                }
                *half_hourly.entry(period_start).or_default() += energy;
            }
            tallies.insert(site_id.clone(), tally.round(2));
        }

        let half_hourly: Vec<_> = half_hourly
            .into_iter()
            .map(|(period_start, estimate)| ForecastPeriod {
                period_start,
                estimate: estimate.map(|energy| energy.round(4)),
            })
            .collect();

        let mut hourly = BTreeMap::<DateTime<Local>, Estimate<KilowattHours>>::new();
        for period in &half_hourly {
            let hour_start = period.period_start.with_minute(0).unwrap_or(period.period_start);
            *hourly.entry(hour_start).or_default() += period.estimate;
        }
        let hourly = hourly
            .into_iter()
            .map(|(period_start, estimate)| ForecastPeriod {
                period_start,
                estimate: estimate.map(|energy| energy.round(4)),
            })
            .collect();

        let energy = EnergyData::from_half_hourly(&half_hourly);
        Self { half_hourly, hourly, tallies, energy }
    }

    #[must_use]
    pub fn half_hourly(&self) -> &[ForecastPeriod] {
        &self.half_hourly
    }

    #[must_use]
    pub fn hourly(&self) -> &[ForecastPeriod] {
        &self.hourly
    }

    #[must_use]
    pub const fn energy(&self) -> &EnergyData {
        &self.energy
    }

    /// Today's energy of the site, zero for unknown sites.
    #[must_use]
    pub fn tally(&self, site_id: &str) -> KilowattHours {
        self.tallies.get(site_id).copied().unwrap_or_default()
    }

    #[must_use]
    pub fn total_on(&self, day: NaiveDate) -> KilowattHours {
        self.hourly_on(day).map(|period| period.estimate.median).sum::<KilowattHours>().round(2)
    }

    /// Energy still to be produced today, including the current hour.
    #[must_use]
    pub fn remaining_on(&self, now: DateTime<Local>) -> KilowattHours {
        self.hourly_on(now.date_naive())
            .filter(|period| period.period_start.hour() >= now.hour())
            .map(|period| period.estimate.median)
            .sum::<KilowattHours>()
            .round(2)
    }

    /// Hourly period containing `at`.
    #[must_use]
    pub fn at_hour(&self, at: DateTime<Local>) -> Option<&ForecastPeriod> {
        self.hourly_on(at.date_naive()).find(|period| period.period_start.hour() == at.hour())
    }

    /// The earliest half-hourly period with the highest median estimate.
    #[must_use]
    pub fn peak_on(&self, day: NaiveDate) -> Option<&ForecastPeriod> {
        self.half_hourly_on(day)
            .min_by_key(|period| Reverse(OrderedFloat(period.estimate.median.0)))
    }

    #[must_use]
    pub fn peak_energy_on(&self, day: NaiveDate) -> Option<KilowattHours> {
        self.peak_on(day).map(|period| period.estimate.median)
    }

    pub fn half_hourly_on(&self, day: NaiveDate) -> impl Iterator<Item = &ForecastPeriod> {
        self.half_hourly.iter().filter(move |period| period.period_start.date_naive() == day)
    }

    fn hourly_on(&self, day: NaiveDate) -> impl Iterator<Item = &ForecastPeriod> {
        self.hourly.iter().filter(move |period| period.period_start.date_naive() == day)
    }
}
