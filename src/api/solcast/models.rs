use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::quantity::power::Kilowatts;

#[derive(Deserialize)]
pub struct SitesResponse {
    pub sites: Vec<Site>,
}

/// Rooftop site as configured in the Solcast toolkit.
///
/// Serializes into the site sensor attributes.
#[must_use]
#[serde_with::skip_serializing_none]
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Site {
    pub name: Option<String>,
    pub resource_id: String,
    pub capacity: Option<f64>,
    pub capacity_dc: Option<f64>,
    pub longitude: Option<f64>,
    pub latitude: Option<f64>,
    pub azimuth: Option<f64>,
    pub tilt: Option<f64>,
    pub install_date: Option<String>,
    pub loss_factor: Option<f64>,

    /// Key the site has been fetched with, forecasts must be requested with the same key.
    #[serde(skip)]
    pub api_key: String,
}

impl Site {
    pub fn with_api_key(mut self, api_key: &str) -> Self {
        api_key.clone_into(&mut self.api_key);
        self
    }
}

#[derive(Copy, Clone, Debug, Default, Deserialize)]
pub struct Usage {
    pub daily_limit: u32,
    pub daily_limit_consumed: u32,
}

#[serde_as]
#[derive(Deserialize)]
pub struct ForecastsResponse {
    #[serde_as(as = "serde_with::VecSkipError<_>")]
    pub forecasts: Vec<ForecastPeriod>,
}

/// Half-hourly forecast, estimates are the average power over the period.
#[derive(Copy, Clone, Debug, Deserialize)]
pub struct ForecastPeriod {
    pub period_end: DateTime<Utc>,

    #[serde(flatten)]
    pub estimate: Estimate<Kilowatts>,
}

/// Median estimate along with the 10th and 90th percentiles.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Deserialize,
    PartialEq,
    Serialize,
    derive_more::Add,
    derive_more::AddAssign,
)]
pub struct Estimate<T> {
    #[serde(rename = "pv_estimate")]
    pub median: T,

    #[serde(rename = "pv_estimate10")]
    pub p10: T,

    #[serde(rename = "pv_estimate90")]
    pub p90: T,
}

impl<T> Estimate<T> {
    pub fn map<R>(self, f: impl Fn(T) -> R) -> Estimate<R> {
        Estimate { median: f(self.median), p10: f(self.p10), p90: f(self.p90) }
    }
}
