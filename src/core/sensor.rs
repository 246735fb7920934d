use std::{
    fmt::{Display, Formatter},
    str::FromStr,
};

use chrono::{DateTime, Local};
use serde::Serialize;

use crate::{core::forecast::ForecastPeriod, prelude::*, quantity::energy::KilowattHours};

/// Sensor keys as exposed to the platform.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SensorKey {
    TotalForecastToday,

    /// Total forecast for the day, `n` days after today (1 to 6).
    TotalForecastFutureDay(u32),

    /// Peak power on the day, `n` days after today.
    PeakPower(u32),

    /// Start of the peak period on the day, `n` days after today.
    PeakTime(u32),

    ForecastThisHour,
    ForecastNextHour,
    RemainingToday,
    ApiCounter,
    ApiLimit,
    LastUpdated,
}

impl SensorKey {
    pub const ALL: [&'static str; 17] = [
        "total_kwh_forecast_today",
        "peak_w_today",
        "peak_w_time_today",
        "forecast_this_hour",
        "forecast_next_hour",
        "total_kwh_forecast_tomorrow",
        "total_kwh_forecast_d3",
        "total_kwh_forecast_d4",
        "total_kwh_forecast_d5",
        "total_kwh_forecast_d6",
        "total_kwh_forecast_d7",
        "peak_w_tomorrow",
        "peak_w_time_tomorrow",
        "get_remaining_today",
        "api_counter",
        "api_limit",
        "lastupdated",
    ];

    /// Day offset of the detailed forecast exposed as the sensor attributes, if any.
    #[must_use]
    pub const fn attributes_day(self) -> Option<u32> {
        match self {
            Self::TotalForecastToday => Some(0),
            Self::TotalForecastFutureDay(n_days) => Some(n_days),
            _ => None,
        }
    }
}

impl FromStr for SensorKey {
    type Err = Error;

    fn from_str(key: &str) -> Result<Self> {
        Ok(match key {
            "total_kwh_forecast_today" => Self::TotalForecastToday,
            "total_kwh_forecast_tomorrow" => Self::TotalForecastFutureDay(1),
            "total_kwh_forecast_d3" => Self::TotalForecastFutureDay(2),
            "total_kwh_forecast_d4" => Self::TotalForecastFutureDay(3),
            "total_kwh_forecast_d5" => Self::TotalForecastFutureDay(4),
            "total_kwh_forecast_d6" => Self::TotalForecastFutureDay(5),
            "total_kwh_forecast_d7" => Self::TotalForecastFutureDay(6),
            "peak_w_today" => Self::PeakPower(0),
            "peak_w_tomorrow" => Self::PeakPower(1),
            "peak_w_time_today" => Self::PeakTime(0),
            "peak_w_time_tomorrow" => Self::PeakTime(1),
            "forecast_this_hour" => Self::ForecastThisHour,
            "forecast_next_hour" => Self::ForecastNextHour,
            "get_remaining_today" => Self::RemainingToday,
            "api_counter" => Self::ApiCounter,
            "api_limit" => Self::ApiLimit,
            "lastupdated" => Self::LastUpdated,
            _ => bail!("unknown sensor key `{key}`"),
        })
    }
}

/// Sensor state, `Unknown` when there is nothing to show.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Energy(KilowattHours),
    Watts(i64),
    WattHours(i64),
    Count(u32),
    Timestamp(DateTime<Local>),

    #[default]
    Unknown,
}

impl Display for SensorValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Energy(energy) => write!(f, "{energy}"),
            Self::Watts(watts) => write!(f, "{watts} W"),
            Self::WattHours(watt_hours) => write!(f, "{watt_hours} Wh"),
            Self::Count(count) => write!(f, "{count}"),
            Self::Timestamp(timestamp) => write!(f, "{}", timestamp.format("%Y-%m-%d %H:%M")),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

impl From<KilowattHours> for SensorValue {
    fn from(energy: KilowattHours) -> Self {
        Self::Energy(energy)
    }
}

/// Detailed forecast of a single day, exposed as the daily sensor attributes.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DayForecast {
    #[serde(rename = "detailedForecast")]
    pub detailed_forecast: Vec<ForecastPeriod>,

    #[serde(rename = "dayname")]
    pub day_name: String,
}
