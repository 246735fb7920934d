use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::json;

use crate::{
    api::home_assistant,
    cli::{home_assistant::HomeAssistantArgs, solcast::SolcastArgs},
    coordinator::Coordinator,
    core::{
        forecast::ForecastSource,
        history::{HistorySnapshot, HistorySource, history_since},
        sensor::SensorKey,
    },
    prelude::*,
    solcast::Solcast,
    tables::{build_sensors_table, build_sites_table},
};

#[derive(Parser)]
pub struct BurrowArgs {
    #[command(subcommand)]
    command: BurrowCommand,
}

impl BurrowArgs {
    pub async fn run(self) -> Result {
        match self.command {
            BurrowCommand::Sensors(args) => args.run().await,
            BurrowCommand::Sensor(args) => args.run().await,
            BurrowCommand::Sites(args) => args.sites().await,
            BurrowCommand::Forecasts(args) => args.forecasts().await,
            BurrowCommand::History(args) => args.run(),
        }
    }
}

#[derive(Subcommand)]
enum BurrowCommand {
    /// Poll once and print every sensor.
    Sensors(BurrowSensorsArgs),

    /// Poll once and print the sensor value along with its attributes.
    Sensor(BurrowSensorArgs),

    /// Poll once and list the rooftop sites with today's energy.
    Sites(BurrowSolcastArgs),

    /// Poll once and print the half-hourly forecasts.
    Forecasts(BurrowSolcastArgs),

    /// Build the previous energy snapshot from the recorded history.
    History(BurrowHistoryArgs),
}

#[derive(Parser)]
struct BurrowSolcastArgs {
    #[clap(flatten)]
    solcast: SolcastArgs,
}

impl BurrowSolcastArgs {
    async fn initialize(self) -> Result<Solcast> {
        let solcast = self.solcast.connect()?;
        solcast.initialize().await?;
        Ok(solcast)
    }

    async fn sites(self) -> Result {
        let solcast = self.initialize().await?;
        let sites = solcast.sites();
        let tallies =
            sites.iter().map(|site| (site, solcast.rooftop_site_total_today(&site.resource_id)));
        println!("{}", build_sites_table(tallies));
        Ok(())
    }

    async fn forecasts(self) -> Result {
        let forecasts = self.initialize().await?.forecast_list();
        info!(n_periods = forecasts.len(), "gotcha");
        println!("{}", serde_json::to_string_pretty(&forecasts)?);
        Ok(())
    }
}

#[derive(Parser)]
struct BurrowSensorsArgs {
    #[clap(flatten)]
    solcast: BurrowSolcastArgs,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,
}

impl BurrowSensorsArgs {
    async fn coordinator(self) -> Result<Coordinator<Solcast, home_assistant::Api>> {
        let history_window = self.home_assistant.history_window();
        let history = self.home_assistant.connection.new_client();
        Ok(Coordinator::builder()
            .forecast(Arc::new(self.solcast.initialize().await?))
            .history(Arc::new(history))
            .entity_id(self.home_assistant.entity_id)
            .history_window(history_window)
            .build())
    }

    async fn run(self) -> Result {
        let coordinator = self.coordinator().await?;
        let sensors = SensorKey::ALL.map(|key| (key, coordinator.get_sensor_value(key)));
        println!("{}", build_sensors_table(sensors));
        Ok(())
    }
}

#[derive(Parser)]
struct BurrowSensorArgs {
    /// Sensor key, for example: `total_kwh_forecast_tomorrow`.
    key: String,

    #[clap(flatten)]
    inner: BurrowSensorsArgs,
}

impl BurrowSensorArgs {
    async fn run(self) -> Result {
        let coordinator = self.inner.coordinator().await?;
        let sensor = json!({
            "value": coordinator.get_sensor_value(&self.key),
            "attributes": coordinator.get_sensor_extra_attributes(&self.key),
        });
        println!("{}", serde_json::to_string_pretty(&sensor)?);
        Ok(())
    }
}

#[derive(Parser)]
struct BurrowHistoryArgs {
    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,
}

impl BurrowHistoryArgs {
    fn run(self) -> Result {
        let since = history_since(Local::now(), self.home_assistant.history_window());
        let states = self
            .home_assistant
            .connection
            .new_client()
            .state_changes(&self.home_assistant.entity_id, since)?;
        let snapshot = HistorySnapshot::from_states(states);
        info!(n_hours = snapshot.len(), "built");
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        Ok(())
    }
}
