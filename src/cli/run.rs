use std::sync::Arc;

use clap::Parser;

use crate::{
    cli::{heartbeat::HeartbeatArgs, home_assistant::HomeAssistantArgs, solcast::SolcastArgs},
    coordinator::Coordinator,
    core::{
        forecast::ForecastSource,
        history::HistorySource,
        schedule::{Scheduler, TimeTrigger},
        sensor::SensorKey,
    },
    prelude::*,
    tables::build_sensors_table,
};

#[derive(Parser)]
pub struct RunArgs {
    #[clap(flatten)]
    solcast: SolcastArgs,

    #[clap(flatten)]
    home_assistant: HomeAssistantArgs,

    #[clap(flatten)]
    heartbeat: HeartbeatArgs,

    /// Local hours to poll the forecasts at, keep it within the daily API allowance.
    #[clap(
        long = "poll-hours",
        env = "POLL_HOURS",
        value_delimiter = ',',
        default_value = "6,10,14,18",
        value_parser = clap::value_parser!(u32).range(0..24),
    )]
    poll_hours: Vec<u32>,
}

impl RunArgs {
    pub async fn run(self) -> Result {
        let solcast = Arc::new(self.solcast.connect()?);
        solcast.initialize().await?;

        let coordinator = Arc::new(
            Coordinator::builder()
                .forecast(solcast)
                .history(Arc::new(self.home_assistant.connection.new_client()))
                .entity_id(self.home_assistant.entity_id.clone())
                .history_window(self.home_assistant.history_window())
                .build(),
        );
        let mut scheduler = Scheduler::default();
        coordinator.setup(&mut scheduler).await;
        for hour in self.poll_hours {
            let coordinator = Arc::clone(&coordinator);
            scheduler.spawn("poll", TimeTrigger::daily(hour, 0, 0), move || {
                let coordinator = Arc::clone(&coordinator);
                async move { coordinator.service_event_update().await }
            });
        }

        let mut listener = coordinator.subscribe();
        log_sensors(&coordinator);
        loop {
            tokio::select! {
                result = listener.changed() => {
                    result?;
                    log_sensors(&coordinator);
                    self.heartbeat.send().await;
                }
                result = tokio::signal::ctrl_c() => {
                    result?;
                    info!("interrupted");
                    break;
                }
            }
        }

        scheduler.shutdown().await;
        Ok(())
    }
}

fn log_sensors<F: ForecastSource + 'static, H: HistorySource + 'static>(
    coordinator: &Coordinator<F, H>,
) {
    let n_hours = coordinator.previous_energy().map_or(0, |snapshot| snapshot.len());
    info!(n_hours, "sensors refreshed");
    println!(
        "{}",
        build_sensors_table(SensorKey::ALL.map(|key| (key, coordinator.get_sensor_value(key))))
    );
}
