mod burrow;
mod heartbeat;
mod home_assistant;
mod run;
mod solcast;

use clap::{Parser, Subcommand};

pub use self::{burrow::BurrowArgs, run::RunArgs};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Main command: poll the forecasts on schedule and keep the sensors fresh.
    #[clap(name = "run")]
    Run(Box<RunArgs>),

    /// Development tools.
    #[clap(name = "burrow")]
    Burrow(Box<BurrowArgs>),
}
