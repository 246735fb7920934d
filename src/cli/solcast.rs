use clap::Parser;
use reqwest::Url;

use crate::{api::solcast::Api, prelude::*, solcast::Solcast};

#[derive(Parser)]
pub struct SolcastArgs {
    /// Solcast API key, separate multiple accounts with commas.
    #[clap(
        long = "solcast-api-key",
        env = "SOLCAST_API_KEY",
        value_delimiter = ',',
        required = true
    )]
    pub api_keys: Vec<String>,

    #[clap(long = "solcast-host", env = "SOLCAST_HOST", default_value = "https://api.solcast.com.au")]
    pub host: Url,
}

impl SolcastArgs {
    pub fn connect(self) -> Result<Solcast> {
        Ok(Solcast::new(Api::new(self.host)?, self.api_keys))
    }
}
