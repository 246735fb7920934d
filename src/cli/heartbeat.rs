use std::time::Duration;

use clap::Parser;
use reqwest::{Client, Url};

use crate::prelude::*;

#[derive(Parser)]
pub struct HeartbeatArgs {
    /// Monitoring URL to POST to after every sensor refresh.
    #[clap(long = "heartbeat-url", env = "HEARTBEAT_URL")]
    pub url: Option<Url>,
}

impl HeartbeatArgs {
    /// Best-effort: failures are only logged.
    pub async fn send(&self) {
        if let Some(url) = &self.url
            && let Err(error) = send(url.clone()).await
        {
            warn!("failed to send the heartbeat: {error:#}");
        }
    }
}

#[instrument(skip_all, fields(host = url.host_str()))]
async fn send(url: Url) -> Result {
    debug!("sending a heartbeat…");
    Client::builder()
        .timeout(Duration::from_secs(3))
        .build()?
        .post(url)
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use mockito::Server;

    use super::*;

    #[tokio::test]
    async fn test_send_ok() -> Result {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/ping").with_status(200).create_async().await;
        let args = HeartbeatArgs { url: Some(format!("{}/ping", server.url()).parse()?) };
        args.send().await;
        mock.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_send_failure_is_swallowed() -> Result {
        let mut server = Server::new_async().await;
        let mock = server.mock("POST", "/ping").with_status(503).create_async().await;
        let args = HeartbeatArgs { url: Some(format!("{}/ping", server.url()).parse()?) };
        args.send().await;
        mock.assert_async().await;
        Ok(())
    }
}
