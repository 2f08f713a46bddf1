use std::{
    future::Future,
    time::Duration,
};

use color_eyre::Result;
use tokio::sync::Mutex;

use crate::{
    config::RconSettings,
    rcon::RconClient,
};

const RCON_TIMEOUT: Duration = Duration::from_secs(5);

/// The coordinator's only way of talking back to the game server. Both calls are best-effort;
/// callers log failures and carry on.
pub trait ServerGateway {
    fn broadcast(&self, text: &str) -> impl Future<Output = Result<()>> + Send;

    fn set_next_map(&self, label: &str) -> impl Future<Output = Result<()>> + Send;
}

/// Sends admin commands over RCON
pub struct RconGateway {
    client: Mutex<RconClient>,
}

impl RconGateway {
    pub fn new(settings: RconSettings) -> Self {
        Self {
            client: Mutex::new(RconClient::new(
                settings.addr,
                settings.password,
                RCON_TIMEOUT,
            )),
        }
    }

    async fn execute(&self, command: String) -> Result<()> {
        let resp = self.client.lock().await.execute(&command).await?;
        tracing::debug!("RCON `{}` -> {}", command, resp.trim());
        Ok(())
    }
}

impl ServerGateway for RconGateway {
    async fn broadcast(&self, text: &str) -> Result<()> {
        self.execute(format!("AdminBroadcast {}", text)).await
    }

    async fn set_next_map(&self, label: &str) -> Result<()> {
        self.execute(format!("AdminSetNextLayer {}", label)).await
    }
}

/// Logs what would have been sent. Used for dry runs.
#[derive(Debug, Default)]
pub struct LogOnlyGateway;

impl ServerGateway for LogOnlyGateway {
    async fn broadcast(&self, text: &str) -> Result<()> {
        tracing::info!("[dry-run] AdminBroadcast {}", text);
        Ok(())
    }

    async fn set_next_map(&self, label: &str) -> Result<()> {
        tracing::info!("[dry-run] AdminSetNextLayer {}", label);
        Ok(())
    }
}
