use std::future::Future;

use color_eyre::{
    eyre::eyre,
    Result,
};

use crate::{
    candidates::CandidateProvider,
    coordinator::VoteCoordinator,
    gateway::ServerGateway,
};

/// Drives the coordinator until `shutdown` resolves. The coordinator only stops by itself when
/// every tailer has died, which is reported as an error rather than a clean exit.
pub async fn run_until_shutdown<P, G>(
    coordinator: VoteCoordinator<P, G>,
    shutdown: impl Future<Output = std::io::Result<()>>,
) -> Result<()>
where
    P: CandidateProvider,
    G: ServerGateway,
{
    tokio::select! {
        _ = coordinator.run() => {
            tracing::error!("All log tailers have stopped; no event sources left");
            Err(eyre!("no event sources left"))
        },
        res = shutdown => {
            res?;
            tracing::info!("Shutdown requested");
            Ok(())
        },
    }
}
