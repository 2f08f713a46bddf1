use std::path::PathBuf;

use color_eyre::Result;
use mapvote::{
    app::run_until_shutdown,
    candidates::RotationFileProvider,
    config::{
        config_from_env,
        Config,
    },
    coordinator::VoteCoordinator,
    events::LogSource,
    gateway::{
        LogOnlyGateway,
        RconGateway,
        ServerGateway,
    },
    logging::init_logging,
    tailer::{
        follow,
        latest_file_in,
    },
};

/// Runs a map vote on a Squad server whenever a round ends or an admin types `!mapvote`
#[derive(clap::Parser)]
#[command(version)]
struct Args {
    /// Load environment variables from this file instead of `./.env`
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Log server commands instead of sending them over RCON
    #[arg(long)]
    dry_run: bool,

    /// Also write logs to a timestamped file in this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let Args {
        env_file,
        dry_run,
        log_dir,
    } = clap::Parser::parse();
    let _log_guard = init_logging(log_dir.as_deref())?;

    let conf = config_from_env(env_file.as_ref(), dry_run)?;
    tracing::info!("Starting map voter with config: {}", conf);

    let provider = RotationFileProvider::new(&conf.map_rotation_path);
    match conf.rcon.clone() {
        Some(rcon) => run(conf, provider, RconGateway::new(rcon)).await,
        None => run(conf, provider, LogOnlyGateway).await,
    }
}

async fn run<G: ServerGateway>(
    conf: Config,
    provider: RotationFileProvider,
    gateway: G,
) -> Result<()> {
    let (coordinator, handle) = VoteCoordinator::new(conf.vote.clone(), provider, gateway);

    tokio::spawn(follow(
        LogSource::Server,
        conf.server_log_path.clone(),
        conf.poll_interval,
        handle.clone(),
    ));

    // The chat log is picked once; later rotations are not followed
    match latest_file_in(&conf.chat_log_dir) {
        Ok(chat_log) => {
            tokio::spawn(follow(
                LogSource::Chat,
                chat_log,
                conf.poll_interval,
                handle.clone(),
            ));
        }
        Err(e) => tracing::error!(
            "No chat log to follow in {}: {}; votes cannot be cast",
            conf.chat_log_dir.display(),
            e
        ),
    }
    drop(handle);

    run_until_shutdown(coordinator, tokio::signal::ctrl_c()).await
}
