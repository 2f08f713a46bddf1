use std::{
    env,
    net::SocketAddr,
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use crate::error::ConfigError;

const DEFAULT_POLL_INTERVAL_MS: u64 = 250;

/// The knobs the coordinator is built with. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct VoteSettings {
    pub vote_delay: Duration,
    pub vote_duration: Duration,
    pub num_map_candidates: usize,
}

#[derive(Debug, Clone)]
pub struct RconSettings {
    pub addr: SocketAddr,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_log_path: PathBuf,
    pub chat_log_dir: PathBuf,
    pub map_rotation_path: PathBuf,
    pub vote: VoteSettings,
    pub poll_interval: Duration,
    /// Absent only when running dry
    pub rcon: Option<RconSettings>,
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Config {{ server_log: {}, chat_log_dir: {}, map_rotation: {}, vote_delay: {:?}, \
             vote_duration: {:?}, candidates: {}, rcon: {} }}",
            self.server_log_path.display(),
            self.chat_log_dir.display(),
            self.map_rotation_path.display(),
            self.vote.vote_delay,
            self.vote.vote_duration,
            self.vote.num_map_candidates,
            self.rcon
                .as_ref()
                .map(|rcon| rcon.addr.to_string())
                .unwrap_or_else(|| "disabled".into()),
        )
    }
}

/// Reads the config from the process environment, after layering in `env_file` (or `.env` in the
/// working directory when none is given, if it exists)
pub fn config_from_env(env_file: Option<&PathBuf>, dry_run: bool) -> color_eyre::Result<Config> {
    match env_file {
        Some(path) => {
            dotenv::from_path(path)?;
        }
        None => {
            if let Err(e) = dotenv::dotenv() {
                tracing::debug!("No .env file loaded: {}", e);
            }
        }
    }
    Ok(config_from_lookup(|key| env::var(key).ok(), dry_run)?)
}

/// Builds a [`Config`] from any key lookup; `config_from_env` passes the process environment
pub fn config_from_lookup(
    lookup: impl Fn(&str) -> Option<String>,
    dry_run: bool,
) -> Result<Config, ConfigError> {
    let required = |name: &'static str| lookup(name).ok_or(ConfigError::Missing(name));

    let vote = VoteSettings {
        vote_delay: parse_seconds("MAPVOTE_VOTE_DELAY", &required("MAPVOTE_VOTE_DELAY")?)?,
        vote_duration: parse_seconds(
            "MAPVOTE_VOTE_DURATION",
            &required("MAPVOTE_VOTE_DURATION")?,
        )?,
        num_map_candidates: parse_value(
            "MAPVOTE_NUM_MAP_CANDIDATES",
            &required("MAPVOTE_NUM_MAP_CANDIDATES")?,
        )?,
    };
    if vote.num_map_candidates == 0 {
        return Err(ConfigError::Invalid {
            name: "MAPVOTE_NUM_MAP_CANDIDATES",
            reason: "must be at least 1".into(),
        });
    }

    let poll_interval = match lookup("MAPVOTE_POLL_INTERVAL_MS") {
        Some(raw) => Duration::from_millis(parse_value("MAPVOTE_POLL_INTERVAL_MS", &raw)?),
        None => Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
    };
    // Zero would spin the tailers
    if poll_interval.is_zero() {
        return Err(ConfigError::Invalid {
            name: "MAPVOTE_POLL_INTERVAL_MS",
            reason: "must be at least 1".into(),
        });
    }

    let rcon = if dry_run {
        None
    } else {
        Some(RconSettings {
            addr: parse_value("MAPVOTE_RCON_ADDR", &required("MAPVOTE_RCON_ADDR")?)?,
            password: required("MAPVOTE_RCON_PASSWORD")?,
        })
    };

    Ok(Config {
        server_log_path: required("MAPVOTE_SERVER_LOG_PATH")?.into(),
        chat_log_dir: required("MAPVOTE_CHAT_LOG_DIR")?.into(),
        map_rotation_path: required("MAPVOTE_MAP_ROTATION_PATH")?.into(),
        vote,
        poll_interval,
        rcon,
    })
}

fn parse_value<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

fn parse_seconds(name: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    let secs: f64 = parse_value(name, raw)?;
    Duration::try_from_secs_f64(secs).map_err(|e| ConfigError::Invalid {
        name,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("MAPVOTE_SERVER_LOG_PATH", "/srv/squad/SquadGame.log".to_string()),
            ("MAPVOTE_CHAT_LOG_DIR", "/srv/squad/chat".to_string()),
            ("MAPVOTE_MAP_ROTATION_PATH", "/srv/squad/LayerRotation.cfg".to_string()),
            ("MAPVOTE_VOTE_DELAY", "30.5".to_string()),
            ("MAPVOTE_VOTE_DURATION", "120".to_string()),
            ("MAPVOTE_NUM_MAP_CANDIDATES", "3".to_string()),
            ("MAPVOTE_RCON_ADDR", "127.0.0.1:21114".to_string()),
            ("MAPVOTE_RCON_PASSWORD", "hunter2".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>, dry_run: bool) -> Result<Config, ConfigError> {
        config_from_lookup(|key| env.get(key).cloned(), dry_run)
    }

    #[test]
    fn parses_a_complete_environment() {
        let config = load(&base_env(), false).unwrap();
        assert_eq!(config.vote.vote_delay, Duration::from_secs_f64(30.5));
        assert_eq!(config.vote.vote_duration, Duration::from_secs(120));
        assert_eq!(config.vote.num_map_candidates, 3);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert_eq!(config.rcon.unwrap().password, "hunter2");
    }

    #[test]
    fn display_hides_the_password() {
        let config = load(&base_env(), false).unwrap();
        let shown = config.to_string();
        assert!(shown.contains("127.0.0.1:21114"));
        assert!(!shown.contains("hunter2"));
    }

    #[test]
    fn dry_run_does_not_need_rcon() {
        let mut env = base_env();
        env.remove("MAPVOTE_RCON_ADDR");
        env.remove("MAPVOTE_RCON_PASSWORD");
        assert!(load(&env, false).is_err());
        assert!(load(&env, true).unwrap().rcon.is_none());
    }

    #[test]
    fn rejects_bad_values() {
        let mut env = base_env();
        env.insert("MAPVOTE_VOTE_DELAY", "-1".into());
        assert!(matches!(
            load(&env, false),
            Err(ConfigError::Invalid {
                name: "MAPVOTE_VOTE_DELAY",
                ..
            })
        ));

        let mut env = base_env();
        env.insert("MAPVOTE_NUM_MAP_CANDIDATES", "0".into());
        assert!(load(&env, false).is_err());

        let mut env = base_env();
        env.insert("MAPVOTE_POLL_INTERVAL_MS", "0".into());
        assert!(matches!(
            load(&env, false),
            Err(ConfigError::Invalid {
                name: "MAPVOTE_POLL_INTERVAL_MS",
                ..
            })
        ));

        let mut env = base_env();
        env.remove("MAPVOTE_CHAT_LOG_DIR");
        assert!(matches!(
            load(&env, false),
            Err(ConfigError::Missing("MAPVOTE_CHAT_LOG_DIR"))
        ));
    }
}
