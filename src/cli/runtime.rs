use std::env;
use std::fs as stdfs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::fs;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

pub const LOCAL_ENV_PATH: &str = "config/local.env";
pub const LOCAL_CONFIG_PATH: &str = "config/config.yaml";

/// Load `KEY=VALUE` lines from `config/local.env` without overriding
/// variables that are already set.
pub fn load_local_env_overrides() {
    load_env_file(Path::new(LOCAL_ENV_PATH));
}

/// One line of an env file.
#[derive(Debug, PartialEq, Eq)]
enum EnvLine<'a> {
    Skip,
    Pair(&'a str, String),
    Malformed,
}

fn parse_env_line(raw: &str) -> EnvLine<'_> {
    let line = raw.trim();
    if line.is_empty() || line.starts_with('#') {
        return EnvLine::Skip;
    }
    let line = line.strip_prefix("export ").unwrap_or(line);
    match line.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            EnvLine::Pair(key.trim(), unquote(value.trim()))
        }
        _ => EnvLine::Malformed,
    }
}

/// Apply an env file; returns how many variables were set.
pub fn load_env_file(path: &Path) -> usize {
    let contents = match stdfs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return 0,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "cannot read env file");
            return 0;
        }
    };

    let mut applied = 0;
    for (number, raw) in contents.lines().enumerate() {
        match parse_env_line(raw) {
            EnvLine::Skip => {}
            EnvLine::Malformed => warn!(path = %path.display(), line = number + 1, "skipping malformed env line"),
            EnvLine::Pair(key, _) if env::var_os(key).is_some() => {}
            EnvLine::Pair(key, value) => {
                env::set_var(key, value);
                applied += 1;
            }
        }
    }
    info!(path = %path.display(), applied, "applied env file");
    applied
}

/// Filter for the global subscriber: `RUST_LOG` when set, otherwise the
/// requested level (`debug` forces debug).
fn log_filter(level: &str, debug: bool) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let level: tracing::Level = if debug {
        tracing::Level::DEBUG
    } else {
        level
            .parse()
            .with_context(|| format!("Invalid log level `{level}`"))?
    };
    Ok(EnvFilter::new(level.as_str().to_lowercase()))
}

/// Install the global subscriber. Logs go to stderr so stdout stays
/// machine-readable.
pub fn init_logging(level: &str, debug: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(log_filter(level, debug)?)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .try_init()
        .context("Logging already initialised")?;
    Ok(())
}

pub struct LoadedConfig {
    pub config: Config,
    pub path: PathBuf,
    pub found: bool,
}

pub fn default_config_path() -> PathBuf {
    // Priority: ./config/config.yaml > <config dir>/taskrelay/config.yaml
    let local_config = PathBuf::from(LOCAL_CONFIG_PATH);
    if local_config.exists() {
        return local_config;
    }
    match dirs::config_dir() {
        Some(mut path) => {
            path.push("taskrelay");
            path.push("config.yaml");
            path
        }
        None => local_config,
    }
}

pub async fn load_config(config_path: Option<&PathBuf>) -> Result<LoadedConfig> {
    let (config_path, explicit) = match config_path {
        Some(path) => (path.clone(), true),
        None => (default_config_path(), false),
    };

    let (mut config, found) = if config_path.exists() {
        let content = fs::read_to_string(&config_path)
            .await
            .context("Failed to read config file")?;
        let config = Config::from_yaml(&content).context("Failed to parse config file")?;
        info!("Loaded configuration from: {}", config_path.display());
        (config, true)
    } else if explicit {
        bail!("Config file not found: {}", config_path.display());
    } else {
        warn!(
            "Config file not found, using defaults: {}",
            config_path.display()
        );
        (Config::default(), false)
    };

    config
        .apply_env_overrides()
        .context("Invalid environment override")?;
    config.validate()?;

    Ok(LoadedConfig {
        config,
        path: config_path,
        found,
    })
}

fn unquote(value: &str) -> String {
    if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
        let inner = &value[1..value.len() - 1];
        inner
            .replace("\\\"", "\"")
            .replace("\\n", "\n")
            .replace("\\t", "\t")
    } else {
        value.to_string()
    }
}
