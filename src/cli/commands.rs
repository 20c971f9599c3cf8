use clap::Subcommand;

use super::config::ConfigArgs;
use super::run::RunArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Submit a scripted scenario through the task intake
    Run(RunArgs),

    /// Inspect the effective configuration
    Config(ConfigArgs),

    /// Show version and build information
    Info,
}
