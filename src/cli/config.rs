use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;

#[derive(Args, Clone, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

#[derive(Subcommand, Clone, Debug)]
pub enum ConfigAction {
    /// Show the effective configuration (default)
    Show,

    /// Print the configuration file path
    Path,

    /// Validate the configuration
    Validate,
}

pub async fn cmd_config(args: ConfigArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    match args.action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => {
            let config = ctx.config();
            match output {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
                OutputFormat::Human => {
                    let source = if ctx.config_found() {
                        ctx.config_path().display().to_string()
                    } else {
                        "defaults".to_string()
                    };
                    println!("# Effective configuration ({source})");
                    print!(
                        "{}",
                        serde_yaml::to_string(config).context("Failed to render config")?
                    );
                }
            }
        }
        ConfigAction::Path => println!("{}", ctx.config_path().display()),
        ConfigAction::Validate => {
            ctx.config().validate()?;
            println!("Configuration is valid");
        }
    }
    Ok(())
}
