use anyhow::Result;

use crate::cli::context::CliContext;

pub async fn cmd_info(ctx: &CliContext) -> Result<()> {
    let config = ctx.config();
    println!("TaskRelay");
    println!("=========");
    println!("Version: {}", env!("CARGO_PKG_VERSION"));
    println!("Build Date: {}", option_env!("BUILD_DATE").unwrap_or("unknown"));
    println!("Git Commit: {}", option_env!("GIT_HASH").unwrap_or("unknown"));
    println!();
    println!("Configuration:");
    println!("- Path: {}", ctx.config_path().display());
    println!("- Max Iterations: {}", config.agent.max_iterations);
    println!("- Stagnation Window: {}", config.agent.stagnation_window);
    println!("- Shortcut Enabled: {}", config.agent.enable_shortcut);
    println!("- Dedup Capacity: {}", config.dedup.capacity);
    Ok(())
}
