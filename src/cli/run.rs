use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;
use serde::Serialize;
use taskrelay_core_types::{OriginatorId, RequestId};
use taskrelay_dedup_gate::InMemorySeenStore;
use tracing::info;

use crate::cli::context::CliContext;
use crate::cli::output::OutputFormat;
use crate::intake::{SubmitOutcome, TaskIntake};
use crate::scripted::ScenarioFile;

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Scenario file (YAML)
    pub scenario: PathBuf,

    /// Request id used for deduplication (random when omitted)
    #[arg(long)]
    pub request_id: Option<String>,

    /// Originator the request comes from
    #[arg(long, default_value = "cli")]
    pub originator: String,

    /// Submit the same request this many times
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,
}

#[derive(Debug, Serialize)]
struct SubmissionReport {
    attempt: u32,
    request_id: RequestId,
    originator: OriginatorId,
    #[serde(flatten)]
    outcome: SubmitOutcome,
}

pub async fn cmd_run(args: RunArgs, ctx: &CliContext, output: OutputFormat) -> Result<()> {
    if args.repeat == 0 {
        bail!("--repeat must be at least 1");
    }
    let scenario = ScenarioFile::load(&args.scenario).await?;
    let config = ctx.config();
    let agent = scenario.build_agent(config.agent.clone());
    let intake = TaskIntake::new(
        InMemorySeenStore::from_config(&config.dedup),
        agent.controller.clone(),
    );

    let request_id = args
        .request_id
        .map(RequestId::from)
        .unwrap_or_else(|| RequestId::from(uuid::Uuid::new_v4().to_string()));
    let originator = OriginatorId::from(args.originator);
    info!(
        scenario = %args.scenario.display(),
        request = %request_id,
        repeat = args.repeat,
        "submitting scenario"
    );

    let mut reports = Vec::with_capacity(args.repeat as usize);
    for attempt in 1..=args.repeat {
        let outcome = intake
            .submit(request_id.clone(), originator.clone(), &scenario.task)
            .await?;
        reports.push(SubmissionReport {
            attempt,
            request_id: request_id.clone(),
            originator: originator.clone(),
            outcome,
        });
    }

    match output {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Human => {
            for report in &reports {
                print_human(report);
            }
            println!("executor calls: {}", agent.executor.calls());
        }
    }
    Ok(())
}

fn print_human(report: &SubmissionReport) {
    match &report.outcome {
        SubmitOutcome::AlreadyProcessed => {
            println!(
                "[{}] request {}: already_processed",
                report.attempt, report.request_id
            );
        }
        SubmitOutcome::Finished(result) => {
            println!(
                "[{}] request {}: {} after {} iteration(s), {} executor call(s)",
                report.attempt,
                report.request_id,
                result.status,
                result.iterations,
                result.executor_calls
            );
            if let Some(target) = &result.direct_target {
                println!("    direct target: {} ({})", target.url, target.source);
            }
            println!("    {}", result.message);
        }
    }
}
