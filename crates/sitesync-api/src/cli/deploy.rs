//! `sitesync deploy` - one foreground deployment run.

use anyhow::bail;
use console::style;
use sitesync_infra::config::Settings;
use sitesync_types::config::PipelineConfig;
use sitesync_types::run::{RunOutcome, RunReport};
use sitesync_types::trigger::DeployTrigger;

use crate::state::build_orchestrator;

/// Run the pipeline once for `branch` (or the configured branch) and print
/// the outcome. Fails when the run does not succeed.
pub async fn deploy(
    settings: &Settings,
    config: &PipelineConfig,
    branch: Option<String>,
) -> anyhow::Result<()> {
    let branch = branch.unwrap_or_else(|| settings.branch.clone());
    let orchestrator = build_orchestrator(settings, config);

    println!();
    println!(
        "  {} Deploying {} to {}",
        style("▶").cyan().bold(),
        style(&branch).bold(),
        style(&settings.publish_target).dim()
    );

    let report = orchestrator.run(DeployTrigger::manual(branch)).await;
    print_report(&report);

    match report.outcome {
        RunOutcome::Succeeded => Ok(()),
        RunOutcome::Failed { stage, .. } => bail!("deployment failed while {stage}"),
        RunOutcome::Busy => bail!("another deployment is already running"),
    }
}

fn print_report(report: &RunReport) {
    println!();
    for stage in &report.completed_stages {
        println!("  {} {stage}", style("✓").green());
    }
    match &report.outcome {
        RunOutcome::Succeeded => println!(
            "\n  {} Published in {:.1}s (run {})",
            style("✓").green().bold(),
            report.duration_ms() as f64 / 1000.0,
            style(report.run_id).dim()
        ),
        RunOutcome::Failed { stage, cause } => {
            println!("  {} {stage}", style("✗").red());
            println!();
            for line in cause.lines() {
                println!("    {}", style(line).dim());
            }
        }
        RunOutcome::Busy => println!("  {} Busy", style("…").yellow()),
    }
    println!();
}
