use std::sync::Arc;

use clap::Args;
use serde_json::json;

use crate::cli::utils::{open_controller, output_success};
use crate::cli::{OutputFormat, UserArgs};
use crate::controller::{ChallengeState, StepStatus};
use crate::progress::KeyValueStore;

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub user: UserArgs,
}

pub async fn handle(
    args: StatusArgs,
    storage: Arc<dyn KeyValueStore>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let controller = open_controller(&args.user, storage)?;
    let state = controller.state();
    let summary = match state {
        ChallengeState::Step(step) => format!("{}: step {} of 5", controller.challenge_id(), step),
        ChallengeState::Completed => format!("{}: completed", controller.challenge_id()),
    };

    match output_format {
        OutputFormat::Json => {
            let steps: Vec<_> = controller
                .step_statuses()
                .into_iter()
                .map(|(step, status)| json!({ "step": step, "status": status }))
                .collect();
            output_success(
                &output_format,
                &summary,
                Some(json!({
                    "state": state,
                    "steps": steps,
                    "progress": controller.record(),
                })),
            )
        }
        OutputFormat::Text => {
            println!("{}", summary);
            for (step, status) in controller.step_statuses() {
                let label = match status {
                    StepStatus::Completed => "completed",
                    StepStatus::Active => "active",
                    StepStatus::Locked => "locked",
                };
                let submitted_at = controller
                    .record()
                    .step_data(step)
                    .and_then(|d| d.submitted_at)
                    .map(|t| format!(" ({})", t.to_rfc3339()))
                    .unwrap_or_default();
                println!("  Step {}: {}{}", step, label, submitted_at);
            }
            Ok(())
        }
    }
}
