use std::sync::Arc;

use clap::Args;
use serde_json::json;

use crate::cli::utils::{open_controller, output_error, output_success, parse_fields, print_checks};
use crate::cli::{OutputFormat, UserArgs};
use crate::controller::{ChallengeState, SubmitOutcome};
use crate::progress::KeyValueStore;
use crate::validator::Submission;

#[derive(Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    pub user: UserArgs,

    #[arg(long, help = "Step number (1-5)")]
    pub step: u8,

    #[arg(long = "field", value_name = "KEY=VALUE", help = "Submission field, repeatable")]
    pub fields: Vec<String>,
}

pub async fn handle(
    args: SubmitArgs,
    storage: Arc<dyn KeyValueStore>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let submission = Submission::from_fields(args.step, parse_fields(&args.fields)?)?;
    let mut controller = open_controller(&args.user, storage)?;

    let outcome = controller.submit(submission)?;
    match &outcome {
        SubmitOutcome::Advanced { outcome: result, state, redirect } => {
            let next = match state {
                ChallengeState::Step(step) => format!("step {} unlocked", step),
                ChallengeState::Completed => match redirect {
                    Some(r) => format!("challenge complete, continue at {}", r.to),
                    None => "challenge complete".to_string(),
                },
            };
            output_success(
                &output_format,
                &format!("{} ({})", result.message, next),
                Some(json!({ "outcome": outcome })),
            )?;
            if matches!(output_format, OutputFormat::Text) {
                print_checks(&result.checks);
            }
        }
        SubmitOutcome::Rejected { outcome: result } => {
            output_error(&output_format, &result.message, Some("REJECTED"))?;
            if matches!(output_format, OutputFormat::Text) {
                print_checks(&result.checks);
            }
            return Err(anyhow::anyhow!("step {} was not accepted", args.step));
        }
        SubmitOutcome::AlreadyCompleted { step } => {
            output_success(
                &output_format,
                &format!("Step {} is already complete; nothing changed", step),
                Some(json!({ "outcome": outcome })),
            )?;
        }
    }

    Ok(())
}
