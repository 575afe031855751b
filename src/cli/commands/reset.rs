use std::sync::Arc;

use clap::Args;
use serde_json::json;

use crate::cli::utils::{open_controller, output_success};
use crate::cli::{OutputFormat, UserArgs};
use crate::progress::KeyValueStore;

#[derive(Args)]
pub struct ResetArgs {
    #[command(flatten)]
    pub user: UserArgs,
}

pub async fn handle(
    args: ResetArgs,
    storage: Arc<dyn KeyValueStore>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let mut controller = open_controller(&args.user, storage)?;
    controller.reset()?;

    output_success(
        &output_format,
        &format!("Progress for '{}' in {} cleared", args.user.user, controller.challenge_id()),
        Some(json!({ "state": controller.state() })),
    )
}
