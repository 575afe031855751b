use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use serde_json::json;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;
use crate::clues::{ClueInjector, ClueTiming, HeadlessPage, HttpBeacon};
use crate::config;
use crate::progress::KeyValueStore;
use crate::puzzle;

#[derive(Args)]
pub struct CluesArgs {
    #[arg(long, help = "User id")]
    pub user: String,

    #[arg(long, help = "Step whose clues to inject (3 or 5)")]
    pub step: u8,
}

pub async fn handle(
    args: CluesArgs,
    storage: Arc<dyn KeyValueStore>,
    output_format: OutputFormat,
) -> anyhow::Result<()> {
    let config = config::config();
    let bundle = puzzle::derive(args.user.trim())?;

    let page = Arc::new(HeadlessPage::new(storage));
    // Discovery requests go to a running server if there is one
    let beacon = Arc::new(HttpBeacon::new(
        config.api.discovery_base_url(),
        Duration::from_millis(config.api.discovery_timeout_ms),
    ));
    let timing = ClueTiming::from(&config.challenge);

    let mut injector = ClueInjector::new(page.clone(), beacon, timing);
    injector.activate(args.step, &bundle);

    // Let the delayed effects land before taking the snapshot
    let settle = timing.discovery_delay.max(timing.console_batch_delay) + Duration::from_millis(100);
    tokio::time::sleep(settle).await;

    let snapshot = page.snapshot();
    injector.deactivate();

    match output_format {
        OutputFormat::Json => output_success(
            &output_format,
            &format!("Step {} clues for user hash {}", args.step, bundle.user_hash),
            Some(json!({ "page": snapshot })),
        ),
        OutputFormat::Text => {
            if snapshot.nodes.is_empty() && snapshot.console.is_empty() && snapshot.globals.is_empty() {
                println!("Step {} injects no clues", args.step);
                return Ok(());
            }
            for node in &snapshot.nodes {
                println!("<div id=\"{}\"> {}", node.id, node.text);
            }
            for global in &snapshot.globals {
                println!("window.{}", global);
            }
            for (key, value) in &snapshot.local_storage {
                println!("localStorage[{}] = {}", key, value);
            }
            for line in &snapshot.console {
                println!("console> {}", line);
            }
            Ok(())
        }
    }
}
